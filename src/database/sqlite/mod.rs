use std::fmt::Write as _;
use std::path::Path;

use anyhow::Context;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Pool, Row, Sqlite, TypeInfo, ValueRef};
use tracing::{debug, info};

use crate::{RagError, Result};


pub type DbPool = Pool<Sqlite>;

/// Rows shown under each table in `table_info`
const SAMPLE_ROWS: usize = 3;
/// Sample cell values are cut to this many characters
const SAMPLE_VALUE_LENGTH: usize = 100;

/// Relational statistics database queried by the text-to-SQL agent
#[derive(Debug, Clone)]
pub struct SqlDatabase {
    pool: DbPool,
}

impl SqlDatabase {
    /// Open an existing SQLite file. A missing file is an error.
    #[inline]
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(false);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| {
                RagError::Database(format!(
                    "Failed to open SQL database {}: {}",
                    path.display(),
                    e
                ))
            })?;

        info!("Opened SQL database at {}", path.display());
        Ok(Self { pool })
    }

    #[inline]
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    /// User tables in name order
    #[inline]
    pub async fn table_names(&self) -> Result<Vec<String>> {
        sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RagError::Database(format!("Failed to list tables: {}", e)))
    }

    /// Schema description for prompting: each table's CREATE statement followed by a
    /// comment block with up to three sample rows
    #[inline]
    pub async fn table_info(&self) -> Result<String> {
        let tables: Vec<(String, String)> = sqlx::query_as(
            "SELECT name, sql FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RagError::Database(format!("Failed to read schema: {}", e)))?;

        let mut sections = Vec::with_capacity(tables.len());
        for (name, create_sql) in tables {
            let samples = self
                .sample_rows(&name)
                .await
                .map_err(|e| RagError::Database(format!("{:#}", e)))?;
            sections.push(format!("{}\n\n{}", create_sql.trim(), samples));
        }

        debug!("Described {} tables", sections.len());
        Ok(sections.join("\n\n"))
    }

    async fn sample_rows(&self, table: &str) -> anyhow::Result<String> {
        let columns: Vec<String> = sqlx::query_scalar("SELECT name FROM pragma_table_info(?)")
            .bind(table)
            .fetch_all(&self.pool)
            .await
            .with_context(|| format!("Failed to read columns of {}", table))?;

        let query = format!(
            "SELECT * FROM {} LIMIT {}",
            quote_identifier(table),
            SAMPLE_ROWS
        );
        let rows = sqlx::query(&query)
            .fetch_all(&self.pool)
            .await
            .with_context(|| format!("Failed to sample rows from {}", table))?;

        let mut block = format!(
            "/*\n{} rows from {} table:\n{}",
            SAMPLE_ROWS,
            table,
            columns.join("\t")
        );
        for row in &rows {
            let values = (0..row.len())
                .map(|i| {
                    render_value(row, i, false)
                        .map(|v| v.chars().take(SAMPLE_VALUE_LENGTH).collect::<String>())
                })
                .collect::<std::result::Result<Vec<_>, _>>()?;
            write!(block, "\n{}", values.join("\t"))?;
        }
        block.push_str("\n*/");
        Ok(block)
    }

    /// Execute a statement and render the result rows as a list of tuples, e.g.
    /// `[(2019, 'Lisbon', 4.5), (2020, None, 1.25)]`. Statements without rows
    /// produce an empty string.
    #[inline]
    pub async fn run_query(&self, sql: &str) -> Result<String> {
        debug!("Executing SQL: {}", sql);

        let rows = sqlx::query(sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| RagError::Sql(format!("{}", e)))?;

        if rows.is_empty() {
            return Ok(String::new());
        }

        let tuples = rows
            .iter()
            .map(|row| {
                let values = (0..row.len())
                    .map(|i| render_value(row, i, true))
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(match values.as_slice() {
                    [single] => format!("({},)", single),
                    _ => format!("({})", values.join(", ")),
                })
            })
            .collect::<std::result::Result<Vec<_>, sqlx::Error>>()
            .map_err(|e| RagError::Sql(format!("Failed to decode result: {}", e)))?;

        debug!(
            "Query returned {} rows of {} columns",
            rows.len(),
            rows.first().map_or(0, |r| r.columns().len())
        );
        Ok(format!("[{}]", tuples.join(", ")))
    }
}

/// Render one cell by its storage class. Text is single-quoted when `quoted`.
fn render_value(
    row: &SqliteRow,
    index: usize,
    quoted: bool,
) -> std::result::Result<String, sqlx::Error> {
    let raw = row.try_get_raw(index)?;
    if raw.is_null() {
        return Ok("None".to_string());
    }
    let storage_class = raw.type_info().name().to_string();

    match storage_class.as_str() {
        "INTEGER" => row.try_get::<i64, _>(index).map(|v| v.to_string()),
        "REAL" => row.try_get::<f64, _>(index).map(format_real),
        "BLOB" => row
            .try_get::<Vec<u8>, _>(index)
            .map(|bytes| format!("b'{}'", bytes.escape_ascii())),
        _ => row.try_get::<String, _>(index).map(|text| {
            if quoted {
                format!("'{}'", text.replace('\\', "\\\\").replace('\'', "\\'"))
            } else {
                text
            }
        }),
    }
}

/// Reals always carry a fractional part so they read as floats
fn format_real(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 {
        format!("{:.1}", value)
    } else {
        value.to_string()
    }
}

fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
