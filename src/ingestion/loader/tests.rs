use super::*;
use serde_json::json;
use tempfile::TempDir;

fn write_file(dir: &TempDir, name: &str, bytes: &[u8]) -> std::path::PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, bytes).expect("should write test file");
    path
}

#[test]
fn csv_columns_are_typed() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let path = write_file(
        &temp_dir,
        "arrivals.csv",
        b"year,region,guests,open\n2019,Lisbon,4.5,true\n2020,,3,false\n",
    );

    let table = TabularLoader::default()
        .load(&path, 0)
        .expect("should load csv");

    assert_eq!(table.name, "arrivals");
    assert_eq!(table.columns, vec!["year", "region", "guests", "open"]);
    assert_eq!(table.rows.len(), 2);
    assert_eq!(
        Value::Object(table.rows[0].clone()),
        json!({"year": 2019, "region": "Lisbon", "guests": 4.5, "open": true})
    );
    assert_eq!(
        Value::Object(table.rows[1].clone()),
        json!({"year": 2020, "region": null, "guests": 3.0, "open": false})
    );
}

#[test]
fn mixed_column_stays_text() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let path = write_file(&temp_dir, "codes.csv", b"code\n12\nA7\nNA\n");

    let table = TabularLoader::default()
        .load(&path, 0)
        .expect("should load csv");

    let codes: Vec<&Value> = table.rows.iter().map(|r| &r["code"]).collect();
    assert_eq!(codes, vec![&json!("12"), &json!("A7"), &Value::Null]);
}

#[test]
fn column_order_is_preserved() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let path = write_file(&temp_dir, "order.csv", b"zeta,alpha,mid\n1,2,3\n");

    let table = TabularLoader::default()
        .load(&path, 0)
        .expect("should load csv");

    let keys: Vec<&String> = table.rows[0].keys().collect();
    assert_eq!(keys, vec!["zeta", "alpha", "mid"]);
}

#[test]
fn row_limit_is_honored() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let mut content = String::from("n\n");
    for i in 0..10 {
        content.push_str(&i.to_string());
        content.push('\n');
    }
    let path = write_file(&temp_dir, "numbers.csv", content.as_bytes());

    let loader = TabularLoader::default();
    assert_eq!(loader.load(&path, 3).expect("limited").rows.len(), 3);
    assert_eq!(loader.load(&path, 0).expect("all").rows.len(), 10);
    assert_eq!(loader.load(&path, 50).expect("over").rows.len(), 10);
}

#[test]
fn separator_and_encoding_are_applied() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    // "região;hóspedes\nAçores;12\n" in ISO-8859-1
    let mut bytes = b"regi\xe3o;h\xf3spedes\nA\xe7ores;12\n".to_vec();
    bytes.extend_from_slice(b"Madeira;7\n");
    let path = write_file(&temp_dir, "latin.csv", &bytes);

    let loader = TabularLoader::new("latin1", ';').expect("valid loader");
    let table = loader.load(&path, 0).expect("should load latin1 csv");

    assert_eq!(table.columns, vec!["região", "hóspedes"]);
    assert_eq!(table.rows[0]["região"], json!("Açores"));
    assert_eq!(table.rows[1]["hóspedes"], json!(7));
}

#[test]
fn empty_and_repeated_headers_are_named() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let path = write_file(&temp_dir, "headers.csv", b",value,value\n1,2,3\n");

    let table = TabularLoader::default()
        .load(&path, 0)
        .expect("should load csv");

    assert_eq!(table.columns, vec!["Unnamed: 0", "value", "value.1"]);
}

#[test]
fn short_rows_fill_with_null() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let path = write_file(&temp_dir, "short.csv", b"a,b,c\n1,2\n");

    let table = TabularLoader::default()
        .load(&path, 0)
        .expect("should load csv");

    assert_eq!(table.rows[0]["c"], Value::Null);
}

#[test]
fn unsupported_extension_fails_fast() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let path = write_file(&temp_dir, "notes.txt", b"hello");

    let err = TabularLoader::default()
        .load(&path, 0)
        .expect_err("txt should be rejected");
    assert!(matches!(err, RagError::UnsupportedFormat(p) if p.ends_with("notes.txt")));

    assert!(TabularLoader::check_supported(Path::new("a.CSV")).is_ok());
    assert!(TabularLoader::check_supported(Path::new("b.Xlsx")).is_ok());
    assert!(TabularLoader::check_supported(Path::new("c.json")).is_err());
    assert!(TabularLoader::check_supported(Path::new("no_extension")).is_err());
}

#[test]
fn invalid_loader_settings() {
    assert!(matches!(
        TabularLoader::new("klingon", ','),
        Err(RagError::Config(_))
    ));
    assert!(matches!(
        TabularLoader::new("utf-8", '§'),
        Err(RagError::Config(_))
    ));
}

#[test]
fn missing_file_is_ingestion_error() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let err = TabularLoader::default()
        .load(&temp_dir.path().join("absent.csv"), 0)
        .expect_err("missing file should fail");
    assert!(matches!(err, RagError::Ingestion(_)));
}

#[test]
fn spreadsheet_cells_keep_native_types() {
    assert_eq!(cell_value(&Data::Empty), Value::Null);
    assert_eq!(cell_value(&Data::Float(2019.0)), json!(2019));
    assert_eq!(cell_value(&Data::Float(2.5)), json!(2.5));
    assert_eq!(cell_value(&Data::Int(7)), json!(7));
    assert_eq!(cell_value(&Data::Bool(true)), json!(true));
    assert_eq!(
        cell_value(&Data::String("Lisbon".to_string())),
        json!("Lisbon")
    );
    assert_eq!(header_text(&Data::Float(2020.0)), "2020");
    assert_eq!(header_text(&Data::Empty), "");
}

#[test]
fn overlong_csv_record_is_rejected() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let path = write_file(&temp_dir, "long.csv", b"a,b\n1,2\n3,4,5\n");

    let err = TabularLoader::default()
        .load(&path, 0)
        .expect_err("extra field should fail");
    assert!(
        matches!(err, RagError::Ingestion(ref message) if message.contains("expected 2 fields on line 3, saw 3")),
        "unexpected error: {err}"
    );
}

#[test]
fn csv_loading_is_deterministic() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let path = write_file(
        &temp_dir,
        "stays.csv",
        b"year,region,nights\n2017,Algarve,16.9\n2018,,17.1\n2019,Lisboa,NA\n2020,Norte,5.4\n",
    );
    let loader = TabularLoader::default();

    let first = loader.load(&path, 3).expect("should load csv");
    let second = loader.load(&path, 3).expect("should load csv again");

    assert_eq!(first, second);
    assert_eq!(first.rows.len(), 3);
    assert_eq!(
        Value::Object(first.rows[2].clone()),
        json!({"year": 2019, "region": "Lisboa", "nights": null})
    );
}

fn workbook_fixture() -> std::path::PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/data/overnight_stays.xlsx")
}

#[test]
fn spreadsheet_reads_first_worksheet() {
    let table = TabularLoader::default()
        .load(&workbook_fixture(), 0)
        .expect("should load workbook");

    assert_eq!(table.name, "overnight_stays");
    assert_eq!(table.columns, vec!["year", "region", "Unnamed: 2", "nights"]);
    assert_eq!(table.rows.len(), 4);
    assert_eq!(
        Value::Object(table.rows[1].clone()),
        json!({"year": 2018, "region": "Algarve", "Unnamed: 2": "revised", "nights": 17.1})
    );
    assert_eq!(
        Value::Object(table.rows[3].clone()),
        json!({"year": 2020, "region": "Norte", "Unnamed: 2": null, "nights": 5.4})
    );
}

#[test]
fn spreadsheet_loading_is_deterministic() {
    let loader = TabularLoader::default();

    let first = loader
        .load(&workbook_fixture(), 2)
        .expect("should load workbook");
    let second = loader
        .load(&workbook_fixture(), 2)
        .expect("should load workbook again");

    assert_eq!(first, second);
    assert_eq!(first.rows.len(), 2);
    let years: Vec<&Value> = first.rows.iter().map(|r| &r["year"]).collect();
    assert_eq!(years, vec![&json!(2017), &json!(2018)]);
}
