use super::*;
use serde_json::json;

fn make_table(rows: usize) -> Table {
    Table {
        name: "nights_by_region".to_string(),
        columns: vec!["month".to_string(), "region".to_string(), "nights".to_string()],
        rows: (0..rows)
            .map(|i| {
                let Value::Object(row) = json!({
                    "month": i % 12 + 1,
                    "region": format!("R{}", i),
                    "nights": i * 10,
                }) else {
                    unreachable!("json! object literal");
                };
                row
            })
            .collect(),
    }
}

#[test]
fn batches_are_exhaustive_and_ordered() {
    let table = make_table(103);

    let batches: Vec<&[Row]> = batch_rows(&table.rows, 25)
        .expect("positive batch size")
        .collect();

    assert_eq!(
        batches.iter().map(|b| b.len()).collect::<Vec<_>>(),
        vec![25, 25, 25, 25, 3]
    );
    let flattened: Vec<&Row> = batches.iter().flat_map(|b| b.iter()).collect();
    assert_eq!(flattened, table.rows.iter().collect::<Vec<_>>());
}

#[test]
fn zero_batch_size_is_rejected() {
    let table = make_table(3);
    assert!(matches!(
        batch_rows(&table.rows, 0),
        Err(RagError::Ingestion(_))
    ));
}

#[test]
fn batch_mode_makes_one_chunk_per_batch() {
    let table = make_table(100);

    let chunks = build_chunks(&table, "Overnight stays", 25, ChunkMode::Batch)
        .expect("should build chunks");

    assert_eq!(chunks.len(), 4);
    for (index, chunk) in chunks.iter().enumerate() {
        assert_eq!(chunk.batch_index, index);
        assert_eq!(chunk.source, "nights_by_region");
        assert_eq!(chunk.description, "Overnight stays");
        assert!(chunk.text.starts_with(r#"{"dataset_description":"Overnight stays","rows":["#));
    }
}

#[test]
fn batch_chunk_round_trips_rows() {
    let table = make_table(30);

    let chunks = build_chunks(&table, "Overnight stays", 25, ChunkMode::Batch)
        .expect("should build chunks");
    let parsed: Value = serde_json::from_str(&chunks[1].text).expect("chunk text is JSON");

    assert_eq!(parsed[DESCRIPTION_KEY], json!("Overnight stays"));
    let rows = parsed["rows"].as_array().expect("rows array");
    assert_eq!(rows.len(), 5);
    assert_eq!(rows[0], Value::Object(table.rows[25].clone()));
    assert_eq!(rows[4], Value::Object(table.rows[29].clone()));
}

#[test]
fn row_mode_prepends_description() {
    let table = make_table(7);

    let chunks =
        build_chunks(&table, "Overnight stays", 3, ChunkMode::Row).expect("should build chunks");

    assert_eq!(chunks.len(), 7);
    assert_eq!(
        chunks.iter().map(|c| c.batch_index).collect::<Vec<_>>(),
        vec![0, 0, 0, 1, 1, 1, 2]
    );

    let parsed: Map<String, Value> =
        serde_json::from_str(&chunks[4].text).expect("chunk text is JSON");
    let keys: Vec<&String> = parsed.keys().collect();
    assert_eq!(keys, vec![DESCRIPTION_KEY, "month", "region", "nights"]);
    for (column, value) in &table.rows[4] {
        assert_eq!(&parsed[column], value);
    }
}

#[test]
fn empty_table_has_no_chunks() {
    let table = make_table(0);
    let chunks =
        build_chunks(&table, "Nothing", 25, ChunkMode::Batch).expect("should build chunks");
    assert!(chunks.is_empty());
}

#[test]
fn chunk_mode_serde_and_display() {
    #[derive(serde::Deserialize)]
    struct Wrapper {
        mode: ChunkMode,
    }

    let wrapper: Wrapper = toml::from_str("mode = \"row\"").expect("should parse");
    assert_eq!(wrapper.mode, ChunkMode::Row);
    assert_eq!(ChunkMode::default(), ChunkMode::Batch);
    assert_eq!(ChunkMode::Batch.to_string(), "batch");
}

#[test]
fn chunk_mode_parses_from_text() {
    assert_eq!("ROW".parse::<ChunkMode>(), Ok(ChunkMode::Row));
    assert_eq!("batch".parse::<ChunkMode>(), Ok(ChunkMode::Batch));
    assert!("page".parse::<ChunkMode>().is_err());
}

#[test]
fn reserved_column_name_is_rejected_in_both_modes() {
    let Value::Object(row) = json!({"dataset_description": "from file", "visitors": 7}) else {
        unreachable!("json! object literal");
    };
    let table = Table {
        name: "visitors".to_string(),
        columns: vec![DESCRIPTION_KEY.to_string(), "visitors".to_string()],
        rows: vec![row],
    };

    for mode in [ChunkMode::Row, ChunkMode::Batch] {
        let err = build_chunks(&table, "injected", 25, mode).expect_err("collision should fail");
        assert!(matches!(err, RagError::Ingestion(message) if message.contains(DESCRIPTION_KEY)));
    }
}
