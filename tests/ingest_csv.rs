// tests/ingest_csv.rs
use futures::StreamExt;
use quality_pipeline::ingest::{CsvSource, Pull, RecordSource, SourceStats};
use quality_pipeline::record::{self, Record, Value};
use serde_json::json;
use std::fs;

async fn records_of(src: &mut CsvSource) -> Vec<Record> {
    src.ingest()
        .filter_map(|p| async move {
            match p {
                Pull::Record(r) => Some(r),
                _ => None,
            }
        })
        .collect()
        .await
}

#[tokio::test]
async fn two_rows_with_metadata_and_no_errors() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("people.csv");
    fs::write(
        &path,
        "id,name,email\n1,John,j@x.com\n2,Jane,jane@x.com\n",
    )
    .unwrap();

    let mut src = CsvSource::new(&path, &json!({})).unwrap();
    let out = records_of(&mut src).await;

    assert_eq!(out.len(), 2);
    assert_eq!(out[0].get("name"), Some(&Value::from("John")));
    assert_eq!(out[1].get("email"), Some(&Value::from("jane@x.com")));
    for (r, row) in out.iter().zip([2i64, 3]) {
        assert_eq!(r.get(record::SOURCE), Some(&Value::from("csv")));
        assert_eq!(r.get(record::ROW_NUMBER), Some(&Value::Int(row)));
        assert_eq!(
            r.get(record::SOURCE_FILE),
            Some(&Value::from(path.display().to_string()))
        );
        assert!(r.contains_key(record::INGESTION_TIMESTAMP));
    }
    assert_eq!(src.stats(), SourceStats { success: 2, errors: 0 });
}

#[tokio::test]
async fn configured_delimiter_is_used() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("semi.csv");
    fs::write(&path, "id;city\n1;Brno\n").unwrap();
    let cfg = json!({"ingestion": {"sources": {"csv": {"delimiter": ";"}}}});

    let mut src = CsvSource::new(&path, &cfg).unwrap();
    let out = records_of(&mut src).await;
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].get("city"), Some(&Value::from("Brno")));
}

#[tokio::test]
async fn stopping_early_leaves_later_rows_unread() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("many.csv");
    let mut body = String::from("n\n");
    for i in 0..100 {
        body.push_str(&format!("{i}\n"));
    }
    fs::write(&path, body).unwrap();

    let mut src = CsvSource::new(&path, &json!({})).unwrap();
    let first: Vec<Pull> = src.ingest().take(3).collect().await;
    assert_eq!(first.len(), 3);
    assert_eq!(src.stats().success, 3);
}

#[tokio::test]
async fn invalid_utf8_row_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bytes.csv");
    fs::write(&path, b"id,name\n1,ok\n2,\xff\xfe\n3,fine\n").unwrap();

    let mut src = CsvSource::new(&path, &json!({})).unwrap();
    let pulls: Vec<Pull> = src.ingest().collect().await;
    assert!(matches!(pulls[1], Pull::Skip { position: 3, .. }));
    assert_eq!(src.stats(), SourceStats { success: 2, errors: 1 });
}
