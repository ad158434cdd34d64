use super::{grid, header_with_account, MemorySheet};
use crate::sheet::{ensure_log_columns, knack_account, records, write_outcome};
use crate::sheet::Worksheet;

#[tokio::test]
async fn log_columns_are_appended_once() {
    let ws = MemorySheet::new(
        "Worker-1",
        grid(&[&["IMEI", "Status", "Location"], &["35", "READY", "JAVAMIFI-BSD"]]),
    );

    let headers = ensure_log_columns(ws.as_ref()).await.unwrap();
    assert_eq!(headers.logs_col, 4);
    assert_eq!(headers.timestamp_col, 5);
    assert_eq!(ws.value(1, 4), "Logs");
    assert_eq!(ws.value(1, 5), "TimeStamp");
    assert_eq!(ws.writes(), 2);

    let again = ensure_log_columns(ws.as_ref()).await.unwrap();
    assert_eq!(again, headers);
    assert_eq!(ws.writes(), 2);
}

#[tokio::test]
async fn log_columns_land_after_account_cells() {
    let mut header: Vec<String> = ["IMEI", "Status", "Location"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    header.resize(11, String::new());
    header[8] = "ops@example.com".to_string();
    header[10] = "pw".to_string();
    let ws = MemorySheet::new("Worker-2", vec![header]);

    let headers = ensure_log_columns(ws.as_ref()).await.unwrap();
    assert_eq!((headers.logs_col, headers.timestamp_col), (12, 13));
    assert_eq!(headers.column("IMEI"), Some(1));
    assert_eq!(headers.column("Missing"), None);
}

#[tokio::test]
async fn empty_sheet_gets_headers_in_first_columns() {
    let ws = MemorySheet::new("Worker-5", Vec::new());
    let headers = ensure_log_columns(ws.as_ref()).await.unwrap();
    assert_eq!(headers.names(), ["Logs", "TimeStamp"]);
    assert!(records(ws.as_ref()).await.unwrap().is_empty());
}

#[tokio::test]
async fn account_is_read_from_i1_and_k1() {
    let ws = MemorySheet::new(
        "Worker-1",
        vec![header_with_account(" ops@example.com ", "pw")],
    );
    let account = knack_account(ws.as_ref()).await.unwrap();
    assert_eq!(account.email, "ops@example.com");
    assert_eq!(account.password, "pw");
    assert!(account.is_complete());

    let bare = MemorySheet::new("Worker-2", grid(&[&["IMEI", "Status"]]));
    assert!(!knack_account(bare.as_ref()).await.unwrap().is_complete());
}

#[tokio::test]
async fn records_are_keyed_by_header_and_filtered_by_pending() {
    let ws = MemorySheet::new(
        "Worker-1",
        grid(&[
            &["IMEI", "Status", "Location", "Logs", "TimeStamp"],
            &["35", "READY", "JAVAMIFI-BSD"],
            &["", "READY", "JAVAMIFI-BSD"],
            &["36", "BROKEN", "Menara Caraka", "✅ Submitted", "2024-05-01 10:00:00"],
            &[" 37 ", "READY", "Product Team", "❌ Error: Timeout - slow"],
        ]),
    );

    let rows = records(ws.as_ref()).await.unwrap();
    assert_eq!(rows.len(), 4);
    assert_eq!(rows[0].row_index, 2);
    assert_eq!(rows[3].row_index, 5);
    assert_eq!(rows[3].imei, "37");

    let pending: Vec<usize> = rows
        .iter()
        .filter(|r| r.is_pending())
        .map(|r| r.row_index)
        .collect();
    assert_eq!(pending, vec![2, 5]);
}

#[tokio::test]
async fn adjacent_outcome_columns_are_one_write() {
    let ws = MemorySheet::new(
        "Worker-1",
        grid(&[&["IMEI", "Status", "Location", "Logs", "TimeStamp"], &["35"]]),
    );
    let headers = ensure_log_columns(ws.as_ref()).await.unwrap();

    write_outcome(ws.as_ref(), &headers, 2, "✅ Submitted", "2024-05-01 10:00:00")
        .await
        .unwrap();
    assert_eq!(ws.writes(), 1);
    assert_eq!(ws.value(2, 4), "✅ Submitted");
    assert_eq!(ws.value(2, 5), "2024-05-01 10:00:00");
}

#[tokio::test]
async fn reversed_outcome_columns_keep_their_order() {
    let ws = MemorySheet::new(
        "Worker-1",
        grid(&[&["IMEI", "TimeStamp", "Logs"], &["35"]]),
    );
    let headers = ensure_log_columns(ws.as_ref()).await.unwrap();

    write_outcome(ws.as_ref(), &headers, 2, "✅ Submitted", "ts")
        .await
        .unwrap();
    assert_eq!(ws.writes(), 1);
    assert_eq!(ws.value(2, 2), "ts");
    assert_eq!(ws.value(2, 3), "✅ Submitted");
}

#[tokio::test]
async fn split_outcome_columns_are_two_writes() {
    let ws = MemorySheet::new(
        "Worker-1",
        grid(&[&["Logs", "IMEI", "TimeStamp"], &["", "35"]]),
    );
    let headers = ensure_log_columns(ws.as_ref()).await.unwrap();

    write_outcome(ws.as_ref(), &headers, 2, "❌ Error: Timeout - x", "ts")
        .await
        .unwrap();
    assert_eq!(ws.writes(), 2);
    assert_eq!(ws.value(2, 1), "❌ Error: Timeout - x");
    assert_eq!(ws.value(2, 2), "35");
    assert_eq!(ws.value(2, 3), "ts");
}

#[tokio::test]
async fn default_cell_lookup_treats_blank_as_missing() {
    let ws = MemorySheet::new("Worker-1", grid(&[&["IMEI", ""]]));
    assert_eq!(ws.cell(1, 1).await.unwrap().as_deref(), Some("IMEI"));
    assert_eq!(ws.cell(1, 2).await.unwrap(), None);
    assert_eq!(ws.cell(9, 9).await.unwrap(), None);
}
