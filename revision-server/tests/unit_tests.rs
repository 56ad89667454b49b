use axum::http::HeaderMap;
use revision_core::DocId;
use revision_server::api::headers::Toa;
use revision_server::api::{BulkScheduleRequest, RevisionListQuery};
use serde_json::json;

#[test]
fn toa_header_parses_present_value() {
    let mut headers = HeaderMap::new();
    headers.insert("Caesium-TOA", "1700000000".parse().unwrap());
    assert_eq!(Toa::from_headers(&headers).0, Some(1_700_000_000));
}

#[test]
fn toa_header_absent_is_none() {
    let headers = HeaderMap::new();
    assert_eq!(Toa::from_headers(&headers).0, None);
}

#[test]
fn toa_header_ignores_unparseable_value() {
    let mut headers = HeaderMap::new();
    headers.insert("Caesium-TOA", "not-a-number".parse().unwrap());
    assert_eq!(Toa::from_headers(&headers).0, None);
}

#[test]
fn revision_list_query_defaults_to_no_history() {
    let query: RevisionListQuery = serde_json::from_value(json!({})).unwrap();
    assert!(!query.show_history);
    assert!(!query.add_current);
}

#[test]
fn bulk_schedule_request_deserializes_ids_and_patch() {
    let request: BulkScheduleRequest = serde_json::from_value(json!({
        "ids": [DocId::new().to_hex()],
        "patch": {"name": "widget"},
    }))
    .unwrap();
    assert_eq!(request.ids.len(), 1);
    assert_eq!(request.patch["name"], "widget");
}
