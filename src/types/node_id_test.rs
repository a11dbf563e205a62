use std::str::FromStr;

use uuid::Uuid;

use super::*;

#[test]
fn test_display_numeric_in_namespace_two() {
    assert_eq!(NodeId::numeric(2, 1000).to_string(), "ns=2;i=1000");
}

#[test]
fn test_display_omits_namespace_zero() {
    assert_eq!(well_known::objects_folder().to_string(), "i=85");
}

#[test]
fn test_parse_round_trips_each_identifier_kind() {
    let guid = Uuid::new_v4();
    let cases = vec![
        NodeId::numeric(2, 1001),
        NodeId::string(3, "Tank1.Level"),
        NodeId::guid(1, guid),
        NodeId::numeric(0, 84),
    ];
    for id in cases {
        let parsed = NodeId::from_str(&id.to_string()).unwrap();
        assert_eq!(parsed, id);
    }
}

#[test]
fn test_parse_rejects_malformed_input() {
    for input in ["", "ns=2", "ns=x;i=1", "ns=2;q=1", "i=abc", "ns=2;g=not-a-guid"] {
        assert!(NodeId::from_str(input).is_err(), "{input} should not parse");
    }
}

#[test]
fn test_null_node_id() {
    assert!(NodeId::numeric(0, 0).is_null());
    assert!(!NodeId::numeric(2, 0).is_null());
    assert!(!NodeId::new_guid(1).is_null());
}
