use super::*;

#[test]
fn test_status_code_severity() {
    assert!(StatusCode::Good.is_good());
    assert!(!StatusCode::Good.is_bad());
    assert!(StatusCode::UncertainInitialValue.is_uncertain());
    assert!(StatusCode::BadNodeIdUnknown.is_bad());
    assert!(!StatusCode::BadNodeIdUnknown.is_good());
}

#[test]
fn test_status_code_display_uses_symbolic_name() {
    assert_eq!(StatusCode::BadNodeIdUnknown.to_string(), "BadNodeIdUnknown (0x80340000)");
    assert_eq!(StatusCode(0x8FFF_0000).to_string(), "0x8FFF0000");
}

#[test]
fn test_data_value_change_ignores_timestamps() {
    let a = DataValue::new(Variant::Double(1.0), 100);
    let b = DataValue::new(Variant::Double(1.0), 200);
    assert!(!b.is_changed_from(&a));

    let c = DataValue::new(Variant::Double(2.0), 200);
    assert!(c.is_changed_from(&a));

    let mut d = a.clone();
    d.status = StatusCode::BadInternalError;
    assert!(d.is_changed_from(&a));
}

#[test]
fn test_variant_type_and_defaults() {
    assert_eq!(Variant::from(3_i32).variant_type(), VariantType::Int32);
    assert_eq!(Variant::from(true).variant_type(), VariantType::Boolean);
    assert_eq!(Variant::default_for(VariantType::Double), Variant::Double(0.0));
    assert!(Variant::default().is_empty());
    assert_eq!(Variant::Int32(7).as_f64(), Some(7.0));
    assert_eq!(Variant::from("x").as_f64(), None);
}

#[test]
fn test_attribute_id_from_u32() {
    assert_eq!(AttributeId::from_u32(13), Some(AttributeId::Value));
    assert_eq!(AttributeId::from_u32(3), Some(AttributeId::BrowseName));
    assert_eq!(AttributeId::from_u32(999), None);
    assert!(AttributeId::Value.is_variable_only());
    assert!(!AttributeId::DisplayName.is_variable_only());
}

#[test]
fn test_access_level_bits() {
    assert!(AccessLevel::read_only().is_readable());
    assert!(!AccessLevel::read_only().is_writable());
    assert!(AccessLevel::read_write().is_writable());
}

#[test]
fn test_notification_message_keep_alive() {
    let keep_alive = NotificationMessage {
        sequence_number: 4,
        publish_time: 0,
        notification_data: vec![],
    };
    assert!(keep_alive.is_keep_alive());
    assert_eq!(keep_alive.data_change_count(), 0);

    let data = NotificationMessage {
        sequence_number: 4,
        publish_time: 0,
        notification_data: vec![NotificationData::DataChange(vec![
            MonitoredItemNotification {
                client_handle: 1,
                value: DataValue::new(Variant::Double(1.0), 0),
            },
            MonitoredItemNotification {
                client_handle: 2,
                value: DataValue::new(Variant::Double(2.0), 0),
            },
        ])],
    };
    assert!(!data.is_keep_alive());
    assert_eq!(data.data_change_count(), 2);
}

#[test]
fn test_service_request_header_and_name() {
    let request = ServiceRequest::Read(ReadRequest {
        request_header: RequestHeader::anonymous(42),
        nodes_to_read: vec![ReadValueId::value_of(NodeId::numeric(2, 1000))],
    });
    assert_eq!(request.request_header().request_handle, 42);
    assert_eq!(request.service_name(), "Read");

    let fault = ServiceResponse::fault(request.request_header(), StatusCode::BadSessionIdInvalid);
    assert_eq!(fault.service_result(), StatusCode::BadSessionIdInvalid);
    assert_eq!(fault.response_header().request_handle, 42);
}
