use std::sync::Arc;
use std::thread;

use super::*;
use crate::well_known;
use crate::AccessLevel;
use crate::AddressSpaceError;
use crate::AttributeId;
use crate::BrowseDirection;
use crate::DataValue;
use crate::ErrorKind;
use crate::NodeClass;
use crate::NodeId;
use crate::StatusCode;
use crate::Variant;
use crate::VariantType;

const VALUE: u32 = AttributeId::Value as u32;

fn space_with_tank() -> AddressSpace {
    let space = AddressSpace::with_standard_folders();
    space
        .add_variable(
            &well_known::objects_folder(),
            NodeId::numeric(2, 1000),
            "TemperatureSensor_Tank1",
            VariantType::Double,
            AccessLevel::read_only(),
        )
        .unwrap();
    space
        .add_variable(
            &well_known::objects_folder(),
            NodeId::numeric(2, 1003),
            "MotorSpeed_Conveyor",
            VariantType::Int32,
            AccessLevel::read_write(),
        )
        .unwrap();
    space
}

#[test]
fn test_standard_folders_are_organized_under_root() {
    let space = AddressSpace::with_standard_folders();
    assert_eq!(space.len(), 4);

    let refs = space.browse(&well_known::root_folder(), BrowseDirection::Forward).unwrap();
    let names: Vec<_> = refs.iter().map(|r| r.browse_name.name.as_str()).collect();
    assert_eq!(names, vec!["Objects", "Types", "Views"]);
    assert!(refs.iter().all(|r| r.is_forward && r.node_class == NodeClass::Object));
}

#[test]
fn test_browse_inverse_reaches_parent() {
    let space = space_with_tank();
    let parents = space.browse(&NodeId::numeric(2, 1000), BrowseDirection::Inverse).unwrap();
    assert_eq!(parents.len(), 1);
    assert_eq!(parents[0].node_id, well_known::objects_folder());
    assert!(!parents[0].is_forward);

    let both = space.browse(&well_known::objects_folder(), BrowseDirection::Both).unwrap();
    // parent Root plus two variables
    assert_eq!(both.len(), 3);
}

#[test]
fn test_browse_unknown_node_is_not_found() {
    let space = AddressSpace::with_standard_folders();
    let err = space.browse(&NodeId::numeric(2, 9), BrowseDirection::Forward).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn test_duplicate_node_id_is_rejected() {
    let space = space_with_tank();
    let err = space
        .add_node(Node::object(NodeId::numeric(2, 1000), "again"))
        .unwrap_err();
    assert_eq!(err, AddressSpaceError::DuplicateNodeId(NodeId::numeric(2, 1000)));
    assert_eq!(err.status_code(), StatusCode::BadNodeIdExists);
}

#[test]
fn test_write_then_read_returns_last_value_with_later_timestamp() {
    let space = space_with_tank();
    let id = NodeId::numeric(2, 1003);

    let written = space
        .write_attribute(&id, VALUE, DataValue::new(Variant::Int32(750), 0))
        .unwrap();
    let read = space.get_attribute(&id, VALUE).unwrap();

    assert_eq!(read.value, Variant::Int32(750));
    assert_eq!(read.status, StatusCode::Good);
    assert!(read.server_timestamp >= written.server_timestamp);
}

#[test]
fn test_server_timestamp_never_goes_backwards() {
    let space = space_with_tank();
    let id = NodeId::numeric(2, 1003);
    let future = crate::utils::time::timestamp_millis() + 3_600_000;

    {
        let node = space.node(&id).unwrap();
        node.state.write().value.server_timestamp = future;
    }
    let written = space
        .write_attribute(&id, VALUE, DataValue::new(Variant::Int32(1), 0))
        .unwrap();
    assert_eq!(written.server_timestamp, future);
}

#[test]
fn test_write_to_missing_node_is_not_found() {
    let space = space_with_tank();
    let err = space
        .write_attribute(&NodeId::numeric(2, 4242), VALUE, DataValue::new(Variant::Int32(1), 0))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(err.status_code(), StatusCode::BadNodeIdUnknown);
}

#[test]
fn test_write_to_read_only_node_is_access_denied() {
    let space = space_with_tank();
    let err = space
        .write_attribute(&NodeId::numeric(2, 1000), VALUE, DataValue::new(Variant::Double(1.0), 0))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AccessDenied);
    assert_eq!(err.status_code(), StatusCode::BadNotWritable);
}

#[test]
fn test_write_non_value_attribute_is_access_denied() {
    let space = space_with_tank();
    let err = space
        .write_attribute(
            &NodeId::numeric(2, 1003),
            AttributeId::DisplayName as u32,
            DataValue::new(Variant::from("x"), 0),
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AccessDenied);
}

#[test]
fn test_write_with_wrong_type_is_type_mismatch() {
    let space = space_with_tank();
    let err = space
        .write_attribute(&NodeId::numeric(2, 1003), VALUE, DataValue::new(Variant::Double(1.5), 0))
        .unwrap_err();
    assert_eq!(
        err,
        AddressSpaceError::TypeMismatch {
            node_id: NodeId::numeric(2, 1003),
            expected: VariantType::Int32,
            actual: VariantType::Double,
        }
    );
    // previous value untouched
    assert_eq!(
        space.get_value(&NodeId::numeric(2, 1003)).unwrap().value,
        Variant::Int32(0)
    );
}

#[test]
fn test_unknown_attribute_is_not_found() {
    let space = space_with_tank();
    let err = space.get_attribute(&NodeId::numeric(2, 1000), 999).unwrap_err();
    assert_eq!(err.status_code(), StatusCode::BadAttributeIdInvalid);
    assert_eq!(err.kind(), ErrorKind::NotFound);

    // variable-only attribute on an object
    let err = space.get_attribute(&well_known::objects_folder(), VALUE).unwrap_err();
    assert_eq!(err.status_code(), StatusCode::BadAttributeIdInvalid);
}

#[test]
fn test_metadata_attributes() {
    let space = space_with_tank();
    let id = NodeId::numeric(2, 1000);

    let name = space.get_attribute(&id, AttributeId::BrowseName as u32).unwrap();
    match name.value {
        Variant::QualifiedName(q) => {
            assert_eq!(q.namespace, 2);
            assert_eq!(q.name, "TemperatureSensor_Tank1");
        }
        other => panic!("unexpected {other:?}"),
    }

    let data_type = space.get_attribute(&id, AttributeId::DataType as u32).unwrap();
    assert_eq!(data_type.value, Variant::from(NodeId::numeric(0, 11)));

    let access = space.get_attribute(&id, AttributeId::AccessLevel as u32).unwrap();
    assert_eq!(access.value, Variant::UInt32(1));
}

#[test]
fn test_simulated_update_bypasses_access_level() {
    let space = space_with_tank();
    let id = NodeId::numeric(2, 1000);

    space.set_simulated_value(&id, Variant::Double(26.5)).unwrap();
    assert_eq!(space.get_value(&id).unwrap().value, Variant::Double(26.5));

    assert!(space.set_simulated_value(&id, Variant::Boolean(true)).is_err());
}

#[test]
fn test_concurrent_readers_never_see_torn_values() {
    let space = Arc::new(space_with_tank());
    let id = NodeId::numeric(2, 1003);

    let writer = {
        let space = space.clone();
        let id = id.clone();
        thread::spawn(move || {
            for i in 0..1000 {
                let mut value = DataValue::new(Variant::Int32(i), 0);
                // status tracks parity of the value, so a torn read would break the pairing
                value.status = if i % 2 == 0 {
                    StatusCode::Good
                } else {
                    StatusCode::UncertainInitialValue
                };
                space.write_attribute(&id, VALUE, value).unwrap();
            }
        })
    };

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let space = space.clone();
            let id = id.clone();
            thread::spawn(move || {
                for _ in 0..1000 {
                    let read = space.get_value(&id).unwrap();
                    if let Variant::Int32(v) = read.value {
                        if v > 0 {
                            let expected = if v % 2 == 0 {
                                StatusCode::Good
                            } else {
                                StatusCode::UncertainInitialValue
                            };
                            assert_eq!(read.status, expected);
                        }
                    }
                }
            })
        })
        .collect();

    writer.join().unwrap();
    for r in readers {
        r.join().unwrap();
    }
}
