use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::debug;
use tracing::trace;

use super::Node;
use super::Reference;
use crate::utils::time::monotonic_after;
use crate::utils::time::timestamp_millis;
use crate::well_known;
use crate::AccessLevel;
use crate::AddressSpaceError;
use crate::AttributeId;
use crate::BrowseDirection;
use crate::DataValue;
use crate::NodeId;
use crate::ReferenceDescription;
use crate::Variant;
use crate::VariantType;

/// In-memory node store shared by every component.
///
/// Nodes live in a sharded map and each node guards its own value, so reads of
/// different nodes never contend and a reader never observes a half-applied write.
#[derive(Debug, Default)]
pub struct AddressSpace {
    nodes: DashMap<NodeId, Arc<Node>>,
}

impl AddressSpace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Root, Objects, Types and Views folders linked by Organizes references.
    pub fn with_standard_folders() -> Self {
        let space = Self::new();
        let root = well_known::root_folder();
        let folders = [
            (root.clone(), "Root"),
            (well_known::objects_folder(), "Objects"),
            (well_known::types_folder(), "Types"),
            (well_known::views_folder(), "Views"),
        ];
        for (node_id, name) in folders {
            // Fresh store, so the ids cannot collide.
            let _ = space.add_node(Node::object(node_id.clone(), name));
            if node_id != root {
                let _ = space.add_reference(&root, organizes(), &node_id);
            }
        }
        space
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(
        &self,
        node_id: &NodeId,
    ) -> bool {
        self.nodes.contains_key(node_id)
    }

    pub fn add_node(
        &self,
        node: Node,
    ) -> Result<(), AddressSpaceError> {
        match self.nodes.entry(node.node_id.clone()) {
            Entry::Occupied(_) => Err(AddressSpaceError::DuplicateNodeId(node.node_id)),
            Entry::Vacant(slot) => {
                trace!(node_id = %node.node_id, "node added");
                slot.insert(Arc::new(node));
                Ok(())
            }
        }
    }

    /// Adds a forward reference on `source` and the matching inverse one on `target`.
    pub fn add_reference(
        &self,
        source: &NodeId,
        reference_type: NodeId,
        target: &NodeId,
    ) -> Result<(), AddressSpaceError> {
        let source_node = self.node(source)?;
        let target_node = self.node(target)?;

        source_node.state.write().references.push(Reference {
            reference_type: reference_type.clone(),
            target: target.clone(),
            is_forward: true,
        });
        target_node.state.write().references.push(Reference {
            reference_type,
            target: source.clone(),
            is_forward: false,
        });
        Ok(())
    }

    /// Adds a variable organized under `parent`.
    pub fn add_variable(
        &self,
        parent: &NodeId,
        node_id: NodeId,
        name: &str,
        data_type: VariantType,
        access_level: AccessLevel,
    ) -> Result<(), AddressSpaceError> {
        self.node(parent)?;
        let node = Node::variable(
            node_id.clone(),
            name,
            data_type,
            access_level,
            Variant::default_for(data_type),
        );
        self.add_node(node)?;
        self.add_reference(parent, organizes(), &node_id)
    }

    pub fn node(
        &self,
        node_id: &NodeId,
    ) -> Result<Arc<Node>, AddressSpaceError> {
        self.nodes
            .get(node_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AddressSpaceError::NodeNotFound(node_id.clone()))
    }

    /// Reads one attribute. Unknown nodes and attribute ids come back as typed errors.
    pub fn get_attribute(
        &self,
        node_id: &NodeId,
        attribute_id: u32,
    ) -> Result<DataValue, AddressSpaceError> {
        let node = self.node(node_id)?;
        let attribute = AttributeId::from_u32(attribute_id).ok_or_else(|| AddressSpaceError::AttributeInvalid {
            node_id: node_id.clone(),
            attribute_id,
        })?;

        if attribute == AttributeId::Value {
            return Self::read_value(&node);
        }

        let now = timestamp_millis();
        let value = match (attribute, node.variable.as_ref()) {
            (AttributeId::NodeId, _) => Variant::from(node.node_id.clone()),
            (AttributeId::NodeClass, _) => Variant::Int32(node.node_class as i32),
            (AttributeId::BrowseName, _) => Variant::QualifiedName(node.browse_name.clone()),
            (AttributeId::DisplayName, _) => Variant::LocalizedText(node.display_name.clone()),
            (AttributeId::Description, _) => Variant::LocalizedText(node.description.clone()),
            (AttributeId::DataType, Some(v)) => Variant::from(NodeId::numeric(0, v.data_type.data_type_id())),
            (AttributeId::ValueRank, Some(_)) => Variant::Int32(-1),
            (AttributeId::AccessLevel, Some(v)) | (AttributeId::UserAccessLevel, Some(v)) => {
                Variant::UInt32(v.access_level.0 as u32)
            }
            (AttributeId::MinimumSamplingInterval, Some(v)) => Variant::Double(v.minimum_sampling_interval),
            _ => {
                return Err(AddressSpaceError::AttributeInvalid {
                    node_id: node_id.clone(),
                    attribute_id,
                })
            }
        };
        Ok(DataValue::new(value, now))
    }

    /// Current value of a variable, as sampled by monitored items.
    pub fn get_value(
        &self,
        node_id: &NodeId,
    ) -> Result<DataValue, AddressSpaceError> {
        let node = self.node(node_id)?;
        Self::read_value(&node)
    }

    fn read_value(node: &Node) -> Result<DataValue, AddressSpaceError> {
        match node.variable.as_ref() {
            None => Err(AddressSpaceError::AttributeInvalid {
                node_id: node.node_id.clone(),
                attribute_id: AttributeId::Value as u32,
            }),
            Some(v) if !v.access_level.is_readable() => Err(AddressSpaceError::NotReadable(node.node_id.clone())),
            Some(_) => Ok(node.value()),
        }
    }

    /// Client write. Only the Value attribute of a writable variable accepts writes,
    /// and the variant must match the declared data type.
    ///
    /// Returns the stored value with its assigned server timestamp.
    pub fn write_attribute(
        &self,
        node_id: &NodeId,
        attribute_id: u32,
        value: DataValue,
    ) -> Result<DataValue, AddressSpaceError> {
        let node = self.node(node_id)?;
        let attribute = AttributeId::from_u32(attribute_id).ok_or_else(|| AddressSpaceError::AttributeInvalid {
            node_id: node_id.clone(),
            attribute_id,
        })?;

        let variable = match (attribute, node.variable.as_ref()) {
            (AttributeId::Value, Some(variable)) => variable,
            (AttributeId::Value, None) => {
                return Err(AddressSpaceError::AttributeInvalid {
                    node_id: node_id.clone(),
                    attribute_id,
                })
            }
            _ => return Err(AddressSpaceError::NotWritable(node_id.clone())),
        };

        if !variable.access_level.is_writable() {
            return Err(AddressSpaceError::NotWritable(node_id.clone()));
        }
        Self::check_type(&node, variable.data_type, &value.value)?;

        let stored = Self::store(&node, value.value, value.status, value.source_timestamp);
        debug!(%node_id, "value written");
        Ok(stored)
    }

    /// Update from the simulation driver; ignores access level, keeps type and timestamp rules.
    pub fn set_simulated_value(
        &self,
        node_id: &NodeId,
        value: Variant,
    ) -> Result<DataValue, AddressSpaceError> {
        let node = self.node(node_id)?;
        let data_type = match node.variable.as_ref() {
            Some(variable) => variable.data_type,
            None => {
                return Err(AddressSpaceError::AttributeInvalid {
                    node_id: node_id.clone(),
                    attribute_id: AttributeId::Value as u32,
                })
            }
        };
        Self::check_type(&node, data_type, &value)?;
        Ok(Self::store(&node, value, crate::StatusCode::Good, None))
    }

    fn check_type(
        node: &Node,
        expected: VariantType,
        value: &Variant,
    ) -> Result<(), AddressSpaceError> {
        let actual = value.variant_type();
        if actual != expected {
            return Err(AddressSpaceError::TypeMismatch {
                node_id: node.node_id.clone(),
                expected,
                actual,
            });
        }
        Ok(())
    }

    fn store(
        node: &Node,
        value: Variant,
        status: crate::StatusCode,
        source_timestamp: Option<u64>,
    ) -> DataValue {
        let mut state = node.state.write();
        let server_timestamp = monotonic_after(state.value.server_timestamp);
        state.value = DataValue {
            value,
            status,
            source_timestamp: Some(source_timestamp.unwrap_or(server_timestamp)),
            server_timestamp,
        };
        state.value.clone()
    }

    /// References of a node in the requested direction.
    pub fn browse(
        &self,
        node_id: &NodeId,
        direction: BrowseDirection,
    ) -> Result<Vec<ReferenceDescription>, AddressSpaceError> {
        let node = self.node(node_id)?;
        let references = node.references();

        let descriptions = references
            .into_iter()
            .filter(|r| match direction {
                BrowseDirection::Forward => r.is_forward,
                BrowseDirection::Inverse => !r.is_forward,
                BrowseDirection::Both => true,
            })
            .filter_map(|r| {
                // Targets are never removed, but skip dangling ids rather than fail the browse.
                let target = self.nodes.get(&r.target)?.value().clone();
                Some(ReferenceDescription {
                    reference_type_id: r.reference_type,
                    is_forward: r.is_forward,
                    node_id: r.target,
                    browse_name: target.browse_name.clone(),
                    display_name: target.display_name.clone(),
                    node_class: target.node_class,
                })
            })
            .collect();
        Ok(descriptions)
    }
}

fn organizes() -> NodeId {
    NodeId::numeric(0, well_known::ORGANIZES)
}
