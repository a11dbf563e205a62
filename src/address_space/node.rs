use parking_lot::RwLock;

use crate::AccessLevel;
use crate::DataValue;
use crate::LocalizedText;
use crate::NodeClass;
use crate::NodeId;
use crate::QualifiedName;
use crate::Variant;
use crate::VariantType;

/// Typed reference between two nodes, stored on both ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub reference_type: NodeId,
    pub target: NodeId,
    pub is_forward: bool,
}

/// Attributes only variable nodes carry.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableAttributes {
    pub data_type: VariantType,
    pub access_level: AccessLevel,
    pub minimum_sampling_interval: f64,
}

#[derive(Debug)]
pub(crate) struct NodeState {
    pub(crate) value: DataValue,
    pub(crate) references: Vec<Reference>,
}

/// A node of the address space.
///
/// Identity and metadata are fixed at creation; the value and the reference list
/// sit behind a per-node lock so a value, its status and its timestamps always
/// change together.
#[derive(Debug)]
pub struct Node {
    pub(crate) node_id: NodeId,
    pub(crate) node_class: NodeClass,
    pub(crate) browse_name: QualifiedName,
    pub(crate) display_name: LocalizedText,
    pub(crate) description: LocalizedText,
    pub(crate) variable: Option<VariableAttributes>,
    pub(crate) state: RwLock<NodeState>,
}

impl Node {
    pub fn object(
        node_id: NodeId,
        name: &str,
    ) -> Self {
        Self::new(node_id, NodeClass::Object, name, None, Variant::Empty)
    }

    pub fn variable(
        node_id: NodeId,
        name: &str,
        data_type: VariantType,
        access_level: AccessLevel,
        initial: Variant,
    ) -> Self {
        let attributes = VariableAttributes {
            data_type,
            access_level,
            minimum_sampling_interval: 0.0,
        };
        Self::new(node_id, NodeClass::Variable, name, Some(attributes), initial)
    }

    fn new(
        node_id: NodeId,
        node_class: NodeClass,
        name: &str,
        variable: Option<VariableAttributes>,
        initial: Variant,
    ) -> Self {
        let browse_name = QualifiedName::new(node_id.namespace, name);
        Self {
            node_id,
            node_class,
            browse_name,
            display_name: LocalizedText::new(name),
            description: LocalizedText::default(),
            variable,
            state: RwLock::new(NodeState {
                value: DataValue::new(initial, crate::utils::time::timestamp_millis()),
                references: Vec::new(),
            }),
        }
    }

    pub fn with_description(
        mut self,
        description: &str,
    ) -> Self {
        self.description = LocalizedText::new(description);
        self
    }

    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    pub fn node_class(&self) -> NodeClass {
        self.node_class
    }

    pub fn browse_name(&self) -> &QualifiedName {
        &self.browse_name
    }

    pub fn display_name(&self) -> &LocalizedText {
        &self.display_name
    }

    pub fn variable_attributes(&self) -> Option<&VariableAttributes> {
        self.variable.as_ref()
    }

    /// Snapshot of the current value.
    pub fn value(&self) -> DataValue {
        self.state.read().value.clone()
    }

    pub fn references(&self) -> Vec<Reference> {
        self.state.read().references.clone()
    }
}
