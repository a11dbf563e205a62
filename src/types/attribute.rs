use serde::Deserialize;
use serde::Serialize;

/// Attribute identifiers, numbered as in the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u32)]
pub enum AttributeId {
    NodeId = 1,
    NodeClass = 2,
    BrowseName = 3,
    DisplayName = 4,
    Description = 5,
    Value = 13,
    DataType = 14,
    ValueRank = 15,
    AccessLevel = 17,
    UserAccessLevel = 18,
    MinimumSamplingInterval = 19,
}

impl AttributeId {
    pub fn from_u32(id: u32) -> Option<Self> {
        let attribute = match id {
            1 => AttributeId::NodeId,
            2 => AttributeId::NodeClass,
            3 => AttributeId::BrowseName,
            4 => AttributeId::DisplayName,
            5 => AttributeId::Description,
            13 => AttributeId::Value,
            14 => AttributeId::DataType,
            15 => AttributeId::ValueRank,
            17 => AttributeId::AccessLevel,
            18 => AttributeId::UserAccessLevel,
            19 => AttributeId::MinimumSamplingInterval,
            _ => return None,
        };
        Some(attribute)
    }

    /// Attributes that only exist on variable nodes.
    pub fn is_variable_only(&self) -> bool {
        matches!(
            self,
            AttributeId::Value
                | AttributeId::DataType
                | AttributeId::ValueRank
                | AttributeId::AccessLevel
                | AttributeId::UserAccessLevel
                | AttributeId::MinimumSamplingInterval
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum NodeClass {
    Object = 1,
    Variable = 2,
    Method = 4,
}

/// Access level bit set of a variable node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccessLevel(pub u8);

impl AccessLevel {
    pub const CURRENT_READ: u8 = 0x01;
    pub const CURRENT_WRITE: u8 = 0x02;

    pub fn read_only() -> Self {
        AccessLevel(Self::CURRENT_READ)
    }

    pub fn read_write() -> Self {
        AccessLevel(Self::CURRENT_READ | Self::CURRENT_WRITE)
    }

    pub fn is_readable(&self) -> bool {
        self.0 & Self::CURRENT_READ != 0
    }

    pub fn is_writable(&self) -> bool {
        self.0 & Self::CURRENT_WRITE != 0
    }
}

impl Default for AccessLevel {
    fn default() -> Self {
        Self::read_only()
    }
}
