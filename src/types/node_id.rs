use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;
use uuid::Uuid;

/// Identifier part of a [`NodeId`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Identifier {
    Numeric(u32),
    String(String),
    Guid(Uuid),
}

/// Namespace index plus identifier, the node addressing scheme of the protocol.
///
/// Textual form follows the standard notation: `ns=2;i=1000`, `ns=2;s=Tank1`,
/// `ns=1;g=<uuid>`. The `ns=` prefix is omitted for namespace 0 (`i=85`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId {
    pub namespace: u16,
    pub identifier: Identifier,
}

impl NodeId {
    pub fn numeric(
        namespace: u16,
        value: u32,
    ) -> Self {
        Self {
            namespace,
            identifier: Identifier::Numeric(value),
        }
    }

    pub fn string(
        namespace: u16,
        value: impl Into<String>,
    ) -> Self {
        Self {
            namespace,
            identifier: Identifier::String(value.into()),
        }
    }

    pub fn guid(
        namespace: u16,
        value: Uuid,
    ) -> Self {
        Self {
            namespace,
            identifier: Identifier::Guid(value),
        }
    }

    /// Random GUID node id, used for opaque session tokens.
    pub fn new_guid(namespace: u16) -> Self {
        Self::guid(namespace, Uuid::new_v4())
    }

    pub fn is_null(&self) -> bool {
        self.namespace == 0 && self.identifier == Identifier::Numeric(0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        if self.namespace != 0 {
            write!(f, "ns={};", self.namespace)?;
        }
        match &self.identifier {
            Identifier::Numeric(v) => write!(f, "i={v}"),
            Identifier::String(v) => write!(f, "s={v}"),
            Identifier::Guid(v) => write!(f, "g={v}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid node id: {0}")]
pub struct NodeIdParseError(pub String);

impl FromStr for NodeId {
    type Err = NodeIdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || NodeIdParseError(s.to_string());

        let (namespace, rest) = match s.strip_prefix("ns=") {
            Some(tail) => {
                let (ns, rest) = tail.split_once(';').ok_or_else(invalid)?;
                (ns.parse::<u16>().map_err(|_| invalid())?, rest)
            }
            None => (0, s),
        };

        let (kind, value) = rest.split_once('=').ok_or_else(invalid)?;
        let identifier = match kind {
            "i" => Identifier::Numeric(value.parse().map_err(|_| invalid())?),
            "s" => Identifier::String(value.to_string()),
            "g" => Identifier::Guid(Uuid::parse_str(value).map_err(|_| invalid())?),
            _ => return Err(invalid()),
        };

        Ok(Self {
            namespace,
            identifier,
        })
    }
}

/// Well-known node ids of namespace 0.
pub mod well_known {
    use super::NodeId;

    pub const ROOT_FOLDER: u32 = 84;
    pub const OBJECTS_FOLDER: u32 = 85;
    pub const TYPES_FOLDER: u32 = 86;
    pub const VIEWS_FOLDER: u32 = 87;

    pub const ORGANIZES: u32 = 35;
    pub const HAS_COMPONENT: u32 = 47;
    pub const HAS_TYPE_DEFINITION: u32 = 40;

    pub const FOLDER_TYPE: u32 = 61;
    pub const BASE_DATA_VARIABLE_TYPE: u32 = 63;

    pub fn root_folder() -> NodeId {
        NodeId::numeric(0, ROOT_FOLDER)
    }

    pub fn objects_folder() -> NodeId {
        NodeId::numeric(0, OBJECTS_FOLDER)
    }

    pub fn types_folder() -> NodeId {
        NodeId::numeric(0, TYPES_FOLDER)
    }

    pub fn views_folder() -> NodeId {
        NodeId::numeric(0, VIEWS_FOLDER)
    }
}
