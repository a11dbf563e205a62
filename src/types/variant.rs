use std::fmt;

use serde::Deserialize;
use serde::Serialize;

use super::NodeId;
use super::StatusCode;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QualifiedName {
    pub namespace: u16,
    pub name: String,
}

impl QualifiedName {
    pub fn new(
        namespace: u16,
        name: impl Into<String>,
    ) -> Self {
        Self {
            namespace,
            name: name.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LocalizedText {
    pub locale: String,
    pub text: String,
}

impl LocalizedText {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            locale: String::new(),
            text: text.into(),
        }
    }
}

/// Built-in type tag of a [`Variant`], also used as the declared data type of variable nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariantType {
    Empty,
    Boolean,
    Int32,
    UInt32,
    Int64,
    Float,
    Double,
    String,
    DateTime,
    ByteString,
    NodeId,
    StatusCode,
    QualifiedName,
    LocalizedText,
}

impl VariantType {
    /// Numeric id of the built-in data type node in namespace 0, reported as the DataType attribute.
    pub fn data_type_id(&self) -> u32 {
        match self {
            VariantType::Empty => 24,
            VariantType::Boolean => 1,
            VariantType::Int32 => 6,
            VariantType::UInt32 => 7,
            VariantType::Int64 => 8,
            VariantType::Float => 10,
            VariantType::Double => 11,
            VariantType::String => 12,
            VariantType::DateTime => 13,
            VariantType::ByteString => 15,
            VariantType::NodeId => 17,
            VariantType::StatusCode => 19,
            VariantType::QualifiedName => 20,
            VariantType::LocalizedText => 21,
        }
    }
}

impl fmt::Display for VariantType {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Tagged value container. `DateTime` is milliseconds since the Unix epoch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub enum Variant {
    #[default]
    Empty,
    Boolean(bool),
    Int32(i32),
    UInt32(u32),
    Int64(i64),
    Float(f32),
    Double(f64),
    String(String),
    DateTime(u64),
    ByteString(Vec<u8>),
    NodeId(Box<NodeId>),
    StatusCode(StatusCode),
    QualifiedName(QualifiedName),
    LocalizedText(LocalizedText),
}

impl Variant {
    pub fn variant_type(&self) -> VariantType {
        match self {
            Variant::Empty => VariantType::Empty,
            Variant::Boolean(_) => VariantType::Boolean,
            Variant::Int32(_) => VariantType::Int32,
            Variant::UInt32(_) => VariantType::UInt32,
            Variant::Int64(_) => VariantType::Int64,
            Variant::Float(_) => VariantType::Float,
            Variant::Double(_) => VariantType::Double,
            Variant::String(_) => VariantType::String,
            Variant::DateTime(_) => VariantType::DateTime,
            Variant::ByteString(_) => VariantType::ByteString,
            Variant::NodeId(_) => VariantType::NodeId,
            Variant::StatusCode(_) => VariantType::StatusCode,
            Variant::QualifiedName(_) => VariantType::QualifiedName,
            Variant::LocalizedText(_) => VariantType::LocalizedText,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Variant::Empty)
    }

    /// Numeric view of the value, used by simulation models and diagnostics.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Variant::Boolean(v) => Some(if *v { 1.0 } else { 0.0 }),
            Variant::Int32(v) => Some(*v as f64),
            Variant::UInt32(v) => Some(*v as f64),
            Variant::Int64(v) => Some(*v as f64),
            Variant::Float(v) => Some(*v as f64),
            Variant::Double(v) => Some(*v),
            _ => None,
        }
    }

    /// Default value for a declared data type.
    pub fn default_for(variant_type: VariantType) -> Variant {
        match variant_type {
            VariantType::Empty => Variant::Empty,
            VariantType::Boolean => Variant::Boolean(false),
            VariantType::Int32 => Variant::Int32(0),
            VariantType::UInt32 => Variant::UInt32(0),
            VariantType::Int64 => Variant::Int64(0),
            VariantType::Float => Variant::Float(0.0),
            VariantType::Double => Variant::Double(0.0),
            VariantType::String => Variant::String(String::new()),
            VariantType::DateTime => Variant::DateTime(0),
            VariantType::ByteString => Variant::ByteString(Vec::new()),
            VariantType::NodeId => Variant::NodeId(Box::new(NodeId::numeric(0, 0))),
            VariantType::StatusCode => Variant::StatusCode(StatusCode::Good),
            VariantType::QualifiedName => Variant::QualifiedName(QualifiedName::new(0, "")),
            VariantType::LocalizedText => Variant::LocalizedText(LocalizedText::default()),
        }
    }
}

impl From<bool> for Variant {
    fn from(v: bool) -> Self {
        Variant::Boolean(v)
    }
}

impl From<i32> for Variant {
    fn from(v: i32) -> Self {
        Variant::Int32(v)
    }
}

impl From<u32> for Variant {
    fn from(v: u32) -> Self {
        Variant::UInt32(v)
    }
}

impl From<f64> for Variant {
    fn from(v: f64) -> Self {
        Variant::Double(v)
    }
}

impl From<&str> for Variant {
    fn from(v: &str) -> Self {
        Variant::String(v.to_string())
    }
}

impl From<String> for Variant {
    fn from(v: String) -> Self {
        Variant::String(v)
    }
}

impl From<NodeId> for Variant {
    fn from(v: NodeId) -> Self {
        Variant::NodeId(Box::new(v))
    }
}
