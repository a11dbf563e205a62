//! Server error hierarchy.
//!
//! Errors are grouped by layer: infrastructure failures (`SystemError`), configuration
//! problems, and per-request service failures (`ServiceError`). Service failures never
//! terminate a connection; they are mapped to a protocol [`StatusCode`] and returned
//! as a service fault.

use config::ConfigError;
use tokio::task::JoinError;

use crate::NodeId;
use crate::StatusCode;
use crate::VariantType;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Infrastructure-level failures (network, serialization, task management)
    #[error(transparent)]
    System(#[from] SystemError),

    /// Configuration loading or validation failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Failures of a single service request
    #[error(transparent)]
    Service(#[from] ServiceError),

    /// Unrecoverable failures requiring process termination
    #[error("Fatal error: {0}")]
    Fatal(String),
}

impl Error {
    /// Protocol status reported to a client for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Service(e) => e.status_code(),
            Error::System(SystemError::Network(e)) => e.status_code(),
            Error::System(SystemError::Serialization(_)) => StatusCode::BadDecodingError,
            _ => StatusCode::BadInternalError,
        }
    }
}

/// Error taxonomy shared by all service errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    AccessDenied,
    Invalid,
    Timeout,
    Overflow,
    Internal,
}

#[derive(Debug, thiserror::Error)]
pub enum SystemError {
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] SerializationError),

    #[error("Server failed to start: {0}")]
    ServerStartFailed(String),

    #[error("Background task failed: {0}")]
    TaskFailed(#[from] JoinError),

    #[error("Shutdown signal could not be delivered: {0}")]
    SignalSenderClosed(String),
}

#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Frame length above the negotiated maximum
    #[error("Frame of {size} bytes exceeds limit of {max} bytes")]
    FrameTooLarge { size: usize, max: usize },

    /// Frame length smaller than its own header
    #[error("Frame length {0} is shorter than the header")]
    FrameTooShort(usize),

    #[error("Unknown message type {0:?}")]
    InvalidMessageType(String),

    #[error("Unsupported chunk type {0:#04x}")]
    InvalidChunkType(u8),

    #[error("Expected {expected} message, received {actual}")]
    UnexpectedMessage {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("No HEL message received within {0} ms")]
    HelloTimeout(u64),

    #[error("Invalid endpoint URL: {0}")]
    InvalidEndpointUrl(String),

    #[error("Connection limit of {0} reached")]
    TooManyConnections(usize),

    #[error("Connection closed by peer")]
    ConnectionClosed,
}

impl NetworkError {
    /// Status carried in the ERR message sent before closing a connection.
    pub fn status_code(&self) -> StatusCode {
        match self {
            NetworkError::FrameTooLarge { .. } => StatusCode::BadTcpMessageTooLarge,
            NetworkError::FrameTooShort(_)
            | NetworkError::InvalidMessageType(_)
            | NetworkError::InvalidChunkType(_)
            | NetworkError::UnexpectedMessage { .. } => StatusCode::BadTcpMessageTypeInvalid,
            NetworkError::HelloTimeout(_) => StatusCode::BadTimeout,
            NetworkError::InvalidEndpointUrl(_) => StatusCode::BadTcpEndpointUrlInvalid,
            NetworkError::TooManyConnections(_) => StatusCode::BadTcpNotEnoughResources,
            NetworkError::Io(_) | NetworkError::ConnectionClosed => StatusCode::BadSecureChannelClosed,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SerializationError {
    #[error("Bincode serialization error: {0}")]
    Bincode(#[from] bincode::Error),
}

// ===== Service errors =====

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    AddressSpace(#[from] AddressSpaceError),

    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Subscription(#[from] SubscriptionError),

    #[error(transparent)]
    Publish(#[from] PublishError),

    #[error("Service {0} is not supported")]
    Unsupported(&'static str),

    #[error("Request contains nothing to do")]
    NothingToDo,

    #[error("Request carries {requested} operations, limit is {max}")]
    TooManyOperations { requested: usize, max: usize },

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl ServiceError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::AddressSpace(e) => e.status_code(),
            ServiceError::Channel(e) => e.status_code(),
            ServiceError::Session(e) => e.status_code(),
            ServiceError::Subscription(e) => e.status_code(),
            ServiceError::Publish(e) => e.status_code(),
            ServiceError::Unsupported(_) => StatusCode::BadServiceUnsupported,
            ServiceError::NothingToDo => StatusCode::BadNothingToDo,
            ServiceError::TooManyOperations { .. } => StatusCode::BadTooManyOperations,
            ServiceError::Internal(_) => StatusCode::BadInternalError,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::AddressSpace(e) => e.kind(),
            ServiceError::Channel(e) => e.kind(),
            ServiceError::Session(e) => e.kind(),
            ServiceError::Subscription(e) => e.kind(),
            ServiceError::Publish(e) => e.kind(),
            ServiceError::Unsupported(_)
            | ServiceError::NothingToDo
            | ServiceError::TooManyOperations { .. } => ErrorKind::Invalid,
            ServiceError::Internal(_) => ErrorKind::Internal,
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AddressSpaceError {
    #[error("Node {0} not found")]
    NodeNotFound(NodeId),

    #[error("Attribute {attribute_id} is not valid for node {node_id}")]
    AttributeInvalid { node_id: NodeId, attribute_id: u32 },

    #[error("Node {0} is not readable")]
    NotReadable(NodeId),

    #[error("Node {0} is not writable")]
    NotWritable(NodeId),

    #[error("Node {node_id} expects {expected}, got {actual}")]
    TypeMismatch {
        node_id: NodeId,
        expected: VariantType,
        actual: VariantType,
    },

    #[error("Node {0} already exists")]
    DuplicateNodeId(NodeId),
}

impl AddressSpaceError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AddressSpaceError::NodeNotFound(_) => StatusCode::BadNodeIdUnknown,
            AddressSpaceError::AttributeInvalid { .. } => StatusCode::BadAttributeIdInvalid,
            AddressSpaceError::NotReadable(_) => StatusCode::BadNotReadable,
            AddressSpaceError::NotWritable(_) => StatusCode::BadNotWritable,
            AddressSpaceError::TypeMismatch { .. } => StatusCode::BadTypeMismatch,
            AddressSpaceError::DuplicateNodeId(_) => StatusCode::BadNodeIdExists,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            AddressSpaceError::NodeNotFound(_) | AddressSpaceError::AttributeInvalid { .. } => {
                ErrorKind::NotFound
            }
            AddressSpaceError::NotReadable(_) | AddressSpaceError::NotWritable(_) => ErrorKind::AccessDenied,
            AddressSpaceError::TypeMismatch { .. } | AddressSpaceError::DuplicateNodeId(_) => ErrorKind::Invalid,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    #[error("Secure channel {0} does not exist")]
    Invalid(u32),

    #[error("Token {token_id} is not valid for secure channel {channel_id}")]
    TokenUnknown { channel_id: u32, token_id: u32 },

    #[error("Token {token_id} of secure channel {channel_id} has expired")]
    Expired { channel_id: u32, token_id: u32 },

    #[error("Security policy {0} is not supported")]
    SecurityPolicyRejected(String),
}

impl ChannelError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ChannelError::Invalid(_) => StatusCode::BadSecureChannelIdInvalid,
            ChannelError::TokenUnknown { .. } => StatusCode::BadSecureChannelTokenUnknown,
            ChannelError::Expired { .. } => StatusCode::BadSecureChannelClosed,
            ChannelError::SecurityPolicyRejected(_) => StatusCode::BadSecurityPolicyRejected,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ChannelError::Invalid(_) => ErrorKind::NotFound,
            ChannelError::TokenUnknown { .. }
            | ChannelError::Expired { .. }
            | ChannelError::SecurityPolicyRejected(_) => ErrorKind::Invalid,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("No session for the supplied authentication token")]
    NotFound,

    #[error("Session {0} has not been activated")]
    NotActivated(NodeId),

    #[error("Session {0} is closed")]
    Closed(NodeId),

    #[error("Session {session_id} is bound to another secure channel")]
    ChannelMismatch { session_id: NodeId },

    #[error("Session {0} has no secure channel binding")]
    NoChannelBinding(NodeId),

    #[error("Session limit of {0} reached")]
    TooManySessions(usize),

    #[error("Unsupported user identity token")]
    IdentityTokenInvalid,
}

impl SessionError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            SessionError::NotFound => StatusCode::BadSessionIdInvalid,
            SessionError::NotActivated(_) | SessionError::NoChannelBinding(_) => StatusCode::BadSessionNotActivated,
            SessionError::Closed(_) => StatusCode::BadSessionClosed,
            SessionError::ChannelMismatch { .. } => StatusCode::BadSecureChannelIdInvalid,
            SessionError::TooManySessions(_) => StatusCode::BadTooManySessions,
            SessionError::IdentityTokenInvalid => StatusCode::BadIdentityTokenInvalid,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            SessionError::NotFound => ErrorKind::NotFound,
            SessionError::Closed(_) => ErrorKind::Timeout,
            SessionError::TooManySessions(_) => ErrorKind::Overflow,
            _ => ErrorKind::Invalid,
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SubscriptionError {
    #[error("Subscription {0} not found")]
    NotFound(u32),

    #[error("Monitored item {0} not found")]
    MonitoredItemNotFound(u32),

    #[error("Session already owns {0} subscriptions")]
    TooManySubscriptions(usize),

    #[error("Subscription already has {0} monitored items")]
    TooManyMonitoredItems(usize),

    #[error(transparent)]
    AddressSpace(#[from] AddressSpaceError),
}

impl SubscriptionError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            SubscriptionError::NotFound(_) => StatusCode::BadSubscriptionIdInvalid,
            SubscriptionError::MonitoredItemNotFound(_) => StatusCode::BadMonitoredItemIdInvalid,
            SubscriptionError::TooManySubscriptions(_) => StatusCode::BadTooManySubscriptions,
            SubscriptionError::TooManyMonitoredItems(_) => StatusCode::BadTooManyMonitoredItems,
            SubscriptionError::AddressSpace(e) => e.status_code(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            SubscriptionError::NotFound(_) | SubscriptionError::MonitoredItemNotFound(_) => ErrorKind::NotFound,
            SubscriptionError::TooManySubscriptions(_) | SubscriptionError::TooManyMonitoredItems(_) => {
                ErrorKind::Overflow
            }
            SubscriptionError::AddressSpace(e) => e.kind(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PublishError {
    #[error("Session has no subscriptions to publish")]
    NoSubscription,

    #[error("Publish request timed out")]
    Timeout,

    #[error("Too many publish requests queued for the session")]
    TooManyPublishRequests,

    #[error("Session closed while the publish request was pending")]
    SessionClosed,

    #[error("Secure channel closed while the publish request was pending")]
    ChannelClosed,

    #[error("Sequence number {sequence_number} unknown for subscription {subscription_id}")]
    SequenceNumberUnknown { subscription_id: u32, sequence_number: u32 },

    #[error("Message {sequence_number} of subscription {subscription_id} is no longer available")]
    MessageNotAvailable { subscription_id: u32, sequence_number: u32 },

    #[error("Subscription {0} not found")]
    SubscriptionNotFound(u32),

    #[error("Server is shutting down")]
    Shutdown,
}

impl PublishError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            PublishError::NoSubscription => StatusCode::BadNoSubscription,
            PublishError::Timeout => StatusCode::BadTimeout,
            PublishError::TooManyPublishRequests => StatusCode::BadTooManyPublishRequests,
            PublishError::SessionClosed => StatusCode::BadSessionClosed,
            PublishError::ChannelClosed => StatusCode::BadSecureChannelClosed,
            PublishError::SequenceNumberUnknown { .. } => StatusCode::BadSequenceNumberUnknown,
            PublishError::MessageNotAvailable { .. } => StatusCode::BadMessageNotAvailable,
            PublishError::SubscriptionNotFound(_) => StatusCode::BadSubscriptionIdInvalid,
            PublishError::Shutdown => StatusCode::BadShutdown,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            PublishError::NoSubscription
            | PublishError::SequenceNumberUnknown { .. }
            | PublishError::MessageNotAvailable { .. }
            | PublishError::SubscriptionNotFound(_) => ErrorKind::NotFound,
            PublishError::Timeout | PublishError::SessionClosed | PublishError::ChannelClosed => {
                ErrorKind::Timeout
            }
            PublishError::TooManyPublishRequests => ErrorKind::Overflow,
            PublishError::Shutdown => ErrorKind::Internal,
        }
    }
}

// ===== System error conversions =====

impl From<NetworkError> for Error {
    fn from(e: NetworkError) -> Self {
        Error::System(SystemError::Network(e))
    }
}

impl From<SerializationError> for Error {
    fn from(e: SerializationError) -> Self {
        Error::System(SystemError::Serialization(e))
    }
}

impl From<bincode::Error> for Error {
    fn from(e: bincode::Error) -> Self {
        SerializationError::Bincode(e).into()
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        NetworkError::Io(e).into()
    }
}

impl From<JoinError> for Error {
    fn from(e: JoinError) -> Self {
        Error::System(SystemError::TaskFailed(e))
    }
}

// ===== Service error conversions =====

impl From<AddressSpaceError> for Error {
    fn from(e: AddressSpaceError) -> Self {
        Error::Service(ServiceError::AddressSpace(e))
    }
}

impl From<ChannelError> for Error {
    fn from(e: ChannelError) -> Self {
        Error::Service(ServiceError::Channel(e))
    }
}

impl From<SessionError> for Error {
    fn from(e: SessionError) -> Self {
        Error::Service(ServiceError::Session(e))
    }
}

impl From<SubscriptionError> for Error {
    fn from(e: SubscriptionError) -> Self {
        Error::Service(ServiceError::Subscription(e))
    }
}

impl From<PublishError> for Error {
    fn from(e: PublishError) -> Self {
        Error::Service(ServiceError::Publish(e))
    }
}
