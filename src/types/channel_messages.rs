//! Transport and secure-channel level messages, carried outside of service bodies.

use serde::Deserialize;
use serde::Serialize;

use super::ServiceRequest;
use super::ServiceResponse;
use super::StatusCode;

pub const PROTOCOL_VERSION: u32 = 0;

pub const SECURITY_POLICY_NONE_URI: &str = "http://opcfoundation.org/UA/SecurityPolicy#None";
pub const TRANSPORT_PROFILE_URI: &str =
    "http://opcfoundation.org/UA-Profile/Transport/uatcp-uasc-uabinary";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageSecurityMode {
    None,
    Sign,
    SignAndEncrypt,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelloMessage {
    pub protocol_version: u32,
    pub receive_buffer_size: u32,
    pub send_buffer_size: u32,
    pub max_message_size: u32,
    pub max_chunk_count: u32,
    pub endpoint_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcknowledgeMessage {
    pub protocol_version: u32,
    pub receive_buffer_size: u32,
    pub send_buffer_size: u32,
    pub max_message_size: u32,
    pub max_chunk_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorMessage {
    pub error: StatusCode,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SecurityTokenRequestType {
    Issue,
    Renew,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenSecureChannelRequest {
    pub request_id: u32,
    /// 0 when issuing a fresh channel.
    pub channel_id: u32,
    /// Token being renewed; ignored on issue.
    pub token_id: u32,
    pub request_type: SecurityTokenRequestType,
    pub security_policy_uri: String,
    pub security_mode: MessageSecurityMode,
    /// Milliseconds; 0 requests the server default.
    pub requested_lifetime: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelSecurityToken {
    pub channel_id: u32,
    pub token_id: u32,
    pub created_at: u64,
    pub revised_lifetime: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenSecureChannelResponse {
    pub request_id: u32,
    pub service_result: StatusCode,
    pub server_protocol_version: u32,
    pub security_token: Option<ChannelSecurityToken>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseSecureChannelRequest {
    pub channel_id: u32,
    pub token_id: u32,
}

/// Service request framed with its channel routing information.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecureRequest {
    pub channel_id: u32,
    pub token_id: u32,
    pub request_id: u32,
    pub body: ServiceRequest,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecureResponse {
    pub channel_id: u32,
    pub token_id: u32,
    pub request_id: u32,
    pub body: ServiceResponse,
}
