//! Service request and response bodies.
//!
//! Every service is one variant of the closed [`ServiceRequest`] / [`ServiceResponse`]
//! pair; the dispatcher matches them exhaustively, so adding a service is adding a
//! variant plus a handler.

use serde::Deserialize;
use serde::Serialize;

use super::DataValue;
use super::LocalizedText;
use super::MessageSecurityMode;
use super::NodeClass;
use super::NodeId;
use super::QualifiedName;
use super::StatusCode;
use crate::utils::time::timestamp_millis;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestHeader {
    /// Session authentication token; the null node id when no session is involved.
    pub authentication_token: NodeId,
    pub timestamp: u64,
    pub request_handle: u32,
    /// Client-side timeout in milliseconds, 0 for none.
    pub timeout_hint: u32,
}

impl RequestHeader {
    pub fn new(
        authentication_token: NodeId,
        request_handle: u32,
    ) -> Self {
        Self {
            authentication_token,
            timestamp: timestamp_millis(),
            request_handle,
            timeout_hint: 0,
        }
    }

    pub fn anonymous(request_handle: u32) -> Self {
        Self::new(NodeId::numeric(0, 0), request_handle)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseHeader {
    pub timestamp: u64,
    pub request_handle: u32,
    pub service_result: StatusCode,
}

impl ResponseHeader {
    pub fn good(request: &RequestHeader) -> Self {
        Self::with_status(request, StatusCode::Good)
    }

    pub fn with_status(
        request: &RequestHeader,
        service_result: StatusCode,
    ) -> Self {
        Self {
            timestamp: timestamp_millis(),
            request_handle: request.request_handle,
            service_result,
        }
    }
}

// -----------------------------------------------------------------------------
// Discovery

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApplicationType {
    Server,
    Client,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationDescription {
    pub application_uri: String,
    pub product_uri: String,
    pub application_name: LocalizedText,
    pub application_type: ApplicationType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UserTokenType {
    Anonymous,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserTokenPolicy {
    pub policy_id: String,
    pub token_type: UserTokenType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointDescription {
    pub endpoint_url: String,
    pub server: ApplicationDescription,
    pub security_mode: MessageSecurityMode,
    pub security_policy_uri: String,
    pub user_identity_tokens: Vec<UserTokenPolicy>,
    pub transport_profile_uri: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetEndpointsRequest {
    pub request_header: RequestHeader,
    pub endpoint_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetEndpointsResponse {
    pub response_header: ResponseHeader,
    pub endpoints: Vec<EndpointDescription>,
}

// -----------------------------------------------------------------------------
// Session

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateSessionRequest {
    pub request_header: RequestHeader,
    pub session_name: String,
    pub endpoint_url: String,
    /// Milliseconds; 0 lets the server pick its default.
    pub requested_session_timeout: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateSessionResponse {
    pub response_header: ResponseHeader,
    pub session_id: NodeId,
    pub authentication_token: NodeId,
    pub revised_session_timeout: f64,
    pub server_nonce: Vec<u8>,
    pub server_endpoints: Vec<EndpointDescription>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UserIdentityToken {
    Anonymous { policy_id: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivateSessionRequest {
    pub request_header: RequestHeader,
    pub user_identity_token: UserIdentityToken,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivateSessionResponse {
    pub response_header: ResponseHeader,
    pub server_nonce: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloseSessionRequest {
    pub request_header: RequestHeader,
    pub delete_subscriptions: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloseSessionResponse {
    pub response_header: ResponseHeader,
}

// -----------------------------------------------------------------------------
// Attribute services

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadValueId {
    pub node_id: NodeId,
    pub attribute_id: u32,
}

impl ReadValueId {
    pub fn value_of(node_id: NodeId) -> Self {
        Self {
            node_id,
            attribute_id: super::AttributeId::Value as u32,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadRequest {
    pub request_header: RequestHeader,
    pub nodes_to_read: Vec<ReadValueId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadResponse {
    pub response_header: ResponseHeader,
    pub results: Vec<DataValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteValue {
    pub node_id: NodeId,
    pub attribute_id: u32,
    pub value: DataValue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteRequest {
    pub request_header: RequestHeader,
    pub nodes_to_write: Vec<WriteValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteResponse {
    pub response_header: ResponseHeader,
    pub results: Vec<StatusCode>,
}

// -----------------------------------------------------------------------------
// View services

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BrowseDirection {
    Forward,
    Inverse,
    Both,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrowseDescription {
    pub node_id: NodeId,
    pub browse_direction: BrowseDirection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceDescription {
    pub reference_type_id: NodeId,
    pub is_forward: bool,
    pub node_id: NodeId,
    pub browse_name: QualifiedName,
    pub display_name: LocalizedText,
    pub node_class: NodeClass,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrowseResult {
    pub status_code: StatusCode,
    pub references: Vec<ReferenceDescription>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrowseRequest {
    pub request_header: RequestHeader,
    pub nodes_to_browse: Vec<BrowseDescription>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrowseResponse {
    pub response_header: ResponseHeader,
    pub results: Vec<BrowseResult>,
}

// -----------------------------------------------------------------------------
// Subscription services

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateSubscriptionRequest {
    pub request_header: RequestHeader,
    pub requested_publishing_interval: f64,
    pub requested_lifetime_count: u32,
    pub requested_max_keep_alive_count: u32,
    pub max_notifications_per_publish: u32,
    pub publishing_enabled: bool,
    pub priority: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateSubscriptionResponse {
    pub response_header: ResponseHeader,
    pub subscription_id: u32,
    pub revised_publishing_interval: f64,
    pub revised_lifetime_count: u32,
    pub revised_max_keep_alive_count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModifySubscriptionRequest {
    pub request_header: RequestHeader,
    pub subscription_id: u32,
    pub requested_publishing_interval: f64,
    pub requested_lifetime_count: u32,
    pub requested_max_keep_alive_count: u32,
    pub max_notifications_per_publish: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModifySubscriptionResponse {
    pub response_header: ResponseHeader,
    pub revised_publishing_interval: f64,
    pub revised_lifetime_count: u32,
    pub revised_max_keep_alive_count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoredItemCreateRequest {
    pub item_to_monitor: ReadValueId,
    pub client_handle: u32,
    /// Milliseconds; 0 or negative means "use the publishing interval".
    pub sampling_interval: f64,
    pub queue_size: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoredItemCreateResult {
    pub status_code: StatusCode,
    pub monitored_item_id: u32,
    pub revised_sampling_interval: f64,
    pub revised_queue_size: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateMonitoredItemsRequest {
    pub request_header: RequestHeader,
    pub subscription_id: u32,
    pub items_to_create: Vec<MonitoredItemCreateRequest>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateMonitoredItemsResponse {
    pub response_header: ResponseHeader,
    pub results: Vec<MonitoredItemCreateResult>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteMonitoredItemsRequest {
    pub request_header: RequestHeader,
    pub subscription_id: u32,
    pub monitored_item_ids: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteMonitoredItemsResponse {
    pub response_header: ResponseHeader,
    pub results: Vec<StatusCode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteSubscriptionsRequest {
    pub request_header: RequestHeader,
    pub subscription_ids: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteSubscriptionsResponse {
    pub response_header: ResponseHeader,
    pub results: Vec<StatusCode>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionAcknowledgement {
    pub subscription_id: u32,
    pub sequence_number: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoredItemNotification {
    pub client_handle: u32,
    pub value: DataValue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NotificationData {
    DataChange(Vec<MonitoredItemNotification>),
    StatusChange(StatusCode),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationMessage {
    pub sequence_number: u32,
    pub publish_time: u64,
    pub notification_data: Vec<NotificationData>,
}

impl NotificationMessage {
    /// Keep-alive messages carry no notification data.
    pub fn is_keep_alive(&self) -> bool {
        self.notification_data.is_empty()
    }

    pub fn data_change_count(&self) -> usize {
        self.notification_data
            .iter()
            .map(|d| match d {
                NotificationData::DataChange(items) => items.len(),
                NotificationData::StatusChange(_) => 0,
            })
            .sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishRequest {
    pub request_header: RequestHeader,
    pub subscription_acknowledgements: Vec<SubscriptionAcknowledgement>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishResponse {
    pub response_header: ResponseHeader,
    pub subscription_id: u32,
    pub available_sequence_numbers: Vec<u32>,
    pub more_notifications: bool,
    pub notification_message: NotificationMessage,
    /// One status per acknowledgement in the request, in order.
    pub results: Vec<StatusCode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepublishRequest {
    pub request_header: RequestHeader,
    pub subscription_id: u32,
    pub retransmit_sequence_number: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepublishResponse {
    pub response_header: ResponseHeader,
    pub notification_message: NotificationMessage,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceFault {
    pub response_header: ResponseHeader,
}

// -----------------------------------------------------------------------------
// Closed request/response sets

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ServiceRequest {
    GetEndpoints(GetEndpointsRequest),
    CreateSession(CreateSessionRequest),
    ActivateSession(ActivateSessionRequest),
    CloseSession(CloseSessionRequest),
    Read(ReadRequest),
    Write(WriteRequest),
    Browse(BrowseRequest),
    CreateSubscription(CreateSubscriptionRequest),
    ModifySubscription(ModifySubscriptionRequest),
    CreateMonitoredItems(CreateMonitoredItemsRequest),
    DeleteMonitoredItems(DeleteMonitoredItemsRequest),
    DeleteSubscriptions(DeleteSubscriptionsRequest),
    Publish(PublishRequest),
    Republish(RepublishRequest),
}

impl ServiceRequest {
    pub fn request_header(&self) -> &RequestHeader {
        match self {
            ServiceRequest::GetEndpoints(r) => &r.request_header,
            ServiceRequest::CreateSession(r) => &r.request_header,
            ServiceRequest::ActivateSession(r) => &r.request_header,
            ServiceRequest::CloseSession(r) => &r.request_header,
            ServiceRequest::Read(r) => &r.request_header,
            ServiceRequest::Write(r) => &r.request_header,
            ServiceRequest::Browse(r) => &r.request_header,
            ServiceRequest::CreateSubscription(r) => &r.request_header,
            ServiceRequest::ModifySubscription(r) => &r.request_header,
            ServiceRequest::CreateMonitoredItems(r) => &r.request_header,
            ServiceRequest::DeleteMonitoredItems(r) => &r.request_header,
            ServiceRequest::DeleteSubscriptions(r) => &r.request_header,
            ServiceRequest::Publish(r) => &r.request_header,
            ServiceRequest::Republish(r) => &r.request_header,
        }
    }

    pub fn service_name(&self) -> &'static str {
        match self {
            ServiceRequest::GetEndpoints(_) => "GetEndpoints",
            ServiceRequest::CreateSession(_) => "CreateSession",
            ServiceRequest::ActivateSession(_) => "ActivateSession",
            ServiceRequest::CloseSession(_) => "CloseSession",
            ServiceRequest::Read(_) => "Read",
            ServiceRequest::Write(_) => "Write",
            ServiceRequest::Browse(_) => "Browse",
            ServiceRequest::CreateSubscription(_) => "CreateSubscription",
            ServiceRequest::ModifySubscription(_) => "ModifySubscription",
            ServiceRequest::CreateMonitoredItems(_) => "CreateMonitoredItems",
            ServiceRequest::DeleteMonitoredItems(_) => "DeleteMonitoredItems",
            ServiceRequest::DeleteSubscriptions(_) => "DeleteSubscriptions",
            ServiceRequest::Publish(_) => "Publish",
            ServiceRequest::Republish(_) => "Republish",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ServiceResponse {
    GetEndpoints(GetEndpointsResponse),
    CreateSession(CreateSessionResponse),
    ActivateSession(ActivateSessionResponse),
    CloseSession(CloseSessionResponse),
    Read(ReadResponse),
    Write(WriteResponse),
    Browse(BrowseResponse),
    CreateSubscription(CreateSubscriptionResponse),
    ModifySubscription(ModifySubscriptionResponse),
    CreateMonitoredItems(CreateMonitoredItemsResponse),
    DeleteMonitoredItems(DeleteMonitoredItemsResponse),
    DeleteSubscriptions(DeleteSubscriptionsResponse),
    Publish(PublishResponse),
    Republish(RepublishResponse),
    ServiceFault(ServiceFault),
}

impl ServiceResponse {
    pub fn fault(
        request: &RequestHeader,
        status: StatusCode,
    ) -> Self {
        ServiceResponse::ServiceFault(ServiceFault {
            response_header: ResponseHeader::with_status(request, status),
        })
    }

    pub fn response_header(&self) -> &ResponseHeader {
        match self {
            ServiceResponse::GetEndpoints(r) => &r.response_header,
            ServiceResponse::CreateSession(r) => &r.response_header,
            ServiceResponse::ActivateSession(r) => &r.response_header,
            ServiceResponse::CloseSession(r) => &r.response_header,
            ServiceResponse::Read(r) => &r.response_header,
            ServiceResponse::Write(r) => &r.response_header,
            ServiceResponse::Browse(r) => &r.response_header,
            ServiceResponse::CreateSubscription(r) => &r.response_header,
            ServiceResponse::ModifySubscription(r) => &r.response_header,
            ServiceResponse::CreateMonitoredItems(r) => &r.response_header,
            ServiceResponse::DeleteMonitoredItems(r) => &r.response_header,
            ServiceResponse::DeleteSubscriptions(r) => &r.response_header,
            ServiceResponse::Publish(r) => &r.response_header,
            ServiceResponse::Republish(r) => &r.response_header,
            ServiceResponse::ServiceFault(r) => &r.response_header,
        }
    }

    pub fn service_result(&self) -> StatusCode {
        self.response_header().service_result
    }
}
