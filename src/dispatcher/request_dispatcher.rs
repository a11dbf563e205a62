//! Routes decoded service requests to the server components.
//!
//! Every request passes the channel check at the transport layer first; here it
//! is checked against its session as the service demands, then executed. Any
//! failure becomes a `ServiceFault` carrying the mapped status code; nothing in
//! this module tears down a connection.

use std::sync::Arc;

use autometrics::autometrics;
use nanoid::nanoid;
use tracing::debug;
use tracing::error;
use tracing::trace;

use crate::metrics::SERVICE_REQUESTS_TOTAL;
use crate::server::ANONYMOUS_POLICY_ID;
use crate::utils::time::timestamp_millis;
use crate::ActivateSessionRequest;
use crate::ActivateSessionResponse;
use crate::BrowseRequest;
use crate::BrowseResponse;
use crate::BrowseResult;
use crate::ChannelError;
use crate::CloseSessionRequest;
use crate::CloseSessionResponse;
use crate::CreateMonitoredItemsRequest;
use crate::CreateMonitoredItemsResponse;
use crate::CreateSessionRequest;
use crate::CreateSessionResponse;
use crate::CreateSubscriptionRequest;
use crate::CreateSubscriptionResponse;
use crate::DataValue;
use crate::DeleteMonitoredItemsRequest;
use crate::DeleteMonitoredItemsResponse;
use crate::DeleteSubscriptionsRequest;
use crate::DeleteSubscriptionsResponse;
use crate::Error;
use crate::ErrorKind;
use crate::GetEndpointsRequest;
use crate::GetEndpointsResponse;
use crate::ModifySubscriptionRequest;
use crate::ModifySubscriptionResponse;
use crate::PublishRequest;
use crate::ReadRequest;
use crate::ReadResponse;
use crate::RepublishRequest;
use crate::RepublishResponse;
use crate::RequestHeader;
use crate::RequestedParameters;
use crate::ResponseHeader;
use crate::Result;
use crate::ServerContext;
use crate::ServiceError;
use crate::ServiceRequest;
use crate::ServiceResponse;
use crate::SessionContext;
use crate::SessionError;
use crate::SessionRequirement;
use crate::StatusCode;
use crate::UserIdentityToken;
use crate::WriteRequest;
use crate::WriteResponse;
use crate::API_SLO;

/// Upper bound on operations (nodes, items, ids) in a single request.
pub const MAX_OPERATIONS_PER_REQUEST: usize = 10_000;

const SERVER_NONCE_LEN: usize = 32;

#[derive(Debug, Clone)]
pub struct RequestDispatcher {
    ctx: Arc<ServerContext>,
}

impl RequestDispatcher {
    pub fn new(ctx: Arc<ServerContext>) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &Arc<ServerContext> {
        &self.ctx
    }

    /// Executes one request received on `channel_id`. Always produces a response.
    pub async fn dispatch(
        &self,
        channel_id: u32,
        request: ServiceRequest,
    ) -> ServiceResponse {
        let service = request.service_name();
        let header = request.request_header().clone();
        trace!(channel_id, service, request_handle = header.request_handle, "dispatching");

        let response = match self.handle(channel_id, request).await {
            Ok(response) => response,
            Err(e) => {
                let status = e.status_code();
                match &e {
                    Error::Service(service_error) if service_error.kind() != ErrorKind::Internal => {
                        debug!(channel_id, service, %status, error = %e, "service fault");
                    }
                    _ => error!(channel_id, service, %status, error = %e, "service failed"),
                }
                ServiceResponse::fault(&header, status)
            }
        };

        let status = response.service_result();
        SERVICE_REQUESTS_TOTAL
            .with_label_values(&[service, status.name().unwrap_or("Unknown")])
            .inc();
        response
    }

    #[autometrics(objective = API_SLO)]
    async fn handle(
        &self,
        channel_id: u32,
        request: ServiceRequest,
    ) -> Result<ServiceResponse> {
        let response = match request {
            ServiceRequest::GetEndpoints(r) => ServiceResponse::GetEndpoints(self.get_endpoints(r)),
            ServiceRequest::CreateSession(r) => ServiceResponse::CreateSession(self.create_session(channel_id, r)?),
            ServiceRequest::ActivateSession(r) => {
                ServiceResponse::ActivateSession(self.activate_session(channel_id, r)?)
            }
            ServiceRequest::CloseSession(r) => ServiceResponse::CloseSession(self.close_session(channel_id, r)?),
            ServiceRequest::Read(r) => ServiceResponse::Read(self.read(channel_id, r)?),
            ServiceRequest::Write(r) => ServiceResponse::Write(self.write(channel_id, r)?),
            ServiceRequest::Browse(r) => ServiceResponse::Browse(self.browse(channel_id, r)?),
            ServiceRequest::CreateSubscription(r) => {
                ServiceResponse::CreateSubscription(self.create_subscription(channel_id, r)?)
            }
            ServiceRequest::ModifySubscription(r) => {
                ServiceResponse::ModifySubscription(self.modify_subscription(channel_id, r)?)
            }
            ServiceRequest::CreateMonitoredItems(r) => {
                ServiceResponse::CreateMonitoredItems(self.create_monitored_items(channel_id, r)?)
            }
            ServiceRequest::DeleteMonitoredItems(r) => {
                ServiceResponse::DeleteMonitoredItems(self.delete_monitored_items(channel_id, r)?)
            }
            ServiceRequest::DeleteSubscriptions(r) => {
                ServiceResponse::DeleteSubscriptions(self.delete_subscriptions(channel_id, r)?)
            }
            ServiceRequest::Publish(r) => ServiceResponse::Publish(self.publish(channel_id, r).await?),
            ServiceRequest::Republish(r) => ServiceResponse::Republish(self.republish(channel_id, r)?),
        };
        Ok(response)
    }

    fn session(
        &self,
        header: &RequestHeader,
        channel_id: u32,
        requirement: SessionRequirement,
    ) -> std::result::Result<SessionContext, SessionError> {
        self.ctx
            .sessions
            .validate(&header.authentication_token, channel_id, requirement)
    }

    fn get_endpoints(
        &self,
        request: GetEndpointsRequest,
    ) -> GetEndpointsResponse {
        GetEndpointsResponse {
            response_header: ResponseHeader::good(&request.request_header),
            endpoints: self.ctx.endpoints(),
        }
    }

    fn create_session(
        &self,
        channel_id: u32,
        request: CreateSessionRequest,
    ) -> Result<CreateSessionResponse> {
        let created = self.ctx.sessions.create_session(
            channel_id,
            &request.session_name,
            request.requested_session_timeout,
        )?;

        Ok(CreateSessionResponse {
            response_header: ResponseHeader::good(&request.request_header),
            session_id: created.session_id,
            authentication_token: created.auth_token,
            revised_session_timeout: created.timeout_ms as f64,
            server_nonce: server_nonce(),
            server_endpoints: self.ctx.endpoints(),
        })
    }

    fn activate_session(
        &self,
        channel_id: u32,
        request: ActivateSessionRequest,
    ) -> Result<ActivateSessionResponse> {
        match &request.user_identity_token {
            UserIdentityToken::Anonymous { policy_id } if policy_id.is_empty() || policy_id == ANONYMOUS_POLICY_ID => {}
            UserIdentityToken::Anonymous { .. } => return Err(SessionError::IdentityTokenInvalid.into()),
        }

        self.ctx
            .sessions
            .activate_session(&request.request_header.authentication_token, channel_id)?;

        Ok(ActivateSessionResponse {
            response_header: ResponseHeader::good(&request.request_header),
            server_nonce: server_nonce(),
        })
    }

    /// Subscriptions are deleted even when the client asks to keep them; transfer is unsupported.
    fn close_session(
        &self,
        channel_id: u32,
        request: CloseSessionRequest,
    ) -> Result<CloseSessionResponse> {
        let session = self.session(&request.request_header, channel_id, SessionRequirement::Bound)?;
        if !request.delete_subscriptions {
            debug!(session_id = %session.session_id, "subscriptions deleted despite delete_subscriptions=false");
        }
        self.ctx.close_session(&session.session_id);

        Ok(CloseSessionResponse {
            response_header: ResponseHeader::good(&request.request_header),
        })
    }

    fn read(
        &self,
        channel_id: u32,
        request: ReadRequest,
    ) -> Result<ReadResponse> {
        self.session(&request.request_header, channel_id, SessionRequirement::Activated)?;
        check_operations(request.nodes_to_read.len())?;

        let results = request
            .nodes_to_read
            .iter()
            .map(|r| {
                self.ctx
                    .address_space
                    .get_attribute(&r.node_id, r.attribute_id)
                    .unwrap_or_else(|e| DataValue::from_status(e.status_code(), timestamp_millis()))
            })
            .collect();

        Ok(ReadResponse {
            response_header: ResponseHeader::good(&request.request_header),
            results,
        })
    }

    fn write(
        &self,
        channel_id: u32,
        request: WriteRequest,
    ) -> Result<WriteResponse> {
        self.session(&request.request_header, channel_id, SessionRequirement::Activated)?;
        check_operations(request.nodes_to_write.len())?;

        let results = request
            .nodes_to_write
            .into_iter()
            .map(|w| {
                match self
                    .ctx
                    .address_space
                    .write_attribute(&w.node_id, w.attribute_id, w.value)
                {
                    Ok(_) => StatusCode::Good,
                    Err(e) => {
                        debug!(node_id = %w.node_id, error = %e, "write rejected");
                        e.status_code()
                    }
                }
            })
            .collect();

        Ok(WriteResponse {
            response_header: ResponseHeader::good(&request.request_header),
            results,
        })
    }

    fn browse(
        &self,
        channel_id: u32,
        request: BrowseRequest,
    ) -> Result<BrowseResponse> {
        self.session(&request.request_header, channel_id, SessionRequirement::Activated)?;
        check_operations(request.nodes_to_browse.len())?;

        let results = request
            .nodes_to_browse
            .iter()
            .map(
                |d| match self.ctx.address_space.browse(&d.node_id, d.browse_direction) {
                    Ok(references) => BrowseResult {
                        status_code: StatusCode::Good,
                        references,
                    },
                    Err(e) => BrowseResult {
                        status_code: e.status_code(),
                        references: Vec::new(),
                    },
                },
            )
            .collect();

        Ok(BrowseResponse {
            response_header: ResponseHeader::good(&request.request_header),
            results,
        })
    }

    fn create_subscription(
        &self,
        channel_id: u32,
        request: CreateSubscriptionRequest,
    ) -> Result<CreateSubscriptionResponse> {
        let session = self.session(&request.request_header, channel_id, SessionRequirement::Bound)?;

        let (subscription_id, params) = self.ctx.subscriptions.create_subscription(
            &session.session_id,
            RequestedParameters {
                publishing_interval_ms: request.requested_publishing_interval,
                lifetime_count: request.requested_lifetime_count,
                max_keep_alive_count: request.requested_max_keep_alive_count,
                max_notifications_per_publish: request.max_notifications_per_publish,
            },
            request.publishing_enabled,
            request.priority,
        )?;

        // the session may have closed in between
        if let Err(e) = self.ctx.sessions.attach_subscription(&session.session_id, subscription_id) {
            self.ctx.subscriptions.delete_subscription(subscription_id);
            return Err(e.into());
        }

        Ok(CreateSubscriptionResponse {
            response_header: ResponseHeader::good(&request.request_header),
            subscription_id,
            revised_publishing_interval: params.publishing_interval_ms as f64,
            revised_lifetime_count: params.lifetime_count,
            revised_max_keep_alive_count: params.max_keep_alive_count,
        })
    }

    fn modify_subscription(
        &self,
        channel_id: u32,
        request: ModifySubscriptionRequest,
    ) -> Result<ModifySubscriptionResponse> {
        let session = self.session(&request.request_header, channel_id, SessionRequirement::Bound)?;
        let priority = self
            .ctx
            .subscriptions
            .with_subscription(request.subscription_id, |s| s.priority())
            .unwrap_or_default();

        let params = self.ctx.subscriptions.modify_subscription(
            &session.session_id,
            request.subscription_id,
            RequestedParameters {
                publishing_interval_ms: request.requested_publishing_interval,
                lifetime_count: request.requested_lifetime_count,
                max_keep_alive_count: request.requested_max_keep_alive_count,
                max_notifications_per_publish: request.max_notifications_per_publish,
            },
            priority,
        )?;

        Ok(ModifySubscriptionResponse {
            response_header: ResponseHeader::good(&request.request_header),
            revised_publishing_interval: params.publishing_interval_ms as f64,
            revised_lifetime_count: params.lifetime_count,
            revised_max_keep_alive_count: params.max_keep_alive_count,
        })
    }

    fn create_monitored_items(
        &self,
        channel_id: u32,
        request: CreateMonitoredItemsRequest,
    ) -> Result<CreateMonitoredItemsResponse> {
        let session = self.session(&request.request_header, channel_id, SessionRequirement::Bound)?;
        check_operations(request.items_to_create.len())?;

        let results = self.ctx.subscriptions.create_monitored_items(
            &session.session_id,
            request.subscription_id,
            &request.items_to_create,
        )?;

        Ok(CreateMonitoredItemsResponse {
            response_header: ResponseHeader::good(&request.request_header),
            results,
        })
    }

    fn delete_monitored_items(
        &self,
        channel_id: u32,
        request: DeleteMonitoredItemsRequest,
    ) -> Result<DeleteMonitoredItemsResponse> {
        let session = self.session(&request.request_header, channel_id, SessionRequirement::Bound)?;
        check_operations(request.monitored_item_ids.len())?;

        let results = self.ctx.subscriptions.delete_monitored_items(
            &session.session_id,
            request.subscription_id,
            &request.monitored_item_ids,
        )?;

        Ok(DeleteMonitoredItemsResponse {
            response_header: ResponseHeader::good(&request.request_header),
            results,
        })
    }

    fn delete_subscriptions(
        &self,
        channel_id: u32,
        request: DeleteSubscriptionsRequest,
    ) -> Result<DeleteSubscriptionsResponse> {
        let session = self.session(&request.request_header, channel_id, SessionRequirement::Bound)?;
        check_operations(request.subscription_ids.len())?;

        let results = request
            .subscription_ids
            .iter()
            .map(|id| self.ctx.delete_subscription(&session.session_id, *id))
            .collect();

        Ok(DeleteSubscriptionsResponse {
            response_header: ResponseHeader::good(&request.request_header),
            results,
        })
    }

    async fn publish(
        &self,
        channel_id: u32,
        request: PublishRequest,
    ) -> Result<crate::PublishResponse> {
        let session = self.session(&request.request_header, channel_id, SessionRequirement::Activated)?;
        let channel_cancel = self
            .ctx
            .channels
            .cancellation_token(channel_id)
            .ok_or(ChannelError::Invalid(channel_id))?;

        Ok(self.ctx.publisher.publish(&session, &channel_cancel, request).await?)
    }

    fn republish(
        &self,
        channel_id: u32,
        request: RepublishRequest,
    ) -> Result<RepublishResponse> {
        let session = self.session(&request.request_header, channel_id, SessionRequirement::Activated)?;
        let notification_message = self.ctx.publisher.republish(
            &session.session_id,
            request.subscription_id,
            request.retransmit_sequence_number,
        )?;

        Ok(RepublishResponse {
            response_header: ResponseHeader::good(&request.request_header),
            notification_message,
        })
    }
}

fn check_operations(count: usize) -> Result<()> {
    if count == 0 {
        return Err(ServiceError::NothingToDo.into());
    }
    if count > MAX_OPERATIONS_PER_REQUEST {
        return Err(ServiceError::TooManyOperations {
            requested: count,
            max: MAX_OPERATIONS_PER_REQUEST,
        }
        .into());
    }
    Ok(())
}

fn server_nonce() -> Vec<u8> {
    nanoid!(SERVER_NONCE_LEN).into_bytes()
}
