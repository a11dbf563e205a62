use std::sync::Arc;

use tokio::sync::watch;

use super::*;
use crate::well_known;
use crate::AccessLevel;
use crate::ActivateSessionRequest;
use crate::AddressSpace;
use crate::AttributeId;
use crate::BrowseDescription;
use crate::BrowseDirection;
use crate::BrowseRequest;
use crate::CloseSessionRequest;
use crate::CreateMonitoredItemsRequest;
use crate::CreateSessionRequest;
use crate::CreateSubscriptionRequest;
use crate::DataValue;
use crate::DeleteSubscriptionsRequest;
use crate::GetEndpointsRequest;
use crate::MessageSecurityMode;
use crate::ModifySubscriptionRequest;
use crate::MonitoredItemCreateRequest;
use crate::NodeId;
use crate::PublishRequest;
use crate::ReadRequest;
use crate::ReadValueId;
use crate::RepublishRequest;
use crate::RequestHeader;
use crate::ServerConfig;
use crate::ServerContext;
use crate::ServiceRequest;
use crate::ServiceResponse;
use crate::StatusCode;
use crate::SubscriptionAcknowledgement;
use crate::test_utils::enable_logger;
use crate::UserIdentityToken;
use crate::Variant;
use crate::VariantType;
use crate::WriteRequest;
use crate::WriteValue;
use crate::SECURITY_POLICY_NONE_URI;

fn level() -> NodeId {
    NodeId::numeric(2, 1001)
}

fn setpoint() -> NodeId {
    NodeId::numeric(2, 1003)
}

struct Fixture {
    dispatcher: RequestDispatcher,
    channel_id: u32,
    _shutdown_tx: watch::Sender<()>,
}

fn fixture() -> Fixture {
    enable_logger();
    let space = Arc::new(AddressSpace::with_standard_folders());
    let objects = well_known::objects_folder();
    space
        .add_variable(&objects, level(), "Level", VariantType::Double, AccessLevel::read_only())
        .unwrap();
    space
        .add_variable(&objects, setpoint(), "Setpoint", VariantType::Int32, AccessLevel::read_write())
        .unwrap();

    let ctx = Arc::new(ServerContext::new(ServerConfig::default(), space));
    let channel_id = ctx
        .channels
        .open_channel(SECURITY_POLICY_NONE_URI, MessageSecurityMode::None, 0)
        .unwrap()
        .channel_id;

    let (shutdown_tx, shutdown_rx) = watch::channel(());
    let publisher = ctx.publisher.clone();
    tokio::spawn(async move { publisher.run(shutdown_rx).await });

    Fixture {
        dispatcher: RequestDispatcher::new(ctx),
        channel_id,
        _shutdown_tx: shutdown_tx,
    }
}

impl Fixture {
    async fn call(
        &self,
        request: ServiceRequest,
    ) -> ServiceResponse {
        self.dispatcher.dispatch(self.channel_id, request).await
    }

    async fn create_session(&self) -> NodeId {
        let response = self
            .call(ServiceRequest::CreateSession(CreateSessionRequest {
                request_header: RequestHeader::anonymous(1),
                session_name: "dispatcher-test".into(),
                endpoint_url: "opc.tcp://localhost:4840".into(),
                requested_session_timeout: 0.0,
            }))
            .await;
        match response {
            ServiceResponse::CreateSession(r) => {
                assert_eq!(r.server_nonce.len(), 32);
                assert_eq!(r.server_endpoints.len(), 1);
                r.authentication_token
            }
            other => panic!("unexpected response {other:?}"),
        }
    }

    async fn activate(
        &self,
        token: &NodeId,
        policy_id: &str,
    ) -> ServiceResponse {
        self.call(ServiceRequest::ActivateSession(ActivateSessionRequest {
            request_header: RequestHeader::new(token.clone(), 2),
            user_identity_token: UserIdentityToken::Anonymous {
                policy_id: policy_id.into(),
            },
        }))
        .await
    }

    async fn open_session(&self) -> NodeId {
        let token = self.create_session().await;
        assert_eq!(self.activate(&token, "anonymous").await.service_result(), StatusCode::Good);
        token
    }

    async fn read(
        &self,
        token: &NodeId,
        nodes: Vec<ReadValueId>,
    ) -> ServiceResponse {
        self.call(ServiceRequest::Read(ReadRequest {
            request_header: RequestHeader::new(token.clone(), 3),
            nodes_to_read: nodes,
        }))
        .await
    }

    async fn create_subscription(
        &self,
        token: &NodeId,
    ) -> u32 {
        let response = self
            .call(ServiceRequest::CreateSubscription(CreateSubscriptionRequest {
                request_header: RequestHeader::new(token.clone(), 4),
                requested_publishing_interval: 100.0,
                requested_lifetime_count: 60,
                requested_max_keep_alive_count: 20,
                max_notifications_per_publish: 0,
                publishing_enabled: true,
                priority: 0,
            }))
            .await;
        match response {
            ServiceResponse::CreateSubscription(r) => {
                assert_eq!(r.revised_publishing_interval, 100.0);
                r.subscription_id
            }
            other => panic!("unexpected response {other:?}"),
        }
    }

    async fn publish(
        &self,
        token: &NodeId,
        acks: Vec<SubscriptionAcknowledgement>,
    ) -> ServiceResponse {
        self.call(ServiceRequest::Publish(PublishRequest {
            request_header: RequestHeader::new(token.clone(), 5),
            subscription_acknowledgements: acks,
        }))
        .await
    }
}

#[tokio::test(start_paused = true)]
async fn test_get_endpoints_needs_no_session() {
    let f = fixture();
    let response = f
        .call(ServiceRequest::GetEndpoints(GetEndpointsRequest {
            request_header: RequestHeader::anonymous(7),
            endpoint_url: String::new(),
        }))
        .await;

    match response {
        ServiceResponse::GetEndpoints(r) => {
            assert_eq!(r.response_header.request_handle, 7);
            assert_eq!(r.endpoints[0].security_policy_uri, SECURITY_POLICY_NONE_URI);
        }
        other => panic!("unexpected response {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_session_must_be_activated_before_reads() {
    let f = fixture();
    let token = f.create_session().await;

    let early = f.read(&token, vec![ReadValueId::value_of(level())]).await;
    assert_eq!(early.service_result(), StatusCode::BadSessionNotActivated);
    assert!(matches!(early, ServiceResponse::ServiceFault(_)));

    assert_eq!(
        f.activate(&token, "x509").await.service_result(),
        StatusCode::BadIdentityTokenInvalid
    );
    assert_eq!(f.activate(&token, "").await.service_result(), StatusCode::Good);

    let unknown = f.read(&NodeId::numeric(1, 4242), vec![ReadValueId::value_of(level())]).await;
    assert_eq!(unknown.service_result(), StatusCode::BadSessionIdInvalid);
}

#[tokio::test(start_paused = true)]
async fn test_read_write_browse() {
    let f = fixture();
    let token = f.open_session().await;

    let response = f
        .read(
            &token,
            vec![
                ReadValueId::value_of(level()),
                ReadValueId::value_of(NodeId::numeric(2, 9)),
                ReadValueId {
                    node_id: level(),
                    attribute_id: 999,
                },
            ],
        )
        .await;
    match response {
        ServiceResponse::Read(r) => {
            assert_eq!(r.results[0].status, StatusCode::Good);
            assert_eq!(r.results[0].value, Variant::Double(0.0));
            assert_eq!(r.results[1].status, StatusCode::BadNodeIdUnknown);
            assert_eq!(r.results[2].status, StatusCode::BadAttributeIdInvalid);
        }
        other => panic!("unexpected response {other:?}"),
    }

    let write = |node_id: NodeId, value: Variant| WriteValue {
        node_id,
        attribute_id: AttributeId::Value as u32,
        value: DataValue::new(value, 0),
    };
    let response = f
        .call(ServiceRequest::Write(WriteRequest {
            request_header: RequestHeader::new(token.clone(), 8),
            nodes_to_write: vec![
                write(setpoint(), Variant::Int32(750)),
                write(level(), Variant::Double(1.0)),
                write(setpoint(), Variant::Double(1.0)),
            ],
        }))
        .await;
    match response {
        ServiceResponse::Write(r) => assert_eq!(
            r.results,
            vec![StatusCode::Good, StatusCode::BadNotWritable, StatusCode::BadTypeMismatch]
        ),
        other => panic!("unexpected response {other:?}"),
    }

    match f.read(&token, vec![ReadValueId::value_of(setpoint())]).await {
        ServiceResponse::Read(r) => assert_eq!(r.results[0].value, Variant::Int32(750)),
        other => panic!("unexpected response {other:?}"),
    }

    let response = f
        .call(ServiceRequest::Browse(BrowseRequest {
            request_header: RequestHeader::new(token.clone(), 9),
            nodes_to_browse: vec![
                BrowseDescription {
                    node_id: well_known::objects_folder(),
                    browse_direction: BrowseDirection::Forward,
                },
                BrowseDescription {
                    node_id: NodeId::numeric(7, 7),
                    browse_direction: BrowseDirection::Both,
                },
            ],
        }))
        .await;
    match response {
        ServiceResponse::Browse(r) => {
            let targets: Vec<NodeId> = r.results[0].references.iter().map(|d| d.node_id.clone()).collect();
            assert!(targets.contains(&level()));
            assert!(targets.contains(&setpoint()));
            assert_eq!(r.results[1].status_code, StatusCode::BadNodeIdUnknown);
        }
        other => panic!("unexpected response {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_operation_count_limits() {
    let f = fixture();
    let token = f.open_session().await;

    assert_eq!(f.read(&token, vec![]).await.service_result(), StatusCode::BadNothingToDo);

    let too_many = vec![ReadValueId::value_of(level()); MAX_OPERATIONS_PER_REQUEST + 1];
    assert_eq!(
        f.read(&token, too_many).await.service_result(),
        StatusCode::BadTooManyOperations
    );
}

#[tokio::test(start_paused = true)]
async fn test_session_is_bound_to_its_channel() {
    let f = fixture();
    let token = f.open_session().await;

    let other_channel = f
        .dispatcher
        .context()
        .channels
        .open_channel(SECURITY_POLICY_NONE_URI, MessageSecurityMode::None, 0)
        .unwrap()
        .channel_id;
    let response = f
        .dispatcher
        .dispatch(
            other_channel,
            ServiceRequest::Read(ReadRequest {
                request_header: RequestHeader::new(token.clone(), 1),
                nodes_to_read: vec![ReadValueId::value_of(level())],
            }),
        )
        .await;
    assert_eq!(response.service_result(), StatusCode::BadSecureChannelIdInvalid);
}

#[tokio::test(start_paused = true)]
async fn test_subscription_round_trip() {
    let f = fixture();
    let token = f.open_session().await;
    let subscription_id = f.create_subscription(&token).await;

    let response = f
        .call(ServiceRequest::CreateMonitoredItems(CreateMonitoredItemsRequest {
            request_header: RequestHeader::new(token.clone(), 6),
            subscription_id,
            items_to_create: vec![
                MonitoredItemCreateRequest {
                    item_to_monitor: ReadValueId::value_of(level()),
                    client_handle: 1,
                    sampling_interval: 0.0,
                    queue_size: 1,
                },
                MonitoredItemCreateRequest {
                    item_to_monitor: ReadValueId::value_of(NodeId::numeric(2, 9)),
                    client_handle: 2,
                    sampling_interval: 0.0,
                    queue_size: 1,
                },
            ],
        }))
        .await;
    match response {
        ServiceResponse::CreateMonitoredItems(r) => {
            assert_eq!(r.results[0].status_code, StatusCode::Good);
            assert_eq!(r.results[0].revised_sampling_interval, 100.0);
            assert_eq!(r.results[1].status_code, StatusCode::BadNodeIdUnknown);
        }
        other => panic!("unexpected response {other:?}"),
    }

    let first = match f.publish(&token, vec![]).await {
        ServiceResponse::Publish(r) => {
            assert_eq!(r.subscription_id, subscription_id);
            assert_eq!(r.notification_message.data_change_count(), 1);
            r.notification_message
        }
        other => panic!("unexpected response {other:?}"),
    };

    match f
        .call(ServiceRequest::Republish(RepublishRequest {
            request_header: RequestHeader::new(token.clone(), 10),
            subscription_id,
            retransmit_sequence_number: first.sequence_number,
        }))
        .await
    {
        ServiceResponse::Republish(r) => assert_eq!(r.notification_message, first),
        other => panic!("unexpected response {other:?}"),
    }

    let modified = f
        .call(ServiceRequest::ModifySubscription(ModifySubscriptionRequest {
            request_header: RequestHeader::new(token.clone(), 11),
            subscription_id,
            requested_publishing_interval: 250.0,
            requested_lifetime_count: 60,
            requested_max_keep_alive_count: 20,
            max_notifications_per_publish: 0,
        }))
        .await;
    match modified {
        ServiceResponse::ModifySubscription(r) => assert_eq!(r.revised_publishing_interval, 250.0),
        other => panic!("unexpected response {other:?}"),
    }

    let deleted = f
        .call(ServiceRequest::DeleteSubscriptions(DeleteSubscriptionsRequest {
            request_header: RequestHeader::new(token.clone(), 12),
            subscription_ids: vec![subscription_id, 999],
        }))
        .await;
    match deleted {
        ServiceResponse::DeleteSubscriptions(r) => {
            assert_eq!(r.results, vec![StatusCode::Good, StatusCode::BadSubscriptionIdInvalid])
        }
        other => panic!("unexpected response {other:?}"),
    }

    assert_eq!(
        f.publish(
            &token,
            vec![SubscriptionAcknowledgement {
                subscription_id,
                sequence_number: first.sequence_number,
            }]
        )
        .await
        .service_result(),
        StatusCode::BadNoSubscription
    );
}

#[tokio::test(start_paused = true)]
async fn test_close_session_ends_it() {
    let f = fixture();
    let token = f.open_session().await;
    let subscription_id = f.create_subscription(&token).await;

    let response = f
        .call(ServiceRequest::CloseSession(CloseSessionRequest {
            request_header: RequestHeader::new(token.clone(), 13),
            delete_subscriptions: false,
        }))
        .await;
    assert_eq!(response.service_result(), StatusCode::Good);

    let ctx = f.dispatcher.context();
    assert!(ctx.subscriptions.session_of(subscription_id).is_none());
    assert!(ctx.sessions.is_empty());
    assert_eq!(
        f.read(&token, vec![ReadValueId::value_of(level())]).await.service_result(),
        StatusCode::BadSessionIdInvalid
    );
}
