use std::net::SocketAddr;
use std::time::Duration;

use futures::SinkExt;
use futures::StreamExt;
use tokio::net::TcpListener;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::codec::Framed;
use ua_engine::ActivateSessionRequest;
use ua_engine::CreateSessionRequest;
use ua_engine::Frame;
use ua_engine::HelloMessage;
use ua_engine::MessageSecurityMode;
use ua_engine::NodeId;
use ua_engine::OpenSecureChannelRequest;
use ua_engine::RequestHeader;
use ua_engine::Result;
use ua_engine::SecureRequest;
use ua_engine::SecurityTokenRequestType;
use ua_engine::ServerBuilder;
use ua_engine::ServerConfig;
use ua_engine::ServerContext;
use ua_engine::ServiceRequest;
use ua_engine::ServiceResponse;
use ua_engine::StatusCode;
use ua_engine::UaCodec;
use ua_engine::UserIdentityToken;
use ua_engine::SECURITY_POLICY_NONE_URI;

pub const MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// Upper bound for any single server reply in these tests.
pub const REPLY_TIMEOUT: Duration = Duration::from_secs(5);

pub struct TestServer {
    pub addr: SocketAddr,
    pub ctx: std::sync::Arc<ServerContext>,
    shutdown_tx: watch::Sender<()>,
    handle: JoinHandle<Result<()>>,
}

impl TestServer {
    pub async fn start(config: ServerConfig) -> Result<Self> {
        let (shutdown_tx, shutdown_rx) = watch::channel(());
        let server = ServerBuilder::init(config, shutdown_rx).build()?.ready()?;
        let ctx = server.context().clone();

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let handle = tokio::spawn(server.serve(listener));

        Ok(Self {
            addr,
            ctx,
            shutdown_tx,
            handle,
        })
    }

    pub async fn stop(self) -> Result<()> {
        let _ = self.shutdown_tx.send(());
        self.handle.await.expect("server task panicked")
    }
}

pub struct TestClient {
    framed: Framed<TcpStream, UaCodec>,
    channel_id: u32,
    token_id: u32,
    next_request_id: u32,
    pub auth_token: NodeId,
}

impl TestClient {
    /// TCP connect plus HEL/ACK; no secure channel yet.
    pub async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.expect("connect");
        let mut framed = Framed::new(stream, UaCodec::client(MAX_MESSAGE_SIZE));
        framed
            .send(Frame::Hello(HelloMessage {
                protocol_version: 0,
                receive_buffer_size: 65_535,
                send_buffer_size: 65_535,
                max_message_size: 0,
                max_chunk_count: 0,
                endpoint_url: format!("opc.tcp://{addr}"),
            }))
            .await
            .expect("send HEL");

        let mut client = Self {
            framed,
            channel_id: 0,
            token_id: 0,
            next_request_id: 1,
            auth_token: NodeId::numeric(0, 0),
        };
        match client.recv().await {
            Some(Frame::Acknowledge(_)) => client,
            other => panic!("expected ACK, got {other:?}"),
        }
    }

    pub async fn recv(&mut self) -> Option<Frame> {
        match timeout(REPLY_TIMEOUT, self.framed.next()).await {
            Ok(Some(Ok(frame))) => Some(frame),
            Ok(Some(Err(e))) => panic!("bad frame: {e}"),
            Ok(None) => None,
            Err(_) => panic!("no reply within {REPLY_TIMEOUT:?}"),
        }
    }

    pub async fn open_channel(&mut self) {
        let request_id = self.request_id();
        self.framed
            .send(Frame::OpenRequest(OpenSecureChannelRequest {
                request_id,
                channel_id: 0,
                token_id: 0,
                request_type: SecurityTokenRequestType::Issue,
                security_policy_uri: SECURITY_POLICY_NONE_URI.into(),
                security_mode: MessageSecurityMode::None,
                requested_lifetime: 0,
            }))
            .await
            .expect("send OPN");

        match self.recv().await {
            Some(Frame::OpenResponse(response)) => {
                assert_eq!(response.service_result, StatusCode::Good);
                let token = response.security_token.expect("security token");
                self.channel_id = token.channel_id;
                self.token_id = token.token_id;
            }
            other => panic!("expected OPN response, got {other:?}"),
        }
    }

    /// Channel, CreateSession and anonymous ActivateSession.
    pub async fn open_session(&mut self) {
        self.open_channel().await;

        let response = self
            .call(ServiceRequest::CreateSession(CreateSessionRequest {
                request_header: RequestHeader::anonymous(0),
                session_name: "integration".into(),
                endpoint_url: String::new(),
                requested_session_timeout: 30_000.0,
            }))
            .await;
        self.auth_token = match response {
            ServiceResponse::CreateSession(r) => r.authentication_token,
            other => panic!("CreateSession failed: {other:?}"),
        };

        let response = self
            .call(ServiceRequest::ActivateSession(ActivateSessionRequest {
                request_header: self.header(),
                user_identity_token: UserIdentityToken::Anonymous {
                    policy_id: "anonymous".into(),
                },
            }))
            .await;
        assert_eq!(response.service_result(), StatusCode::Good);
    }

    pub fn header(&self) -> RequestHeader {
        RequestHeader::new(self.auth_token.clone(), self.next_request_id)
    }

    pub async fn call(
        &mut self,
        body: ServiceRequest,
    ) -> ServiceResponse {
        let request_id = self.request_id();
        self.framed
            .send(Frame::Request(SecureRequest {
                channel_id: self.channel_id,
                token_id: self.token_id,
                request_id,
                body,
            }))
            .await
            .expect("send MSG");

        match self.recv().await {
            Some(Frame::Response(response)) => {
                assert_eq!(response.request_id, request_id);
                response.body
            }
            other => panic!("expected MSG response, got {other:?}"),
        }
    }

    fn request_id(&mut self) -> u32 {
        let id = self.next_request_id;
        self.next_request_id += 1;
        id
    }
}
