use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::SinkExt;
use futures::StreamExt;
use tokio::io::AsyncRead;
use tokio::io::AsyncWrite;
use tokio::sync::mpsc;
use tokio::sync::watch;
use tokio::time::timeout;
use tokio_util::codec::FramedRead;
use tokio_util::codec::FramedWrite;
use tracing::debug;
use tracing::info;
use tracing::instrument;
use tracing::trace;
use tracing::warn;

use super::EndpointUrl;
use super::Frame;
use super::UaCodec;
use crate::AcknowledgeMessage;
use crate::ChannelError;
use crate::CloseSecureChannelRequest;
use crate::Error;
use crate::ErrorMessage;
use crate::HelloMessage;
use crate::NetworkConfig;
use crate::NetworkError;
use crate::OpenSecureChannelRequest;
use crate::OpenSecureChannelResponse;
use crate::RequestDispatcher;
use crate::Result;
use crate::SecureRequest;
use crate::SecureResponse;
use crate::SecurityTokenRequestType;
use crate::ServerContext;
use crate::ServiceResponse;
use crate::StatusCode;
use crate::PROTOCOL_VERSION;

/// Responses queued for the writer before dispatch tasks start waiting.
const RESPONSE_QUEUE_DEPTH: usize = 64;

/// Buffer and message limits agreed in the HEL/ACK exchange.
pub fn negotiate(
    config: &NetworkConfig,
    hello: &HelloMessage,
) -> AcknowledgeMessage {
    let server_max = config.max_message_size.min(u32::MAX as usize) as u32;
    let max_message_size = match hello.max_message_size {
        0 => server_max,
        client_max => client_max.min(server_max),
    };

    AcknowledgeMessage {
        protocol_version: PROTOCOL_VERSION,
        receive_buffer_size: config.receive_buffer_size.min(hello.send_buffer_size),
        send_buffer_size: config.send_buffer_size.min(hello.receive_buffer_size),
        max_message_size,
        max_chunk_count: 1,
    }
}

/// Drives one client connection until the peer leaves, a transport error occurs,
/// or the server shuts down. The secure channel opened on the connection is closed
/// on the way out, cascading to its sessions.
#[instrument(skip(stream, dispatcher, shutdown))]
pub async fn handle_connection<S>(
    stream: S,
    peer: SocketAddr,
    dispatcher: RequestDispatcher,
    shutdown: watch::Receiver<()>,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let ctx = dispatcher.context().clone();
    let network = ctx.config.network.clone();
    let (read_half, write_half) = tokio::io::split(stream);
    let mut reader = FramedRead::new(read_half, UaCodec::server(network.max_message_size));
    let mut writer = FramedWrite::new(write_half, UaCodec::server(network.max_message_size));

    let hello = match timeout(Duration::from_millis(network.hello_timeout_ms), reader.next()).await {
        Ok(Some(Ok(Frame::Hello(hello)))) => hello,
        Ok(Some(Ok(other))) => {
            return fail(
                &mut writer,
                NetworkError::UnexpectedMessage {
                    expected: "HEL",
                    actual: other.kind(),
                }
                .into(),
            )
            .await
        }
        Ok(Some(Err(e))) => return fail(&mut writer, e).await,
        Ok(None) => return Ok(()),
        Err(_) => return fail(&mut writer, NetworkError::HelloTimeout(network.hello_timeout_ms).into()).await,
    };

    if let Err(e) = check_endpoint(&ctx, &hello) {
        return fail(&mut writer, e).await;
    }

    let ack = negotiate(&network, &hello);
    debug!(?ack, "HEL accepted");
    let limit = ack.max_message_size as usize;
    writer.send(Frame::Acknowledge(ack)).await?;
    reader.decoder_mut().set_max_message_size(limit);
    writer.encoder_mut().set_max_message_size(limit);

    let (tx, mut rx) = mpsc::channel::<Frame>(RESPONSE_QUEUE_DEPTH);
    let writer_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            trace!(kind = frame.kind(), "writing frame");
            writer.send(frame).await?;
        }
        Ok::<(), Error>(())
    });

    let mut connection = Connection {
        ctx: ctx.clone(),
        dispatcher,
        responses: tx,
        channel_id: None,
    };
    let result = connection.serve(&mut reader, shutdown).await;

    if let Some(channel_id) = connection.channel_id.take() {
        ctx.close_channel(channel_id);
    }
    // in-flight dispatch tasks keep their own senders; the writer drains them
    drop(connection);
    if let Err(e) = writer_task.await? {
        debug!("writer stopped: {e}");
    }
    info!("connection closed");
    result
}

fn check_endpoint(
    ctx: &ServerContext,
    hello: &HelloMessage,
) -> Result<()> {
    let requested = EndpointUrl::parse(&hello.endpoint_url)?;
    let served = EndpointUrl::parse(&ctx.config.endpoint.endpoint_url())?;
    if !requested.same_endpoint(&served) {
        return Err(NetworkError::InvalidEndpointUrl(format!("{requested} is not served here")).into());
    }
    Ok(())
}

/// Reports a transport error to the peer with ERR, then ends the connection with it.
async fn fail<W>(
    writer: &mut FramedWrite<W, UaCodec>,
    error: Error,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    warn!("closing connection: {error}");
    let frame = Frame::Error(ErrorMessage {
        error: error.status_code(),
        reason: error.to_string(),
    });
    if let Err(e) = writer.send(frame).await {
        debug!("failed to send ERR: {e}");
    }
    Err(error)
}

struct Connection {
    ctx: Arc<ServerContext>,
    dispatcher: RequestDispatcher,
    responses: mpsc::Sender<Frame>,
    channel_id: Option<u32>,
}

impl Connection {
    async fn serve<R>(
        &mut self,
        reader: &mut FramedRead<R, UaCodec>,
        mut shutdown: watch::Receiver<()>,
    ) -> Result<()>
    where
        R: AsyncRead + Unpin,
    {
        loop {
            let frame = tokio::select! {
                _ = shutdown.changed() => {
                    debug!("server shutting down");
                    return Ok(());
                }
                frame = reader.next() => frame,
            };

            let frame = match frame {
                None => {
                    debug!("peer closed the connection");
                    return Ok(());
                }
                Some(Err(e)) => return self.fail(e).await,
                Some(Ok(frame)) => frame,
            };

            match frame {
                Frame::OpenRequest(request) => {
                    let response = self.open(request);
                    self.send(Frame::OpenResponse(response)).await?;
                }
                Frame::Request(request) => self.on_request(request).await?,
                Frame::Close(request) => {
                    self.close(request);
                    return Ok(());
                }
                other => {
                    return self
                        .fail(
                            NetworkError::UnexpectedMessage {
                                expected: "OPN, MSG or CLO",
                                actual: other.kind(),
                            }
                            .into(),
                        )
                        .await
                }
            }
        }
    }

    async fn send(
        &self,
        frame: Frame,
    ) -> Result<()> {
        self.responses
            .send(frame)
            .await
            .map_err(|_| NetworkError::ConnectionClosed.into())
    }

    async fn fail(
        &self,
        error: Error,
    ) -> Result<()> {
        warn!("closing connection: {error}");
        let frame = Frame::Error(ErrorMessage {
            error: error.status_code(),
            reason: error.to_string(),
        });
        if self.send(frame).await.is_err() {
            debug!("writer already gone, ERR not sent");
        }
        Err(error)
    }

    fn open(
        &mut self,
        request: OpenSecureChannelRequest,
    ) -> OpenSecureChannelResponse {
        let outcome = match request.request_type {
            SecurityTokenRequestType::Issue => match self.channel_id {
                Some(existing) => {
                    warn!(channel_id = existing, "issue requested on a connection that already owns a channel");
                    Err(StatusCode::BadSecurityChecksFailed)
                }
                None => self
                    .ctx
                    .channels
                    .open_channel(
                        &request.security_policy_uri,
                        request.security_mode,
                        request.requested_lifetime,
                    )
                    .map(|token| {
                        self.channel_id = Some(token.channel_id);
                        token
                    })
                    .map_err(|e| e.status_code()),
            },
            SecurityTokenRequestType::Renew => self.renew(&request).map_err(|e| e.status_code()),
        };

        match outcome {
            Ok(token) => OpenSecureChannelResponse {
                request_id: request.request_id,
                service_result: StatusCode::Good,
                server_protocol_version: PROTOCOL_VERSION,
                security_token: Some(token),
            },
            Err(status) => OpenSecureChannelResponse {
                request_id: request.request_id,
                service_result: status,
                server_protocol_version: PROTOCOL_VERSION,
                security_token: None,
            },
        }
    }

    fn renew(
        &mut self,
        request: &OpenSecureChannelRequest,
    ) -> std::result::Result<crate::ChannelSecurityToken, ChannelError> {
        if self.channel_id != Some(request.channel_id) {
            return Err(ChannelError::Invalid(request.channel_id));
        }
        let renewed = self
            .ctx
            .channels
            .renew_token(request.channel_id, request.token_id, request.requested_lifetime);
        if let Err(ChannelError::Expired { channel_id, .. }) = &renewed {
            self.release_channel(*channel_id);
        }
        renewed
    }

    /// Validates the channel and hands the request to its own task so a parked
    /// Publish never holds up other requests on this connection.
    async fn on_request(
        &mut self,
        request: SecureRequest,
    ) -> Result<()> {
        let validated = match self.channel_id {
            Some(channel_id) if channel_id == request.channel_id => {
                self.ctx.channels.validate(channel_id, request.token_id)
            }
            _ => Err(ChannelError::Invalid(request.channel_id)),
        };

        if let Err(e) = validated {
            warn!(channel_id = request.channel_id, "rejecting request: {e}");
            if let ChannelError::Expired { channel_id, .. } = e {
                self.release_channel(channel_id);
            }
            let body = ServiceResponse::fault(request.body.request_header(), e.status_code());
            return self.send(Frame::Response(respond_to(&request, body))).await;
        }

        let dispatcher = self.dispatcher.clone();
        let responses = self.responses.clone();
        tokio::spawn(async move {
            let SecureRequest {
                channel_id,
                token_id,
                request_id,
                body,
            } = request;
            let body = dispatcher.dispatch(channel_id, body).await;
            let frame = Frame::Response(SecureResponse {
                channel_id,
                token_id,
                request_id,
                body,
            });
            if responses.send(frame).await.is_err() {
                debug!(request_id, "connection gone before response was written");
            }
        });
        Ok(())
    }

    fn close(
        &mut self,
        request: CloseSecureChannelRequest,
    ) {
        match self.channel_id {
            Some(channel_id) if channel_id == request.channel_id => {
                debug!(channel_id, "CLO received");
                self.release_channel(channel_id);
            }
            _ => warn!(channel_id = request.channel_id, "CLO for a channel not owned by this connection"),
        }
    }

    fn release_channel(
        &mut self,
        channel_id: u32,
    ) {
        self.ctx.close_channel(channel_id);
        if self.channel_id == Some(channel_id) {
            self.channel_id = None;
        }
    }
}

fn respond_to(
    request: &SecureRequest,
    body: ServiceResponse,
) -> SecureResponse {
    SecureResponse {
        channel_id: request.channel_id,
        token_id: request.token_id,
        request_id: request.request_id,
        body,
    }
}
