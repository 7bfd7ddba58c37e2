//! RPC server implementation.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use docflow_protocol::{DocumentService, Reply, ResponseEnvelope, ServiceError};
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::{Semaphore, mpsc};
use tokio::time::timeout;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::error::{Error, ProtocolError, Result};
use crate::protocol::{Frame, FrameCodec, FrameType, IncomingRequest, MAX_FRAME_SIZE, codec};

/// Configuration for the RPC server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Close a connection after this long without any frame.
    pub idle_timeout: Duration,
    /// Maximum frame size.
    pub max_frame_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_connections: 100,
            idle_timeout: Duration::from_secs(300),
            max_frame_size: MAX_FRAME_SIZE,
        }
    }
}

/// Serves a [`DocumentService`] to RPC clients.
///
/// Every request runs in its own task, so responses on one connection may
/// complete in any order; clients match them by correlation id.
#[derive(Debug)]
pub struct RpcServer<S> {
    service: S,
    config: ServerConfig,
    connections: Arc<Semaphore>,
    shutdown: CancellationToken,
}

impl<S> RpcServer<S>
where
    S: DocumentService<Error = ServiceError> + Clone,
{
    /// Create a new RPC server.
    pub fn new(service: S, config: ServerConfig) -> Self {
        Self {
            connections: Arc::new(Semaphore::new(config.max_connections)),
            service,
            config,
            shutdown: CancellationToken::new(),
        }
    }

    /// Token that stops the server when cancelled.
    #[must_use]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Stop accepting connections and end the open ones.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Bind to `addr` and serve until shut down.
    ///
    /// # Errors
    ///
    /// Returns an error if the server fails to bind.
    pub async fn serve(self, addr: SocketAddr) -> Result<()> {
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            std::io::Error::new(e.kind(), format!("Failed to bind to {addr}: {e}"))
        })?;

        self.serve_listener(listener).await
    }

    /// Serve connections from an already-bound listener until shut down.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener address cannot be read.
    #[instrument(skip_all)]
    pub async fn serve_listener(self, listener: TcpListener) -> Result<()> {
        info!("RPC server listening on {}", listener.local_addr()?);

        let server = Arc::new(self);

        loop {
            tokio::select! {
                () = server.shutdown.cancelled() => {
                    info!("Server shutdown requested");
                    break;
                }
                accept_result = listener.accept() => {
                    match accept_result {
                        Ok((stream, addr)) => {
                            match Arc::clone(&server.connections).try_acquire_owned() {
                                Ok(permit) => {
                                    if let Err(e) = stream.set_nodelay(true) {
                                        debug!("Failed to set TCP_NODELAY for {}: {}", addr, e);
                                    }

                                    let server = Arc::clone(&server);
                                    tokio::spawn(async move {
                                        debug!("New connection from {}", addr);
                                        if let Err(e) = server.serve_connection(stream).await {
                                            error!("Connection error from {}: {}", addr, e);
                                        }
                                        drop(permit);
                                    });
                                }
                                Err(_) => {
                                    warn!("Max connections reached, rejecting connection from {}", addr);
                                }
                            }
                        }
                        Err(e) => {
                            error!("Failed to accept connection: {}", e);
                        }
                    }
                }
            }
        }

        Ok(())
    }

    /// Serve one connection over any byte stream.
    ///
    /// Returns when the client sends a close frame or disconnects, the
    /// connection idles out, or the server is shut down. Responses for
    /// requests still executing at that point are written before returning.
    ///
    /// # Errors
    ///
    /// Returns an error if an invalid frame is received.
    pub async fn serve_connection<T>(&self, stream: T) -> Result<()>
    where
        T: AsyncRead + AsyncWrite + Send + 'static,
    {
        let codec = FrameCodec::new().with_max_frame_size(self.config.max_frame_size);
        let (read_half, write_half) = tokio::io::split(stream);
        let mut reader = FramedRead::new(read_half, codec);

        let (responses_tx, responses_rx) = mpsc::channel(64);
        let writer = tokio::spawn(write_responses(
            FramedWrite::new(write_half, codec),
            responses_rx,
        ));

        let mut result = Ok(());

        loop {
            let next = tokio::select! {
                () = self.shutdown.cancelled() => {
                    if responses_tx.send(Frame::close()).await.is_err() {
                        debug!("Connection already gone at shutdown");
                    }
                    break;
                }
                next = timeout(self.config.idle_timeout, reader.next()) => next,
            };

            match next {
                Ok(Some(Ok(frame))) => match frame.frame_type {
                    FrameType::Request => self.spawn_request(frame.payload, responses_tx.clone()),
                    FrameType::Heartbeat => {
                        let pong = Frame::new_unchecked(FrameType::Heartbeat, frame.payload);
                        if responses_tx.send(pong).await.is_err() {
                            break;
                        }
                    }
                    FrameType::Close => {
                        debug!("Client requested close");
                        break;
                    }
                    FrameType::Response => {
                        let e = Error::from(ProtocolError::UnexpectedFrame(frame.frame_type));
                        error!("Frame error: {}", e);
                        result = Err(e);
                        break;
                    }
                },
                Ok(Some(Err(e))) => {
                    error!("Frame error: {}", e);
                    result = Err(e);
                    break;
                }
                Ok(None) => {
                    debug!("Connection closed by client");
                    break;
                }
                Err(_) => {
                    warn!("Connection idle for {:?}, closing", self.config.idle_timeout);
                    break;
                }
            }
        }

        drop(responses_tx);
        if let Err(e) = writer.await {
            error!("Response writer failed: {}", e);
        }

        result
    }

    fn spawn_request(&self, payload: Bytes, responses: mpsc::Sender<Frame>) {
        let service = self.service.clone();

        tokio::spawn(async move {
            let response = match codec::decode_request(&payload) {
                Ok(IncomingRequest::Valid(request)) => {
                    let name = request.operation.name();
                    debug!("Handling {} request {}", name, request.id);

                    let result = service.execute(request.operation).await;
                    if let Err(e) = &result {
                        debug!("{} request {} failed: {}", name, request.id, e);
                    }
                    ResponseEnvelope::new(request.id, result)
                }
                Ok(IncomingRequest::Rejected { id, error }) => {
                    warn!("Rejected request {}: {}", id, error);
                    ResponseEnvelope::new(id, Reply::Failure(error))
                }
                Err(e) => {
                    error!("Dropping undecodable request: {}", e);
                    return;
                }
            };

            let id = response.id;
            match codec::encode(&response) {
                Ok(bytes) => {
                    if responses
                        .send(Frame::new(FrameType::Response, bytes))
                        .await
                        .is_err()
                    {
                        debug!("Connection closed before response {} was sent", id);
                    }
                }
                Err(e) => error!("Failed to encode response {}: {}", id, e),
            }
        });
    }
}

async fn write_responses<W>(mut writer: FramedWrite<W, FrameCodec>, mut frames: mpsc::Receiver<Frame>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(frame) = frames.recv().await {
        if let Err(e) = writer.send(frame).await {
            error!("Failed to send response: {}", e);
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();

        assert_eq!(config.max_connections, 100);
        assert_eq!(config.max_frame_size, MAX_FRAME_SIZE);
    }
}
