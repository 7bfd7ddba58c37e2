//! RPC client implementation.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use docflow_protocol::{
    CorrelationId, DocumentService, Operation, Outcome, Reply, RequestEnvelope,
};
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::{Semaphore, mpsc, oneshot};
use tokio::time::{interval, timeout};
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, instrument, warn};

use crate::error::{ConnectionError, Error, ProtocolError, Result};
use crate::protocol::{Frame, FrameCodec, FrameType, MAX_FRAME_SIZE, codec};

/// Requests awaiting a response, keyed by correlation id.
type PendingRequests = DashMap<CorrelationId, oneshot::Sender<Reply>>;

/// Configuration for the RPC client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// How long to wait for a response before giving up on a request.
    pub request_timeout: Duration,
    /// How long to wait for the TCP connection to establish.
    pub connect_timeout: Duration,
    /// Maximum requests awaiting a response at once.
    pub max_in_flight: usize,
    /// Send a heartbeat frame this often, if set.
    pub heartbeat_interval: Option<Duration>,
    /// How many times a non-mutating operation is resent after a transport
    /// failure. Mutating operations are never resent.
    pub read_only_retries: u32,
    /// Maximum frame size.
    pub max_frame_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(5),
            max_in_flight: 100,
            heartbeat_interval: None,
            read_only_retries: 0,
            max_frame_size: MAX_FRAME_SIZE,
        }
    }
}

/// Builder for creating RPC clients.
#[derive(Debug, Default)]
pub struct ClientBuilder {
    config: ClientConfig,
}

impl ClientBuilder {
    /// Create a new client builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole configuration.
    #[must_use]
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the per-request timeout.
    #[must_use]
    pub const fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    /// Set the connect timeout.
    #[must_use]
    pub const fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Set the in-flight request limit. Zero is treated as one.
    #[must_use]
    pub const fn max_in_flight(mut self, max: usize) -> Self {
        self.config.max_in_flight = max;
        self
    }

    /// Enable heartbeats at the given interval.
    #[must_use]
    pub const fn heartbeat_interval(mut self, every: Duration) -> Self {
        self.config.heartbeat_interval = Some(every);
        self
    }

    /// Set how often read-only operations are retried after transport
    /// failures.
    #[must_use]
    pub const fn read_only_retries(mut self, retries: u32) -> Self {
        self.config.read_only_retries = retries;
        self
    }

    /// Set the maximum frame size.
    #[must_use]
    pub const fn max_frame_size(mut self, size: usize) -> Self {
        self.config.max_frame_size = size;
        self
    }

    /// Connect to a server over TCP.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established in time.
    #[instrument(skip(self))]
    pub async fn connect(self, addr: SocketAddr) -> Result<RpcClient> {
        let stream = timeout(self.config.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| Error::Timeout(self.config.connect_timeout))?
            .map_err(|source| ConnectionError::ConnectFailed { addr, source })?;
        stream.set_nodelay(true)?;

        debug!("Connected to {}", addr);

        Ok(self.attach(stream))
    }

    /// Run the client over an already-established stream.
    ///
    /// Must be called within a tokio runtime.
    pub fn attach<T>(self, stream: T) -> RpcClient
    where
        T: AsyncRead + AsyncWrite + Send + 'static,
    {
        let mut config = self.config;
        // A zero-permit semaphore would block every request forever.
        config.max_in_flight = config.max_in_flight.max(1);
        let codec = FrameCodec::new().with_max_frame_size(config.max_frame_size);
        let (read_half, write_half) = tokio::io::split(stream);

        let (frames_tx, frames_rx) = mpsc::channel(config.max_in_flight);
        let pending = Arc::new(PendingRequests::new());
        let connection = CancellationToken::new();
        let shutdown = CancellationToken::new();

        tokio::spawn(read_loop(
            FramedRead::new(read_half, codec),
            Arc::clone(&pending),
            connection.clone(),
            shutdown.clone(),
        ));
        tokio::spawn(write_loop(
            FramedWrite::new(write_half, codec),
            frames_rx,
            connection.clone(),
            shutdown.clone(),
        ));
        if let Some(every) = config.heartbeat_interval {
            tokio::spawn(heartbeat_loop(
                frames_tx.clone(),
                every,
                connection.clone(),
                shutdown.clone(),
            ));
        }

        RpcClient {
            inner: Arc::new(Inner {
                in_flight: Semaphore::new(config.max_in_flight),
                config,
                pending,
                frames: frames_tx,
                connection,
                shutdown,
            }),
        }
    }
}

/// RPC client for a document service.
///
/// Cloning is cheap; clones share one connection. The connection is closed
/// once the last clone is dropped or [`RpcClient::shutdown`] is called.
#[derive(Clone, Debug)]
pub struct RpcClient {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    config: ClientConfig,
    pending: Arc<PendingRequests>,
    frames: mpsc::Sender<Frame>,
    in_flight: Semaphore,
    /// Cancelled once the connection is gone for any reason.
    connection: CancellationToken,
    shutdown: CancellationToken,
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl RpcClient {
    /// Create a new client builder.
    #[must_use]
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Connect with the default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub async fn connect(addr: SocketAddr) -> Result<Self> {
        ClientBuilder::new().connect(addr).await
    }

    /// Send one request under a caller-chosen correlation id and wait for
    /// its response.
    ///
    /// This never retries.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::DuplicateId`] if `id` is already in flight,
    /// a transport error if no response arrives, or [`Error::Service`] if the
    /// service reports a failure.
    #[instrument(skip(self, operation), fields(operation = operation.name()))]
    pub async fn execute_with_id(&self, id: CorrelationId, operation: Operation) -> Result<Outcome> {
        let inner = &self.inner;
        if inner.shutdown.is_cancelled() {
            return Err(ConnectionError::ShuttingDown.into());
        }

        let _permit = inner
            .in_flight
            .acquire()
            .await
            .map_err(|_| Error::ChannelClosed)?;

        let payload = codec::encode(&RequestEnvelope::new(id, operation))?;
        let (response_tx, response_rx) = oneshot::channel();

        match inner.pending.entry(id) {
            Entry::Occupied(_) => return Err(ProtocolError::DuplicateId(id).into()),
            Entry::Vacant(slot) => {
                slot.insert(response_tx);
            }
        }

        // The reader clears the map when the connection drops; anything
        // registered afterwards would wait forever.
        if inner.connection.is_cancelled() {
            inner.pending.remove(&id);
            return Err(ConnectionError::Closed.into());
        }

        if inner
            .frames
            .send(Frame::new(FrameType::Request, payload))
            .await
            .is_err()
        {
            inner.pending.remove(&id);
            return Err(ConnectionError::Closed.into());
        }

        debug!("Sent request {} (pending: {})", id, inner.pending.len());

        match timeout(inner.config.request_timeout, response_rx).await {
            Ok(Ok(reply)) => reply.into_result().map_err(Error::from),
            Ok(Err(_)) => Err(ConnectionError::Closed.into()),
            Err(_) => {
                inner.pending.remove(&id);
                warn!("Request {} timed out", id);
                Err(Error::Timeout(inner.config.request_timeout))
            }
        }
    }

    /// Number of requests awaiting a response.
    #[must_use]
    pub fn pending_requests(&self) -> usize {
        self.inner.pending.len()
    }

    /// Whether the connection is still up.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        !self.inner.connection.is_cancelled()
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Close the connection. Pending requests fail with a connection error.
    pub fn shutdown(&self) {
        debug!("Shutting down RPC client");
        self.inner.shutdown.cancel();
    }
}

#[async_trait]
impl DocumentService for RpcClient {
    type Error = Error;

    /// Executes an operation, resending non-mutating operations after
    /// transport failures up to `read_only_retries` times.
    async fn execute(&self, operation: Operation) -> Result<Outcome> {
        let retries = if operation.is_mutating() {
            0
        } else {
            self.inner.config.read_only_retries
        };

        let mut attempt = 0;
        loop {
            match self
                .execute_with_id(CorrelationId::new(), operation.clone())
                .await
            {
                Err(e) if e.is_transport() && attempt < retries => {
                    attempt += 1;
                    warn!(
                        "Retrying {} after transport failure ({}/{}): {}",
                        operation.name(),
                        attempt,
                        retries,
                        e
                    );
                }
                result => return result,
            }
        }
    }
}

async fn read_loop<R>(
    mut reader: FramedRead<R, FrameCodec>,
    pending: Arc<PendingRequests>,
    connection: CancellationToken,
    shutdown: CancellationToken,
) where
    R: AsyncRead + Unpin,
{
    loop {
        let frame = tokio::select! {
            () = shutdown.cancelled() => break,
            () = connection.cancelled() => break,
            frame = reader.next() => frame,
        };

        match frame {
            Some(Ok(frame)) => match frame.frame_type {
                FrameType::Response => dispatch(&pending, &frame.payload),
                FrameType::Heartbeat => debug!("Heartbeat acknowledged"),
                FrameType::Close => {
                    debug!("Server closed the connection");
                    break;
                }
                FrameType::Request => {
                    error!(
                        "Closing connection: {}",
                        ProtocolError::UnexpectedFrame(frame.frame_type)
                    );
                    break;
                }
            },
            Some(Err(e)) => {
                error!("Connection read failed: {}", e);
                break;
            }
            None => {
                debug!("Connection closed by server");
                break;
            }
        }
    }

    connection.cancel();

    // Dropping the senders fails every waiter with a connection error.
    let failed = pending.len();
    pending.clear();
    if failed > 0 {
        warn!("Connection lost with {} requests pending", failed);
    }
}

fn dispatch(pending: &PendingRequests, payload: &[u8]) {
    match codec::decode_response(payload) {
        Ok(response) => match pending.remove(&response.id) {
            Some((_, waiter)) => {
                // The waiter may have timed out in the meantime.
                let _ = waiter.send(response.reply);
            }
            None => warn!("Received response for unknown request: {}", response.id),
        },
        Err(e) => error!("Failed to decode response: {}", e),
    }
}

async fn write_loop<W>(
    mut writer: FramedWrite<W, FrameCodec>,
    mut frames: mpsc::Receiver<Frame>,
    connection: CancellationToken,
    shutdown: CancellationToken,
) where
    W: AsyncWrite + Unpin,
{
    loop {
        tokio::select! {
            () = shutdown.cancelled() => {
                if let Err(e) = writer.send(Frame::close()).await {
                    debug!("Failed to send close frame: {}", e);
                }
                break;
            }
            () = connection.cancelled() => break,
            frame = frames.recv() => {
                let Some(frame) = frame else { break };
                if let Err(e) = writer.send(frame).await {
                    error!("Connection write failed: {}", e);
                    break;
                }
            }
        }
    }

    connection.cancel();
}

async fn heartbeat_loop(
    frames: mpsc::Sender<Frame>,
    every: Duration,
    connection: CancellationToken,
    shutdown: CancellationToken,
) {
    let mut ticker = interval(every);
    ticker.tick().await;

    loop {
        tokio::select! {
            () = shutdown.cancelled() => break,
            () = connection.cancelled() => break,
            _ = ticker.tick() => {
                if frames.send(Frame::heartbeat()).await.is_err() {
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();

        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.max_in_flight, 100);
        assert_eq!(config.read_only_retries, 0);
        assert!(config.heartbeat_interval.is_none());
    }

    #[tokio::test]
    async fn test_builder_applies_settings() {
        let (stream, _peer) = tokio::io::duplex(1024);

        let client = RpcClient::builder()
            .request_timeout(Duration::from_millis(250))
            .max_in_flight(4)
            .read_only_retries(2)
            .attach(stream);

        assert_eq!(client.config().request_timeout, Duration::from_millis(250));
        assert_eq!(client.config().max_in_flight, 4);
        assert!(client.is_connected());
    }

    #[tokio::test]
    async fn test_zero_in_flight_limit_still_sends() {
        let (stream, server_side) = tokio::io::duplex(64 * 1024);
        let client = RpcClient::builder()
            .max_in_flight(0)
            .request_timeout(Duration::from_secs(5))
            .attach(stream);
        assert_eq!(client.config().max_in_flight, 1);

        let (read_half, _write_half) = tokio::io::split(server_side);
        let mut requests = FramedRead::new(read_half, FrameCodec::new());
        let sent = tokio::spawn({
            let client = client.clone();
            async move {
                client
                    .execute_with_id(CorrelationId::new(), Operation::ListDocuments)
                    .await
            }
        });

        let frame = tokio::time::timeout(Duration::from_secs(5), requests.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(frame.frame_type, FrameType::Request);

        client.shutdown();
        assert!(sent.await.unwrap().is_err());
    }

    #[tokio::test]
    async fn test_shutdown_rejects_new_requests() {
        let (stream, _peer) = tokio::io::duplex(1024);
        let client = RpcClient::builder().attach(stream);

        client.shutdown();

        let err = client
            .execute_with_id(CorrelationId::new(), Operation::ListDocuments)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Connection(ConnectionError::ShuttingDown)
        ));
    }
}
