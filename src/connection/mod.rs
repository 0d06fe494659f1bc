// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! This module implements the multiplexed CQL connection: the handshake state
//! machine, one reader and one writer task over a split socket, the in-flight
//! request table keyed by stream id, event fan-out, and the prepared statement
//! lifecycle.

mod error;
mod prepared;
mod streams;
#[cfg(test)]
mod tests;

use crate::{
    compression::{
        Compression,
        Uncompressed,
    },
    frame::{
        header::ProtocolVersion,
        AllowAllAuth,
        AuthResponseFrameBuilder,
        Authenticator,
        BatchFrame,
        Binder,
        Consistency,
        EventFrame,
        Header,
        OptionsFrame,
        PrepareFrame,
        PreparedResult,
        QueryFlags,
        QueryFrame,
        RegisterEventType,
        RegisterFrameBuilder,
        RequestFrame,
        ResponseBody,
        ResponseFrame,
        ResultBodyKind,
        RowsResult,
        SchemaChangeResult,
        StartupFrameBuilder,
        Values,
        MAX_FRAME_LENGTH,
    },
};
use anyhow::{
    anyhow,
    bail,
};
pub use error::RequestError;
pub use prepared::PreparedStatement;
use std::{
    convert::TryFrom,
    marker::PhantomData,
    net::SocketAddr,
    sync::{
        atomic::{
            AtomicBool,
            AtomicU8,
            Ordering,
        },
        Arc,
        Mutex,
    },
    time::Duration,
};
use streams::Streams;
use tokio::{
    io::{
        AsyncReadExt,
        AsyncWriteExt,
    },
    net::{
        tcp::{
            OwnedReadHalf,
            OwnedWriteHalf,
        },
        TcpSocket,
        TcpStream,
    },
    sync::{
        broadcast,
        mpsc,
        oneshot,
    },
    task::JoinHandle,
};

/// The default native protocol port.
pub const DEFAULT_PORT: u16 = 9042;
/// The protocol allows stream ids in `[0, 32768)`.
pub const MAX_STREAMS: u16 = 32768;

/// The lifecycle of a connection.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    Disconnected = 0,
    TcpConnected = 1,
    OptionsSent = 2,
    StartupSent = 3,
    Authenticating = 4,
    Ready = 5,
    Closing = 6,
    Closed = 7,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Disconnected,
            1 => Self::TcpConnected,
            2 => Self::OptionsSent,
            3 => Self::StartupSent,
            4 => Self::Authenticating,
            5 => Self::Ready,
            6 => Self::Closing,
            _ => Self::Closed,
        }
    }
}

/// Per-request parameters, mirroring the query parameter grammar. Values may
/// be bound positionally or by name through the [`Binder`] impl.
#[derive(Clone, Debug, Default)]
pub struct QueryParams {
    /// The consistency level; defaults to LOCAL_ONE.
    pub consistency: Consistency,
    /// The bound values.
    pub values: Values,
    /// The page size, when paging is wanted.
    pub page_size: Option<i32>,
    /// An opaque paging cursor from a previous Rows result.
    pub paging_state: Option<Vec<u8>>,
    /// The serial consistency for conditional updates.
    pub serial_consistency: Option<Consistency>,
    /// The default timestamp, in microseconds.
    pub timestamp: Option<i64>,
    /// Ask the server to omit result metadata.
    pub skip_metadata: bool,
}

impl QueryParams {
    /// Set the consistency level.
    pub fn consistency(mut self, consistency: Consistency) -> Self {
        self.consistency = consistency;
        self
    }

    /// Set the page size.
    pub fn page_size(mut self, page_size: i32) -> Self {
        self.page_size = Some(page_size);
        self
    }

    /// Resume from an opaque paging state.
    pub fn paging_state(mut self, paging_state: Vec<u8>) -> Self {
        self.paging_state = Some(paging_state);
        self
    }

    /// Set the serial consistency level.
    pub fn serial_consistency(mut self, consistency: Consistency) -> Self {
        self.serial_consistency = Some(consistency);
        self
    }

    /// Set the default timestamp.
    pub fn timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Skip the result metadata.
    pub fn skip_metadata(mut self) -> Self {
        self.skip_metadata = true;
        self
    }
}

impl Binder for QueryParams {
    type Error = RequestError;

    fn bind_cell(mut self, name: Option<&str>, cell: Vec<u8>) -> Result<Self, Self::Error> {
        self.values.push(name, &cell);
        Ok(self)
    }
}

/// The outcome of a query, execute or batch.
#[derive(Clone, Debug)]
pub enum QueryResult {
    /// The request succeeded and carries no further information.
    Void,
    /// The keyspace set by a `USE` query.
    SetKeyspace(String),
    /// The effect of a schema altering query.
    SchemaChange(SchemaChangeResult),
    /// The rows of a select.
    Rows(RowsResult),
}

impl QueryResult {
    /// Get the rows, if this is a Rows result.
    pub fn rows(self) -> Option<RowsResult> {
        match self {
            QueryResult::Rows(rows) => Some(rows),
            _ => None,
        }
    }
}

/// Builder for a [`Connection`], carrying the connect options.
pub struct ConnectionBuilder<Auth: Authenticator = AllowAllAuth, C: Compression = Uncompressed> {
    address: Option<SocketAddr>,
    protocol_version: ProtocolVersion,
    keyspace: Option<String>,
    authenticator: Option<Auth>,
    max_streams: u16,
    connect_timeout: Duration,
    request_timeout: Option<Duration>,
    max_frame_len: u32,
    recv_buffer_size: Option<u32>,
    send_buffer_size: Option<u32>,
    event_types: Vec<RegisterEventType>,
    block_on_exhaustion: bool,
    _compression: PhantomData<fn(C) -> C>,
}

impl<Auth: Authenticator, C: Compression> Default for ConnectionBuilder<Auth, C> {
    fn default() -> Self {
        Self {
            address: None,
            protocol_version: ProtocolVersion::default(),
            keyspace: None,
            authenticator: None,
            max_streams: 1024,
            connect_timeout: Duration::from_secs(5),
            request_timeout: Some(Duration::from_secs(12)),
            max_frame_len: MAX_FRAME_LENGTH,
            recv_buffer_size: None,
            send_buffer_size: None,
            event_types: Vec::new(),
            block_on_exhaustion: true,
            _compression: PhantomData,
        }
    }
}

impl<Auth: Authenticator, C: Compression> ConnectionBuilder<Auth, C> {
    /// Create a new connection builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the node address to connect to.
    pub fn address(mut self, address: SocketAddr) -> Self {
        self.address.replace(address);
        self
    }

    /// Set the protocol version to start negotiation with.
    pub fn protocol_version(mut self, version: ProtocolVersion) -> Self {
        self.protocol_version = version;
        self
    }

    /// Select a keyspace; the connection only becomes ready once the `USE`
    /// succeeded.
    pub fn keyspace(mut self, keyspace: &str) -> Self {
        self.keyspace.replace(keyspace.to_owned());
        self
    }

    /// Use the provided authenticator when the server requests authentication.
    pub fn authenticator(mut self, auth: Auth) -> Self {
        self.authenticator.replace(auth);
        self
    }

    /// Cap the number of concurrent streams, up to the protocol's 32768.
    pub fn max_streams(mut self, max_streams: u16) -> Self {
        self.max_streams = max_streams.min(MAX_STREAMS);
        self
    }

    /// Set the TCP connect timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the per-request deadline. `None` waits indefinitely.
    pub fn request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Refuse incoming frames whose body exceeds this many bytes.
    pub fn max_frame_len(mut self, max_frame_len: u32) -> Self {
        self.max_frame_len = max_frame_len.min(MAX_FRAME_LENGTH);
        self
    }

    /// Add an optional recv_buffer_size.
    pub fn recv_buffer_size(mut self, recv_buffer_size: Option<u32>) -> Self {
        self.recv_buffer_size = recv_buffer_size;
        self
    }

    /// Add an optional send_buffer_size.
    pub fn send_buffer_size(mut self, send_buffer_size: Option<u32>) -> Self {
        self.send_buffer_size = send_buffer_size;
        self
    }

    /// Register for the given event types during the handshake.
    pub fn event_types(mut self, event_types: Vec<RegisterEventType>) -> Self {
        self.event_types = event_types;
        self
    }

    /// Fail submissions with `QueueFull` instead of waiting when the stream
    /// pool or the write queue is exhausted.
    pub fn fail_fast(mut self) -> Self {
        self.block_on_exhaustion = false;
        self
    }

    /// Connect, run the handshake, and spawn the connection tasks.
    pub async fn build(self) -> anyhow::Result<Connection<C>> {
        let address = self.address.ok_or_else(|| anyhow!("Address must be provided"))?;
        let state = Arc::new(AtomicU8::new(ConnectionState::Disconnected as u8));
        let mut version = self.protocol_version;
        let stream = loop {
            match self.handshake(address, version, &state).await {
                Ok(stream) => break stream,
                Err(HandshakeError::ProtocolVersionRejected) if version > ProtocolVersion::V3 => {
                    log::warn!(
                        "Server rejected protocol version {:?}, downgrading to {:?}",
                        version,
                        ProtocolVersion::V3
                    );
                    version = ProtocolVersion::V3;
                }
                Err(HandshakeError::ProtocolVersionRejected) => {
                    bail!("Server rejected the lowest protocol version this driver speaks")
                }
                Err(HandshakeError::Other(e)) => return Err(e),
            }
        };

        let (socket_rx, socket_tx) = stream.into_split();
        let (writer_tx, writer_rx) = mpsc::channel(1024);
        let (events_tx, _) = broadcast::channel(128);
        let inner = Arc::new(Inner::<C> {
            streams: Streams::new(self.max_streams),
            writer_tx,
            events: events_tx,
            prepared: Default::default(),
            closed: AtomicBool::new(false),
            state,
            version,
            keyspace: self.keyspace,
            request_timeout: self.request_timeout,
            block_on_exhaustion: self.block_on_exhaustion,
            reader: Mutex::new(None),
            writer: Mutex::new(None),
            _compression: PhantomData,
        });
        let reader = tokio::spawn(reader_task::<C>(socket_rx, inner.clone(), self.max_frame_len));
        let writer = tokio::spawn(writer_task::<C>(socket_tx, writer_rx, inner.clone()));
        *inner.reader.lock().expect("Task handle lock poisoned") = Some(reader);
        *inner.writer.lock().expect("Task handle lock poisoned") = Some(writer);
        inner.set_state(ConnectionState::Ready);
        Ok(Connection { inner })
    }

    /// Run the sequential part of the connection: OPTIONS/SUPPORTED, STARTUP,
    /// the SASL loop, keyspace selection, and event registration.
    async fn handshake(
        &self,
        address: SocketAddr,
        version: ProtocolVersion,
        state: &AtomicU8,
    ) -> Result<TcpStream, HandshakeError> {
        let socket = if address.is_ipv4() {
            TcpSocket::new_v4()
        } else {
            TcpSocket::new_v6()
        }
        .map_err(|e| HandshakeError::Other(e.into()))?;
        if let Some(recv_buffer_size) = self.recv_buffer_size {
            socket
                .set_recv_buffer_size(recv_buffer_size)
                .map_err(|e| HandshakeError::Other(e.into()))?;
        }
        if let Some(send_buffer_size) = self.send_buffer_size {
            socket
                .set_send_buffer_size(send_buffer_size)
                .map_err(|e| HandshakeError::Other(e.into()))?;
        }
        let mut stream = tokio::time::timeout(self.connect_timeout, socket.connect(address))
            .await
            .map_err(|_| HandshakeError::Other(anyhow!("Connect timed out")))?
            .map_err(|e| HandshakeError::Other(e.into()))?;
        state.store(ConnectionState::TcpConnected as u8, Ordering::Release);

        // OPTIONS cannot be compressed, the peers have not settled on an
        // algorithm yet
        let opts_payload = RequestFrame::from(OptionsFrame)
            .with_protocol_version(version)
            .build_payload();
        stream.write_all(&opts_payload).await.map_err(|e| anyhow!(e))?;
        state.store(ConnectionState::OptionsSent as u8, Ordering::Release);
        let response = read_handshake_response::<Uncompressed>(&mut stream, self.max_frame_len).await?;
        let supported = match response.into_body() {
            ResponseBody::Supported(supported) => supported,
            ResponseBody::Error(e) if e.is_protocol_error() => return Err(HandshakeError::ProtocolVersionRejected),
            ResponseBody::Error(e) => return Err(anyhow!("Server refused OPTIONS: {}", e).into()),
            body => return Err(anyhow!("Unexpected response to OPTIONS: {:?}", body.opcode()).into()),
        };
        let cql_version = supported
            .options()
            .get("CQL_VERSION")
            .and_then(|versions| versions.first())
            .ok_or_else(|| anyhow!("Server advertised no CQL version"))?
            .clone();
        let mut startup = StartupFrameBuilder::default()
            .cql_version(&cql_version)
            .with_option(crate::frame::requests::startup::DRIVER_NAME, env!("CARGO_PKG_NAME"))
            .with_option(crate::frame::requests::startup::DRIVER_VERSION, env!("CARGO_PKG_VERSION"));
        if let Some(kind) = C::KIND {
            let advertised = supported
                .options()
                .get("COMPRESSION")
                .map(|kinds| kinds.iter().any(|k| k == kind))
                .unwrap_or(false);
            if !advertised {
                return Err(anyhow!("Server does not support {} compression", kind).into());
            }
            startup = startup.compression(kind);
        }
        let startup_payload = RequestFrame::from(startup.build().map_err(|e| anyhow!("{}", e))?)
            .with_protocol_version(version)
            .build_payload();
        stream.write_all(&startup_payload).await.map_err(|e| anyhow!(e))?;
        state.store(ConnectionState::StartupSent as u8, Ordering::Release);

        let response = read_handshake_response::<C>(&mut stream, self.max_frame_len).await?;
        match response.into_body() {
            ResponseBody::Ready(_) => (),
            ResponseBody::Authenticate(authenticate) => {
                state.store(ConnectionState::Authenticating as u8, Ordering::Release);
                log::debug!("Authenticating via {}", authenticate.authenticator());
                let authenticator = self
                    .authenticator
                    .as_ref()
                    .ok_or_else(|| anyhow!("Server requires authentication but no authenticator was provided"))?;
                let mut token = authenticator.initial_token();
                loop {
                    let auth_payload = RequestFrame::from(
                        AuthResponseFrameBuilder::default()
                            .token(token)
                            .build()
                            .map_err(|e| anyhow!("{}", e))?,
                    )
                    .with_protocol_version(version)
                    .encode::<C>()
                    .map_err(|e| anyhow!(e))?;
                    stream.write_all(&auth_payload).await.map_err(|e| anyhow!(e))?;
                    let response = read_handshake_response::<C>(&mut stream, self.max_frame_len).await?;
                    match response.into_body() {
                        ResponseBody::AuthSuccess(_) => break,
                        ResponseBody::AuthChallenge(challenge) => {
                            token = authenticator.evaluate_challenge(challenge.token())?;
                        }
                        ResponseBody::Error(e) => {
                            return Err(anyhow!("Authentication failed: {}", e).into());
                        }
                        body => return Err(anyhow!("Unexpected response to AUTH_RESPONSE: {:?}", body.opcode()).into()),
                    }
                }
            }
            ResponseBody::Error(e) if e.is_protocol_error() => return Err(HandshakeError::ProtocolVersionRejected),
            ResponseBody::Error(e) => return Err(anyhow!("Server refused STARTUP: {}", e).into()),
            body => return Err(anyhow!("Unexpected response to STARTUP: {:?}", body.opcode()).into()),
        }

        // the connection only becomes ready for the user once the configured
        // keyspace is selected
        if let Some(keyspace) = &self.keyspace {
            let use_payload = RequestFrame::from(QueryFrame {
                statement: format!("USE {}", keyspace),
                consistency: Consistency::One,
                values: Default::default(),
                flags: Default::default(),
                page_size: None,
                paging_state: None,
                serial_consistency: None,
                timestamp: None,
            })
            .with_protocol_version(version)
            .encode::<C>()
            .map_err(|e| anyhow!(e))?;
            stream.write_all(&use_payload).await.map_err(|e| anyhow!(e))?;
            let response = read_handshake_response::<C>(&mut stream, self.max_frame_len).await?;
            match response.into_body() {
                ResponseBody::Result(result) => match result.into_kind() {
                    ResultBodyKind::SetKeyspace(ks) => {
                        log::debug!("Using keyspace {}", ks);
                    }
                    kind => return Err(anyhow!("Unexpected result to USE: {:?}", kind).into()),
                },
                ResponseBody::Error(e) => return Err(anyhow!("Failed to select keyspace {}: {}", keyspace, e).into()),
                body => return Err(anyhow!("Unexpected response to USE: {:?}", body.opcode()).into()),
            }
        }

        if !self.event_types.is_empty() {
            let mut register = RegisterFrameBuilder::default();
            for event_type in &self.event_types {
                register = register.with_event_type(*event_type);
            }
            let register_payload = RequestFrame::from(register.build().map_err(|e| anyhow!("{}", e))?)
                .with_protocol_version(version)
                .encode::<C>()
                .map_err(|e| anyhow!(e))?;
            stream.write_all(&register_payload).await.map_err(|e| anyhow!(e))?;
            let response = read_handshake_response::<C>(&mut stream, self.max_frame_len).await?;
            match response.into_body() {
                ResponseBody::Ready(_) => (),
                ResponseBody::Error(e) => return Err(anyhow!("Failed to register for events: {}", e).into()),
                body => return Err(anyhow!("Unexpected response to REGISTER: {:?}", body.opcode()).into()),
            }
        }

        Ok(stream)
    }
}

enum HandshakeError {
    /// The server refused the protocol version; retry lower.
    ProtocolVersionRejected,
    Other(anyhow::Error),
}

impl From<anyhow::Error> for HandshakeError {
    fn from(e: anyhow::Error) -> Self {
        Self::Other(e)
    }
}

/// Read one frame during the sequential handshake.
async fn read_handshake_response<C: Compression>(
    stream: &mut TcpStream,
    max_frame_len: u32,
) -> anyhow::Result<ResponseFrame> {
    let mut buffer = vec![0; 9];
    stream.read_exact(&mut buffer).await?;
    let header = Header::try_from(buffer.as_slice())?;
    anyhow::ensure!(
        header.body_len() <= max_frame_len,
        "Frame body length {} exceeds the maximum of {}",
        header.body_len(),
        max_frame_len
    );
    buffer.resize(9 + header.body_len() as usize, 0);
    stream.read_exact(&mut buffer[9..]).await?;
    Ok(ResponseFrame::decode::<C>(buffer)?)
}

struct Inner<C: Compression> {
    streams: Streams,
    writer_tx: mpsc::Sender<WriterEvent>,
    events: broadcast::Sender<EventFrame>,
    prepared: prepared::PreparedRegistry,
    closed: AtomicBool,
    state: Arc<AtomicU8>,
    version: ProtocolVersion,
    keyspace: Option<String>,
    request_timeout: Option<Duration>,
    block_on_exhaustion: bool,
    reader: Mutex<Option<JoinHandle<()>>>,
    writer: Mutex<Option<JoinHandle<()>>>,
    _compression: PhantomData<fn(C) -> C>,
}

enum WriterEvent {
    Frame(Vec<u8>),
    Shutdown,
}

impl<C: Compression> Inner<C> {
    fn set_state(&self, state: ConnectionState) {
        self.state.store(state as u8, Ordering::Release);
    }

    fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Fail everything in flight and refuse further submissions. Used when
    /// framing is lost or the socket dies.
    fn poison(&self, mut error: impl FnMut() -> RequestError) {
        self.closed.store(true, Ordering::Release);
        self.set_state(ConnectionState::Closed);
        self.streams.fail_all(&mut error);
    }

    async fn submit(&self, frame: RequestFrame) -> Result<ResponseFrame, RequestError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(RequestError::ConnectionClosed);
        }
        let (waiter, response_rx) = oneshot::channel();
        let stream = self.streams.acquire(waiter, self.block_on_exhaustion).await?;
        let payload = frame
            .with_protocol_version(self.version)
            .with_stream(stream)
            .encode::<C>()?;
        let enqueued = if self.block_on_exhaustion {
            self.writer_tx
                .send(WriterEvent::Frame(payload))
                .await
                .map_err(|_| RequestError::ConnectionClosed)
        } else {
            self.writer_tx
                .try_send(WriterEvent::Frame(payload))
                .map_err(|e| match e {
                    mpsc::error::TrySendError::Full(_) => RequestError::QueueFull,
                    mpsc::error::TrySendError::Closed(_) => RequestError::ConnectionClosed,
                })
        };
        if let Err(e) = enqueued {
            // nothing was written, so the id can go straight back to the pool
            self.streams.complete(stream);
            return Err(e);
        }
        let response = match self.request_timeout {
            Some(deadline) => match tokio::time::timeout(deadline, response_rx).await {
                Ok(response) => response,
                Err(_) => {
                    // the stream id stays reserved until the server answers;
                    // handing it out again could route a late response to the
                    // wrong waiter
                    log::debug!("Request on stream {} timed out", stream);
                    return Err(RequestError::Timeout);
                }
            },
            None => response_rx.await,
        };
        response.map_err(|_| RequestError::ConnectionClosed)?
    }
}

/// The reader task is the sole parser of the socket. Responses are routed to
/// their waiter by stream id; events (stream -1) fan out to subscribers. A
/// malformed frame poisons the connection, since framing is lost.
async fn reader_task<C: Compression>(mut socket: OwnedReadHalf, inner: Arc<Inner<C>>, max_frame_len: u32) {
    loop {
        let mut header_buf = [0u8; 9];
        match socket.read_exact(&mut header_buf).await {
            Ok(_) => (),
            Err(e) => {
                if e.kind() != std::io::ErrorKind::UnexpectedEof {
                    log::warn!("Connection read failed: {}", e);
                }
                inner.poison(|| RequestError::ConnectionClosed);
                break;
            }
        }
        let header = match Header::try_from(&header_buf[..]) {
            Ok(header) => header,
            Err(e) => {
                log::error!("Invalid frame header: {}", e);
                inner.poison(|| RequestError::ProtocolViolation(anyhow!("Invalid frame header")));
                break;
            }
        };
        if header.body_len() > max_frame_len {
            log::error!(
                "Refusing frame with body length {} above the {} ceiling",
                header.body_len(),
                max_frame_len
            );
            let (body_len, ceiling) = (header.body_len(), max_frame_len);
            inner.poison(move || crate::frame::FrameError::Oversized(body_len, ceiling).into());
            break;
        }
        let mut buffer = vec![0; 9 + header.body_len() as usize];
        buffer[..9].copy_from_slice(&header_buf);
        if let Err(e) = socket.read_exact(&mut buffer[9..]).await {
            log::warn!("Connection read failed mid-frame: {}", e);
            inner.poison(|| RequestError::ConnectionClosed);
            break;
        }
        match ResponseFrame::decode::<C>(buffer) {
            Ok(frame) => {
                let stream = frame.stream();
                if stream == -1 {
                    match frame.into_body() {
                        ResponseBody::Event(event) => {
                            // nobody listening is fine
                            let _ = inner.events.send(event);
                        }
                        body => {
                            log::warn!("Ignoring non-event frame on stream -1: {:?}", body.opcode());
                        }
                    }
                } else {
                    match inner.streams.complete(stream) {
                        // delivery fails only when the waiter gave up (e.g.
                        // timed out); the id was reclaimed either way
                        Some(waiter) => {
                            let _ = waiter.send(Ok(frame));
                        }
                        None => log::warn!("Response for unknown stream {}", stream),
                    }
                }
            }
            Err(e) => {
                log::error!("Failed to decode response frame: {}", e);
                inner.poison(|| RequestError::ProtocolViolation(anyhow!("Undecodable response frame")));
                break;
            }
        }
    }
}

/// The writer task owns the write half; it drains the submission queue until
/// shutdown or a socket failure.
async fn writer_task<C: Compression>(
    mut socket: OwnedWriteHalf,
    mut writer_rx: mpsc::Receiver<WriterEvent>,
    inner: Arc<Inner<C>>,
) {
    while let Some(event) = writer_rx.recv().await {
        match event {
            WriterEvent::Frame(payload) => {
                if let Err(e) = socket.write_all(&payload).await {
                    log::warn!("Connection write failed: {}", e);
                    let kind = e.kind();
                    inner.poison(move || std::io::Error::from(kind).into());
                    break;
                }
            }
            WriterEvent::Shutdown => break,
        }
    }
    let _ = socket.shutdown().await;
}

/// A connection to a single node, multiplexing requests over one socket by
/// stream id. Cheap to clone; all clones share the socket, the in-flight
/// table, and the prepared statement cache.
pub struct Connection<C: Compression = Uncompressed> {
    inner: Arc<Inner<C>>,
}

impl<C: Compression> Clone for Connection<C> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<C: Compression> std::fmt::Debug for Connection<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("state", &self.state())
            .field("in_flight", &self.in_flight())
            .field("compression", &std::any::type_name::<C>())
            .finish()
    }
}

impl<C: Compression> Connection<C> {
    /// Create a connection builder.
    pub fn builder() -> ConnectionBuilder<AllowAllAuth, C> {
        ConnectionBuilder::default()
    }

    /// Create a connection builder with a username/password authenticator.
    pub fn builder_with_auth(user: String, pass: String) -> ConnectionBuilder<crate::frame::PasswordAuth, C> {
        ConnectionBuilder::default().authenticator(crate::frame::PasswordAuth::new(user, pass))
    }

    /// Get the connection lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.inner.state()
    }

    /// Get the negotiated protocol version.
    pub fn protocol_version(&self) -> ProtocolVersion {
        self.inner.version
    }

    /// Get the keyspace this connection was built with.
    pub fn keyspace(&self) -> Option<&str> {
        self.inner.keyspace.as_deref()
    }

    /// The number of requests currently in flight.
    pub fn in_flight(&self) -> usize {
        self.inner.streams.in_flight()
    }

    /// Run a CQL query.
    pub async fn query(&self, statement: impl Into<String>, params: QueryParams) -> Result<QueryResult, RequestError> {
        let mut flags = QueryFlags::default();
        flags.set_skip_metadata(params.skip_metadata);
        let frame = QueryFrame {
            statement: statement.into(),
            consistency: params.consistency,
            values: params.values,
            flags,
            page_size: params.page_size,
            paging_state: params.paging_state,
            serial_consistency: params.serial_consistency,
            timestamp: params.timestamp,
        };
        let response = self.inner.submit(RequestFrame::from(frame)).await?;
        into_query_result(response)
    }

    /// Prepare a statement, or fetch it from the per-connection cache.
    /// Concurrent prepares of the same statement coalesce onto one round-trip.
    pub async fn prepare(&self, statement: &str) -> Result<Arc<PreparedStatement>, RequestError> {
        let keyspace = self.inner.keyspace.clone();
        loop {
            match self.inner.prepared.lookup(keyspace.as_deref(), statement) {
                prepared::Lookup::Ready(prepared) => return Ok(prepared),
                prepared::Lookup::Wait(mut rx) => match rx.recv().await {
                    Ok(prepared) => return Ok(prepared),
                    // the winning prepare failed; claim the ticket ourselves
                    Err(_) => continue,
                },
                prepared::Lookup::Prepare => match self.prepare_roundtrip(statement).await {
                    Ok(result) => {
                        return Ok(self.inner.prepared.complete(keyspace.as_deref(), statement, &result));
                    }
                    Err(e) => {
                        self.inner.prepared.abort(keyspace.as_deref(), statement);
                        return Err(e);
                    }
                },
            }
        }
    }

    async fn prepare_roundtrip(&self, statement: &str) -> Result<PreparedResult, RequestError> {
        let response = self
            .inner
            .submit(RequestFrame::from(PrepareFrame::new(statement.to_owned())))
            .await?;
        match response.into_body() {
            ResponseBody::Result(result) => match result.into_kind() {
                ResultBodyKind::Prepared(prepared) => Ok(prepared),
                kind => Err(RequestError::ProtocolViolation(anyhow!(
                    "Unexpected result to PREPARE: {:?}",
                    kind
                ))),
            },
            ResponseBody::Error(e) => Err(RequestError::Cql(e)),
            body => Err(RequestError::ProtocolViolation(anyhow!(
                "Unexpected response to PREPARE: {:?}",
                body.opcode()
            ))),
        }
    }

    /// Execute a prepared statement. If the server evicted the statement
    /// (UNPREPARED), it is re-prepared transparently and the execute is
    /// retried exactly once.
    pub async fn execute(
        &self,
        prepared: &Arc<PreparedStatement>,
        params: QueryParams,
    ) -> Result<QueryResult, RequestError> {
        let frame = execute_frame(prepared.id(), params.clone());
        let result = self.inner.submit(RequestFrame::from(frame)).await;
        match result.and_then(into_query_result) {
            Err(e) if e.is_unprepared() => {
                log::debug!("Statement was evicted server side, re-preparing");
                let reprepared = self.prepare_roundtrip(prepared.statement()).await?;
                prepared.update(&reprepared);
                let retry = execute_frame(prepared.id(), params);
                self.inner
                    .submit(RequestFrame::from(retry))
                    .await
                    .and_then(into_query_result)
            }
            result => result,
        }
    }

    /// Run a batch.
    pub async fn batch(&self, batch: BatchFrame) -> Result<QueryResult, RequestError> {
        let response = self.inner.submit(RequestFrame::from(batch)).await?;
        into_query_result(response)
    }

    /// Register for additional server event types.
    pub async fn register(&self, event_types: Vec<RegisterEventType>) -> Result<(), RequestError> {
        let mut register = RegisterFrameBuilder::default();
        for event_type in event_types {
            register = register.with_event_type(event_type);
        }
        let frame = register
            .build()
            .map_err(|e| RequestError::Encode(anyhow!("{}", e)))?;
        let response = self.inner.submit(RequestFrame::from(frame)).await?;
        match response.into_body() {
            ResponseBody::Ready(_) => Ok(()),
            ResponseBody::Error(e) => Err(RequestError::Cql(e)),
            body => Err(RequestError::ProtocolViolation(anyhow!(
                "Unexpected response to REGISTER: {:?}",
                body.opcode()
            ))),
        }
    }

    /// Subscribe to server events. Events arrive on stream id -1 and bypass
    /// the request table entirely. Dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> broadcast::Receiver<EventFrame> {
        self.inner.events.subscribe()
    }

    /// Close the connection: stop accepting submissions, wait up to `grace`
    /// for in-flight requests to drain, then fail the rest and drop the
    /// socket.
    pub async fn close(&self, grace: Duration) {
        self.inner.set_state(ConnectionState::Closing);
        self.inner.closed.store(true, Ordering::Release);
        if tokio::time::timeout(grace, self.inner.streams.drained()).await.is_err() {
            log::warn!(
                "Close grace period elapsed with {} requests in flight",
                self.inner.streams.in_flight()
            );
        }
        self.inner.streams.fail_all(|| RequestError::ConnectionClosed);
        let _ = self.inner.writer_tx.send(WriterEvent::Shutdown).await;
        let writer = self.inner.writer.lock().expect("Task handle lock poisoned").take();
        if let Some(writer) = writer {
            let _ = writer.await;
        }
        let reader = self.inner.reader.lock().expect("Task handle lock poisoned").take();
        if let Some(reader) = reader {
            reader.abort();
        }
        self.inner.set_state(ConnectionState::Closed);
    }
}

fn execute_frame(id: Vec<u8>, params: QueryParams) -> crate::frame::ExecuteFrame {
    let mut flags = QueryFlags::default();
    flags.set_skip_metadata(params.skip_metadata);
    crate::frame::ExecuteFrame {
        id,
        consistency: params.consistency,
        values: params.values,
        flags,
        page_size: params.page_size,
        paging_state: params.paging_state,
        serial_consistency: params.serial_consistency,
        timestamp: params.timestamp,
    }
}

fn into_query_result(response: ResponseFrame) -> Result<QueryResult, RequestError> {
    match response.into_body() {
        ResponseBody::Result(result) => match result.into_kind() {
            ResultBodyKind::Void => Ok(QueryResult::Void),
            ResultBodyKind::Rows(rows) => Ok(QueryResult::Rows(rows)),
            ResultBodyKind::SetKeyspace(keyspace) => Ok(QueryResult::SetKeyspace(keyspace)),
            ResultBodyKind::SchemaChange(change) => Ok(QueryResult::SchemaChange(change)),
            ResultBodyKind::Prepared(_) => Err(RequestError::ProtocolViolation(anyhow!(
                "Unexpected prepared result"
            ))),
        },
        ResponseBody::Error(e) => Err(RequestError::Cql(e)),
        body => Err(RequestError::ProtocolViolation(anyhow!(
            "Unexpected response: {:?}",
            body.opcode()
        ))),
    }
}
