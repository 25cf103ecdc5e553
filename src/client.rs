use crate::error::BenchError;
use crate::handshake::{self, HandshakeError};
use crate::request::PendingRequests;
use crate::retry::{RetryPolicy, connect_with_retry};
use crate::service::{CallError, RemoteService};
use crate::socket::{FrameSocket, SocketError};
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use log::{debug, info, warn};
use pushcore::handshake::Greeting;
use pushcore::iproto::consts::{ITER_EQ, VINDEX_ID, VINDEX_NAME_INDEX, VSPACE_ID, VSPACE_NAME_INDEX};
use pushcore::iproto::{ProtocolError, Request, Response, schema};
use pushcore::tuple::TupleBuilder;
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::time::sleep;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(5000);
pub const DEFAULT_RECONNECT: Duration = Duration::from_secs(1);
pub const DEFAULT_MAX_RECONNECTS: u32 = 3;

/// Connection settings. A zero `timeout` disables request deadlines; a zero
/// `reconnect` disables redialing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectOptions {
    pub timeout: Duration,
    pub reconnect: Duration,
    pub max_reconnects: u32,
    pub user: String,
    pub pass: String,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            reconnect: DEFAULT_RECONNECT,
            max_reconnects: DEFAULT_MAX_RECONNECTS,
            user: String::new(),
            pass: String::new(),
        }
    }
}

impl ConnectOptions {
    pub fn request_timeout(&self) -> Duration {
        if self.timeout.is_zero() {
            Duration::MAX
        } else {
            self.timeout
        }
    }

    /// Authentication needs both a user and a password.
    pub fn has_credentials(&self) -> bool {
        !self.user.is_empty() && !self.pass.is_empty()
    }

    fn dial_attempts(&self) -> u32 {
        if self.reconnect.is_zero() {
            1
        } else {
            self.max_reconnects.saturating_add(1)
        }
    }
}

#[derive(Debug, Error)]
pub enum ConnectError {
    #[error(transparent)]
    Socket(#[from] SocketError),
    #[error(transparent)]
    Handshake(#[from] HandshakeError),
    #[error("gave up after {attempts} dial attempts: {last}")]
    Exhausted {
        attempts: u32,
        last: Box<ConnectError>,
    },
}

impl ConnectError {
    /// True when the server looks like it is still starting up, so a later
    /// attempt may succeed.
    pub fn is_not_ready(&self) -> bool {
        match self {
            ConnectError::Socket(SocketError::Io(e)) => matches!(
                e.kind(),
                ErrorKind::ConnectionRefused
                    | ErrorKind::ConnectionReset
                    | ErrorKind::ConnectionAborted
                    | ErrorKind::NotConnected
                    | ErrorKind::TimedOut
                    | ErrorKind::UnexpectedEof
                    | ErrorKind::BrokenPipe
                    | ErrorKind::AddrNotAvailable
            ),
            ConnectError::Socket(_) => true,
            ConnectError::Handshake(HandshakeError::Greeting(_)) => false,
            ConnectError::Handshake(HandshakeError::Auth { source, .. }) => match source {
                CallError::Server(e) => e.is_transient(),
                CallError::Disconnected | CallError::Timeout(_) | CallError::Socket(_) => true,
                _ => false,
            },
            ConnectError::Exhausted { .. } => true,
        }
    }
}

/// One live TCP session: the write half, its in-flight requests and the
/// greeting it was opened with.
pub(crate) struct Session {
    pub(crate) socket: FrameSocket,
    pub(crate) pending: Arc<PendingRequests>,
    greeting: Greeting,
}

impl Session {
    async fn open(address: &str, options: &ConnectOptions) -> Result<Arc<Self>, ConnectError> {
        let pending = Arc::new(PendingRequests::new());
        let (socket, raw_greeting) =
            FrameSocket::connect(address, options.request_timeout(), pending.clone()).await?;

        let greeting = match handshake::parse_greeting(&raw_greeting) {
            Ok(greeting) => greeting,
            Err(e) => {
                socket.close().await;
                return Err(e.into());
            }
        };

        let session = Self {
            socket,
            pending,
            greeting,
        };
        if let Err(e) = handshake::do_handshake(
            &session,
            &options.user,
            &options.pass,
            options.request_timeout(),
        )
        .await
        {
            session.socket.close().await;
            return Err(e.into());
        }
        Ok(Arc::new(session))
    }

    pub(crate) fn greeting(&self) -> &Greeting {
        &self.greeting
    }

    fn is_alive(&self) -> bool {
        self.socket.is_connected()
    }
}

/// Dials until a session is up, honoring the reconnect delay and limit.
async fn dial(address: &str, options: &ConnectOptions) -> Result<Arc<Session>, ConnectError> {
    let attempts = options.dial_attempts();
    let mut attempt = 1;
    loop {
        match Session::open(address, options).await {
            Ok(session) => return Ok(session),
            Err(e) if attempts > 1 && e.is_not_ready() => {
                if attempt >= attempts {
                    return Err(ConnectError::Exhausted {
                        attempts,
                        last: Box::new(e),
                    });
                }
                debug!(
                    target: "Connection",
                    "Dial attempt {attempt}/{attempts} to {address} failed: {e}"
                );
                sleep(options.reconnect).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// A multiplexed connection to the database. Requests from any number of
/// tasks share one socket; a lost socket is redialed on the next request.
pub struct Connection {
    address: String,
    options: ConnectOptions,
    session: RwLock<Option<Arc<Session>>>,
    reconnects: AtomicU32,
    space_ids: DashMap<String, u32>,
    index_ids: DashMap<(u32, String), u32>,
}

impl Connection {
    pub async fn open(address: &str, options: ConnectOptions) -> Result<Arc<Self>, ConnectError> {
        let session = dial(address, &options).await?;
        Ok(Arc::new(Self {
            address: address.to_string(),
            options,
            session: RwLock::new(Some(session)),
            reconnects: AtomicU32::new(0),
            space_ids: DashMap::new(),
            index_ids: DashMap::new(),
        }))
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn options(&self) -> &ConnectOptions {
        &self.options
    }

    pub async fn peer_addr(&self) -> Option<SocketAddr> {
        self.session
            .read()
            .await
            .as_ref()
            .map(|session| session.socket.peer_addr())
    }

    pub async fn server_version(&self) -> Option<String> {
        self.session
            .read()
            .await
            .as_ref()
            .map(|session| session.greeting.version.clone())
    }

    pub async fn is_connected(&self) -> bool {
        self.session
            .read()
            .await
            .as_ref()
            .is_some_and(|session| session.is_alive())
    }

    /// Number of times a lost session was replaced.
    pub fn reconnect_count(&self) -> u32 {
        self.reconnects.load(Ordering::Relaxed)
    }

    pub async fn ping(&self) -> Result<(), CallError> {
        self.request(Request::Ping).await?.into_data()?;
        Ok(())
    }

    pub async fn close(&self) {
        if let Some(session) = self.session.write().await.take() {
            info!(target: "Connection", "Closing connection to {}", self.address);
            session.socket.close().await;
        }
    }

    async fn session(&self) -> Result<Arc<Session>, CallError> {
        if let Some(session) = self.session.read().await.as_ref() {
            if session.is_alive() {
                return Ok(session.clone());
            }
        }

        let mut guard = self.session.write().await;
        if let Some(session) = guard.as_ref() {
            if session.is_alive() {
                return Ok(session.clone());
            }
        }
        if self.options.reconnect.is_zero() {
            return Err(CallError::Socket(SocketError::SocketClosed));
        }

        warn!(target: "Connection", "Connection to {} lost, reconnecting", self.address);
        let session = dial(&self.address, &self.options).await?;
        self.reconnects.fetch_add(1, Ordering::Relaxed);
        info!(target: "Connection", "Reconnected to {}", session.socket.peer_addr());
        *guard = Some(session.clone());
        Ok(session)
    }

    async fn request(&self, request: Request<'_>) -> Result<Response, CallError> {
        let session = self.session().await?;
        session
            .send_request(request, self.options.request_timeout())
            .await
    }

    async fn space_id(&self, name: &str) -> Result<u32, CallError> {
        if let Some(id) = self.space_ids.get(name) {
            return Ok(*id);
        }

        let key = TupleBuilder::new()
            .str(name)
            .build()
            .map_err(ProtocolError::from)?;
        let data = self
            .request(Request::Select {
                space_id: VSPACE_ID,
                index_id: VSPACE_NAME_INDEX,
                offset: 0,
                limit: 1,
                iterator: ITER_EQ,
                key: &key,
            })
            .await?
            .into_data()?;
        let id = schema::decode_space_id(&data)?.ok_or_else(|| CallError::UnknownName {
            kind: "space",
            name: name.to_string(),
        })?;

        debug!(target: "Connection", "Resolved space {name:?} to id {id}");
        self.space_ids.insert(name.to_string(), id);
        Ok(id)
    }

    async fn index_id(&self, space_id: u32, name: &str) -> Result<u32, CallError> {
        let cache_key = (space_id, name.to_string());
        if let Some(id) = self.index_ids.get(&cache_key) {
            return Ok(*id);
        }

        let key = TupleBuilder::new()
            .uint(u64::from(space_id))
            .str(name)
            .build()
            .map_err(ProtocolError::from)?;
        let data = self
            .request(Request::Select {
                space_id: VINDEX_ID,
                index_id: VINDEX_NAME_INDEX,
                offset: 0,
                limit: 1,
                iterator: ITER_EQ,
                key: &key,
            })
            .await?
            .into_data()?;
        let id = schema::decode_index_id(&data)?.ok_or_else(|| CallError::UnknownName {
            kind: "index",
            name: name.to_string(),
        })?;

        debug!(target: "Connection", "Resolved index {name:?} of space {space_id} to id {id}");
        self.index_ids.insert(cache_key, id);
        Ok(id)
    }
}

#[async_trait]
impl RemoteService for Connection {
    async fn call(&self, function: &str, args: Vec<u8>) -> Result<Bytes, CallError> {
        let response = self
            .request(Request::Call {
                function,
                args: &args,
            })
            .await?;
        Ok(response.into_data()?)
    }

    async fn select(
        &self,
        space: &str,
        index: &str,
        key: Vec<u8>,
        offset: u32,
        limit: u32,
    ) -> Result<Bytes, CallError> {
        let space_id = self.space_id(space).await?;
        let index_id = self.index_id(space_id, index).await?;
        let response = self
            .request(Request::Select {
                space_id,
                index_id,
                offset,
                limit,
                iterator: ITER_EQ,
                key: &key,
            })
            .await?;
        Ok(response.into_data()?)
    }
}

/// Opens the benchmark connection, retrying while the server is not ready.
pub async fn connect(
    address: &str,
    options: ConnectOptions,
    policy: &RetryPolicy,
) -> Result<Arc<Connection>, BenchError> {
    info!(
        target: "Connection",
        "Database: addr = {:?}, timeout = {:?}, reconnect = {:?}, max = {}",
        address, options.timeout, options.reconnect, options.max_reconnects
    );
    if options.has_credentials() {
        info!(target: "Connection", "Access control: user {}", options.user);
    } else {
        info!(target: "Connection", "Access control: guest");
    }

    let connection = connect_with_retry(policy, |_| Connection::open(address, options.clone()))
        .await
        .map_err(|source| BenchError::Connection {
            address: address.to_string(),
            source,
        })?;

    let resolved = match connection.peer_addr().await {
        Some(addr) => addr.to_string(),
        None => address.to_string(),
    };
    info!(target: "Connection", "Connected to {resolved:?}");
    Ok(connection)
}
