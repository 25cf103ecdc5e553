use crate::client::Session;
use crate::service::CallError;
use log::{debug, info};
use pushcore::handshake::Greeting;
use pushcore::iproto::consts::{AUTH_MECHANISM, GREETING_SIZE};
use pushcore::iproto::{ProtocolError, Request};
use thiserror::Error;
use tokio::time::Duration;

#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("Bad greeting: {0}")]
    Greeting(#[from] ProtocolError),
    #[error("Authentication as {user:?} failed: {source}")]
    Auth {
        user: String,
        #[source]
        source: CallError,
    },
}

type Result<T> = std::result::Result<T, HandshakeError>;

pub fn parse_greeting(raw: &[u8; GREETING_SIZE]) -> Result<Greeting> {
    let greeting = Greeting::parse(raw)?;
    debug!(target: "Connection", "<-- Server version {}", greeting.version);
    Ok(greeting)
}

/// Authenticates the session. Unless both user and password are set, the
/// guest session the server grants on connect is kept.
pub(crate) async fn do_handshake(
    session: &Session,
    user: &str,
    password: &str,
    request_timeout: Duration,
) -> Result<()> {
    if user.is_empty() || password.is_empty() {
        return Ok(());
    }

    debug!(target: "Connection", "--> Sending {AUTH_MECHANISM} auth for {user}");
    let scramble = session.greeting().scramble(password);
    let request = Request::Auth {
        user,
        scramble: &scramble,
    };
    let auth_result = match session.send_request(request, request_timeout).await {
        Ok(response) => response.into_data().map(|_| ()).map_err(CallError::from),
        Err(e) => Err(e),
    };
    auth_result.map_err(|source| HandshakeError::Auth {
        user: user.to_string(),
        source,
    })?;

    info!(target: "Connection", "Authenticated as {user}");
    Ok(())
}
