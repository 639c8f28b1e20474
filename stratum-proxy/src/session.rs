//! Session handler (C5): per-connection stratum state machine. Reads one
//! line-delimited JSON request at a time, dispatches by method, and owns
//! the outbound encoder behind a lock shared with the broadcaster.

use crate::context::{ProxyContext, NODE_STRING};
use crate::error::Error as ProxyError;
use crate::model::SessionHandle;
use crate::{notify, submit};

use ii_async_compat::futures::stream::SplitSink;
use ii_async_compat::futures::{SinkExt, StreamExt};
use ii_logging::macros::*;
use ii_stratum::{Connection, Method, Request, Response, ServerMessage, StratumError};

use serde_json::json;
use std::collections::HashMap;
use std::net::SocketAddr;
use ii_async_compat::tokio::sync::Mutex as AsyncMutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// `Connected -> Authorized -> Mining`; tracked only to reject `mining.submit`
/// before a login has succeeded (§4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Connected,
    Authorized,
}

pub struct Session {
    id: u64,
    peer: SocketAddr,
    extranonce: String,
    seal_mining: bool,
    login: Mutex<Option<String>>,
    state: Mutex<SessionState>,
    sink: AsyncMutex<SplitSink<Connection, ServerMessage>>,
    closed: AtomicBool,
}

impl Session {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn extranonce(&self) -> String {
        self.extranonce.clone()
    }

    pub fn seal_mining(&self) -> bool {
        self.seal_mining
    }

    pub fn login(&self) -> String {
        self.login
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| "<unauthorized>".to_string())
    }

    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            id: self.id,
            peer: self.peer,
            login: Arc::from(self.login().as_str()),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Relaxed)
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::Relaxed);
    }

    async fn send_one(&self, message: ServerMessage) -> Result<(), ii_stratum::Error> {
        let mut sink = self.sink.lock().await;
        sink.send(message).await
    }

    pub async fn send_all(&self, messages: [ServerMessage; 2]) -> Result<(), ii_stratum::Error> {
        for message in messages {
            self.send_one(message).await?;
        }
        Ok(())
    }

    fn is_authorized(&self) -> bool {
        *self.state.lock().unwrap() == SessionState::Authorized
    }

    /// `mining.submit` outside the `Authorized` state is rejected (§4.5);
    /// the state machine has no separate `Mining` marker beyond that.
    pub fn is_authorized_for_mining(&self) -> bool {
        self.is_authorized()
    }
}

/// Live sessions registered by login (§3 Session lifecycle: registration
/// happens on successful `mining.authorize`, not on accept).
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<u64, Arc<Session>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, session: Arc<Session>) {
        self.sessions.write().unwrap().insert(session.id(), session);
    }

    pub fn remove(&self, id: u64) {
        self.sessions.write().unwrap().remove(&id);
    }

    pub fn snapshot(&self) -> Vec<Arc<Session>> {
        self.sessions.read().unwrap().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().unwrap().len()
    }
}

/// Drives one accepted connection end to end: reads requests until EOF,
/// protocol violation, or policy rejection, dispatching each to the right
/// handler. Mirrors `handleTCPClient`'s read-dispatch-or-die loop.
pub async fn handle_connection(
    ctx: Arc<ProxyContext>,
    connection: Connection,
    extranonce: String,
) {
    let peer = connection.peer_addr();
    let (sink, mut stream) = connection.split();
    let session = Arc::new(Session {
        id: NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed),
        peer,
        extranonce,
        seal_mining: ctx.config.proxy.seal_mining,
        login: Mutex::new(None),
        state: Mutex::new(SessionState::Connected),
        sink: AsyncMutex::new(sink),
        closed: AtomicBool::new(false),
    });

    while let Some(frame) = stream.next().await {
        if session.is_closed() {
            break;
        }
        match frame {
            Ok(request) => {
                if let Err(e) = dispatch(&ctx, &session, request).await {
                    warn!("session {}@{} error: {}", session.login(), peer, e);
                    break;
                }
            }
            Err(ii_stratum::Error::LineTooLong { limit }) => {
                warn!("socket flood detected from {}", peer);
                let _ = session
                    .send_one(Response::err(0, StratumError::new(-32, format!("message exceeds proxy's buffer size of {}", limit))).into())
                    .await;
                ctx.policy.ban_client(peer.ip());
                break;
            }
            Err(e) => {
                ctx.policy.apply_malformed_policy(peer.ip());
                debug!("malformed stratum request from {}: {}", peer, e);
                break;
            }
        }
    }

    info!("client {} disconnected", peer);
    ctx.sessions.remove(session.id());
}

async fn dispatch(
    ctx: &Arc<ProxyContext>,
    session: &Arc<Session>,
    request: Request,
) -> Result<(), ProxyError> {
    let id = request.id;
    match request.method() {
        Method::Hello => {
            let result = json!({
                "proto": "EthereumStratum/2.0.0",
                "encoding": "plain",
                "resume": 0,
                "timeout": 30,
                "maxerrors": 999,
                "node": NODE_STRING,
            });
            session
                .send_one(Response::ok(id, result).into())
                .await
                .map_err(|e| crate::error::ErrorKind::Broadcast(e.to_string()))?;
        }
        Method::Subscribe => {
            session
                .send_one(Response::ok(id, "s-12345").into())
                .await
                .map_err(|e| crate::error::ErrorKind::Broadcast(e.to_string()))?;
        }
        Method::Authorize => {
            let already_authorized = session.is_authorized();
            let response = handle_authorize(ctx, session, &request).await;
            let rejected = response.error.is_some();
            session
                .send_one(response.into())
                .await
                .map_err(|e| crate::error::ErrorKind::Broadcast(e.to_string()))?;
            if rejected {
                ctx.sessions.remove(session.id());
                session.close();
            } else if !already_authorized {
                if let Some(template) = ctx.templates.current() {
                    let messages = notify::job_messages(&template, &session.extranonce());
                    let _ = session.send_all(messages).await;
                }
            }
        }
        Method::Submit => {
            let response = submit::handle_submit(ctx, session, &request).await;
            session
                .send_one(response.into())
                .await
                .map_err(|e| crate::error::ErrorKind::Broadcast(e.to_string()))?;
        }
        Method::Bye => {
            ctx.sessions.remove(session.id());
            session.close();
        }
        Method::Other(_) => {
            // Unknown methods are silently ignored (§4.5).
        }
    }
    Ok(())
}

/// Only one authorize transition is permitted (§4.5): repeated calls reply
/// with the same subscription id, without re-registering. An invalid login
/// or a policy rejection replies with an error and the caller closes the
/// connection (§6/§7's session-policy row: no broadcast, close).
async fn handle_authorize(
    ctx: &Arc<ProxyContext>,
    session: &Arc<Session>,
    request: &Request,
) -> Response {
    let id = request.id;
    if session.is_authorized() {
        return Response::ok(id, "s-12345");
    }

    let login = request.param_str(0).unwrap_or_default().to_lowercase();
    if !is_valid_login(&login) {
        return Response::err(id, StratumError::invalid_login());
    }

    if !ctx.policy.apply_login_policy(&login, session.peer.ip()) {
        return Response::err(id, StratumError::invalid_login());
    }

    *session.login.lock().unwrap() = Some(login.clone());
    *session.state.lock().unwrap() = SessionState::Authorized;
    ctx.sessions.register(session.clone());
    info!("stratum miner connected {}@{}", login, session.peer);

    Response::ok(id, "s-12345")
}

/// Lowercase hex address, `0x` + 40 hex digits, matching the original
/// `addressPattern`/`IsValidHexAddress` check.
fn is_valid_login(login: &str) -> bool {
    let hex_part = match login.strip_prefix("0x") {
        Some(rest) => rest,
        None => return false,
    };
    hex_part.len() == 40
        && hex_part.bytes().all(|b| b.is_ascii_hexdigit())
        && hex_part.bytes().any(|b| b != b'0')
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn valid_login_is_lowercase_hex_address() {
        assert!(is_valid_login("0x1234567890abcdef1234567890abcdef12345678"));
        assert!(!is_valid_login("0x0000000000000000000000000000000000000000"));
        assert!(!is_valid_login("1234567890abcdef1234567890abcdef12345678"));
        assert!(!is_valid_login("0xZZ34567890abcdef1234567890abcdef12345678"));
        assert!(!is_valid_login("0xabc"));
    }
}
