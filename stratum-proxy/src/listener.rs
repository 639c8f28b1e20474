//! Stratum listener (C4): TCP acceptor, ban/rate-limit admission,
//! extranonce allocation, and semaphore-gated session spawning. Mirrors the
//! original `ListenTCP`'s accept loop shape.

use crate::context::ProxyContext;
use crate::session;

use ii_async_compat::tokio::sync::Semaphore;
use ii_logging::macros::*;
use ii_stratum::Server;

use rand::Rng;
use std::net::SocketAddr;
use std::sync::Arc;

pub async fn run(ctx: Arc<ProxyContext>) -> std::io::Result<()> {
    let addr: SocketAddr = ctx
        .config
        .proxy
        .stratum
        .listen
        .parse()
        .expect("listen address validated at config load time");

    let server = Server::bind(&addr).await?;
    info!("stratum listening on {}", addr);

    let semaphore = Arc::new(Semaphore::new(ctx.config.proxy.stratum.max_conn));

    loop {
        let connection = match server.accept().await {
            Ok(c) => c,
            Err(e) => {
                warn!("accept error: {}", e);
                continue;
            }
        };

        let peer = connection.peer_addr();
        if ctx.policy.is_banned(peer.ip()) || !ctx.policy.apply_limit_policy(peer.ip()) {
            drop(connection);
            continue;
        }
        if connection.set_keepalive(true).is_err() {
            debug!("failed to set keepalive for {}", peer);
        }

        let permit = match semaphore.clone().try_acquire_owned() {
            Ok(p) => p,
            Err(_) => {
                debug!("dropping connection from {}: at max_conn", peer);
                drop(connection);
                continue;
            }
        };

        let extranonce = allocate_extranonce();
        let ctx = ctx.clone();
        ii_async_compat::spawn(async move {
            session::handle_connection(ctx, connection, extranonce).await;
            drop(permit);
        });
    }
}

/// Random 16-bit extranonce encoded as 4 hex chars (§4.4).
fn allocate_extranonce() -> String {
    let value: u16 = rand::thread_rng().gen();
    format!("{:04x}", value)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn extranonce_is_four_hex_chars() {
        for _ in 0..100 {
            let nonce = allocate_extranonce();
            assert_eq!(nonce.len(), 4);
            assert!(nonce.bytes().all(|b| b.is_ascii_hexdigit()));
        }
    }
}
