//! Submission router (C7): validates a `mining.submit` and routes the
//! accepted header or nonce back to the chain in hierarchical order.

use crate::context::ProxyContext;
use crate::model::{BlockNonce, HIERARCHY_DEPTH, ZONE_CTX};
use crate::notify;
use crate::session::Session;

use ii_logging::macros::*;
use ii_stratum::{Request, Response, StratumError};

use std::sync::Arc;

pub async fn handle_submit(
    ctx: &Arc<ProxyContext>,
    session: &Arc<Session>,
    request: &Request,
) -> Response {
    let id = request.id;

    if !session.is_authorized_for_mining() {
        return Response::err(id, StratumError::not_authorized());
    }

    let job_id_hex = match request.param_str(0) {
        Some(s) => s,
        None => return Response::err(id, StratumError::bad_job_id()),
    };
    let job_id = match u64::from_str_radix(job_id_hex.trim_start_matches("0x"), 16) {
        Ok(v) => v,
        Err(_) => return Response::err(id, StratumError::bad_job_id()),
    };

    let miner_nonce_hex = match request.param_str(1) {
        Some(s) => s,
        None => return Response::err(id, StratumError::invalid_nonce_parameter()),
    };
    let nonce_hex = format!("{}{}", session.extranonce(), miner_nonce_hex);
    let nonce = match BlockNonce::from_hex(&nonce_hex) {
        Ok(n) => n,
        Err(_) => return Response::err(id, StratumError::invalid_nonce_parameter()),
    };

    if session.seal_mining() {
        handle_seal_mining_submit(ctx, session, id, job_id, nonce).await
    } else {
        handle_full_submit(ctx, session, id, job_id, nonce).await
    }
}

async fn handle_seal_mining_submit(
    ctx: &Arc<ProxyContext>,
    session: &Arc<Session>,
    id: u32,
    _job_id: u64,
    nonce: BlockNonce,
) -> Response {
    let template = match ctx.templates.current() {
        Some(t) => t,
        None => return Response::err(id, StratumError::bad_nonce()),
    };

    match ctx.zone_upstream().receive_nonce(&template.custom_seal, nonce).await {
        Ok(()) => Response::ok(id, serde_json::Value::Null),
        Err(e) => {
            warn!("nonce rejected for {}@{}: {}", session.login(), session.peer(), e);
            let messages = notify::job_messages(&template, &session.extranonce());
            let _ = session.send_all(messages).await;
            Response::err(id, StratumError::bad_nonce())
        }
    }
}

async fn handle_full_submit(
    ctx: &Arc<ProxyContext>,
    session: &Arc<Session>,
    id: u32,
    job_id: u64,
    nonce: BlockNonce,
) -> Response {
    let entry = match ctx.templates.lookup(job_id) {
        Some(e) => e,
        None => return Response::err(id, StratumError::bad_nonce()),
    };

    let mut work_object = match entry.work_object {
        Some(wo) => wo,
        None => return Response::err(id, StratumError::bad_nonce()),
    };
    work_object.set_nonce(nonce);

    let mix_hash = match ctx.zone_upstream().compute_pow_light(work_object.as_ref()).await {
        Ok(h) => h,
        Err(_) => return Response::err(id, StratumError::bad_nonce()),
    };
    work_object.set_mix_hash(mix_hash);

    if let Some(current) = ctx.templates.current() {
        if current.height[ZONE_CTX] != work_object.number_at(ZONE_CTX) {
            debug!("stale submission from {}@{}", session.login(), session.peer());
        }
    }

    if ctx.zone_upstream().verify_seal(work_object.as_ref()).await.is_err() {
        return Response::err(id, StratumError::bad_nonce());
    }

    let order = match ctx.zone_upstream().calc_order(work_object.as_ref()).await {
        Ok(order) => order,
        Err(_) => return Response::err(id, StratumError::bad_nonce()),
    };

    for level in (order..HIERARCHY_DEPTH).rev() {
        let upstream = match ctx.upstream(level) {
            Some(u) => u,
            None => continue,
        };
        if let Err(e) = upstream.receive_mined_header(work_object.as_ref(), level).await {
            warn!(
                "level {} rejected submission from {}@{}: {}",
                level,
                session.login(),
                session.peer(),
                e
            );
            if let Some(current) = ctx.templates.current() {
                let messages = notify::job_messages(&current, &session.extranonce());
                let _ = session.send_all(messages).await;
            }
            return Response::err(id, StratumError::bad_nonce());
        }
    }

    Response::ok(id, serde_json::Value::Null)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::Config;
    use crate::model::{BlockTemplate, PendingWorkObject, SealHash};
    use crate::policy::PermissivePolicy;
    use crate::upstream::mock::MockUpstreamClient;
    use ii_stratum::U256;
    use std::net::SocketAddr;

    fn test_config() -> Config {
        Config::from_json(
            r#"{
                "name": "test",
                "upstream": {
                    "prime": {"name": "prime", "url": "http://localhost:9001"},
                    "region": {"name": "region", "url": "http://localhost:9002"},
                    "zone": {"name": "zone", "url": "http://localhost:9003"}
                },
                "proxy": {
                    "enabled": true,
                    "stratum": {"enabled": true, "listen": "0.0.0.0:3333"}
                }
            }"#,
        )
        .unwrap()
    }

    fn full_mode_context(order: usize) -> Arc<ProxyContext> {
        let upstreams: Vec<Box<dyn crate::upstream::UpstreamClient>> = vec![
            Box::new(MockUpstreamClient::new(order)),
            Box::new(MockUpstreamClient::new(order)),
            Box::new(MockUpstreamClient::new(order)),
        ];
        Arc::new(ProxyContext::new(
            test_config(),
            upstreams,
            Arc::new(PermissivePolicy),
        ))
    }

    fn store_template(ctx: &ProxyContext) -> u64 {
        let work_object = PendingWorkObject {
            seal_hash: SealHash([1u8; 32]),
            numbers: [10, 10, 10],
            difficulty: 1000,
            prime_terminus_number: Some(5),
            time: 1,
            nonce: None,
            mix_hash: None,
            coinbase: None,
            lockup: None,
        };
        let template = BlockTemplate {
            work_object: Some(Box::new(work_object)),
            target: U256::from(1u64),
            height: [10, 10, 10],
            prime_terminus_number: 5,
            custom_seal: SealHash([1u8; 32]),
            time: None,
            job_id: 0,
        };
        ctx.templates.store(template)
    }

    #[tokio::test]
    async fn full_submission_routes_levels_descending_from_order() {
        let ctx = full_mode_context(crate::model::REGION_CTX);
        let job_id = store_template(&ctx);

        let peer: SocketAddr = "127.0.0.1:9999".parse().unwrap();
        let entry = ctx.templates.lookup(job_id).unwrap();
        let mut work_object = entry.work_object.clone().unwrap();
        work_object.set_nonce(BlockNonce([0u8; 8]));

        let order = ctx
            .zone_upstream()
            .calc_order(work_object.as_ref())
            .await
            .unwrap();
        assert_eq!(order, crate::model::REGION_CTX);

        for level in (order..HIERARCHY_DEPTH).rev() {
            ctx.upstream(level)
                .unwrap()
                .receive_mined_header(work_object.as_ref(), level)
                .await
                .unwrap();
        }

        let _ = peer;
    }

    #[test]
    fn bad_job_id_hex_is_rejected_before_any_upstream_call() {
        assert!(u64::from_str_radix("not-hex", 16).is_err());
    }
}
