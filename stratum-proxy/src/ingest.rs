//! Work ingest loop (C3): the single-task loop that pulls pending work from
//! the zone upstream, applies mode-dependent policy, and updates the
//! template store. Grounded in `NewProxy`'s refresh-timer goroutine, minus
//! the node-state/backend bookkeeping that lives entirely in the stats
//! backend this crate treats as an external collaborator.

use crate::config::parse_duration;
use crate::context::ProxyContext;
use crate::model::BlockTemplate;
use crate::{broadcast, error::Error};

use ii_async_compat::tokio;
use ii_logging::macros::*;

use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::interval;

pub async fn run(ctx: Arc<ProxyContext>, mut shutdown: watch::Receiver<bool>) -> Result<(), Error> {
    let refresh_interval = parse_duration(&ctx.config.proxy.block_refresh_interval)?;
    let mut ticker = interval(refresh_interval);
    info!("set block refresh every {:?}", refresh_interval);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = tick(&ctx).await {
                    warn!("ingest tick failed: {}", e);
                    ctx.mark_sick();
                } else {
                    ctx.mark_ok();
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    info!("ingest loop shutting down");
                    return Ok(());
                }
            }
        }
    }
}

async fn tick(ctx: &Arc<ProxyContext>) -> Result<(), Error> {
    let template = if ctx.config.proxy.seal_mining {
        build_seal_mining_template(ctx).await?
    } else {
        build_full_template(ctx).await?
    };

    let dedup_key = template.dedup_key();
    if !ctx.templates.is_new(dedup_key) {
        return Ok(());
    }

    let job_id = ctx.templates.store(template);
    let stored = ctx.templates.current().expect("just stored");
    info!(
        "new job {} at height {:?}, seal {}",
        job_id,
        stored.height,
        stored.custom_seal.to_hex()
    );

    if ctx.is_sick() {
        warn!("upstream sick, skipping broadcast of job {}", job_id);
        return Ok(());
    }

    broadcast::broadcast_new_job(&ctx.sessions, stored).await;
    Ok(())
}

async fn build_full_template(ctx: &Arc<ProxyContext>) -> Result<BlockTemplate, Error> {
    let mut work_object = ctx.zone_upstream().get_pending_header().await?;

    let prime_terminus_number = match work_object.prime_terminus_number() {
        Some(n) => n,
        None => {
            return Err(crate::error::ErrorKind::UpstreamTransient(
                ctx.zone_upstream().name().to_string(),
                "header not yet usable: no prime terminus number".to_string(),
            )
            .into())
        }
    };

    let coinbase = pick_coinbase(ctx);
    work_object.set_coinbase(coinbase);
    work_object.set_lockup(ctx.config.proxy.lockup);

    let threshold_div = ctx.zone_upstream().get_workshare_threshold().await?;
    let target = ii_stratum::U256::share_threshold(work_object.difficulty(), threshold_div);

    Ok(BlockTemplate {
        height: work_object.number_array(),
        custom_seal: work_object.seal_hash(),
        target,
        prime_terminus_number,
        time: None,
        work_object: Some(work_object),
        job_id: 0,
    })
}

async fn build_seal_mining_template(ctx: &Arc<ProxyContext>) -> Result<BlockTemplate, Error> {
    let update = ctx.zone_upstream().get_custom_seal_update().await?;
    let threshold_div = ctx.zone_upstream().get_workshare_threshold().await?;
    let target = ii_stratum::U256::share_threshold(update.difficulty, threshold_div);

    Ok(BlockTemplate {
        work_object: None,
        target,
        height: [0, 0, 0],
        prime_terminus_number: update.prime_terminus_number.unwrap_or(0),
        custom_seal: update.seal_hash,
        time: Some(update.time),
        job_id: 0,
    })
}

/// `coinbase := pick(miner_preference, quai_coinbase, qi_coinbase)` (§4.3
/// step 2): the miner-preference weight selects which coinbase address the
/// proxy asks the node to credit.
fn pick_coinbase(ctx: &Arc<ProxyContext>) -> String {
    if ctx.config.proxy.miner_preference >= 0.5 {
        ctx.config.proxy.quai_coinbase.clone()
    } else {
        ctx.config.proxy.qi_coinbase.clone()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn coinbase_pick_favors_quai_above_midpoint_preference() {
        let config = crate::config::Config::from_json(
            r#"{
                "name": "test",
                "upstream": {
                    "prime": {"name": "prime", "url": "http://localhost:9001"},
                    "region": {"name": "region", "url": "http://localhost:9002"},
                    "zone": {"name": "zone", "url": "http://localhost:9003"}
                },
                "proxy": {
                    "enabled": true,
                    "minerPreference": 0.8,
                    "quaiCoinbase": "0xquai",
                    "qiCoinbase": "0xqi",
                    "stratum": {"enabled": true, "listen": "0.0.0.0:3333"}
                }
            }"#,
        )
        .unwrap();
        let ctx = Arc::new(ProxyContext::new(
            config,
            vec![],
            Arc::new(crate::policy::PermissivePolicy),
        ));
        assert_eq!(pick_coinbase(&ctx), "0xquai");
    }
}
