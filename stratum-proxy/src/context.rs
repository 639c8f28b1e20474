//! Shared state handed to every component that needs it: the template
//! store, the upstream clients, the session registry, and the policy
//! engine. Constructed once in `main` (C10) and passed around as an `Arc`.

use crate::config::Config;
use crate::policy::Policy;
use crate::session::SessionRegistry;
use crate::template::TemplateStore;
use crate::upstream::UpstreamClient;

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// Fixed capability string reported in `mining.hello`'s reply, matching the
/// node string convention used throughout the chain's RPC surface.
pub const NODE_STRING: &str = "quai-stratum-proxy";

pub struct ProxyContext {
    pub config: Config,
    pub upstreams: Vec<Box<dyn UpstreamClient>>,
    pub templates: TemplateStore,
    pub sessions: SessionRegistry,
    pub policy: Arc<dyn Policy>,
    fails_count: AtomicI64,
}

impl ProxyContext {
    pub fn new(
        config: Config,
        upstreams: Vec<Box<dyn UpstreamClient>>,
        policy: Arc<dyn Policy>,
    ) -> Self {
        let cache_size = config.job_cache_size;
        Self {
            config,
            upstreams,
            templates: TemplateStore::new(cache_size),
            sessions: SessionRegistry::new(),
            policy,
            fails_count: AtomicI64::new(0),
        }
    }

    pub fn mark_sick(&self) {
        self.fails_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn mark_ok(&self) {
        self.fails_count.store(0, Ordering::Relaxed);
    }

    /// The proxy is "sick" when health checking is enabled and the failure
    /// counter has reached `maxFails` (§5). Broadcasts are skipped while
    /// sick; accepts continue.
    pub fn is_sick(&self) -> bool {
        self.config.proxy.health_check
            && self.fails_count.load(Ordering::Relaxed) >= self.config.proxy.max_fails
    }

    pub fn upstream(&self, level: usize) -> Option<&dyn UpstreamClient> {
        self.upstreams.get(level).map(|b| b.as_ref())
    }

    pub fn zone_upstream(&self) -> &dyn UpstreamClient {
        self.upstreams
            .last()
            .expect("at least the zone upstream is always dialed")
            .as_ref()
    }
}
