//! Upstream client facade (C1): a thin contract over the chain node's RPC
//! surface, plus a concrete JSON-RPC-over-HTTP implementation.

use crate::error::{Error, ErrorKind};
use crate::model::{BlockNonce, SealHash, SealUpdate, WorkObject};

use ii_logging::macros::*;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::time::Duration;

/// The chain-level contract C3 (ingest loop) and C7 (submission router) drive
/// against. `calc_order`/`verify_seal`/`compute_pow_light` are local
/// computations on a concrete implementation's decoded header rather than
/// network round trips, but they live on the same trait because every
/// caller already holds a `dyn UpstreamClient` and nothing else.
#[async_trait]
pub trait UpstreamClient: Send + Sync {
    fn name(&self) -> &str;

    async fn get_pending_header(&self) -> Result<Box<dyn WorkObject>, Error>;

    /// Seal-mining mode's pending-work poll: the zone node's opaque seal
    /// feed, without a full header.
    async fn get_custom_seal_update(&self) -> Result<SealUpdate, Error>;

    async fn get_workshare_threshold(&self) -> Result<u64, Error>;

    async fn calc_order(&self, work_object: &dyn WorkObject) -> Result<usize, Error>;

    async fn verify_seal(&self, work_object: &dyn WorkObject) -> Result<(), Error>;

    async fn compute_pow_light(&self, work_object: &dyn WorkObject) -> Result<[u8; 32], Error>;

    async fn receive_mined_header(
        &self,
        work_object: &dyn WorkObject,
        level: usize,
    ) -> Result<(), Error>;

    async fn receive_nonce(&self, seal_hash: &SealHash, nonce: BlockNonce) -> Result<(), Error>;

    /// Rolling health check driven by C8's `healthCheck` flag (section 5). Round
    /// trips a cheap call and folds the result into the sick/success
    /// counter the same way every other call does.
    async fn check(&self) -> bool {
        self.get_pending_header().await.is_ok()
    }

    fn is_sick(&self) -> bool;
}

/// The header fields the node needs to verify or route a solved submission:
/// the seal hash plus whatever nonce/mix-hash the miner has set so far.
/// `nonce`/`mixHash` are `null` until `submit.rs` has called `set_nonce`/
/// `set_mix_hash` on the header.
fn header_params(work_object: &dyn WorkObject) -> Value {
    json!({
        "sealHash": work_object.seal_hash().to_hex(),
        "nonce": work_object.nonce().map(|n| hex::encode(n.0)),
        "mixHash": work_object.mix_hash().map(hex::encode),
    })
}

/// JSON-RPC request/response envelope matching the node's wire shape.
#[derive(Deserialize)]
struct JsonRpcResponse {
    result: Option<Value>,
    error: Option<JsonRpcError>,
}

#[derive(Deserialize)]
struct JsonRpcError {
    message: String,
}

/// Rolling failure counter: five consecutive failures marks an upstream
/// sick, five consecutive successes clears it. Mirrors `RPCClient`'s
/// `sickRate`/`successRate` fields.
struct HealthCounter {
    sick: AtomicBool,
    sick_rate: AtomicI64,
    success_rate: AtomicI64,
}

const SICK_THRESHOLD: i64 = 5;

impl HealthCounter {
    fn new() -> Self {
        Self {
            sick: AtomicBool::new(false),
            sick_rate: AtomicI64::new(0),
            success_rate: AtomicI64::new(0),
        }
    }

    fn mark_sick(&self) {
        self.success_rate.store(0, Ordering::Relaxed);
        let rate = self.sick_rate.fetch_add(1, Ordering::Relaxed) + 1;
        if rate >= SICK_THRESHOLD {
            self.sick.store(true, Ordering::Relaxed);
        }
    }

    fn mark_alive(&self) {
        let rate = self.success_rate.fetch_add(1, Ordering::Relaxed) + 1;
        if rate >= SICK_THRESHOLD {
            self.sick.store(false, Ordering::Relaxed);
            self.sick_rate.store(0, Ordering::Relaxed);
            self.success_rate.store(0, Ordering::Relaxed);
        }
    }

    fn is_sick(&self) -> bool {
        self.sick.load(Ordering::Relaxed)
    }
}

/// Concrete JSON-RPC-over-HTTP upstream, one per hierarchy level.
pub struct HttpRpcClient {
    name: String,
    url: String,
    http: reqwest::Client,
    health: HealthCounter,
}

impl HttpRpcClient {
    pub fn dial(name: String, url: String, timeout: Duration) -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ErrorKind::Config(format!("building http client: {}", e)))?;
        Ok(Self {
            name,
            url,
            http,
            health: HealthCounter::new(),
        })
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, Error> {
        let body = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 0,
        });

        let response = self.http.post(&self.url).json(&body).send().await;
        let response = match response {
            Ok(r) => r,
            Err(e) => {
                self.health.mark_sick();
                return Err(ErrorKind::UpstreamTransient(self.name.clone(), e.to_string()).into());
            }
        };

        let parsed: Result<JsonRpcResponse, _> = response.json().await;
        let parsed = match parsed {
            Ok(p) => p,
            Err(e) => {
                self.health.mark_sick();
                return Err(ErrorKind::UpstreamTransient(self.name.clone(), e.to_string()).into());
            }
        };

        if let Some(rpc_error) = parsed.error {
            self.health.mark_sick();
            return Err(ErrorKind::UpstreamRejected(rpc_error.message).into());
        }

        self.health.mark_alive();
        parsed
            .result
            .ok_or_else(|| ErrorKind::UpstreamTransient(self.name.clone(), "empty result".into()).into())
    }
}

#[async_trait]
impl UpstreamClient for HttpRpcClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get_pending_header(&self) -> Result<Box<dyn WorkObject>, Error> {
        let result = self.call("quai_getPendingHeader", json!([])).await?;
        let work_object: crate::model::PendingWorkObject = serde_json::from_value(result)
            .map_err(|e| ErrorKind::UpstreamTransient(self.name.clone(), e.to_string()))?;
        Ok(Box::new(work_object))
    }

    async fn get_custom_seal_update(&self) -> Result<SealUpdate, Error> {
        let result = self.call("quai_getCustomSealHash", json!([])).await?;
        let seal_hash_str = result
            .get("sealHash")
            .and_then(Value::as_str)
            .ok_or_else(|| ErrorKind::UpstreamTransient(self.name.clone(), "missing sealHash".into()))?;
        let seal_hash = SealHash::from_hex(seal_hash_str)
            .map_err(|e| ErrorKind::UpstreamTransient(self.name.clone(), e.to_string()))?;
        let difficulty = result.get("difficulty").and_then(Value::as_u64).unwrap_or(0);
        let prime_terminus_number = result.get("primeTerminusNumber").and_then(Value::as_u64);
        let time = result.get("time").and_then(Value::as_u64).unwrap_or(0);
        Ok(SealUpdate {
            seal_hash,
            difficulty,
            prime_terminus_number,
            time,
        })
    }

    async fn get_workshare_threshold(&self) -> Result<u64, Error> {
        let result = self
            .call("quai_getWorkShareThreshold", json!([]))
            .await?;
        result
            .as_u64()
            .ok_or_else(|| ErrorKind::UpstreamTransient(self.name.clone(), "non-numeric threshold".into()).into())
    }

    async fn calc_order(&self, work_object: &dyn WorkObject) -> Result<usize, Error> {
        let result = self
            .call("quai_calcOrder", json!([header_params(work_object)]))
            .await?;
        let order = result
            .as_u64()
            .ok_or_else(|| ErrorKind::UpstreamRejected("calcOrder returned non-numeric order".into()))?;
        if order as usize >= crate::model::HIERARCHY_DEPTH {
            return Err(ErrorKind::UpstreamRejected(format!("order {} out of range", order)).into());
        }
        Ok(order as usize)
    }

    async fn verify_seal(&self, work_object: &dyn WorkObject) -> Result<(), Error> {
        let result = self
            .call("quai_verifySeal", json!([header_params(work_object)]))
            .await?;
        if result.as_bool().unwrap_or(false) {
            Ok(())
        } else {
            Err(ErrorKind::UpstreamRejected("seal verification failed".into()).into())
        }
    }

    async fn compute_pow_light(&self, work_object: &dyn WorkObject) -> Result<[u8; 32], Error> {
        let result = self
            .call("quai_computePowLight", json!([header_params(work_object)]))
            .await?;
        let hex_str = result
            .as_str()
            .ok_or_else(|| ErrorKind::UpstreamTransient(self.name.clone(), "non-string mix hash".into()))?;
        SealHash::from_hex(hex_str)
            .map(|h| h.0)
            .map_err(|e| ErrorKind::UpstreamTransient(self.name.clone(), e.to_string()).into())
    }

    async fn receive_mined_header(
        &self,
        work_object: &dyn WorkObject,
        level: usize,
    ) -> Result<(), Error> {
        let mut params = header_params(work_object);
        params["level"] = json!(level);
        self.call("quai_receiveMinedHeader", json!([params]))
            .await?;
        Ok(())
    }

    async fn receive_nonce(&self, seal_hash: &SealHash, nonce: BlockNonce) -> Result<(), Error> {
        let params = json!({
            "sealHash": seal_hash.to_hex(),
            "nonce": hex::encode(nonce.0),
        });
        self.call("quai_receiveNonce", json!([params])).await?;
        Ok(())
    }

    fn is_sick(&self) -> bool {
        self.health.is_sick()
    }
}

/// Dials the three hierarchy-level upstreams plus the zone pending-work
/// feed described in C8. Returns one client per configured endpoint; region
/// and prime are absent in seal-mining mode.
pub fn dial_all(config: &crate::config::Config) -> Result<Vec<Box<dyn UpstreamClient>>, Error> {
    let mut clients: Vec<Box<dyn UpstreamClient>> = Vec::with_capacity(3);
    let endpoints: [Option<&crate::config::UpstreamConfig>; 3] = [
        config.upstream.prime.as_ref(),
        config.upstream.region.as_ref(),
        Some(&config.upstream.zone),
    ];
    for endpoint in endpoints.iter().filter_map(|e| *e) {
        let timeout = crate::config::parse_duration(&endpoint.timeout)?;
        info!("dialing upstream {} at {}", endpoint.name, endpoint.url);
        clients.push(Box::new(HttpRpcClient::dial(
            endpoint.name.clone(),
            endpoint.url.clone(),
            timeout,
        )?));
    }
    Ok(clients)
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::sync::Mutex;

    /// In-memory upstream used by C2/C3/C7 tests: records calls, returns
    /// canned responses, never touches the network.
    pub struct MockUpstreamClient {
        pub name: String,
        pub pending: Mutex<Option<Box<dyn WorkObject>>>,
        pub order: usize,
        pub received_headers: Mutex<Vec<usize>>,
        pub received_nonces: Mutex<Vec<(SealHash, BlockNonce)>>,
        pub fail_verify: bool,
    }

    impl MockUpstreamClient {
        pub fn new(order: usize) -> Self {
            Self {
                name: "mock".to_string(),
                pending: Mutex::new(None),
                order,
                received_headers: Mutex::new(Vec::new()),
                received_nonces: Mutex::new(Vec::new()),
                fail_verify: false,
            }
        }
    }

    #[async_trait]
    impl UpstreamClient for MockUpstreamClient {
        fn name(&self) -> &str {
            &self.name
        }

        async fn get_pending_header(&self) -> Result<Box<dyn WorkObject>, Error> {
            self.pending
                .lock()
                .unwrap()
                .clone()
                .ok_or_else(|| ErrorKind::UpstreamTransient(self.name.clone(), "no pending work".into()).into())
        }

        async fn get_custom_seal_update(&self) -> Result<SealUpdate, Error> {
            let pending = self.pending.lock().unwrap();
            let work_object = pending
                .as_ref()
                .ok_or_else(|| ErrorKind::UpstreamTransient(self.name.clone(), "no pending work".into()))?;
            Ok(SealUpdate {
                seal_hash: work_object.seal_hash(),
                difficulty: work_object.difficulty(),
                prime_terminus_number: work_object.prime_terminus_number(),
                time: work_object.time(),
            })
        }

        async fn get_workshare_threshold(&self) -> Result<u64, Error> {
            Ok(1000)
        }

        async fn calc_order(&self, _work_object: &dyn WorkObject) -> Result<usize, Error> {
            Ok(self.order)
        }

        async fn verify_seal(&self, _work_object: &dyn WorkObject) -> Result<(), Error> {
            if self.fail_verify {
                Err(ErrorKind::UpstreamRejected("mock rejects".into()).into())
            } else {
                Ok(())
            }
        }

        async fn compute_pow_light(&self, _work_object: &dyn WorkObject) -> Result<[u8; 32], Error> {
            Ok([0u8; 32])
        }

        async fn receive_mined_header(
            &self,
            _work_object: &dyn WorkObject,
            level: usize,
        ) -> Result<(), Error> {
            self.received_headers.lock().unwrap().push(level);
            Ok(())
        }

        async fn receive_nonce(&self, seal_hash: &SealHash, nonce: BlockNonce) -> Result<(), Error> {
            self.received_nonces.lock().unwrap().push((*seal_hash, nonce));
            Ok(())
        }

        fn is_sick(&self) -> bool {
            false
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn health_counter_marks_sick_after_five_failures() {
        let counter = HealthCounter::new();
        for _ in 0..4 {
            counter.mark_sick();
        }
        assert!(!counter.is_sick());
        counter.mark_sick();
        assert!(counter.is_sick());
    }

    #[test]
    fn health_counter_clears_after_five_successes() {
        let counter = HealthCounter::new();
        for _ in 0..5 {
            counter.mark_sick();
        }
        assert!(counter.is_sick());
        for _ in 0..4 {
            counter.mark_alive();
        }
        assert!(counter.is_sick());
        counter.mark_alive();
        assert!(!counter.is_sick());
    }
}
