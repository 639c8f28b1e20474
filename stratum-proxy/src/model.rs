//! Data model (§3): the opaque chain work object, the block template the
//! proxy distributes, and per-session state.

use ii_stratum::U256;

use serde::{Deserialize, Serialize};

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::net::SocketAddr;
use std::sync::Arc;

/// Number of levels in the chain's hierarchy: prime, region, zone. Order 0 is
/// the highest level (prime), `HIERARCHY_DEPTH - 1` is the zone.
pub const HIERARCHY_DEPTH: usize = 3;

pub const PRIME_CTX: usize = 0;
pub const REGION_CTX: usize = 1;
pub const ZONE_CTX: usize = 2;

/// 32-byte seal hash: the value miners hash against, independent of nonce
/// and mix-hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SealHash(#[serde(with = "hex_bytes32")] pub [u8; 32]);

impl SealHash {
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s.trim_start_matches("0x"))?;
        if bytes.len() != 32 {
            return Err(hex::FromHexError::InvalidStringLength);
        }
        let mut array = [0u8; 32];
        array.copy_from_slice(&bytes);
        Ok(SealHash(array))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

mod hex_bytes32 {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<[u8; 32], D::Error> {
        let s = String::deserialize(deserializer)?;
        super::SealHash::from_hex(&s)
            .map(|h| h.0)
            .map_err(serde::de::Error::custom)
    }
}

/// 64-bit block nonce, as submitted by a miner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockNonce(pub [u8; 8]);

impl BlockNonce {
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s)?;
        if bytes.len() != 8 {
            return Err(hex::FromHexError::InvalidStringLength);
        }
        let mut array = [0u8; 8];
        array.copy_from_slice(&bytes);
        Ok(BlockNonce(array))
    }
}

/// The chain's canonical pending-work record. Treated as opaque data by the
/// core engine: only the accessors below are used to drive job distribution
/// and submission.
pub trait WorkObject: Send + Sync + std::fmt::Debug {
    fn seal_hash(&self) -> SealHash;
    fn number_at(&self, level: usize) -> u64;
    fn difficulty(&self) -> u64;
    fn prime_terminus_number(&self) -> Option<u64>;
    fn time(&self) -> u64;
    fn number_array(&self) -> [u64; HIERARCHY_DEPTH];
    fn set_nonce(&mut self, nonce: BlockNonce);
    fn set_mix_hash(&mut self, mix_hash: [u8; 32]);
    fn nonce(&self) -> Option<BlockNonce>;
    fn mix_hash(&self) -> Option<[u8; 32]>;
    fn box_clone(&self) -> Box<dyn WorkObject>;

    /// Applies the ingest loop's coinbase/lockup policy (§4.3 full-mode
    /// step 2). A no-op default covers `WorkObject` implementations that
    /// don't carry these fields (e.g. test doubles).
    fn set_coinbase(&mut self, _coinbase: String) {}
    fn set_lockup(&mut self, _lockup: u8) {}
}

/// Seal-mining mode's pending-work signal: the node exposes only the seal
/// hash and the fields needed to compute a share target, never the full
/// header (§1).
#[derive(Debug, Clone)]
pub struct SealUpdate {
    pub seal_hash: SealHash,
    pub difficulty: u64,
    pub prime_terminus_number: Option<u64>,
    pub time: u64,
}

impl Clone for Box<dyn WorkObject> {
    fn clone(&self) -> Self {
        self.box_clone()
    }
}

/// Concrete `WorkObject` decoded from the node's pending-header wire format.
/// Fields mirror the subset of go-quai's `types.WorkObject` the proxy needs.
#[derive(Debug, Clone, Deserialize)]
pub struct PendingWorkObject {
    #[serde(rename = "sealHash")]
    pub seal_hash: SealHash,
    pub numbers: [u64; HIERARCHY_DEPTH],
    pub difficulty: u64,
    #[serde(rename = "primeTerminusNumber")]
    pub prime_terminus_number: Option<u64>,
    pub time: u64,
    #[serde(skip)]
    pub nonce: Option<BlockNonce>,
    #[serde(skip)]
    pub mix_hash: Option<[u8; 32]>,
    #[serde(skip)]
    pub coinbase: Option<String>,
    #[serde(skip)]
    pub lockup: Option<u8>,
}

impl WorkObject for PendingWorkObject {
    fn seal_hash(&self) -> SealHash {
        self.seal_hash
    }

    fn number_at(&self, level: usize) -> u64 {
        self.numbers[level]
    }

    fn difficulty(&self) -> u64 {
        self.difficulty
    }

    fn prime_terminus_number(&self) -> Option<u64> {
        self.prime_terminus_number
    }

    fn time(&self) -> u64 {
        self.time
    }

    fn number_array(&self) -> [u64; HIERARCHY_DEPTH] {
        self.numbers
    }

    fn set_nonce(&mut self, nonce: BlockNonce) {
        self.nonce = Some(nonce);
    }

    fn set_mix_hash(&mut self, mix_hash: [u8; 32]) {
        self.mix_hash = Some(mix_hash);
    }

    fn nonce(&self) -> Option<BlockNonce> {
        self.nonce
    }

    fn mix_hash(&self) -> Option<[u8; 32]> {
        self.mix_hash
    }

    fn box_clone(&self) -> Box<dyn WorkObject> {
        Box::new(self.clone())
    }

    fn set_coinbase(&mut self, coinbase: String) {
        self.coinbase = Some(coinbase);
    }

    fn set_lockup(&mut self, lockup: u8) {
        self.lockup = Some(lockup);
    }
}

/// The job the proxy currently hands out to miners (§3 Invariants I1-I3).
#[derive(Clone)]
pub struct BlockTemplate {
    /// Present in full mode, absent in seal-only mode.
    pub work_object: Option<Box<dyn WorkObject>>,
    pub target: U256,
    pub height: [u64; HIERARCHY_DEPTH],
    pub prime_terminus_number: u64,
    pub custom_seal: SealHash,
    /// Update timestamp as reported by the seal-hash subscription; only
    /// meaningful in seal-mining mode, where `custom_seal` alone can
    /// legitimately repeat across distinct updates (§4.2).
    pub time: Option<u64>,
    pub job_id: u64,
}

impl BlockTemplate {
    /// The key the short-circuit dedup check (§4.2) compares on: in full
    /// mode the seal hash alone determines it; in seal-mining mode the
    /// `(seal_hash, time)` tuple is used instead.
    pub fn dedup_key(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.custom_seal.0.hash(&mut hasher);
        if self.work_object.is_none() {
            self.time.hash(&mut hasher);
        }
        hasher.finish()
    }
}

/// A cached job, looked up by job ID when a `mining.submit` arrives.
#[derive(Clone)]
pub struct WorkEntry {
    pub work_object: Option<Box<dyn WorkObject>>,
    pub custom_seal: SealHash,
    pub target: U256,
}

impl From<&BlockTemplate> for WorkEntry {
    fn from(template: &BlockTemplate) -> Self {
        Self {
            work_object: template.work_object.clone(),
            custom_seal: template.custom_seal,
            target: template.target,
        }
    }
}

/// Per-connection session state (§3 Session).
pub struct SessionInfo {
    pub peer: SocketAddr,
    pub extranonce: String,
    pub seal_mining: bool,
}

/// A registered, authorized session's identity, as seen by the broadcaster
/// and submission router.
#[derive(Clone)]
pub struct SessionHandle {
    pub id: u64,
    pub peer: SocketAddr,
    pub login: Arc<str>,
}
