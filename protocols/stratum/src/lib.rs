//! The line-delimited JSON stratum dialect (§6) spoken between the proxy
//! and connected miners: message types, wire codec, and share-target math.

pub mod codec;
pub mod error;
pub mod message;
pub mod target;

#[cfg(test)]
mod test;

pub use codec::Codec;
pub use error::Error;
pub use message::{Method, Notification, Request, Response, ServerMessage, StratumError};
pub use target::U256;

/// PoW dataset epoch length, used to compute `mining.set.params.epoch` from
/// `prime_terminus_number`.
pub const EPOCH_LENGTH: u64 = 30000;

pub fn epoch_from_prime_terminus_number(prime_terminus_number: u64) -> u64 {
    prime_terminus_number / EPOCH_LENGTH
}

/// Wire framing glue for [`ii_wire::Server`]/[`ii_wire::Connection`].
#[derive(Debug)]
pub struct Framing;

impl ii_wire::Framing for Framing {
    type Tx = ServerMessage;
    type Rx = Request;
    type Error = Error;
    type Codec = Codec;
}

pub type Server = ii_wire::Server<Framing>;
pub type Connection = ii_wire::Connection<Framing>;
