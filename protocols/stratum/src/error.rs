//! Error type shared by the stratum [`crate::codec::Codec`]'s encoder and
//! decoder halves, and by the wire [`ii_wire::Framing`] impl.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("line exceeds maximum stratum request size of {limit} bytes")]
    LineTooLong { limit: usize },

    #[error("malformed stratum request: {0}")]
    MalformedRequest(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
