//! Error taxonomy shared by the whole crate.
//!
//! Every error here indicates a caller-side misconfiguration or an engine
//! failure: all of them are fail-fast, none are retried internally.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Requested scanner preset is not in the registry.
    #[error("no scanner preset named `{0}`")]
    UnknownScanner(String),

    /// Scanner parameters fail the consistency predicate. No partially-valid
    /// geometry is ever returned.
    #[error("inconsistent scanner geometry: {0}")]
    GeometryConsistency(String),

    /// Compression settings which cannot describe a projection-data geometry
    /// (even span, ring difference beyond the scanner, zero views or bins).
    #[error("invalid compression settings: {0}")]
    InvalidCompression(String),

    /// Operator domain/range does not match the supplied buffer. Raised
    /// before any engine setup, so no expensive work is wasted.
    #[error("{what}: shape {expected:?} does not match {actual:?}")]
    ShapeMismatch {
        what: &'static str,
        expected: [usize; 3],
        actual: [usize; 3],
    },

    /// A flat buffer whose length disagrees with the descriptor it is
    /// supposed to fill.
    #[error("buffer holds {actual} elements where {expected} were expected")]
    BufferLength { expected: usize, actual: usize },

    /// A projection-engine call failed. Propagated verbatim, never
    /// interpreted further by this crate.
    #[error("projection engine call failed: {0}")]
    EngineCall(String),

    #[error("failed to parse configuration: {0}")]
    Config(#[from] toml::de::Error),

    #[error("failed to write header: {0}")]
    HeaderWrite(#[from] toml::ser::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
