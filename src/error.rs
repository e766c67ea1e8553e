use thiserror::Error;

/// Errors surfaced by the gossip core across component boundaries.
///
/// Local per-message decisions (duplicate, expired, malformed frame) are
/// never represented here — they are normal results, not errors.
#[derive(Debug, Error, Clone)]
pub enum NodeError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("failed to bind listener: {0}")]
    Bind(String),

    #[error("codec error: {0}")]
    Codec(String),

    #[error("dial error: {0}")]
    Dial(String),

    #[error("peer not found: {0}")]
    PeerNotFound(String),

    #[error("node already shut down")]
    Shutdown,

    #[error("node already initialized")]
    AlreadyInitialized,

    #[error("node not initialized")]
    Uninitialized,

    #[error("io error: {0}")]
    Io(String),
}

impl From<std::io::Error> for NodeError {
    fn from(e: std::io::Error) -> Self {
        NodeError::Io(e.to_string())
    }
}

/// Field-invariant violation when constructing a [`crate::model::HelpRequest`].
///
/// Kept distinct from [`NodeError`]: the core never rejects a
/// structurally-valid `HelpRequest` except through `MessageStore::store`'s
/// documented duplicate/expired outcomes.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    #[error("title must be 5..100 chars, got {0}")]
    TitleLength(usize),

    #[error("description must be 10..1000 chars, got {0}")]
    DescriptionLength(usize),

    #[error("ttl_seconds must be 60..=86400, got {0}")]
    TtlOutOfRange(u64),

    #[error("latitude must be in [-90, 90], got {0}")]
    LatitudeOutOfRange(f64),

    #[error("longitude must be in [-180, 180], got {0}")]
    LongitudeOutOfRange(f64),

    #[error("accuracy_meters must be >= 0, got {0}")]
    NegativeAccuracy(f64),
}
