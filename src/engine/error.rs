use thiserror::Error;

use crate::model::Ms;

/// Which upstream feed a snapshot belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feed {
    Rooms,
    Bookings,
}

impl std::fmt::Display for Feed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Feed::Rooms => f.write_str("rooms"),
            Feed::Bookings => f.write_str("bookings"),
        }
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    /// No initial snapshot delivered yet; computing would mark every room available.
    #[error("no {0} snapshot received yet")]
    SnapshotUnavailable(Feed),
    #[error("unknown room number: {0}")]
    UnknownRoom(String),
}

/// Failure of a single repository write.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found: {0}")]
    NotFound(String),
    #[error("write rejected for {0}")]
    Rejected(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A room or booking record the engine refuses to compute with.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedRecord {
    #[error("record has an empty id")]
    EmptyId,
    #[error("record {id} has an empty room number")]
    EmptyRoomNumber { id: String },
    #[error("booking {id} checks out at {check_out} but checks in at {check_in}")]
    InvertedWindow { id: String, check_in: Ms, check_out: Ms },
    #[error("record {id} could not be decoded: {reason}")]
    Decode { id: String, reason: String },
}
