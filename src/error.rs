use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Planner errors.
///
/// Everything except `Internal` is a contract violation by the calling code
/// generator: the same inputs always produce the same error, so the caller
/// should abort compilation with the diagnostic rather than retry.
#[derive(Error, Debug)]
pub enum Error {
    #[error("zero-size reservation requested")]
    ZeroSizeReservation,

    #[error("no live allocation at offset {0}")]
    UnknownOffset(usize),

    #[error(
        "out-of-order release: offset {got} released while offset {expected} \
         is the most recent active reservation"
    )]
    OutOfOrderRelease { expected: usize, got: usize },

    #[error("reservation of {size} bytes requested after the layout was finalized")]
    ReserveAfterFinalize { size: usize },

    #[error("layout has already been finalized")]
    AlreadyFinalized,

    #[error("layout has not been finalized yet")]
    NotFinalized,

    #[error("{0} workspace reservation(s) still active at finalization")]
    UnreleasedReservations(usize),

    #[error("scoped allocator used after close()")]
    AllocatorClosed,

    #[error("internal error: {0}")]
    Internal(String),
}
