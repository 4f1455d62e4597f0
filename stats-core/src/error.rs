use thiserror::Error;

/// Errors that must surface to a caller rather than being logged and dropped.
///
/// Most of the taxonomy in `spec.md` §7 (malformed UTF-8, unknown charset,
/// lost subscriber, double-release) is intentionally *not* represented here:
/// those are logged via `tracing` at the point of occurrence and never
/// become a `Result::Err`, preserving the original's propagation policy.
#[derive(Error, Debug)]
pub enum StatsError {
    #[error("handle for mount {0} is not locked")]
    HandleNotLocked(String),

    #[error("stat not found: {0}")]
    StatNotFound(String),

    #[error("engine is shutting down")]
    ShuttingDown,
}

pub type StatsResult<T> = std::result::Result<T, StatsError>;
