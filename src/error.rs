//! Error taxonomy shared by the enrollment engine, the credit ledger and the
//! HTTP binding.
//!
//! Every variant maps to one [`ErrorKind`] and one stable machine-readable
//! [`tag`](Error::tag), so callers can tell a conflict (maybe retry later)
//! apart from a missing entity (don't retry).

use sea_orm::DbErr;
use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Failure class of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The caller referenced an entity or state that does not exist.
    NotFound,
    /// A business invariant rejected the operation inside its transaction.
    Conflict,
    /// The request was rejected before touching the store.
    Validation,
    /// A store fault or exhausted transaction retries.
    Internal,
}

/// Errors surfaced by store operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("session {session_id} not found")]
    SessionNotFound { session_id: String },

    #[error("member {member_id} not found")]
    MemberNotFound { member_id: String },

    #[error("plan {plan_id} not found for member {member_id}")]
    PlanNotFound { member_id: String, plan_id: String },

    #[error("member {member_id} has no active enrollment in session {session_id}")]
    NoActiveEnrollment {
        session_id: String,
        member_id: String,
    },

    #[error("session {session_id} is at full capacity ({capacity})")]
    CapacityFull { session_id: String, capacity: i32 },

    #[error("member {member_id} is already enrolled in session {session_id}")]
    AlreadyEnrolled {
        session_id: String,
        member_id: String,
    },

    #[error("adjusting plan {plan_id} by {delta} would overdraw its {remaining} remaining credits")]
    NegativeCreditsRejected {
        plan_id: String,
        remaining: i32,
        delta: i32,
    },

    #[error("{0}")]
    Validation(String),

    #[error("transaction for {operation} aborted after {attempts} attempts")]
    RetriesExhausted {
        operation: &'static str,
        attempts: u32,
    },

    #[error("database error: {0}")]
    Store(#[from] DbErr),

    #[error("failed to encode value for storage: {0}")]
    Encode(String),

    #[error("failed to decode stored value: {0}")]
    Decode(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// The failure class of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::SessionNotFound { .. }
            | Self::MemberNotFound { .. }
            | Self::PlanNotFound { .. }
            | Self::NoActiveEnrollment { .. } => ErrorKind::NotFound,
            Self::CapacityFull { .. }
            | Self::AlreadyEnrolled { .. }
            | Self::NegativeCreditsRejected { .. } => ErrorKind::Conflict,
            Self::Validation(_) => ErrorKind::Validation,
            Self::RetriesExhausted { .. }
            | Self::Store(_)
            | Self::Encode(_)
            | Self::Decode(_)
            | Self::Config(_) => ErrorKind::Internal,
        }
    }

    /// Stable snake_case tag for API responses.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::SessionNotFound { .. } => "session_not_found",
            Self::MemberNotFound { .. } => "member_not_found",
            Self::PlanNotFound { .. } => "plan_not_found",
            Self::NoActiveEnrollment { .. } => "no_active_enrollment",
            Self::CapacityFull { .. } => "capacity_full",
            Self::AlreadyEnrolled { .. } => "already_enrolled",
            Self::NegativeCreditsRejected { .. } => "negative_credits_rejected",
            Self::Validation(_) => "validation_failed",
            Self::RetriesExhausted { .. }
            | Self::Store(_)
            | Self::Encode(_)
            | Self::Decode(_)
            | Self::Config(_) => "internal_error",
        }
    }
}
