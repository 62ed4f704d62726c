/// Persistence for shares, versions, sessions, teams and users
///
/// Each store is a cheap-to-clone manager over the shared SQLite pool.
/// Multi-row flows (team creation, invite acceptance, share deletion) run
/// inside a single transaction.

pub mod sessions;
pub mod shares;
pub mod teams;
pub mod users;

pub use sessions::SessionStore;
pub use shares::{Share, ShareStore, ShareSummary, ShareVersion};
pub use teams::{TeamInvite, TeamMember, TeamRole, TeamStore};
pub use users::{User, UserStore};

use thiserror::Error;

/// Store-layer errors
#[derive(Error, Debug)]
pub enum StoreError {
    /// Referenced record does not exist
    #[error("{0}")]
    NotFound(&'static str),

    /// Caller passed arguments the operation cannot act on
    #[error("invalid request: {0}")]
    Invalid(&'static str),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;
