pub mod catalogue;
pub mod registry;
pub mod types;

pub use registry::*;
pub use types::*;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProfileError {
    #[error("Profile {profile}: invalid rule pattern {pattern:?}: {reason}")]
    InvalidRule {
        profile: String,
        pattern: String,
        reason: String,
    },

    #[error("Unknown profile id: {0}")]
    UnknownProfile(String),

    #[error("Catalogue has no catch-all default profile")]
    MissingDefault,

    #[error("Profile registry already initialized")]
    AlreadyInitialized,
}
