pub mod orchestrator;
pub mod parser;
pub mod prompt;
pub mod providers;
pub mod retry;
pub mod sanitize;
pub mod types;

pub use orchestrator::*;
pub use providers::{build_provider, Provider, ProviderConfig, ProviderError, RawResponse};
pub use retry::RetryPolicy;
pub use types::*;
