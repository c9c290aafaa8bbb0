pub mod profiles;
pub mod extraction;
pub mod redaction;
pub mod analysis;
pub mod processor;
