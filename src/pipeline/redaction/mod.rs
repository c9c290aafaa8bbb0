pub mod generic;
pub mod redactor;
pub mod types;

pub use redactor::*;
pub use types::*;
