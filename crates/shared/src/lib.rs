pub mod domain;
pub mod encoding;
pub mod error;
