pub mod cleanup;
pub mod error;
