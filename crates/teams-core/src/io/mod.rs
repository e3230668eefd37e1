//! Atomic file I/O primitives shared by all session stores

pub mod atomic;
pub mod error;

pub use atomic::{read_json, write_json};
pub use error::StoreError;
