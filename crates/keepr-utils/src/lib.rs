pub mod error;
pub mod expiry;
pub mod lockfile;
pub mod proc;
pub mod subprocess;
pub mod tempfile;

// Re-export core types at crate root for convenience
pub use error::{LockError, UtilError};
pub use expiry::Expiry;

pub type Result<T> = std::result::Result<T, UtilError>;
