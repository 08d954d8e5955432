//! The user directory: the only component that touches persistent storage.
//!
//! Flows consume the narrow [`UserDirectory`] trait; the memory
//! implementation backs tests and the sqlite implementation backs
//! deployments.

mod errors;
mod memory;
mod sqlite;
mod store;
mod types;

pub use errors::DirectoryError;
pub use memory::MemoryDirectory;
pub use sqlite::SqliteDirectory;
pub use store::UserDirectory;
pub use types::{Authenticator, User, UserUpdate};
