pub mod sqlite;

use crate::app::Result;

pub use sqlite::SqliteStore;

/// Keys the authenticator persists.
pub mod keys {
    pub const REQUEST_TOKEN: &str = "request_token";
    pub const SESSION_ID: &str = "session_id";
    pub const ACCOUNT_ID: &str = "account_id";
}

/// Durable string key/value storage that survives restarts.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
    fn clear(&self) -> Result<()>;
}
