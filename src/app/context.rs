use std::path::PathBuf;
use std::sync::Arc;

use crate::app::error::{ReelError, Result};
use crate::auth::SessionAuthenticator;
use crate::cache::RequestCache;
use crate::catalog::Catalog;
use crate::config::Config;
use crate::store::sqlite::SqliteStore;
use crate::store::KeyValueStore;
use crate::sync::ListMembershipSynchronizer;
use crate::transport::{HttpTransport, Transport};

pub struct AppContext {
    pub config: Config,
    pub store: Arc<dyn KeyValueStore + Send + Sync>,
    pub catalog: Arc<Catalog>,
    pub auth: Arc<SessionAuthenticator>,
    pub sync: ListMembershipSynchronizer,
}

impl AppContext {
    pub fn new(config: Config, db_path: Option<PathBuf>) -> Result<Self> {
        let db_path = match db_path {
            Some(p) => p,
            None => Self::default_db_path()?,
        };

        let store = Arc::new(SqliteStore::new(&db_path)?);
        let transport = Arc::new(HttpTransport::new(&config.api)?);
        Self::with_parts(config, store, transport)
    }

    /// Wire the components around an arbitrary store and transport.
    pub fn with_parts(
        config: Config,
        store: Arc<dyn KeyValueStore + Send + Sync>,
        transport: Arc<dyn Transport + Send + Sync>,
    ) -> Result<Self> {
        let cache = RequestCache::new(config.api.request_budget());
        let catalog = Arc::new(Catalog::new(transport, cache));
        let auth = Arc::new(SessionAuthenticator::restore(
            catalog.clone(),
            store.clone(),
            config.auth.clone(),
        )?);
        let sync = ListMembershipSynchronizer::new(auth.clone(), catalog.clone());

        Ok(Self {
            config,
            store,
            catalog,
            auth,
            sync,
        })
    }

    fn default_db_path() -> Result<PathBuf> {
        let data_dir = dirs::data_dir()
            .ok_or_else(|| ReelError::Config("Could not find data directory".into()))?;
        let reelsync_dir = data_dir.join("reelsync");
        std::fs::create_dir_all(&reelsync_dir)?;
        Ok(reelsync_dir.join("reelsync.db"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthState;
    use crate::store::keys;
    use crate::cache::EntryStatus;
    use crate::config::ApiConfig;
    use crate::transport::mock::MockTransport;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[test]
    fn test_wires_restored_session() {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        store.set(keys::SESSION_ID, "sess-1").unwrap();

        let ctx = AppContext::with_parts(
            Config::default(),
            store,
            Arc::new(MockTransport::new()),
        )
        .unwrap();

        assert_eq!(ctx.auth.state(), AuthState::SessionEstablished);
        assert!(ctx.catalog.cache().is_empty());
    }

    #[tokio::test]
    async fn test_cached_read_survives_a_timed_out_attempt() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            // First connection never gets an answer.
            let (_stalled, _) = listener.accept().await.unwrap();
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let _ = socket.read(&mut buf).await;

            let body = r#"{"id": 1, "title": "Heat"}"#;
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.flush().await.unwrap();
        });

        let config = Config {
            api: ApiConfig {
                base_url: format!("http://{}/3", addr),
                timeout_secs: 1,
                max_retries: 1,
                retry_backoff_ms: 10,
                ..Default::default()
            },
            ..Default::default()
        };
        let transport = Arc::new(HttpTransport::new(&config.api).unwrap());
        let ctx = AppContext::with_parts(
            config,
            Arc::new(SqliteStore::in_memory().unwrap()),
            transport,
        )
        .unwrap();

        let entry = ctx.catalog.movie(1).await;
        assert_eq!(entry.status, EntryStatus::Ready);
        assert_eq!(entry.value().unwrap().display_title(), "Heat");
    }
}
