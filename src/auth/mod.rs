//! Request-token to session exchange and persisted identity.
//!
//! ```text
//! LoggedOut -> TokenRequested -> TokenApproved -> SessionEstablished
//!                    \________________\_________________-> AuthFailed
//! ```
//!
//! A persisted session puts the machine straight into `SessionEstablished`
//! on startup; a persisted request token alone resumes `TokenRequested`.

pub mod state;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Deserialize;
use serde_json::json;
use url::Url;

use crate::app::{ApiErrorKind, ReelError, Result};
use crate::cache::tags;
use crate::catalog::Catalog;
use crate::config::AuthConfig;
use crate::domain::{Account, Credentials};
use crate::store::{keys, KeyValueStore};
use crate::transport::ApiRequest;

pub use state::AuthState;

/// What the user needs to approve a freshly issued request token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginTicket {
    pub request_token: String,
    pub approval_url: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    success: bool,
    request_token: String,
}

#[derive(Debug, Deserialize)]
struct SessionResponse {
    #[serde(default)]
    success: bool,
    session_id: String,
}

#[derive(Debug)]
struct AuthInner {
    state: AuthState,
    credentials: Credentials,
    failure: Option<ApiErrorKind>,
    /// A session exchange for the approved token is in flight.
    exchanging: bool,
}

pub struct SessionAuthenticator {
    catalog: Arc<Catalog>,
    store: Arc<dyn KeyValueStore + Send + Sync>,
    config: AuthConfig,
    inner: Mutex<AuthInner>,
}

impl SessionAuthenticator {
    /// Rebuild the authenticator from whatever the store holds.
    pub fn restore(
        catalog: Arc<Catalog>,
        store: Arc<dyn KeyValueStore + Send + Sync>,
        config: AuthConfig,
    ) -> Result<Self> {
        let credentials = Credentials {
            request_token: store.get(keys::REQUEST_TOKEN)?,
            session_id: store.get(keys::SESSION_ID)?,
            account_id: store.get(keys::ACCOUNT_ID)?,
        };

        let state = if credentials.has_session() {
            AuthState::SessionEstablished
        } else if credentials.request_token.is_some() {
            AuthState::TokenRequested
        } else {
            AuthState::LoggedOut
        };

        if let Some(fp) = credentials.session_fingerprint() {
            tracing::info!("Restored session {}", fp);
        } else {
            tracing::debug!("Starting {}", state);
        }

        Ok(Self {
            catalog,
            store,
            config,
            inner: Mutex::new(AuthInner {
                state,
                credentials,
                failure: None,
                exchanging: false,
            }),
        })
    }

    pub fn state(&self) -> AuthState {
        self.lock().state
    }

    pub fn credentials(&self) -> Credentials {
        self.lock().credentials.clone()
    }

    pub fn last_failure(&self) -> Option<ApiErrorKind> {
        self.lock().failure
    }

    pub fn is_established(&self) -> bool {
        self.state() == AuthState::SessionEstablished
    }

    /// Credentials of an established session, or `Unauthorized`.
    pub fn require_session(&self) -> Result<Credentials> {
        let inner = self.lock();
        match (inner.state, inner.credentials.has_session()) {
            (AuthState::SessionEstablished, true) => Ok(inner.credentials.clone()),
            _ => Err(ApiErrorKind::Unauthorized.into()),
        }
    }

    /// Obtain a new request token and the URL where the user approves it.
    pub async fn begin_login(&self) -> Result<LoginTicket> {
        let from = self.state();
        if !from.can_begin_login() {
            return Err(ReelError::InvalidTransition {
                from,
                action: "begin login",
            });
        }

        let response = self
            .catalog
            .transport()
            .send(ApiRequest::get("authentication/token/new"))
            .await
            .and_then(|body| decode::<TokenResponse>(body, "authentication/token/new"));

        let token = match response {
            Ok(TokenResponse {
                success: true,
                request_token,
            }) => request_token,
            Ok(_) => return Err(self.fail(from, ApiErrorKind::Unknown)),
            Err(kind) => return Err(self.fail(from, kind)),
        };

        let approval_url = self.approval_url(&token)?;
        self.store.set(keys::REQUEST_TOKEN, &token)?;
        {
            let mut inner = self.lock();
            inner.credentials.request_token = Some(token.clone());
            inner.state = AuthState::TokenRequested;
            inner.failure = None;
        }
        tracing::info!("Request token issued, waiting for approval");

        Ok(LoginTicket {
            request_token: token,
            approval_url,
        })
    }

    /// The user is back from the approval page. Purely local.
    pub fn mark_approved(&self) -> Result<()> {
        let mut inner = self.lock();
        if inner.state != AuthState::TokenRequested || inner.credentials.request_token.is_none() {
            return Err(ReelError::InvalidTransition {
                from: inner.state,
                action: "approve a request token",
            });
        }
        inner.state = AuthState::TokenApproved;
        tracing::info!("Request token approved");
        Ok(())
    }

    /// Exchange the approved request token for a session.
    ///
    /// Any failure is fatal to this login attempt: the token is discarded
    /// and the machine moves to `AuthFailed`.
    pub async fn establish_session(&self) -> Result<Credentials> {
        let token = {
            let mut inner = self.lock();
            match (inner.state, inner.credentials.request_token.clone()) {
                (AuthState::TokenApproved, Some(_)) if inner.exchanging => {
                    return Err(ReelError::InvalidTransition {
                        from: AuthState::TokenApproved,
                        action: "create a second session",
                    })
                }
                (AuthState::TokenApproved, Some(token)) => {
                    inner.exchanging = true;
                    token
                }
                (from, _) => {
                    return Err(ReelError::InvalidTransition {
                        from,
                        action: "create a session",
                    })
                }
            }
        };

        let response = self
            .catalog
            .transport()
            .send(ApiRequest::post("authentication/session/new").json(json!({
                "request_token": token,
            })))
            .await
            .and_then(|body| decode::<SessionResponse>(body, "authentication/session/new"));

        let session_id = match response {
            Ok(SessionResponse {
                success: true,
                session_id,
            }) => session_id,
            Ok(_) => return Err(self.fail(AuthState::TokenApproved, ApiErrorKind::Unknown)),
            Err(kind) => return Err(self.fail(AuthState::TokenApproved, kind)),
        };

        {
            let mut inner = self.lock();
            // A logout during the exchange wins; its session is not persisted.
            if !inner.exchanging {
                return Err(ReelError::InvalidTransition {
                    from: inner.state,
                    action: "create a session",
                });
            }
            inner.exchanging = false;

            self.store.set(keys::SESSION_ID, &session_id)?;
            self.store.remove(keys::REQUEST_TOKEN)?;

            inner.credentials.session_id = Some(session_id.clone());
            inner.credentials.request_token = None;
            inner.credentials.account_id = None;
            inner.state = AuthState::SessionEstablished;
            inner.failure = None;
        }
        tracing::info!(
            "Session {} established",
            Credentials::fingerprint(&session_id)
        );

        if let Err(e) = self.account_id().await {
            tracing::warn!("Session established but account profile unavailable: {}", e);
        }

        Ok(self.credentials())
    }

    /// Approve the pending token if needed, then exchange it.
    pub async fn complete_login(&self) -> Result<Credentials> {
        if self.state() == AuthState::TokenRequested {
            self.mark_approved()?;
        }
        self.establish_session().await
    }

    /// Profile of the signed-in account, through the cache.
    pub async fn account(&self) -> Result<Arc<Account>> {
        let credentials = self.require_session()?;
        let session_id = credentials
            .session_id
            .ok_or(ReelError::Api(ApiErrorKind::Unauthorized))?;

        let account = self.catalog.account(&session_id).await.into_result()?;

        let changed = {
            let mut inner = self.lock();
            // A logout or new login may have raced the profile fetch.
            if inner.credentials.session_id.as_deref() != Some(session_id.as_str()) {
                return Err(ApiErrorKind::Unauthorized.into());
            }
            let id = account.id.to_string();
            let changed = inner.credentials.account_id.as_deref() != Some(id.as_str());
            inner.credentials.account_id = Some(id);
            changed
        };
        if changed {
            self.store.set(keys::ACCOUNT_ID, &account.id.to_string())?;
        }

        Ok(account)
    }

    /// Account id of the session, resolving the profile when it is not known yet.
    pub async fn account_id(&self) -> Result<String> {
        let credentials = self.require_session()?;
        if let Some(id) = credentials.account_id {
            return Ok(id);
        }
        Ok(self.account().await?.id.to_string())
    }

    /// Return to `LoggedOut` from any state.
    ///
    /// Clears the persisted identity and evicts every account-scoped cache
    /// entry. The remote session is deleted on a best-effort basis.
    pub async fn logout(&self) -> Result<()> {
        let previous = self.credentials();

        if let Some(ref session_id) = previous.session_id {
            let request = ApiRequest::delete("authentication/session")
                .json(json!({ "session_id": session_id }));
            if let Err(kind) = self.catalog.transport().send(request).await {
                tracing::warn!("Remote session delete failed: {}", kind);
            }
        }

        {
            let mut inner = self.lock();
            inner.state = AuthState::LoggedOut;
            inner.credentials = Credentials::empty();
            inner.failure = None;
            inner.exchanging = false;
        }
        let evicted = self.catalog.cache().evict(tags::ACCOUNT);
        tracing::info!("Logged out, dropped {} account entries", evicted);

        self.store.clear()
    }

    fn fail(&self, from: AuthState, kind: ApiErrorKind) -> ReelError {
        let mut inner = self.lock();
        let exchanging = std::mem::replace(&mut inner.exchanging, false);
        if from == AuthState::LoggedOut {
            tracing::warn!("Could not obtain a request token: {}", kind);
            return kind.into();
        }
        if from == AuthState::TokenApproved && !exchanging {
            tracing::warn!("Session exchange failed after logout: {}", kind);
            return kind.into();
        }

        inner.state = AuthState::AuthFailed;
        inner.failure = Some(kind);
        inner.credentials.request_token = None;
        drop(inner);

        if let Err(e) = self.store.remove(keys::REQUEST_TOKEN) {
            tracing::error!("Failed to discard request token: {}", e);
        }
        tracing::warn!("Login failed: {}", kind);
        kind.into()
    }

    fn approval_url(&self, token: &str) -> Result<String> {
        let mut url = Url::parse(&format!(
            "{}/{}",
            self.config.approval_url.trim_end_matches('/'),
            token
        ))?;
        if let Some(ref redirect) = self.config.redirect_url {
            url.query_pairs_mut().append_pair("redirect_to", redirect);
        }
        Ok(url.to_string())
    }

    fn lock(&self) -> MutexGuard<'_, AuthInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn decode<T: serde::de::DeserializeOwned>(
    body: serde_json::Value,
    path: &str,
) -> std::result::Result<T, ApiErrorKind> {
    serde_json::from_value(body).map_err(|e| {
        tracing::warn!("Unexpected payload from {}: {}", path, e);
        ApiErrorKind::Unknown
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::RequestCache;
    use crate::store::SqliteStore;
    use crate::transport::mock::MockTransport;
    use crate::transport::Method;
    use serde_json::json;
    use std::time::Duration;

    struct Harness {
        transport: Arc<MockTransport>,
        catalog: Arc<Catalog>,
        store: Arc<SqliteStore>,
    }

    impl Harness {
        fn new() -> Self {
            Self::with_store(Arc::new(SqliteStore::in_memory().unwrap()))
        }

        fn with_store(store: Arc<SqliteStore>) -> Self {
            let transport = Arc::new(MockTransport::new());
            let catalog = Arc::new(Catalog::new(
                transport.clone(),
                RequestCache::new(Duration::from_secs(5)),
            ));
            transport.respond(
                Method::Get,
                "authentication/token/new",
                Ok(json!({"success": true, "request_token": "tok-1"})),
            );
            transport.respond(
                Method::Post,
                "authentication/session/new",
                Ok(json!({"success": true, "session_id": "sess-1"})),
            );
            transport.respond(
                Method::Get,
                "account",
                Ok(json!({"id": 42, "username": "ripley"})),
            );
            transport.respond(
                Method::Delete,
                "authentication/session",
                Ok(json!({"success": true})),
            );
            Self {
                transport,
                catalog,
                store,
            }
        }

        fn auth(&self) -> SessionAuthenticator {
            SessionAuthenticator::restore(
                self.catalog.clone(),
                self.store.clone(),
                AuthConfig::default(),
            )
            .unwrap()
        }
    }

    #[tokio::test]
    async fn test_fresh_start_is_logged_out() {
        let h = Harness::new();
        let auth = h.auth();
        assert_eq!(auth.state(), AuthState::LoggedOut);
        assert_eq!(auth.credentials(), Credentials::empty());
        assert!(auth.require_session().is_err());
    }

    #[tokio::test]
    async fn test_persisted_session_skips_exchange() {
        let h = Harness::new();
        h.store.set(keys::SESSION_ID, "sess-old").unwrap();
        h.store.set(keys::ACCOUNT_ID, "7").unwrap();

        let auth = h.auth();
        assert_eq!(auth.state(), AuthState::SessionEstablished);
        assert_eq!(auth.credentials().account_id.as_deref(), Some("7"));
        assert_eq!(h.transport.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_persisted_token_resumes_approval() {
        let h = Harness::new();
        h.store.set(keys::REQUEST_TOKEN, "tok-pending").unwrap();

        let auth = h.auth();
        assert_eq!(auth.state(), AuthState::TokenRequested);
        auth.complete_login().await.unwrap();
        assert_eq!(auth.state(), AuthState::SessionEstablished);

        let exchange = h
            .transport
            .calls()
            .into_iter()
            .find(|r| r.path == "authentication/session/new")
            .unwrap();
        assert_eq!(exchange.body, Some(json!({"request_token": "tok-pending"})));
    }

    #[tokio::test]
    async fn test_full_login_flow() {
        let h = Harness::new();
        let auth = h.auth();

        let ticket = auth.begin_login().await.unwrap();
        assert_eq!(ticket.request_token, "tok-1");
        assert_eq!(
            ticket.approval_url,
            "https://www.themoviedb.org/authenticate/tok-1"
        );
        assert_eq!(auth.state(), AuthState::TokenRequested);
        assert_eq!(h.store.get(keys::REQUEST_TOKEN).unwrap().as_deref(), Some("tok-1"));

        auth.mark_approved().unwrap();
        assert_eq!(auth.state(), AuthState::TokenApproved);

        let creds = auth.establish_session().await.unwrap();
        assert_eq!(auth.state(), AuthState::SessionEstablished);
        assert_eq!(creds.session_id.as_deref(), Some("sess-1"));
        assert_eq!(creds.account_id.as_deref(), Some("42"));
        assert_eq!(creds.request_token, None);
        assert_eq!(h.store.get(keys::SESSION_ID).unwrap().as_deref(), Some("sess-1"));
        assert_eq!(h.store.get(keys::ACCOUNT_ID).unwrap().as_deref(), Some("42"));
        assert_eq!(h.store.get(keys::REQUEST_TOKEN).unwrap(), None);
    }

    #[tokio::test]
    async fn test_approval_url_carries_redirect() {
        let h = Harness::new();
        let auth = SessionAuthenticator::restore(
            h.catalog.clone(),
            h.store.clone(),
            AuthConfig {
                redirect_url: Some("http://localhost:3000/approved".into()),
                ..Default::default()
            },
        )
        .unwrap();

        let ticket = auth.begin_login().await.unwrap();
        assert_eq!(
            ticket.approval_url,
            "https://www.themoviedb.org/authenticate/tok-1?redirect_to=http%3A%2F%2Flocalhost%3A3000%2Fapproved"
        );
    }

    #[tokio::test]
    async fn test_exchange_failure_is_fatal_to_attempt() {
        let h = Harness::new();
        h.transport.respond(
            Method::Post,
            "authentication/session/new",
            Err(ApiErrorKind::Unauthorized),
        );
        let auth = h.auth();

        auth.begin_login().await.unwrap();
        auth.mark_approved().unwrap();
        let err = auth.establish_session().await.unwrap_err();

        assert_eq!(err.api_kind(), Some(ApiErrorKind::Unauthorized));
        assert_eq!(auth.state(), AuthState::AuthFailed);
        assert_eq!(auth.last_failure(), Some(ApiErrorKind::Unauthorized));
        assert_eq!(auth.credentials(), Credentials::empty());
        assert_eq!(h.store.get(keys::REQUEST_TOKEN).unwrap(), None);
        assert_eq!(h.transport.count(Method::Post, "authentication/session/new"), 1);

        // Not retried: another exchange needs a new login.
        assert!(matches!(
            auth.establish_session().await,
            Err(ReelError::InvalidTransition { .. })
        ));
        auth.begin_login().await.unwrap();
        assert_eq!(auth.state(), AuthState::TokenRequested);
    }

    #[tokio::test]
    async fn test_concurrent_exchange_posts_once() {
        let h = Harness::new();
        h.transport
            .delay("authentication/session/new", Duration::from_millis(50));
        let auth = h.auth();
        auth.begin_login().await.unwrap();
        auth.mark_approved().unwrap();

        let (first, second) = tokio::join!(auth.establish_session(), auth.establish_session());

        assert_eq!(first.unwrap().session_id.as_deref(), Some("sess-1"));
        assert!(matches!(
            second,
            Err(ReelError::InvalidTransition {
                from: AuthState::TokenApproved,
                ..
            })
        ));
        assert_eq!(h.transport.count(Method::Post, "authentication/session/new"), 1);
        assert_eq!(auth.state(), AuthState::SessionEstablished);
    }

    #[tokio::test]
    async fn test_logout_during_exchange_discards_session() {
        let h = Harness::new();
        h.transport
            .delay("authentication/session/new", Duration::from_millis(100));
        let auth = h.auth();
        auth.begin_login().await.unwrap();
        auth.mark_approved().unwrap();

        let (exchanged, logged_out) = tokio::join!(auth.establish_session(), async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            auth.logout().await
        });

        logged_out.unwrap();
        assert!(matches!(
            exchanged,
            Err(ReelError::InvalidTransition { .. })
        ));
        assert_eq!(auth.state(), AuthState::LoggedOut);
        assert_eq!(h.store.get(keys::SESSION_ID).unwrap(), None);
    }

    #[tokio::test]
    async fn test_unsuccessful_exchange_payload_fails() {
        let h = Harness::new();
        h.transport.respond(
            Method::Post,
            "authentication/session/new",
            Ok(json!({"success": false, "session_id": ""})),
        );
        let auth = h.auth();
        auth.begin_login().await.unwrap();

        assert!(auth.complete_login().await.is_err());
        assert_eq!(auth.state(), AuthState::AuthFailed);
    }

    #[tokio::test]
    async fn test_token_failure_from_logged_out_stays_logged_out() {
        let h = Harness::new();
        h.transport.respond(
            Method::Get,
            "authentication/token/new",
            Err(ApiErrorKind::NetworkFailure),
        );
        let auth = h.auth();

        let err = auth.begin_login().await.unwrap_err();
        assert_eq!(err.api_kind(), Some(ApiErrorKind::NetworkFailure));
        assert_eq!(auth.state(), AuthState::LoggedOut);
    }

    #[tokio::test]
    async fn test_out_of_order_transitions_are_rejected() {
        let h = Harness::new();
        let auth = h.auth();

        assert!(matches!(
            auth.mark_approved(),
            Err(ReelError::InvalidTransition {
                from: AuthState::LoggedOut,
                ..
            })
        ));
        assert!(auth.establish_session().await.is_err());
        assert_eq!(h.transport.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_begin_login_rejected_when_signed_in() {
        let h = Harness::new();
        h.store.set(keys::SESSION_ID, "sess-old").unwrap();
        let auth = h.auth();

        assert!(matches!(
            auth.begin_login().await,
            Err(ReelError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn test_logout_clears_everything() {
        let h = Harness::new();
        let auth = h.auth();
        auth.begin_login().await.unwrap();
        auth.complete_login().await.unwrap();
        assert!(!h.catalog.cache().is_empty());

        auth.logout().await.unwrap();

        assert_eq!(auth.state(), AuthState::LoggedOut);
        assert_eq!(auth.credentials(), Credentials::empty());
        assert_eq!(h.store.get(keys::SESSION_ID).unwrap(), None);
        assert_eq!(h.store.get(keys::ACCOUNT_ID).unwrap(), None);
        assert!(h.catalog.cache().is_empty());
        assert_eq!(h.transport.count(Method::Delete, "authentication/session"), 1);
    }

    #[tokio::test]
    async fn test_logout_survives_remote_failure() {
        let h = Harness::new();
        h.store.set(keys::SESSION_ID, "sess-old").unwrap();
        h.transport.respond(
            Method::Delete,
            "authentication/session",
            Err(ApiErrorKind::NetworkFailure),
        );
        let auth = h.auth();

        auth.logout().await.unwrap();
        assert_eq!(auth.state(), AuthState::LoggedOut);
        assert_eq!(h.store.get(keys::SESSION_ID).unwrap(), None);
    }

    #[tokio::test]
    async fn test_logout_from_token_requested() {
        let h = Harness::new();
        let auth = h.auth();
        auth.begin_login().await.unwrap();

        auth.logout().await.unwrap();
        assert_eq!(auth.state(), AuthState::LoggedOut);
        assert_eq!(h.store.get(keys::REQUEST_TOKEN).unwrap(), None);
        assert_eq!(h.transport.count(Method::Delete, "authentication/session"), 0);
    }

    #[tokio::test]
    async fn test_account_id_resolved_lazily_after_restore() {
        let h = Harness::new();
        h.store.set(keys::SESSION_ID, "sess-old").unwrap();
        let auth = h.auth();
        assert_eq!(auth.credentials().account_id, None);

        assert_eq!(auth.account_id().await.unwrap(), "42");
        assert_eq!(auth.account_id().await.unwrap(), "42");
        assert_eq!(h.transport.count(Method::Get, "account"), 1);
        assert_eq!(h.store.get(keys::ACCOUNT_ID).unwrap().as_deref(), Some("42"));
    }

    #[tokio::test]
    async fn test_session_survives_process_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reelsync.db");

        {
            let h = Harness::with_store(Arc::new(SqliteStore::new(&path).unwrap()));
            let auth = h.auth();
            auth.begin_login().await.unwrap();
            auth.complete_login().await.unwrap();
        }

        let h = Harness::with_store(Arc::new(SqliteStore::new(&path).unwrap()));
        let auth = h.auth();
        assert_eq!(auth.state(), AuthState::SessionEstablished);
        assert_eq!(auth.credentials().session_id.as_deref(), Some("sess-1"));
        assert_eq!(h.transport.total_calls(), 0);
    }
}
