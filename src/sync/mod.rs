//! Optimistic favorite/watchlist toggles and ratings for the signed-in user.
//!
//! Local membership flips immediately and is reconciled against the cached
//! account lists once the remote mutation settles. Failed mutations revert.

pub mod command;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::{json, Value};

use crate::app::{ApiErrorKind, ReelError, Result};
use crate::auth::SessionAuthenticator;
use crate::cache::{tags, EntryStatus};
use crate::catalog::Catalog;
use crate::domain::{Credentials, ListKind, MembershipState, PendingOp, RatingState, TriState};
use crate::transport::ApiRequest;

pub use command::ToggleCommand;

/// Membership states of the session identified by `session`.
#[derive(Default)]
struct Items {
    session: Option<String>,
    states: HashMap<u64, MembershipState>,
}

impl Items {
    fn bind(&mut self, fingerprint: &str) -> &mut HashMap<u64, MembershipState> {
        if self.session.as_deref() != Some(fingerprint) {
            if !self.states.is_empty() {
                tracing::debug!(
                    "Session changed, dropping {} membership states",
                    self.states.len()
                );
            }
            self.states.clear();
            self.session = Some(fingerprint.to_string());
        }
        &mut self.states
    }
}

struct ActiveSession {
    credentials: Credentials,
    session_id: String,
    account_id: String,
    fingerprint: String,
}

pub struct ListMembershipSynchronizer {
    auth: Arc<SessionAuthenticator>,
    catalog: Arc<Catalog>,
    items: Mutex<Items>,
}

impl ListMembershipSynchronizer {
    pub fn new(auth: Arc<SessionAuthenticator>, catalog: Arc<Catalog>) -> Self {
        Self {
            auth,
            catalog,
            items: Mutex::new(Items::default()),
        }
    }

    /// Returns whether the item is a favorite once the toggle is confirmed.
    pub async fn toggle_favorite(&self, item_id: u64) -> Result<bool> {
        self.toggle(item_id, ListKind::Favorite).await
    }

    pub async fn toggle_watchlist(&self, item_id: u64) -> Result<bool> {
        self.toggle(item_id, ListKind::Watchlist).await
    }

    pub async fn toggle(&self, item_id: u64, list: ListKind) -> Result<bool> {
        let session = self.session().await?;
        let fp = session.fingerprint.as_str();

        let reserved = self.begin_item(fp, item_id, |state| {
            if state.is_pending(list) {
                false
            } else {
                state.set_pending(list, PendingOp::Toggle);
                true
            }
        })?;
        if !reserved {
            return Err(ReelError::TogglePending { item_id, list });
        }

        let current = match self.resolve(&session.credentials, item_id, list).await {
            Ok(current) => current,
            Err(e) => {
                self.settle_item(fp, item_id, |state| state.set_pending(list, PendingOp::None));
                return Err(e);
            }
        };

        let command = self
            .settle_item(fp, item_id, |state| {
                let command = ToggleCommand::new(item_id, list, state.flag(list), current);
                command.apply(state);
                command
            })
            .ok_or(ReelError::Api(ApiErrorKind::Unauthorized))?;
        tracing::info!(
            "Toggling {} for item {} to {} (session {})",
            list,
            item_id,
            command.target,
            fp
        );

        let outcome = self
            .catalog
            .transport()
            .send(command.request(&session.account_id, &session.session_id))
            .await
            .and_then(check_success);

        match outcome {
            Ok(()) => {
                self.settle_item(fp, item_id, |state| command.confirm(state));
                self.reconcile(&session.credentials, item_id, list).await;
                Ok(command.target)
            }
            Err(kind) => {
                self.settle_item(fp, item_id, |state| command.revert(state));
                tracing::warn!("{} toggle for item {} failed: {}", list, item_id, kind);
                Err(kind.into())
            }
        }
    }

    /// Membership of `item_id` refreshed from the cached account lists.
    /// Lists with a toggle in flight keep their optimistic value.
    pub async fn membership(&self, item_id: u64) -> Result<MembershipState> {
        let session = self.session().await?;
        let fp = session.fingerprint.as_str();

        let pending = self.begin_item(fp, item_id, |state| {
            ListKind::ALL.map(|list| state.is_pending(list))
        })?;

        for (list, pending) in ListKind::ALL.into_iter().zip(pending) {
            if pending {
                continue;
            }
            let current = self.resolve(&session.credentials, item_id, list).await?;
            self.update_item(fp, item_id, |state| {
                if !state.is_pending(list) {
                    state.set_flag(list, TriState::from_bool(current));
                }
            });
        }

        self.update_item(fp, item_id, |state| state.clone())
            .ok_or(ReelError::Api(ApiErrorKind::Unauthorized))
    }

    /// Last known state without any I/O.
    pub fn cached_membership(&self, item_id: u64) -> MembershipState {
        let fingerprint = self.auth.credentials().session_fingerprint();
        let items = self.lock();
        match fingerprint {
            Some(fp) if items.session.as_deref() == Some(fp.as_str()) => {
                items.states.get(&item_id).cloned().unwrap_or_default()
            }
            _ => MembershipState::default(),
        }
    }

    pub async fn get_rating(&self, item_id: u64) -> Result<RatingState> {
        let session = self.session().await?;
        let fp = session.fingerprint.as_str();

        let known = self.begin_item(fp, item_id, |state| state.rating)?;
        if known != RatingState::Unknown {
            return Ok(known);
        }

        let states = self
            .catalog
            .account_states(&session.credentials, item_id)
            .await?
            .into_result()?;
        self.update_item(fp, item_id, |state| state.rating = states.rated);
        Ok(states.rated)
    }

    pub async fn set_rating(&self, item_id: u64, value: f64) -> Result<()> {
        let session = self.session().await?;
        validate_rating(value)?;

        let request = ApiRequest::post(format!("movie/{}/rating", item_id))
            .query("session_id", &session.session_id)
            .json(json!({ "value": value }));
        self.rate(&session, item_id, request, RatingState::Rated(value))
            .await
    }

    pub async fn clear_rating(&self, item_id: u64) -> Result<()> {
        let session = self.session().await?;

        let request = ApiRequest::delete(format!("movie/{}/rating", item_id))
            .query("session_id", &session.session_id);
        self.rate(&session, item_id, request, RatingState::Unrated)
            .await
    }

    /// Forget every local membership state.
    pub fn reset(&self) {
        let mut items = self.lock();
        items.states.clear();
        items.session = None;
    }

    async fn rate(
        &self,
        session: &ActiveSession,
        item_id: u64,
        request: ApiRequest,
        rating: RatingState,
    ) -> Result<()> {
        self.begin_item(&session.fingerprint, item_id, |_| ())?;

        if let Err(kind) = self
            .catalog
            .transport()
            .send(request)
            .await
            .and_then(check_success)
        {
            tracing::warn!("Rating update for item {} failed: {}", item_id, kind);
            return Err(kind.into());
        }

        self.update_item(&session.fingerprint, item_id, |state| state.rating = rating);
        if let Some(key) = self.catalog.account_states_key(&session.credentials, item_id) {
            self.catalog.cache().invalidate_key(&key);
        }
        tracing::info!("Rating for item {} is now {:?}", item_id, rating);
        Ok(())
    }

    /// Whether the item is on page 1 of `list`, falling back to its
    /// account states when the list spans several pages.
    async fn resolve(&self, credentials: &Credentials, item_id: u64, list: ListKind) -> Result<bool> {
        let page = self
            .catalog
            .account_list(credentials, list, 1)
            .await?
            .into_result()?;
        if page.contains(item_id) {
            return Ok(true);
        }
        if page.total_pages <= 1 {
            return Ok(false);
        }

        let states = self
            .catalog
            .account_states(credentials, item_id)
            .await?
            .into_result()?;
        Ok(match list {
            ListKind::Favorite => states.favorite,
            ListKind::Watchlist => states.watchlist,
        })
    }

    async fn reconcile(&self, credentials: &Credentials, item_id: u64, list: ListKind) {
        let cache = self.catalog.cache();
        cache.invalidate(&tags::account_list(list));
        if let Some(key) = self.catalog.account_states_key(credentials, item_id) {
            cache.invalidate_key(&key);
        }

        if let Some(key) = self.catalog.account_list_key(credentials, list, 1) {
            if let Some(EntryStatus::Failed) = cache.refetch(&key).await {
                tracing::warn!("Refetch of {} failed after toggle", key);
            }
        }
    }

    async fn session(&self) -> Result<ActiveSession> {
        self.auth.require_session()?;
        let account_id = self.auth.account_id().await?;
        let credentials = self.auth.credentials();

        match (
            credentials.session_id.clone(),
            credentials.session_fingerprint(),
        ) {
            (Some(session_id), Some(fingerprint)) => Ok(ActiveSession {
                credentials,
                session_id,
                account_id,
                fingerprint,
            }),
            _ => Err(ApiErrorKind::Unauthorized.into()),
        }
    }

    /// Bind local state to `fingerprint` before any I/O of an operation.
    ///
    /// Fails when `fingerprint` is no longer the authenticator's session, so
    /// an operation started under a previous session can never rebind.
    fn begin_item<R>(
        &self,
        fingerprint: &str,
        item_id: u64,
        f: impl FnOnce(&mut MembershipState) -> R,
    ) -> Result<R> {
        let mut items = self.lock();
        let current = self.auth.credentials().session_fingerprint();
        if current.as_deref() != Some(fingerprint) {
            return Err(ApiErrorKind::Unauthorized.into());
        }
        Ok(f(items.bind(fingerprint).entry(item_id).or_default()))
    }

    /// Write back after I/O, creating the item if needed. A no-op once the
    /// session has changed.
    fn update_item<R>(
        &self,
        fingerprint: &str,
        item_id: u64,
        f: impl FnOnce(&mut MembershipState) -> R,
    ) -> Option<R> {
        let mut items = self.lock();
        if items.session.as_deref() != Some(fingerprint) {
            return None;
        }
        Some(f(items.states.entry(item_id).or_default()))
    }

    /// Settle an item that `begin_item` already created. A no-op once the
    /// session has changed.
    fn settle_item<R>(
        &self,
        fingerprint: &str,
        item_id: u64,
        f: impl FnOnce(&mut MembershipState) -> R,
    ) -> Option<R> {
        let mut items = self.lock();
        if items.session.as_deref() != Some(fingerprint) {
            return None;
        }
        items.states.get_mut(&item_id).map(f)
    }

    fn lock(&self) -> MutexGuard<'_, Items> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn check_success(body: Value) -> std::result::Result<(), ApiErrorKind> {
    match body.get("success") {
        Some(Value::Bool(false)) => Err(ApiErrorKind::Unknown),
        _ => Ok(()),
    }
}

fn validate_rating(value: f64) -> Result<()> {
    if (0.5..=10.0).contains(&value) && (value * 2.0).fract() == 0.0 {
        Ok(())
    } else {
        Err(ReelError::InvalidRating(value))
    }
}
