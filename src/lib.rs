//! # reelsync
//!
//! A command-line movie browser that keeps a TMDB account's favorites,
//! watchlist and ratings in sync.
//!
//! ## Architecture
//!
//! ```text
//! SessionAuthenticator → Catalog (RequestCache + Transport) → ListMembershipSynchronizer
//! ```
//!
//! - [`auth`]: request token to session exchange, persisted in SQLite
//! - [`cache`]: keyed, deduplicating fetch cache with tag invalidation
//! - [`sync`]: optimistic favorite/watchlist toggles with rollback
//! - [`pagination`]: ellipsis-compressed page windows
//!
//! ## Quick Start
//!
//! ```bash
//! # Sign in
//! reelsync login
//! reelsync approve
//!
//! # Browse
//! reelsync movies --category top_rated --page 2
//!
//! # Keep lists in sync
//! reelsync toggle-favorite 550
//! reelsync favorites
//! ```

/// Application context and error handling.
///
/// The [`AppContext`](app::AppContext) struct wires together all components:
/// store, transport, cache, authenticator, synchronizer.
pub mod app;

/// Session login state machine.
pub mod auth;

/// Request cache with in-flight deduplication.
///
/// - [`RequestCache`](cache::RequestCache): the keyed cache
/// - [`CacheKey`](cache::CacheKey): canonical keys
/// - [`CacheEntry`](cache::CacheEntry): snapshots handed to callers
pub mod cache;

/// Typed endpoints of the remote movie API, all served through the cache.
pub mod catalog;

/// Command-line interface using clap.
pub mod cli;

/// Configuration loaded from `~/.config/reelsync/config.toml`.
pub mod config;

/// Core domain models.
///
/// - [`Movie`](domain::Movie), [`Person`](domain::Person), [`Page`](domain::Page)
/// - [`Credentials`](domain::Credentials): persisted identity
/// - [`MembershipState`](domain::MembershipState): local list membership
pub mod domain;

pub mod pagination;

/// SQLite key-value persistence.
///
/// - [`KeyValueStore`](store::KeyValueStore): Trait defining storage operations
/// - [`SqliteStore`](store::SqliteStore): SQLite implementation
pub mod store;

/// Favorite/watchlist membership and ratings.
pub mod sync;

/// HTTP access to the remote API.
///
/// - [`Transport`](transport::Transport): Async trait for API calls
/// - [`HttpTransport`](transport::HttpTransport): reqwest-based implementation
pub mod transport;
