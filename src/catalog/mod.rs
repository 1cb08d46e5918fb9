//! Typed, cached reads against the remote movie API.

pub mod query;

use std::sync::Arc;

use serde::de::DeserializeOwned;

use crate::app::{ApiErrorKind, Result};
use crate::cache::{tags, CacheEntry, CacheKey, RequestCache};
use crate::domain::{Account, AccountStates, Credentials, GenreList, ListKind, Movie, Page, Person};
use crate::transport::{ApiRequest, Transport};

pub use query::{MovieCategory, MovieQuery};

pub struct Catalog {
    transport: Arc<dyn Transport + Send + Sync>,
    cache: RequestCache,
}

impl Catalog {
    pub fn new(transport: Arc<dyn Transport + Send + Sync>, cache: RequestCache) -> Self {
        Self { transport, cache }
    }

    pub fn transport(&self) -> &Arc<dyn Transport + Send + Sync> {
        &self.transport
    }

    pub fn cache(&self) -> &RequestCache {
        &self.cache
    }

    pub async fn movies(&self, query: &MovieQuery, page: u32) -> CacheEntry<Page<Movie>> {
        self.cached(query.cache_key(page), &[tags::MOVIES], query.request(page))
            .await
    }

    pub async fn movie(&self, id: u64) -> CacheEntry<Movie> {
        let key = CacheKey::builder("movie").id(id).build();
        self.cached(key, &[tags::MOVIE], ApiRequest::get(format!("movie/{}", id)))
            .await
    }

    pub async fn recommendations(&self, id: u64, page: u32) -> CacheEntry<Page<Movie>> {
        let key = CacheKey::builder("recommendations").id(id).page(page).build();
        let request = ApiRequest::get(format!("movie/{}/recommendations", id)).query("page", page);
        self.cached(key, &[tags::MOVIE], request).await
    }

    pub async fn genres(&self) -> CacheEntry<GenreList> {
        let key = CacheKey::builder("genres").build();
        self.cached(key, &[tags::GENRES], ApiRequest::get("genre/movie/list"))
            .await
    }

    pub async fn person(&self, id: u64) -> CacheEntry<Person> {
        let key = CacheKey::builder("person").id(id).build();
        self.cached(key, &[tags::PERSON], ApiRequest::get(format!("person/{}", id)))
            .await
    }

    pub async fn movies_by_person(&self, id: u64, page: u32) -> CacheEntry<Page<Movie>> {
        let key = CacheKey::builder("person_movies").id(id).page(page).build();
        let request = ApiRequest::get("discover/movie")
            .query("with_cast", id)
            .query("page", page);
        self.cached(key, &[tags::PERSON, tags::MOVIES], request).await
    }

    /// Profile of the account behind `session_id`.
    pub async fn account(&self, session_id: &str) -> CacheEntry<Account> {
        let key = CacheKey::builder("account")
            .param("session", Credentials::fingerprint(session_id))
            .build();
        let request = ApiRequest::get("account").query("session_id", session_id);
        self.cached(key, &[tags::ACCOUNT], request).await
    }

    pub fn account_list_key(&self, credentials: &Credentials, list: ListKind, page: u32) -> Option<CacheKey> {
        let account_id = credentials.account_id.as_deref()?;
        let fingerprint = credentials.session_fingerprint()?;
        Some(
            CacheKey::builder("account_list")
                .id(format!("{}/{}", account_id, list))
                .param("session", fingerprint)
                .page(page)
                .build(),
        )
    }

    /// One page of the signed-in user's favorite or watchlist movies.
    pub async fn account_list(
        &self,
        credentials: &Credentials,
        list: ListKind,
        page: u32,
    ) -> Result<CacheEntry<Page<Movie>>> {
        let (key, session_id, account_id) = match (
            self.account_list_key(credentials, list, page),
            credentials.session_id.as_deref(),
            credentials.account_id.as_deref(),
        ) {
            (Some(key), Some(session), Some(account)) => (key, session, account),
            _ => return Err(ApiErrorKind::Unauthorized.into()),
        };

        let request = ApiRequest::get(format!("account/{}/{}/movies", account_id, list))
            .query("session_id", session_id)
            .query("page", page);
        let list_tag = tags::account_list(list);
        Ok(self
            .cached(key, &[tags::ACCOUNT, list_tag.as_str()], request)
            .await)
    }

    pub fn account_states_key(&self, credentials: &Credentials, movie_id: u64) -> Option<CacheKey> {
        let fingerprint = credentials.session_fingerprint()?;
        Some(
            CacheKey::builder("account_states")
                .id(movie_id)
                .param("session", fingerprint)
                .build(),
        )
    }

    /// Favorite, watchlist and rating flags of one movie for the signed-in user.
    pub async fn account_states(
        &self,
        credentials: &Credentials,
        movie_id: u64,
    ) -> Result<CacheEntry<AccountStates>> {
        let (key, session_id) = match (
            self.account_states_key(credentials, movie_id),
            credentials.session_id.as_deref(),
        ) {
            (Some(key), Some(session)) => (key, session),
            _ => return Err(ApiErrorKind::Unauthorized.into()),
        };

        let request = ApiRequest::get(format!("movie/{}/account_states", movie_id))
            .query("session_id", session_id);
        Ok(self.cached(key, &[tags::ACCOUNT], request).await)
    }

    async fn cached<T>(&self, key: CacheKey, tags: &[&str], request: ApiRequest) -> CacheEntry<T>
    where
        T: DeserializeOwned + Send + Sync + 'static,
    {
        let transport = Arc::clone(&self.transport);
        self.cache
            .fetch(key, tags, move || {
                let transport = Arc::clone(&transport);
                let request = request.clone();
                async move {
                    let path = request.path.clone();
                    let body = transport.send(request).await?;
                    serde_json::from_value(body).map_err(|e| {
                        tracing::warn!("Unexpected payload from {}: {}", path, e);
                        ApiErrorKind::Unknown
                    })
                }
            })
            .await
    }
}
