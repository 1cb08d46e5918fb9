use std::collections::BTreeMap;
use std::fmt;

use crate::domain::ListKind;

/// Deterministic identity of a cached resource: `kind[/id][?k=v&...]`,
/// parameters sorted by name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn builder(kind: &str) -> CacheKeyBuilder {
        CacheKeyBuilder {
            kind: kind.to_string(),
            id: None,
            params: BTreeMap::new(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub struct CacheKeyBuilder {
    kind: String,
    id: Option<String>,
    params: BTreeMap<String, String>,
}

impl CacheKeyBuilder {
    pub fn id(mut self, id: impl ToString) -> Self {
        self.id = Some(id.to_string());
        self
    }

    pub fn param(mut self, name: &str, value: impl ToString) -> Self {
        self.params.insert(name.to_string(), value.to_string());
        self
    }

    pub fn page(self, page: u32) -> Self {
        self.param("page", page)
    }

    pub fn build(self) -> CacheKey {
        let mut key = self.kind;
        if let Some(id) = self.id {
            key.push('/');
            key.push_str(&id);
        }
        if !self.params.is_empty() {
            let query = self
                .params
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>()
                .join("&");
            key.push('?');
            key.push_str(&query);
        }
        CacheKey(key)
    }
}

/// Invalidation tags.
pub mod tags {
    use super::ListKind;

    /// Everything derived from the signed-in user's session.
    pub const ACCOUNT: &str = "account";
    pub const MOVIES: &str = "movies";
    pub const MOVIE: &str = "movie";
    pub const PERSON: &str = "person";
    pub const GENRES: &str = "genres";

    pub fn account_list(list: ListKind) -> String {
        format!("{}:{}", ACCOUNT, list)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_are_sorted() {
        let a = CacheKey::builder("movies")
            .param("with_genres", 28)
            .page(3)
            .build();
        let b = CacheKey::builder("movies")
            .page(3)
            .param("with_genres", 28)
            .build();
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "movies?page=3&with_genres=28");
    }

    #[test]
    fn test_id_segment() {
        let key = CacheKey::builder("movie").id(550).build();
        assert_eq!(key.to_string(), "movie/550");
    }

    #[test]
    fn test_distinct_pages_are_distinct_keys() {
        let p1 = CacheKey::builder("movies").page(1).build();
        let p2 = CacheKey::builder("movies").page(2).build();
        assert_ne!(p1, p2);
    }

    #[test]
    fn test_account_list_tag() {
        assert_eq!(tags::account_list(ListKind::Favorite), "account:favorite");
    }
}
