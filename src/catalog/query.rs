use std::fmt;
use std::str::FromStr;

use crate::cache::CacheKey;
use crate::transport::ApiRequest;

/// Curated listings the API serves under `movie/{category}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MovieCategory {
    Popular,
    TopRated,
    Upcoming,
}

impl MovieCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            MovieCategory::Popular => "popular",
            MovieCategory::TopRated => "top_rated",
            MovieCategory::Upcoming => "upcoming",
        }
    }
}

impl fmt::Display for MovieCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MovieCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "popular" => Ok(MovieCategory::Popular),
            "top_rated" => Ok(MovieCategory::TopRated),
            "upcoming" => Ok(MovieCategory::Upcoming),
            other => Err(format!(
                "Unknown category '{}'. Use popular, top_rated or upcoming",
                other
            )),
        }
    }
}

/// Which movie listing to browse. Selecting a new one starts again at page 1.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MovieQuery {
    Category(MovieCategory),
    Genre(u64),
    /// Free text handed to the search endpoint as-is.
    Search(String),
}

impl Default for MovieQuery {
    fn default() -> Self {
        MovieQuery::Category(MovieCategory::Popular)
    }
}

impl MovieQuery {
    pub fn request(&self, page: u32) -> ApiRequest {
        let request = match self {
            MovieQuery::Category(category) => ApiRequest::get(format!("movie/{}", category)),
            MovieQuery::Genre(id) => ApiRequest::get("discover/movie").query("with_genres", id),
            MovieQuery::Search(text) => ApiRequest::get("search/movie").query("query", text.trim()),
        };
        request.query("page", page)
    }

    pub fn cache_key(&self, page: u32) -> CacheKey {
        let builder = CacheKey::builder("movies");
        let builder = match self {
            MovieQuery::Category(category) => builder.param("category", category),
            MovieQuery::Genre(id) => builder.param("genre", id),
            MovieQuery::Search(text) => builder.param("search", text.trim().to_lowercase()),
        };
        builder.page(page).build()
    }
}
