use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::app::ApiErrorKind;
use crate::cache::CacheKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryStatus {
    Pending,
    Ready,
    Failed,
}

/// Typed snapshot of a cache slot.
#[derive(Debug)]
pub struct CacheEntry<T> {
    pub key: CacheKey,
    pub status: EntryStatus,
    pub value: Option<Arc<T>>,
    pub error: Option<ApiErrorKind>,
    pub tags: BTreeSet<String>,
    pub fetched_at: Option<DateTime<Utc>>,
    /// The value predates an invalidation of one of its tags.
    pub stale: bool,
}

impl<T> Clone for CacheEntry<T> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            status: self.status,
            value: self.value.clone(),
            error: self.error,
            tags: self.tags.clone(),
            fetched_at: self.fetched_at,
            stale: self.stale,
        }
    }
}

impl<T> CacheEntry<T> {
    pub fn is_ready(&self) -> bool {
        self.status == EntryStatus::Ready
    }

    pub fn value(&self) -> Option<&T> {
        self.value.as_deref()
    }

    /// The value of a `Ready` entry or the error of a `Failed` one.
    pub fn into_result(self) -> Result<Arc<T>, ApiErrorKind> {
        match (self.status, self.value) {
            (EntryStatus::Ready, Some(value)) => Ok(value),
            (EntryStatus::Failed, _) => Err(self.error.unwrap_or(ApiErrorKind::Unknown)),
            _ => Err(ApiErrorKind::Unknown),
        }
    }
}
