//! Keyed fetch-and-cache engine.
//!
//! At most one fetch per key is ever in flight: later callers attach to the
//! shared future of the running fetch instead of issuing their own. Fetches
//! run on their own task and settle the slot themselves, so a caller that
//! stops awaiting never cancels the underlying request.

pub mod entry;
pub mod key;

use std::any::Any;
use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};

use crate::app::ApiErrorKind;

pub use entry::{CacheEntry, EntryStatus};
pub use key::{tags, CacheKey};

type AnyValue = Arc<dyn Any + Send + Sync>;
type Outcome = std::result::Result<AnyValue, ApiErrorKind>;
type InFlight = Shared<BoxFuture<'static, Outcome>>;
type Loader = Arc<dyn Fn() -> BoxFuture<'static, Outcome> + Send + Sync>;

struct Slot {
    status: EntryStatus,
    value: Option<AnyValue>,
    error: Option<ApiErrorKind>,
    tags: BTreeSet<String>,
    fetched_at: Option<DateTime<Utc>>,
    stale: bool,
    invalidated_in_flight: bool,
    generation: u64,
    in_flight: Option<InFlight>,
    loader: Loader,
}

impl Slot {
    fn new(loader: Loader, tags: BTreeSet<String>) -> Self {
        Self {
            status: EntryStatus::Pending,
            value: None,
            error: None,
            tags,
            fetched_at: None,
            stale: false,
            invalidated_in_flight: false,
            generation: 0,
            in_flight: None,
            loader,
        }
    }

    fn snapshot<T: Send + Sync + 'static>(&self, key: &CacheKey) -> CacheEntry<T> {
        let mut entry = CacheEntry {
            key: key.clone(),
            status: self.status,
            value: None,
            error: self.error,
            tags: self.tags.clone(),
            fetched_at: self.fetched_at,
            stale: self.stale,
        };

        if let Some(ref value) = self.value {
            match Arc::clone(value).downcast::<T>() {
                Ok(typed) => entry.value = Some(typed),
                Err(_) => {
                    tracing::warn!("Cache entry {} holds a different type", key);
                    entry.status = EntryStatus::Failed;
                    entry.error = Some(ApiErrorKind::Unknown);
                }
            }
        }

        entry
    }
}

struct Inner {
    slots: Mutex<HashMap<CacheKey, Slot>>,
    generations: AtomicU64,
    timeout: Duration,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, HashMap<CacheKey, Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record the outcome of fetch `generation`. Outcomes of fetches whose
    /// slot was evicted or restarted since are dropped.
    fn settle(&self, key: &CacheKey, generation: u64, outcome: &Outcome) {
        let mut slots = self.lock();
        let Some(slot) = slots.get_mut(key) else {
            tracing::debug!("Dropping result for evicted key {}", key);
            return;
        };
        if slot.generation != generation || slot.in_flight.is_none() {
            return;
        }

        slot.in_flight = None;
        match outcome {
            Ok(value) => {
                slot.status = EntryStatus::Ready;
                slot.value = Some(Arc::clone(value));
                slot.error = None;
                slot.fetched_at = Some(Utc::now());
                slot.stale = slot.invalidated_in_flight;
                tracing::debug!("Cache {} ready", key);
            }
            Err(kind) => {
                slot.status = EntryStatus::Failed;
                slot.value = None;
                slot.error = Some(*kind);
                slot.stale = false;
                tracing::debug!("Cache {} failed: {}", key, kind);
            }
        }
        slot.invalidated_in_flight = false;
    }
}

/// Process-wide resource cache. Cloning shares the same slots.
#[derive(Clone)]
pub struct RequestCache {
    inner: Arc<Inner>,
}

impl RequestCache {
    pub fn new(timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                slots: Mutex::new(HashMap::new()),
                generations: AtomicU64::new(1),
                timeout,
            }),
        }
    }

    /// Return the cached value for `key`, joining an in-flight fetch or
    /// starting one with `fetcher` when there is no fresh `Ready` value.
    ///
    /// The returned entry is always `Ready` or `Failed`. `fetcher` is kept
    /// for later [`refetch`](Self::refetch) calls.
    pub async fn fetch<T, F, Fut>(&self, key: CacheKey, tags: &[&str], fetcher: F) -> CacheEntry<T>
    where
        T: Send + Sync + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<T, ApiErrorKind>> + Send + 'static,
    {
        let loader: Loader = Arc::new(move || {
            let fut = fetcher();
            async move { fut.await.map(|value| Arc::new(value) as AnyValue) }.boxed()
        });
        let tags: BTreeSet<String> = tags.iter().map(|t| t.to_string()).collect();

        let (in_flight, generation) = {
            let mut slots = self.inner.lock();
            let existed = slots.contains_key(&key);
            let slot = slots
                .entry(key.clone())
                .or_insert_with(|| Slot::new(Arc::clone(&loader), tags.clone()));

            if existed && slot.status == EntryStatus::Ready && !slot.stale {
                tracing::debug!("Cache hit {}", key);
                return slot.snapshot(&key);
            }

            match slot.in_flight.clone() {
                Some(in_flight) => {
                    tracing::debug!("Joining in-flight fetch for {}", key);
                    (in_flight, slot.generation)
                }
                None => {
                    slot.loader = loader;
                    slot.tags.extend(tags);
                    self.start(&key, slot)
                }
            }
        };

        let outcome = in_flight.await;
        self.inner.settle(&key, generation, &outcome);
        self.entry_from_outcome(&key, outcome)
    }

    /// Fetch `key` again with its remembered fetcher, whatever its state.
    ///
    /// When a fetch is already running it is awaited first, then a new one is
    /// issued so the result reflects anything that changed remotely in the
    /// meantime. Returns `None` for keys that were never fetched.
    pub async fn refetch(&self, key: &CacheKey) -> Option<EntryStatus> {
        let mut waited = false;
        loop {
            let (in_flight, generation, fresh) = {
                let mut slots = self.inner.lock();
                let slot = slots.get_mut(key)?;
                match slot.in_flight.clone() {
                    Some(in_flight) => (in_flight, slot.generation, waited),
                    None => {
                        let (in_flight, generation) = self.start(key, slot);
                        (in_flight, generation, true)
                    }
                }
            };

            let outcome = in_flight.await;
            self.inner.settle(key, generation, &outcome);
            if fresh {
                return Some(match outcome {
                    Ok(_) => EntryStatus::Ready,
                    Err(_) => EntryStatus::Failed,
                });
            }
            waited = true;
        }
    }

    /// Current snapshot of `key` without any I/O, stale or not.
    pub fn peek<T: Send + Sync + 'static>(&self, key: &CacheKey) -> Option<CacheEntry<T>> {
        self.inner.lock().get(key).map(|slot| slot.snapshot(key))
    }

    pub fn status(&self, key: &CacheKey) -> Option<EntryStatus> {
        self.inner.lock().get(key).map(|slot| slot.status)
    }

    /// Mark every entry tagged `tag` stale; the next `fetch` of such a key
    /// goes to the network while `peek` keeps returning the old value.
    pub fn invalidate(&self, tag: &str) -> usize {
        let mut slots = self.inner.lock();
        let mut count = 0;
        for slot in slots.values_mut().filter(|s| s.tags.contains(tag)) {
            slot.stale = true;
            if slot.in_flight.is_some() {
                slot.invalidated_in_flight = true;
            }
            count += 1;
        }
        tracing::debug!("Invalidated {} entries tagged {}", count, tag);
        count
    }

    pub fn invalidate_key(&self, key: &CacheKey) -> bool {
        let mut slots = self.inner.lock();
        match slots.get_mut(key) {
            Some(slot) => {
                slot.stale = true;
                if slot.in_flight.is_some() {
                    slot.invalidated_in_flight = true;
                }
                true
            }
            None => false,
        }
    }

    /// Drop every entry tagged `tag`, values included. Fetches still running
    /// for those keys finish but their results are discarded.
    pub fn evict(&self, tag: &str) -> usize {
        let mut slots = self.inner.lock();
        let before = slots.len();
        slots.retain(|_, slot| !slot.tags.contains(tag));
        let count = before - slots.len();
        tracing::debug!("Evicted {} entries tagged {}", count, tag);
        count
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn start(&self, key: &CacheKey, slot: &mut Slot) -> (InFlight, u64) {
        let generation = self.inner.generations.fetch_add(1, Ordering::Relaxed);
        slot.generation = generation;
        slot.status = EntryStatus::Pending;
        slot.error = None;
        slot.invalidated_in_flight = false;

        let fut = (slot.loader)();
        let inner = Arc::clone(&self.inner);
        let task_key = key.clone();
        let timeout = self.inner.timeout;

        tracing::debug!("Cache miss {}, fetching", key);
        let handle = tokio::spawn(async move {
            let outcome = match tokio::time::timeout(timeout, fut).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    tracing::warn!("Fetch for {} timed out after {:?}", task_key, timeout);
                    Err(ApiErrorKind::Timeout)
                }
            };
            inner.settle(&task_key, generation, &outcome);
            outcome
        });

        let in_flight = async move {
            handle.await.unwrap_or_else(|e| {
                tracing::error!("Fetch task failed: {}", e);
                Err(ApiErrorKind::Unknown)
            })
        }
        .boxed()
        .shared();

        slot.in_flight = Some(in_flight.clone());
        (in_flight, generation)
    }

    fn entry_from_outcome<T: Send + Sync + 'static>(
        &self,
        key: &CacheKey,
        outcome: Outcome,
    ) -> CacheEntry<T> {
        let (tags, fetched_at) = self
            .inner
            .lock()
            .get(key)
            .map(|slot| (slot.tags.clone(), slot.fetched_at))
            .unwrap_or_default();

        let mut entry = CacheEntry {
            key: key.clone(),
            status: EntryStatus::Failed,
            value: None,
            error: None,
            tags,
            fetched_at,
            stale: false,
        };

        match outcome {
            Ok(value) => match value.downcast::<T>() {
                Ok(typed) => {
                    entry.status = EntryStatus::Ready;
                    entry.value = Some(typed);
                }
                Err(_) => {
                    tracing::warn!("Cache entry {} holds a different type", key);
                    entry.error = Some(ApiErrorKind::Unknown);
                }
            },
            Err(kind) => entry.error = Some(kind),
        }

        entry
    }
}
