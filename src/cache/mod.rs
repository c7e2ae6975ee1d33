//! Shared, reference-counted snapshot subscriptions.
//!
//! Views do not subscribe to the store themselves. They acquire a handle from
//! the collection's [`SnapshotCache`], which keeps exactly one upstream
//! subscription open while at least one handle is alive.

use log::debug;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::store::{Snapshot, Store, Subscription};
use crate::utils::{Activity, Duty, Officer, Vehicle};

type Connect<T> = Box<dyn Fn() -> Subscription<T> + Send + Sync>;

#[derive(Default)]
struct CacheState {
    refs: usize,
    connects: usize,
    forwarder: Option<JoinHandle<()>>,
}

struct CacheInner<T> {
    name: &'static str,
    connect: Connect<T>,
    state: Mutex<CacheState>,
    latest: watch::Sender<Snapshot<T>>,
}

pub struct SnapshotCache<T> {
    inner: Arc<CacheInner<T>>,
}

impl<T> Clone for SnapshotCache<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Send + Sync + 'static> SnapshotCache<T> {
    pub fn new<F>(name: &'static str, connect: F) -> Self
    where
        F: Fn() -> Subscription<T> + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(CacheInner {
                name,
                connect: Box::new(connect),
                state: Mutex::new(CacheState::default()),
                latest: watch::channel(Arc::new(Vec::new())).0,
            }),
        }
    }

    /// Registers a reader. The first live handle opens the upstream
    /// subscription; must be called inside a tokio runtime.
    pub fn acquire(&self) -> CacheHandle<T> {
        let mut state = self.inner.state.lock().unwrap_or_else(PoisonError::into_inner);

        if state.refs == 0 {
            let mut upstream = (self.inner.connect)();
            self.inner
                .latest
                .send_replace(upstream.borrow_and_update().clone());

            let inner = Arc::clone(&self.inner);
            state.forwarder = Some(tokio::spawn(async move {
                while upstream.changed().await.is_ok() {
                    let snapshot = upstream.borrow_and_update().clone();
                    inner.latest.send_replace(snapshot);
                }
            }));
            state.connects += 1;
            debug!("Opened upstream subscription for {}", self.inner.name);
        }
        state.refs += 1;

        CacheHandle {
            inner: Arc::clone(&self.inner),
            receiver: self.inner.latest.subscribe(),
        }
    }

    pub fn ref_count(&self) -> usize {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner).refs
    }

    pub fn is_connected(&self) -> bool {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .forwarder
            .is_some()
    }

    /// How many times an upstream subscription has been opened.
    pub fn connect_count(&self) -> usize {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner).connects
    }
}

/// A live reader of one cached collection. Dropping the last handle closes
/// the upstream subscription.
pub struct CacheHandle<T> {
    inner: Arc<CacheInner<T>>,
    receiver: watch::Receiver<Snapshot<T>>,
}

impl<T> CacheHandle<T> {
    pub fn snapshot(&self) -> Snapshot<T> {
        self.receiver.borrow().clone()
    }

    pub async fn changed(&mut self) -> Option<Snapshot<T>> {
        self.receiver.changed().await.ok()?;
        Some(self.receiver.borrow_and_update().clone())
    }
}

impl<T> Drop for CacheHandle<T> {
    fn drop(&mut self) {
        let mut state = self.inner.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.refs = state.refs.saturating_sub(1);

        if state.refs == 0 {
            if let Some(forwarder) = state.forwarder.take() {
                forwarder.abort();
                debug!("Closed upstream subscription for {}", self.inner.name);
            }
        }
    }
}

/// One cache per collection, shared by every view of the running process.
#[derive(Clone)]
pub struct LiveData {
    pub duties: SnapshotCache<Duty>,
    pub officers: SnapshotCache<Officer>,
    pub vehicles: SnapshotCache<Vehicle>,
    pub activities: SnapshotCache<Activity>,
}

impl LiveData {
    pub fn new(store: Arc<dyn Store>) -> Self {
        let duties = {
            let store = Arc::clone(&store);
            SnapshotCache::new("duties", move || store.subscribe())
        };
        let officers = {
            let store = Arc::clone(&store);
            SnapshotCache::new("officers", move || store.subscribe_officers())
        };
        let vehicles = {
            let store = Arc::clone(&store);
            SnapshotCache::new("vehicles", move || store.subscribe_vehicles())
        };
        let activities = SnapshotCache::new("activities", move || store.subscribe_activities());

        Self {
            duties,
            officers,
            vehicles,
            activities,
        }
    }

    /// Holds every collection open for as long as the returned views live.
    pub fn acquire_all(&self) -> LiveViews {
        LiveViews {
            duties: self.duties.acquire(),
            officers: self.officers.acquire(),
            vehicles: self.vehicles.acquire(),
            activities: self.activities.acquire(),
        }
    }
}

pub struct LiveViews {
    pub duties: CacheHandle<Duty>,
    pub officers: CacheHandle<Officer>,
    pub vehicles: CacheHandle<Vehicle>,
    pub activities: CacheHandle<Activity>,
}
