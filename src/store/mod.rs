use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use crate::utils::{Activity, Duty, DutyPatch, NewDuty, Officer, Vehicle};

/// A full, immutable view of one collection.
pub type Snapshot<T> = Arc<Vec<T>>;

/// Receives a new snapshot every time the collection changes.
pub type Subscription<T> = watch::Receiver<Snapshot<T>>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("document '{0}' not found")]
    NotFound(String),

    #[error("store backend error: {0}")]
    Backend(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("failed to encode document: {0}")]
    Encode(#[from] serde_json::Error),
}

#[async_trait]
pub trait DutyStore: Send + Sync {
    fn subscribe(&self) -> Subscription<Duty>;

    async fn create(&self, duty: NewDuty) -> Result<String, StoreError>;

    async fn update(&self, id: &str, patch: DutyPatch) -> Result<(), StoreError>;

    async fn delete(&self, id: &str) -> Result<(), StoreError>;
}

/// Read-only access to the officer, vehicle and activity collections.
pub trait RosterStore: Send + Sync {
    fn subscribe_officers(&self) -> Subscription<Officer>;
    fn subscribe_vehicles(&self) -> Subscription<Vehicle>;
    fn subscribe_activities(&self) -> Subscription<Activity>;
}

/// Both halves of a back end, for callers that need the whole thing.
pub trait Store: DutyStore + RosterStore {}

impl<T: DutyStore + RosterStore> Store for T {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Duties,
    Officers,
    Vehicles,
    Activities,
}

impl Collection {
    pub const ALL: [Collection; 4] = [
        Collection::Duties,
        Collection::Officers,
        Collection::Vehicles,
        Collection::Activities,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Duties => "duties",
            Collection::Officers => "officers",
            Collection::Vehicles => "vehicles",
            Collection::Activities => "activities",
        }
    }

    pub fn parse(text: &str) -> Option<Self> {
        Collection::ALL.into_iter().find(|c| c.as_str() == text.trim())
    }
}

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The watch channels a back end publishes decoded snapshots on.
pub(crate) struct Channels {
    duties: watch::Sender<Snapshot<Duty>>,
    officers: watch::Sender<Snapshot<Officer>>,
    vehicles: watch::Sender<Snapshot<Vehicle>>,
    activities: watch::Sender<Snapshot<Activity>>,
}

impl Channels {
    pub(crate) fn new() -> Self {
        Self {
            duties: watch::channel(Arc::new(Vec::new())).0,
            officers: watch::channel(Arc::new(Vec::new())).0,
            vehicles: watch::channel(Arc::new(Vec::new())).0,
            activities: watch::channel(Arc::new(Vec::new())).0,
        }
    }

    /// Decodes `documents` (already in display order) and replaces the
    /// collection's snapshot. Records that cannot be decoded are skipped.
    pub(crate) fn publish(&self, collection: Collection, documents: &[(String, JsonValue)]) {
        match collection {
            Collection::Duties => {
                let duties = documents
                    .iter()
                    .map(|(id, doc)| Duty::from_document(id, doc))
                    .collect();
                self.duties.send_replace(Arc::new(duties));
            }
            Collection::Officers => {
                let officers = documents
                    .iter()
                    .filter_map(|(id, doc)| Officer::from_document(id, doc))
                    .collect();
                self.officers.send_replace(Arc::new(officers));
            }
            Collection::Vehicles => {
                let vehicles = documents
                    .iter()
                    .filter_map(|(id, doc)| Vehicle::from_document(id, doc))
                    .collect();
                self.vehicles.send_replace(Arc::new(vehicles));
            }
            Collection::Activities => {
                let activities = documents
                    .iter()
                    .filter_map(|(id, doc)| Activity::from_document(id, doc))
                    .collect();
                self.activities.send_replace(Arc::new(activities));
            }
        }
    }

    pub(crate) fn duties(&self) -> Subscription<Duty> {
        self.duties.subscribe()
    }

    pub(crate) fn officers(&self) -> Subscription<Officer> {
        self.officers.subscribe()
    }

    pub(crate) fn vehicles(&self) -> Subscription<Vehicle> {
        self.vehicles.subscribe()
    }

    pub(crate) fn activities(&self) -> Subscription<Activity> {
        self.activities.subscribe()
    }
}
