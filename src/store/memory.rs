use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value as JsonValue};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::instrument;

use super::{Channels, Collection, DutyStore, RosterStore, StoreError, Subscription};
use crate::utils::{Activity, Duty, DutyPatch, NewDuty, Officer, Vehicle};

#[derive(Debug, Clone)]
struct Record {
    seq: u64,
    created_at: DateTime<Utc>,
    document: JsonValue,
}

#[derive(Default)]
struct Collections {
    next_seq: u64,
    records: HashMap<Collection, HashMap<String, Record>>,
}

/// In-process store for development and tests. Every write republishes the
/// affected collection, newest record first.
#[derive(Clone)]
pub struct MemoryStore {
    data: Arc<RwLock<Collections>>,
    channels: Arc<Channels>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            data: Arc::new(RwLock::new(Collections::default())),
            channels: Arc::new(Channels::new()),
        }
    }

    /// Stores a raw document under `id`, replacing any existing one.
    pub fn insert_document(&self, collection: Collection, id: &str, document: JsonValue) -> Result<(), StoreError> {
        let mut data = self.write()?;
        let seq = data.next_seq;
        data.next_seq += 1;

        data.records.entry(collection).or_default().insert(
            id.to_string(),
            Record {
                seq,
                created_at: Utc::now(),
                document,
            },
        );

        self.publish(&data, collection);
        Ok(())
    }

    pub fn put_officer(&self, officer: &Officer) -> Result<(), StoreError> {
        self.insert_document(Collection::Officers, &officer.id, serde_json::to_value(officer)?)
    }

    pub fn put_vehicle(&self, vehicle: &Vehicle) -> Result<(), StoreError> {
        self.insert_document(Collection::Vehicles, &vehicle.id, serde_json::to_value(vehicle)?)
    }

    pub fn document(&self, collection: Collection, id: &str) -> Result<Option<JsonValue>, StoreError> {
        let data = self.read()?;
        Ok(data
            .records
            .get(&collection)
            .and_then(|records| records.get(id))
            .map(|record| record.document.clone()))
    }

    pub fn created_at(&self, collection: Collection, id: &str) -> Result<Option<DateTime<Utc>>, StoreError> {
        let data = self.read()?;
        Ok(data
            .records
            .get(&collection)
            .and_then(|records| records.get(id))
            .map(|record| record.created_at))
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Collections>, StoreError> {
        self.data
            .read()
            .map_err(|_| StoreError::Backend("Failed to acquire read lock on memory store".to_string()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Collections>, StoreError> {
        self.data
            .write()
            .map_err(|_| StoreError::Backend("Failed to acquire write lock on memory store".to_string()))
    }

    fn publish(&self, data: &Collections, collection: Collection) {
        let mut records: Vec<(&String, &Record)> = data
            .records
            .get(&collection)
            .map(|records| records.iter().collect())
            .unwrap_or_default();
        records.sort_by(|a, b| b.1.seq.cmp(&a.1.seq));

        let documents: Vec<(String, JsonValue)> = records
            .into_iter()
            .map(|(id, record)| (id.clone(), record.document.clone()))
            .collect();

        self.channels.publish(collection, &documents);
    }
}

#[async_trait]
impl DutyStore for MemoryStore {
    fn subscribe(&self) -> Subscription<Duty> {
        self.channels.duties()
    }

    #[instrument(skip(self, duty), fields(duty.officers = duty.officer_ids.len()))]
    async fn create(&self, duty: NewDuty) -> Result<String, StoreError> {
        let id = uuid::Uuid::new_v4().to_string();
        let mut document = duty.to_document();
        document["createdAt"] = json!(Utc::now().to_rfc3339());

        self.insert_document(Collection::Duties, &id, document)?;
        Ok(id)
    }

    #[instrument(skip(self, patch))]
    async fn update(&self, id: &str, patch: DutyPatch) -> Result<(), StoreError> {
        let mut data = self.write()?;

        let record = data
            .records
            .get_mut(&Collection::Duties)
            .and_then(|records| records.get_mut(id))
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        let fields = patch.to_fields(Utc::now());
        match record.document.as_object_mut() {
            Some(document) => document.extend(fields),
            None => record.document = JsonValue::Object(fields),
        }

        self.publish(&data, Collection::Duties);
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        let mut data = self.write()?;

        let removed = data
            .records
            .get_mut(&Collection::Duties)
            .and_then(|records| records.remove(id));
        if removed.is_none() {
            return Err(StoreError::NotFound(id.to_string()));
        }

        self.publish(&data, Collection::Duties);
        Ok(())
    }
}

impl RosterStore for MemoryStore {
    fn subscribe_officers(&self) -> Subscription<Officer> {
        self.channels.officers()
    }

    fn subscribe_vehicles(&self) -> Subscription<Vehicle> {
        self.channels.vehicles()
    }

    fn subscribe_activities(&self) -> Subscription<Activity> {
        self.channels.activities()
    }
}
