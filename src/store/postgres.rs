use async_trait::async_trait;
use chrono::Utc;
use futures::future::try_join_all;
use log::{error, info, warn};
use serde_json::{json, Value as JsonValue};
use sqlx::postgres::{PgListener, PgPool, PgPoolOptions};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tracing::instrument;

use super::{Channels, Collection, DutyStore, RosterStore, StoreError, Subscription};
use crate::utils::{Activity, Duty, DutyPatch, NewDuty, Officer, Vehicle};

/// Channel every write notifies on; the payload is the collection name.
pub const CHANGE_CHANNEL: &str = "naka_changes";

/// PostgreSQL back end. Each collection is a table of JSONB documents and
/// every change triggers a full reload of the affected snapshot.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    channels: Arc<Channels>,
    listener: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        let store = Self {
            pool,
            channels: Arc::new(Channels::new()),
            listener: Arc::new(Mutex::new(None)),
        };

        store.ensure_schema().await?;
        store.reload_all().await?;
        store.listen().await?;

        Ok(store)
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        for collection in Collection::ALL {
            let ddl = format!(
                r#"
                CREATE TABLE IF NOT EXISTS {} (
                    id TEXT PRIMARY KEY,
                    document JSONB NOT NULL,
                    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
                )
                "#,
                collection.as_str()
            );
            sqlx::query(&ddl).execute(&self.pool).await?;
        }
        Ok(())
    }

    pub async fn reload(&self, collection: Collection) -> Result<(), StoreError> {
        let query = format!(
            "SELECT id, document FROM {} ORDER BY created_at DESC, id",
            collection.as_str()
        );
        let rows: Vec<(String, JsonValue)> = sqlx::query_as(&query).fetch_all(&self.pool).await?;

        self.channels.publish(collection, &rows);
        Ok(())
    }

    pub async fn reload_all(&self) -> Result<(), StoreError> {
        try_join_all(Collection::ALL.map(|collection| self.reload(collection))).await?;
        Ok(())
    }

    /// Inserts or replaces a raw document; used to seed roster data.
    pub async fn upsert_document(&self, collection: Collection, id: &str, document: &JsonValue) -> Result<(), StoreError> {
        let query = format!(
            r#"
            INSERT INTO {} (id, document)
            VALUES ($1, $2)
            ON CONFLICT (id) DO UPDATE SET
                document = EXCLUDED.document,
                updated_at = NOW()
            "#,
            collection.as_str()
        );
        sqlx::query(&query)
            .bind(id)
            .bind(document)
            .execute(&self.pool)
            .await?;

        self.notify(collection).await
    }

    pub fn is_listening(&self) -> bool {
        self.listener
            .lock()
            .map(|listener| listener.as_ref().is_some_and(|handle| !handle.is_finished()))
            .unwrap_or(false)
    }

    /// Stops the change listener. Snapshots are no longer refreshed after this.
    pub fn shutdown(&self) {
        if let Ok(mut listener) = self.listener.lock() {
            if let Some(handle) = listener.take() {
                info!("Stopping change listener");
                handle.abort();
            }
        }
    }

    async fn notify(&self, collection: Collection) -> Result<(), StoreError> {
        sqlx::query("SELECT pg_notify($1, $2)")
            .bind(CHANGE_CHANNEL)
            .bind(collection.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn listen(&self) -> Result<(), StoreError> {
        let mut listener = PgListener::connect_with(&self.pool).await?;
        listener.listen(CHANGE_CHANNEL).await?;

        let store = self.clone();
        let handle = tokio::spawn(async move {
            loop {
                match listener.try_recv().await {
                    Ok(Some(notification)) => match Collection::parse(notification.payload()) {
                        Some(collection) => {
                            if let Err(e) = store.reload(collection).await {
                                error!("Failed to reload {}: {}", collection, e);
                            }
                        }
                        None => warn!("Ignoring change notification '{}'", notification.payload()),
                    },
                    Ok(None) => {
                        // Notifications sent while disconnected are lost.
                        warn!("Change listener reconnected, reloading all collections");
                        if let Err(e) = store.reload_all().await {
                            error!("Failed to reload collections: {}", e);
                        }
                    }
                    Err(e) => {
                        error!("Change listener error: {}", e);
                        tokio::time::sleep(std::time::Duration::from_secs(1)).await;
                    }
                }
            }
        });

        let mut slot = self
            .listener
            .lock()
            .map_err(|_| StoreError::Backend("Failed to acquire listener lock".to_string()))?;
        if let Some(previous) = slot.replace(handle) {
            previous.abort();
        }

        info!("Listening for changes on '{}'", CHANGE_CHANNEL);
        Ok(())
    }
}

#[async_trait]
impl DutyStore for PgStore {
    fn subscribe(&self) -> Subscription<Duty> {
        self.channels.duties()
    }

    #[instrument(skip(self, duty), fields(duty.officers = duty.officer_ids.len()))]
    async fn create(&self, duty: NewDuty) -> Result<String, StoreError> {
        let id = uuid::Uuid::new_v4().to_string();
        let mut document = duty.to_document();
        document["createdAt"] = json!(Utc::now().to_rfc3339());

        sqlx::query("INSERT INTO duties (id, document) VALUES ($1, $2)")
            .bind(&id)
            .bind(&document)
            .execute(&self.pool)
            .await?;

        self.notify(Collection::Duties).await?;
        Ok(id)
    }

    #[instrument(skip(self, patch))]
    async fn update(&self, id: &str, patch: DutyPatch) -> Result<(), StoreError> {
        let fields = JsonValue::Object(patch.to_fields(Utc::now()));

        let result = sqlx::query(
            r#"
            UPDATE duties
            SET document = document || $2, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(&fields)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id.to_string()));
        }

        self.notify(Collection::Duties).await
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM duties WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id.to_string()));
        }

        self.notify(Collection::Duties).await
    }
}

impl RosterStore for PgStore {
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
