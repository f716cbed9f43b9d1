// src/store/accounts.rs
use chrono::serde::ts_milliseconds;
use chrono::{DateTime, SubsecRound, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::warn;
use uuid::Uuid;

use super::{KeyValueStore, StoreError};

/// Current time at the millisecond precision the stored form keeps.
fn now_millis() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

/// A record kept as one element of a JSON list under a fixed key.
pub trait Record: Serialize + DeserializeOwned + Clone + Send + Sync {
    const KEY: &'static str;

    fn id(&self) -> &str;

    fn set_id(&mut self, id: String);
}

/// Gateway account queried with an access token and user id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiAccount {
    #[serde(default)]
    pub id: String,
    pub name: String,
    pub base_url: String,
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    /// Stored as epoch milliseconds.
    #[serde(with = "ts_milliseconds", default = "now_millis")]
    pub created_at: DateTime<Utc>,
    /// Fields this crate does not model (`isActive`, `lastUsedAt`, ...),
    /// kept so a rewrite of the list does not drop them.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ApiAccount {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            name: name.into(),
            base_url: base_url.into(),
            access_token: String::new(),
            user_id: String::new(),
            website: None,
            created_at: now_millis(),
            extra: Map::new(),
        }
    }
}

impl Record for ApiAccount {
    const KEY: &'static str = "api_configs";

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }
}

/// OpenAI-style API key whose balance comes from the billing endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenAccount {
    #[serde(default)]
    pub id: String,
    pub name: String,
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(with = "ts_milliseconds", default = "now_millis")]
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TokenAccount {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            name: name.into(),
            base_url: base_url.into(),
            api_key: api_key.into(),
            created_at: now_millis(),
            extra: Map::new(),
        }
    }
}

impl Record for TokenAccount {
    const KEY: &'static str = "token_configs";

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }
}

/// Ordered account lists on top of an injected [`KeyValueStore`].
///
/// Clones share one write lock, so read-modify-write cycles from different
/// handles never interleave.
#[derive(Clone)]
pub struct AccountStore {
    store: Arc<dyn KeyValueStore>,
    write_lock: Arc<Mutex<()>>,
}

impl AccountStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Stored order. An unreadable entry reads as an empty list; it is left
    /// in place and every mutation on it fails until it is repaired.
    pub async fn list<R: Record>(&self) -> Result<Vec<R>, StoreError> {
        match self.load::<R>().await {
            Err(StoreError::Serialization(e)) => {
                warn!(key = R::KEY, error = %e, "account list is unreadable");
                Ok(Vec::new())
            }
            other => other,
        }
    }

    pub async fn get<R: Record>(&self, id: &str) -> Result<Option<R>, StoreError> {
        Ok(self.list::<R>().await?.into_iter().find(|r| r.id() == id))
    }

    /// Append `record` with a fresh id and return it.
    pub async fn add<R: Record>(&self, mut record: R) -> Result<R, StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut records = self.load::<R>().await?;
        record.set_id(Uuid::new_v4().to_string());
        records.push(record.clone());
        self.save(&records).await?;
        Ok(record)
    }

    pub async fn update<R: Record>(&self, record: R) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut records = self.load::<R>().await?;
        let slot = records
            .iter_mut()
            .find(|r| r.id() == record.id())
            .ok_or_else(|| StoreError::NotFound(record.id().to_string()))?;
        *slot = record;
        self.save(&records).await
    }

    /// Returns whether anything was removed.
    pub async fn remove<R: Record>(&self, id: &str) -> Result<bool, StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut records = self.load::<R>().await?;
        let before = records.len();
        records.retain(|r| r.id() != id);
        if records.len() == before {
            return Ok(false);
        }
        self.save(&records).await?;
        Ok(true)
    }

    /// Move the record at `from` to position `to`, shifting the others.
    pub async fn reorder<R: Record>(&self, from: usize, to: usize) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut records = self.load::<R>().await?;
        let len = records.len();
        if from >= len || to >= len {
            return Err(StoreError::OutOfRange { from, to, len });
        }
        if from != to {
            let record = records.remove(from);
            records.insert(to, record);
            self.save(&records).await?;
        }
        Ok(())
    }

    async fn load<R: Record>(&self) -> Result<Vec<R>, StoreError> {
        match self.store.get(R::KEY).await? {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(Vec::new()),
        }
    }

    async fn save<R: Record>(&self, records: &[R]) -> Result<(), StoreError> {
        let raw = serde_json::to_string(records)?;
        self.store.set(R::KEY, raw).await
    }
}
