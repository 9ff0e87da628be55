use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, RwLock};
use tracing::debug;
use uuid::Uuid;

use crate::store::{as_object, with_id, DocumentStore, Filter, StoreError, Subscription};

type Collections = HashMap<String, BTreeMap<String, serde_json::Map<String, Value>>>;

/// In-process document store. Every write runs under a single lock, so
/// `compare_and_set` is atomic with respect to all other operations.
#[derive(Clone)]
pub struct MemoryDocumentStore {
    collections: Arc<RwLock<Collections>>,
    changes: broadcast::Sender<String>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(64);
        Self {
            collections: Arc::new(RwLock::new(HashMap::new())),
            changes,
        }
    }

    /// Writes a document under a caller-chosen id, replacing any existing one.
    pub async fn insert(&self, collection: &str, id: &str, fields: Value) -> Result<(), StoreError> {
        let mut doc = as_object(fields)?;
        doc.remove("id");
        {
            let mut guard = self.collections.write().await;
            guard
                .entry(collection.to_string())
                .or_default()
                .insert(id.to_string(), doc);
        }

        self.notify(collection);
        Ok(())
    }

    fn notify(&self, collection: &str) {
        // No receivers simply means nobody is subscribed.
        let _ = self.changes.send(collection.to_string());
    }

    async fn snapshot(collections: &RwLock<Collections>, collection: &str, filter: &Filter) -> Vec<Value> {
        let guard = collections.read().await;
        guard
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .map(|(id, doc)| with_id(id, Value::Object(doc.clone())))
                    .filter(|doc| filter.matches(doc))
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl Default for MemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>, StoreError> {
        let guard = self.collections.read().await;
        Ok(guard
            .get(collection)
            .and_then(|docs| docs.get(id))
            .map(|doc| with_id(id, Value::Object(doc.clone()))))
    }

    async fn query(&self, collection: &str, filter: &Filter) -> Result<Vec<Value>, StoreError> {
        Ok(Self::snapshot(&self.collections, collection, filter).await)
    }

    async fn create(&self, collection: &str, fields: Value) -> Result<String, StoreError> {
        let mut doc = as_object(fields)?;
        doc.remove("id");
        let id = Uuid::new_v4().to_string();

        {
            let mut guard = self.collections.write().await;
            guard
                .entry(collection.to_string())
                .or_default()
                .insert(id.clone(), doc);
        }

        debug!("Created {}/{}", collection, id);
        self.notify(collection);
        Ok(id)
    }

    async fn update(&self, collection: &str, id: &str, fields: Value) -> Result<(), StoreError> {
        let patch = as_object(fields)?;
        {
            let mut guard = self.collections.write().await;
            let doc = guard
                .get_mut(collection)
                .and_then(|docs| docs.get_mut(id))
                .ok_or_else(|| StoreError::NotFound {
                    collection: collection.to_string(),
                    id: id.to_string(),
                })?;
            for (key, value) in patch {
                if key != "id" {
                    doc.insert(key, value);
                }
            }
        }

        self.notify(collection);
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        let removed = {
            let mut guard = self.collections.write().await;
            guard.get_mut(collection).and_then(|docs| docs.remove(id))
        };

        match removed {
            Some(_) => {
                self.notify(collection);
                Ok(())
            }
            None => Err(StoreError::NotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            }),
        }
    }

    async fn create_if_absent(&self, collection: &str, id: &str, fields: Value) -> Result<bool, StoreError> {
        let mut doc = as_object(fields)?;
        doc.remove("id");
        {
            let mut guard = self.collections.write().await;
            let docs = guard.entry(collection.to_string()).or_default();
            if docs.contains_key(id) {
                debug!("{}/{} already exists", collection, id);
                return Ok(false);
            }
            docs.insert(id.to_string(), doc);
        }

        self.notify(collection);
        Ok(true)
    }

    async fn compare_and_set(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        expected: Option<&Value>,
        fields: Value,
    ) -> Result<bool, StoreError> {
        let patch = as_object(fields)?;
        {
            let mut guard = self.collections.write().await;
            let Some(doc) = guard.get_mut(collection).and_then(|docs| docs.get_mut(id)) else {
                debug!("Compare-and-set on missing {}/{}", collection, id);
                return Ok(false);
            };

            let current = doc.get(field).filter(|value| !value.is_null());
            if current != expected.filter(|value| !value.is_null()) {
                debug!("Compare-and-set on {}/{}.{} lost", collection, id, field);
                return Ok(false);
            }

            for (key, value) in patch {
                if key != "id" {
                    doc.insert(key, value);
                }
            }
        }

        self.notify(collection);
        Ok(true)
    }

    fn subscribe(&self, collection: &str, filter: Filter) -> Subscription {
        let collections = Arc::clone(&self.collections);
        let mut changes = self.changes.subscribe();
        let collection = collection.to_string();
        let (tx, rx) = mpsc::channel(16);

        let task = tokio::spawn(async move {
            let mut last = Self::snapshot(&collections, &collection, &filter).await;
            if tx.send(last.clone()).await.is_err() {
                return;
            }

            loop {
                match changes.recv().await {
                    Ok(changed) if changed != collection => continue,
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => break,
                }

                let snapshot = Self::snapshot(&collections, &collection, &filter).await;
                if snapshot == last {
                    continue;
                }
                last = snapshot.clone();
                if tx.send(snapshot).await.is_err() {
                    break;
                }
            }
        });

        Subscription::new(rx, task)
    }
}
