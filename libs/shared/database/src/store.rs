use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Document {collection}/{id} not found")]
    NotFound { collection: String, id: String },

    #[error("Document {collection}/{id} already exists")]
    AlreadyExists { collection: String, id: String },

    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        StoreError::Backend(err.to_string())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FilterOp {
    Eq,
    Neq,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilterClause {
    pub field: String,
    pub op: FilterOp,
    pub value: Value,
}

/// Conjunction of field comparisons on top-level document fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    pub clauses: Vec<FilterClause>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.clauses.push(FilterClause {
            field: field.to_string(),
            op: FilterOp::Eq,
            value: value.into(),
        });
        self
    }

    pub fn neq(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.clauses.push(FilterClause {
            field: field.to_string(),
            op: FilterOp::Neq,
            value: value.into(),
        });
        self
    }

    pub fn matches(&self, document: &Value) -> bool {
        self.clauses.iter().all(|clause| {
            let current = document.get(&clause.field).unwrap_or(&Value::Null);
            match clause.op {
                FilterOp::Eq => *current == clause.value,
                FilterOp::Neq => *current != clause.value,
            }
        })
    }
}

/// Live query over a collection. Each item is the full matching result set
/// after a change. Dropping the subscription unsubscribes.
pub struct Subscription {
    receiver: mpsc::Receiver<Vec<Value>>,
    task: JoinHandle<()>,
}

impl Subscription {
    pub fn new(receiver: mpsc::Receiver<Vec<Value>>, task: JoinHandle<()>) -> Self {
        Self { receiver, task }
    }

    pub async fn next(&mut self) -> Option<Vec<Value>> {
        self.receiver.recv().await
    }

    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Document-store collaborator holding appointment and slot state.
///
/// Documents are JSON objects. Results of `get` and `query` carry the document
/// id under the `id` key.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>, StoreError>;

    async fn query(&self, collection: &str, filter: &Filter) -> Result<Vec<Value>, StoreError>;

    /// Creates a document and returns the id the store assigned to it.
    async fn create(&self, collection: &str, fields: Value) -> Result<String, StoreError>;

    /// Shallow merge of `fields` into an existing document.
    async fn update(&self, collection: &str, id: &str, fields: Value) -> Result<(), StoreError>;

    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError>;

    /// Creates document `id` unless it already exists. Returns whether the
    /// document was created.
    async fn create_if_absent(&self, collection: &str, id: &str, fields: Value) -> Result<bool, StoreError>;

    /// Atomically merges `fields` into the existing document `id` if its
    /// `field` currently equals `expected`. `None` expects the field to be
    /// absent or null. A missing document never matches. Returns whether the
    /// write happened.
    async fn compare_and_set(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        expected: Option<&Value>,
        fields: Value,
    ) -> Result<bool, StoreError>;

    fn subscribe(&self, collection: &str, filter: Filter) -> Subscription;
}

pub(crate) fn with_id(id: &str, mut document: Value) -> Value {
    if let Value::Object(map) = &mut document {
        map.insert("id".to_string(), Value::String(id.to_string()));
    }
    document
}

pub(crate) fn as_object(fields: Value) -> Result<serde_json::Map<String, Value>, StoreError> {
    match fields {
        Value::Object(map) => Ok(map),
        other => Err(StoreError::InvalidDocument(format!(
            "expected a JSON object, got {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn filter_matches_eq_and_neq() {
        let doc = json!({ "doctorId": "d1", "status": "pending" });

        assert!(Filter::new().eq("doctorId", "d1").matches(&doc));
        assert!(Filter::new().neq("status", "rejected").matches(&doc));
        assert!(!Filter::new().eq("doctorId", "d1").eq("status", "accepted").matches(&doc));
    }

    #[test]
    fn missing_field_compares_as_null() {
        let doc = json!({ "doctorId": "d1" });

        assert!(Filter::new().neq("status", "rejected").matches(&doc));
        assert!(Filter::new().eq("roomId", Value::Null).matches(&doc));
    }
}
