use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{
    Client,
    header::{HeaderMap, HeaderValue, CONTENT_TYPE, AUTHORIZATION},
    Method,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};
use uuid::Uuid;

use shared_config::AppConfig;

use crate::store::{as_object, DocumentStore, Filter, FilterOp, StoreError, Subscription};

pub struct SupabaseClient {
    client: Client,
    base_url: String,
    anon_key: String,
}

impl SupabaseClient {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.supabase_url.clone(),
            anon_key: config.supabase_anon_key.clone(),
        }
    }

    fn get_headers(&self, auth_token: Option<&str>, prefer: Option<&str>) -> Result<HeaderMap, StoreError> {
        let mut headers = HeaderMap::new();

        let header_value = |raw: &str| {
            HeaderValue::from_str(raw)
                .map_err(|e| StoreError::Backend(format!("Invalid header value: {}", e)))
        };

        headers.insert("apikey", header_value(&self.anon_key)?);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let bearer = auth_token.unwrap_or(&self.anon_key);
        headers.insert(AUTHORIZATION, header_value(&format!("Bearer {}", bearer))?);

        if let Some(prefer) = prefer {
            headers.insert("Prefer", header_value(prefer)?);
        }

        Ok(headers)
    }

    pub async fn request<T>(&self, method: Method, path: &str,
                            auth_token: Option<&str>, body: Option<Value>)
                            -> Result<T, StoreError>
    where T: DeserializeOwned {
        self.request_with_prefer(method, path, auth_token, body, None).await
    }

    pub async fn request_with_prefer<T>(&self, method: Method, path: &str,
                                        auth_token: Option<&str>, body: Option<Value>,
                                        prefer: Option<&str>)
                                        -> Result<T, StoreError>
    where T: DeserializeOwned {
        let url = format!("{}{}", self.base_url, path);
        debug!("Making request to {}", url);

        let headers = self.get_headers(auth_token, prefer)?;

        let mut req = self.client.request(method, &url)
            .headers(headers);

        if let Some(body_data) = body {
            req = req.json(&body_data);
        }

        let response = req.send().await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await?;
            error!("API error ({}): {}", status, error_text);

            return Err(match status.as_u16() {
                401 | 403 => StoreError::Backend(format!("Authentication error: {}", error_text)),
                409 => StoreError::Backend(format!("Conflict: {}", error_text)),
                _ => StoreError::Backend(format!("API error ({}): {}", status, error_text)),
            });
        }

        let data = response.json::<T>().await?;
        Ok(data)
    }
}

/// `DocumentStore` over PostgREST. Each collection is a table with a text `id`
/// primary key and one column per document field.
#[derive(Clone)]
pub struct SupabaseDocumentStore {
    client: Arc<SupabaseClient>,
    poll_interval: Duration,
}

impl SupabaseDocumentStore {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: Arc::new(SupabaseClient::new(config)),
            poll_interval: Duration::from_secs(config.store_poll_interval_seconds.max(1)),
        }
    }

    fn table_path(collection: &str) -> String {
        format!("/rest/v1/{}", collection)
    }

    fn encode_value(value: &Value) -> String {
        match value {
            Value::String(s) => urlencoding::encode(s).into_owned(),
            other => urlencoding::encode(&other.to_string()).into_owned(),
        }
    }

    fn filter_query(filter: &Filter) -> String {
        filter
            .clauses
            .iter()
            .map(|clause| {
                let (op, null_op) = match clause.op {
                    FilterOp::Eq => ("eq", "is"),
                    FilterOp::Neq => ("neq", "not.is"),
                };
                if clause.value.is_null() {
                    format!("{}={}.null", clause.field, null_op)
                } else {
                    format!("{}={}.{}", clause.field, op, Self::encode_value(&clause.value))
                }
            })
            .collect::<Vec<_>>()
            .join("&")
    }

    fn id_query(id: &str) -> String {
        format!("id=eq.{}", urlencoding::encode(id))
    }

    async fn run_query(client: &SupabaseClient, collection: &str, filter: &Filter) -> Result<Vec<Value>, StoreError> {
        let mut path = format!("{}?select=*", Self::table_path(collection));
        let filters = Self::filter_query(filter);
        if !filters.is_empty() {
            path.push('&');
            path.push_str(&filters);
        }
        client.request(Method::GET, &path, None, None).await
    }
}

#[async_trait]
impl DocumentStore for SupabaseDocumentStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>, StoreError> {
        let path = format!("{}?{}", Self::table_path(collection), Self::id_query(id));
        let rows: Vec<Value> = self.client.request(Method::GET, &path, None, None).await?;
        Ok(rows.into_iter().next())
    }

    async fn query(&self, collection: &str, filter: &Filter) -> Result<Vec<Value>, StoreError> {
        Self::run_query(&self.client, collection, filter).await
    }

    async fn create(&self, collection: &str, fields: Value) -> Result<String, StoreError> {
        let mut doc = as_object(fields)?;
        let id = Uuid::new_v4().to_string();
        doc.insert("id".to_string(), Value::String(id.clone()));

        let _: Vec<Value> = self.client.request_with_prefer(
            Method::POST,
            &Self::table_path(collection),
            None,
            Some(Value::Object(doc)),
            Some("return=representation"),
        ).await?;

        Ok(id)
    }

    async fn update(&self, collection: &str, id: &str, fields: Value) -> Result<(), StoreError> {
        let mut patch = as_object(fields)?;
        patch.remove("id");
        let path = format!("{}?{}", Self::table_path(collection), Self::id_query(id));

        let rows: Vec<Value> = self.client.request_with_prefer(
            Method::PATCH,
            &path,
            None,
            Some(Value::Object(patch)),
            Some("return=representation"),
        ).await?;

        if rows.is_empty() {
            return Err(StoreError::NotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            });
        }
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        let path = format!("{}?{}", Self::table_path(collection), Self::id_query(id));
        let rows: Vec<Value> = self.client.request_with_prefer(
            Method::DELETE,
            &path,
            None,
            None,
            Some("return=representation"),
        ).await?;

        if rows.is_empty() {
            return Err(StoreError::NotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            });
        }
        Ok(())
    }

    /// Duplicate-ignoring insert; an empty representation means the row
    /// already existed.
    async fn create_if_absent(&self, collection: &str, id: &str, fields: Value) -> Result<bool, StoreError> {
        let mut doc = as_object(fields)?;
        doc.insert("id".to_string(), Value::String(id.to_string()));

        let inserted: Vec<Value> = self.client.request_with_prefer(
            Method::POST,
            &Self::table_path(collection),
            None,
            Some(Value::Object(doc)),
            Some("resolution=ignore-duplicates,return=representation"),
        ).await?;

        Ok(!inserted.is_empty())
    }

    /// Conditional PATCH filtered on both the id and the expected value.
    async fn compare_and_set(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        expected: Option<&Value>,
        fields: Value,
    ) -> Result<bool, StoreError> {
        let mut patch = as_object(fields)?;
        patch.remove("id");

        let condition = match expected.filter(|value| !value.is_null()) {
            Some(value) => format!("{}=eq.{}", field, Self::encode_value(value)),
            None => format!("{}=is.null", field),
        };
        let path = format!(
            "{}?{}&{}",
            Self::table_path(collection),
            Self::id_query(id),
            condition
        );

        let rows: Vec<Value> = self.client.request_with_prefer(
            Method::PATCH,
            &path,
            None,
            Some(Value::Object(patch)),
            Some("return=representation"),
        ).await?;

        Ok(!rows.is_empty())
    }

    fn subscribe(&self, collection: &str, filter: Filter) -> Subscription {
        let client = Arc::clone(&self.client);
        let collection = collection.to_string();
        let poll_interval = self.poll_interval;
        let (tx, rx) = mpsc::channel(16);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(poll_interval);
            let mut last: Option<Vec<Value>> = None;

            loop {
                ticker.tick().await;
                match Self::run_query(&client, &collection, &filter).await {
                    Ok(snapshot) => {
                        if last.as_ref() == Some(&snapshot) {
                            continue;
                        }
                        last = Some(snapshot.clone());
                        if tx.send(snapshot).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!("Polling {} for subscription failed: {}", collection, e),
                }
            }
        });

        Subscription::new(rx, task)
    }
}
