use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use shared::{
    domain::{Barcode, NewRecord, QuantityUpdate, Record, RecordId},
    error::StoreErrorBody,
    protocol::{
        barcode_filter_formula, ListRecordsResponse, RecordFields, StoredRecord,
        WriteRecordRequest,
    },
};
use tracing::debug;
use url::Url;

use crate::{config::StoreConfig, demo_store::DemoRecordStore, error::StoreError};

pub const DEFAULT_BASE_URL: &str = "https://api.airtable.com/v0";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Remote table of inventory records keyed by barcode.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Bounded read of the table, used to probe connectivity.
    async fn list(&self, max_records: u32) -> Result<Vec<Record>, StoreError>;
    async fn find_by_barcode(&self, barcode: &Barcode) -> Result<Vec<Record>, StoreError>;
    async fn create(&self, record: &NewRecord) -> Result<Record, StoreError>;
    async fn update(&self, id: &RecordId, update: &QuantityUpdate)
        -> Result<Record, StoreError>;
}

/// Builds the store a saved configuration talks to.
pub trait RecordStoreConnector: Send + Sync {
    fn connect(&self, config: &StoreConfig) -> Result<Arc<dyn RecordStore>, StoreError>;
}

#[derive(Debug, Clone)]
pub struct HttpStoreOptions {
    pub base_url: String,
    pub request_timeout: Duration,
}

impl Default for HttpStoreOptions {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

/// Connects to the HTTP store, or to the seeded in-memory catalogue when the
/// configuration is in demo mode.
#[derive(Debug, Clone, Default)]
pub struct DefaultStoreConnector {
    pub options: HttpStoreOptions,
}

impl DefaultStoreConnector {
    pub fn new(options: HttpStoreOptions) -> Self {
        Self { options }
    }
}

impl RecordStoreConnector for DefaultStoreConnector {
    fn connect(&self, config: &StoreConfig) -> Result<Arc<dyn RecordStore>, StoreError> {
        if config.demo {
            return Ok(Arc::new(DemoRecordStore::seeded()));
        }
        Ok(Arc::new(HttpRecordStore::new(config, &self.options)?))
    }
}

pub struct HttpRecordStore {
    http: Client,
    table_url: Url,
    config: StoreConfig,
}

impl HttpRecordStore {
    pub fn new(config: &StoreConfig, options: &HttpStoreOptions) -> Result<Self, StoreError> {
        let mut table_url = Url::parse(options.base_url.trim())
            .map_err(|err| StoreError::Transport(format!("invalid base url: {err}")))?;
        table_url
            .path_segments_mut()
            .map_err(|()| {
                StoreError::Transport(format!("base url cannot be a base: {}", options.base_url))
            })?
            .pop_if_empty()
            .push(&config.store_id)
            .push(&config.table_name);

        let http = Client::builder()
            .timeout(options.request_timeout)
            .build()
            .map_err(|err| StoreError::Transport(err.to_string()))?;

        Ok(Self {
            http,
            table_url,
            config: config.clone(),
        })
    }

    fn record_url(&self, id: &RecordId) -> Url {
        let mut url = self.table_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.push(id.as_str());
        }
        url
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.http
            .request(method, url)
            .bearer_auth(&self.config.access_token)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, StoreError> {
        let response = request.send().await?;
        let status = response.status();
        debug!(status = status.as_u16(), url = %response.url(), "record store response");

        if !status.is_success() {
            let body = response.bytes().await.ok();
            let message = body
                .as_deref()
                .and_then(|body| serde_json::from_slice::<StoreErrorBody>(body).ok())
                .and_then(|body| body.message().map(str::to_string))
                .unwrap_or_else(|| {
                    format!(
                        "HTTP {}: {}",
                        status.as_u16(),
                        status.canonical_reason().unwrap_or("Unknown Status")
                    )
                });
            return Err(StoreError::Api {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|err| StoreError::Decode(err.to_string()))
    }

    async fn write(
        &self,
        method: Method,
        url: Url,
        fields: RecordFields,
        barcode: Option<&Barcode>,
    ) -> Result<Record, StoreError> {
        let stored: StoredRecord = self
            .send(self.request(method, url).json(&WriteRecordRequest { fields }))
            .await?;
        Ok(stored.into_record(barcode))
    }
}

#[async_trait]
impl RecordStore for HttpRecordStore {
    async fn list(&self, max_records: u32) -> Result<Vec<Record>, StoreError> {
        let mut url = self.table_url.clone();
        url.query_pairs_mut()
            .append_pair("maxRecords", &max_records.to_string());
        let page: ListRecordsResponse = self.send(self.request(Method::GET, url)).await?;
        Ok(page
            .records
            .into_iter()
            .map(|stored| stored.into_record(None))
            .collect())
    }

    async fn find_by_barcode(&self, barcode: &Barcode) -> Result<Vec<Record>, StoreError> {
        let mut url = self.table_url.clone();
        url.query_pairs_mut()
            .append_pair("filterByFormula", &barcode_filter_formula(barcode));
        let page: ListRecordsResponse = self.send(self.request(Method::GET, url)).await?;
        Ok(page
            .records
            .into_iter()
            .map(|stored| stored.into_record(Some(barcode)))
            .collect())
    }

    async fn create(&self, record: &NewRecord) -> Result<Record, StoreError> {
        self.write(
            Method::POST,
            self.table_url.clone(),
            RecordFields::from(record),
            Some(&record.barcode),
        )
        .await
    }

    async fn update(
        &self,
        id: &RecordId,
        update: &QuantityUpdate,
    ) -> Result<Record, StoreError> {
        self.write(
            Method::PATCH,
            self.record_url(id),
            RecordFields::from(update),
            None,
        )
        .await
    }
}

#[cfg(test)]
#[path = "tests/store_tests.rs"]
mod tests;
