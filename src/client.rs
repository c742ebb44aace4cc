use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use url::Url;

use crate::config::ClientConfig;
use crate::enrich::{enrich, ColumnSelectors, EnrichOptions, EnrichReport};
use crate::error::{ClientError, Result};
use crate::query::{build_query, AddressFields, AddressQuery};
use crate::table::Table;
use crate::transport::{EnrichmentRequest, HttpTransport, Transport};

/// Attributes the service returned for one address.
pub type EnrichmentResult = Map<String, Value>;

/// A configured session against the service.
#[derive(Clone)]
pub struct Client {
    config: ClientConfig,
    endpoint: Url,
    transport: Arc<dyn Transport>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("endpoint", &self.endpoint.as_str())
            .field("timeout_secs", &self.config.timeout_secs)
            .field("workers", &self.config.workers)
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Builds a client that talks HTTP to `config.base_url`.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let transport = HttpTransport::new(Duration::from_secs(config.timeout_secs));
        Self::with_transport(config, Arc::new(transport))
    }

    pub fn with_transport(config: ClientConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        config.validate()?;
        let endpoint = config.endpoint()?;
        Ok(Self {
            config,
            endpoint,
            transport,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Validates `fields` and looks the address up.
    pub fn request(&self, fields: &AddressFields) -> Result<EnrichmentResult> {
        let query = build_query(fields)?;
        self.lookup(&query)
    }

    /// Looks up an already-validated query.
    pub fn lookup(&self, query: &AddressQuery) -> Result<EnrichmentResult> {
        let request = EnrichmentRequest::new(query.clone(), &self.config.api_key, self.endpoint.clone());
        let body = self.transport.send(&request)?;
        interpret_response(body)
    }

    /// Enriches `table` with the configured worker count and the default failure policy.
    pub fn enrich(&self, table: &Table, selectors: &ColumnSelectors) -> Result<Table> {
        let options = EnrichOptions {
            workers: self.config.workers,
            ..EnrichOptions::default()
        };
        Ok(self.enrich_with(table, selectors, &options)?.table)
    }

    pub fn enrich_with(
        &self,
        table: &Table,
        selectors: &ColumnSelectors,
        options: &EnrichOptions,
    ) -> Result<EnrichReport> {
        enrich(table, self, selectors, options)
    }
}

/// Turns a decoded body into a result, surfacing service-reported failures.
pub(crate) fn interpret_response(body: Value) -> Result<EnrichmentResult> {
    let Value::Object(map) = body else {
        return Err(ClientError::ResponseFormat(format!(
            "expected a JSON object, got {}",
            json_kind(&body)
        )));
    };
    if let Some(detail) = map.get("detail").and_then(Value::as_str) {
        if let Some(err) = ClientError::from_detail(detail) {
            return Err(err);
        }
    }
    if map.get("success") == Some(&Value::Bool(false)) {
        let detail = map
            .get("detail")
            .and_then(Value::as_str)
            .unwrap_or("unspecified failure");
        return Err(ClientError::Service(detail.to_string()));
    }
    Ok(map)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
