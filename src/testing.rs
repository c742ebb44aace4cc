//! Scripted transport for unit tests.

use std::sync::{Arc, Mutex};

use serde_json::Value;
use url::Url;

use crate::error::{ClientError, Result};
use crate::transport::{EnrichmentRequest, Transport};

type Handler = Box<dyn Fn(&EnrichmentRequest) -> Result<Value> + Send + Sync>;

pub(crate) struct StubTransport {
    handler: Handler,
    key_response: Option<Value>,
    requests: Mutex<Vec<EnrichmentRequest>>,
    key_requests: Mutex<Vec<String>>,
}

impl StubTransport {
    pub(crate) fn replying(
        handler: impl Fn(&EnrichmentRequest) -> Result<Value> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            handler: Box::new(handler),
            key_response: None,
            requests: Mutex::new(Vec::new()),
            key_requests: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn issuing_keys(key_response: Value) -> Arc<Self> {
        Arc::new(Self {
            handler: Box::new(|_| Err(ClientError::transport("lookups not scripted"))),
            key_response: Some(key_response),
            requests: Mutex::new(Vec::new()),
            key_requests: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn requests(&self) -> Vec<EnrichmentRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub(crate) fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub(crate) fn key_requests(&self) -> Vec<String> {
        self.key_requests.lock().unwrap().clone()
    }
}

impl Transport for StubTransport {
    fn send(&self, request: &EnrichmentRequest) -> Result<Value> {
        self.requests.lock().unwrap().push(request.clone());
        (self.handler)(request)
    }

    fn request_api_key(&self, _endpoint: &Url, email: &str) -> Result<Value> {
        self.key_requests.lock().unwrap().push(email.to_string());
        self.key_response
            .clone()
            .ok_or_else(|| ClientError::transport("key issuance not scripted"))
    }
}

/// Free-form text of a request, or an empty string for structured queries.
pub(crate) fn free_form_text(request: &EnrichmentRequest) -> &str {
    match &request.query {
        crate::query::AddressQuery::FreeForm { text } => text,
        crate::query::AddressQuery::Structured { .. } => "",
    }
}
