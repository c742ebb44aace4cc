//! HTTP transport to the FastOpenData service.

use std::time::Duration;

use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::error::{ClientError, Result};
use crate::query::AddressQuery;

pub const SINGLE_ADDRESS_PATH: &str = "get_single_address";
pub const FREE_API_KEY_PATH: &str = "get_free_api_key";

const ERROR_BODY_CAP: usize = 512;

/// One lookup: a validated query plus the credentials and endpoint to send it to.
#[derive(Debug, Clone)]
pub struct EnrichmentRequest {
    pub query: AddressQuery,
    pub api_key: String,
    pub endpoint: Url,
}

impl EnrichmentRequest {
    pub fn new(query: AddressQuery, api_key: impl Into<String>, endpoint: Url) -> Self {
        Self {
            query,
            api_key: api_key.into(),
            endpoint,
        }
    }

    /// Full request URL, including the API key.
    pub fn url(&self) -> Result<Url> {
        let mut url = self.endpoint.join(SINGLE_ADDRESS_PATH)?;
        {
            let mut pairs = url.query_pairs_mut();
            for (name, value) in self.query.params() {
                pairs.append_pair(name, value);
            }
            pairs.append_pair("api_key", &self.api_key);
        }
        Ok(url)
    }
}

pub trait Transport: Send + Sync {
    /// Sends one lookup and returns the decoded JSON body.
    fn send(&self, request: &EnrichmentRequest) -> Result<Value>;

    /// Asks the service for an evaluation key for `email`.
    fn request_api_key(&self, endpoint: &Url, email: &str) -> Result<Value>;
}

/// Blocking transport over a shared `ureq` agent.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    agent: ureq::Agent,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(timeout)
            .timeout_read(timeout)
            .timeout_write(timeout)
            .build();
        Self { agent }
    }

    fn get(&self, url: &Url) -> Result<Value> {
        let response = self
            .agent
            .get(url.as_str())
            .set("Content-type", "application/json")
            .call();
        read_response(response)
    }
}

impl Transport for HttpTransport {
    fn send(&self, request: &EnrichmentRequest) -> Result<Value> {
        let url = request.url()?;
        debug!(path = url.path(), "sending address lookup");
        self.get(&url)
    }

    fn request_api_key(&self, endpoint: &Url, email: &str) -> Result<Value> {
        let mut url = endpoint.join(FREE_API_KEY_PATH)?;
        url.query_pairs_mut().append_pair("email_address", email);
        debug!(path = url.path(), "requesting evaluation key");
        self.get(&url)
    }
}

fn read_response(response: std::result::Result<ureq::Response, ureq::Error>) -> Result<Value> {
    match response {
        Ok(resp) => {
            let body = resp
                .into_string()
                .map_err(|e| ClientError::transport(format!("read body: {e}")))?;
            parse_body(&body)
        }
        Err(ureq::Error::Status(code, resp)) => {
            let body = resp.into_string().unwrap_or_default();
            Err(status_error(code, &body))
        }
        Err(ureq::Error::Transport(err)) => Err(ClientError::transport(err.to_string())),
    }
}

pub(crate) fn parse_body(body: &str) -> Result<Value> {
    serde_json::from_str(body).map_err(|e| {
        ClientError::ResponseFormat(format!("body is not JSON ({e}): {}", truncate(body)))
    })
}

/// Classifies a non-2xx response by its status and JSON `detail`, if any.
pub(crate) fn status_error(code: u16, body: &str) -> ClientError {
    let detail = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("detail").and_then(Value::as_str).map(str::to_string));
    if let Some(err) = detail.as_deref().and_then(ClientError::from_detail) {
        return err;
    }
    let message = detail.unwrap_or_else(|| truncate(body));
    match code {
        401 | 403 => ClientError::Security(message),
        _ => ClientError::Transport {
            status: Some(code),
            message,
        },
    }
}

fn truncate(body: &str) -> String {
    let trimmed = body.trim();
    match trimmed.char_indices().nth(ERROR_BODY_CAP) {
        Some((idx, _)) => format!("{}...", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::query::{build_query, AddressFields};
    use std::sync::mpsc;
    use std::thread;
    use tiny_http::{Header, Response, Server};

    /// Serves `responses` in order on an ephemeral port and reports each request URL.
    pub(crate) fn serve(responses: Vec<(u16, String)>) -> (Url, mpsc::Receiver<String>) {
        let server = Server::http("127.0.0.1:0").unwrap();
        let addr = server.server_addr().to_ip().unwrap();
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            for (status, body) in responses {
                let Ok(request) = server.recv() else {
                    return;
                };
                let _ = tx.send(request.url().to_string());
                let header = Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..])
                    .unwrap();
                let response = Response::from_string(body)
                    .with_status_code(status)
                    .with_header(header);
                let _ = request.respond(response);
            }
        });
        (Url::parse(&format!("http://{addr}/")).unwrap(), rx)
    }

    fn transport() -> HttpTransport {
        HttpTransport::new(Duration::from_secs(5))
    }

    #[test]
    fn test_request_url_free_form() {
        let query = build_query(&AddressFields::free_form("1 Elm St, Cairo, GA")).unwrap();
        let endpoint = Url::parse("http://localhost:8000/").unwrap();
        let url = EnrichmentRequest::new(query, "secret", endpoint).url().unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:8000/get_single_address?free_form_query=1+Elm+St%2C+Cairo%2C+GA&api_key=secret"
        );
    }

    #[test]
    fn test_send_structured_query() {
        let (endpoint, urls) = serve(vec![(200, r#"{"county": {"name": "Leon"}}"#.into())]);
        let fields = AddressFields {
            address1: Some("123 Main Street".into()),
            city: Some("Tallahassee".into()),
            state: Some("FL".into()),
            ..AddressFields::default()
        };
        let request = EnrichmentRequest::new(build_query(&fields).unwrap(), "k1", endpoint);
        let body = transport().send(&request).unwrap();
        assert_eq!(body["county"]["name"], "Leon");
        assert_eq!(
            urls.recv().unwrap(),
            "/get_single_address?address1=123+Main+Street&city=Tallahassee&state=FL&api_key=k1"
        );
    }

    #[test]
    fn test_service_detail_on_error_status() {
        let (endpoint, _urls) = serve(vec![(422, r#"{"detail": "GeographyException"}"#.into())]);
        let query = build_query(&AddressFields::free_form("nowhere")).unwrap();
        let err = transport()
            .send(&EnrichmentRequest::new(query, "k", endpoint))
            .unwrap_err();
        assert!(matches!(err, ClientError::Service(d) if d == "GeographyException"));
    }

    #[test]
    fn test_status_mapping() {
        let (endpoint, _urls) = serve(vec![
            (401, r#"{"detail": "Invalid API key"}"#.into()),
            (503, "upstream down".into()),
            (200, "<html>oops</html>".into()),
        ]);
        let query = build_query(&AddressFields::free_form("1 Elm St")).unwrap();
        let request = EnrichmentRequest::new(query, "k", endpoint);
        let t = transport();

        assert!(matches!(t.send(&request), Err(ClientError::Security(m)) if m == "Invalid API key"));
        assert!(matches!(
            t.send(&request),
            Err(ClientError::Transport { status: Some(503), message }) if message == "upstream down"
        ));
        assert!(matches!(t.send(&request), Err(ClientError::ResponseFormat(_))));
    }

    #[test]
    fn test_connection_refused_is_transport_error() {
        // Bind then drop to get a port nobody is listening on.
        let addr = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap()
        };
        let endpoint = Url::parse(&format!("http://{addr}/")).unwrap();
        let query = build_query(&AddressFields::free_form("1 Elm St")).unwrap();
        let err = transport()
            .send(&EnrichmentRequest::new(query, "k", endpoint))
            .unwrap_err();
        assert!(matches!(err, ClientError::Transport { status: None, .. }));
    }

    #[test]
    fn test_request_api_key_url() {
        let (endpoint, urls) = serve(vec![(
            200,
            r#"{"status": "SUCCESS", "api_key": "abc"}"#.into(),
        )]);
        let body = transport()
            .request_api_key(&endpoint, "someone@example.com")
            .unwrap();
        assert_eq!(body["api_key"], "abc");
        assert_eq!(
            urls.recv().unwrap(),
            "/get_free_api_key?email_address=someone%40example.com"
        );
    }

    #[test]
    fn test_truncate_long_body() {
        let body = "x".repeat(ERROR_BODY_CAP + 10);
        let out = truncate(&body);
        assert!(out.ends_with("..."));
        assert_eq!(out.len(), ERROR_BODY_CAP + 3);
    }
}
