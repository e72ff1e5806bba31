use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Boxed future returned by [`HttpClient::execute`].
pub type HttpFuture<'a> = Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>>;

/// GET request envelope used by provider adapters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub url: String,
    pub query: Vec<(String, String)>,
    pub headers: BTreeMap<String, String>,
    pub timeout: Duration,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            query: Vec::new(),
            headers: BTreeMap::new(),
            timeout: Duration::from_secs(5),
        }
    }

    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.into().to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Full URL with percent-encoded query string.
    pub fn full_url(&self) -> String {
        if self.query.is_empty() {
            return self.url.clone();
        }
        let query = self
            .query
            .iter()
            .map(|(name, value)| {
                format!(
                    "{}={}",
                    urlencoding::encode(name),
                    urlencoding::encode(value)
                )
            })
            .collect::<Vec<_>>()
            .join("&");
        format!("{}?{}", self.url, query)
    }

    /// URL with credential parameters masked, for logs and error messages.
    pub fn redacted_url(&self) -> String {
        let query = self
            .query
            .iter()
            .map(|(name, value)| {
                let shown = if is_secret_param(name) { "***" } else { value.as_str() };
                format!("{name}={shown}")
            })
            .collect::<Vec<_>>()
            .join("&");
        if query.is_empty() {
            self.url.clone()
        } else {
            format!("{}?{}", self.url, query)
        }
    }
}

fn is_secret_param(name: &str) -> bool {
    matches!(name, "token" | "apikey" | "api_key")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn ok_json(body: impl Into<String>) -> Self {
        Self::with_status(200, body)
    }

    pub fn with_status(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }
}

/// Transport-level HTTP error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpError {
    message: String,
    timeout: bool,
}

impl HttpError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            timeout: false,
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            timeout: true,
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn is_timeout(&self) -> bool {
        self.timeout
    }
}

impl Display for HttpError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for HttpError {}

/// Adapter transport contract.
pub trait HttpClient: Send + Sync {
    fn execute<'a>(&'a self, request: HttpRequest) -> HttpFuture<'a>;
}

/// Production HTTP client backed by reqwest.
#[derive(Debug, Clone)]
pub struct ReqwestHttpClient {
    client: Arc<reqwest::Client>,
}

impl ReqwestHttpClient {
    pub fn new() -> Self {
        Self {
            client: Arc::new(
                reqwest::Client::builder()
                    .user_agent(concat!("stockpulse/", env!("CARGO_PKG_VERSION")))
                    .build()
                    .unwrap_or_else(|_| reqwest::Client::new()),
            ),
        }
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client: Arc::new(client),
        }
    }
}

impl Default for ReqwestHttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient for ReqwestHttpClient {
    fn execute<'a>(&'a self, request: HttpRequest) -> HttpFuture<'a> {
        Box::pin(async move {
            let mut builder = self
                .client
                .get(&request.url)
                .query(&request.query)
                .timeout(request.timeout);

            for (name, value) in &request.headers {
                builder = builder.header(name, value);
            }

            let response = builder.send().await.map_err(|e| {
                let e = e.without_url();
                if e.is_timeout() {
                    HttpError::timeout(format!("request timeout: {e}"))
                } else if e.is_connect() {
                    HttpError::new(format!("connection failed: {e}"))
                } else {
                    HttpError::new(format!("request failed: {e}"))
                }
            })?;

            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .map_err(|e| HttpError::new(format!("failed to read response body: {e}")))?;

            Ok(HttpResponse { status, body })
        })
    }
}

/// Offline transport answering from scripted responses keyed by path and symbol.
///
/// Queued responses are served in order; the last one repeats once the queue
/// drains. Unmatched requests get a 404 with an empty JSON body.
#[derive(Debug, Default)]
pub struct ScriptedHttpClient {
    routes: Mutex<Vec<ScriptedRoute>>,
    calls: Mutex<HashMap<String, usize>>,
}

#[derive(Debug)]
struct ScriptedRoute {
    path: String,
    symbol: String,
    responses: VecDeque<Result<HttpResponse, HttpError>>,
}

impl ScriptedRoute {
    /// `.../quote?symbol=AAPL` and `.../quote/AAPL` both match `("/quote", "AAPL")`.
    fn matches(&self, request: &HttpRequest) -> bool {
        let by_query = request.url.ends_with(&self.path)
            && request
                .query
                .iter()
                .any(|(name, value)| name == "symbol" && *value == self.symbol);
        by_query || request.url.ends_with(&format!("{}/{}", self.path, self.symbol))
    }
}

impl ScriptedHttpClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `body` with status 200 for `path` when `symbol` is requested.
    pub fn respond(self, path: &str, symbol: &str, body: impl Into<String>) -> Self {
        self.script(path, symbol, Ok(HttpResponse::ok_json(body)))
    }

    pub fn respond_status(self, path: &str, symbol: &str, status: u16) -> Self {
        self.script(path, symbol, Ok(HttpResponse::with_status(status, "{}")))
    }

    pub fn fail(self, path: &str, symbol: &str, error: HttpError) -> Self {
        self.script(path, symbol, Err(error))
    }

    /// Append one scripted outcome for `symbol` on `path`.
    pub fn script(
        self,
        path: &str,
        symbol: &str,
        outcome: Result<HttpResponse, HttpError>,
    ) -> Self {
        {
            let mut routes = self.routes.lock().unwrap_or_else(|e| e.into_inner());
            match routes
                .iter_mut()
                .find(|route| route.path == path && route.symbol == symbol)
            {
                Some(route) => route.responses.push_back(outcome),
                None => routes.push(ScriptedRoute {
                    path: path.to_owned(),
                    symbol: symbol.to_owned(),
                    responses: VecDeque::from([outcome]),
                }),
            }
        }
        self
    }

    /// Number of requests whose URL contains `path`.
    pub fn calls_to(&self, path: &str) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|(url, _)| url.contains(path))
            .map(|(_, count)| *count)
            .sum()
    }

    pub fn total_calls(&self) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .sum()
    }

    fn next_outcome(&self, request: &HttpRequest) -> Result<HttpResponse, HttpError> {
        *self
            .calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(request.url.clone())
            .or_default() += 1;

        let mut routes = self.routes.lock().unwrap_or_else(|e| e.into_inner());
        let Some(route) = routes.iter_mut().find(|route| route.matches(request)) else {
            return Ok(HttpResponse::with_status(404, "{}"));
        };

        if route.responses.len() > 1 {
            route
                .responses
                .pop_front()
                .unwrap_or_else(|| Ok(HttpResponse::with_status(404, "{}")))
        } else {
            route
                .responses
                .front()
                .cloned()
                .unwrap_or_else(|| Ok(HttpResponse::with_status(404, "{}")))
        }
    }
}

impl HttpClient for ScriptedHttpClient {
    fn execute<'a>(&'a self, request: HttpRequest) -> HttpFuture<'a> {
        let outcome = self.next_outcome(&request);
        Box::pin(async move { outcome })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_url_encodes_query_and_redacts_tokens() {
        let request = HttpRequest::get("https://finnhub.io/api/v1/quote")
            .with_query("symbol", "BRK.B")
            .with_query("token", "s3cr et");

        assert_eq!(
            request.full_url(),
            "https://finnhub.io/api/v1/quote?symbol=BRK.B&token=s3cr%20et"
        );
        assert_eq!(
            request.redacted_url(),
            "https://finnhub.io/api/v1/quote?symbol=BRK.B&token=***"
        );
    }

    #[tokio::test]
    async fn scripted_client_serves_queue_then_repeats_last() {
        let client = ScriptedHttpClient::new()
            .respond_status("/quote", "AAPL", 503)
            .respond("/quote", "AAPL", r#"{"c":1.0}"#);
        let request = HttpRequest::get("https://x.test/quote").with_query("symbol", "AAPL");

        let first = client.execute(request.clone()).await.expect("response");
        let second = client.execute(request.clone()).await.expect("response");
        let third = client.execute(request).await.expect("response");

        assert_eq!(first.status, 503);
        assert!(second.is_success());
        assert_eq!(second, third);
        assert_eq!(client.calls_to("/quote"), 3);
    }

    #[tokio::test]
    async fn scripted_client_returns_404_for_unknown_routes() {
        let client = ScriptedHttpClient::new();
        let response = client
            .execute(HttpRequest::get("https://x.test/nothing").with_query("symbol", "ZZZ"))
            .await
            .expect("response");
        assert_eq!(response.status, 404);
    }
}
