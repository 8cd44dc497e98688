use reqwest::header::HeaderMap;
use reqwest::{Client, Method, StatusCode};
use serde_json::Value;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::config::{ClientConfig, RetryPolicy};
use crate::errors::{HtbError, Result};

/// Body attached to an API request
#[derive(Debug, Clone, Default, PartialEq)]
pub enum RequestBody {
    #[default]
    None,
    Json(Value),
    Form(Vec<(String, String)>),
}

/// A single API call, relative to the configured API base
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub endpoint: String,
    pub body: RequestBody,
    pub authorized: bool,
    pub expect_binary: bool,
    pub force_post: bool,
}

impl ApiRequest {
    /// Authorized request; GET unless a body is attached
    pub fn get(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            body: RequestBody::None,
            authorized: true,
            expect_binary: false,
            force_post: false,
        }
    }

    /// Authorized request that is always sent as POST
    pub fn post(endpoint: impl Into<String>) -> Self {
        Self {
            force_post: true,
            ..Self::get(endpoint)
        }
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = RequestBody::Json(body);
        self
    }

    /// Attach a form body, unless a JSON body is already present
    pub fn form<K, V>(mut self, pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        if !matches!(self.body, RequestBody::Json(_)) {
            self.body = RequestBody::Form(
                pairs
                    .into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            );
        }
        self
    }

    pub fn unauthorized(mut self) -> Self {
        self.authorized = false;
        self
    }

    /// Return the raw response body instead of parsed JSON
    pub fn binary(mut self) -> Self {
        self.expect_binary = true;
        self
    }

    pub fn method(&self) -> Method {
        match (&self.body, self.force_post) {
            (RequestBody::None, false) => Method::GET,
            _ => Method::POST,
        }
    }
}

/// Successful response payload
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Json(Value),
    Bytes(Vec<u8>),
}

impl Payload {
    pub fn into_json(self) -> Result<Value> {
        match self {
            Self::Json(value) => Ok(value),
            Self::Bytes(_) => Err(HtbError::Api(
                "expected a JSON body, got raw bytes".to_string(),
            )),
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Self::Bytes(bytes) => bytes,
            Self::Json(value) => value.to_string().into_bytes(),
        }
    }
}

/// Classification of a raw HTTP status and body
#[derive(Debug, Clone, PartialEq)]
pub enum RequestOutcome {
    JsonBody(Value),
    RawBytes(Vec<u8>),
    NotFound,
    Unauthenticated,
    RateLimited,
    HttpError {
        status: StatusCode,
        body_snippet: String,
    },
    ApiError(String),
}

impl RequestOutcome {
    pub fn classify(status: StatusCode, body: Vec<u8>, expect_binary: bool) -> Self {
        match status {
            StatusCode::NOT_FOUND => Self::NotFound,
            StatusCode::TOO_MANY_REQUESTS => Self::RateLimited,
            _ if expect_binary => Self::RawBytes(body),
            StatusCode::UNAUTHORIZED => Self::Unauthenticated,
            _ => match serde_json::from_slice(&body) {
                Ok(value) => Self::JsonBody(value),
                Err(_) if !status.is_success() => Self::HttpError {
                    status,
                    body_snippet: snippet(&body),
                },
                Err(_) => Self::ApiError(format!("response is not JSON: {}", snippet(&body))),
            },
        }
    }

    /// Convert into the caller-facing result for `endpoint`
    pub fn into_result(self, endpoint: &str, attempts: u32) -> Result<Payload> {
        match self {
            Self::JsonBody(value) => Ok(Payload::Json(value)),
            Self::RawBytes(bytes) => Ok(Payload::Bytes(bytes)),
            Self::NotFound => Err(HtbError::NotFound {
                endpoint: endpoint.to_string(),
            }),
            Self::Unauthenticated => Err(HtbError::Authentication(format!(
                "{endpoint} answered 401 Unauthenticated"
            ))),
            Self::RateLimited => Err(HtbError::RateLimited { attempts }),
            Self::HttpError {
                status,
                body_snippet,
            } => Err(HtbError::Http {
                status,
                body_snippet,
            }),
            Self::ApiError(message) => Err(HtbError::Api(message)),
        }
    }
}

fn snippet(body: &[u8]) -> String {
    String::from_utf8_lossy(body).chars().take(200).collect()
}

/// Source of authorization headers for authenticated requests
///
/// Implementations refresh their credentials if needed before handing out headers.
#[async_trait::async_trait]
pub trait Authorizer: Send + Sync {
    async fn authorize(&self, executor: &RequestExecutor) -> Result<HeaderMap>;
}

/// Issues API calls and applies the rate limit retry policy
#[derive(Debug, Clone)]
pub struct RequestExecutor {
    http: Client,
    api_base: Url,
    retry: RetryPolicy,
}

impl RequestExecutor {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let http = Client::builder()
            .connect_timeout(config.http_timeouts.connect)
            .timeout(config.http_timeouts.request)
            .user_agent(config.user_agent.as_str())
            .build()?;

        Ok(Self {
            http,
            api_base: config.api_base.clone(),
            retry: config.retry.clone(),
        })
    }

    pub fn api_base(&self) -> &Url {
        &self.api_base
    }

    /// Execute a request, asking `authorizer` for headers when it is authorized
    pub async fn execute(
        &self,
        request: &ApiRequest,
        authorizer: &dyn Authorizer,
    ) -> Result<Payload> {
        let headers = if request.authorized {
            authorizer.authorize(self).await?
        } else {
            HeaderMap::new()
        };

        self.dispatch(request, headers).await
    }

    /// Send a request with the given extra headers, retrying on 429
    #[instrument(skip(self, request, headers), fields(endpoint = %request.endpoint))]
    pub async fn dispatch(&self, request: &ApiRequest, headers: HeaderMap) -> Result<Payload> {
        let url = self.api_base.join(&request.endpoint)?;
        let method = request.method();
        let mut retries = 0;

        loop {
            debug!("{} {}", method, url);
            let mut builder = self
                .http
                .request(method.clone(), url.clone())
                .headers(headers.clone());

            builder = match &request.body {
                RequestBody::None => builder,
                RequestBody::Json(body) => builder.json(body),
                RequestBody::Form(pairs) => builder.form(pairs),
            };

            let response = builder.send().await?;
            let status = response.status();
            let body = response.bytes().await?.to_vec();
            let outcome = RequestOutcome::classify(status, body, request.expect_binary);

            if outcome == RequestOutcome::RateLimited && self.retry.allows(retries) {
                let delay = self.retry.delay_for(retries);
                warn!(
                    "Rate limited on {}, retrying in {:?}",
                    request.endpoint, delay
                );
                tokio::time::sleep(delay).await;
                retries += 1;
                continue;
            }

            return outcome.into_result(&request.endpoint, retries + 1);
        }
    }
}
