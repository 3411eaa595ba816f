#![doc = "Directus REST transport: the reqwest implementation of the core ResourceAdapter."]
//
//! # Directus client
//!
//! [`DirectusClient`] is the bridge between the reconciliation engine in `cms-sync-core` and a
//! live Directus instance. It owns authentication (static bearer token, or a login with
//! email/password/OTP) and maps every HTTP failure onto a typed
//! [`cms_sync_core::error::TransportError`] so the CLI can render it.
//!
//! All collection responses are unwrapped from Directus' `{ "data": ... }` envelope.

use async_trait::async_trait;
use cms_sync_core::contract::{Endpoint, ListQuery, Record, RecordId, ResourceAdapter};
use cms_sync_core::error::TransportError;
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};

pub const DEFAULT_HOST: &str = "http://localhost:8055";

/// How to authenticate against the instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credentials {
    Token(String),
    Login {
        email: String,
        password: String,
        otp: Option<String>,
    },
    Anonymous,
}

pub struct DirectusClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    errors: Vec<ErrorEntry>,
}

#[derive(Deserialize)]
struct ErrorEntry {
    #[serde(default)]
    message: String,
    #[serde(default)]
    extensions: Option<ErrorExtensions>,
}

#[derive(Deserialize)]
struct ErrorExtensions {
    #[serde(default)]
    code: Option<String>,
}

impl DirectusClient {
    /// A client for `host` without any credentials yet.
    pub fn new(host: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: host.trim_end_matches('/').to_string(),
            token: None,
        }
    }

    /// Build a client and authenticate it.
    pub async fn connect(host: &str, credentials: Credentials) -> Result<Self, TransportError> {
        let mut client = Self::new(host);
        match credentials {
            Credentials::Token(token) => {
                tracing::info!(host = %client.base_url, "Using static token");
                client.token = Some(token);
            }
            Credentials::Login {
                email,
                password,
                otp,
            } => client.login(&email, &password, otp.as_deref()).await?,
            Credentials::Anonymous => {
                tracing::warn!(host = %client.base_url, "No credentials given, requests are unauthenticated");
            }
        }
        Ok(client)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Exchange email/password (and optional OTP) for an access token.
    pub async fn login(
        &mut self,
        email: &str,
        password: &str,
        otp: Option<&str>,
    ) -> Result<(), TransportError> {
        let mut body = json!({ "email": email, "password": password });
        if let Some(otp) = otp {
            body["otp"] = json!(otp);
        }
        let url = self.url("auth/login");
        let data = data_of(self.send(Method::POST, "auth/login", &[], Some(&body)).await?);
        let token = data
            .get("access_token")
            .and_then(Value::as_str)
            .ok_or_else(|| TransportError::Decode {
                url,
                message: "login response carries no access_token".to_string(),
            })?;
        tracing::info!(host = %self.base_url, email, "Logged in");
        self.token = Some(token.to_string());
        Ok(())
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// Send one request and decode its body. `None` means the response had no content.
    async fn send(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<Option<Value>, TransportError> {
        let url = self.url(path);
        let mut request = self.http.request(method.clone(), &url).query(query);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        tracing::debug!(method = %method, url = %url, "Sending request");
        let response = request
            .send()
            .await
            .map_err(|e| self.request_error(&url, e))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| self.request_error(&url, e))?;

        if !status.is_success() {
            tracing::error!(method = %method, url = %url, status = status.as_u16(), "Request failed");
            return Err(status_error(status, &url, &text));
        }
        if status == StatusCode::NO_CONTENT || text.trim().is_empty() {
            return Ok(None);
        }
        serde_json::from_str(&text)
            .map(Some)
            .map_err(|e| TransportError::Decode {
                url,
                message: e.to_string(),
            })
    }

    fn request_error(&self, url: &str, e: reqwest::Error) -> TransportError {
        if e.is_connect() {
            TransportError::ConnectionRefused {
                host: self.base_url.clone(),
            }
        } else {
            TransportError::Request {
                url: url.to_string(),
                message: e.to_string(),
            }
        }
    }
}

fn status_error(status: StatusCode, url: &str, body: &str) -> TransportError {
    let errors = serde_json::from_str::<ErrorBody>(body)
        .map(|parsed| parsed.errors)
        .unwrap_or_default();
    let invalid_credentials = errors.iter().any(|entry| {
        entry
            .extensions
            .as_ref()
            .and_then(|ext| ext.code.as_deref())
            == Some("INVALID_CREDENTIALS")
    });
    if invalid_credentials {
        return TransportError::InvalidCredentials;
    }
    let message = (!errors.is_empty()).then(|| {
        errors
            .iter()
            .map(|entry| entry.message.as_str())
            .collect::<Vec<_>>()
            .join("; ")
    });
    TransportError::Status {
        status: status.as_u16(),
        reason: status.canonical_reason().unwrap_or_default().to_string(),
        url: url.to_string(),
        message,
    }
}

/// Unwrap the `data` envelope; a missing body or envelope is `null`.
fn data_of(body: Option<Value>) -> Value {
    body.and_then(|mut body| body.get_mut("data").map(Value::take))
        .unwrap_or(Value::Null)
}

fn record_of(body: Option<Value>) -> Record {
    match data_of(body) {
        Value::Object(record) => record,
        _ => Record::new(),
    }
}

fn list_params(query: &ListQuery) -> Vec<(&'static str, String)> {
    let mut params = vec![("page", query.page.to_string())];
    if let Some(limit) = query.limit {
        params.push(("limit", limit.to_string()));
    }
    if !query.sort.is_empty() {
        params.push(("sort", query.sort.join(",")));
    }
    if !query.fields.is_empty() {
        params.push(("fields", query.fields.join(",")));
    }
    if let Some(filter) = &query.filter {
        params.push(("filter", filter.to_string()));
    }
    params
}

#[async_trait]
impl ResourceAdapter for DirectusClient {
    async fn list(&self, endpoint: Endpoint, query: ListQuery) -> Result<Vec<Record>, TransportError> {
        let body = self
            .send(Method::GET, endpoint.path(), &list_params(&query), None)
            .await?;
        match data_of(body) {
            Value::Null => Ok(Vec::new()),
            data => serde_json::from_value(data).map_err(|e| TransportError::Decode {
                url: self.url(endpoint.path()),
                message: e.to_string(),
            }),
        }
    }

    async fn create(&self, endpoint: Endpoint, record: Record) -> Result<Record, TransportError> {
        let body = Value::Object(record);
        Ok(record_of(
            self.send(Method::POST, endpoint.path(), &[], Some(&body)).await?,
        ))
    }

    async fn update(
        &self,
        endpoint: Endpoint,
        id: RecordId,
        patch: Record,
    ) -> Result<Record, TransportError> {
        let path = format!("{}/{}", endpoint.path(), id);
        let body = Value::Object(patch);
        Ok(record_of(
            self.send(Method::PATCH, &path, &[], Some(&body)).await?,
        ))
    }

    async fn delete(&self, endpoint: Endpoint, id: RecordId) -> Result<(), TransportError> {
        let path = format!("{}/{}", endpoint.path(), id);
        self.send(Method::DELETE, &path, &[], None).await?;
        Ok(())
    }

    async fn schema_snapshot(&self) -> Result<Value, TransportError> {
        Ok(data_of(
            self.send(Method::GET, "schema/snapshot", &[], None).await?,
        ))
    }

    async fn schema_diff(&self, snapshot: Value) -> Result<Value, TransportError> {
        Ok(data_of(
            self.send(Method::POST, "schema/diff", &[], Some(&snapshot))
                .await?,
        ))
    }

    async fn schema_apply(&self, diff: Value) -> Result<Value, TransportError> {
        Ok(data_of(
            self.send(Method::POST, "schema/apply", &[], Some(&diff)).await?,
        ))
    }
}
