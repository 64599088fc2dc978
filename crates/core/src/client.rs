//! HTTP client for the scanning service.
//!
//! [`DebClient`] owns the base URL and credentials. The access token is
//! exchanged for a bearer JWT on first use and cached for the rest of the run.

use std::time::Duration;

use reqwest::multipart::Form;
use reqwest::{Response, StatusCode};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use crate::config::ClientConfig;
use crate::error::UploadError;

/// Service URL used when neither config nor environment names one.
pub const DEFAULT_URI: &str = "https://debricked.com";

const LOGIN_PATH: &str = "/api/login_refresh";

#[derive(Serialize)]
struct LoginRequest<'a> {
    refresh_token: &'a str,
}

#[derive(Deserialize)]
struct LoginResponse {
    token: String,
}

/// Authenticated client for the scanning service API.
pub struct DebClient {
    host: String,
    access_token: Option<String>,
    http: reqwest::Client,
    jwt: Mutex<Option<String>>,
}

impl DebClient {
    pub fn new(config: &ClientConfig) -> Result<Self, UploadError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("debscan/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| UploadError::Transport(format!("failed to build http client: {e}")))?;

        let access_token = Some(config.access_token.trim().to_owned()).filter(|t| !t.is_empty());

        Ok(Self {
            host: config.uri.trim_end_matches('/').to_owned(),
            access_token,
            http,
            jwt: Mutex::new(None),
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// `GET {host}{path}` with bearer authentication.
    pub async fn get(&self, path: &str) -> Result<Response, UploadError> {
        let jwt = self.jwt().await?;
        let response = self
            .http
            .get(self.url(path))
            .bearer_auth(jwt)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(map_transport)?;
        check(path, response).await
    }

    /// `POST {host}{path}` with a JSON body and bearer authentication.
    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<Response, UploadError> {
        let jwt = self.jwt().await?;
        let response = self
            .http
            .post(self.url(path))
            .bearer_auth(jwt)
            .json(body)
            .send()
            .await
            .map_err(map_transport)?;
        check(path, response).await
    }

    /// `POST {host}{path}` with a multipart body and bearer authentication.
    pub async fn post_multipart(&self, path: &str, form: Form) -> Result<Response, UploadError> {
        let jwt = self.jwt().await?;
        let response = self
            .http
            .post(self.url(path))
            .bearer_auth(jwt)
            .multipart(form)
            .send()
            .await
            .map_err(map_transport)?;
        check(path, response).await
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.host, path)
    }

    async fn jwt(&self) -> Result<String, UploadError> {
        let mut cached = self.jwt.lock().await;
        if let Some(jwt) = cached.as_ref() {
            return Ok(jwt.clone());
        }

        let token = self.access_token.as_deref().ok_or_else(|| {
            UploadError::Unauthorized(
                "no access token; pass --access-token or set DEBRICKED_TOKEN".to_owned(),
            )
        })?;

        debug!(host = %self.host, "exchanging access token for jwt");
        let response = self
            .http
            .post(self.url(LOGIN_PATH))
            .json(&LoginRequest {
                refresh_token: token,
            })
            .send()
            .await
            .map_err(map_transport)?;
        let response = check(LOGIN_PATH, response).await?;
        let login: LoginResponse = decode(LOGIN_PATH, response).await?;

        *cached = Some(login.token.clone());
        Ok(login.token)
    }
}

/// Decodes a JSON body, attributing failures to `endpoint`.
pub async fn decode<T: for<'de> Deserialize<'de>>(
    endpoint: &str,
    response: Response,
) -> Result<T, UploadError> {
    let bytes = response.bytes().await.map_err(map_transport)?;
    serde_json::from_slice(&bytes).map_err(|e| UploadError::Decode {
        endpoint: endpoint.to_owned(),
        reason: e.to_string(),
    })
}

async fn check(endpoint: &str, response: Response) -> Result<Response, UploadError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(UploadError::Unauthorized(format!(
            "{endpoint} answered {}",
            status.as_u16()
        )));
    }

    Err(UploadError::Status {
        endpoint: endpoint.to_owned(),
        status: status.as_u16(),
        body,
    })
}

fn map_transport(e: reqwest::Error) -> UploadError {
    if e.is_timeout() || e.is_connect() {
        UploadError::NoResponse
    } else {
        UploadError::Transport(e.to_string())
    }
}
