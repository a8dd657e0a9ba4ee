//! Control-service client.
//!
//! # Responsibilities
//! - Authenticate against the control service and keep the session cookie
//! - Fetch a tenant's monitoring configuration and raw delivery snapshot
//!
//! # Design Decisions
//! - `Session` is object safe so a live session can be swapped at runtime
//!   behind `Arc<dyn Session>`
//! - A 401 triggers exactly one re-login and retry

use std::time::Duration;

use bytes::Bytes;
use futures_util::future::BoxFuture;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use url::Url;

use crate::config::schema::ControlConfig;
use crate::session::types::{MonitoringConfig, RawSnapshot, SessionError, DEFAULT_CONTROL_TIMEOUT};

const API_PREFIX: [&str; 2] = ["api", "5.0"];

/// An authenticated connection to the control service.
pub trait Session: Send + Sync + 'static {
    fn monitoring_config<'a>(&'a self, tenant: &'a str) -> BoxFuture<'a, Result<MonitoringConfig, SessionError>>;

    fn snapshot_raw<'a>(&'a self, tenant: &'a str) -> BoxFuture<'a, Result<RawSnapshot, SessionError>>;
}

/// Control-service payloads are wrapped in `{"response": ...}`.
#[derive(Deserialize)]
struct Envelope<T> {
    response: T,
}

/// `Session` over HTTP(S) with a cookie-based login.
pub struct HttpSession {
    client: Client,
    base: Url,
    username: String,
    password: String,
}

impl HttpSession {
    /// Build the client. Does not contact the service: the first request
    /// that comes back 401 logs in.
    pub fn new(config: &ControlConfig) -> Result<Self, SessionError> {
        let base = Url::parse(&config.url).map_err(|_| SessionError::InvalidUrl(config.url.clone()))?;
        if base.cannot_be_a_base() {
            return Err(SessionError::InvalidUrl(config.url.clone()));
        }

        let timeout = if config.timeout_ms == 0 {
            DEFAULT_CONTROL_TIMEOUT
        } else {
            Duration::from_millis(config.timeout_ms)
        };

        let client = Client::builder()
            .cookie_store(true)
            .timeout(timeout)
            .danger_accept_invalid_certs(config.insecure)
            .user_agent(config.user_agent.clone())
            .build()?;

        Ok(Self {
            client,
            base,
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

    pub async fn login(&self) -> Result<(), SessionError> {
        let url = self.endpoint(&["user", "login"])?;
        let body = serde_json::json!({ "u": self.username, "p": self.password });
        let response = self.client.post(url).json(&body).send().await?;
        if !response.status().is_success() {
            return Err(SessionError::Status(response.status().as_u16()));
        }
        tracing::info!(url = %self.base, user = %self.username, "Logged in to control service");
        Ok(())
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, SessionError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| SessionError::InvalidUrl(self.base.to_string()))?
            .pop_if_empty()
            .extend(API_PREFIX)
            .extend(segments);
        Ok(url)
    }

    /// GET `url`, logging in again once if the session has expired.
    async fn get(&self, url: Url) -> Result<Response, SessionError> {
        let response = self.client.get(url.clone()).send().await?;
        let response = if response.status() == StatusCode::UNAUTHORIZED {
            tracing::debug!(url = %url, "Control service session expired, logging in again");
            self.login().await?;
            self.client.get(url).send().await?
        } else {
            response
        };

        if !response.status().is_success() {
            return Err(SessionError::Status(response.status().as_u16()));
        }
        Ok(response)
    }

    async fn get_document<T: DeserializeOwned>(&self, url: Url) -> Result<(T, Option<String>), SessionError> {
        let response = self.get(url).await?;
        let remote_addr = response.remote_addr().map(|addr| addr.to_string());
        let body = response.bytes().await?;
        let envelope: Envelope<T> = serde_json::from_slice(&body)?;
        Ok((envelope.response, remote_addr))
    }
}

impl Session for HttpSession {
    fn monitoring_config<'a>(&'a self, tenant: &'a str) -> BoxFuture<'a, Result<MonitoringConfig, SessionError>> {
        Box::pin(async move {
            let url = self.endpoint(&["cdns", tenant, "configs", "monitoring"])?;
            let (config, _) = self.get_document::<MonitoringConfig>(url).await?;
            Ok(config)
        })
    }

    fn snapshot_raw<'a>(&'a self, tenant: &'a str) -> BoxFuture<'a, Result<RawSnapshot, SessionError>> {
        Box::pin(async move {
            let url = self.endpoint(&["cdns", tenant, "snapshot"])?;
            let (document, remote_addr) = self.get_document::<serde_json::Value>(url).await?;
            let bytes = Bytes::from(serde_json::to_vec(&document)?);
            Ok(RawSnapshot { bytes, remote_addr })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(url: &str) -> ControlConfig {
        ControlConfig {
            url: url.to_string(),
            ..ControlConfig::default()
        }
    }

    #[test]
    fn test_endpoint_paths() {
        let session = HttpSession::new(&config("https://to.example.net/")).unwrap();
        let url = session.endpoint(&["cdns", "cdn1", "snapshot"]).unwrap();
        assert_eq!(url.as_str(), "https://to.example.net/api/5.0/cdns/cdn1/snapshot");

        let session = HttpSession::new(&config("https://to.example.net/prefix")).unwrap();
        let url = session.endpoint(&["user", "login"]).unwrap();
        assert_eq!(url.as_str(), "https://to.example.net/prefix/api/5.0/user/login");
    }

    #[test]
    fn test_tenant_is_escaped() {
        let session = HttpSession::new(&config("http://127.0.0.1:8080")).unwrap();
        let url = session.endpoint(&["cdns", "a/b", "snapshot"]).unwrap();
        assert_eq!(url.path(), "/api/5.0/cdns/a%2Fb/snapshot");
    }

    #[test]
    fn test_rejects_invalid_url() {
        assert!(matches!(
            HttpSession::new(&config("not a url")),
            Err(SessionError::InvalidUrl(_))
        ));
        assert!(matches!(
            HttpSession::new(&config("mailto:ops@example.net")),
            Err(SessionError::InvalidUrl(_))
        ));
    }
}
