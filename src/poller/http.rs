//! HTTP poll type.
//!
//! # Responsibilities
//! - Own one pooled client per engine (the global context)
//! - Derive per-target contexts with their own timeout and keep-alive policy
//! - Issue one GET per poll and collect the body
//!
//! # Design Decisions
//! - Per-target overrides clone the shared client handle or build a fresh
//!   one; the shared context is never mutated
//! - The timeout covers the whole round-trip, body included
//! - Non-2xx responses are failures and carry no body

use std::time::{Duration, Instant, SystemTime};

use bytes::Bytes;
use http_body_util::{BodyExt, Empty};
use hyper::header::{CONNECTION, HOST, USER_AGENT};
use hyper::{Method, Request, Uri};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use tokio::time;

use crate::poller::registry::{AppInfo, GlobalSettings, PollRequest, PollerType};
use crate::poller::types::{EngineSettings, PollResponse, TargetConfig};
use crate::poller::PollError;

pub const HTTP_POLLER_TYPE: &str = "http";

type HttpClient = Client<HttpConnector, Empty<Bytes>>;

fn build_client(no_keep_alive: bool) -> HttpClient {
    let mut builder = Client::builder(TokioExecutor::new());
    if no_keep_alive {
        builder.pool_max_idle_per_host(0);
    }
    builder.build(HttpConnector::new())
}

/// Shared context: one client for every target of an engine.
#[derive(Clone)]
pub struct HttpGlobal {
    client: HttpClient,
    timeout: Duration,
    no_keep_alive: bool,
    user_agent: String,
}

/// Per-target context.
pub struct HttpTarget {
    client: HttpClient,
    timeout: Duration,
    no_keep_alive: bool,
    user_agent: String,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct HttpPoller;

impl PollerType for HttpPoller {
    type Global = HttpGlobal;
    type Target = HttpTarget;

    fn global_init(&self, settings: &GlobalSettings, app: &AppInfo) -> HttpGlobal {
        HttpGlobal {
            client: build_client(settings.no_keep_alive),
            timeout: settings.timeout,
            no_keep_alive: settings.no_keep_alive,
            user_agent: app.user_agent.clone(),
        }
    }

    fn init(&self, target: &TargetConfig, engine: &EngineSettings, global: &HttpGlobal) -> HttpTarget {
        let timeout = if target.timeout.is_zero() {
            global.timeout
        } else {
            target.timeout
        };

        let client = if engine.no_keep_alive == global.no_keep_alive {
            global.client.clone()
        } else {
            build_client(engine.no_keep_alive)
        };

        HttpTarget {
            client,
            timeout,
            no_keep_alive: engine.no_keep_alive,
            user_agent: global.user_agent.clone(),
        }
    }

    async fn poll<'a>(&'a self, ctx: &'a HttpTarget, request: PollRequest<'a>) -> PollResponse {
        let start = Instant::now();
        let result = match time::timeout(ctx.timeout, fetch(ctx, &request)).await {
            Ok(result) => result,
            Err(_) => Err(PollError::Timeout(ctx.timeout)),
        };
        let elapsed = start.elapsed();
        let completed_at = SystemTime::now();

        match result {
            Ok(body) => PollResponse {
                body: Some(body),
                completed_at,
                elapsed,
                error: None,
            },
            Err(e) => {
                tracing::debug!(
                    address = %request.address,
                    poll_id = request.poll_id,
                    error = %e,
                    "HTTP poll failed"
                );
                PollResponse {
                    body: None,
                    completed_at,
                    elapsed,
                    error: Some(e),
                }
            }
        }
    }
}

async fn fetch(ctx: &HttpTarget, request: &PollRequest<'_>) -> Result<Bytes, PollError> {
    let uri: Uri = request.address.parse().map_err(|e: hyper::http::uri::InvalidUri| {
        PollError::InvalidAddress {
            address: request.address.to_string(),
            reason: e.to_string(),
        }
    })?;

    let mut builder = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .header(USER_AGENT, ctx.user_agent.as_str());
    if let Some(host) = request.host {
        builder = builder.header(HOST, host);
    }
    if ctx.no_keep_alive {
        builder = builder.header(CONNECTION, "close");
    }
    let req = builder
        .body(Empty::<Bytes>::new())
        .map_err(|e| PollError::InvalidAddress {
            address: request.address.to_string(),
            reason: e.to_string(),
        })?;

    let response = ctx
        .client
        .request(req)
        .await
        .map_err(|e| PollError::Request(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        return Err(PollError::Status(status.as_u16()));
    }

    let body = response
        .into_body()
        .collect()
        .await
        .map_err(|e| PollError::Body(e.to_string()))?;
    Ok(body.to_bytes())
}
