//! Control-service session and the monitor-config pipeline against a mock
//! control service.

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cdn_monitor::config::ControlConfig;
use cdn_monitor::health::{Availability, HealthHandler, Thresholds};
use cdn_monitor::manager::{ManagerSettings, MonitorConfigManager};
use cdn_monitor::poller::{
    AppInfo, GlobalSettings, MonitorConfigInputs, MonitorConfigPoller, PollerEngine, PollerRegistry, PollingProtocol,
};
use cdn_monitor::session::{
    BackupFiles, ControlSession, FreshnessError, HttpSession, OpsConfig, Session, SessionError,
};
use cdn_monitor::Shutdown;
use serde_json::json;
use tokio::sync::{mpsc, watch};

mod common;
use common::{MockRequest, MockResponse};

const COOKIE: &str = "mojolicious=session-token";

struct MockControl {
    logins: AtomicUsize,
    snapshot_dates: Vec<i64>,
    snapshots_served: AtomicUsize,
    cache_port: AtomicU32,
}

impl MockControl {
    fn new(snapshot_dates: Vec<i64>) -> Arc<Self> {
        Arc::new(Self {
            logins: AtomicUsize::new(0),
            snapshot_dates,
            snapshots_served: AtomicUsize::new(0),
            cache_port: AtomicU32::new(0),
        })
    }

    fn respond(&self, request: MockRequest) -> MockResponse {
        if request.method == "POST" && request.path == "/api/5.0/user/login" {
            let body: serde_json::Value = serde_json::from_slice(&request.body).unwrap_or_default();
            if body["u"] != "admin" || body["p"] != "secret" {
                return MockResponse::status(401);
            }
            self.logins.fetch_add(1, Ordering::SeqCst);
            return MockResponse::ok(r#"{"alerts":[]}"#).with_header("Set-Cookie", &format!("{}; Path=/", COOKIE));
        }

        if request.path == "/_astats" {
            return MockResponse::ok(r#"{"ats":{}}"#);
        }

        if !request.header("cookie").is_some_and(|cookie| cookie.contains(COOKIE)) {
            return MockResponse::status(401);
        }

        match request.path.as_str() {
            "/api/5.0/cdns/cdn1/configs/monitoring" => {
                let port = self.cache_port.load(Ordering::SeqCst);
                let config = json!({
                    "caches": {
                        "edge1": {
                            "fqdn": "edge1.example.net",
                            "ip": "127.0.0.1",
                            "port": port,
                            "status": "REPORTED",
                            "profile": "EDGE"
                        }
                    },
                    "monitors": {
                        "tm1": {"fqdn": "tm1.example.net", "ip": "127.0.0.1", "port": 80, "status": "ONLINE"}
                    },
                    "profiles": {
                        "EDGE": {"health_polling_url": "http://${hostname}/_astats"}
                    },
                    "parameters": {
                        "health.polling.interval": 200,
                        "peers.polling.interval": 200,
                        "tm.polling.interval": 100
                    }
                });
                MockResponse::ok(json!({ "response": config }).to_string())
            }
            "/api/5.0/cdns/cdn1/snapshot" => {
                let served = self.snapshots_served.fetch_add(1, Ordering::SeqCst);
                let date = self.snapshot_dates[served.min(self.snapshot_dates.len() - 1)];
                let snapshot = json!({
                    "stats": {"CDN_name": "cdn1", "date": date},
                    "contentServers": {}
                });
                MockResponse::ok(json!({ "response": snapshot }).to_string())
            }
            _ => MockResponse::status(404),
        }
    }
}

async fn start_control(mock: Arc<MockControl>) -> String {
    let addr = common::start_programmable_backend(move |request| {
        let response = mock.respond(request);
        async move { response }
    })
    .await;
    format!("http://{}", addr)
}

fn control_config(url: String) -> ControlConfig {
    ControlConfig {
        url,
        username: "admin".into(),
        password: "secret".into(),
        ..ControlConfig::default()
    }
}

#[tokio::test]
async fn test_login_and_snapshot_freshness() {
    let mock = MockControl::new(vec![100, 50, 150]);
    let url = start_control(mock.clone()).await;

    let control = ControlSession::new(10, BackupFiles::default());
    control.set_session(Arc::new(HttpSession::new(&control_config(url)).unwrap()));

    let config = control.monitoring_config("cdn1").await.unwrap();
    assert!(config.caches.contains_key("edge1"));
    assert_eq!(mock.logins.load(Ordering::SeqCst), 1);

    control.snapshot_raw("cdn1").await.unwrap();
    let stale = control.snapshot_raw("cdn1").await;
    assert!(matches!(
        stale,
        Err(SessionError::Freshness(FreshnessError::Regression {
            received: 50,
            accepted: 100
        }))
    ));
    control.snapshot_raw("cdn1").await.unwrap();

    let record = control.freshness().get("cdn1").unwrap();
    assert_eq!(record.stats.date, Some(150));

    let history = control.snapshot_history();
    assert_eq!(history.len(), 3);
    assert!(history[0].error.is_none());
    assert!(history[1].error.is_some());
    assert!(history.iter().all(|entry| entry.remote_addr.starts_with("127.0.0.1")));

    // The cookie is reused; no further logins were needed.
    assert_eq!(mock.logins.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_bad_credentials_fail() {
    let mock = MockControl::new(vec![100]);
    let url = start_control(mock.clone()).await;

    let mut config = control_config(url);
    config.password = "wrong".into();
    let session = HttpSession::new(&config).unwrap();

    let result = session.snapshot_raw("cdn1").await;
    assert!(matches!(result, Err(SessionError::Status(401))));
    assert_eq!(mock.logins.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_pipeline_polls_published_caches() {
    let mock = MockControl::new(vec![100, 101, 102, 103]);
    let url = start_control(mock.clone()).await;
    let port = url.rsplit(':').next().unwrap().parse::<u32>().unwrap();
    mock.cache_port.store(port, Ordering::SeqCst);

    let shutdown = Arc::new(Shutdown::new());
    let registry = PollerRegistry::with_builtin("http");
    let global = GlobalSettings::default();
    let app = AppInfo::default();

    let cache_health = Arc::new(HealthHandler::new("caches", Thresholds::default()));
    let peer_health = Arc::new(HealthHandler::new("peers", Thresholds::default()));
    let (cache_tx, cache_rx) = mpsc::channel(4);
    let (peer_tx, peer_rx) = mpsc::channel(4);
    tokio::spawn(PollerEngine::new("caches", &registry, &global, &app, cache_health.clone()).run(cache_rx, shutdown.subscribe()));
    tokio::spawn(PollerEngine::new("peers", &registry, &global, &app, peer_health.clone()).run(peer_rx, shutdown.subscribe()));

    let (poller, snapshots) = MonitorConfigPoller::new(ControlSession::new(10, BackupFiles::default()));
    let mut published = poller.subscribe();

    let ops = OpsConfig {
        control: control_config(url.clone()),
        tenant: "cdn1".into(),
    };
    let session: Arc<dyn Session> = Arc::new(HttpSession::new(&ops.control).unwrap());
    let (_ops_tx, ops_rx) = watch::channel(ops);
    let (_session_tx, session_rx) = watch::channel(Some(session));
    let (interval_tx, interval_rx) = watch::channel(Duration::from_secs(5));
    let mut interval_seen = interval_tx.subscribe();

    let manager = MonitorConfigManager::new(
        ManagerSettings {
            hostname: "tm1".into(),
            polling_format: "astats".into(),
            default_poll_type: "http".into(),
            protocol: PollingProtocol::Ipv4Only,
            http_timeout: Duration::from_secs(1),
            monitor_config_interval: Duration::from_secs(5),
        },
        cache_tx,
        peer_tx,
        interval_tx,
        cache_health.clone(),
        peer_health.clone(),
    );
    tokio::spawn(manager.run(snapshots, shutdown.subscribe()));

    let inputs = MonitorConfigInputs {
        ops_config: ops_rx,
        session: session_rx,
        interval: interval_rx,
    };
    tokio::spawn(poller.run(inputs, shutdown.subscribe()));

    tokio::time::timeout(Duration::from_secs(5), published.changed())
        .await
        .unwrap()
        .unwrap();
    let snapshot = published.borrow().clone().unwrap();
    assert_eq!(snapshot.tenant, "cdn1");
    assert!(snapshot.stats.date.is_some());

    // The manager hands the document's polling interval back to the poller.
    tokio::time::timeout(Duration::from_secs(5), interval_seen.wait_for(|d| *d == Duration::from_millis(97)))
        .await
        .unwrap()
        .unwrap();

    let edge1 = "edge1".to_string();
    let mut available = false;
    for _ in 0..50 {
        if cache_health.get(&edge1).is_some_and(|h| h.state == Availability::Available) {
            available = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(available, "edge1 never became available: {:?}", cache_health.get(&edge1));
    assert!(peer_health.snapshot().is_empty());

    shutdown.trigger();
}
