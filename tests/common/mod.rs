//! Shared utilities for integration tests.
#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use flag_service::admin::ReadinessProbe;
use flag_service::config::ServiceConfig;
use flag_service::service::connect::decode_envelopes;
use flag_service::store::{FlagDocument, FlagStore};
use flag_service::{FlagService, Notification, NotificationBus, ServiceError, Shutdown};
use tokio::task::JoinHandle;

pub const FLAGS: &str = r##"{
    "flags": {
        "new-welcome-banner": {
            "state": "ENABLED",
            "variants": { "on": true, "off": false },
            "defaultVariant": "on"
        },
        "header-color": {
            "state": "ENABLED",
            "variants": { "red": "#FF0000" },
            "defaultVariant": "red"
        },
        "retries": {
            "state": "ENABLED",
            "variants": { "many": 10 },
            "defaultVariant": "many"
        },
        "legacy-checkout": {
            "state": "DISABLED",
            "variants": { "on": true },
            "defaultVariant": "on"
        }
    }
}"##;

/// A running service on loopback ports.
pub struct TestService {
    pub rpc_url: String,
    pub management_url: String,
    pub bus: Arc<NotificationBus>,
    pub shutdown: Shutdown,
    pub task: JoinHandle<Result<(), ServiceError>>,
}

impl TestService {
    pub fn method_url(&self, method: &str) -> String {
        format!("{}/schema.v1.Service/{}", self.rpc_url, method)
    }

    /// Trigger shutdown and wait for `serve` to return.
    pub async fn stop(self) -> Result<(), ServiceError> {
        self.shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(10), self.task)
            .await
            .expect("service did not stop")
            .expect("service task panicked")
    }
}

/// A port that was free a moment ago.
pub fn free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

pub fn test_config() -> ServiceConfig {
    let mut config = ServiceConfig::default();
    config.server.port = free_port();
    config.server.management_port = free_port();
    config.server.shutdown_grace_secs = 5;
    config
}

pub fn loaded_store() -> Arc<FlagStore> {
    let store = FlagStore::new();
    store.replace(FlagDocument::parse(FLAGS).unwrap());
    Arc::new(store)
}

/// A CA and a `localhost` certificate signed by it, written to a temp dir.
pub struct TlsFixture {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
    pub ca_pem: String,
    pub ca_der: Vec<u8>,
}

pub fn tls_fixture() -> TlsFixture {
    use rcgen::{
        BasicConstraints, CertificateParams, ExtendedKeyUsagePurpose, IsCa, KeyPair,
        KeyUsagePurpose,
    };

    let ca_key = KeyPair::generate().unwrap();
    let mut ca_params = CertificateParams::new(Vec::<String>::new()).unwrap();
    ca_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    ca_params.key_usages = vec![KeyUsagePurpose::KeyCertSign, KeyUsagePurpose::CrlSign];
    let ca = ca_params.self_signed(&ca_key).unwrap();

    let leaf_key = KeyPair::generate().unwrap();
    let mut leaf_params = CertificateParams::new(vec!["localhost".to_string()]).unwrap();
    leaf_params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ServerAuth];
    let leaf = leaf_params.signed_by(&leaf_key, &ca, &ca_key).unwrap();

    let dir = std::env::temp_dir().join(format!("flag-service-tls-{}", free_port()));
    std::fs::create_dir_all(&dir).unwrap();
    let cert_path = dir.join("cert.pem");
    let key_path = dir.join("key.pem");
    std::fs::write(&cert_path, leaf.pem()).unwrap();
    std::fs::write(&key_path, leaf_key.serialize_pem()).unwrap();

    TlsFixture {
        cert_path,
        key_path,
        ca_pem: ca.pem(),
        ca_der: ca.der().to_vec(),
    }
}

/// Spawn `serve` without waiting for the listeners.
pub fn spawn_service(
    config: ServiceConfig,
    store: Arc<FlagStore>,
) -> (Arc<NotificationBus>, Shutdown, JoinHandle<Result<(), ServiceError>>) {
    let service = FlagService::new(config);
    let bus = service.bus();
    let shutdown = Shutdown::new();
    let probe = Arc::clone(&store);
    let readiness: ReadinessProbe = Arc::new(move || probe.is_ready());
    let signal = shutdown.subscribe();

    let task = tokio::spawn(async move { service.serve(store, readiness, signal).await });
    (bus, shutdown, task)
}

/// Start the service and wait until its management port answers.
pub async fn start_service(config: ServiceConfig, store: Arc<FlagStore>) -> TestService {
    let rpc_url = format!("http://127.0.0.1:{}", config.server.port);
    let management_url = format!("http://127.0.0.1:{}", config.server.management_port);
    let (bus, shutdown, task) = spawn_service(config, store);

    let client = reqwest::Client::new();
    for _ in 0..100 {
        if let Ok(res) = client.get(format!("{management_url}/healthz")).send().await {
            if res.status().is_success() {
                return TestService {
                    rpc_url,
                    management_url,
                    bus,
                    shutdown,
                    task,
                };
            }
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("service did not come up");
}

/// Reassembles stream envelopes from arbitrarily split body chunks.
pub struct FrameReader {
    response: reqwest::Response,
    buffer: Vec<u8>,
}

/// One decoded envelope.
#[derive(Debug)]
pub enum Frame {
    Message(Notification),
    End(serde_json::Value),
}

impl FrameReader {
    pub fn new(response: reqwest::Response) -> Self {
        Self {
            response,
            buffer: Vec::new(),
        }
    }

    /// Next complete envelope, or `None` when the body ends.
    pub async fn next(&mut self) -> Option<Frame> {
        loop {
            if self.buffer.len() >= 5 {
                let len = u32::from_be_bytes([
                    self.buffer[1],
                    self.buffer[2],
                    self.buffer[3],
                    self.buffer[4],
                ]) as usize;
                if self.buffer.len() >= 5 + len {
                    let rest = self.buffer.split_off(5 + len);
                    let frame = std::mem::replace(&mut self.buffer, rest);
                    let (flags, payload) = decode_envelopes(&frame).unwrap()[0];
                    return Some(if flags & 0x02 != 0 {
                        Frame::End(serde_json::from_slice(payload).unwrap())
                    } else {
                        Frame::Message(serde_json::from_slice(payload).unwrap())
                    });
                }
            }

            match self.response.chunk().await.unwrap() {
                Some(chunk) => self.buffer.extend_from_slice(&chunk),
                None => return None,
            }
        }
    }

    pub async fn next_message(&mut self) -> Notification {
        match tokio::time::timeout(Duration::from_secs(5), self.next()).await {
            Ok(Some(Frame::Message(notification))) => notification,
            other => panic!("expected a message frame, got {other:?}"),
        }
    }
}
