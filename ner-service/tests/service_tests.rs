//! Integration tests for ner-service
//!
//! Each test binds a real ZeroMQ REP endpoint on an ephemeral port, runs the
//! service loop with an in-memory gazetteer, and talks to it through
//! `NerClient`.

use async_trait::async_trait;
use ner_core::{
    EntityRecognizer, EntitySpan, ExtractionError, GazetteerEntry, GazetteerModel,
    GazetteerRecognizer,
};
use ner_bridge::SidecarConfig;
use ner_proto::{Reply, Request};
use ner_service::{
    Backend, NerClient, NerService, ReplyEndpoint, ServiceConfig, ServiceError, ServiceStats,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;

struct RunningService {
    address: String,
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<Result<ServiceStats, ServiceError>>,
}

impl RunningService {
    async fn start(recognizer: Box<dyn EntityRecognizer>) -> Self {
        let endpoint = ReplyEndpoint::bind("tcp://127.0.0.1:0").await.unwrap();
        let address = endpoint.local_endpoint().to_string();
        let service = NerService::new(endpoint, recognizer);

        let (shutdown, rx) = watch::channel(false);
        let handle = tokio::spawn(service.run(rx));

        Self {
            address,
            shutdown,
            handle,
        }
    }

    async fn with_gazetteer() -> Self {
        Self::start(Box::new(gazetteer())).await
    }

    async fn client(&self) -> NerClient {
        NerClient::connect(&self.address).await.unwrap()
    }

    async fn stop(self) -> ServiceStats {
        self.shutdown.send(true).unwrap();
        self.handle.await.unwrap().unwrap()
    }
}

fn gazetteer() -> GazetteerRecognizer {
    GazetteerRecognizer::from_model(GazetteerModel {
        entities: vec![
            GazetteerEntry::new("Acme Corp", "ORG"),
            GazetteerEntry::new("Globex", "ORG"),
            GazetteerEntry::new("Initech", "ORGANIZATION"),
            GazetteerEntry::new("Alice", "PERSON"),
            GazetteerEntry::new("Springfield", "GPE"),
        ],
    })
    .unwrap()
}

/// Fails on texts containing "boom", otherwise defers to the gazetteer.
struct FlakyRecognizer(GazetteerRecognizer);

#[async_trait]
impl EntityRecognizer for FlakyRecognizer {
    fn name(&self) -> &str {
        "flaky"
    }

    async fn extract(&mut self, text: &str) -> Result<Vec<EntitySpan>, ExtractionError> {
        if text.contains("boom") {
            return Err(ExtractionError::Model("internal model fault".to_string()));
        }
        self.0.extract(text).await
    }
}

#[tokio::test]
async fn test_end_to_end_examples() {
    let service = RunningService::with_gazetteer().await;
    let mut client = service.client().await;

    let reply = client
        .request(&Request::new("Acme Corp announced new products today."))
        .await
        .unwrap();
    assert_eq!(reply, Reply::company("Acme Corp"));

    let reply = client.request(&Request::new("The sky is blue.")).await.unwrap();
    assert_eq!(reply, Reply::empty());

    client.close().await;
    service.stop().await;
}

#[tokio::test]
async fn test_no_organization_yields_empty_reply() {
    let service = RunningService::with_gazetteer().await;
    let mut client = service.client().await;

    for text in ["", "Alice lives in Springfield.", "nothing to see here"] {
        let reply = client.send_raw(format!(r#"{{"body": "{text}"}}"#).into_bytes()).await.unwrap();
        assert_eq!(reply, Reply::empty(), "text: {text:?}");
        assert!(reply.company.is_none());
    }

    client.close().await;
    service.stop().await;
}

#[tokio::test]
async fn test_single_organization_is_returned() {
    let service = RunningService::with_gazetteer().await;
    let mut client = service.client().await;

    let company = client
        .find_company("Alice was hired by Initech last spring.")
        .await
        .unwrap();
    assert_eq!(company.as_deref(), Some("Initech"));

    client.close().await;
    service.stop().await;
}

#[tokio::test]
async fn test_first_of_many_organizations_wins_and_is_stable() {
    let service = RunningService::with_gazetteer().await;
    let mut client = service.client().await;
    let text = "Globex outbid Acme Corp and Initech for the Springfield contract.";

    let first = client.find_company(text).await.unwrap();
    let second = client.find_company(text).await.unwrap();

    assert_eq!(first.as_deref(), Some("Globex"));
    assert_eq!(first, second);

    client.close().await;
    service.stop().await;
}

#[tokio::test]
async fn test_malformed_requests_get_error_replies_and_service_continues() {
    let service = RunningService::with_gazetteer().await;
    let mut client = service.client().await;

    let malformed: [&[u8]; 5] = [
        br#"{"text": "Acme Corp"}"#,
        br#"{"body": 17}"#,
        br#"{"body": null}"#,
        b"not json at all",
        br#"["body"]"#,
    ];

    for payload in malformed {
        let reply = client.send_raw(payload.to_vec()).await.unwrap();
        assert_eq!(reply, Reply::error("malformed request"));
    }

    let company = client.find_company("Acme Corp is hiring.").await.unwrap();
    assert_eq!(company.as_deref(), Some("Acme Corp"));

    client.close().await;
    let stats = service.stop().await;
    assert_eq!(stats.requests, 6);
    assert_eq!(stats.malformed_requests, 5);
    assert_eq!(stats.organizations_found, 1);
}

#[tokio::test]
async fn test_extraction_failure_is_answered_and_service_continues() {
    let service = RunningService::start(Box::new(FlakyRecognizer(gazetteer()))).await;
    let mut client = service.client().await;

    let reply = client.request(&Request::new("Globex goes boom")).await.unwrap();
    assert_eq!(reply, Reply::error("extraction failed"));

    let err = client.find_company("boom").await.unwrap_err();
    assert!(matches!(err, ner_service::ClientError::Service(_)));

    let company = client.find_company("Globex is fine").await.unwrap();
    assert_eq!(company.as_deref(), Some("Globex"));

    client.close().await;
    let stats = service.stop().await;
    assert_eq!(stats.extraction_failures, 2);
    assert_eq!(stats.organizations_found, 1);
}

/// Signals when extraction begins, then takes its time before deferring to
/// the gazetteer.
struct SlowRecognizer {
    inner: GazetteerRecognizer,
    started: Arc<Notify>,
    delay: Duration,
}

#[async_trait]
impl EntityRecognizer for SlowRecognizer {
    fn name(&self) -> &str {
        "slow"
    }

    async fn extract(&mut self, text: &str) -> Result<Vec<EntitySpan>, ExtractionError> {
        self.started.notify_one();
        tokio::time::sleep(self.delay).await;
        self.inner.extract(text).await
    }
}

#[tokio::test]
async fn test_shutdown_during_extraction_still_replies() {
    let started = Arc::new(Notify::new());
    let service = RunningService::start(Box::new(SlowRecognizer {
        inner: gazetteer(),
        started: started.clone(),
        delay: Duration::from_millis(400),
    }))
    .await;
    let mut client = service.client().await;

    let pending = tokio::spawn(async move {
        let reply = client.request(&Request::new("Acme Corp earnings")).await;
        client.close().await;
        reply
    });

    started.notified().await;
    service.shutdown.send(true).unwrap();

    let reply = pending.await.unwrap().unwrap();
    assert_eq!(reply, Reply::company("Acme Corp"));

    let stats = service.handle.await.unwrap().unwrap();
    assert_eq!(stats.requests, 1);
    assert_eq!(stats.organizations_found, 1);
}

#[tokio::test]
async fn test_sequential_requests_get_matching_replies_in_order() {
    let service = RunningService::with_gazetteer().await;
    let mut client = service.client().await;

    let texts = [
        ("Acme Corp reports earnings", Some("Acme Corp")),
        ("Quiet day", None),
        ("Globex and Acme Corp", Some("Globex")),
        ("Initech layoffs", Some("Initech")),
        ("Alice in Springfield", None),
    ];

    let mut replies = Vec::new();
    for (text, _) in &texts {
        replies.push(client.request(&Request::new(*text)).await.unwrap());
    }

    assert_eq!(replies.len(), texts.len());
    for (reply, (_, expected)) in replies.iter().zip(&texts) {
        assert_eq!(reply.company.as_deref(), *expected);
    }

    client.close().await;
    let stats = service.stop().await;
    assert_eq!(stats.requests, 5);
    assert_eq!(stats.organizations_found, 3);
}

#[tokio::test]
async fn test_shutdown_while_idle_stops_service() {
    let service = RunningService::with_gazetteer().await;

    let stats = service.stop().await;
    assert_eq!(stats, ServiceStats::default());
}

#[tokio::test]
async fn test_dropped_shutdown_sender_stops_service() {
    let service = RunningService::with_gazetteer().await;
    let RunningService {
        shutdown, handle, ..
    } = service;

    drop(shutdown);
    let stats = tokio_test::assert_ok!(handle.await.unwrap());
    assert_eq!(stats.requests, 0);
}

#[tokio::test]
async fn test_address_in_use_is_bind_error() {
    let mut first = ReplyEndpoint::bind("tcp://127.0.0.1:0").await.unwrap();
    let address = first.local_endpoint().to_string();

    let second = ReplyEndpoint::bind(&address).await;
    assert!(second.is_err());

    first.close().await;
}

fn gazetteer_config() -> ServiceConfig {
    ServiceConfig {
        bind_address: "tcp://127.0.0.1:0".to_string(),
        backend: Backend::Gazetteer,
        gazetteer_path: PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../models/gazetteer.json"),
        ..ServiceConfig::default()
    }
}

#[tokio::test]
async fn test_start_serves_shipped_gazetteer() {
    let (shutdown, mut rx) = watch::channel(false);
    let service = NerService::start(&gazetteer_config(), &mut rx)
        .await
        .unwrap()
        .expect("service should start");
    let address = service.local_endpoint().to_string();
    let handle = tokio::spawn(service.run(rx));

    let mut client = NerClient::connect(&address).await.unwrap();
    let company = client.find_company("Initech hires").await.unwrap();
    assert_eq!(company.as_deref(), Some("Initech"));
    client.close().await;

    shutdown.send(true).unwrap();
    let stats = handle.await.unwrap().unwrap();
    assert_eq!(stats.requests, 1);
}

#[tokio::test]
async fn test_start_with_missing_model_is_load_error() {
    let (_shutdown, mut rx) = watch::channel(false);
    let config = ServiceConfig {
        gazetteer_path: PathBuf::from("/nonexistent/gazetteer.json"),
        ..gazetteer_config()
    };

    let result = NerService::start(&config, &mut rx).await;
    assert!(matches!(result, Err(ServiceError::ModelLoad(_))));
}

#[tokio::test]
async fn test_start_after_shutdown_request_does_nothing() {
    let (_shutdown, mut rx) = watch::channel(true);

    let result = NerService::start(&gazetteer_config(), &mut rx).await;
    assert!(matches!(result, Ok(None)));
}

#[tokio::test]
async fn test_shutdown_while_model_loads_abandons_startup() {
    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("never_ready.py");
    std::fs::write(&script, "import time\ntime.sleep(60)\n").unwrap();

    let config = ServiceConfig {
        bind_address: "tcp://127.0.0.1:0".to_string(),
        backend: Backend::Sidecar,
        sidecar: SidecarConfig {
            python: "python3".to_string(),
            script_path: script.to_string_lossy().into_owned(),
            socket_path: dir.path().join("worker.sock").to_string_lossy().into_owned(),
            model: "unused".to_string(),
            startup_timeout: Duration::from_secs(60),
            infer_timeout: Duration::from_secs(1),
        },
        ..ServiceConfig::default()
    };

    let (shutdown, mut rx) = watch::channel(false);
    let stopper = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        shutdown.send(true).unwrap();
        shutdown
    });

    let result = tokio::time::timeout(Duration::from_secs(5), NerService::start(&config, &mut rx))
        .await
        .expect("startup should stop promptly on shutdown");
    assert!(matches!(result, Ok(None)));

    drop(stopper.await.unwrap());
}
