//! Integration tests for the on-disk uploader.
//!
//! These tests run the full `Telemetry` stack against a temporary data
//! directory and a local HTTP collector.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{StatusCode, Uri};
use axum::routing::post;
use chrono::{Local, TimeDelta};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tempfile::TempDir;
use tokio::net::TcpListener;

use telemetry_upload::{
    ErrorKind, HaltReason, ManualClock, Ping, Telemetry, TelemetryConfig, UploadEvent,
};

#[derive(Default)]
struct Collector {
    /// Requests answered before the collector stops responding.
    budget: Option<usize>,
    paths: Vec<String>,
    bodies: Vec<Value>,
}

type SharedCollector = Arc<Mutex<Collector>>;

async fn submit(
    State(collector): State<SharedCollector>,
    uri: Uri,
    body: Bytes,
) -> StatusCode {
    let hang = {
        let mut collector = collector.lock();
        match collector.budget {
            Some(0) => true,
            Some(ref mut left) => {
                *left -= 1;
                false
            }
            None => false,
        }
    };
    if hang {
        tokio::time::sleep(Duration::from_secs(30)).await;
        return StatusCode::OK;
    }

    let mut collector = collector.lock();
    collector.paths.push(uri.path().to_string());
    collector
        .bodies
        .push(serde_json::from_slice(&body).unwrap_or(Value::Null));
    StatusCode::OK
}

/// Start a collector and return its base URL.
async fn start_collector() -> (String, SharedCollector) {
    let collector = SharedCollector::default();
    let app = Router::new()
        .route("/submit/{*rest}", post(submit))
        .with_state(collector.clone());

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind collector");
    let addr = listener.local_addr().expect("Collector has no address");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("Collector failed");
    });

    (format!("http://{}", addr), collector)
}

fn config(endpoint: &str, data_dir: &Path) -> TelemetryConfig {
    TelemetryConfig {
        server_endpoint: endpoint.to_string(),
        timeout_secs: 1,
        data_dir: data_dir.to_path_buf(),
        ..Default::default()
    }
}

fn ping(label: &str) -> Ping {
    Ping::new("core", json!({"label": label}).as_object().cloned().unwrap())
        .with_upload_path(format!("/submit/core/{}", label))
}

fn ready_files(data_dir: &Path, category: &str) -> Vec<Vec<Value>> {
    let mut names: Vec<_> = std::fs::read_dir(data_dir.join(category))
        .expect("Category directory missing")
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|name| name.starts_with("ready-") && name.ends_with(".jsonl"))
        .collect();
    names.sort();

    names
        .iter()
        .map(|name| {
            std::fs::read_to_string(data_dir.join(category).join(name))
                .unwrap()
                .lines()
                .map(|line| serde_json::from_str(line).unwrap())
                .collect()
        })
        .collect()
}

fn stored_values(data_dir: &Path) -> Value {
    let json = std::fs::read_to_string(data_dir.join("values.json")).expect("values.json missing");
    serde_json::from_str(&json).unwrap()
}

fn labels(records: &[Value]) -> Vec<&str> {
    records
        .iter()
        .map(|record| record["measurements"]["label"].as_str().unwrap_or_default())
        .collect()
}

mod upload_tests {
    use super::*;

    #[tokio::test]
    async fn test_queued_pings_are_uploaded_in_order() {
        let (endpoint, collector) = start_collector().await;
        let dir = TempDir::new().unwrap();
        let telemetry = Telemetry::open(config(&endpoint, dir.path())).await.unwrap();

        for label in ["a", "b", "c"] {
            telemetry.queue(&ping(label)).await.unwrap();
        }

        let report = telemetry.schedule_upload("core").await;
        assert_eq!(report.halt, HaltReason::Drained);
        assert_eq!(report.uploaded, 3);
        assert_eq!(report.remaining, 0);

        {
            let collector = collector.lock();
            assert_eq!(
                collector.paths,
                vec!["/submit/core/a", "/submit/core/b", "/submit/core/c"]
            );
            assert_eq!(
                collector.bodies,
                vec![json!({"label": "a"}), json!({"label": "b"}), json!({"label": "c"})]
            );
        }

        assert!(ready_files(dir.path(), "core").is_empty());
        assert_eq!(stored_values(dir.path())["core-dailyUploadCount"], json!(3));
        assert!(stored_values(dir.path())["core-lastUploadTimestamp"].is_f64());
    }

    #[tokio::test]
    async fn test_failed_upload_keeps_remaining_records_on_disk() {
        let (endpoint, collector) = start_collector().await;
        collector.lock().budget = Some(1);

        let dir = TempDir::new().unwrap();
        let telemetry = Telemetry::open(config(&endpoint, dir.path())).await.unwrap();
        let mut events = telemetry.subscribe();

        for label in ["a", "b", "c"] {
            telemetry.queue(&ping(label)).await.unwrap();
        }

        let report = telemetry.schedule_upload("core").await;
        assert_eq!(report.halt, HaltReason::TransportFailed);
        assert_eq!(report.uploaded, 1);
        assert_eq!(report.remaining, 2);

        let files = ready_files(dir.path(), "core");
        assert_eq!(files.len(), 1);
        assert_eq!(labels(&files[0]), vec!["b", "c"]);

        match events.recv().await.unwrap() {
            UploadEvent::UploadError { category, kind, .. } => {
                assert_eq!(category, "core");
                assert_eq!(kind, ErrorKind::Network);
            }
            other => panic!("unexpected event: {:?}", other),
        }

        // A fresh instance over the same directory picks up where the run stopped.
        drop(telemetry);
        collector.lock().budget = None;
        let telemetry = Telemetry::open(config(&endpoint, dir.path())).await.unwrap();

        let report = telemetry.schedule_upload("core").await;
        assert_eq!(report.halt, HaltReason::Drained);
        assert_eq!(report.uploaded, 2);
        assert_eq!(
            collector.lock().paths,
            vec!["/submit/core/a", "/submit/core/b", "/submit/core/c"]
        );
        assert!(ready_files(dir.path(), "core").is_empty());
    }

    #[tokio::test]
    async fn test_malformed_records_are_dropped() {
        let (endpoint, collector) = start_collector().await;
        let dir = TempDir::new().unwrap();
        let telemetry = Telemetry::open(config(&endpoint, dir.path())).await.unwrap();

        telemetry.queue(&ping("a")).await.unwrap();
        telemetry
            .queue_record("core", json!({"label": "x"}).as_object().cloned().unwrap())
            .await
            .unwrap();
        telemetry.queue(&ping("b")).await.unwrap();

        let report = telemetry.schedule_upload("core").await;
        assert_eq!(report.halt, HaltReason::Drained);
        assert_eq!(report.uploaded, 2);
        assert_eq!(report.decode_failures, 1);
        assert_eq!(collector.lock().paths.len(), 2);
    }
}

mod quota_tests {
    use super::*;

    #[tokio::test]
    async fn test_quota_survives_restart_and_resets_next_day() {
        let (endpoint, collector) = start_collector().await;
        let dir = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::new(Local::now()));

        let mut settings = config(&endpoint, dir.path());
        settings.max_uploads_per_day = 2;

        let telemetry = Telemetry::open(settings.clone())
            .await
            .unwrap()
            .with_clock(clock.clone());
        for label in ["a", "b", "c"] {
            telemetry.queue(&ping(label)).await.unwrap();
        }

        let report = telemetry.schedule_upload("core").await;
        assert_eq!(report.halt, HaltReason::QuotaReached);
        assert_eq!(report.uploaded, 2);
        assert_eq!(report.remaining, 1);
        drop(telemetry);

        let telemetry = Telemetry::open(settings.clone())
            .await
            .unwrap()
            .with_clock(clock.clone());
        let report = telemetry.schedule_upload("core").await;
        assert_eq!(report.halt, HaltReason::QuotaReached);
        assert_eq!(report.uploaded, 0);
        assert_eq!(collector.lock().paths.len(), 2);

        clock.advance(TimeDelta::days(1));
        let report = telemetry.schedule_upload("core").await;
        assert_eq!(report.halt, HaltReason::Drained);
        assert_eq!(report.uploaded, 1);
        assert_eq!(telemetry.quota().daily_count("core").await.unwrap(), 1);
        assert_eq!(collector.lock().paths.last().unwrap(), "/submit/core/c");
    }

    #[tokio::test]
    async fn test_categories_have_separate_quotas() {
        let (endpoint, _collector) = start_collector().await;
        let dir = TempDir::new().unwrap();

        let mut settings = config(&endpoint, dir.path());
        settings.max_uploads_per_day = 1;
        settings
            .max_uploads_per_day_by_category
            .insert("events".to_string(), 3);
        let telemetry = Telemetry::open(settings)
            .await
            .unwrap()
            .with_clock(Arc::new(ManualClock::new(Local::now())));

        for label in ["a", "b"] {
            telemetry.queue(&ping(label)).await.unwrap();
            let mut event = ping(label);
            event.ping_type = "events".to_string();
            telemetry.queue(&event).await.unwrap();
        }

        let core = telemetry.schedule_upload("core").await;
        let events = telemetry.schedule_upload("events").await;

        assert_eq!(core.halt, HaltReason::QuotaReached);
        assert_eq!(core.uploaded, 1);
        assert_eq!(events.halt, HaltReason::Drained);
        assert_eq!(events.uploaded, 2);

        let values = stored_values(dir.path());
        assert_eq!(values["core-dailyUploadCount"], json!(1));
        assert_eq!(values["events-dailyUploadCount"], json!(2));
    }
}

#[tokio::test]
async fn test_open_rejects_invalid_config() {
    let dir = TempDir::new().unwrap();
    let result = Telemetry::open(config("ftp://collector.invalid", dir.path())).await;
    assert!(matches!(result, Err(telemetry_upload::Error::Configuration(_))));
}
