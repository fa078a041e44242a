use std::collections::VecDeque;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;

use crate::ping::{Ping, RawRecord};
use crate::transport::{PingTransport, UploadOutcome};

/// Initialize tracing for tests with appropriate settings
#[inline]
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// A stored record that materializes into a ping carrying `label`.
pub fn ping_record(label: &str) -> RawRecord {
    Ping::new("core", json!({"label": label}).as_object().cloned().unwrap())
        .with_upload_path(format!("/submit/core/{}", label))
        .to_record()
}

/// A stored record that fails to materialize.
pub fn malformed_record(label: &str) -> RawRecord {
    json!({"label": label}).as_object().cloned().unwrap()
}

/// Transport that replays scripted outcomes and remembers what it was sent.
///
/// Once the script runs out every upload answers 200.
#[derive(Default)]
pub struct ScriptedTransport {
    script: Mutex<VecDeque<UploadOutcome>>,
    sent: Mutex<Vec<String>>,
}

impl ScriptedTransport {
    pub fn new(script: impl IntoIterator<Item = UploadOutcome>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            sent: Mutex::default(),
        }
    }

    /// Labels of the uploaded pings, in call order.
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl PingTransport for ScriptedTransport {
    async fn upload(&self, ping: &Ping) -> UploadOutcome {
        let label = ping
            .measurements
            .get("label")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        self.sent.lock().push(label);

        // Yield so runs behave like a real network round trip.
        tokio::task::yield_now().await;

        self.script
            .lock()
            .pop_front()
            .unwrap_or_else(|| UploadOutcome::response(200))
    }
}
