//! Ping model.
//!
//! Pings are persisted as untyped JSON objects ([`RawRecord`]) and only
//! materialized into a [`Ping`] right before upload.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::Result;

/// One persisted, not yet materialized ping.
pub type RawRecord = Map<String, Value>;

const PING_TYPE_KEY: &str = "pingType";
const DOCUMENT_ID_KEY: &str = "documentId";
const UPLOAD_PATH_KEY: &str = "uploadPath";
const MEASUREMENTS_KEY: &str = "measurements";

/// A telemetry ping ready for upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ping {
    pub ping_type: String,
    pub document_id: String,
    /// Path appended to the collector endpoint.
    pub upload_path: String,
    pub measurements: Map<String, Value>,
}

impl Ping {
    /// Create a ping with a fresh document id and the default submit path.
    pub fn new(ping_type: impl Into<String>, measurements: Map<String, Value>) -> Self {
        let ping_type = ping_type.into();
        let document_id = Uuid::new_v4().to_string();
        let upload_path = format!("/submit/telemetry/{}/{}", document_id, ping_type);

        Self {
            ping_type,
            document_id,
            upload_path,
            measurements,
        }
    }

    pub fn with_upload_path(mut self, upload_path: impl Into<String>) -> Self {
        self.upload_path = upload_path.into();
        self
    }

    /// Materialize a ping from a stored record.
    ///
    /// Returns `None` when a required field is missing or has the wrong type.
    pub fn from_record(record: &RawRecord) -> Option<Self> {
        let ping_type = record.get(PING_TYPE_KEY)?.as_str()?;
        let document_id = record.get(DOCUMENT_ID_KEY)?.as_str()?;
        let upload_path = record.get(UPLOAD_PATH_KEY)?.as_str()?;
        let measurements = record.get(MEASUREMENTS_KEY)?.as_object()?;

        Some(Self {
            ping_type: ping_type.to_string(),
            document_id: document_id.to_string(),
            upload_path: upload_path.to_string(),
            measurements: measurements.clone(),
        })
    }

    /// Convert back into the stored representation.
    pub fn to_record(&self) -> RawRecord {
        let mut record = Map::new();
        record.insert(
            PING_TYPE_KEY.to_string(),
            Value::String(self.ping_type.clone()),
        );
        record.insert(
            DOCUMENT_ID_KEY.to_string(),
            Value::String(self.document_id.clone()),
        );
        record.insert(
            UPLOAD_PATH_KEY.to_string(),
            Value::String(self.upload_path.clone()),
        );
        record.insert(
            MEASUREMENTS_KEY.to_string(),
            Value::Object(self.measurements.clone()),
        );
        record
    }

    /// Request body: the measurements object.
    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(&self.measurements)?)
    }
}
