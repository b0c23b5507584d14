//! Sensor uploader
//!
//! Reads the configured entity states from the registry and POSTs them as one
//! JSON document. Runs on its own interval timer and on demand; failures are
//! logged and reported through [`UploadOutcome`], never propagated.

use crate::config::HttpConfig;
use crate::entity::StateReader;
use crate::error::{AmpsterError, Result};
use crate::logging::StructuredLogger;
use crate::scheduler::{TimerHandle, schedule_interval};
use chrono::Utc;
use reqwest::StatusCode;
use reqwest::header::CONTENT_TYPE;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;

/// Upload target and sensor selection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadConfig {
    pub url: String,
    pub api_key: String,
    /// Sensor names in configured order
    pub sensor_names: Vec<String>,
    pub interval_minutes: u32,
}

impl UploadConfig {
    pub fn new(
        url: impl Into<String>,
        api_key: impl Into<String>,
        sensors: &str,
        interval_minutes: u32,
    ) -> Self {
        Self {
            url: url.into().trim().to_string(),
            api_key: api_key.into().trim().to_string(),
            sensor_names: parse_sensor_list(sensors),
            interval_minutes,
        }
    }

    /// URL, key and at least one sensor are all present
    pub fn is_complete(&self) -> bool {
        !self.url.is_empty() && !self.api_key.is_empty() && !self.sensor_names.is_empty()
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.interval_minutes.max(1)) * 60)
    }
}

/// Comma-separated names, trimmed, blanks dropped
pub fn parse_sensor_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Entity ids tried, in order, for a configured sensor name
pub fn candidate_ids(name: &str) -> Vec<String> {
    if name.starts_with("sensor.") {
        vec![name.to_string()]
    } else {
        vec![
            name.to_string(),
            format!("sensor.{}", name),
            format!("sensor.ampster_{}", name),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorReading {
    pub value: String,
    pub attributes: Map<String, Value>,
}

/// Document POSTed to the upload endpoint
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UploadPayload {
    pub timestamp: String,
    /// Keyed by the configured name, not the resolved entity id
    pub sensors: BTreeMap<String, SensorReading>,
}

/// Result of one upload attempt
#[derive(Debug, Clone, PartialEq)]
pub enum UploadOutcome {
    Uploaded { sensors: usize },
    Rejected { status: u16, body: String },
    Failed(String),
    NothingToUpload,
    NotConfigured,
}

impl UploadOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Uploaded { .. })
    }
}

type Flight = watch::Receiver<Option<UploadOutcome>>;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

struct FlightGuard<'a> {
    slot: &'a Mutex<Option<Flight>>,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        lock(self.slot).take();
    }
}

pub struct DataUploader {
    config: UploadConfig,
    client: reqwest::Client,
    states: Arc<dyn StateReader>,
    logger: StructuredLogger,
    flight: Mutex<Option<Flight>>,
    timer: Mutex<Option<TimerHandle>>,
}

impl DataUploader {
    pub fn new(
        config: UploadConfig,
        http: &HttpConfig,
        states: Arc<dyn StateReader>,
        logger: StructuredLogger,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(http.timeout_seconds))
            .build()
            .map_err(|e| AmpsterError::config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            config,
            client,
            states,
            logger,
            flight: Mutex::new(None),
            timer: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &UploadConfig {
        &self.config
    }

    /// Resolve configured names against current states
    pub fn collect_payload(&self) -> UploadPayload {
        let mut sensors = BTreeMap::new();
        for name in &self.config.sensor_names {
            let candidates = candidate_ids(name);
            let found = candidates
                .iter()
                .find_map(|id| self.states.get_state(id).map(|state| (id, state)));
            match found {
                Some((id, state)) => {
                    self.logger
                        .debug(&format!("Resolved sensor '{}' to {}", name, id));
                    sensors.insert(
                        name.clone(),
                        SensorReading {
                            value: state.state,
                            attributes: state.attributes,
                        },
                    );
                }
                None => self.logger.warn(&format!(
                    "Sensor '{}' not found (tried: {})",
                    name,
                    candidates.join(", ")
                )),
            }
        }
        UploadPayload {
            timestamp: Utc::now().to_rfc3339(),
            sensors,
        }
    }

    /// Upload now, or join the upload already running
    pub async fn upload(&self) -> UploadOutcome {
        let claimed = {
            let mut slot = lock(&self.flight);
            match slot.clone() {
                Some(flight) => Err(flight),
                None => {
                    let (tx, rx) = watch::channel(None);
                    *slot = Some(rx);
                    Ok(tx)
                }
            }
        };
        let tx = match claimed {
            Ok(tx) => tx,
            Err(mut flight) => {
                self.logger.debug("Upload already running; joining it");
                return match flight.wait_for(|o| o.is_some()).await {
                    Ok(outcome) => outcome
                        .clone()
                        .unwrap_or_else(|| UploadOutcome::Failed("no outcome".to_string())),
                    Err(_) => UploadOutcome::Failed("upload was cancelled".to_string()),
                };
            }
        };
        let guard = FlightGuard { slot: &self.flight };

        let outcome = self.perform().await;
        drop(guard);
        let _ = tx.send(Some(outcome.clone()));
        outcome
    }

    async fn perform(&self) -> UploadOutcome {
        if !self.config.is_complete() {
            self.logger
                .info("Upload not configured (missing URL, API key or sensors)");
            return UploadOutcome::NotConfigured;
        }

        let payload = self.collect_payload();
        if payload.sensors.is_empty() {
            self.logger.warn("No sensor data to upload");
            return UploadOutcome::NothingToUpload;
        }

        let count = payload.sensors.len();
        let response = self
            .client
            .post(&self.config.url)
            .header("X-API-Key", &self.config.api_key)
            .header(CONTENT_TYPE, "application/json")
            .json(&payload)
            .send()
            .await;

        match response {
            Ok(resp) if resp.status() == StatusCode::OK => {
                self.logger
                    .info(&format!("Successfully uploaded {} sensors", count));
                UploadOutcome::Uploaded { sensors: count }
            }
            Ok(resp) => {
                let status = resp.status().as_u16();
                let body = resp.text().await.unwrap_or_default();
                self.logger
                    .error(&format!("Upload failed with status {}: {}", status, body));
                UploadOutcome::Rejected { status, body }
            }
            Err(e) => {
                let err = AmpsterError::upload(format!("POST to {} failed: {}", self.config.url, e));
                self.logger.error(&err.to_string());
                UploadOutcome::Failed(err.to_string())
            }
        }
    }

    /// Start the interval timer; false when the upload is not configured
    pub fn start(self: &Arc<Self>) -> bool {
        if !self.config.is_complete() {
            self.logger
                .info("Uploader not started: URL, API key and sensors are required");
            return false;
        }
        let weak = Arc::downgrade(self);
        let handle = schedule_interval("sensor-upload", self.config.interval(), move || {
            let weak = weak.clone();
            async move {
                if let Some(uploader) = weak.upgrade() {
                    uploader.upload().await;
                }
            }
        });
        if let Some(mut previous) = lock(&self.timer).replace(handle) {
            previous.cancel();
        }
        self.logger.info(&format!(
            "Uploading {} sensors every {} minutes",
            self.config.sensor_names.len(),
            self.config.interval_minutes
        ));
        true
    }

    pub fn is_running(&self) -> bool {
        lock(&self.timer).as_ref().is_some_and(TimerHandle::is_active)
    }

    /// Cancel the timer; safe to call repeatedly
    pub fn stop(&self) -> bool {
        let stopped = lock(&self.timer)
            .take()
            .map(|mut timer| timer.cancel())
            .unwrap_or(false);
        if stopped {
            self.logger.info("Uploader stopped");
        }
        stopped
    }
}
