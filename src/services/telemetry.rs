//! Best-effort telemetry: samples are buffered in a fixed-capacity ring and
//! shipped in batches. Nothing here may fail a request.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::time::Duration;
use tokio::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TelemetrySample {
    Metric {
        name: String,
        value: f64,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        tags: BTreeMap<String, String>,
        recorded_at: DateTime<Utc>,
    },
    Error {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        context: Option<String>,
        recorded_at: DateTime<Utc>,
    },
}

impl TelemetrySample {
    pub fn metric(name: impl Into<String>, value: f64) -> Self {
        Self::Metric {
            name: name.into(),
            value,
            tags: BTreeMap::new(),
            recorded_at: Utc::now(),
        }
    }

    pub fn error(message: impl Into<String>, context: Option<String>) -> Self {
        Self::Error {
            message: message.into(),
            context,
            recorded_at: Utc::now(),
        }
    }
}

/// Fixed-capacity ring: pushing into a full buffer evicts the oldest sample.
#[derive(Debug)]
pub struct SampleBuffer {
    samples: VecDeque<TelemetrySample>,
    capacity: usize,
    dropped: u64,
}

impl SampleBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
            dropped: 0,
        }
    }

    pub fn push(&mut self, sample: TelemetrySample) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
            self.dropped += 1;
        }
        self.samples.push_back(sample);
    }

    pub fn drain(&mut self) -> Vec<TelemetrySample> {
        self.samples.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

#[derive(Serialize)]
struct Batch<'a> {
    service: &'static str,
    samples: &'a [TelemetrySample],
}

pub struct TelemetryService {
    buffer: Mutex<SampleBuffer>,
    http: reqwest::Client,
    endpoint: Option<String>,
    timeout: Duration,
}

impl TelemetryService {
    pub fn new(endpoint: Option<String>, capacity: usize, timeout: Duration) -> Self {
        Self {
            buffer: Mutex::new(SampleBuffer::new(capacity)),
            http: reqwest::Client::new(),
            endpoint,
            timeout,
        }
    }

    pub async fn record(&self, sample: TelemetrySample) {
        self.buffer.lock().await.push(sample);
    }

    pub async fn buffered(&self) -> usize {
        self.buffer.lock().await.len()
    }

    /// Ships everything buffered. Returns how many samples were delivered;
    /// on any failure the batch is dropped and only logged.
    pub async fn flush(&self) -> usize {
        let (samples, dropped) = {
            let mut buffer = self.buffer.lock().await;
            (buffer.drain(), buffer.dropped())
        };
        if samples.is_empty() {
            return 0;
        }

        let Some(endpoint) = self.endpoint.as_deref() else {
            tracing::debug!(
                "No telemetry endpoint configured, discarding {} samples ({} evicted so far)",
                samples.len(),
                dropped
            );
            return 0;
        };

        let batch = Batch {
            service: "aura",
            samples: &samples,
        };
        let send = self.http.post(endpoint).json(&batch).send();
        match tokio::time::timeout(self.timeout, send).await {
            Ok(Ok(resp)) => match resp.error_for_status() {
                Ok(_) => {
                    tracing::debug!("Flushed {} telemetry samples", samples.len());
                    samples.len()
                }
                Err(e) => {
                    tracing::warn!("Telemetry endpoint rejected batch: {}", e);
                    0
                }
            },
            Ok(Err(e)) => {
                tracing::warn!("Telemetry flush failed: {}", e);
                0
            }
            Err(_) => {
                tracing::warn!("Telemetry flush timed out after {:?}", self.timeout);
                0
            }
        }
    }
}
