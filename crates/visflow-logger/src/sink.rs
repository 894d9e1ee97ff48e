//! Destinations for finalized traces.
//!
//! [`TraceSink`] is the shipping contract: the recorder hands a finalized
//! entry batch to exactly one sink. [`HttpSink`] POSTs the batch to a
//! collector that may answer with a rendered artifact; [`MemorySink`] is a
//! first-class capture backend for tests and anywhere no collector runs.
//! Both are swappable without changing recorder logic.

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use visflow_core::Entry;

use crate::error::SinkError;

/// Where finalized entry batches go.
#[async_trait]
pub trait TraceSink: Send + Sync {
    /// Ships one operation's entries. On success, may return a derived
    /// artifact (e.g. a rendered diagram) supplied by the destination.
    async fn ship(&self, entries: &[Entry]) -> Result<Option<String>, SinkError>;
}

/// POSTs JSON entry batches to a collector endpoint.
///
/// The collector's 2xx response body is a base64-encoded artifact which is
/// decoded and handed back. Non-2xx responses are reported as [`SinkError`];
/// the recorder logs them without failing the traced work.
pub struct HttpSink {
    client: reqwest::Client,
    url: String,
}

impl HttpSink {
    pub fn new(url: impl Into<String>) -> Self {
        HttpSink {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl TraceSink for HttpSink {
    async fn ship(&self, entries: &[Entry]) -> Result<Option<String>, SinkError> {
        let response = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .json(&entries)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SinkError::Rejected {
                status: status.to_string(),
            });
        }

        let body = response.text().await?;
        if body.is_empty() {
            return Ok(None);
        }
        let decoded = BASE64
            .decode(body.trim())
            .map_err(|err| SinkError::Decode {
                reason: err.to_string(),
            })?;
        let artifact = String::from_utf8(decoded).map_err(|err| SinkError::Decode {
            reason: err.to_string(),
        })?;
        Ok(Some(artifact))
    }
}

/// Retains every shipped batch in memory.
///
/// Lets tests assert that entries captured before a failure were not lost,
/// without a collector in the loop.
#[derive(Default)]
pub struct MemorySink {
    batches: Mutex<Vec<Vec<Entry>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every batch shipped so far, oldest first.
    pub fn batches(&self) -> Vec<Vec<Entry>> {
        self.batches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl TraceSink for MemorySink {
    async fn ship(&self, entries: &[Entry]) -> Result<Option<String>, SinkError> {
        self.batches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entries.to_vec());
        Ok(None)
    }
}
