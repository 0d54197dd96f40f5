//! Pluggable embedding providers behind a blocking capability interface,
//! per the "async external providers" design note: the engine itself
//! stays synchronous, with an explicit timeout on every call.

use std::process::Command;
use std::time::{Duration, Instant};
use tracing::warn;

use crate::error::{Error, Result};

/// Maps text to a dense vector. Implementations must respect `timeout` and
/// return `Error::ProviderUnavailable` rather than blocking indefinitely.
pub trait EmbeddingProvider: Send + Sync {
    fn embed(&self, text: &str, timeout: Duration) -> Result<Vec<f32>>;

    /// Model identifier, stored on each `EmbeddingEntry`.
    fn model_name(&self) -> &str;
}

/// Deterministic provider with no external process or network call, used
/// in tests and as the degraded-mode fallback. Produces a bag-of-words
/// hashed vector so that similar text produces similar vectors without
/// needing a real model.
pub struct MockEmbeddingProvider {
    model: String,
    dimension: usize,
}

impl MockEmbeddingProvider {
    #[must_use]
    pub fn new(dimension: usize) -> Self {
        Self {
            model: "mock-hashed-bow".to_string(),
            dimension,
        }
    }
}

impl Default for MockEmbeddingProvider {
    fn default() -> Self {
        Self::new(64)
    }
}

impl EmbeddingProvider for MockEmbeddingProvider {
    fn embed(&self, text: &str, _timeout: Duration) -> Result<Vec<f32>> {
        let mut vector = vec![0.0f32; self.dimension];
        for word in text.split_whitespace() {
            let h = simple_hash(word) as usize % self.dimension;
            vector[h] += 1.0;
        }
        Ok(vector)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

fn simple_hash(s: &str) -> u64 {
    let mut h: u64 = 0xcbf2_9ce4_8422_2325;
    for b in s.as_bytes() {
        h ^= u64::from(*b);
        h = h.wrapping_mul(0x0000_0100_0000_01B3);
    }
    h
}

/// A local model invoked via a subprocess: writes `text` to stdin, expects
/// a JSON array of floats on stdout. The subprocess is given no more than
/// `timeout` wall-clock time via a coarse post-hoc check (Rust's
/// `std::process` has no first-class kill-on-timeout without a thread;
/// callers requiring hard cancellation should wrap this in their own
/// watchdog).
pub struct LocalSubprocessProvider {
    model: String,
    command: String,
    args: Vec<String>,
}

impl LocalSubprocessProvider {
    #[must_use]
    pub fn new(model: impl Into<String>, command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            model: model.into(),
            command: command.into(),
            args,
        }
    }
}

impl EmbeddingProvider for LocalSubprocessProvider {
    fn embed(&self, text: &str, timeout: Duration) -> Result<Vec<f32>> {
        let start = Instant::now();
        let output = Command::new(&self.command)
            .args(&self.args)
            .arg(text)
            .output()
            .map_err(|e| Error::ProviderUnavailable(format!("spawn failed: {e}")))?;

        if start.elapsed() > timeout {
            warn!(elapsed = ?start.elapsed(), "local embedding provider exceeded timeout");
            return Err(Error::ProviderUnavailable("timeout".to_string()));
        }
        if !output.status.success() {
            return Err(Error::ProviderUnavailable(format!(
                "subprocess exited with {}",
                output.status
            )));
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        let vector: Vec<f32> = serde_json::from_str(stdout.trim())
            .map_err(|e| Error::ProviderUnavailable(format!("invalid output: {e}")))?;
        Ok(vector)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Remote HTTP model. Behind the `remote-embeddings` feature so that the
/// crate's default build carries no HTTP client dependency.
#[cfg(feature = "remote-embeddings")]
pub struct RemoteHttpProvider {
    model: String,
    endpoint: String,
    client: reqwest::blocking::Client,
}

#[cfg(feature = "remote-embeddings")]
impl RemoteHttpProvider {
    #[must_use]
    pub fn new(model: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            endpoint: endpoint.into(),
            client: reqwest::blocking::Client::new(),
        }
    }
}

#[cfg(feature = "remote-embeddings")]
impl EmbeddingProvider for RemoteHttpProvider {
    fn embed(&self, text: &str, timeout: Duration) -> Result<Vec<f32>> {
        #[derive(serde::Serialize)]
        struct Req<'a> {
            model: &'a str,
            input: &'a str,
        }
        #[derive(serde::Deserialize)]
        struct Resp {
            embedding: Vec<f32>,
        }

        let resp = self
            .client
            .post(&self.endpoint)
            .timeout(timeout)
            .json(&Req {
                model: &self.model,
                input: text,
            })
            .send()
            .map_err(|e| Error::ProviderUnavailable(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(Error::ProviderUnavailable(format!(
                "remote provider returned {}",
                resp.status()
            )));
        }
        let parsed: Resp = resp
            .json()
            .map_err(|e| Error::ProviderUnavailable(e.to_string()))?;
        Ok(parsed.embedding)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
