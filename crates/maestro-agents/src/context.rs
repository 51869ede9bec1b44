//! Context sources feeding agent prompts.
//!
//! An agent gathers context from its registered sources in registration
//! order before every run. A failing source contributes nothing; the run
//! itself is never aborted by context problems.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tracing::warn;

use crate::error::{Error, Result};

/// Something that can contribute text to an agent's prompt.
#[async_trait::async_trait]
pub trait ContextSource: Send + Sync {
    /// Name used in logs and context labels.
    fn name(&self) -> &str;

    /// Produces this source's contribution.
    async fn gather(&self) -> Result<String>;
}

/// Fixed text registered up front.
pub struct StaticSource {
    name: String,
    text: String,
}

impl StaticSource {
    /// Creates a source that always yields `text`.
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
        }
    }
}

#[async_trait::async_trait]
impl ContextSource for StaticSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn gather(&self) -> Result<String> {
        Ok(self.text.clone())
    }
}

/// Text computed by a registered closure at gather time.
pub struct GeneratedSource {
    name: String,
    generator: Box<dyn Fn() -> Result<String> + Send + Sync>,
}

impl GeneratedSource {
    /// Creates a source backed by `generator`.
    pub fn new(
        name: impl Into<String>,
        generator: impl Fn() -> Result<String> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            generator: Box::new(generator),
        }
    }
}

#[async_trait::async_trait]
impl ContextSource for GeneratedSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn gather(&self) -> Result<String> {
        (self.generator)()
    }
}

/// Contents of a file on disk, read at gather time.
pub struct FileSource {
    name: String,
    path: PathBuf,
}

impl FileSource {
    /// Creates a source reading from `path` on every gather.
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }
}

#[async_trait::async_trait]
impl ContextSource for FileSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn gather(&self) -> Result<String> {
        tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| Error::Context {
                source_name: self.name.clone(),
                reason: format!("read {}: {e}", self.path.display()),
            })
    }
}

/// Body of an HTTP GET, fetched at gather time.
pub struct RemoteSource {
    name: String,
    url: String,
    client: reqwest::Client,
}

impl RemoteSource {
    /// Creates a source fetching `url` with a 10 second timeout.
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self {
            name: name.into(),
            url: url.into(),
            client,
        }
    }
}

#[async_trait::async_trait]
impl ContextSource for RemoteSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn gather(&self) -> Result<String> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| Error::Context {
                source_name: self.name.clone(),
                reason: format!("request failed: {e}"),
            })?;
        if !response.status().is_success() {
            return Err(Error::Context {
                source_name: self.name.clone(),
                reason: format!("unexpected status {}", response.status()),
            });
        }
        response.text().await.map_err(|e| Error::Context {
            source_name: self.name.clone(),
            reason: format!("body read failed: {e}"),
        })
    }
}

/// Shared topic-keyed memory, appendable from anywhere.
#[derive(Default)]
pub struct MemoryStore {
    entries: DashMap<String, Vec<String>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry under `topic`.
    pub fn remember(&self, topic: impl Into<String>, entry: impl Into<String>) {
        self.entries.entry(topic.into()).or_default().push(entry.into());
    }

    /// All entries recorded under `topic`, oldest first.
    #[must_use]
    pub fn recall(&self, topic: &str) -> Vec<String> {
        self.entries
            .get(topic)
            .map(|entries| entries.value().clone())
            .unwrap_or_default()
    }

    /// Number of topics with at least one entry.
    #[must_use]
    pub fn topics(&self) -> usize {
        self.entries.len()
    }
}

/// One topic of a shared [`MemoryStore`].
pub struct MemorySource {
    name: String,
    store: Arc<MemoryStore>,
    topic: String,
}

impl MemorySource {
    /// Creates a source recalling `topic` from `store`.
    pub fn new(
        name: impl Into<String>,
        store: Arc<MemoryStore>,
        topic: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            store,
            topic: topic.into(),
        }
    }
}

#[async_trait::async_trait]
impl ContextSource for MemorySource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn gather(&self) -> Result<String> {
        Ok(self.store.recall(&self.topic).join("\n"))
    }
}

/// Gathers all sources in registration order into one labeled block.
///
/// A failing or empty source contributes nothing; failures are logged and
/// swallowed so one bad source cannot take down a run.
pub async fn gather_context(sources: &[Arc<dyn ContextSource>]) -> String {
    let mut parts = Vec::new();
    for source in sources {
        match source.gather().await {
            Ok(text) if !text.trim().is_empty() => {
                parts.push(format!("[{}]\n{}", source.name(), text.trim_end()));
            }
            Ok(_) => {}
            Err(e) => {
                warn!(source = source.name(), error = %e, "context source failed, skipping");
            }
        }
    }
    parts.join("\n\n")
}
