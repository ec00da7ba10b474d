//! In-memory vulnerability advisory database.
//!
//! The whole feed is loaded once and shared. Concurrent callers hitting a cold
//! database wait on the same load; once the data is older than the staleness
//! window it keeps being served while a single background reload runs.

use super::version::in_range;
use crate::model::VulnerabilityDbEntry;
use crate::traits::{AdvisoryError, AdvisoryFeed};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

const NUGET_VULNERABILITY_INDEX: &str = "https://api.nuget.org/v3/vulnerabilities/index.json";

struct LoadedIndex {
    entries: HashMap<String, Vec<VulnerabilityDbEntry>>,
    /// Last successful load or failed background reload.
    checked_at: Instant,
}

/// Advisory lookups by package id and version.
pub struct AdvisoryDatabase<F> {
    feed: Arc<F>,
    state: Arc<RwLock<Option<LoadedIndex>>>,
    load_gate: Arc<Mutex<()>>,
    staleness: Duration,
}

impl<F> AdvisoryDatabase<F>
where
    F: AdvisoryFeed + 'static,
{
    pub fn new(feed: F, staleness: Duration) -> Self {
        Self {
            feed: Arc::new(feed),
            state: Arc::new(RwLock::new(None)),
            load_gate: Arc::new(Mutex::new(())),
            staleness,
        }
    }

    /// Makes sure advisories are available, loading them on first use.
    ///
    /// # Errors
    ///
    /// Returns the feed error when the database is cold and the load fails.
    pub async fn ensure_loaded(&self) -> Result<(), AdvisoryError> {
        {
            let state = self.state.read().await;
            if let Some(index) = state.as_ref() {
                if index.checked_at.elapsed() >= self.staleness {
                    self.spawn_reload();
                }
                return Ok(());
            }
        }

        let _gate = self.load_gate.lock().await;
        if self.state.read().await.is_some() {
            return Ok(());
        }
        Self::load(&self.feed, &self.state).await
    }

    fn spawn_reload(&self) {
        // A held gate means a load is already running.
        let Ok(gate) = self.load_gate.clone().try_lock_owned() else {
            return;
        };
        let feed = Arc::clone(&self.feed);
        let state = Arc::clone(&self.state);

        debug!("Advisory database is stale, reloading in background");
        tokio::spawn(async move {
            let _gate = gate;
            if let Err(e) = Self::load(&feed, &state).await {
                warn!(error = %e, "Background advisory reload failed");
                // keep serving the old index and retry after another window
                if let Some(index) = state.write().await.as_mut() {
                    index.checked_at = Instant::now();
                }
            }
        });
    }

    async fn load(feed: &F, state: &RwLock<Option<LoadedIndex>>) -> Result<(), AdvisoryError> {
        let start = Instant::now();
        let entries = feed.fetch_all().await?;

        info!(
            packages = entries.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Advisory database loaded"
        );

        *state.write().await = Some(LoadedIndex {
            entries,
            checked_at: Instant::now(),
        });
        Ok(())
    }

    /// Advisories whose affected range contains `version`.
    ///
    /// A failed load yields no advisories.
    pub async fn vulnerabilities_for(
        &self,
        package_id: &str,
        version: &str,
    ) -> Vec<VulnerabilityDbEntry> {
        if let Err(e) = self.ensure_loaded().await {
            warn!(error = %e, "Advisory database unavailable");
            return Vec::new();
        }

        let state = self.state.read().await;
        state
            .as_ref()
            .and_then(|index| index.entries.get(&package_id.to_lowercase()))
            .map(|entries| {
                entries
                    .iter()
                    .filter(|entry| in_range(version, &entry.affected_range))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub async fn is_loaded(&self) -> bool {
        self.state.read().await.is_some()
    }
}

// ============================================================================
// NuGet feed
// ============================================================================

#[derive(Debug, Deserialize)]
struct FeedPage {
    #[serde(rename = "@id")]
    id: String,
}

#[derive(Debug, Deserialize)]
struct FeedEntry {
    severity: u8,
    url: String,
    versions: String,
}

/// The nuget.org vulnerability resource: an index of pages, each mapping
/// lowercase package ids to advisories.
pub struct NugetAdvisoryFeed {
    client: reqwest::Client,
    index_url: String,
}

impl NugetAdvisoryFeed {
    pub fn new() -> Result<Self, AdvisoryError> {
        Self::with_index_url(NUGET_VULNERABILITY_INDEX)
    }

    pub fn with_index_url(index_url: impl Into<String>) -> Result<Self, AdvisoryError> {
        let client = reqwest::Client::builder()
            .user_agent(format!("cpm-analyzer/{}", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            index_url: index_url.into(),
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, AdvisoryError> {
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(AdvisoryError::Status {
                status: response.status().as_u16(),
                url: url.to_string(),
            });
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl AdvisoryFeed for NugetAdvisoryFeed {
    async fn fetch_all(&self) -> Result<HashMap<String, Vec<VulnerabilityDbEntry>>, AdvisoryError> {
        let pages: Vec<FeedPage> = self.get_json(&self.index_url).await?;
        let mut merged: HashMap<String, Vec<VulnerabilityDbEntry>> = HashMap::new();

        for page in pages {
            let entries: HashMap<String, Vec<FeedEntry>> = self.get_json(&page.id).await?;
            for (package, advisories) in entries {
                merged
                    .entry(package.to_lowercase())
                    .or_default()
                    .extend(advisories.into_iter().map(|a| VulnerabilityDbEntry {
                        severity_rank: a.severity,
                        advisory_url: a.url,
                        affected_range: a.versions,
                    }));
            }
        }

        Ok(merged)
    }
}
