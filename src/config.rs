//! Configuration of the Reader and the Listener.
//!
//! Both configurations arrive as JSON property bags from their host (the
//! component manifest for the Reader, the customizer properties for the
//! Listener). Missing keys take the defaults from [`crate::constants`].

use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::constants::{
    EXTENSION_BROADCAST_DELAYS, GIVE_UP_DELAY, INSERTION_DEBOUNCE, MAX_DISCOVERY_DEPTH,
    REQUEST_SOURCE_TAG, RETRY_DELAYS, SNIPPET_BROADCAST_DELAYS,
};

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Timing and tagging of the Reader's request path.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct ReaderConfig {
    /// Delays after the first request at which it is sent again. One
    /// re-send per entry; the defaults give two. Must not be empty.
    pub retry_delays_ms: Vec<u64>,
    /// Delay after the first request at which the Reader gives up.
    pub give_up_after_ms: u64,
    /// Tag placed in the `source` field of requests.
    pub source_tag: String,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            retry_delays_ms: RETRY_DELAYS.iter().copied().map(millis).collect(),
            give_up_after_ms: millis(GIVE_UP_DELAY),
            source_tag: REQUEST_SOURCE_TAG.to_string(),
        }
    }
}

impl ReaderConfig {
    /// Parse and validate a JSON property bag.
    pub fn from_json(raw: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(raw).context("Invalid reader configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate an already-decoded property bag.
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        let config: Self = serde_json::from_value(value).context("Invalid reader configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Check that at least one re-send is scheduled and that every re-send
    /// happens before the give-up check.
    pub fn validate(&self) -> Result<()> {
        if self.retry_delays_ms.is_empty() {
            bail!("retryDelaysMs must list at least one re-send delay");
        }
        if let Some(late) = self
            .retry_delays_ms
            .iter()
            .find(|delay| **delay >= self.give_up_after_ms)
        {
            bail!(
                "retry delay {late}ms must be shorter than giveUpAfterMs ({}ms)",
                self.give_up_after_ms
            );
        }
        if self.source_tag.is_empty() {
            bail!("sourceTag must not be empty");
        }
        Ok(())
    }

    /// Re-send delays as durations.
    pub fn retry_delays(&self) -> impl Iterator<Item = Duration> + '_ {
        self.retry_delays_ms.iter().copied().map(Duration::from_millis)
    }

    /// Give-up delay as a duration.
    pub fn give_up_after(&self) -> Duration {
        Duration::from_millis(self.give_up_after_ms)
    }
}

/// Which flavour of host-page listener is running.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ListenerProfile {
    /// Drop-in page script: one early broadcast to direct frames only.
    Snippet,
    /// Page-customizer extension: repeated broadcasts, nested discovery,
    /// visibility and insertion triggers.
    #[default]
    Extension,
}

/// Configuration of the host-page Listener.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct ListenerConfig {
    /// Emit verbose traffic logs.
    pub enable_logging: bool,
    /// Listener flavour.
    pub profile: ListenerProfile,
    /// Overrides the profile's load broadcast schedule.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub broadcast_delays_ms: Option<Vec<u64>>,
    /// Delay between frame insertion and the broadcast it triggers.
    pub insertion_debounce_ms: u64,
    /// Frame levels visited by nested discovery (extension profile).
    pub max_discovery_depth: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            enable_logging: true,
            profile: ListenerProfile::default(),
            broadcast_delays_ms: None,
            insertion_debounce_ms: millis(INSERTION_DEBOUNCE),
            max_discovery_depth: MAX_DISCOVERY_DEPTH,
        }
    }
}

impl ListenerConfig {
    /// Defaults of the drop-in page script.
    pub fn snippet() -> Self {
        Self {
            profile: ListenerProfile::Snippet,
            ..Self::default()
        }
    }

    /// Parse and validate a JSON property bag.
    pub fn from_json(raw: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(raw).context("Invalid listener configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate an already-decoded property bag.
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        let config: Self =
            serde_json::from_value(value).context("Invalid listener configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Check the discovery bound.
    pub fn validate(&self) -> Result<()> {
        if self.max_discovery_depth == 0 {
            bail!("maxDiscoveryDepth must be at least 1");
        }
        if self.max_discovery_depth > MAX_DISCOVERY_DEPTH {
            bail!(
                "maxDiscoveryDepth {} exceeds the limit of {MAX_DISCOVERY_DEPTH}",
                self.max_discovery_depth
            );
        }
        Ok(())
    }

    /// Broadcast schedule after load.
    pub fn broadcast_delays(&self) -> Vec<Duration> {
        match (&self.broadcast_delays_ms, self.profile) {
            (Some(custom), _) => custom.iter().copied().map(Duration::from_millis).collect(),
            (None, ListenerProfile::Snippet) => SNIPPET_BROADCAST_DELAYS.to_vec(),
            (None, ListenerProfile::Extension) => EXTENSION_BROADCAST_DELAYS.to_vec(),
        }
    }

    /// Insertion debounce as a duration.
    pub fn insertion_debounce(&self) -> Duration {
        Duration::from_millis(self.insertion_debounce_ms)
    }

    /// Frame levels visited by discovery. The page script only reaches
    /// frames embedded directly in the page.
    pub fn discovery_depth(&self) -> usize {
        match self.profile {
            ListenerProfile::Snippet => 1,
            ListenerProfile::Extension => self.max_discovery_depth,
        }
    }

    /// Whether hidden→visible transitions trigger a broadcast.
    pub fn rebroadcasts_on_visible(&self) -> bool {
        self.profile == ListenerProfile::Extension
    }

    /// Whether inserted frames trigger a broadcast.
    pub fn watches_insertions(&self) -> bool {
        self.profile == ListenerProfile::Extension
    }
}
