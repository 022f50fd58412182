//! Configuration system.
//!
//! Loads agent configuration from JSON strings/files (file IO left to app).
//! Every field has a default so a partial JSON document is enough.

use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::{coords::MapGeometry, net::ChunkRegion};

/// Root configuration for one agent session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Worker type announced in the handshake.
    pub worker_type: String,
    /// Worker/session identity.
    pub worker_id: String,
    pub host: String,
    pub port: u16,
    /// Discovery link (`scheme://host:port[/...]`); wins over host/port.
    pub link: Option<String>,
    /// Connection attempts before giving up.
    pub network_retries: u32,
    /// Fixed delay between connection attempts.
    pub retry_delay_ms: u64,
    pub tick_hz: u32,
    pub starting_chunk_min_x: Option<i32>,
    pub starting_chunk_min_z: Option<i32>,
    pub starting_chunk_size_x: Option<i32>,
    pub starting_chunk_size_z: Option<i32>,
    pub behavior: BehaviorConfig,
    pub map: MapGeometry,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            worker_type: "AgentBotClient".to_string(),
            worker_id: "agent-0".to_string(),
            host: "127.0.0.1".to_string(),
            port: 7777,
            link: None,
            network_retries: 3,
            retry_delay_ms: 1500,
            tick_hz: 30,
            starting_chunk_min_x: None,
            starting_chunk_min_z: None,
            starting_chunk_size_x: None,
            starting_chunk_size_z: None,
            behavior: BehaviorConfig::default(),
            map: MapGeometry::default(),
        }
    }
}

/// Tunables of the agent's wandering behaviour and liveness tracking.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BehaviorConfig {
    pub ping_period_ms: u64,
    pub direction_change_period_ms: u64,
    pub status_period_ms: u64,
    /// World units per second.
    pub velocity: f32,
    pub direction_change_chance_percent: u32,
    /// Edge length of the agent's square footprint.
    pub character_size: f32,
    /// Squared distance the host position may drift before it is republished.
    pub host_position_update_distance: f32,
    pub latency_smoothing: f64,
    pub desync_smoothing: f64,
}

impl Default for BehaviorConfig {
    fn default() -> Self {
        Self {
            ping_period_ms: 999,
            direction_change_period_ms: 250,
            status_period_ms: 2449,
            velocity: 1.5,
            direction_change_chance_percent: 10,
            character_size: 0.9,
            host_position_update_distance: 1.0,
            latency_smoothing: 0.5,
            desync_smoothing: 0.05,
        }
    }
}

impl AgentConfig {
    /// Parses and validates config from JSON.
    pub fn from_json_str(s: &str) -> anyhow::Result<Self> {
        let cfg: Self = serde_json::from_str(s).context("invalid config JSON")?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reads, parses and validates a JSON config file.
    pub fn from_json_file(path: &std::path::Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        Self::from_json_str(&raw).with_context(|| format!("parse config {}", path.display()))
    }

    /// Checks values that would break coordinate mapping later on.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.map.validate().context("invalid map geometry")
    }

    /// Tick period in whole milliseconds, as used for movement steps.
    pub fn tick_period_ms(&self) -> u64 {
        1000 / u64::from(self.tick_hz.max(1))
    }

    pub fn tick_period(&self) -> Duration {
        Duration::from_millis(self.tick_period_ms())
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Starting region override; only present when all four values are set.
    pub fn starting_region(&self) -> Option<ChunkRegion> {
        Some(ChunkRegion {
            min_x: self.starting_chunk_min_x?,
            min_z: self.starting_chunk_min_z?,
            size_x: self.starting_chunk_size_x?,
            size_z: self.starting_chunk_size_z?,
        })
    }

    /// Resolves the address to connect to.
    pub fn endpoint(&self) -> anyhow::Result<String> {
        match &self.link {
            Some(link) => parse_link(link),
            None => Ok(format!("{}:{}", self.host, self.port)),
        }
    }
}

/// Extracts `host:port` from a discovery link such as
/// `agent://sim.local:7777/deployment`.
pub fn parse_link(link: &str) -> anyhow::Result<String> {
    let rest = link
        .split_once("://")
        .map(|(_, rest)| rest)
        .with_context(|| format!("link {link:?} has no scheme"))?;
    let authority = rest.split(['/', '?']).next().unwrap_or_default();
    let (host, port) = authority
        .rsplit_once(':')
        .with_context(|| format!("link {link:?} has no port"))?;
    anyhow::ensure!(!host.is_empty(), "link {link:?} has no host");
    let port: u16 = port
        .parse()
        .with_context(|| format!("link {link:?} has an invalid port"))?;
    Ok(format!("{host}:{port}"))
}
