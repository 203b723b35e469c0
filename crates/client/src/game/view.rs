// Per-connection view state: camera, border, leaderboard, owned cells

use std::fmt;
use std::time::Duration;

use glam::Vec2;
use protocol::packets::{Border, LeaderboardEntry};
use serde::{Deserialize, Serialize};

use crate::camera::CameraState;
use crate::network::ConnectionState;

/// One of the three connection slots.
///
/// Ordering matters: merge tie-breaks favor the earlier view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewId {
    Primary,
    Secondary,
    Spectate,
}

impl ViewId {
    pub const ALL: [ViewId; 3] = [ViewId::Primary, ViewId::Secondary, ViewId::Spectate];
}

impl fmt::Display for ViewId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ViewId::Primary => "primary",
            ViewId::Secondary => "secondary",
            ViewId::Spectate => "spectate",
        })
    }
}

/// Server statistics JSON, answered to every heartbeat.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ServerStats {
    pub name: String,
    pub mode: String,
    pub uptime: u64,
    #[serde(rename = "playersTotal")]
    pub players_total: u32,
    #[serde(rename = "playersAlive")]
    pub players_alive: u32,
    #[serde(rename = "playersDead")]
    pub players_dead: u32,
    #[serde(rename = "playersSpect")]
    pub players_spect: u32,
    #[serde(rename = "botsTotal")]
    pub bots_total: u32,
    #[serde(rename = "playersLimit")]
    pub players_limit: u32,
}

#[derive(Debug, Clone)]
pub struct View {
    pub id: ViewId,
    pub camera: CameraState,
    pub border: Option<Border>,
    pub leaderboard: Vec<LeaderboardEntry>,
    /// Ids of cells this connection controls, in the order they were granted.
    pub owned: Vec<u32>,
    pub stats: Option<ServerStats>,
    /// Last stats payload, kept even when it fails to parse.
    pub raw_stats: Option<String>,
    /// Round-trip time of the last answered heartbeat; `None` is unknown.
    pub latency: Option<Duration>,
    pub connection: ConnectionState,
    /// World-space movement target sent on every input tick.
    pub target: Option<Vec2>,
}

impl View {
    pub fn new(id: ViewId) -> Self {
        Self {
            id,
            camera: CameraState::default(),
            border: None,
            leaderboard: Vec::new(),
            owned: Vec::new(),
            stats: None,
            raw_stats: None,
            latency: None,
            connection: ConnectionState::Closed,
            target: None,
        }
    }

    /// Receiving updates right now.
    #[inline]
    pub fn is_active(&self) -> bool {
        self.connection == ConnectionState::Open
    }

    pub fn owns(&self, id: u32) -> bool {
        self.owned.contains(&id)
    }

    pub(crate) fn disown(&mut self, id: u32) {
        self.owned.retain(|&owned| owned != id);
    }
}
