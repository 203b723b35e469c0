//! Packet definitions for the wire protocol.
//!
//! This module contains both client->server and server->client message
//! types. Opcodes here are logical values; the [`Permutation`] of the
//! connection maps them to and from wire bytes.
//!
//! [`Permutation`]: crate::Permutation

mod client;
mod server;

pub use client::*;
pub use server::*;

/// Opcodes for client -> server packets.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientOpcode {
    /// Spawn with nickname.
    Spawn = 0x00,
    /// Movement target.
    Move = 0x10,
    /// Split.
    Split = 0x11,
    /// Toggle continuous feeding.
    FeedToggle = 0x12,
    /// Eject mass.
    Eject = 0x15,
    /// Chat message.
    Chat = 0x63,
    /// Heartbeat; answered with server stats.
    Ping = 0xFE,
}

impl TryFrom<u8> for ClientOpcode {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0x00 => Self::Spawn,
            0x10 => Self::Move,
            0x11 => Self::Split,
            0x12 => Self::FeedToggle,
            0x15 => Self::Eject,
            0x63 => Self::Chat,
            0xFE => Self::Ping,
            other => return Err(other),
        })
    }
}

/// Opcodes for server -> client packets.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerOpcode {
    /// World update (kills, upserts, deletes).
    WorldUpdate = 0x10,
    /// Camera override (spectating).
    Camera = 0x11,
    /// Clear all cells.
    ClearAll = 0x12,
    /// Clear owned cells.
    ClearOwned = 0x14,
    /// New owned cell.
    OwnedCell = 0x20,
    /// Leaderboard.
    Leaderboard = 0x31,
    /// World border.
    Border = 0x40,
    /// Chat message.
    Chat = 0x63,
    /// Server stats (heartbeat response).
    ServerStats = 0xFE,
}

impl TryFrom<u8> for ServerOpcode {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0x10 => Self::WorldUpdate,
            0x11 => Self::Camera,
            0x12 => Self::ClearAll,
            0x14 => Self::ClearOwned,
            0x20 => Self::OwnedCell,
            0x31 => Self::Leaderboard,
            0x40 => Self::Border,
            0x63 => Self::Chat,
            0xFE => Self::ServerStats,
            other => return Err(other),
        })
    }
}
