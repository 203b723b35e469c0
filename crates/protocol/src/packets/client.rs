//! Client -> Server packet building and parsing.

use bytes::Bytes;

use super::ClientOpcode;
use crate::{BinaryReader, BinaryWriter, Permutation, ProtocolError};

/// Client packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    /// Spawn (0x00) with nickname.
    Spawn { name: String },
    /// Movement target in world coordinates (0x10).
    Move { x: i32, y: i32 },
    /// Split (0x11).
    Split,
    /// Feed toggle (0x12).
    FeedToggle,
    /// Eject (0x15).
    Eject,
    /// Chat message (0x63).
    Chat { text: String },
    /// Heartbeat (0xFE); the server answers with its stats.
    Ping,
}

impl ClientMessage {
    /// Logical opcode of this message.
    pub fn opcode(&self) -> ClientOpcode {
        match self {
            Self::Spawn { .. } => ClientOpcode::Spawn,
            Self::Move { .. } => ClientOpcode::Move,
            Self::Split => ClientOpcode::Split,
            Self::FeedToggle => ClientOpcode::FeedToggle,
            Self::Eject => ClientOpcode::Eject,
            Self::Chat { .. } => ClientOpcode::Chat,
            Self::Ping => ClientOpcode::Ping,
        }
    }

    /// Build the frame for this message.
    pub fn encode(&self, perm: &Permutation) -> Bytes {
        let mut w = match self {
            Self::Move { .. } => BinaryWriter::with_capacity(9),
            Self::Spawn { .. } | Self::Chat { .. } => BinaryWriter::new(),
            _ => BinaryWriter::with_capacity(1),
        };
        w.put_u8(perm.shuffle(self.opcode() as u8));

        match self {
            Self::Spawn { name } => w.put_string_utf8(name),
            Self::Move { x, y } => {
                w.put_i32(*x);
                w.put_i32(*y);
            }
            Self::Chat { text } => {
                // Flags (0 = no reserved bytes)
                w.put_u8(0);
                w.put_string_utf8(text);
            }
            Self::Split | Self::FeedToggle | Self::Eject | Self::Ping => {}
        }

        w.finish()
    }

    /// Parse a client packet. Used by test servers.
    pub fn decode(frame: &[u8], perm: &Permutation) -> Result<Self, ProtocolError> {
        let mut reader = BinaryReader::new(Bytes::copy_from_slice(frame));
        let raw = perm.unshuffle(reader.get_u8()?);
        let opcode = ClientOpcode::try_from(raw).map_err(ProtocolError::InvalidOpcode)?;

        Ok(match opcode {
            ClientOpcode::Spawn => Self::Spawn {
                name: reader.get_string_utf8()?,
            },
            ClientOpcode::Move => Self::Move {
                x: reader.get_i32()?,
                y: reader.get_i32()?,
            },
            ClientOpcode::Split => Self::Split,
            ClientOpcode::FeedToggle => Self::FeedToggle,
            ClientOpcode::Eject => Self::Eject,
            ClientOpcode::Chat => {
                let _flags = reader.get_u8()?;
                Self::Chat {
                    text: reader.get_string_utf8()?,
                }
            }
            ClientOpcode::Ping => Self::Ping,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_move_layout() {
        let perm = Permutation::identity();
        let frame = ClientMessage::Move { x: -5, y: 300 }.encode(&perm);
        assert_eq!(frame.len(), 9);
        assert_eq!(frame[0], 0x10);
        assert_eq!(&frame[1..5], &(-5i32).to_le_bytes());
        assert_eq!(&frame[5..9], &300i32.to_le_bytes());
    }

    #[test]
    fn test_single_byte_commands() {
        let mut table: Vec<u8> = (0..=255).collect();
        table.reverse();
        let perm = Permutation::from_table(&table).unwrap();
        for msg in [
            ClientMessage::Split,
            ClientMessage::FeedToggle,
            ClientMessage::Eject,
            ClientMessage::Ping,
        ] {
            let frame = msg.encode(&perm);
            assert_eq!(frame.len(), 1);
            assert_eq!(frame[0], 255 - msg.opcode() as u8);
            assert_eq!(ClientMessage::decode(&frame, &perm).unwrap(), msg);
        }
    }

    #[test]
    fn test_chat_and_spawn() {
        let perm = Permutation::identity();
        for msg in [
            ClientMessage::Chat { text: "gg".into() },
            ClientMessage::Spawn { name: "Bob".into() },
        ] {
            let frame = msg.encode(&perm);
            assert_eq!(ClientMessage::decode(&frame, &perm).unwrap(), msg);
        }
    }

    #[test]
    fn test_unknown_client_opcode() {
        let perm = Permutation::identity();
        assert_eq!(
            ClientMessage::decode(&[0x42], &perm),
            Err(ProtocolError::InvalidOpcode(0x42))
        );
    }
}
