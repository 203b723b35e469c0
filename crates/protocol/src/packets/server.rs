//! Server -> Client packet parsing and building.
//!
//! Decoding is strict: a frame that ends early or carries an unterminated
//! string is an error, while an opcode this crate does not know decodes to
//! `Ok(None)` so newer servers can add messages freely.

use bytes::Bytes;

use super::ServerOpcode;
use crate::{BinaryReader, BinaryWriter, Color, Permutation, ProtocolError};

const FLAG_SPIKED: u8 = 0x01;
const FLAG_COLOR: u8 = 0x02;
const FLAG_SKIN: u8 = 0x04;
const FLAG_NAME: u8 = 0x08;
const FLAG_EJECTED: u8 = 0x20;
const FLAG_PELLET: u8 = 0x80;

/// Longest kill or delete list a world update can carry.
const MAX_LIST: usize = u16::MAX as usize;

/// Kind bits of an upsert's flag byte.
///
/// The color/skin/name presence bits are not stored here; they are implied
/// by the corresponding `Option` fields of [`CellUpdate`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CellFlags {
    pub spiked: bool,
    pub ejected: bool,
    pub pellet: bool,
}

impl CellFlags {
    fn from_bits(bits: u8) -> Self {
        Self {
            spiked: bits & FLAG_SPIKED != 0,
            ejected: bits & FLAG_EJECTED != 0,
            pellet: bits & FLAG_PELLET != 0,
        }
    }

    fn bits(&self) -> u8 {
        let mut flags = 0u8;
        if self.spiked {
            flags |= FLAG_SPIKED;
        }
        if self.ejected {
            flags |= FLAG_EJECTED;
        }
        if self.pellet {
            flags |= FLAG_PELLET;
        }
        flags
    }
}

/// One upsert record of a world update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellUpdate {
    pub id: u32,
    pub x: i16,
    pub y: i16,
    pub r: u16,
    pub flags: CellFlags,
    pub color: Option<Color>,
    pub skin: Option<String>,
    pub name: Option<String>,
    pub clan: String,
    pub subscriber: bool,
}

impl CellUpdate {
    /// A record carrying only position and size.
    pub fn at(id: u32, x: i16, y: i16, r: u16) -> Self {
        Self {
            id,
            x,
            y,
            r,
            flags: CellFlags::default(),
            color: None,
            skin: None,
            name: None,
            clan: String::new(),
            subscriber: false,
        }
    }

    fn read(id: u32, reader: &mut BinaryReader) -> Result<Self, ProtocolError> {
        let x = reader.get_i16()?;
        let y = reader.get_i16()?;
        let r = reader.get_u16()?;
        let bits = reader.get_u8()?;

        let color = if bits & FLAG_COLOR != 0 {
            Some(Color::new(reader.get_u8()?, reader.get_u8()?, reader.get_u8()?))
        } else {
            None
        };
        let skin = if bits & FLAG_SKIN != 0 {
            Some(reader.get_string_utf8()?)
        } else {
            None
        };
        let name = if bits & FLAG_NAME != 0 {
            Some(reader.get_string_utf8()?)
        } else {
            None
        };
        let clan = reader.get_string_utf8()?;
        let subscriber = reader.get_u8()? != 0;

        Ok(Self {
            id,
            x,
            y,
            r,
            flags: CellFlags::from_bits(bits),
            color,
            skin,
            name,
            clan,
            subscriber,
        })
    }

    fn write(&self, w: &mut BinaryWriter) {
        w.put_u32(self.id);
        w.put_i16(self.x);
        w.put_i16(self.y);
        w.put_u16(self.r);

        let mut bits = self.flags.bits();
        if self.color.is_some() {
            bits |= FLAG_COLOR;
        }
        if self.skin.is_some() {
            bits |= FLAG_SKIN;
        }
        if self.name.is_some() {
            bits |= FLAG_NAME;
        }
        w.put_u8(bits);

        if let Some(color) = self.color {
            w.put_u8(color.r);
            w.put_u8(color.g);
            w.put_u8(color.b);
        }
        if let Some(ref skin) = self.skin {
            w.put_string_utf8(skin);
        }
        if let Some(ref name) = self.name {
            w.put_string_utf8(name);
        }
        w.put_string_utf8(&self.clan);
        w.put_u8(self.subscriber as u8);
    }
}

/// Kill record: `killed` was eaten by `killer`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Kill {
    pub killer: u32,
    pub killed: u32,
}

/// World update (0x10).
///
/// Layout:
/// - `u16` kill count, then `[u32 killer, u32 killed]` per kill
/// - upserts, each led by a `u32` id; an id of 0 ends the run
/// - `u16` delete count, then `u32` ids
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorldUpdate {
    pub kills: Vec<Kill>,
    pub upserts: Vec<CellUpdate>,
    pub deletes: Vec<u32>,
}

impl WorldUpdate {
    fn read(reader: &mut BinaryReader) -> Result<Self, ProtocolError> {
        let kill_count = reader.get_u16()?;
        let mut kills = Vec::with_capacity(kill_count as usize);
        for _ in 0..kill_count {
            let killer = reader.get_u32()?;
            let killed = reader.get_u32()?;
            kills.push(Kill { killer, killed });
        }

        let mut upserts = Vec::new();
        loop {
            let id = reader.get_u32()?;
            if id == 0 {
                break;
            }
            upserts.push(CellUpdate::read(id, reader)?);
        }

        let delete_count = reader.get_u16()?;
        let mut deletes = Vec::with_capacity(delete_count as usize);
        for _ in 0..delete_count {
            deletes.push(reader.get_u32()?);
        }

        Ok(Self {
            kills,
            upserts,
            deletes,
        })
    }

    /// Kill and delete counts are u16 on the wire; entries past
    /// `u16::MAX` are not written.
    fn write(&self, w: &mut BinaryWriter) {
        let kills = &self.kills[..self.kills.len().min(MAX_LIST)];
        w.put_u16(kills.len() as u16);
        for kill in kills {
            w.put_u32(kill.killer);
            w.put_u32(kill.killed);
        }
        for cell in &self.upserts {
            cell.write(w);
        }
        w.put_u32(0);
        let deletes = &self.deletes[..self.deletes.len().min(MAX_LIST)];
        w.put_u16(deletes.len() as u16);
        for &id in deletes {
            w.put_u32(id);
        }
    }
}

/// One leaderboard row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaderboardEntry {
    pub name: String,
    pub subscriber: bool,
    pub place: u32,
    /// This row belongs to the receiving connection.
    pub me: bool,
}

/// World border rectangle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Border {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
}

impl Border {
    pub fn center(&self) -> (f64, f64) {
        ((self.left + self.right) / 2.0, (self.top + self.bottom) / 2.0)
    }
}

/// Chat line (0x63).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub flags: u8,
    pub color: Color,
    pub name: String,
    pub text: String,
}

/// Parsed server packet.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    /// World update (0x10).
    WorldUpdate(WorldUpdate),
    /// Camera override (0x11), used while spectating.
    Camera { x: f32, y: f32, scale: f32 },
    /// Clear all cells (0x12); a full respawn signal.
    ClearAll,
    /// Clear owned cells (0x14).
    ClearOwned,
    /// New owned cell (0x20).
    OwnedCell(u32),
    /// Leaderboard (0x31), ordered best first.
    Leaderboard(Vec<LeaderboardEntry>),
    /// World border (0x40).
    Border(Border),
    /// Chat message (0x63).
    Chat(ChatMessage),
    /// Server stats (0xFE) as a raw JSON string.
    ServerStats(String),
}

impl ServerMessage {
    /// Logical opcode of this message.
    pub fn opcode(&self) -> ServerOpcode {
        match self {
            Self::WorldUpdate(_) => ServerOpcode::WorldUpdate,
            Self::Camera { .. } => ServerOpcode::Camera,
            Self::ClearAll => ServerOpcode::ClearAll,
            Self::ClearOwned => ServerOpcode::ClearOwned,
            Self::OwnedCell(_) => ServerOpcode::OwnedCell,
            Self::Leaderboard(_) => ServerOpcode::Leaderboard,
            Self::Border(_) => ServerOpcode::Border,
            Self::Chat(_) => ServerOpcode::Chat,
            Self::ServerStats(_) => ServerOpcode::ServerStats,
        }
    }

    /// Parse one frame.
    ///
    /// Returns `Ok(None)` for opcodes this client does not consume.
    pub fn decode(frame: &[u8], perm: &Permutation) -> Result<Option<Self>, ProtocolError> {
        let mut reader = BinaryReader::new(Bytes::copy_from_slice(frame));
        let opcode = perm.unshuffle(reader.get_u8()?);
        let Ok(opcode) = ServerOpcode::try_from(opcode) else {
            return Ok(None);
        };

        let message = match opcode {
            ServerOpcode::WorldUpdate => Self::WorldUpdate(WorldUpdate::read(&mut reader)?),
            ServerOpcode::Camera => Self::Camera {
                x: reader.get_f32()?,
                y: reader.get_f32()?,
                scale: reader.get_f32()?,
            },
            ServerOpcode::ClearAll => Self::ClearAll,
            ServerOpcode::ClearOwned => Self::ClearOwned,
            ServerOpcode::OwnedCell => Self::OwnedCell(reader.get_u32()?),
            ServerOpcode::Leaderboard => {
                let count = reader.get_u32()?;
                // Each row takes at least 10 bytes; don't trust the count for
                // the allocation.
                let mut entries = Vec::with_capacity((count as usize).min(reader.remaining() / 10));
                for _ in 0..count {
                    let me = reader.get_u32()? != 0;
                    let name = reader.get_string_utf8()?;
                    let place = reader.get_u32()?;
                    let subscriber = reader.get_u8()? != 0;
                    entries.push(LeaderboardEntry {
                        name,
                        subscriber,
                        place,
                        me,
                    });
                }
                Self::Leaderboard(entries)
            }
            ServerOpcode::Border => Self::Border(Border {
                left: reader.get_f64()?,
                top: reader.get_f64()?,
                right: reader.get_f64()?,
                bottom: reader.get_f64()?,
            }),
            ServerOpcode::Chat => {
                let flags = reader.get_u8()?;
                let color = Color::new(reader.get_u8()?, reader.get_u8()?, reader.get_u8()?);
                let name = reader.get_string_utf8()?;
                let text = reader.get_string_utf8()?;
                Self::Chat(ChatMessage {
                    flags,
                    color,
                    name,
                    text,
                })
            }
            ServerOpcode::ServerStats => Self::ServerStats(reader.get_string_utf8()?),
        };

        Ok(Some(message))
    }

    /// Build the frame for this message.
    pub fn encode(&self, perm: &Permutation) -> Bytes {
        let mut w = BinaryWriter::new();
        w.put_u8(perm.shuffle(self.opcode() as u8));

        match self {
            Self::WorldUpdate(update) => update.write(&mut w),
            Self::Camera { x, y, scale } => {
                w.put_f32(*x);
                w.put_f32(*y);
                w.put_f32(*scale);
            }
            Self::ClearAll | Self::ClearOwned => {}
            Self::OwnedCell(id) => w.put_u32(*id),
            Self::Leaderboard(entries) => {
                w.put_u32(entries.len() as u32);
                for entry in entries {
                    w.put_u32(entry.me as u32);
                    w.put_string_utf8(&entry.name);
                    w.put_u32(entry.place);
                    w.put_u8(entry.subscriber as u8);
                }
            }
            Self::Border(border) => {
                w.put_f64(border.left);
                w.put_f64(border.top);
                w.put_f64(border.right);
                w.put_f64(border.bottom);
            }
            Self::Chat(chat) => {
                w.put_u8(chat.flags);
                w.put_u8(chat.color.r);
                w.put_u8(chat.color.g);
                w.put_u8(chat.color.b);
                w.put_string_utf8(&chat.name);
                w.put_string_utf8(&chat.text);
            }
            Self::ServerStats(json) => w.put_string_utf8(json),
        }

        w.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::seq::SliceRandom;
    use rand::SeedableRng;

    fn random_perm(seed: u64) -> Permutation {
        let mut table: Vec<u8> = (0..=255).collect();
        table.shuffle(&mut StdRng::seed_from_u64(seed));
        Permutation::from_table(&table).unwrap()
    }

    fn sample_update() -> WorldUpdate {
        WorldUpdate {
            kills: vec![Kill {
                killer: 3,
                killed: 4,
            }],
            upserts: vec![
                CellUpdate {
                    id: 9,
                    x: -1200,
                    y: 3400,
                    r: 142,
                    flags: CellFlags {
                        spiked: true,
                        ..CellFlags::default()
                    },
                    color: Some(Color::new(51, 255, 51)),
                    skin: Some("doge".into()),
                    name: Some("Bob".into()),
                    clan: "[XX]".into(),
                    subscriber: true,
                },
                CellUpdate::at(10, 0, 0, 10),
            ],
            deletes: vec![5, 6],
        }
    }

    #[test]
    fn test_world_update_survives_any_permutation() {
        let msg = ServerMessage::WorldUpdate(sample_update());
        for seed in 0..4 {
            let perm = random_perm(seed);
            let frame = msg.encode(&perm);
            assert_eq!(ServerMessage::decode(&frame, &perm).unwrap(), Some(msg.clone()));
        }
    }

    #[test]
    fn test_omitted_fields_stay_none() {
        let perm = Permutation::identity();
        let msg = ServerMessage::WorldUpdate(WorldUpdate {
            upserts: vec![CellUpdate::at(1, 5, 6, 7)],
            ..WorldUpdate::default()
        });
        let frame = msg.encode(&perm);
        // opcode, kills(2), id(4), x, y, r (6), flags, clan NUL, sub, terminator(4), deletes(2)
        assert_eq!(frame.len(), 1 + 2 + 4 + 6 + 1 + 1 + 1 + 4 + 2);

        let Some(ServerMessage::WorldUpdate(update)) = ServerMessage::decode(&frame, &perm).unwrap()
        else {
            panic!("expected world update");
        };
        let cell = &update.upserts[0];
        assert_eq!(cell.color, None);
        assert_eq!(cell.name, None);
        assert_eq!(cell.skin, None);
    }

    #[test]
    fn test_truncated_world_update_fails() {
        let perm = Permutation::identity();
        let frame = ServerMessage::WorldUpdate(sample_update()).encode(&perm);
        for cut in 1..frame.len() {
            assert!(
                ServerMessage::decode(&frame[..cut], &perm).is_err(),
                "cut at {cut} decoded"
            );
        }
    }

    #[test]
    fn test_unknown_opcode_is_ignored() {
        let perm = random_perm(7);
        let frame = [perm.shuffle(0x99), 1, 2, 3];
        assert_eq!(ServerMessage::decode(&frame, &perm).unwrap(), None);
        assert!(matches!(
            ServerMessage::decode(&[], &perm),
            Err(ProtocolError::UnexpectedEof)
        ));
    }

    #[test]
    fn test_small_messages() {
        let perm = random_perm(3);
        let messages = [
            ServerMessage::Camera {
                x: 1.5,
                y: -2.0,
                scale: 0.25,
            },
            ServerMessage::ClearAll,
            ServerMessage::ClearOwned,
            ServerMessage::OwnedCell(77),
            ServerMessage::Leaderboard(vec![LeaderboardEntry {
                name: "a".into(),
                subscriber: false,
                place: 1,
                me: true,
            }]),
            ServerMessage::Border(Border {
                left: -7071.0,
                top: -7071.0,
                right: 7071.0,
                bottom: 7071.0,
            }),
            ServerMessage::Chat(ChatMessage {
                flags: 0x80,
                color: Color::new(1, 2, 3),
                name: "SERVER".into(),
                text: "hi".into(),
            }),
            ServerMessage::ServerStats("{\"name\":\"x\"}".into()),
        ];
        for msg in messages {
            let frame = msg.encode(&perm);
            assert_eq!(frame[0], perm.shuffle(msg.opcode() as u8));
            assert_eq!(ServerMessage::decode(&frame, &perm).unwrap(), Some(msg));
        }
    }

    #[test]
    fn test_border_ignores_trailing_bytes() {
        let perm = Permutation::identity();
        let mut w = BinaryWriter::new();
        w.put_u8(0x40);
        for v in [0.0, 0.0, 100.0, 50.0] {
            w.put_f64(v);
        }
        w.put_u32(0);
        w.put_string_utf8("server");
        let msg = ServerMessage::decode(w.as_slice(), &perm).unwrap();
        let Some(ServerMessage::Border(border)) = msg else {
            panic!("expected border");
        };
        assert_eq!(border.right, 100.0);
        assert_eq!(border.center(), (50.0, 25.0));
    }

    #[test]
    fn test_oversized_delete_list_is_capped() {
        let perm = Permutation::identity();
        let update = ServerMessage::WorldUpdate(WorldUpdate {
            kills: Vec::new(),
            upserts: Vec::new(),
            deletes: (0..70_000).collect(),
        });
        let frame = update.encode(&perm);
        let Some(ServerMessage::WorldUpdate(decoded)) = ServerMessage::decode(&frame, &perm).unwrap()
        else {
            panic!("expected world update");
        };
        assert_eq!(decoded.deletes.len(), u16::MAX as usize);
        assert_eq!(decoded.deletes.last(), Some(&(u16::MAX as u32 - 1)));
    }
}
