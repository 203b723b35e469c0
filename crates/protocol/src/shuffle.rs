//! Per-connection opcode permutation.
//!
//! On connect the client sends [`PREAMBLE`]; the server answers with a
//! 256-byte table. From then on the leading opcode byte of every frame, in
//! both directions, travels through that table.

use crate::ProtocolError;

/// Version preamble sent by the client as its first frame.
pub const PREAMBLE: &[u8; 10] = b"SIG 0.0.1\0";

/// Bidirectional opcode substitution table.
///
/// `shuffle[logical] == wire` and `unshuffle[wire] == logical`.
#[derive(Clone, PartialEq, Eq)]
pub struct Permutation {
    shuffle: [u8; 256],
    unshuffle: [u8; 256],
}

impl Permutation {
    /// The identity table. Useful before a handshake and in tests.
    pub fn identity() -> Self {
        let mut shuffle = [0u8; 256];
        for (i, slot) in shuffle.iter_mut().enumerate() {
            *slot = i as u8;
        }
        Self {
            shuffle,
            unshuffle: shuffle,
        }
    }

    /// Build from the handshake frame sent by the server.
    ///
    /// The frame must be exactly 256 bytes and map every byte value to a
    /// distinct byte value.
    pub fn from_table(table: &[u8]) -> Result<Self, ProtocolError> {
        if table.len() != 256 {
            return Err(ProtocolError::InvalidPermutation(format!(
                "expected 256 bytes, got {}",
                table.len()
            )));
        }

        let mut shuffle = [0u8; 256];
        let mut unshuffle = [0u8; 256];
        let mut seen = [false; 256];
        for (logical, &wire) in table.iter().enumerate() {
            if seen[wire as usize] {
                return Err(ProtocolError::InvalidPermutation(format!(
                    "byte {wire:#04x} appears twice"
                )));
            }
            seen[wire as usize] = true;
            shuffle[logical] = wire;
            unshuffle[wire as usize] = logical as u8;
        }

        Ok(Self { shuffle, unshuffle })
    }

    /// Logical opcode -> wire byte.
    #[inline]
    pub fn shuffle(&self, opcode: u8) -> u8 {
        self.shuffle[opcode as usize]
    }

    /// Wire byte -> logical opcode.
    #[inline]
    pub fn unshuffle(&self, wire: u8) -> u8 {
        self.unshuffle[wire as usize]
    }

    /// The table as the server sends it.
    pub fn as_table(&self) -> &[u8; 256] {
        &self.shuffle
    }
}

impl Default for Permutation {
    fn default() -> Self {
        Self::identity()
    }
}

impl std::fmt::Debug for Permutation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Permutation")
            .field("shuffle[..8]", &&self.shuffle[..8])
            .finish_non_exhaustive()
    }
}
