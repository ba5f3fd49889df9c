//! Board Squares
//!
//! Squares are indices into a rank-major 8×8 arena: `a1 = 0`, `h1 = 7`,
//! `a8 = 56`, `h8 = 63`. Algebraic notation is the wire representation.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Number of squares on the board.
pub const BOARD_SQUARES: usize = 64;

/// A single board square.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Square(u8);

impl Square {
    /// Create from an arena index (0..64).
    pub const fn from_index(index: u8) -> Option<Self> {
        if (index as usize) < BOARD_SQUARES {
            Some(Self(index))
        } else {
            None
        }
    }

    /// Create from zero-based file and rank.
    pub const fn new(file: u8, rank: u8) -> Option<Self> {
        if file < 8 && rank < 8 {
            Some(Self(rank * 8 + file))
        } else {
            None
        }
    }

    /// Arena index.
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Zero-based file (`a` = 0).
    #[inline]
    pub const fn file(self) -> u8 {
        self.0 % 8
    }

    /// Zero-based rank (`1` = 0).
    #[inline]
    pub const fn rank(self) -> u8 {
        self.0 / 8
    }

    /// Step by a file/rank delta, `None` when leaving the board.
    pub fn offset(self, file_delta: i8, rank_delta: i8) -> Option<Self> {
        let file = self.file() as i8 + file_delta;
        let rank = self.rank() as i8 + rank_delta;
        if (0..8).contains(&file) && (0..8).contains(&rank) {
            Self::new(file as u8, rank as u8)
        } else {
            None
        }
    }

    /// Light squares have an odd file + rank sum.
    pub const fn is_light(self) -> bool {
        (self.file() + self.rank()) % 2 == 1
    }

    /// Iterate every square in arena order.
    pub fn all() -> impl Iterator<Item = Square> {
        (0..BOARD_SQUARES as u8).map(Square)
    }

    /// Parse algebraic notation (`"e4"`).
    pub fn parse(s: &str) -> Option<Self> {
        let bytes = s.as_bytes();
        if bytes.len() != 2 {
            return None;
        }
        let file = bytes[0].checked_sub(b'a')?;
        let rank = bytes[1].checked_sub(b'1')?;
        Self::new(file, rank)
    }
}

impl fmt::Display for Square {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", (b'a' + self.file()) as char, self.rank() + 1)
    }
}

/// Error for unparseable square names.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid square: {0:?}")]
pub struct InvalidSquare(pub String);

impl FromStr for Square {
    type Err = InvalidSquare;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Square::parse(s).ok_or_else(|| InvalidSquare(s.to_string()))
    }
}

impl Serialize for Square {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Square {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Test shorthand. Panics on malformed input.
#[cfg(test)]
pub fn sq(s: &str) -> Square {
    Square::parse(s).unwrap_or_else(|| panic!("bad square {s}"))
}
