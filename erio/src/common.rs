// Copyright (C) 2025 Category Labs, Inc.
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

//! Common types shared by channels, backends and configuration.

use erio_protocol::BufType;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Upper bound on buffers per channel.
pub const MAX_BUFFERS: usize = 128;

#[inline]
#[cold]
fn cold() {}

#[inline(always)]
pub(crate) fn likely(b: bool) -> bool {
    if !b {
        cold();
    }
    b
}

#[inline(always)]
pub(crate) fn unlikely(b: bool) -> bool {
    if b {
        cold();
    }
    b
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Process to device (TX).
    Send,
    /// Device to process (RX).
    Receive,
}

impl Direction {
    pub fn buf_type(self) -> BufType {
        match self {
            Direction::Send => BufType::Output,
            Direction::Receive => BufType::Input,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Send => "send",
            Direction::Receive => "receive",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Length field of a CHDR header: low 16 bits of the first native-endian word.
#[inline(always)]
pub(crate) fn chdr_length(payload: &[u8]) -> usize {
    match payload.first_chunk::<4>() {
        Some(word) => (u32::from_ne_bytes(*word) & 0xffff) as usize,
        None => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::plain(0x0000_0250u32, 0x250)]
    #[case::upper_bits_ignored(0x8001_0010u32, 0x10)]
    #[case::max(0xffff_ffffu32, 0xffff)]
    #[case::zero(0, 0)]
    fn test_chdr_length(#[case] word: u32, #[case] expected: usize) {
        let mut payload = word.to_ne_bytes().to_vec();
        payload.extend_from_slice(&[0xaa; 12]);
        assert_eq!(chdr_length(&payload), expected);
    }

    #[test]
    fn test_chdr_length_short_payload() {
        assert_eq!(chdr_length(&[0x50, 0x02]), 0);
    }

    #[rstest]
    #[case(Direction::Send, BufType::Output)]
    #[case(Direction::Receive, BufType::Input)]
    fn test_direction_buf_type(#[case] dir: Direction, #[case] expected: BufType) {
        assert_eq!(dir.buf_type(), expected);
    }
}
