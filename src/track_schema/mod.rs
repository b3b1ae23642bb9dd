/*
    fluxforge
    https://github.com/dbalsom/fluxforge

    Copyright 2025 Daniel Balsom

    Permission is hereby granted, free of charge, to any person obtaining a
    copy of this software and associated documentation files (the “Software”),
    to deal in the Software without restriction, including without limitation
    the rights to use, copy, modify, merge, publish, distribute, sublicense,
    and/or sell copies of the Software, and to permit persons to whom the
    Software is furnished to do so, subject to the following conditions:

    The above copyright notice and this permission notice shall be included in
    all copies or substantial portions of the Software.

    THE SOFTWARE IS PROVIDED “AS IS”, WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
    IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
    FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
    AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
    LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING
    FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER
    DEALINGS IN THE SOFTWARE.

    --------------------------------------------------------------------------
*/

//! Sector-level track schemas.
//!
//! A schema frames sectors inside a bitcell stream: the IBM System 34 style
//! layout used by PC, Atari ST and BK-0010 media, and the Amiga trackdisk
//! layout with odd/even shuffled long words. Scanners in this module never
//! abort on a bad CRC or a stray byte - they log, resync and continue, as a
//! floppy controller would.

pub mod amiga;
pub mod ibm;

use std::collections::BTreeMap;

/// Sector framing in effect for a track, selected once per disk by sniffing
/// track 0 side 0.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TrackSchema {
    Ibm,
    Amiga,
}

impl TrackSchema {
    /// Count the sectors recoverable from a track under this schema.
    /// `track_no` addresses the Amiga numbering (`cyl * 2 + head`).
    pub fn count_sectors(&self, bitcells: &[u8], cylinder: u8, head: u8) -> usize {
        match self {
            TrackSchema::Ibm => ibm::count_sectors(bitcells, cylinder, head),
            TrackSchema::Amiga => amiga::count_sectors(bitcells, amiga::track_number(cylinder, head)),
        }
    }

    /// Extract every recoverable sector, keyed by 0-based sector number.
    pub fn read_sectors(&self, bitcells: &[u8], cylinder: u8, head: u8) -> BTreeMap<u8, Vec<u8>> {
        match self {
            TrackSchema::Ibm => ibm::read_sectors(bitcells, cylinder, head),
            TrackSchema::Amiga => amiga::read_sectors(bitcells, amiga::track_number(cylinder, head)),
        }
    }

    /// Determine which framing a track carries by checking which schema
    /// recovers at least one sector. Used on track 0 side 0 to pick the
    /// verification mode for a whole disk.
    pub fn sniff(bitcells: &[u8]) -> Option<TrackSchema> {
        if ibm::count_sectors(bitcells, 0, 0) >= 1 {
            return Some(TrackSchema::Ibm);
        }
        if amiga::count_sectors(bitcells, 0) >= 1 {
            return Some(TrackSchema::Amiga);
        }
        None
    }
}
