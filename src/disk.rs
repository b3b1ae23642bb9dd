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

    src/disk.rs

    The canonical in-memory disk model: a header describing geometry and
    media, and one bitcell buffer per side per cylinder.

*/

use std::fmt;
use std::fmt::{Display, Formatter};

use crate::{DataRate, DiskRpm, FloppyError, InterfaceMode, TrackEncoding};

/// Drive geometry and media description for a [`Disk`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiskHeader {
    pub cylinders: u8,
    /// 1 or 2.
    pub sides: u8,
    pub encoding: TrackEncoding,
    pub bit_rate: DataRate,
    pub rpm: DiskRpm,
    pub interface_mode: InterfaceMode,
    pub write_protect: bool,
}

impl Default for DiskHeader {
    fn default() -> Self {
        DiskHeader {
            cylinders: 80,
            sides: 2,
            encoding: TrackEncoding::IbmMfm,
            bit_rate: DataRate::Rate250Kbps,
            rpm: DiskRpm::Rpm300,
            interface_mode: InterfaceMode::GenericShugartDd,
            write_protect: false,
        }
    }
}

impl Display for DiskHeader {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(
            f,
            "{} cyls, {} sides, {}, {}, {}",
            self.cylinders, self.sides, self.encoding, self.bit_rate, self.rpm
        )
    }
}

/// The bitcell buffers of both sides of one cylinder, MSB-first packed.
/// A single sided disk leaves `side1` empty.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TrackData {
    pub side0: Vec<u8>,
    pub side1: Vec<u8>,
}

impl TrackData {
    pub fn side(&self, head: u8) -> &[u8] {
        match head {
            0 => &self.side0,
            _ => &self.side1,
        }
    }

    pub fn side_mut(&mut self, head: u8) -> &mut Vec<u8> {
        match head {
            0 => &mut self.side0,
            _ => &mut self.side1,
        }
    }
}

/// A decoded disk: header plus one [`TrackData`] per cylinder. The disk
/// exclusively owns its bitcell buffers; it is produced whole by a container
/// parser or an adapter read and consumed whole by the inverse operation.
#[derive(Clone, Debug, Default)]
pub struct Disk {
    pub header: DiskHeader,
    pub tracks: Vec<TrackData>,
}

impl Disk {
    pub fn new(header: DiskHeader) -> Disk {
        let tracks = (0..header.cylinders).map(|_| TrackData::default()).collect();
        Disk { header, tracks }
    }

    /// Borrow the bitcell buffer of one track side, if present.
    pub fn track(&self, cylinder: u8, head: u8) -> Result<&[u8], FloppyError> {
        if head >= self.header.sides {
            return Err(FloppyError::GeometryMismatch(format!(
                "head {} on a {} sided disk",
                head, self.header.sides
            )));
        }
        self.tracks
            .get(cylinder as usize)
            .map(|t| t.side(head))
            .ok_or_else(|| {
                FloppyError::GeometryMismatch(format!(
                    "cylinder {} beyond {} cylinder image",
                    cylinder, self.header.cylinders
                ))
            })
    }

    /// Store the bitcell buffer of one track side, growing the track vector
    /// if the cylinder is new.
    pub fn set_track(&mut self, cylinder: u8, head: u8, bitcells: Vec<u8>) {
        if self.tracks.len() <= cylinder as usize {
            self.tracks.resize_with(cylinder as usize + 1, TrackData::default);
            self.header.cylinders = self.tracks.len() as u8;
        }
        *self.tracks[cylinder as usize].side_mut(head) = bitcells;
        if head >= self.header.sides {
            self.header.sides = head + 1;
        }
    }
}
