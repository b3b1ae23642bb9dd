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

    src/file_parsers/raw.rs

    Raw sector images (IMG/IMA): a bare sector stream whose geometry is
    deduced from the file size. Reading synthesizes MFM tracks; writing
    decodes them back to sectors.

*/

use crate::disk::{Disk, DiskHeader};
use crate::file_parsers::FormatCaps;
use crate::io::{Read, ReadSeek, ReadWriteSeek, Seek, SeekFrom, Write};
use crate::track_schema::ibm;
use crate::util::get_length;
use crate::{DataRate, DiskRpm, FloppyError, InterfaceMode, TrackEncoding, SECTOR_SIZE};

/// A raw-image geometry deduced from total sector count.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RawGeometry {
    pub cylinders: u8,
    pub heads: u8,
    pub sectors_per_track: u8,
    pub rate: DataRate,
    pub rpm: DiskRpm,
}

impl RawGeometry {
    const fn new(cylinders: u8, heads: u8, sectors_per_track: u8, rate: DataRate, rpm: DiskRpm) -> RawGeometry {
        RawGeometry {
            cylinders,
            heads,
            sectors_per_track,
            rate,
            rpm,
        }
    }

    pub fn interface_mode(&self) -> InterfaceMode {
        match self.rate {
            DataRate::Rate250Kbps => InterfaceMode::IbmPcDd,
            DataRate::Rate500Kbps => InterfaceMode::IbmPcHd,
            DataRate::Rate1000Kbps => InterfaceMode::IbmPcEd,
        }
    }
}

// Common raw image shapes by total sector count, ambiguity resolved in
// table order (737280 bytes reads as 40x2x9, not 80x1x9). The last three
// rows (80x2x{20,36,39}) lie outside the 8..=18 spt window the factoring
// fallback accepts; they are recognized by enumeration only.
#[rustfmt::skip]
const GEOMETRY_TABLE: [(usize, RawGeometry); 14] = [
    (320,  RawGeometry::new(40, 1,  8, DataRate::Rate250Kbps,  DiskRpm::Rpm300)),
    (360,  RawGeometry::new(40, 1,  9, DataRate::Rate250Kbps,  DiskRpm::Rpm300)),
    (400,  RawGeometry::new(40, 1, 10, DataRate::Rate250Kbps,  DiskRpm::Rpm300)),
    (640,  RawGeometry::new(40, 2,  8, DataRate::Rate250Kbps,  DiskRpm::Rpm300)),
    (720,  RawGeometry::new(40, 2,  9, DataRate::Rate250Kbps,  DiskRpm::Rpm300)),
    (1200, RawGeometry::new(40, 2, 15, DataRate::Rate500Kbps,  DiskRpm::Rpm360)),
    (1440, RawGeometry::new(80, 2,  9, DataRate::Rate250Kbps,  DiskRpm::Rpm300)),
    (1600, RawGeometry::new(80, 2, 10, DataRate::Rate250Kbps,  DiskRpm::Rpm300)),
    (2400, RawGeometry::new(80, 2, 15, DataRate::Rate500Kbps,  DiskRpm::Rpm360)),
    (2880, RawGeometry::new(80, 2, 18, DataRate::Rate500Kbps,  DiskRpm::Rpm300)),
    (3120, RawGeometry::new(40, 2, 39, DataRate::Rate1000Kbps, DiskRpm::Rpm300)),
    (3200, RawGeometry::new(80, 2, 20, DataRate::Rate500Kbps,  DiskRpm::Rpm300)),
    (5760, RawGeometry::new(80, 2, 36, DataRate::Rate1000Kbps, DiskRpm::Rpm300)),
    (6240, RawGeometry::new(80, 2, 39, DataRate::Rate1000Kbps, DiskRpm::Rpm300)),
];

/// Deduce a geometry from a raw image size. Sizes outside the table are
/// accepted when a two-sided, 40 or 80 cylinder factoring with 8..=18
/// sectors per track exists.
pub fn geometry_from_size(len: usize) -> Option<RawGeometry> {
    if len == 0 || len % SECTOR_SIZE != 0 {
        return None;
    }
    let total_sectors = len / SECTOR_SIZE;

    if let Some((_, geometry)) = GEOMETRY_TABLE.iter().find(|(sectors, _)| *sectors == total_sectors) {
        return Some(*geometry);
    }

    for cylinders in [40usize, 80] {
        if total_sectors % (2 * cylinders) != 0 {
            continue;
        }
        let spt = total_sectors / (2 * cylinders);
        if (8..=18).contains(&spt) {
            let rate = if spt <= 10 { DataRate::Rate250Kbps } else { DataRate::Rate500Kbps };
            let rpm = if rate == DataRate::Rate500Kbps && spt == 15 {
                DiskRpm::Rpm360
            }
            else {
                DiskRpm::Rpm300
            };
            log::debug!("factored {} sectors as {}x2x{}", total_sectors, cylinders, spt);
            return Some(RawGeometry::new(cylinders as u8, 2, spt as u8, rate, rpm));
        }
    }
    None
}

pub struct RawFormat {}

impl RawFormat {
    pub fn capabilities() -> FormatCaps {
        FormatCaps::CAP_SECTOR | FormatCaps::CAP_WRITE
    }

    pub fn extensions() -> Vec<&'static str> {
        vec!["img", "ima"]
    }

    pub fn detect<RWS: ReadSeek>(mut image: RWS) -> bool {
        let len = get_length(&mut image).map_or(0, |l| l as usize);
        geometry_from_size(len).is_some()
    }

    pub fn load_image<RWS: ReadSeek>(image: &mut RWS) -> Result<Disk, FloppyError> {
        let len = get_length(image)? as usize;
        let geometry = geometry_from_size(len).ok_or_else(|| {
            FloppyError::Format(format!("no known raw geometry for a {} byte image", len))
        })?;
        log::debug!(
            "raw image: {}x{}x{} at {}",
            geometry.cylinders,
            geometry.heads,
            geometry.sectors_per_track,
            geometry.rate
        );

        image.seek(SeekFrom::Start(0))?;
        let mut disk = Disk::default();
        for cylinder in 0..geometry.cylinders {
            for head in 0..geometry.heads {
                let mut sectors = Vec::with_capacity(geometry.sectors_per_track as usize);
                for _ in 0..geometry.sectors_per_track {
                    let mut sector = vec![0u8; SECTOR_SIZE];
                    image.read_exact(&mut sector)?;
                    sectors.push(sector);
                }
                let track = ibm::encode_track(&sectors, cylinder, head, geometry.rate, geometry.rpm, true)?;
                disk.set_track(cylinder, head, track);
            }
        }

        disk.header = DiskHeader {
            cylinders: geometry.cylinders,
            sides: geometry.heads,
            encoding: TrackEncoding::IbmMfm,
            bit_rate: geometry.rate,
            rpm: geometry.rpm,
            interface_mode: geometry.interface_mode(),
            write_protect: false,
        };
        Ok(disk)
    }

    pub fn save_image<RWS: ReadWriteSeek>(disk: &Disk, output: &mut RWS) -> Result<(), FloppyError> {
        // Geometry comes from the header and the decoded sector count of
        // track 0 side 0.
        let spt = ibm::count_sectors(disk.track(0, 0)?, 0, 0);
        if spt == 0 {
            return Err(FloppyError::Format("no sectors decode from track 0 side 0".to_string()));
        }
        log::debug!(
            "raw save: {}x{}x{} sectors",
            disk.header.cylinders,
            disk.header.sides,
            spt
        );

        for cylinder in 0..disk.header.cylinders {
            for head in 0..disk.header.sides {
                let sectors = ibm::read_sectors(disk.track(cylinder, head)?, cylinder, head);
                for s in 0..spt as u8 {
                    let data = sectors.get(&s).ok_or(FloppyError::MissingSector {
                        cylinder,
                        head,
                        sector: s,
                    })?;
                    output.write_all(data)?;
                }
            }
        }
        Ok(())
    }
}
