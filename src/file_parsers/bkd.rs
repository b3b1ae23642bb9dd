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

    src/file_parsers/bkd.rs

    BKD images for BK-0010 diskettes: 80 cylinders x 2 heads x 10 sectors of
    512 bytes (exactly 819,200 bytes), IBM MFM framing but with no index
    marker on the track.

*/

use crate::disk::{Disk, DiskHeader};
use crate::file_parsers::FormatCaps;
use crate::io::{Read, ReadSeek, ReadWriteSeek, Seek, SeekFrom, Write};
use crate::track_schema::ibm;
use crate::util::get_length;
use crate::{DataRate, DiskRpm, FloppyError, InterfaceMode, TrackEncoding, SECTOR_SIZE};

pub const BKD_CYLINDERS: u8 = 80;
pub const BKD_HEADS: u8 = 2;
pub const BKD_SECTORS_PER_TRACK: usize = 10;
pub const BKD_IMAGE_SIZE: usize =
    BKD_CYLINDERS as usize * BKD_HEADS as usize * BKD_SECTORS_PER_TRACK * SECTOR_SIZE;

pub struct BkdFormat {}

impl BkdFormat {
    pub fn capabilities() -> FormatCaps {
        FormatCaps::CAP_SECTOR | FormatCaps::CAP_WRITE
    }

    pub fn extensions() -> Vec<&'static str> {
        vec!["bkd"]
    }

    pub fn detect<RWS: ReadSeek>(mut image: RWS) -> bool {
        get_length(&mut image).map_or(false, |len| len as usize == BKD_IMAGE_SIZE)
    }

    pub fn load_image<RWS: ReadSeek>(image: &mut RWS) -> Result<Disk, FloppyError> {
        let len = get_length(image)? as usize;
        if len != BKD_IMAGE_SIZE {
            return Err(FloppyError::Format(format!(
                "BKD images are exactly {} bytes, got {}",
                BKD_IMAGE_SIZE, len
            )));
        }

        image.seek(SeekFrom::Start(0))?;
        let mut disk = Disk::default();
        for cylinder in 0..BKD_CYLINDERS {
            for head in 0..BKD_HEADS {
                let mut sectors = Vec::with_capacity(BKD_SECTORS_PER_TRACK);
                for _ in 0..BKD_SECTORS_PER_TRACK {
                    let mut sector = vec![0u8; SECTOR_SIZE];
                    image.read_exact(&mut sector)?;
                    sectors.push(sector);
                }
                // BK-0010 controllers never write an index address mark.
                let track =
                    ibm::encode_track(&sectors, cylinder, head, DataRate::Rate250Kbps, DiskRpm::Rpm300, false)?;
                disk.set_track(cylinder, head, track);
            }
        }

        disk.header = DiskHeader {
            cylinders: BKD_CYLINDERS,
            sides: BKD_HEADS,
            encoding: TrackEncoding::IbmMfm,
            bit_rate: DataRate::Rate250Kbps,
            rpm: DiskRpm::Rpm300,
            interface_mode: InterfaceMode::GenericShugartDd,
            write_protect: false,
        };
        Ok(disk)
    }

    pub fn save_image<RWS: ReadWriteSeek>(disk: &Disk, output: &mut RWS) -> Result<(), FloppyError> {
        for cylinder in 0..BKD_CYLINDERS {
            for head in 0..BKD_HEADS {
                let sectors = ibm::read_sectors(disk.track(cylinder, head)?, cylinder, head);
                for s in 0..BKD_SECTORS_PER_TRACK as u8 {
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
