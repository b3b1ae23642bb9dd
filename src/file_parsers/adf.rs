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

    src/file_parsers/adf.rs

    Amiga ADF images: 80 cylinders x 2 heads x 11 sectors of 512 bytes,
    always exactly 901,120 bytes, encoded with the Amiga track schema.

*/

use crate::disk::{Disk, DiskHeader};
use crate::file_parsers::FormatCaps;
use crate::io::{Read, ReadSeek, ReadWriteSeek, Seek, SeekFrom, Write};
use crate::track_schema::amiga;
use crate::util::get_length;
use crate::{DataRate, DiskRpm, FloppyError, InterfaceMode, TrackEncoding, SECTOR_SIZE};

pub const ADF_CYLINDERS: u8 = 80;
pub const ADF_HEADS: u8 = 2;
pub const ADF_IMAGE_SIZE: usize =
    ADF_CYLINDERS as usize * ADF_HEADS as usize * amiga::SECTORS_PER_TRACK * SECTOR_SIZE;

pub struct AdfFormat {}

impl AdfFormat {
    pub fn capabilities() -> FormatCaps {
        FormatCaps::CAP_SECTOR | FormatCaps::CAP_AMIGA | FormatCaps::CAP_WRITE
    }

    pub fn extensions() -> Vec<&'static str> {
        vec!["adf"]
    }

    pub fn detect<RWS: ReadSeek>(mut image: RWS) -> bool {
        get_length(&mut image).map_or(false, |len| len as usize == ADF_IMAGE_SIZE)
    }

    pub fn load_image<RWS: ReadSeek>(image: &mut RWS) -> Result<Disk, FloppyError> {
        let len = get_length(image)? as usize;
        if len != ADF_IMAGE_SIZE {
            return Err(FloppyError::Format(format!(
                "ADF images are exactly {} bytes, got {}",
                ADF_IMAGE_SIZE, len
            )));
        }

        image.seek(SeekFrom::Start(0))?;
        let mut disk = Disk::default();
        for cylinder in 0..ADF_CYLINDERS {
            for head in 0..ADF_HEADS {
                let mut sectors = Vec::with_capacity(amiga::SECTORS_PER_TRACK);
                for _ in 0..amiga::SECTORS_PER_TRACK {
                    let mut sector = vec![0u8; SECTOR_SIZE];
                    image.read_exact(&mut sector)?;
                    sectors.push(sector);
                }
                let track_no = amiga::track_number(cylinder, head);
                let track =
                    amiga::encode_track(&sectors, track_no, DataRate::Rate250Kbps, DiskRpm::Rpm300)?;
                disk.set_track(cylinder, head, track);
            }
        }

        disk.header = DiskHeader {
            cylinders: ADF_CYLINDERS,
            sides: ADF_HEADS,
            encoding: TrackEncoding::AmigaMfm,
            bit_rate: DataRate::Rate250Kbps,
            rpm: DiskRpm::Rpm300,
            interface_mode: InterfaceMode::AmigaDd,
            write_protect: false,
        };
        Ok(disk)
    }

    pub fn save_image<RWS: ReadWriteSeek>(disk: &Disk, output: &mut RWS) -> Result<(), FloppyError> {
        for cylinder in 0..ADF_CYLINDERS {
            for head in 0..ADF_HEADS {
                let track_no = amiga::track_number(cylinder, head);
                let sectors = amiga::read_sectors(disk.track(cylinder, head)?, track_no);
                for s in 0..amiga::SECTORS_PER_TRACK as u8 {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::Cursor;

    #[test]
    fn test_image_size_constant() {
        assert_eq!(ADF_IMAGE_SIZE, 901_120);
    }

    #[test]
    fn test_rejects_wrong_size() {
        let short = vec![0u8; ADF_IMAGE_SIZE - SECTOR_SIZE];
        assert!(!AdfFormat::detect(Cursor::new(&short)));
        assert!(AdfFormat::load_image(&mut Cursor::new(&short)).is_err());
    }

    #[test]
    fn test_round_trip() {
        let source: Vec<u8> = (0..ADF_IMAGE_SIZE)
            .map(|i| ((i / SECTOR_SIZE) as u8).wrapping_mul(7) ^ (i as u8))
            .collect();

        let disk = AdfFormat::load_image(&mut Cursor::new(&source)).unwrap();
        assert_eq!(disk.header.encoding, TrackEncoding::AmigaMfm);
        assert_eq!(disk.header.cylinders, 80);

        let mut out = Cursor::new(Vec::new());
        AdfFormat::save_image(&disk, &mut out).unwrap();
        assert_eq!(out.into_inner(), source);
    }
}
