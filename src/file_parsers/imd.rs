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

    src/file_parsers/imd.rs

    A parser for Dave Dunfield's ImageDisk (IMD) format: an ASCII header and
    comment terminated by 0x1A, followed by per-track records with a sector
    numbering map and normal or compressed sector data.

*/

use binrw::{binrw, BinRead, BinWrite};

use crate::disk::{Disk, DiskHeader};
use crate::file_parsers::FormatCaps;
use crate::io::{Read, ReadBytesExt, ReadSeek, ReadWriteSeek, Seek, SeekFrom, Write};
use crate::track_schema::ibm;
use crate::util::read_ascii;
use crate::{DataRate, DiskRpm, FloppyError, InterfaceMode, TrackEncoding, SECTOR_SIZE};

pub const ASCII_EOF: u8 = 0x1A;

const SECTOR_UNAVAILABLE: u8 = 0;

#[derive(Debug)]
#[binrw]
#[brw(little)]
struct ImdTrackHeader {
    mode: u8,
    cylinder: u8,
    head: u8,
    sector_count: u8,
    sector_size: u8,
}

impl ImdTrackHeader {
    fn head_no(&self) -> u8 {
        self.head & 0x0F
    }

    fn has_cylinder_map(&self) -> bool {
        self.head & 0x80 != 0
    }

    fn has_head_map(&self) -> bool {
        self.head & 0x40 != 0
    }
}

/// IMD modes 0-2 are FM at 500/300/250 kbit/s; modes 3-5 the MFM versions.
/// A 300 kbit/s track is 250 kbit/s media spinning at 360 RPM.
fn mode_to_rate(mode: u8) -> Result<(DataRate, DiskRpm), FloppyError> {
    match mode {
        0..=2 => Err(FloppyError::Format("FM tracks are not supported".to_string())),
        3 => Ok((DataRate::Rate500Kbps, DiskRpm::Rpm300)),
        4 => {
            // Same 100k bitcell track as mode 5, clocked for a 360 RPM
            // drive; render it at the 300 RPM equivalent.
            log::warn!("treating 300 kbit/s IMD track as 250 kbit/s at 300 RPM");
            Ok((DataRate::Rate250Kbps, DiskRpm::Rpm300))
        }
        5 => Ok((DataRate::Rate250Kbps, DiskRpm::Rpm300)),
        _ => Err(FloppyError::Format(format!("invalid IMD track mode {}", mode))),
    }
}

fn rate_to_mode(rate: DataRate, rpm: DiskRpm) -> Result<u8, FloppyError> {
    match (rate, rpm) {
        (DataRate::Rate500Kbps, _) => Ok(3),
        (DataRate::Rate250Kbps, DiskRpm::Rpm360) => Ok(4),
        (DataRate::Rate250Kbps, DiskRpm::Rpm300) => Ok(5),
        (DataRate::Rate1000Kbps, _) => {
            Err(FloppyError::Format("IMD has no mode for 1000 kbit/s media".to_string()))
        }
    }
}

pub struct ImdFormat {}

impl ImdFormat {
    pub fn capabilities() -> FormatCaps {
        FormatCaps::CAP_SECTOR | FormatCaps::CAP_WRITE
    }

    pub fn extensions() -> Vec<&'static str> {
        vec!["imd"]
    }

    pub fn detect<RWS: ReadSeek>(mut image: RWS) -> bool {
        if image.seek(SeekFrom::Start(0)).is_err() {
            return false;
        }
        let mut magic = [0u8; 4];
        image.read_exact(&mut magic).map_or(false, |_| &magic == b"IMD ")
    }

    pub fn load_image<RWS: ReadSeek>(image: &mut RWS) -> Result<Disk, FloppyError> {
        image.seek(SeekFrom::Start(0))?;

        let (header_str, terminator) = read_ascii(image, Some(ASCII_EOF), None);
        let header_str = header_str.ok_or_else(|| FloppyError::Format("empty IMD header".to_string()))?;
        if !header_str.starts_with("IMD ") || terminator != ASCII_EOF {
            return Err(FloppyError::Format("bad IMD header line".to_string()));
        }
        log::debug!("IMD header: {}", header_str);

        let mut disk = Disk::default();
        let mut disk_rate: Option<(DataRate, DiskRpm)> = None;
        let mut sides_seen: u8 = 1;

        loop {
            // A clean EOF between track records ends the image.
            let mut probe = [0u8; 1];
            match image.read(&mut probe) {
                Ok(0) => break,
                Ok(_) => {
                    image.seek(SeekFrom::Current(-1))?;
                }
                Err(e) => return Err(e.into()),
            }
            let header = ImdTrackHeader::read(image)?;

            let (rate, rpm) = mode_to_rate(header.mode)?;
            let rate_rpm = *disk_rate.get_or_insert((rate, rpm));
            if rate_rpm != (rate, rpm) {
                log::warn!("IMD mixes track modes; keeping the first seen rate");
            }

            if header.sector_size != 2 {
                return Err(FloppyError::Format(format!(
                    "IMD sector size code {} unsupported, only 512 byte sectors",
                    header.sector_size
                )));
            }

            let spt = header.sector_count as usize;
            let mut numbering = vec![0u8; spt];
            image.read_exact(&mut numbering)?;
            if header.has_cylinder_map() {
                image.seek(SeekFrom::Current(spt as i64))?;
            }
            if header.has_head_map() {
                image.seek(SeekFrom::Current(spt as i64))?;
            }

            let mut sectors: Vec<Option<Vec<u8>>> = vec![None; spt];
            for &sector_no in numbering.iter() {
                let record_type = image.read_u8()?;
                let data = match record_type {
                    SECTOR_UNAVAILABLE => None,
                    // Odd types carry full data, even types one fill byte;
                    // the high types only add CRC-error/deleted flags.
                    1 | 3 | 5 | 7 => {
                        let mut data = vec![0u8; SECTOR_SIZE];
                        image.read_exact(&mut data)?;
                        Some(data)
                    }
                    2 | 4 | 6 | 8 => {
                        let fill = image.read_u8()?;
                        Some(vec![fill; SECTOR_SIZE])
                    }
                    t => {
                        return Err(FloppyError::Format(format!("unknown IMD sector record type {}", t)));
                    }
                };
                if matches!(record_type, 5..=8) {
                    log::warn!(
                        "IMD sector c:{} h:{} s:{} was imaged with a CRC error",
                        header.cylinder,
                        header.head_no(),
                        sector_no
                    );
                }

                let index = sector_no.checked_sub(1).map(usize::from);
                match index {
                    Some(i) if i < spt => sectors[i] = data,
                    _ => {
                        return Err(FloppyError::Format(format!(
                            "IMD sector number {} outside 1..={}",
                            sector_no, spt
                        )));
                    }
                }
            }

            let sectors: Vec<Vec<u8>> = sectors
                .into_iter()
                .enumerate()
                .map(|(i, s)| {
                    s.unwrap_or_else(|| {
                        log::warn!(
                            "IMD sector {} on c:{} h:{} unavailable, filling with zeros",
                            i + 1,
                            header.cylinder,
                            header.head_no()
                        );
                        vec![0u8; SECTOR_SIZE]
                    })
                })
                .collect();

            let track = ibm::encode_track(&sectors, header.cylinder, header.head_no(), rate, rpm, true)?;
            sides_seen = sides_seen.max(header.head_no() + 1);
            disk.set_track(header.cylinder, header.head_no(), track);
        }

        let (rate, rpm) = disk_rate.ok_or_else(|| FloppyError::Format("IMD image has no tracks".to_string()))?;
        disk.header = DiskHeader {
            cylinders: disk.tracks.len() as u8,
            sides: sides_seen,
            encoding: TrackEncoding::IbmMfm,
            bit_rate: rate,
            rpm,
            interface_mode: match rate {
                DataRate::Rate250Kbps => InterfaceMode::IbmPcDd,
                _ => InterfaceMode::IbmPcHd,
            },
            write_protect: false,
        };
        Ok(disk)
    }

    pub fn save_image<RWS: ReadWriteSeek>(disk: &Disk, output: &mut RWS) -> Result<(), FloppyError> {
        let mode = rate_to_mode(disk.header.bit_rate, disk.header.rpm)?;
        let spt = ibm::count_sectors(disk.track(0, 0)?, 0, 0);
        if spt == 0 {
            return Err(FloppyError::Format("no sectors decode from track 0 side 0".to_string()));
        }

        output.write_all(b"IMD 1.18: fluxforge export\r\n")?;
        output.write_all(&[ASCII_EOF])?;

        for cylinder in 0..disk.header.cylinders {
            for head in 0..disk.header.sides {
                let sectors = ibm::read_sectors(disk.track(cylinder, head)?, cylinder, head);
                let header = ImdTrackHeader {
                    mode,
                    cylinder,
                    head,
                    sector_count: spt as u8,
                    sector_size: 2,
                };
                header.write(output)?;
                let numbering: Vec<u8> = (1..=spt as u8).collect();
                output.write_all(&numbering)?;

                for s in 0..spt as u8 {
                    let data = sectors.get(&s).ok_or(FloppyError::MissingSector {
                        cylinder,
                        head,
                        sector: s,
                    })?;
                    // Uniform sectors compress to a single fill byte.
                    if data.iter().all(|&b| b == data[0]) {
                        output.write_all(&[2, data[0]])?;
                    }
                    else {
                        output.write_all(&[1])?;
                        output.write_all(data)?;
                    }
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

    fn build_imd(tracks: &[(u8, u8, Vec<Vec<u8>>)]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(b"IMD 1.18: 01/01/2024 12:00:00\r\ntest image");
        out.push(ASCII_EOF);
        for (cylinder, head, sectors) in tracks {
            out.extend_from_slice(&[5, *cylinder, *head, sectors.len() as u8, 2]);
            out.extend((1..=sectors.len() as u8).collect::<Vec<u8>>());
            for data in sectors {
                out.push(1);
                out.extend_from_slice(data);
            }
        }
        out
    }

    #[test]
    fn test_detect() {
        let image = build_imd(&[]);
        assert!(ImdFormat::detect(Cursor::new(&image)));
        assert!(!ImdFormat::detect(Cursor::new(b"MDI nope".to_vec())));
    }

    #[test]
    fn test_load_and_decode() {
        let sectors: Vec<Vec<u8>> = (0..9u8).map(|s| vec![s ^ 0x33; SECTOR_SIZE]).collect();
        let image = build_imd(&[(0, 0, sectors.clone()), (0, 1, sectors.clone())]);
        let disk = ImdFormat::load_image(&mut Cursor::new(&image)).unwrap();
        assert_eq!(disk.header.bit_rate, DataRate::Rate250Kbps);

        let decoded = ibm::read_sectors(disk.track(0, 1).unwrap(), 0, 1);
        assert_eq!(decoded.len(), 9);
        for (s, data) in sectors.iter().enumerate() {
            assert_eq!(&decoded[&(s as u8)], data);
        }
    }

    #[test]
    fn test_compressed_sector_record() {
        let mut image = Vec::new();
        image.extend_from_slice(b"IMD 1.18: x");
        image.push(ASCII_EOF);
        image.extend_from_slice(&[5, 0, 0, 2, 2]);
        image.extend_from_slice(&[1, 2]);
        image.extend_from_slice(&[2, 0xE5]); // sector 1: compressed fill
        image.push(1); // sector 2: full data
        image.extend_from_slice(&vec![0x42; SECTOR_SIZE]);

        let disk = ImdFormat::load_image(&mut Cursor::new(&image)).unwrap();
        let decoded = ibm::read_sectors(disk.track(0, 0).unwrap(), 0, 0);
        assert_eq!(decoded[&0], vec![0xE5; SECTOR_SIZE]);
        assert_eq!(decoded[&1], vec![0x42; SECTOR_SIZE]);
    }

    #[test]
    fn test_round_trip_through_save() {
        let sectors: Vec<Vec<u8>> = (0..9u8)
            .map(|s| (0..SECTOR_SIZE).map(|i| (i as u8).wrapping_add(s)).collect())
            .collect();
        let image = build_imd(&[(0, 0, sectors.clone())]);
        let disk = ImdFormat::load_image(&mut Cursor::new(&image)).unwrap();

        let mut saved = Cursor::new(Vec::new());
        ImdFormat::save_image(&disk, &mut saved).unwrap();

        let reloaded = ImdFormat::load_image(&mut Cursor::new(saved.into_inner())).unwrap();
        let decoded = ibm::read_sectors(reloaded.track(0, 0).unwrap(), 0, 0);
        for (s, data) in sectors.iter().enumerate() {
            assert_eq!(&decoded[&(s as u8)], data);
        }
    }
}
