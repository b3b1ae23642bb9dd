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

    src/file_parsers/kryoflux.rs

    KryoFlux stream files (.raw) as an image source. One file holds the raw
    flux capture of a single track; a directory of trackNN.S.raw files makes
    up a disk. Decoding runs the stream codec and the PLL.

*/

use std::path::{Path, PathBuf};

use regex::Regex;

use crate::adapters::kryoflux::decode_stream;
use crate::disk::{Disk, DiskHeader};
use crate::file_parsers::FormatCaps;
use crate::flux::pll::Pll;
use crate::io::{Read, ReadSeek, Seek, SeekFrom};
use crate::track_schema::TrackSchema;
use crate::{DataRate, DiskRpm, FloppyError, InterfaceMode, TrackEncoding};

pub struct KfxFormat {}

impl KfxFormat {
    pub fn capabilities() -> FormatCaps {
        FormatCaps::CAP_FLUX
    }

    pub fn extensions() -> Vec<&'static str> {
        vec!["raw"]
    }

    pub fn detect<RWS: ReadSeek>(mut image: RWS) -> bool {
        // Streams open with an OOB block.
        let mut first = [0u8; 1];
        if image.seek(SeekFrom::Start(0)).is_err() || image.read_exact(&mut first).is_err() {
            return false;
        }
        first[0] == 0x0D
    }

    /// Decode a single stream file into a one-track disk. The filename
    /// carries the track addressing, so dispatch through a bare reader can
    /// only produce track 0; use [`Self::load_set`] for whole disks.
    pub fn load_image<RWS: ReadSeek>(image: &mut RWS) -> Result<Disk, FloppyError> {
        image.seek(SeekFrom::Start(0))?;
        let mut bytes = Vec::new();
        image.read_to_end(&mut bytes)?;

        let (bitcells, rate, rpm) = decode_track_stream(&bytes)?;
        let mut disk = Disk::default();
        disk.set_track(0, 0, bitcells);
        disk.header = header_for(&disk, 1, rate, rpm);
        Ok(disk)
    }

    /// Load a whole stream-file set. `path` names any member file; its
    /// siblings are matched by the trackNN.S.raw convention.
    pub fn load_set(path: &Path) -> Result<Disk, FloppyError> {
        let set = expand_stream_set(path)?;
        if set.is_empty() {
            return Err(FloppyError::Format(format!(
                "no stream file set around {}",
                path.display()
            )));
        }

        let mut disk = Disk::default();
        let mut disk_rate: Option<(DataRate, DiskRpm)> = None;
        let mut sides: u8 = 1;

        for (cylinder, head, member) in set.iter() {
            log::debug!("decoding stream file {}", member.display());
            let bytes = std::fs::read(member)?;
            let (bitcells, rate, rpm) = decode_track_stream(&bytes)?;
            let rate_rpm = *disk_rate.get_or_insert((rate, rpm));
            if rate_rpm != (rate, rpm) {
                log::warn!(
                    "track {}:{} decodes at {} {}, disk started at {} {}",
                    cylinder,
                    head,
                    rate,
                    rpm,
                    rate_rpm.0,
                    rate_rpm.1
                );
            }
            sides = sides.max(head + 1);
            disk.set_track(*cylinder, *head, bitcells);
        }

        let (rate, rpm) = disk_rate.unwrap();
        disk.header = header_for(&disk, sides, rate, rpm);
        Ok(disk)
    }
}

fn header_for(disk: &Disk, sides: u8, rate: DataRate, rpm: DiskRpm) -> DiskHeader {
    let encoding = disk
        .track(0, 0)
        .ok()
        .and_then(TrackSchema::sniff)
        .map(|schema| match schema {
            TrackSchema::Ibm => TrackEncoding::IbmMfm,
            TrackSchema::Amiga => TrackEncoding::AmigaMfm,
        })
        .unwrap_or(TrackEncoding::Unknown);

    DiskHeader {
        cylinders: disk.tracks.len() as u8,
        sides,
        encoding,
        bit_rate: rate,
        rpm,
        interface_mode: InterfaceMode::GenericShugartDd,
        // Stream sets are archival captures.
        write_protect: true,
    }
}

/// Decode one stream into the bitcells of its first full rotation.
fn decode_track_stream(bytes: &[u8]) -> Result<(Vec<u8>, DataRate, DiskRpm), FloppyError> {
    let stream = decode_stream(bytes)?;
    let rate = stream.capture.estimate_bit_rate()?;
    let rpm = stream.capture.estimate_rpm()?;

    let intervals = stream.capture.revolution_intervals_ns()?;
    let mut pll = Pll::new(rate);
    let bitcells = pll.decode_bitcells(&intervals);
    log::debug!(
        "stream decoded to {} bitcell bytes at {} {}",
        bitcells.len(),
        rate,
        rpm
    );
    Ok((bitcells, rate, rpm))
}

/// Resolve one member path into the whole `(cylinder, head, path)` set,
/// tolerating the mixed-case filenames some imaging runs produce.
fn expand_stream_set(path: &Path) -> Result<Vec<(u8, u8, PathBuf)>, FloppyError> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| FloppyError::Format(format!("bad stream path {}", path.display())))?;

    let re = Regex::new(r"^(.*?)(\d{2})\.(\d)\.raw$").unwrap();
    let base = match re.captures(&file_name.to_ascii_lowercase()) {
        Some(caps) => caps.get(1).map(|m| m.as_str().to_string()).unwrap_or_default(),
        None => {
            // A lone stream file without the set naming convention.
            return Ok(vec![(0, 0, path.to_path_buf())]);
        }
    };

    let dir = path.parent().unwrap_or(Path::new("."));
    let listing: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .collect();

    let mut set = Vec::new();
    for cylinder in 0u8..=83 {
        for head in 0u8..2 {
            let want = format!("{}{:02}.{}.raw", base, cylinder, head);
            let found = listing.iter().find(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| n.to_ascii_lowercase() == want)
                    .unwrap_or(false)
            });
            if let Some(member) = found {
                set.push((cylinder, head, member.clone()));
            }
        }
    }
    Ok(set)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flux::encoder::{cover_full_rotation, generate_flux_transitions, to_intervals};
    use crate::io::Cursor;
    use crate::track_schema::ibm;
    use crate::SECTOR_SIZE;

    /// Synthesize the stream-file bytes of one captured track: a KFInfo
    /// block, then the flux cells of two revolutions with index blocks.
    fn synthesize_stream(track_bytes: &[u8], rate: DataRate, rpm: DiskRpm) -> Vec<u8> {
        let sck = 24_027_428.571_428_5_f64;

        let mut transitions = generate_flux_transitions(track_bytes, rate);
        cover_full_rotation(&mut transitions, rate, rpm);
        let intervals = to_intervals(&transitions);

        let mut out = Vec::new();
        let info = b"sck=24027428.5714285, ick=3003428.5714285625\x00";
        out.extend_from_slice(&[0x0D, 0x04, info.len() as u8, 0]);
        out.extend_from_slice(info);

        let mut index_payload = |pos: u32| {
            let mut p = vec![0x0D, 0x02, 12, 0];
            p.extend_from_slice(&pos.to_le_bytes());
            p.extend_from_slice(&0u32.to_le_bytes());
            p.extend_from_slice(&0u32.to_le_bytes());
            p
        };

        // Index at stream position 0, one revolution of cells, index, and a
        // partial second revolution so the window is complete.
        out.extend_from_slice(&index_payload(0));
        let mut stream_pos: u32 = 0;
        let mut emit_rev = |out: &mut Vec<u8>, stream_pos: &mut u32| {
            for &interval_ns in intervals.iter() {
                let ticks = (interval_ns * sck / 1e9).round() as u32;
                if ticks < 0x0800 {
                    out.push((ticks >> 8) as u8);
                    out.push(ticks as u8);
                }
                else {
                    out.push(0x0C);
                    out.push((ticks >> 8) as u8);
                    out.push(ticks as u8);
                }
                *stream_pos += if ticks < 0x0800 { 2 } else { 3 };
            }
        };
        emit_rev(&mut out, &mut stream_pos);
        out.extend_from_slice(&index_payload(stream_pos));
        emit_rev(&mut out, &mut stream_pos);
        out.extend_from_slice(&index_payload(stream_pos));
        out.extend_from_slice(&[0x0D, 0x0D, 0, 0]);
        out
    }

    #[test]
    fn test_stream_to_sectors() {
        let sectors: Vec<Vec<u8>> = (0..9u8)
            .map(|s| (0..SECTOR_SIZE).map(|i| (i as u8) ^ s).collect())
            .collect();
        let track = ibm::encode_track(&sectors, 0, 0, DataRate::Rate250Kbps, DiskRpm::Rpm300, true).unwrap();
        let stream = synthesize_stream(&track, DataRate::Rate250Kbps, DiskRpm::Rpm300);

        let disk = KfxFormat::load_image(&mut Cursor::new(stream)).unwrap();
        assert_eq!(disk.header.bit_rate, DataRate::Rate250Kbps);
        assert_eq!(disk.header.rpm, DiskRpm::Rpm300);
        assert_eq!(disk.header.encoding, TrackEncoding::IbmMfm);

        let decoded = ibm::read_sectors(disk.track(0, 0).unwrap(), 0, 0);
        assert_eq!(decoded.len(), 9);
        for (s, data) in sectors.iter().enumerate() {
            assert_eq!(&decoded[&(s as u8)], data);
        }
    }
}
