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

    src/track_schema/ibm.rs

    IBM System 34 style MFM sector framing: track formatting with the
    standard gap structure, and the scanning sector reader.

*/

use std::collections::{BTreeMap, BTreeSet};

use crate::bitstream::{track_half_bits, MfmReader, MfmWriter, SyncMarker};
use crate::util::{crc_ibm_3740, CRC_SEED_SECTOR_DATA, CRC_SEED_SECTOR_HEADER};
use crate::{DataRate, DiskRpm, FloppyError, SECTOR_SIZE, SECTOR_SIZE_CODE};

/// Tag byte of a sector header (IDAM) record.
pub const HEADER_TAG: u8 = 0xFE;
/// Tag byte of a sector data (DAM) record.
pub const DATA_TAG: u8 = 0xFB;

/// Gap before the index marker (gap 4a).
const GAP_PRE_INDEX: usize = 80;
/// Gap between the index marker and the first sector (gap 1).
const GAP_POST_INDEX: usize = 50;

/// A decoded sector header.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SectorId {
    pub cylinder: u8,
    pub head: u8,
    /// 1-based sector number as recorded on the medium.
    pub sector: u8,
    pub size_code: u8,
}

/// Select the post-header (gap 2) and post-data (gap 3) lengths for a track
/// layout. The table follows the classic controller formats per data rate
/// and sector count.
pub fn gap_pair(rate: DataRate, sectors_per_track: usize) -> (usize, usize) {
    match (rate, sectors_per_track) {
        (DataRate::Rate500Kbps, spt) if spt < 18 => (22, 84),
        (DataRate::Rate500Kbps, 18) => (22, 108),
        (DataRate::Rate500Kbps, _) => (22, 44),
        (DataRate::Rate1000Kbps, spt) if spt <= 36 => (41, 84),
        (DataRate::Rate1000Kbps, _) => (41, 40),
        (DataRate::Rate250Kbps, spt) if spt <= 9 => (22, 80),
        (DataRate::Rate250Kbps, _) => (22, 34),
    }
}

/// Format one track of sectors into a bitcell buffer.
///
/// Layout: pre-index gap, index marker, post-index gap, then per sector a
/// header record, gap 2, a data record and gap 3; the remainder is filled
/// with gap bytes up to the track cap. `with_index_marker` is cleared for
/// BK-0010 media, which carries no index record.
pub fn encode_track(
    sectors: &[Vec<u8>],
    cylinder: u8,
    head: u8,
    rate: DataRate,
    rpm: DiskRpm,
    with_index_marker: bool,
) -> Result<Vec<u8>, FloppyError> {
    let spt = sectors.len();
    let (gap2, gap3) = gap_pair(rate, spt);

    let mut writer = MfmWriter::new(track_half_bits(rate, rpm));
    writer.write_gap(GAP_PRE_INDEX);
    if with_index_marker {
        writer.write_index_marker();
    }
    writer.write_gap(GAP_POST_INDEX);

    for (s, data) in sectors.iter().enumerate() {
        if data.len() != SECTOR_SIZE {
            return Err(FloppyError::Format(format!(
                "sector {} on cylinder {} has {} bytes, expected {}",
                s,
                cylinder,
                data.len(),
                SECTOR_SIZE
            )));
        }

        writer.write_marker(HEADER_TAG);
        let id = [cylinder, head, s as u8 + 1, SECTOR_SIZE_CODE];
        writer.write_bytes(&id);
        let crc = crc_ibm_3740(&id, Some(CRC_SEED_SECTOR_HEADER));
        writer.write_byte((crc >> 8) as u8);
        writer.write_byte(crc as u8);
        writer.write_gap(gap2);

        writer.write_marker(DATA_TAG);
        writer.write_bytes(data);
        let mut crc = crc_ibm_3740(&[DATA_TAG], Some(CRC_SEED_SECTOR_DATA));
        crc = crc_ibm_3740(data, Some(crc));
        writer.write_byte((crc >> 8) as u8);
        writer.write_byte(crc as u8);
        writer.write_gap(gap3);
    }

    writer.fill_with_gap();
    Ok(writer.into_bytes())
}

/// Scan forward from the reader's cursor for the next sector header that
/// matches `cylinder`/`head` and carries a 512 byte size code. CRC failures
/// and foreign headers are logged and skipped.
fn next_header(reader: &mut MfmReader, cylinder: u8, head: u8) -> Result<SectorId, FloppyError> {
    loop {
        if reader.scan_marker()? != SyncMarker::Sector {
            continue;
        }
        if reader.read_byte()? != HEADER_TAG {
            continue;
        }
        if let Some(id) = check_header(reader, cylinder, head)? {
            return Ok(id);
        }
    }
}

/// Read and validate the four id bytes and CRC of a header record whose tag
/// has already been consumed. Returns None when the record should be skipped.
fn check_header(reader: &mut MfmReader, cylinder: u8, head: u8) -> Result<Option<SectorId>, FloppyError> {
    let id = [
        reader.read_byte()?,
        reader.read_byte()?,
        reader.read_byte()?,
        reader.read_byte()?,
    ];
    let crc = reader.read_u16()?;
    if crc_ibm_3740(&id, Some(CRC_SEED_SECTOR_HEADER)) != crc {
        log::warn!("sector header CRC mismatch, resyncing");
        return Ok(None);
    }
    if id[0] != cylinder || id[1] != head {
        log::warn!(
            "sector header addresses c:{} h:{}, expected c:{} h:{}",
            id[0],
            id[1],
            cylinder,
            head
        );
        return Ok(None);
    }
    if id[3] != SECTOR_SIZE_CODE {
        log::warn!("unsupported sector size code {}, resyncing", id[3]);
        return Ok(None);
    }
    if id[2] == 0 {
        log::warn!("sector numbers are 1-based, got 0, resyncing");
        return Ok(None);
    }
    Ok(Some(SectorId {
        cylinder: id[0],
        head: id[1],
        sector: id[2],
        size_code: id[3],
    }))
}

/// Read the next sector from the reader's cursor position. Returns the
/// 0-based sector number and its 512 data bytes, or None once the stream is
/// exhausted.
pub fn read_sector(reader: &mut MfmReader, cylinder: u8, head: u8) -> Option<(u8, Vec<u8>)> {
    let mut pending: Option<SectorId> = None;

    loop {
        let header = match pending.take() {
            Some(id) => id,
            None => match next_header(reader, cylinder, head) {
                Ok(id) => id,
                Err(_) => return None,
            },
        };

        // The data record must be the next marker. Another header here means
        // the previous sector had no data record; carry on from it.
        let marker = match reader.scan_marker() {
            Ok(m) => m,
            Err(_) => return None,
        };
        if marker != SyncMarker::Sector {
            continue;
        }
        let tag = match reader.read_byte() {
            Ok(t) => t,
            Err(_) => return None,
        };

        match tag {
            HEADER_TAG => {
                match check_header(reader, cylinder, head) {
                    Ok(Some(id)) => pending = Some(id),
                    Ok(None) => {}
                    Err(_) => return None,
                }
                continue;
            }
            DATA_TAG => {}
            _ => continue,
        }

        let mut data = vec![0u8; SECTOR_SIZE];
        for byte in data.iter_mut() {
            match reader.read_byte() {
                Ok(b) => *byte = b,
                Err(_) => return None,
            }
        }
        let crc = match reader.read_u16() {
            Ok(crc) => crc,
            Err(_) => return None,
        };
        let mut expected = crc_ibm_3740(&[DATA_TAG], Some(CRC_SEED_SECTOR_DATA));
        expected = crc_ibm_3740(&data, Some(expected));
        if expected != crc {
            log::warn!("sector {} data CRC mismatch, resyncing", header.sector);
            continue;
        }

        return Some((header.sector - 1, data));
    }
}

/// Position a reader at one of the two candidate half-bit phases. A stream
/// decoded from flux may sit one half-bit off; the short way back into
/// phase is to simply offer both.
fn reader_at_phase(bitcells: &[u8], phase: usize) -> MfmReader {
    let mut reader = MfmReader::new(bitcells);
    for _ in 0..phase {
        let _ = reader.read_half_bit();
    }
    reader
}

/// Extract every recoverable sector of a track, keyed by 0-based sector
/// number. A sector number seen twice keeps the later copy. Both candidate
/// bit phases are scanned; the second only contributes sectors the first
/// missed.
pub fn read_sectors(bitcells: &[u8], cylinder: u8, head: u8) -> BTreeMap<u8, Vec<u8>> {
    let mut sectors: BTreeMap<u8, Vec<u8>> = BTreeMap::new();
    for phase in 0..2 {
        let mut reader = reader_at_phase(bitcells, phase);
        while let Some((sector, data)) = read_sector(&mut reader, cylinder, head) {
            if phase == 0 {
                sectors.insert(sector, data);
            }
            else {
                sectors.entry(sector).or_insert(data);
            }
        }
    }
    sectors
}

/// Count unique sector numbers among the valid headers of a track, across
/// both candidate bit phases.
pub fn count_sectors(bitcells: &[u8], cylinder: u8, head: u8) -> usize {
    let mut seen: BTreeSet<u8> = BTreeSet::new();
    for phase in 0..2 {
        let mut reader = reader_at_phase(bitcells, phase);
        while let Ok(id) = next_header(&mut reader, cylinder, head) {
            seen.insert(id.sector);
        }
    }
    seen.len()
}
