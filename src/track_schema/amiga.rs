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

    src/track_schema/amiga.rs

    Amiga trackdisk MFM sector framing. Long words are split into odd and
    even bit halves before hitting the medium; checksums are XOR sums over
    the shuffled halves.

*/

use std::collections::{BTreeMap, BTreeSet};

use crate::bitstream::{track_half_bits, MfmReader, MfmWriter};
use crate::{DataRate, DiskRpm, FloppyError, SECTOR_SIZE};

/// Sectors per Amiga double density track.
pub const SECTORS_PER_TRACK: usize = 11;
/// Label (OS recovery info) bytes per sector, written as zeros.
pub const LABEL_LEN: usize = 16;

/// Leading gap before the first sector of a track.
const TRACK_GAP: usize = 150;

/// The rolling data-bit history that lands on a sector boundary: two zero
/// bytes of sync, two `A1` marker bytes, then the first byte of the shuffled
/// sector identifier, which always has `0xF` in its high nibble.
const SECTOR_HISTORY_MASK: u32 = 0xFFFF_FFF0;
const SECTOR_HISTORY: u32 = 0x00A1_A1F0;

/// Amiga sectors address tracks, not cylinder/head pairs.
pub fn track_number(cylinder: u8, head: u8) -> u8 {
    cylinder * 2 + head
}

/// Split a long word into its odd half (bits 30, 28, .. 0) and even half
/// (bits 31, 29, .. 1). The odd half is written to the medium first.
pub fn shuffle(word: u32) -> (u16, u16) {
    let mut odd = 0u16;
    let mut even = 0u16;
    for i in 0..16 {
        odd |= (((word >> (2 * i)) & 1) as u16) << i;
        even |= (((word >> (2 * i + 1)) & 1) as u16) << i;
    }
    (odd, even)
}

/// Exact inverse of [`shuffle`].
pub fn unshuffle(odd: u16, even: u16) -> u32 {
    let mut word = 0u32;
    for i in 0..16 {
        word |= (((odd >> i) & 1) as u32) << (2 * i);
        word |= (((even >> i) & 1) as u32) << (2 * i + 1);
    }
    word
}

fn shuffled_word(odd: u16, even: u16) -> u32 {
    ((odd as u32) << 16) | even as u32
}

/// Format one Amiga track of 11 sectors into a bitcell buffer.
pub fn encode_track(
    sectors: &[Vec<u8>],
    track_no: u8,
    rate: DataRate,
    rpm: DiskRpm,
) -> Result<Vec<u8>, FloppyError> {
    if sectors.len() != SECTORS_PER_TRACK {
        return Err(FloppyError::Format(format!(
            "Amiga track {} has {} sectors, expected {}",
            track_no,
            sectors.len(),
            SECTORS_PER_TRACK
        )));
    }

    let mut writer = MfmWriter::new(track_half_bits(rate, rpm));
    writer.write_gap(TRACK_GAP);

    for (s, data) in sectors.iter().enumerate() {
        if data.len() != SECTOR_SIZE {
            return Err(FloppyError::Format(format!(
                "sector {} on track {} has {} bytes, expected {}",
                s,
                track_no,
                data.len(),
                SECTOR_SIZE
            )));
        }

        writer.write_byte(0);
        writer.write_byte(0);
        writer.write_short_marker();

        // Identifier long: 0xFF, track, sector, sectors until the gap.
        let info = 0xFF00_0000 | ((track_no as u32) << 16) | ((s as u32) << 8) | (SECTORS_PER_TRACK - s) as u32;
        let (info_odd, info_even) = shuffle(info);
        writer.write_byte((info_odd >> 8) as u8);
        writer.write_byte(info_odd as u8);
        writer.write_byte((info_even >> 8) as u8);
        writer.write_byte(info_even as u8);

        let header_checksum = shuffled_word(info_odd, info_even);
        for shift in [24, 16, 8, 0] {
            writer.write_byte((header_checksum >> shift) as u8);
        }

        writer.write_bytes(&[0u8; LABEL_LEN]);

        // Shuffle the payload long by long, accumulating the data checksum
        // over the shuffled halves, then write all odd halves followed by
        // all even halves.
        let mut odds = Vec::with_capacity(SECTOR_SIZE / 4);
        let mut evens = Vec::with_capacity(SECTOR_SIZE / 4);
        let mut data_checksum = 0u32;
        for chunk in data.chunks_exact(4) {
            let word = u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
            let (odd, even) = shuffle(word);
            data_checksum ^= shuffled_word(odd, even);
            odds.push(odd);
            evens.push(even);
        }

        for shift in [24, 16, 8, 0] {
            writer.write_byte((data_checksum >> shift) as u8);
        }
        for odd in odds {
            writer.write_byte((odd >> 8) as u8);
            writer.write_byte(odd as u8);
        }
        for even in evens {
            writer.write_byte((even >> 8) as u8);
            writer.write_byte(even as u8);
        }
    }

    writer.fill_with_gap();
    Ok(writer.into_bytes())
}

/// Decoded header of one Amiga sector, before its payload.
struct AmigaHeader {
    sector: u8,
}

fn next_header(reader: &mut MfmReader, track_no: u8) -> Result<AmigaHeader, FloppyError> {
    loop {
        let history = reader.scan_history(|h| h & SECTOR_HISTORY_MASK == SECTOR_HISTORY)?;

        // The matched history already contains the first byte of the
        // shuffled identifier.
        let info_odd = ((history & 0xFF) as u16) << 8 | reader.read_byte()? as u16;
        let info_even = (reader.read_byte()? as u16) << 8 | reader.read_byte()? as u16;
        let header_checksum = reader.read_u32()?;

        if header_checksum != shuffled_word(info_odd, info_even) {
            log::warn!("Amiga header checksum mismatch, resyncing");
            continue;
        }

        let info = unshuffle(info_odd, info_even);
        if info >> 24 != 0xFF {
            log::warn!("Amiga identifier {:08X} has a bad format byte, resyncing", info);
            continue;
        }
        if (info >> 16) & 0xFF != track_no as u32 {
            log::warn!(
                "Amiga identifier addresses track {}, expected {}",
                (info >> 16) & 0xFF,
                track_no
            );
            continue;
        }
        let sector = ((info >> 8) & 0xFF) as u8;
        if sector as usize >= SECTORS_PER_TRACK {
            log::warn!("Amiga sector number {} out of range, resyncing", sector);
            continue;
        }

        return Ok(AmigaHeader { sector });
    }
}

/// Read the next sector from the reader's cursor. Returns the 0-based sector
/// number and payload, or None once the stream is exhausted.
pub fn read_sector(reader: &mut MfmReader, track_no: u8) -> Option<(u8, Vec<u8>)> {
    loop {
        let header = match next_header(reader, track_no) {
            Ok(h) => h,
            Err(_) => return None,
        };

        let mut label = [0u8; LABEL_LEN];
        for byte in label.iter_mut() {
            match reader.read_byte() {
                Ok(b) => *byte = b,
                Err(_) => return None,
            }
        }
        let data_checksum = match reader.read_u32() {
            Ok(v) => v,
            Err(_) => return None,
        };

        // 256 bytes of odd halves, then 256 bytes of even halves.
        let mut odds = [0u16; SECTOR_SIZE / 4];
        let mut evens = [0u16; SECTOR_SIZE / 4];
        let mut failed = false;
        for half in odds.iter_mut().chain(evens.iter_mut()) {
            match reader.read_u16() {
                Ok(v) => *half = v,
                Err(_) => {
                    failed = true;
                    break;
                }
            }
        }
        if failed {
            return None;
        }

        let mut checksum = 0u32;
        let mut data = Vec::with_capacity(SECTOR_SIZE);
        for (&odd, &even) in odds.iter().zip(evens.iter()) {
            checksum ^= shuffled_word(odd, even);
            data.extend_from_slice(&unshuffle(odd, even).to_be_bytes());
        }

        if checksum != data_checksum {
            log::warn!("Amiga sector {} data checksum mismatch, resyncing", header.sector);
            continue;
        }

        return Some((header.sector, data));
    }
}

/// Position a reader at one of the two candidate half-bit phases. The
/// Amiga sync run is only two zero bytes, far too short for the all-ones
/// resync rule to correct a misphased stream before the first sector, so
/// both phases must be offered.
fn reader_at_phase(bitcells: &[u8], phase: usize) -> MfmReader {
    let mut reader = MfmReader::new(bitcells);
    for _ in 0..phase {
        let _ = reader.read_half_bit();
    }
    reader
}

/// Extract every recoverable sector of a track, keyed by 0-based sector
/// number. Both candidate bit phases are scanned; the second only
/// contributes sectors the first missed.
pub fn read_sectors(bitcells: &[u8], track_no: u8) -> BTreeMap<u8, Vec<u8>> {
    let mut sectors: BTreeMap<u8, Vec<u8>> = BTreeMap::new();
    for phase in 0..2 {
        let mut reader = reader_at_phase(bitcells, phase);
        while let Some((sector, data)) = read_sector(&mut reader, track_no) {
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
pub fn count_sectors(bitcells: &[u8], track_no: u8) -> usize {
    let mut seen: BTreeSet<u8> = BTreeSet::new();
    for phase in 0..2 {
        let mut reader = reader_at_phase(bitcells, phase);
        while let Ok(header) = next_header(&mut reader, track_no) {
            seen.insert(header.sector);
        }
    }
    seen.len()
}
