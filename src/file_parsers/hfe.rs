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

    src/file_parsers/hfe.rs

    A parser for the HFE v1 and v3 disk image formats.

    HFE images are the internal bitstream format of the HxC floppy emulator.
    Track data interleaves both sides in 256 byte halves of 512 byte blocks,
    and every byte is stored bit-reversed relative to the in-memory MSB-first
    convention (the emulator's PIC streams bytes LSB-first out of its EUSART).
    v3 wraps the bitcells in an opcode stream. v2 is rejected.

*/
use binrw::{binrw, BinRead, BinWrite};

use crate::disk::{Disk, DiskHeader};
use crate::file_parsers::FormatCaps;
use crate::io::{Read, ReadSeek, ReadWriteSeek, Seek, SeekFrom, Write};
use crate::{DataRate, DiskRpm, FloppyError, InterfaceMode, TrackEncoding};

pub const HFE_BLOCK_SIZE: usize = 512;
pub const HFE_V1_SIGNATURE: &[u8; 8] = b"HXCPICFE";
pub const HFE_V3_SIGNATURE: &[u8; 8] = b"HXCHFEV3";

/// v3 opcode bytes. Any track byte with a `0xF` high nibble is an opcode;
/// literal data in that range is escaped by XOR `0x90`, except `0xF4`, which
/// always reads as RAND and doubles as the weak-bit byte.
pub const OP_NOP: u8 = 0xF0;
pub const OP_SETINDEX: u8 = 0xF1;
pub const OP_SETBITRATE: u8 = 0xF2;
pub const OP_SKIPBITS: u8 = 0xF3;
pub const OP_RAND: u8 = 0xF4;

const fn reverse_bits(mut byte: u8) -> u8 {
    byte = (byte >> 4) | (byte << 4);
    byte = ((byte & 0x33) << 2) | ((byte & 0xCC) >> 2);
    byte = ((byte & 0x55) << 1) | ((byte & 0xAA) >> 1);
    byte
}

const fn generate_reverse_table() -> [u8; 256] {
    let mut table = [0; 256];
    let mut i = 0;
    while i < 256 {
        table[i] = reverse_bits(i as u8);
        i += 1;
    }
    table
}

const REVERSE_TABLE: [u8; 256] = generate_reverse_table();

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum HfeVersion {
    V1,
    V3,
}

#[derive(Debug)]
#[binrw]
#[brw(little)]
struct HfeFileHeader {
    signature: [u8; 8],
    format_revision: u8,
    number_of_tracks: u8,
    number_of_sides: u8,
    track_encoding: u8,
    bit_rate: u16, // Bitrate in Kbit/s. Ex : 250=250000bits/s
    rpm: u16,
    interface_mode: u8,
    unused: u8,
    track_list_offset: u16, // Offset of the track list LUT in blocks of 512 bytes
    write_allowed: u8,
    // v1.1 additions - set to 0xFF if unused.
    single_step: u8,
    track0s0_altencoding: u8,
    track0s0_encoding: u8,
    track0s1_altencoding: u8,
    track0s1_encoding: u8,
}

#[derive(Debug)]
#[binrw]
#[brw(little)]
struct HfeTrackIndexEntry {
    offset: u16,
    len: u16,
}

fn encoding_to_tag(encoding: TrackEncoding) -> u8 {
    match encoding {
        TrackEncoding::IbmMfm => 0x00,
        TrackEncoding::AmigaMfm => 0x01,
        TrackEncoding::Fm => 0x02,
        TrackEncoding::Unknown => 0xFF,
    }
}

fn tag_to_encoding(tag: u8) -> TrackEncoding {
    match tag {
        0x00 => TrackEncoding::IbmMfm,
        0x01 => TrackEncoding::AmigaMfm,
        0x02 | 0x03 => TrackEncoding::Fm,
        _ => TrackEncoding::Unknown,
    }
}

/// Weak-bit filler for RAND opcodes. A trivial xorshift is plenty; nothing
/// downstream expects cryptographic quality from media noise.
struct WeakBits(u32);

impl WeakBits {
    fn new() -> WeakBits {
        WeakBits(0x2545_F491)
    }

    fn next_byte(&mut self) -> u8 {
        self.0 ^= self.0 << 13;
        self.0 ^= self.0 >> 17;
        self.0 ^= self.0 << 5;
        self.0 as u8
    }
}

/// Run a v3 opcode stream down to literal bitcell bytes, then rotate the
/// result so that the SETINDEX position becomes bit 0 of the track.
pub fn decode_opcodes(stream: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(stream.len());
    let mut weak = WeakBits::new();
    let mut index_byte: Option<usize> = None;
    let mut index_pending = false;

    let mut iter = stream.iter().copied();
    while let Some(byte) = iter.next() {
        let literal = match byte {
            OP_NOP => continue,
            OP_SETINDEX => {
                index_pending = true;
                continue;
            }
            OP_SETBITRATE => {
                // Consume the bitrate operand; the header already told us.
                iter.next();
                continue;
            }
            OP_SKIPBITS => {
                let skip = iter.next().unwrap_or(0).min(8) as u32;
                let next = iter.next().unwrap_or(0);
                ((next as u32) << skip) as u8
            }
            OP_RAND => weak.next_byte(),
            0xF0..=0xFF => {
                log::warn!("unhandled HFE v3 opcode {:02X}, skipping", byte);
                continue;
            }
            // Escaped literal. 0x64 stays literal data: the writer never
            // escapes 0xF4, so 0x64 has no escaped reading.
            0x60..=0x6F if byte != 0x64 => byte ^ 0x90,
            literal => literal,
        };

        out.push(literal);
        if index_pending {
            index_byte = Some(out.len());
            index_pending = false;
        }
    }

    if let Some(index) = index_byte {
        let len = out.len().max(1);
        out.rotate_left(index % len);
    }
    out
}

/// Escape literal bitcell bytes for a v3 opcode stream.
pub fn encode_opcodes(data: &[u8]) -> Vec<u8> {
    data.iter()
        .map(|&b| match b {
            0xF0..=0xFF if b != OP_RAND => b ^ 0x90,
            other => other,
        })
        .collect()
}

fn v3_bitrate_operand(rate: DataRate) -> u8 {
    (36_000 / rate.khz()) as u8
}

pub struct HfeFormat {}

impl HfeFormat {
    pub fn capabilities() -> FormatCaps {
        FormatCaps::CAP_BITSTREAM | FormatCaps::CAP_WRITE
    }

    pub fn extensions() -> Vec<&'static str> {
        vec!["hfe"]
    }

    pub fn detect<RWS: ReadSeek>(mut image: RWS) -> bool {
        let mut signature = [0u8; 8];
        if image.seek(SeekFrom::Start(0)).is_err() || image.read_exact(&mut signature).is_err() {
            return false;
        }
        &signature == HFE_V1_SIGNATURE || &signature == HFE_V3_SIGNATURE
    }

    pub fn load_image<RWS: ReadSeek>(image: &mut RWS) -> Result<Disk, FloppyError> {
        image.seek(SeekFrom::Start(0))?;
        let file_header = HfeFileHeader::read(image)?;

        let version = match (&file_header.signature, file_header.format_revision) {
            (sig, 0) if sig == HFE_V1_SIGNATURE => HfeVersion::V1,
            (sig, 1) if sig == HFE_V1_SIGNATURE => {
                log::error!("HFE v2 (HXCPICFE revision 1) is not supported");
                return Err(FloppyError::Format("HFE v2 images are not supported".to_string()));
            }
            (sig, 0) if sig == HFE_V3_SIGNATURE => HfeVersion::V3,
            (sig, rev) => {
                return Err(FloppyError::Format(format!(
                    "bad HFE signature {:02X?} revision {}",
                    sig, rev
                )));
            }
        };

        log::debug!(
            "HFE {:?}: {} tracks, {} sides, encoding {:02X}, {} kbit/s, {} rpm",
            version,
            file_header.number_of_tracks,
            file_header.number_of_sides,
            file_header.track_encoding,
            file_header.bit_rate,
            file_header.rpm
        );

        let bit_rate = DataRate::try_from(file_header.bit_rate as u32)?;

        let track_list_offset = file_header.track_list_offset as u64 * HFE_BLOCK_SIZE as u64;
        image.seek(SeekFrom::Start(track_list_offset))?;
        let mut index = Vec::with_capacity(file_header.number_of_tracks as usize);
        for _ in 0..file_header.number_of_tracks {
            index.push(HfeTrackIndexEntry::read(image)?);
        }

        let mut disk = Disk::default();
        for (track_no, entry) in index.iter().enumerate() {
            if entry.len & 1 != 0 {
                log::error!("track {} length {} is odd; sides interleave in pairs", track_no, entry.len);
                return Err(FloppyError::Format(format!("odd track length on track {}", track_no)));
            }

            image.seek(SeekFrom::Start(entry.offset as u64 * HFE_BLOCK_SIZE as u64))?;

            let side_len = entry.len as usize / 2;
            let mut sides: [Vec<u8>; 2] = [Vec::with_capacity(side_len), Vec::with_capacity(side_len)];
            let mut remaining = entry.len as usize;
            while remaining > 0 {
                // Each 512 byte block carries 256 bytes per side; a short
                // final block splits evenly.
                let chunk = if remaining >= HFE_BLOCK_SIZE { 256 } else { remaining / 2 };
                for side in sides.iter_mut() {
                    let mut block = vec![0u8; chunk];
                    image.read_exact(&mut block).map_err(|e| {
                        log::error!("track {} truncated: {}", track_no, e);
                        FloppyError::Format(format!("truncated track {}", track_no))
                    })?;
                    for byte in block.iter_mut() {
                        *byte = REVERSE_TABLE[*byte as usize];
                    }
                    side.extend_from_slice(&block);
                    remaining -= chunk;
                }
            }

            let [side0, side1] = sides;
            let (side0, side1) = match version {
                HfeVersion::V1 => (side0, side1),
                HfeVersion::V3 => (decode_opcodes(&side0), decode_opcodes(&side1)),
            };
            disk.set_track(track_no as u8, 0, side0);
            if file_header.number_of_sides > 1 {
                disk.set_track(track_no as u8, 1, side1);
            }
        }

        // Legacy images sometimes carry a zero RPM field; synthesize the
        // speed from the bitcell count of track 0.
        let rpm = if file_header.rpm == 0 {
            let track0_bits = disk.track(0, 0).map(|t| t.len() * 8).unwrap_or(0);
            if track0_bits == 0 {
                DiskRpm::Rpm300
            }
            else {
                let rpm = (60 * bit_rate.khz() as usize * 2000) as f64 / track0_bits as f64;
                log::debug!("synthesized {:.1} RPM from {} track 0 bitcells", rpm, track0_bits);
                DiskRpm::from_measured(rpm)
            }
        }
        else {
            DiskRpm::from_measured(file_header.rpm as f64)
        };

        disk.header = DiskHeader {
            cylinders: file_header.number_of_tracks,
            sides: file_header.number_of_sides,
            encoding: tag_to_encoding(file_header.track_encoding),
            bit_rate,
            rpm,
            interface_mode: InterfaceMode::from(file_header.interface_mode),
            write_protect: file_header.write_allowed == 0,
        };

        Ok(disk)
    }

    pub fn save_image<RWS: ReadWriteSeek>(disk: &Disk, output: &mut RWS) -> Result<(), FloppyError> {
        Self::save_image_version(disk, output, HfeVersion::V1)
    }

    pub fn save_image_version<RWS: ReadWriteSeek>(
        disk: &Disk,
        output: &mut RWS,
        version: HfeVersion,
    ) -> Result<(), FloppyError> {
        let header = &disk.header;
        let signature = match version {
            HfeVersion::V1 => HFE_V1_SIGNATURE,
            HfeVersion::V3 => HFE_V3_SIGNATURE,
        };

        let file_header = HfeFileHeader {
            signature: *signature,
            format_revision: 0,
            number_of_tracks: disk.tracks.len() as u8,
            number_of_sides: header.sides,
            track_encoding: encoding_to_tag(header.encoding),
            bit_rate: header.bit_rate.khz() as u16,
            rpm: header.rpm.rpm() as u16,
            interface_mode: header.interface_mode as u8,
            unused: 0xFF,
            track_list_offset: 1,
            write_allowed: if header.write_protect { 0x00 } else { 0xFF },
            single_step: 0xFF,
            track0s0_altencoding: 0xFF,
            track0s0_encoding: 0xFF,
            track0s1_altencoding: 0xFF,
            track0s1_encoding: 0xFF,
        };

        if disk.tracks.len() > HFE_BLOCK_SIZE / 4 {
            return Err(FloppyError::Format(format!(
                "{} tracks exceed the single-block HFE track list",
                disk.tracks.len()
            )));
        }

        // Block 0: header, padded with 0xFF.
        output.seek(SeekFrom::Start(0))?;
        file_header.write(output)?;
        let header_len = output.stream_position()? as usize;
        pad(output, HFE_BLOCK_SIZE - header_len, 0xFF)?;

        // Prepare per-track side payloads.
        let mut payloads: Vec<[Vec<u8>; 2]> = Vec::with_capacity(disk.tracks.len());
        for track in disk.tracks.iter() {
            let mut side0 = track.side0.clone();
            let mut side1 = track.side1.clone();
            if let HfeVersion::V3 = version {
                side0 = v3_side_payload(&side0, header.bit_rate);
                side1 = v3_side_payload(&side1, header.bit_rate);
            }
            payloads.push([side0, side1]);
        }

        // Block 1: the track index. Track data starts at block 2; each track
        // occupies round_up(max(side) * 2, 512) bytes.
        let pad_byte = match version {
            HfeVersion::V1 => 0xFF,
            HfeVersion::V3 => OP_NOP,
        };
        let mut entries = Vec::with_capacity(payloads.len());
        let mut next_block: u16 = 2;
        for (track_no, sides) in payloads.iter().enumerate() {
            let side_len = sides[0].len().max(sides[1].len());
            let track_len = side_len * 2;
            if track_len > u16::MAX as usize {
                return Err(FloppyError::Format(format!(
                    "track {} is {} interleaved bytes, past the u16 HFE track length",
                    track_no, track_len
                )));
            }
            let blocks = track_len.div_ceil(HFE_BLOCK_SIZE);
            entries.push(HfeTrackIndexEntry {
                offset: next_block,
                len: track_len as u16,
            });
            next_block += blocks as u16;
        }
        for entry in entries.iter() {
            entry.write(output)?;
        }
        pad(output, HFE_BLOCK_SIZE - entries.len() * 4, 0xFF)?;

        // Track data blocks: 256 bytes of each side per block, bit-reversed,
        // sides padded to the block grid.
        for sides in payloads.iter() {
            let side_len = sides[0].len().max(sides[1].len());
            let padded_len = (side_len * 2).div_ceil(HFE_BLOCK_SIZE) * HFE_BLOCK_SIZE / 2;
            for offset in (0..padded_len).step_by(256) {
                for side in sides.iter() {
                    let mut block = [pad_byte; 256];
                    for (i, slot) in block.iter_mut().enumerate() {
                        if let Some(&b) = side.get(offset + i) {
                            *slot = b;
                        }
                    }
                    for byte in block.iter_mut() {
                        *byte = REVERSE_TABLE[*byte as usize];
                    }
                    output.write_all(&block)?;
                }
            }
        }

        Ok(())
    }
}

/// Wrap one side's bitcells in a v3 opcode prologue and escape the literals.
fn v3_side_payload(bitcells: &[u8], rate: DataRate) -> Vec<u8> {
    if bitcells.is_empty() {
        return Vec::new();
    }
    let mut payload = Vec::with_capacity(bitcells.len() + 3);
    payload.push(OP_SETINDEX);
    payload.push(OP_SETBITRATE);
    payload.push(v3_bitrate_operand(rate));
    payload.extend(encode_opcodes(bitcells));
    payload
}

fn pad<W: Write>(output: &mut W, count: usize, byte: u8) -> Result<(), FloppyError> {
    output.write_all(&vec![byte; count])?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn simple_reverse_bits(byte: u8) -> u8 {
        let mut reversed = 0;
        for i in 0..8 {
            reversed |= ((byte >> i) & 1) << (7 - i);
        }
        reversed
    }

    #[test]
    fn test_generate_reverse_table() {
        let table = generate_reverse_table();
        for i in 0..256 {
            assert_eq!(table[i], simple_reverse_bits(i as u8), "Failed at index {}", i);
        }
    }

    #[test]
    fn test_setindex_rotation() {
        // The rotation origin lands after the byte following SETINDEX.
        let decoded = decode_opcodes(&[OP_SETINDEX, 0xAA, 0x55, 0x33]);
        assert_eq!(decoded, vec![0x55, 0x33, 0xAA]);
    }

    #[test]
    fn test_setbitrate_consumes_operand() {
        let decoded = decode_opcodes(&[OP_SETBITRATE, 0x64, 0xAA, 0x55]);
        assert_eq!(decoded, vec![0xAA, 0x55]);
    }

    #[test]
    fn test_skipbits() {
        for skip in 0u8..=8 {
            let decoded = decode_opcodes(&[OP_SKIPBITS, skip, 0xFF]);
            assert_eq!(decoded, vec![((0xFFu32) << skip) as u8], "skip {}", skip);
        }
    }

    #[test]
    fn test_escape_invariant() {
        // Every non-opcode stream byte survives a decode/encode cycle.
        for b in 0u16..0xF0 {
            let b = b as u8;
            let decoded = decode_opcodes(&[OP_SETBITRATE, 0, b]);
            assert_eq!(encode_opcodes(&decoded), vec![b], "byte {:02X}", b);
        }
        // Escaped literals decode to the 0xF0 range and re-escape.
        for b in 0xF0u16..=0xFF {
            let b = b as u8;
            if b == OP_RAND {
                continue;
            }
            assert_eq!(encode_opcodes(&[b]), vec![b ^ 0x90]);
            assert_eq!(decode_opcodes(&[b ^ 0x90]), vec![b]);
        }
    }

    #[test]
    fn test_nop_and_rand() {
        let decoded = decode_opcodes(&[OP_NOP, 0x11, OP_NOP, OP_NOP, 0x22]);
        assert_eq!(decoded, vec![0x11, 0x22]);
        // RAND emits one byte of noise; its value is unspecified.
        assert_eq!(decode_opcodes(&[OP_RAND, 0x42]).len(), 2);
    }
}
