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

    src/bitstream/mfm.rs

    MFM half-bit writer and reader over MSB-first packed byte buffers.

*/

use bit_vec::BitVec;

use crate::FloppyError;

/// Gap fill data byte between sectors and around the index.
pub const GAP_BYTE: u8 = 0x4E;
/// Length of the zero-byte sync run preceding every marker.
pub const SYNC_LEN: usize = 12;

/// The `0xA1` sync byte used by sector header and data markers.
pub const MARKER_BYTE: u8 = 0xA1;
/// The `0xC2` sync byte used by the index marker.
pub const INDEX_MARKER_BYTE: u8 = 0xC2;
/// Tag byte following the index marker run.
pub const INDEX_MARKER_TAG: u8 = 0xFC;

/// Rolling data-bit histories that identify a marker run.
pub const MARKER_HISTORY: u32 = 0x00A1_A1A1;
pub const INDEX_MARKER_HISTORY: u32 = 0x00C2_C2C2;

// Clock half-bits are forced to zero at these data bit positions (MSB-first)
// when a marker byte is written. The resulting run of zero half-bits violates
// the MFM clock rule and can never occur in ordinary data.
const MARKER_VIOLATION_BITS: [usize; 2] = [5, 6];

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SyncMarker {
    /// `A1 A1 A1` run - precedes sector header and data records.
    Sector,
    /// `C2 C2 C2` run - precedes the track index record.
    Index,
}

/// Serializes data bytes into MFM half-bit pairs, MSB-first, capped at a
/// fixed number of half-bits. Writes past the cap are silently discarded;
/// this is the track overrun protection that keeps a formatted track from
/// wrapping over its own start.
pub struct MfmWriter {
    bits: BitVec,
    cap: usize,
    last_data_bit: bool,
}

impl MfmWriter {
    pub fn new(max_half_bits: usize) -> MfmWriter {
        MfmWriter {
            bits: BitVec::with_capacity(max_half_bits),
            cap: max_half_bits,
            last_data_bit: false,
        }
    }

    /// Number of half-bits written so far.
    pub fn len(&self) -> usize {
        self.bits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.cap
    }

    /// Emit a single raw half-bit, bypassing the clock rule.
    pub fn write_half_bit(&mut self, bit: bool) {
        if self.bits.len() < self.cap {
            self.bits.push(bit);
        }
    }

    /// Emit one data bit as a clock/data half-bit pair. A set bit becomes
    /// `(0,1)`; a clear bit becomes `(1,0)` after a clear bit or `(0,0)`
    /// after a set bit, preserving the MFM clock rule.
    pub fn write_bit(&mut self, data: bool) {
        if data {
            self.write_half_bit(false);
            self.write_half_bit(true);
        }
        else {
            self.write_half_bit(!self.last_data_bit);
            self.write_half_bit(false);
        }
        self.last_data_bit = data;
    }

    pub fn write_byte(&mut self, byte: u8) {
        for i in (0..8).rev() {
            self.write_bit((byte >> i) & 1 != 0);
        }
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.write_byte(b);
        }
    }

    /// Emit `count` gap bytes.
    pub fn write_gap(&mut self, count: usize) {
        for _ in 0..count {
            self.write_byte(GAP_BYTE);
        }
    }

    /// Emit one marker byte: the data bits of `byte` with the clock half-bit
    /// forced to a raw zero at the violation positions.
    fn write_marker_byte(&mut self, byte: u8) {
        for i in 0..8 {
            let data = (byte >> (7 - i)) & 1 != 0;
            if MARKER_VIOLATION_BITS.contains(&i) {
                self.write_half_bit(false);
                self.write_half_bit(data);
                self.last_data_bit = data;
            }
            else {
                self.write_bit(data);
            }
        }
    }

    /// Emit a sector marker: 12 zero bytes, three `0xA1` bytes with the
    /// deliberate clock violation, then the tag byte (`0xFE` header, `0xFB`
    /// data).
    pub fn write_marker(&mut self, tag: u8) {
        self.write_bytes(&[0u8; SYNC_LEN]);
        for _ in 0..3 {
            self.write_marker_byte(MARKER_BYTE);
        }
        self.write_byte(tag);
    }

    /// Emit the index marker: 12 zero bytes, three `0xC2` violation bytes,
    /// then `0xFC`.
    pub fn write_index_marker(&mut self) {
        self.write_bytes(&[0u8; SYNC_LEN]);
        for _ in 0..3 {
            self.write_marker_byte(INDEX_MARKER_BYTE);
        }
        self.write_byte(INDEX_MARKER_TAG);
    }

    /// Emit two `0xA1` violation bytes with no third - the short sync run
    /// used by Amiga sector framing.
    pub fn write_short_marker(&mut self) {
        self.write_marker_byte(MARKER_BYTE);
        self.write_marker_byte(MARKER_BYTE);
    }

    /// Pad the remainder of the track with gap bytes, up to the cap.
    pub fn fill_with_gap(&mut self) {
        while self.bits.len() < self.cap {
            self.write_byte(GAP_BYTE);
        }
    }

    /// Pack the written half-bits into MSB-first bytes. A trailing partial
    /// byte is zero filled.
    pub fn into_bytes(self) -> Vec<u8> {
        self.bits.to_bytes()
    }
}

/// Walks a packed bitcell buffer with a half-bit cursor and recovers data
/// bytes and sync markers.
pub struct MfmReader<'a> {
    data: &'a [u8],
    cursor: usize,
    len: usize,
}

impl<'a> MfmReader<'a> {
    pub fn new(data: &'a [u8]) -> MfmReader<'a> {
        MfmReader {
            data,
            cursor: 0,
            len: data.len() * 8,
        }
    }

    /// Current cursor position in half-bits.
    pub fn pos(&self) -> usize {
        self.cursor
    }

    pub fn read_half_bit(&mut self) -> Result<bool, FloppyError> {
        if self.cursor >= self.len {
            return Err(FloppyError::BitstreamExhausted);
        }
        let bit = (self.data[self.cursor >> 3] >> (7 - (self.cursor & 7))) & 1 != 0;
        self.cursor += 1;
        Ok(bit)
    }

    /// Consume a clock/data half-bit pair and return the data half.
    pub fn read_bit(&mut self) -> Result<bool, FloppyError> {
        self.read_half_bit()?;
        self.read_half_bit()
    }

    /// Compose eight data bits (sixteen half-bits) into a byte.
    pub fn read_byte(&mut self) -> Result<u8, FloppyError> {
        let mut byte = 0u8;
        for _ in 0..8 {
            byte = (byte << 1) | self.read_bit()? as u8;
        }
        Ok(byte)
    }

    pub fn read_u16(&mut self) -> Result<u16, FloppyError> {
        Ok(((self.read_byte()? as u16) << 8) | self.read_byte()? as u16)
    }

    pub fn read_u32(&mut self) -> Result<u32, FloppyError> {
        Ok(((self.read_u16()? as u32) << 16) | self.read_u16()? as u32)
    }

    /// Scan forward for the next sync marker, identified purely by the
    /// rolling 32-bit history of data bits. When the history goes all ones
    /// the cursor is off phase, reading clock windows as data; a single
    /// half-bit is consumed to flip the phase.
    pub fn scan_marker(&mut self) -> Result<SyncMarker, FloppyError> {
        let mut history: u32 = 0;
        loop {
            history = (history << 1) | self.read_bit()? as u32;
            match history {
                MARKER_HISTORY => return Ok(SyncMarker::Sector),
                INDEX_MARKER_HISTORY => return Ok(SyncMarker::Index),
                u32::MAX => {
                    self.read_half_bit()?;
                }
                _ => {}
            }
        }
    }

    /// Scan forward until `matches` accepts the rolling data-bit history,
    /// applying the same phase resync rule as [`Self::scan_marker`]. Returns
    /// the matching history value.
    pub fn scan_history<F: Fn(u32) -> bool>(&mut self, matches: F) -> Result<u32, FloppyError> {
        let mut history: u32 = 0;
        loop {
            history = (history << 1) | self.read_bit()? as u32;
            if matches(history) {
                return Ok(history);
            }
            if history == u32::MAX {
                self.read_half_bit()?;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bitcell_doubling() {
        let payload = [0xDEu8, 0xAD, 0xBE, 0xEF, 0x00, 0x4E];
        let mut writer = MfmWriter::new(1024);
        writer.write_bytes(&payload);
        assert_eq!(writer.len(), payload.len() * 8 * 2);
    }

    #[test]
    fn test_byte_round_trip() {
        let payload: Vec<u8> = (0u16..=255).map(|b| b as u8).collect();
        let mut writer = MfmWriter::new(payload.len() * 16);
        writer.write_bytes(&payload);
        let bytes = writer.into_bytes();

        let mut reader = MfmReader::new(&bytes);
        for &expected in payload.iter() {
            assert_eq!(reader.read_byte().unwrap(), expected);
        }
        assert!(matches!(reader.read_byte(), Err(FloppyError::BitstreamExhausted)));
    }

    #[test]
    fn test_cap_discards_overrun() {
        let mut writer = MfmWriter::new(64);
        for _ in 0..100 {
            writer.write_byte(0xFF);
        }
        assert_eq!(writer.len(), 64);
        assert_eq!(writer.into_bytes().len(), 8);
    }

    #[test]
    fn test_marker_recognition() {
        let mut writer = MfmWriter::new(8192);
        writer.write_gap(16);
        writer.write_index_marker();
        writer.write_gap(8);
        writer.write_marker(0xFE);
        writer.write_byte(0x55);
        let bytes = writer.into_bytes();

        let mut reader = MfmReader::new(&bytes);
        assert_eq!(reader.scan_marker().unwrap(), SyncMarker::Index);
        assert_eq!(reader.read_byte().unwrap(), INDEX_MARKER_TAG);
        assert_eq!(reader.scan_marker().unwrap(), SyncMarker::Sector);
        assert_eq!(reader.read_byte().unwrap(), 0xFE);
        assert_eq!(reader.read_byte().unwrap(), 0x55);
    }

    #[test]
    fn test_marker_violates_clock_rule() {
        // The A1 marker byte must not encode to the same half-bits as a
        // normally written A1, or a scanner could never tell gap data from
        // sync.
        let mut normal = MfmWriter::new(64);
        normal.write_byte(MARKER_BYTE);
        let mut marker = MfmWriter::new(64);
        marker.write_marker_byte(MARKER_BYTE);
        assert_ne!(normal.into_bytes(), marker.into_bytes());
    }

    #[test]
    fn test_phase_resync_recovers_marker() {
        let mut writer = MfmWriter::new(8192);
        writer.write_gap(4);
        writer.write_marker(0xFB);
        writer.write_byte(0xA5);
        let bytes = writer.into_bytes();

        // Start the reader one half-bit out of phase. The all-ones history
        // rule must flip it back during the zero sync run.
        let mut reader = MfmReader::new(&bytes);
        reader.read_half_bit().unwrap();
        assert_eq!(reader.scan_marker().unwrap(), SyncMarker::Sector);
        assert_eq!(reader.read_byte().unwrap(), 0xFB);
        assert_eq!(reader.read_byte().unwrap(), 0xA5);
    }
}
