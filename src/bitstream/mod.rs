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
*/

//! Bit-level primitives over MSB-first packed bitcell buffers.
//!
//! A track is stored as a byte buffer where each bit is one bitcell
//! (a "half-bit" in MFM terms: a clock or data window). [`MfmWriter`]
//! serializes data bytes into clock/data half-bit pairs under the MFM clock
//! rule; [`MfmReader`] walks the buffer with a half-bit cursor and recovers
//! data bytes and sync markers.

pub mod mfm;

pub use mfm::{MfmReader, MfmWriter, SyncMarker};

use crate::{DataRate, DiskRpm};

/// The number of half-bit (bitcell) positions on one track at the given data
/// rate and rotation speed. Writes past this cap are discarded by the writer.
pub fn track_half_bits(rate: DataRate, rpm: DiskRpm) -> usize {
    (rate.khz() as usize * 1000 * 60 / rpm.rpm() as usize) * 2
}

/// Byte length of a packed bitcell buffer holding `track_half_bits` cells.
pub fn track_byte_len(rate: DataRate, rpm: DiskRpm) -> usize {
    (track_half_bits(rate, rpm) + 7) / 8
}
