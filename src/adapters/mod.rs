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

//! Adapter capability traits and the per-vendor drivers.
//!
//! The core deals exclusively in the common flux shape - transition tick
//! intervals plus index pulses ([`FluxCapture`]) - and never sees USB or
//! serial objects. Each driver is generic over a plain byte pipe and is a
//! thin translation between its vendor's wire encoding and that shape.

pub mod greaseweazle;
pub mod kryoflux;
pub mod supercardpro;

use crate::flux::FluxCapture;
use crate::FloppyError;

/// The initial info record every adapter reports on connection. Opaque to
/// the core except for the sample frequency, which drives all tick to
/// nanosecond conversions.
#[derive(Clone, Debug)]
pub struct AdapterInfo {
    pub firmware_major: u8,
    pub firmware_minor: u8,
    pub sample_freq_hz: f64,
    pub max_command_len: usize,
    pub hardware_model: u8,
}

/// Anything that can produce flux captures: a live adapter, or a stream
/// file source replaying a capture.
pub trait FluxSource {
    fn sample_freq_hz(&self) -> f64;

    /// Capture `revolutions` revolutions of the given physical track.
    fn read_track(&mut self, cylinder: u8, head: u8, revolutions: u8) -> Result<FluxCapture, FloppyError>;
}

/// A full read/write floppy adapter. Drive control is deliberately minimal:
/// one drive selected at a time, explicit motor control, and track-at-a-time
/// flux transfer in the adapter's own tick timebase.
pub trait FloppyAdapter: FluxSource {
    fn info(&self) -> &AdapterInfo;

    fn select_drive(&mut self, unit: u8) -> Result<(), FloppyError>;
    fn deselect_drive(&mut self) -> Result<(), FloppyError>;
    fn motor(&mut self, on: bool) -> Result<(), FloppyError>;
    fn seek(&mut self, cylinder: u8) -> Result<(), FloppyError>;
    fn set_head(&mut self, head: u8) -> Result<(), FloppyError>;

    /// Write one track of flux, given as transition tick intervals in this
    /// adapter's timebase. The driver applies its own wire encoding.
    fn write_track(&mut self, cylinder: u8, head: u8, intervals: &[u32]) -> Result<(), FloppyError>;

    /// Demagnetize one track for `ticks` of the adapter timebase.
    fn erase_track(&mut self, cylinder: u8, head: u8, ticks: u32) -> Result<(), FloppyError>;

    /// Poll the device for an out-of-band failure (write protect, missing
    /// index, ...).
    fn status(&mut self) -> Result<(), FloppyError>;
}
