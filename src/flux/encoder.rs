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

    src/flux/encoder.rs

    The inverse of the PLL: bitcells out to flux transition times, extended
    to cover exactly one rotation.

*/

use crate::{DataRate, DiskRpm};

/// Walk every bitcell of a packed buffer, advancing time by one cell per
/// bit, and emit the current time for every set bit. Returns absolute
/// transition times in nanoseconds from the start of the track.
pub fn generate_flux_transitions(bitcells: &[u8], rate: DataRate) -> Vec<f64> {
    let period = rate.bitcell_ns();
    let mut transitions = Vec::with_capacity(bitcells.len() * 3);
    let mut time = 0.0;
    for &byte in bitcells {
        for i in (0..8).rev() {
            time += period;
            if (byte >> i) & 1 != 0 {
                transitions.push(time);
            }
        }
    }
    transitions
}

/// Append trailing transitions at a two-bitcell cadence until the next one
/// would pass the rotation boundary. This emulates the trailing gap so the
/// medium is overwritten all the way through the index.
pub fn cover_full_rotation(transitions: &mut Vec<f64>, rate: DataRate, rpm: DiskRpm) {
    let period = rate.bitcell_ns();
    let rotation = rpm.rotation_ns();
    let mut last = transitions.last().copied().unwrap_or(0.0);
    while last + 2.0 * period <= rotation {
        last += 2.0 * period;
        transitions.push(last);
    }
}

/// Convert absolute transition times into the intervals between them. The
/// first interval is measured from time zero.
pub fn to_intervals(transitions: &[f64]) -> Vec<f64> {
    let mut intervals = Vec::with_capacity(transitions.len());
    let mut last = 0.0;
    for &t in transitions {
        intervals.push(t - last);
        last = t;
    }
    intervals
}
