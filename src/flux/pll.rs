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

    src/flux/pll.rs

    The phase-locked loop that turns flux transition intervals into bitcells.

*/

use bit_vec::BitVec;

use crate::{format_us, DataRate};

/// Proportional gain applied to the period on each transition, in percent.
const PERIOD_GAIN_PCT: f64 = 5.0;
/// Share of the residual phase error slammed out after each transition,
/// in percent.
const PHASE_SLAM_PCT: f64 = 60.0;
/// The running period may stray this far from the ideal period.
const PERIOD_CLAMP: f64 = 0.10;
/// Runs of more than this many zero cells switch the loop from fine phase
/// tracking to recentering on the ideal period.
const MAX_CLOCKED_ZEROS: u32 = 3;

/// A software PLL over a stream of flux transition intervals, producing one
/// bit per estimated clock window: 1 when a transition fell inside the
/// window, 0 otherwise. Period and phase corrections are clamped so noise
/// cannot run the clock away.
pub struct Pll {
    period_ideal: f64,
    period: f64,
    /// Flux interval time not yet consumed by clock windows.
    flux: f64,
    /// Total elapsed virtual time, for diagnostics.
    time: f64,
    clocked_zeros: u32,
    starved: bool,
}

impl Pll {
    pub fn new(rate: DataRate) -> Pll {
        let period_ideal = rate.bitcell_ns();
        Pll {
            period_ideal,
            period: period_ideal,
            flux: 0.0,
            time: 0.0,
            clocked_zeros: 0,
            starved: false,
        }
    }

    /// Current clock period in nanoseconds.
    pub fn period(&self) -> f64 {
        self.period
    }

    /// Produce the next bit. Once the source runs dry the loop free-runs,
    /// clocking zeros, with the starved flag raised.
    fn next_bit<I: Iterator<Item = f64>>(&mut self, source: &mut I) -> bool {
        // Pull intervals until a transition lies at or beyond the center of
        // the current window.
        while self.flux < self.period / 2.0 {
            match source.next() {
                Some(interval) => self.flux += interval,
                None => {
                    self.starved = true;
                    self.clocked_zeros += 1;
                    return false;
                }
            }
        }

        self.time += self.period;
        self.flux -= self.period;

        if self.flux >= self.period / 2.0 {
            // The window passed with no transition.
            self.clocked_zeros += 1;
            return false;
        }

        // A transition lies inside this window. Track its phase while the
        // zero run is plausible MFM; recenter on the ideal period otherwise.
        if self.clocked_zeros <= MAX_CLOCKED_ZEROS {
            self.period += self.flux * PERIOD_GAIN_PCT / 100.0;
        }
        else {
            self.period += (self.period_ideal - self.period) * PERIOD_GAIN_PCT / 100.0;
        }
        self.period = self
            .period
            .clamp(self.period_ideal * (1.0 - PERIOD_CLAMP), self.period_ideal * (1.0 + PERIOD_CLAMP));

        // Phase slam: absorb most of the residual offset immediately.
        let new_flux = self.flux * (100.0 - PHASE_SLAM_PCT) / 100.0;
        self.time += self.flux - new_flux;
        self.flux = new_flux;

        self.clocked_zeros = 0;
        true
    }

    /// Decode a full interval stream (nanoseconds) into bits, one per clock
    /// window. The very first bit carries a known half-bit skew and is
    /// discarded; trailing windows clocked after the source ran dry are not
    /// emitted.
    pub fn decode(&mut self, intervals_ns: &[f64]) -> BitVec {
        let mut source = intervals_ns.iter().copied();
        let mut bits = BitVec::with_capacity(intervals_ns.len() * 3);

        self.next_bit(&mut source);

        loop {
            let bit = self.next_bit(&mut source);
            if self.starved {
                break;
            }
            bits.push(bit);
        }

        log::debug!(
            "PLL decoded {} bitcells from {} intervals over {:.3}ms, final period {}",
            bits.len(),
            intervals_ns.len(),
            self.time / 1e6,
            format_us!(self.period)
        );
        bits
    }

    /// Decode an interval stream into an MSB-first packed bitcell buffer.
    pub fn decode_bitcells(&mut self, intervals_ns: &[f64]) -> Vec<u8> {
        self.decode(intervals_ns).to_bytes()
    }
}
