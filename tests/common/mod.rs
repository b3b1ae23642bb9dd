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

    tests/common/mod.rs

    Common support for the integration tests: a loopback adapter that
    stores written flux and replays it on read, optionally with timing
    jitter, standing in for a drive plus magnetic medium.

*/

use std::collections::HashMap;

use fluxforge::adapters::{AdapterInfo, FloppyAdapter, FluxSource};
use fluxforge::{FloppyError, FluxCapture};

pub fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

const LOOPBACK_SAMPLE_FREQ: f64 = 24_000_000.0;

/// A pretend drive: written tracks are remembered as tick intervals and
/// replayed on read with index pulses at the rotation boundaries. With
/// `jitter` set, each replayed interval is disturbed by a deterministic
/// few-tick wobble, well inside what the PLL must tolerate.
#[allow(dead_code)]
pub struct LoopbackAdapter {
    info: AdapterInfo,
    tracks: HashMap<(u8, u8), Vec<u32>>,
    jitter: bool,
    rng_state: u32,
    pub motor_on: bool,
    pub selected: Option<u8>,
    pub motor_cycles: u32,
}

#[allow(dead_code)]
impl LoopbackAdapter {
    pub fn new(jitter: bool) -> LoopbackAdapter {
        LoopbackAdapter {
            info: AdapterInfo {
                firmware_major: 1,
                firmware_minor: 0,
                sample_freq_hz: LOOPBACK_SAMPLE_FREQ,
                max_command_len: 255,
                hardware_model: 0,
            },
            tracks: HashMap::new(),
            jitter,
            rng_state: 0x1234_5678,
            motor_on: false,
            selected: None,
            motor_cycles: 0,
        }
    }

    fn next_jitter(&mut self) -> i32 {
        self.rng_state = self
            .rng_state
            .wrapping_mul(1_664_525)
            .wrapping_add(1_013_904_223);
        // ±4 ticks at 24MHz is ±167ns, under 17% of even a high density
        // 1000ns bitcell.
        ((self.rng_state >> 16) % 9) as i32 - 4
    }
}

impl FluxSource for LoopbackAdapter {
    fn sample_freq_hz(&self) -> f64 {
        self.info.sample_freq_hz
    }

    fn read_track(&mut self, cylinder: u8, head: u8, revolutions: u8) -> Result<FluxCapture, FloppyError> {
        assert!(self.motor_on, "track read with the motor off");
        let stored = self
            .tracks
            .get(&(cylinder, head))
            .cloned()
            .unwrap_or_default();

        let rotation_ticks: u64 = stored.iter().map(|&t| t as u64).sum::<u64>().max(1);
        let mut intervals = Vec::with_capacity(stored.len() * revolutions as usize);
        let mut index = vec![0u64];
        for rev in 0..revolutions {
            for &ticks in stored.iter() {
                if self.jitter {
                    let jittered = ticks as i64 + self.next_jitter() as i64;
                    intervals.push(jittered.max(1) as u32);
                }
                else {
                    intervals.push(ticks);
                }
            }
            index.push(rotation_ticks * (rev as u64 + 1));
        }

        Ok(FluxCapture {
            intervals,
            index,
            sample_freq_hz: self.info.sample_freq_hz,
        })
    }
}

impl FloppyAdapter for LoopbackAdapter {
    fn info(&self) -> &AdapterInfo {
        &self.info
    }

    fn select_drive(&mut self, unit: u8) -> Result<(), FloppyError> {
        self.selected = Some(unit);
        Ok(())
    }

    fn deselect_drive(&mut self) -> Result<(), FloppyError> {
        self.selected = None;
        Ok(())
    }

    fn motor(&mut self, on: bool) -> Result<(), FloppyError> {
        if on && !self.motor_on {
            self.motor_cycles += 1;
        }
        self.motor_on = on;
        Ok(())
    }

    fn seek(&mut self, _cylinder: u8) -> Result<(), FloppyError> {
        Ok(())
    }

    fn set_head(&mut self, _head: u8) -> Result<(), FloppyError> {
        Ok(())
    }

    fn write_track(&mut self, cylinder: u8, head: u8, intervals: &[u32]) -> Result<(), FloppyError> {
        assert!(self.motor_on, "track write with the motor off");
        self.tracks.insert((cylinder, head), intervals.to_vec());
        Ok(())
    }

    fn erase_track(&mut self, cylinder: u8, head: u8, _ticks: u32) -> Result<(), FloppyError> {
        self.tracks.remove(&(cylinder, head));
        Ok(())
    }

    fn status(&mut self) -> Result<(), FloppyError> {
        Ok(())
    }
}
