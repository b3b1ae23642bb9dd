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

    src/adapters/supercardpro.rs

    The SuperCard Pro driver: flux as a big-endian u16 stream in 25 ns
    units with 0x0000 overflow markers, a checksummed packet transport, and
    RAM-buffered track transfers.

*/

use binrw::{binrw, BinRead};

use crate::adapters::{AdapterInfo, FloppyAdapter, FluxSource};
use crate::flux::FluxCapture;
use crate::io::{Cursor, Read, ReadBytesExt, Write};
use crate::{AdapterStatus, FloppyError};

/// One flux tick is 25 ns (40 MHz capture clock).
pub const TICK_NS: u32 = 25;
pub const SAMPLE_FREQ_HZ: f64 = 1_000_000_000.0 / TICK_NS as f64;

/// Packet checksum basis: 0x4A plus the sum of all prior packet bytes.
pub const CHECKSUM_INIT: u8 = 0x4A;
/// Status byte for a successful command.
pub const STATUS_OK: u8 = 0x4F;

/// Each revolution's capture is bounded to 512 KiB of RAM.
pub const REVOLUTION_CAPTURE_LIMIT: usize = 512 * 1024;

// Command opcodes.
const CMD_SELECT_A: u8 = 0x80;
const CMD_DESELECT_A: u8 = 0x82;
const CMD_MOTOR_A_ON: u8 = 0x84;
const CMD_MOTOR_A_OFF: u8 = 0x86;
const CMD_STEP_TO: u8 = 0x89;
const CMD_SIDE: u8 = 0x8E;
const CMD_STATUS: u8 = 0x8F;
const CMD_READ_FLUX: u8 = 0xA8;
const CMD_GET_FLUX_INFO: u8 = 0xA9;
const CMD_WRITE_FLUX: u8 = 0xAA;
const CMD_SEND_RAM: u8 = 0xAB;
const CMD_LOAD_RAM: u8 = 0xAC;
const CMD_SCP_INFO: u8 = 0xD0;

/// Additive packet checksum over the command byte, length and payload.
pub fn packet_checksum(bytes: &[u8]) -> u8 {
    bytes
        .iter()
        .fold(CHECKSUM_INIT, |acc, &b| acc.wrapping_add(b))
}

/// Frame a command packet: `[cmd, len, payload.., checksum]`.
pub fn packet(cmd: u8, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 3);
    out.push(cmd);
    out.push(payload.len() as u8);
    out.extend_from_slice(payload);
    out.push(packet_checksum(&out));
    out
}

/// Decode the big-endian u16 flux stream into tick intervals. A 0x0000
/// word adds 0x10000 ticks to the next interval.
pub fn decode_flux(bytes: &[u8]) -> Vec<u32> {
    let mut intervals = Vec::with_capacity(bytes.len() / 2);
    let mut overflow: u32 = 0;
    for pair in bytes.chunks_exact(2) {
        let word = u16::from_be_bytes([pair[0], pair[1]]);
        if word == 0 {
            overflow += 0x10000;
        }
        else {
            intervals.push(overflow + word as u32);
            overflow = 0;
        }
    }
    intervals
}

/// Encode tick intervals as the big-endian u16 stream. An interval that is
/// an exact multiple of 0x10000 gains one tick: a bare 0x0000 word would
/// read back as an overflow marker.
pub fn encode_flux(intervals: &[u32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(intervals.len() * 2);
    for &interval in intervals {
        let mut ticks = interval.max(1);
        while ticks > 0xFFFF {
            out.extend_from_slice(&[0, 0]);
            ticks -= 0x10000;
        }
        if ticks == 0 {
            ticks = 1;
        }
        out.extend_from_slice(&(ticks as u16).to_be_bytes());
    }
    out
}

/// One revolution record of the 40-byte flux info block.
#[derive(Debug)]
#[binrw]
#[brw(big)]
pub struct RevolutionEntry {
    pub index_time: u32,
    pub bitcell_count: u32,
}

impl RevolutionEntry {
    /// Duration of this revolution in nanoseconds.
    pub fn rotation_ns(&self) -> u64 {
        self.index_time as u64 * TICK_NS as u64
    }
}

/// A SuperCard Pro behind any byte pipe. Every command is a checksummed
/// packet answered by `[cmd_echo, status]`; bulk flux moves through the
/// device RAM with explicit transfer commands.
pub struct SuperCardPro<P: Read + Write> {
    port: P,
    info: AdapterInfo,
}

impl<P: Read + Write> SuperCardPro<P> {
    pub fn open(mut port: P) -> Result<SuperCardPro<P>, FloppyError> {
        exchange(&mut port, CMD_SCP_INFO, &[])?;
        let hardware = port.read_u8()?;
        let firmware = port.read_u8()?;
        let info = AdapterInfo {
            firmware_major: firmware >> 4,
            firmware_minor: firmware & 0x0F,
            sample_freq_hz: SAMPLE_FREQ_HZ,
            max_command_len: 255,
            hardware_model: hardware,
        };
        log::debug!(
            "SuperCard Pro hw {}.{} fw {}.{}",
            hardware >> 4,
            hardware & 0x0F,
            info.firmware_major,
            info.firmware_minor
        );
        Ok(SuperCardPro { port, info })
    }

    fn command(&mut self, cmd: u8, payload: &[u8]) -> Result<(), FloppyError> {
        exchange(&mut self.port, cmd, payload)
    }

    /// Pull `len` bytes of device RAM.
    fn read_ram(&mut self, offset: u32, len: u32) -> Result<Vec<u8>, FloppyError> {
        let mut payload = Vec::with_capacity(8);
        payload.extend_from_slice(&offset.to_be_bytes());
        payload.extend_from_slice(&len.to_be_bytes());
        self.command(CMD_SEND_RAM, &payload)?;

        let mut data = vec![0u8; len as usize];
        self.port.read_exact(&mut data)?;
        Ok(data)
    }
}

fn exchange<P: Read + Write>(port: &mut P, cmd: u8, payload: &[u8]) -> Result<(), FloppyError> {
    port.write_all(&packet(cmd, payload))?;

    let echo = port.read_u8()?;
    let status = port.read_u8()?;
    if echo != cmd {
        return Err(FloppyError::Adapter {
            code: AdapterStatus::BadCommand,
            message: format!("command {:02X} echoed as {:02X}", cmd, echo),
        });
    }
    if status != STATUS_OK {
        let code = match status {
            0x01 => AdapterStatus::BadCommand,
            0x05 => AdapterStatus::NoTrack0,
            0x08 => AdapterStatus::NoIndex,
            0x0A => AdapterStatus::WriteProtected,
            other => AdapterStatus::Unknown(other),
        };
        return Err(FloppyError::Adapter {
            code,
            message: format!("command {:02X} failed with status {:02X}", cmd, status),
        });
    }
    Ok(())
}

impl<P: Read + Write> FluxSource for SuperCardPro<P> {
    fn sample_freq_hz(&self) -> f64 {
        SAMPLE_FREQ_HZ
    }

    fn read_track(&mut self, cylinder: u8, head: u8, revolutions: u8) -> Result<FluxCapture, FloppyError> {
        self.seek(cylinder)?;
        self.set_head(head)?;

        self.command(CMD_READ_FLUX, &[revolutions, 0x01])?;

        // Five (index_time, bitcell_count) records describe the capture.
        self.command(CMD_GET_FLUX_INFO, &[])?;
        let mut info_block = [0u8; 40];
        self.port.read_exact(&mut info_block)?;
        let mut cursor = Cursor::new(&info_block[..]);
        let mut entries = Vec::with_capacity(5);
        for _ in 0..5 {
            entries.push(RevolutionEntry::read(&mut cursor)?);
        }

        let mut intervals = Vec::new();
        let mut index = Vec::with_capacity(revolutions as usize + 1);
        let mut offset: u32 = 0;
        let mut index_ticks: u64 = 0;
        index.push(0);
        for entry in entries.iter().take(revolutions as usize) {
            if entry.bitcell_count == 0 {
                continue;
            }
            let byte_len = (entry.bitcell_count * 2).min(REVOLUTION_CAPTURE_LIMIT as u32);
            let data = self.read_ram(offset, byte_len)?;
            intervals.extend(decode_flux(&data));
            offset += byte_len;
            index_ticks += entry.index_time as u64;
            index.push(index_ticks);
        }

        log::debug!(
            "read c:{} h:{}: {} transitions over {} revolutions",
            cylinder,
            head,
            intervals.len(),
            revolutions
        );
        Ok(FluxCapture {
            intervals,
            index,
            sample_freq_hz: SAMPLE_FREQ_HZ,
        })
    }
}

impl<P: Read + Write> FloppyAdapter for SuperCardPro<P> {
    fn info(&self) -> &AdapterInfo {
        &self.info
    }

    fn select_drive(&mut self, _unit: u8) -> Result<(), FloppyError> {
        self.command(CMD_SELECT_A, &[])
    }

    fn deselect_drive(&mut self) -> Result<(), FloppyError> {
        self.command(CMD_DESELECT_A, &[])
    }

    fn motor(&mut self, on: bool) -> Result<(), FloppyError> {
        self.command(if on { CMD_MOTOR_A_ON } else { CMD_MOTOR_A_OFF }, &[])
    }

    fn seek(&mut self, cylinder: u8) -> Result<(), FloppyError> {
        self.command(CMD_STEP_TO, &[cylinder])
    }

    fn set_head(&mut self, head: u8) -> Result<(), FloppyError> {
        self.command(CMD_SIDE, &[head])
    }

    fn write_track(&mut self, cylinder: u8, head: u8, intervals: &[u32]) -> Result<(), FloppyError> {
        self.seek(cylinder)?;
        self.set_head(head)?;

        let data = encode_flux(intervals);
        let mut payload = Vec::with_capacity(8);
        payload.extend_from_slice(&0u32.to_be_bytes());
        payload.extend_from_slice(&(data.len() as u32).to_be_bytes());
        self.command(CMD_LOAD_RAM, &payload)?;
        self.port.write_all(&data)?;

        let word_count = (data.len() / 2) as u32;
        let mut payload = Vec::with_capacity(5);
        payload.extend_from_slice(&word_count.to_be_bytes());
        payload.push(0x01); // wait for index before writing
        self.command(CMD_WRITE_FLUX, &payload)
    }

    fn erase_track(&mut self, cylinder: u8, head: u8, ticks: u32) -> Result<(), FloppyError> {
        // The SCP has no dedicated erase: write a transition-free stream of
        // maximal intervals covering the requested duration.
        let intervals = vec![0xFFFF_u32; (ticks / 0xFFFF + 1) as usize];
        self.write_track(cylinder, head, &intervals)
    }

    fn status(&mut self) -> Result<(), FloppyError> {
        self.command(CMD_STATUS, &[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packet_checksum() {
        // Empty payload: checksum covers cmd and len.
        let p = packet(0x8F, &[]);
        assert_eq!(p, vec![0x8F, 0x00, 0x4Au8.wrapping_add(0x8F)]);

        let p = packet(0x89, &[5]);
        assert_eq!(p[3], 0x4Au8.wrapping_add(0x89).wrapping_add(1).wrapping_add(5));
    }

    #[test]
    fn test_flux_codec_round_trip() {
        let intervals = vec![80u32, 2000, 0xFFFF, 0x10001, 0x2ABCD, 1];
        assert_eq!(decode_flux(&encode_flux(&intervals)), intervals);
    }

    #[test]
    fn test_exact_overflow_multiple_gains_one_tick() {
        // 0x10000 cannot be written exactly: a trailing 0x0000 would read
        // back as an overflow marker, so the encoder adds one tick.
        let encoded = encode_flux(&[0x10000]);
        assert_eq!(encoded, vec![0, 0, 0, 1]);
        assert_eq!(decode_flux(&encoded), vec![0x10001]);
    }

    #[test]
    fn test_zero_floors_to_one_tick() {
        assert_eq!(decode_flux(&encode_flux(&[0])), vec![1]);
    }

    #[test]
    fn test_revolution_entry_duration() {
        let entry = RevolutionEntry {
            index_time: 8_000_000,
            bitcell_count: 50_000,
        };
        // 8M ticks at 25ns = 200ms = one 300 RPM rotation.
        assert_eq!(entry.rotation_ns(), 200_000_000);
    }
}
