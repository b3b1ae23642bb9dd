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

    src/adapters/greaseweazle.rs

    The Greaseweazle driver: the on-the-wire flux codec (1 and 2 byte
    intervals, 0xFF escape ops with N28 operands, 0x00 terminator) and the
    command layer over a generic byte pipe.

*/

use binrw::{binrw, BinRead};

use crate::adapters::{AdapterInfo, FloppyAdapter, FluxSource};
use crate::flux::FluxCapture;
use crate::io::{Read, ReadBytesExt, Write};
use crate::{AdapterStatus, FloppyError};

/// Stream terminator byte.
const STREAM_END: u8 = 0x00;
/// First byte of a two-byte interval record.
const TWO_BYTE_BASE: u8 = 250;
/// Largest interval representable in the two-byte form.
const TWO_BYTE_MAX: u32 = 1524;
/// Escape byte introducing an op record.
const OP_ESCAPE: u8 = 0xFF;
const OP_INDEX: u8 = 1;
const OP_SPACE: u8 = 2;

// Command opcodes, per the mainline firmware protocol.
const CMD_GET_INFO: u8 = 0;
const CMD_SEEK: u8 = 2;
const CMD_HEAD: u8 = 3;
const CMD_MOTOR: u8 = 6;
const CMD_READ_FLUX: u8 = 7;
const CMD_WRITE_FLUX: u8 = 8;
const CMD_GET_FLUX_STATUS: u8 = 9;
const CMD_SELECT: u8 = 12;
const CMD_DESELECT: u8 = 13;
const CMD_ERASE_FLUX: u8 = 17;

const ACK_OKAY: u8 = 0;

/// Encode a 28-bit value as four bytes, bit 0 of each byte set for
/// synchronization robustness.
pub fn n28_encode(value: u32) -> [u8; 4] {
    let mut out = [0u8; 4];
    for (i, byte) in out.iter_mut().enumerate() {
        *byte = 1 | (((value >> (7 * i)) & 0x7F) << 1) as u8;
    }
    out
}

pub fn n28_decode(bytes: [u8; 4]) -> u32 {
    bytes
        .iter()
        .enumerate()
        .fold(0u32, |acc, (i, &b)| acc | (((b >> 1) & 0x7F) as u32) << (7 * i))
}

/// Decode a Greaseweazle flux stream into tick intervals and index pulse
/// positions. The stream must end with the 0x00 terminator.
pub fn decode_flux(bytes: &[u8]) -> Result<(Vec<u32>, Vec<u64>), FloppyError> {
    let mut intervals = Vec::with_capacity(bytes.len());
    let mut index = Vec::new();
    let mut total: u64 = 0;
    let mut accumulated: u32 = 0;

    let mut iter = bytes.iter().copied();
    loop {
        let byte = iter
            .next()
            .ok_or_else(|| FloppyError::Format("flux stream ended without terminator".to_string()))?;
        match byte {
            STREAM_END => break,
            1..=249 => {
                let interval = accumulated + byte as u32;
                total += interval as u64;
                intervals.push(interval);
                accumulated = 0;
            }
            250..=254 => {
                let second = iter
                    .next()
                    .ok_or_else(|| FloppyError::Format("truncated two-byte flux record".to_string()))?;
                let interval =
                    accumulated + 250 + (byte - TWO_BYTE_BASE) as u32 * 255 + second as u32 - 1;
                total += interval as u64;
                intervals.push(interval);
                accumulated = 0;
            }
            OP_ESCAPE => {
                let op = iter
                    .next()
                    .ok_or_else(|| FloppyError::Format("truncated flux op record".to_string()))?;
                let mut operand = [0u8; 4];
                for slot in operand.iter_mut() {
                    *slot = iter
                        .next()
                        .ok_or_else(|| FloppyError::Format("truncated N28 operand".to_string()))?;
                }
                let value = n28_decode(operand);
                match op {
                    // An index pulse at the current time, offset by the
                    // operand's ticks since the last transition. Does not
                    // advance the stream clock.
                    OP_INDEX => index.push(total + accumulated as u64 + value as u64),
                    OP_SPACE => accumulated = accumulated.saturating_add(value),
                    other => {
                        log::warn!("unknown flux op {:02X}, ignoring", other);
                    }
                }
            }
        }
    }

    Ok((intervals, index))
}

/// Encode tick intervals as a Greaseweazle flux stream, terminated with
/// 0x00. Zero-tick intervals are widened to one tick.
pub fn encode_flux(intervals: &[u32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(intervals.len() + 8);
    for &interval in intervals {
        let ticks = interval.max(1);
        if ticks < TWO_BYTE_BASE as u32 {
            out.push(ticks as u8);
        }
        else if ticks <= TWO_BYTE_MAX {
            let spread = ticks - 250;
            out.push(TWO_BYTE_BASE + (spread / 255) as u8);
            out.push((spread % 255 + 1) as u8);
        }
        else {
            // SPACE for the bulk of the interval, then a maximal plain
            // record to carry the transition itself.
            out.push(OP_ESCAPE);
            out.push(OP_SPACE);
            out.extend_from_slice(&n28_encode(ticks - 249));
            out.push(249);
        }
    }
    out.push(STREAM_END);
    out
}

#[derive(Debug)]
#[binrw]
#[brw(little)]
struct InfoRecord {
    fw_major: u8,
    fw_minor: u8,
    is_main_firmware: u8,
    max_cmd: u8,
    sample_freq: u32,
    hw_model: u8,
    hw_submodel: u8,
    usb_speed: u8,
    _reserved: [u8; 21],
}

fn ack_status(code: u8) -> AdapterStatus {
    match code {
        1 => AdapterStatus::BadCommand,
        2 => AdapterStatus::NoIndex,
        3 => AdapterStatus::NoTrack0,
        4 => AdapterStatus::Overflow,
        5 => AdapterStatus::Underflow,
        6 => AdapterStatus::WriteProtected,
        7 => AdapterStatus::NoUnit,
        8 => AdapterStatus::BusError,
        code => AdapterStatus::Unknown(code),
    }
}

/// A Greaseweazle behind any byte pipe (USB CDC serial device, test
/// harness). Commands are fixed-header records `(cmd, len, args...)`
/// answered by a two-byte `(cmd_echo, status)` ACK; flux reads then stream
/// until the 0x00 terminator.
pub struct Greaseweazle<P: Read + Write> {
    port: P,
    info: AdapterInfo,
    current_unit: u8,
}

impl<P: Read + Write> Greaseweazle<P> {
    /// Attach to a device and fetch its info record.
    pub fn open(mut port: P) -> Result<Greaseweazle<P>, FloppyError> {
        send_command(&mut port, CMD_GET_INFO, &[0])?;
        let mut raw = [0u8; 32];
        port.read_exact(&mut raw)?;
        let record = InfoRecord::read(&mut crate::io::Cursor::new(&raw[..]))?;
        log::debug!(
            "Greaseweazle fw {}.{} model {}.{}, {} Hz sample clock",
            record.fw_major,
            record.fw_minor,
            record.hw_model,
            record.hw_submodel,
            record.sample_freq
        );
        let info = AdapterInfo {
            firmware_major: record.fw_major,
            firmware_minor: record.fw_minor,
            sample_freq_hz: record.sample_freq as f64,
            max_command_len: record.max_cmd as usize,
            hardware_model: record.hw_model,
        };
        Ok(Greaseweazle {
            port,
            info,
            current_unit: 0,
        })
    }

    fn command(&mut self, cmd: u8, args: &[u8]) -> Result<(), FloppyError> {
        send_command(&mut self.port, cmd, args)
    }
}

fn send_command<P: Read + Write>(port: &mut P, cmd: u8, args: &[u8]) -> Result<(), FloppyError> {
    let mut frame = Vec::with_capacity(2 + args.len());
    frame.push(cmd);
    frame.push(2 + args.len() as u8);
    frame.extend_from_slice(args);
    port.write_all(&frame)?;

    let echo = port.read_u8()?;
    let status = port.read_u8()?;
    if echo != cmd {
        return Err(FloppyError::Adapter {
            code: AdapterStatus::BadCommand,
            message: format!("command {:02X} echoed as {:02X}", cmd, echo),
        });
    }
    if status != ACK_OKAY {
        return Err(FloppyError::Adapter {
            code: ack_status(status),
            message: format!("command {:02X} failed", cmd),
        });
    }
    Ok(())
}

impl<P: Read + Write> FluxSource for Greaseweazle<P> {
    fn sample_freq_hz(&self) -> f64 {
        self.info.sample_freq_hz
    }

    fn read_track(&mut self, cylinder: u8, head: u8, revolutions: u8) -> Result<FluxCapture, FloppyError> {
        self.seek(cylinder)?;
        self.set_head(head)?;

        // ticks = 0: let the device cue and stop on index pulses alone.
        let mut args = [0u8; 6];
        args[4..6].copy_from_slice(&(revolutions as u16 + 1).to_le_bytes());
        self.command(CMD_READ_FLUX, &args)?;

        let mut stream = Vec::with_capacity(1 << 18);
        loop {
            let byte = self.port.read_u8()?;
            stream.push(byte);
            if byte == STREAM_END {
                break;
            }
            // Op records may legally contain 0x00 operand bytes; skip over
            // them as a unit.
            if byte == OP_ESCAPE {
                let mut op = [0u8; 5];
                self.port.read_exact(&mut op)?;
                stream.extend_from_slice(&op);
            }
        }
        self.command(CMD_GET_FLUX_STATUS, &[])?;

        let (intervals, index) = decode_flux(&stream)?;
        log::debug!(
            "read c:{} h:{}: {} transitions, {} index pulses",
            cylinder,
            head,
            intervals.len(),
            index.len()
        );
        Ok(FluxCapture {
            intervals,
            index,
            sample_freq_hz: self.info.sample_freq_hz,
        })
    }
}

impl<P: Read + Write> FloppyAdapter for Greaseweazle<P> {
    fn info(&self) -> &AdapterInfo {
        &self.info
    }

    fn select_drive(&mut self, unit: u8) -> Result<(), FloppyError> {
        self.current_unit = unit;
        self.command(CMD_SELECT, &[unit])
    }

    fn deselect_drive(&mut self) -> Result<(), FloppyError> {
        self.command(CMD_DESELECT, &[])
    }

    fn motor(&mut self, on: bool) -> Result<(), FloppyError> {
        self.command(CMD_MOTOR, &[self.current_unit, on as u8])
    }

    fn seek(&mut self, cylinder: u8) -> Result<(), FloppyError> {
        self.command(CMD_SEEK, &[cylinder])
    }

    fn set_head(&mut self, head: u8) -> Result<(), FloppyError> {
        self.command(CMD_HEAD, &[head])
    }

    fn write_track(&mut self, cylinder: u8, head: u8, intervals: &[u32]) -> Result<(), FloppyError> {
        self.seek(cylinder)?;
        self.set_head(head)?;

        // cue_at_index, terminate_at_index
        self.command(CMD_WRITE_FLUX, &[1, 1])?;
        let stream = encode_flux(intervals);
        self.port.write_all(&stream)?;
        // The device acknowledges the terminator with a sync byte before
        // the status poll.
        let _sync = self.port.read_u8()?;
        self.command(CMD_GET_FLUX_STATUS, &[])
    }

    fn erase_track(&mut self, cylinder: u8, head: u8, ticks: u32) -> Result<(), FloppyError> {
        self.seek(cylinder)?;
        self.set_head(head)?;
        self.command(CMD_ERASE_FLUX, &ticks.to_le_bytes())?;
        self.command(CMD_GET_FLUX_STATUS, &[])
    }

    fn status(&mut self) -> Result<(), FloppyError> {
        self.command(CMD_GET_FLUX_STATUS, &[])
    }
}
