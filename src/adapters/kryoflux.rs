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

    src/adapters/kryoflux.rs

    The KryoFlux stream codec: flux cells interleaved with OOB blocks. The
    same byte stream arrives over the device pipe and sits in `.raw` stream
    files, so one decoder serves both.

*/

use std::time::{Duration, Instant};

use binrw::{binrw, BinRead};
use regex::Regex;

use crate::adapters::FluxSource;
use crate::flux::FluxCapture;
use crate::io::{Cursor, Read};
use crate::FloppyError;

/// Default master clock of the KryoFlux, from which the sample and index
/// clocks derive. KFInfo blocks may override both.
pub const KFX_DEFAULT_MCK: f64 = ((18_432_000.0 * 73.0) / 14.0) / 2.0;
pub const KFX_DEFAULT_SCK: f64 = KFX_DEFAULT_MCK / 2.0;
pub const KFX_DEFAULT_ICK: f64 = KFX_DEFAULT_MCK / 16.0;

/// Stream captures abort after this long in total.
pub const CAPTURE_TIMEOUT: Duration = Duration::from_secs(30);
/// Stream captures abort when the device goes quiet for this long.
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(5);

const OOB: u8 = 0x0D;

enum OobBlock {
    Invalid(u8),
    StreamInfo,
    Index,
    StreamEnd,
    KfInfo,
    Eof,
}

fn oob_block_type(byte: u8) -> OobBlock {
    match byte {
        0x01 => OobBlock::StreamInfo,
        0x02 => OobBlock::Index,
        0x03 => OobBlock::StreamEnd,
        0x04 => OobBlock::KfInfo,
        0x0D => OobBlock::Eof,
        other => OobBlock::Invalid(other),
    }
}

#[derive(Debug)]
#[binrw]
#[brw(little)]
struct OobHeader {
    block_type: u8,
    size: u16,
}

#[derive(Debug)]
#[binrw]
#[brw(little)]
struct IndexBlock {
    stream_pos: u32,
    sample_counter: u32,
    index_counter: u32,
}

#[derive(Debug)]
#[binrw]
#[brw(little)]
struct StreamEndBlock {
    stream_pos: u32,
    hw_status_code: u32,
}

/// A decoded KryoFlux stream: the common capture shape plus the index clock
/// counters the hardware reports alongside.
pub struct KfxStream {
    pub capture: FluxCapture,
    pub sck: f64,
    pub ick: f64,
    pub index_counters: Vec<u32>,
}

impl KfxStream {
    /// Rotation speed from the hardware index counters, which tick at the
    /// index clock independently of the flux stream.
    pub fn rpm(&self) -> Option<f64> {
        if self.index_counters.len() < 2 {
            return None;
        }
        let delta = self.index_counters[1].wrapping_sub(self.index_counters[0]);
        Some(60.0 / (delta as f64 / self.ick))
    }
}

/// Parse the clock info string embedded in KFInfo blocks.
/// ex: 'sck=24027428.5714285, ick=3003428.5714285625'
fn parse_clock_info(s: &str) -> (Option<f64>, Option<f64>) {
    let re = Regex::new(r"sck=(\d+\.?\d*),\s*ick=(\d+\.?\d*)").unwrap();
    match re.captures(s) {
        Some(caps) => {
            let sck = caps.get(1).and_then(|m| m.as_str().parse::<f64>().ok());
            let ick = caps.get(2).and_then(|m| m.as_str().parse::<f64>().ok());
            (sck, ick)
        }
        None => (None, None),
    }
}

/// Decode a complete KryoFlux stream. Cells become tick intervals; Index
/// OOB blocks become tick positions resolved through the stream positions
/// they reference.
pub fn decode_stream(bytes: &[u8]) -> Result<KfxStream, FloppyError> {
    let mut sck = KFX_DEFAULT_SCK;
    let mut ick = KFX_DEFAULT_ICK;

    // Flux cells annotated with the stream position they started at.
    let mut cells: Vec<(u64, u32)> = Vec::with_capacity(bytes.len());
    let mut index_blocks: Vec<IndexBlock> = Vec::new();

    let mut overflow: u32 = 0;
    let mut stream_pos: u64 = 0;
    let mut i: usize = 0;

    while i < bytes.len() {
        let byte = bytes[i];
        match byte {
            0x00..=0x07 => {
                // Flux2: two-byte cell.
                let second = *bytes
                    .get(i + 1)
                    .ok_or_else(|| FloppyError::Format("truncated Flux2 cell".to_string()))?;
                cells.push((stream_pos, overflow + (((byte as u32) << 8) | second as u32)));
                overflow = 0;
                i += 2;
                stream_pos += 2;
            }
            0x08 => {
                // Nop1
                i += 1;
                stream_pos += 1;
            }
            0x09 => {
                // Nop2
                i += 2;
                stream_pos += 2;
            }
            0x0A => {
                // Nop3
                i += 3;
                stream_pos += 3;
            }
            0x0B => {
                // Ovl16
                overflow = overflow.saturating_add(0x10000);
                i += 1;
                stream_pos += 1;
            }
            0x0C => {
                // Flux3: three-byte cell.
                if i + 2 >= bytes.len() {
                    return Err(FloppyError::Format("truncated Flux3 cell".to_string()));
                }
                let value = ((bytes[i + 1] as u32) << 8) | bytes[i + 2] as u32;
                cells.push((stream_pos, overflow + value));
                overflow = 0;
                i += 3;
                stream_pos += 3;
            }
            OOB => {
                // OOB blocks do not advance the stream position.
                if i + 4 > bytes.len() {
                    return Err(FloppyError::Format("truncated OOB header".to_string()));
                }
                let header = OobHeader::read(&mut Cursor::new(&bytes[i + 1..i + 4]))?;
                let payload_start = i + 4;

                match oob_block_type(header.block_type) {
                    OobBlock::Eof => {
                        log::trace!("EOF block");
                        break;
                    }
                    block => {
                        let payload_end = payload_start + header.size as usize;
                        if payload_end > bytes.len() {
                            return Err(FloppyError::Format("truncated OOB payload".to_string()));
                        }
                        let payload = &bytes[payload_start..payload_end];
                        match block {
                            OobBlock::Invalid(t) => {
                                log::error!("invalid OOB block type {:02X}", t);
                            }
                            OobBlock::StreamInfo => {
                                log::trace!("StreamInfo block");
                            }
                            OobBlock::Index => {
                                let ib = IndexBlock::read(&mut Cursor::new(payload))?;
                                log::trace!(
                                    "Index block: stream_pos {} sample_ct {} index_ct {}",
                                    ib.stream_pos,
                                    ib.sample_counter,
                                    ib.index_counter
                                );
                                index_blocks.push(ib);
                            }
                            OobBlock::StreamEnd => {
                                let seb = StreamEndBlock::read(&mut Cursor::new(payload))?;
                                match seb.hw_status_code {
                                    0 => log::trace!("StreamEnd: hardware status OK"),
                                    1 => {
                                        log::error!("stream buffering issue recorded; capture may be corrupt");
                                        return Err(FloppyError::Format(
                                            "KryoFlux reported a buffering fault".to_string(),
                                        ));
                                    }
                                    2 => {
                                        log::error!("no index signal detected during capture");
                                        return Err(FloppyError::Format(
                                            "KryoFlux saw no index signal".to_string(),
                                        ));
                                    }
                                    other => {
                                        log::warn!("unknown hardware status {}", other);
                                    }
                                }
                            }
                            OobBlock::KfInfo => {
                                let text: String = payload
                                    .iter()
                                    .take_while(|&&b| b != 0)
                                    .map(|&b| b as char)
                                    .collect();
                                log::debug!("KFInfo: {}", text);
                                let (sck_opt, ick_opt) = parse_clock_info(&text);
                                if let Some(v) = sck_opt {
                                    sck = v;
                                }
                                if let Some(v) = ick_opt {
                                    ick = v;
                                }
                            }
                            OobBlock::Eof => unreachable!(),
                        }
                        i = payload_end;
                    }
                }
            }
            _ => {
                // Flux1: single byte cell (0x0E..=0xFF).
                cells.push((stream_pos, overflow + byte as u32));
                overflow = 0;
                i += 1;
                stream_pos += 1;
            }
        }
    }

    // Resolve index stream positions to tick positions: an index pulse sits
    // at the cumulative tick count of all cells that started before it.
    let mut index: Vec<u64> = Vec::with_capacity(index_blocks.len());
    for ib in index_blocks.iter() {
        let mut ticks: u64 = 0;
        for &(pos, cell) in cells.iter() {
            if pos >= ib.stream_pos as u64 {
                break;
            }
            ticks += cell as u64;
        }
        index.push(ticks);
    }

    let intervals: Vec<u32> = cells.iter().map(|&(_, cell)| cell).collect();
    log::debug!(
        "KryoFlux stream: {} cells, {} index blocks, sck {:.2}",
        intervals.len(),
        index.len(),
        sck
    );

    Ok(KfxStream {
        capture: FluxCapture {
            intervals,
            index,
            sample_freq_hz: sck,
        },
        sck,
        ick,
        index_counters: index_blocks.iter().map(|ib| ib.index_counter).collect(),
    })
}

/// A read-only flux source over a KryoFlux-framed byte stream (a live
/// device pipe or a stream file). Capture ends at the EOF OOB block, a
/// 30 second absolute timeout, or 5 seconds without data.
pub struct KryoFluxSource<R: Read> {
    stream: R,
}

impl<R: Read> KryoFluxSource<R> {
    pub fn new(stream: R) -> KryoFluxSource<R> {
        KryoFluxSource { stream }
    }

    fn capture_bytes(&mut self) -> Result<Vec<u8>, FloppyError> {
        let start = Instant::now();
        let mut last_data = Instant::now();
        let mut bytes = Vec::with_capacity(1 << 20);
        let mut chunk = [0u8; 4096];

        loop {
            let n = self.stream.read(&mut chunk)?;
            if n == 0 {
                if bytes.len() > 2 {
                    // EOF on a file-backed stream: the capture is complete.
                    break;
                }
                if last_data.elapsed() > IDLE_TIMEOUT {
                    return Err(FloppyError::Io("no data received for 5 seconds".to_string()));
                }
            }
            else {
                bytes.extend_from_slice(&chunk[..n]);
                last_data = Instant::now();
                // [0x0D, 0x0D] heads the EOF OOB block.
                if bytes.len() >= 4 && bytes[bytes.len() - 4..bytes.len() - 2] == [OOB, OOB] {
                    break;
                }
            }
            if start.elapsed() > CAPTURE_TIMEOUT {
                return Err(FloppyError::Io("stream capture timed out after 30 seconds".to_string()));
            }
        }
        Ok(bytes)
    }
}

impl<R: Read> FluxSource for KryoFluxSource<R> {
    fn sample_freq_hz(&self) -> f64 {
        KFX_DEFAULT_SCK
    }

    fn read_track(&mut self, _cylinder: u8, _head: u8, _revolutions: u8) -> Result<FluxCapture, FloppyError> {
        let bytes = self.capture_bytes()?;
        Ok(decode_stream(&bytes)?.capture)
    }
}
