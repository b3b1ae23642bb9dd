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

    src/transfer.rs

    The disk-level operations: read, write and erase loops over cylinders
    and heads, with motor discipline and read-back verification.

*/

use crate::adapters::{FloppyAdapter, FluxSource};
use crate::disk::{Disk, DiskHeader};
use crate::drive::DriveProfile;
use crate::flux::encoder::{cover_full_rotation, generate_flux_transitions, to_intervals};
use crate::flux::pll::Pll;
use crate::track_schema::TrackSchema;
use crate::verify::verify_track;
use crate::{DataRate, DiskRpm, FloppyError, InterfaceMode, TrackEncoding};

/// A track that fails verification is rewritten this many times before the
/// error is fatal.
pub const MAX_TRACK_RETRIES: u32 = 5;

/// Erase dwell per track, in seconds. Inherited from the legacy tooling;
/// plausibly meant to be per rotation rather than per track. Revisit
/// against hardware before changing it. At real sample clocks the full
/// dwell exceeds a u32 of ticks, so the erase loop issues it in chunks.
pub const ERASE_SECONDS_PER_TRACK: u32 = 200;

/// Revolutions captured per track read: the span between the first and
/// second index pulse is what gets decoded.
const READ_REVOLUTIONS: u8 = 2;

/// Read a whole disk through an adapter into the canonical model. The data
/// rate and rotation speed are measured once on the first track.
pub fn read_disk(
    adapter: &mut dyn FloppyAdapter,
    profile: &DriveProfile,
    cylinders: u8,
) -> Result<Disk, FloppyError> {
    if cylinders > profile.max_cylinders {
        return Err(FloppyError::GeometryMismatch(format!(
            "{} cylinders requested from a {} cylinder drive",
            cylinders, profile.max_cylinders
        )));
    }

    adapter.select_drive(profile.unit)?;
    adapter.motor(true)?;
    let result = read_disk_inner(adapter, profile, cylinders);
    release_drive(adapter);
    result
}

fn read_disk_inner(
    adapter: &mut dyn FloppyAdapter,
    profile: &DriveProfile,
    cylinders: u8,
) -> Result<Disk, FloppyError> {
    let mut disk = Disk::default();
    let mut media: Option<(DataRate, DiskRpm)> = None;

    for cylinder in 0..cylinders {
        for head in 0..profile.heads {
            let capture = adapter.read_track(profile.physical_cylinder(cylinder), head, READ_REVOLUTIONS)?;

            let rate = match media {
                Some((rate, _)) => rate,
                None => {
                    let measured = (capture.estimate_bit_rate()?, capture.estimate_rpm()?);
                    log::info!("media measured as {} at {}", measured.0, measured.1);
                    media = Some(measured);
                    measured.0
                }
            };

            let intervals = capture.revolution_intervals_ns()?;
            let mut pll = Pll::new(rate);
            let bitcells = pll.decode_bitcells(&intervals);
            log::debug!("c:{} h:{}: {} bitcell bytes", cylinder, head, bitcells.len());
            disk.set_track(cylinder, head, bitcells);
        }
    }

    let (rate, rpm) = media.ok_or_else(|| FloppyError::Format("no tracks read".to_string()))?;
    let encoding = disk
        .track(0, 0)
        .ok()
        .and_then(TrackSchema::sniff)
        .map(|schema| match schema {
            TrackSchema::Ibm => TrackEncoding::IbmMfm,
            TrackSchema::Amiga => TrackEncoding::AmigaMfm,
        })
        .unwrap_or(TrackEncoding::Unknown);

    disk.header = DiskHeader {
        cylinders,
        sides: profile.heads,
        encoding,
        bit_rate: rate,
        rpm,
        interface_mode: InterfaceMode::Unknown,
        write_protect: false,
    };
    Ok(disk)
}

/// Write a disk image through an adapter, optionally verifying every track
/// by reading it back and comparing sectors.
pub fn write_disk(
    adapter: &mut dyn FloppyAdapter,
    disk: &Disk,
    profile: &DriveProfile,
    verify: bool,
) -> Result<(), FloppyError> {
    profile.validate(&disk.header)?;

    // Verification mode is sniffed once, from the intended content of
    // track 0 side 0.
    let schema = match (verify, disk.track(0, 0).ok().and_then(TrackSchema::sniff)) {
        (false, _) => None,
        (true, Some(schema)) => Some(schema),
        (true, None) => {
            return Err(FloppyError::Verify {
                cylinder: 0,
                head: 0,
                reason: "no framing recovers sectors from track 0 side 0".to_string(),
            });
        }
    };

    adapter.select_drive(profile.unit)?;
    adapter.motor(true)?;
    let result = write_disk_inner(adapter, disk, profile, schema);
    release_drive(adapter);
    result
}

fn write_disk_inner(
    adapter: &mut dyn FloppyAdapter,
    disk: &Disk,
    profile: &DriveProfile,
    schema: Option<TrackSchema>,
) -> Result<(), FloppyError> {
    let header = &disk.header;

    for cylinder in 0..header.cylinders {
        for head in 0..header.sides {
            let bitcells = disk.track(cylinder, head)?;
            if bitcells.is_empty() {
                log::debug!("c:{} h:{} empty, skipping", cylinder, head);
                continue;
            }

            let mut transitions = generate_flux_transitions(bitcells, header.bit_rate);
            cover_full_rotation(&mut transitions, header.bit_rate, header.rpm);
            let ticks = intervals_to_ticks(&to_intervals(&transitions), adapter.sample_freq_hz());
            let physical = profile.physical_cylinder(cylinder);

            write_track_with_retry(adapter, disk, schema, cylinder, head, physical, &ticks)?;
        }
    }
    Ok(())
}

fn write_track_with_retry(
    adapter: &mut dyn FloppyAdapter,
    disk: &Disk,
    schema: Option<TrackSchema>,
    cylinder: u8,
    head: u8,
    physical: u8,
    ticks: &[u32],
) -> Result<(), FloppyError> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        let outcome = write_track_once(adapter, disk, schema, cylinder, head, physical, ticks);
        match outcome {
            Ok(()) => return Ok(()),
            Err(e @ (FloppyError::Verify { .. } | FloppyError::Adapter { .. })) => {
                if attempt >= MAX_TRACK_RETRIES {
                    log::error!("c:{} h:{} failed after {} attempts", cylinder, head, attempt);
                    return Err(e);
                }
                log::warn!("c:{} h:{} attempt {} failed: {}, retrying", cylinder, head, attempt, e);
            }
            Err(e) => return Err(e),
        }
    }
}

fn write_track_once(
    adapter: &mut dyn FloppyAdapter,
    disk: &Disk,
    schema: Option<TrackSchema>,
    cylinder: u8,
    head: u8,
    physical: u8,
    ticks: &[u32],
) -> Result<(), FloppyError> {
    adapter.write_track(physical, head, ticks)?;

    if let Some(schema) = schema {
        let capture = adapter.read_track(physical, head, READ_REVOLUTIONS)?;
        let intervals = capture.revolution_intervals_ns()?;
        let mut pll = Pll::new(disk.header.bit_rate);
        let readback = pll.decode_bitcells(&intervals);
        verify_track(disk.track(cylinder, head)?, &readback, schema, cylinder, head)?;
    }
    Ok(())
}

/// Demagnetize `cylinders` cylinders on both drive heads.
pub fn erase_disk(
    adapter: &mut dyn FloppyAdapter,
    profile: &DriveProfile,
    cylinders: u8,
) -> Result<(), FloppyError> {
    adapter.select_drive(profile.unit)?;
    adapter.motor(true)?;
    let result = erase_disk_inner(adapter, profile, cylinders);
    release_drive(adapter);
    result
}

fn erase_disk_inner(
    adapter: &mut dyn FloppyAdapter,
    profile: &DriveProfile,
    cylinders: u8,
) -> Result<(), FloppyError> {
    // The full dwell overflows a u32 of ticks on every real adapter clock
    // (72MHz x 200s needs 34 bits), so each track is erased in as many
    // whole commands as the tick argument requires.
    let total_ticks = adapter.sample_freq_hz().round() as u64 * ERASE_SECONDS_PER_TRACK as u64;
    for cylinder in 0..cylinders {
        for head in 0..profile.heads {
            log::debug!("erasing c:{} h:{}", cylinder, head);
            let mut remaining = total_ticks;
            while remaining > 0 {
                let ticks = remaining.min(u32::MAX as u64) as u32;
                adapter.erase_track(profile.physical_cylinder(cylinder), head, ticks)?;
                remaining -= ticks as u64;
            }
        }
    }
    Ok(())
}

/// Convert nanosecond intervals to whole adapter ticks, carrying rounding
/// error forward so the track does not drift.
fn intervals_to_ticks(intervals_ns: &[f64], sample_freq_hz: f64) -> Vec<u32> {
    let ticks_per_ns = sample_freq_hz / 1_000_000_000.0;
    let mut out = Vec::with_capacity(intervals_ns.len());
    let mut carry = 0.0;
    for &ns in intervals_ns {
        let exact = ns * ticks_per_ns + carry;
        let ticks = exact.round().max(1.0);
        carry = exact - ticks;
        out.push(ticks as u32);
    }
    out
}

/// Motor off and deselect on every exit path. Failures here are logged
/// rather than surfaced so the original error wins.
fn release_drive(adapter: &mut dyn FloppyAdapter) {
    if let Err(e) = adapter.motor(false) {
        log::warn!("motor off failed during release: {}", e);
    }
    if let Err(e) = adapter.deselect_drive() {
        log::warn!("drive deselect failed during release: {}", e);
    }
}
