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

    tests/duplication.rs

    End-to-end duplication through the loopback adapter: image to flux to
    medium and back, with verification.

*/

mod common;

use common::{init, LoopbackAdapter};
use fluxforge::adapters::{AdapterInfo, FloppyAdapter, FluxSource};
use fluxforge::file_parsers::raw::RawFormat;
use fluxforge::track_schema::{amiga, ibm, TrackSchema};
use fluxforge::transfer::{erase_disk, read_disk, write_disk};
use fluxforge::{DataRate, Disk, DiskHeader, DiskRpm, DriveProfile, TrackEncoding, SECTOR_SIZE};

fn sector_image(total_sectors: usize, salt: u8) -> Vec<u8> {
    (0..total_sectors * SECTOR_SIZE)
        .map(|i| ((i / SECTOR_SIZE) as u8).wrapping_mul(37) ^ (i as u8) ^ salt)
        .collect()
}

#[test]
fn test_write_verify_read_round_trip() {
    init();

    // A 360K image keeps the test quick while exercising both heads.
    let source = sector_image(720, 0x5C);
    let disk = RawFormat::load_image(&mut std::io::Cursor::new(&source)).unwrap();

    let mut adapter = LoopbackAdapter::new(true);
    let profile = DriveProfile::default();
    write_disk(&mut adapter, &disk, &profile, true).unwrap();
    assert!(!adapter.motor_on, "motor left running after write");
    assert!(adapter.selected.is_none(), "drive left selected after write");

    let readback = read_disk(&mut adapter, &profile, disk.header.cylinders).unwrap();
    assert_eq!(readback.header.bit_rate, DataRate::Rate250Kbps);
    assert_eq!(readback.header.rpm, DiskRpm::Rpm300);
    assert_eq!(readback.header.encoding, TrackEncoding::IbmMfm);
    // One motor spin-up per operation.
    assert_eq!(adapter.motor_cycles, 2);

    let mut out = std::io::Cursor::new(Vec::new());
    RawFormat::save_image(&readback, &mut out).unwrap();
    assert_eq!(out.into_inner(), source);
}

#[test]
fn test_amiga_disk_duplication() {
    init();

    // Two cylinders of Amiga tracks are plenty to prove the framing end to
    // end; a full ADF takes noticeably longer under the PLL.
    let mut disk = Disk::new(DiskHeader {
        cylinders: 2,
        sides: 2,
        encoding: TrackEncoding::AmigaMfm,
        bit_rate: DataRate::Rate250Kbps,
        rpm: DiskRpm::Rpm300,
        ..DiskHeader::default()
    });

    let mut all_sectors = Vec::new();
    for cylinder in 0..2u8 {
        for head in 0..2u8 {
            let track_no = amiga::track_number(cylinder, head);
            let sectors: Vec<Vec<u8>> = (0..amiga::SECTORS_PER_TRACK)
                .map(|s| {
                    (0..SECTOR_SIZE)
                        .map(|i| (i as u8).wrapping_mul(11) ^ (s as u8) ^ track_no)
                        .collect()
                })
                .collect();
            let track =
                amiga::encode_track(&sectors, track_no, DataRate::Rate250Kbps, DiskRpm::Rpm300).unwrap();
            disk.set_track(cylinder, head, track);
            all_sectors.push(sectors);
        }
    }

    let mut adapter = LoopbackAdapter::new(true);
    let profile = DriveProfile::default();
    write_disk(&mut adapter, &disk, &profile, true).unwrap();

    let readback = read_disk(&mut adapter, &profile, 2).unwrap();
    assert_eq!(readback.header.encoding, TrackEncoding::AmigaMfm);

    for cylinder in 0..2u8 {
        for head in 0..2u8 {
            let track_no = amiga::track_number(cylinder, head);
            let decoded = amiga::read_sectors(readback.track(cylinder, head).unwrap(), track_no);
            assert_eq!(decoded.len(), amiga::SECTORS_PER_TRACK);
            let expected = &all_sectors[(cylinder * 2 + head) as usize];
            for (s, data) in expected.iter().enumerate() {
                assert_eq!(&decoded[&(s as u8)], data, "track {} sector {}", track_no, s);
            }
        }
    }
}

#[test]
fn test_erase_removes_sectors() {
    init();

    let source = sector_image(720, 0x0F);
    let disk = RawFormat::load_image(&mut std::io::Cursor::new(&source)).unwrap();

    let mut adapter = LoopbackAdapter::new(false);
    let profile = DriveProfile::default();
    write_disk(&mut adapter, &disk, &profile, false).unwrap();
    erase_disk(&mut adapter, &profile, disk.header.cylinders).unwrap();
    assert!(!adapter.motor_on);

    let readback = read_disk(&mut adapter, &profile, disk.header.cylinders).unwrap();
    for cylinder in 0..disk.header.cylinders {
        for head in 0..2 {
            let track = readback.track(cylinder, head).unwrap();
            assert_eq!(ibm::count_sectors(track, cylinder, head), 0);
        }
    }
}

#[test]
fn test_verify_catches_a_lying_medium() {
    init();

    // An adapter whose writes drop a chunk of flux: verification must fail
    // rather than report success.
    struct DroppyAdapter(LoopbackAdapter);

    impl FluxSource for DroppyAdapter {
        fn sample_freq_hz(&self) -> f64 {
            self.0.sample_freq_hz()
        }

        fn read_track(
            &mut self,
            cylinder: u8,
            head: u8,
            revolutions: u8,
        ) -> Result<fluxforge::FluxCapture, fluxforge::FloppyError> {
            self.0.read_track(cylinder, head, revolutions)
        }
    }

    impl FloppyAdapter for DroppyAdapter {
        fn info(&self) -> &AdapterInfo {
            self.0.info()
        }

        fn select_drive(&mut self, unit: u8) -> Result<(), fluxforge::FloppyError> {
            self.0.select_drive(unit)
        }

        fn deselect_drive(&mut self) -> Result<(), fluxforge::FloppyError> {
            self.0.deselect_drive()
        }

        fn motor(&mut self, on: bool) -> Result<(), fluxforge::FloppyError> {
            self.0.motor(on)
        }

        fn seek(&mut self, cylinder: u8) -> Result<(), fluxforge::FloppyError> {
            self.0.seek(cylinder)
        }

        fn set_head(&mut self, head: u8) -> Result<(), fluxforge::FloppyError> {
            self.0.set_head(head)
        }

        fn write_track(
            &mut self,
            cylinder: u8,
            head: u8,
            intervals: &[u32],
        ) -> Result<(), fluxforge::FloppyError> {
            // Lose the last quarter of every track.
            let keep = intervals.len() * 3 / 4;
            self.0.write_track(cylinder, head, &intervals[..keep])
        }

        fn erase_track(&mut self, cylinder: u8, head: u8, ticks: u32) -> Result<(), fluxforge::FloppyError> {
            self.0.erase_track(cylinder, head, ticks)
        }

        fn status(&mut self) -> Result<(), fluxforge::FloppyError> {
            self.0.status()
        }
    }

    let source = sector_image(720, 0xA0);
    let disk = RawFormat::load_image(&mut std::io::Cursor::new(&source)).unwrap();
    assert_eq!(TrackSchema::sniff(disk.track(0, 0).unwrap()), Some(TrackSchema::Ibm));

    let mut adapter = DroppyAdapter(LoopbackAdapter::new(false));
    let profile = DriveProfile::default();
    match write_disk(&mut adapter, &disk, &profile, true) {
        Err(fluxforge::FloppyError::Verify { .. }) => {}
        other => panic!("expected a verify failure, got {:?}", other),
    }
    // The cleanup path must still have run.
    assert!(!adapter.0.motor_on);
    assert!(adapter.0.selected.is_none());
}
