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

    tests/kryoflux.rs

    Loading a KryoFlux stream file set into a disk image.

*/

mod common;

use common::init;
use fluxforge::file_parsers::read_image_file;
use fluxforge::flux::encoder::{cover_full_rotation, generate_flux_transitions, to_intervals};
use fluxforge::track_schema::ibm;
use fluxforge::{DataRate, DiskRpm, TrackEncoding, SECTOR_SIZE};
use std::path::PathBuf;

const SCK: f64 = 24_027_428.571_428_5;

fn oob(block_type: u8, payload: &[u8]) -> Vec<u8> {
    let mut out = vec![0x0D, block_type, payload.len() as u8, (payload.len() >> 8) as u8];
    out.extend_from_slice(payload);
    out
}

fn index_block(stream_pos: u32, index_counter: u32) -> Vec<u8> {
    let mut payload = Vec::new();
    payload.extend_from_slice(&stream_pos.to_le_bytes());
    payload.extend_from_slice(&0u32.to_le_bytes());
    payload.extend_from_slice(&index_counter.to_le_bytes());
    oob(0x02, &payload)
}

/// Wrap one track's bitcells in a two-revolution KryoFlux stream.
fn synthesize_stream(track_bytes: &[u8]) -> Vec<u8> {
    let mut transitions = generate_flux_transitions(track_bytes, DataRate::Rate250Kbps);
    cover_full_rotation(&mut transitions, DataRate::Rate250Kbps, DiskRpm::Rpm300);
    let intervals = to_intervals(&transitions);

    let mut out = Vec::new();
    out.extend_from_slice(&oob(
        0x04,
        b"sck=24027428.5714285, ick=3003428.5714285625\x00",
    ));

    out.extend_from_slice(&index_block(0, 0));
    let mut stream_pos: u32 = 0;
    for rev in 0..2 {
        for &interval_ns in intervals.iter() {
            let ticks = (interval_ns * SCK / 1e9).round() as u32;
            out.push(0x0C);
            out.push((ticks >> 8) as u8);
            out.push(ticks as u8);
            stream_pos += 3;
        }
        out.extend_from_slice(&index_block(stream_pos, (rev + 1) * 600_000));
    }
    out.extend_from_slice(&oob(0x0D, &[]));
    out
}

#[test]
fn test_stream_set_loads_as_disk() {
    init();

    let dir = std::env::temp_dir().join(format!("fluxforge_kfx_{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();

    let mut expected = Vec::new();
    for cylinder in 0..2u8 {
        for head in 0..2u8 {
            let sectors: Vec<Vec<u8>> = (0..9u8)
                .map(|s| {
                    (0..SECTOR_SIZE)
                        .map(|i| (i as u8) ^ s ^ (cylinder * 2 + head))
                        .collect()
                })
                .collect();
            let track =
                ibm::encode_track(&sectors, cylinder, head, DataRate::Rate250Kbps, DiskRpm::Rpm300, true)
                    .unwrap();
            let stream = synthesize_stream(&track);
            let name = format!("track{:02}.{}.raw", cylinder, head);
            std::fs::write(dir.join(name), stream).unwrap();
            expected.push((cylinder, head, sectors));
        }
    }

    let member: PathBuf = dir.join("track00.0.raw");
    let disk = read_image_file(&member).unwrap();

    assert_eq!(disk.header.cylinders, 2);
    assert_eq!(disk.header.sides, 2);
    assert_eq!(disk.header.bit_rate, DataRate::Rate250Kbps);
    assert_eq!(disk.header.rpm, DiskRpm::Rpm300);
    assert_eq!(disk.header.encoding, TrackEncoding::IbmMfm);
    assert!(disk.header.write_protect);

    for (cylinder, head, sectors) in expected {
        let decoded = ibm::read_sectors(disk.track(cylinder, head).unwrap(), cylinder, head);
        assert_eq!(decoded.len(), 9, "c:{} h:{}", cylinder, head);
        for (s, data) in sectors.iter().enumerate() {
            assert_eq!(&decoded[&(s as u8)], data, "c:{} h:{} s:{}", cylinder, head, s);
        }
    }

    std::fs::remove_dir_all(&dir).unwrap();
}
