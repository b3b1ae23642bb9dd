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

    src/verify.rs

    Read-back verification: compare the sectors decoded from a freshly
    written track against the sectors of the intended bitcells.

*/

use crate::track_schema::TrackSchema;
use crate::FloppyError;

/// Compare a read-back track against the intended bitcells, sector by
/// sector under the given framing. Sector counts must match exactly, and
/// every sector must compare byte for byte.
pub fn verify_track(
    intended: &[u8],
    readback: &[u8],
    schema: TrackSchema,
    cylinder: u8,
    head: u8,
) -> Result<(), FloppyError> {
    let expected = schema.read_sectors(intended, cylinder, head);
    let actual = schema.read_sectors(readback, cylinder, head);

    if expected.len() != actual.len() {
        return Err(FloppyError::Verify {
            cylinder,
            head,
            reason: format!("decoded {} sectors, expected {}", actual.len(), expected.len()),
        });
    }

    for (sector, data) in expected.iter() {
        match actual.get(sector) {
            None => {
                return Err(FloppyError::Verify {
                    cylinder,
                    head,
                    reason: format!("sector {} missing from read-back", sector),
                });
            }
            Some(read) if read != data => {
                let first_bad = data
                    .iter()
                    .zip(read.iter())
                    .position(|(a, b)| a != b)
                    .unwrap_or(data.len());
                return Err(FloppyError::Verify {
                    cylinder,
                    head,
                    reason: format!("sector {} differs from byte {}", sector, first_bad),
                });
            }
            Some(_) => {}
        }
    }

    log::debug!("verified c:{} h:{}: {} sectors match", cylinder, head, expected.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::track_schema::ibm;
    use crate::{DataRate, DiskRpm, SECTOR_SIZE};

    fn track_of(salt: u8) -> Vec<u8> {
        let sectors: Vec<Vec<u8>> = (0..9u8).map(|s| vec![s ^ salt; SECTOR_SIZE]).collect();
        ibm::encode_track(&sectors, 0, 0, DataRate::Rate250Kbps, DiskRpm::Rpm300, true).unwrap()
    }

    #[test]
    fn test_identical_tracks_verify() {
        let track = track_of(0x11);
        assert!(verify_track(&track, &track, TrackSchema::Ibm, 0, 0).is_ok());
    }

    #[test]
    fn test_differing_payload_fails() {
        let good = track_of(0x11);
        let bad = track_of(0x12);
        match verify_track(&good, &bad, TrackSchema::Ibm, 0, 0) {
            Err(FloppyError::Verify { cylinder: 0, head: 0, .. }) => {}
            other => panic!("expected verify failure, got {:?}", other),
        }
    }

    #[test]
    fn test_sniff_selects_framing() {
        let track = track_of(0);
        assert_eq!(TrackSchema::sniff(&track), Some(TrackSchema::Ibm));
        assert_eq!(TrackSchema::sniff(&[0x4E; 2048]), None);
    }
}
