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
*/

//! The `util` module provides the CRC used by IBM sector framing and a few
//! small stream helpers shared by the container parsers.

use crate::io::{Read, Seek, SeekFrom};

/// CRC state after hashing the three `0xA1` sync bytes and the `0xFE` sector
/// header tag, starting from `0xFFFF`.
pub const CRC_SEED_SECTOR_HEADER: u16 = 0xB230;
/// CRC state after hashing the three `0xA1` sync bytes, starting from `0xFFFF`.
/// Data records continue from here with the `0xFB` tag and the payload.
pub const CRC_SEED_SECTOR_DATA: u16 = 0xCDB4;

/// Calculate a 16-bit checksum over a byte slice.
/// Note: previously attributed to CRC-CCITT.
/// See: https://reveng.sourceforge.io/crc-catalogue/16.htm
pub fn crc_ibm_3740(data: &[u8], start: Option<u16>) -> u16 {
    let mut crc: u16 = start.unwrap_or(0xFFFF);
    for &byte in data {
        crc = crc_ibm_3740_byte(byte, crc);
    }
    crc
}

/// Calculate a 16-bit checksum one byte at a time.
/// Note: previously attributed to CRC-CCITT.
/// See: https://reveng.sourceforge.io/crc-catalogue/16.htm
pub fn crc_ibm_3740_byte(byte: u8, crc: u16) -> u16 {
    const POLY: u16 = 0x1021; // Polynomial x^16 + x^12 + x^5 + 1
    let mut crc = crc;

    crc ^= (byte as u16) << 8;
    for _ in 0..8 {
        if (crc & 0x8000) != 0 {
            crc = (crc << 1) ^ POLY;
        }
        else {
            crc <<= 1;
        }
    }
    crc
}

pub(crate) fn get_length<T: Seek>(source: &mut T) -> Result<u64, crate::io::Error> {
    // Seek to the end of the source
    let length = source.seek(SeekFrom::End(0))?;
    // Seek back to the beginning of the source
    source.seek(SeekFrom::Start(0))?;
    Ok(length)
}

pub(crate) fn read_ascii<T: Read>(
    source: &mut T,
    terminator: Option<u8>,
    max_len: Option<usize>,
) -> (Option<String>, u8) {
    let mut string = String::new();
    let byte_iter = source.bytes();
    let terminator = terminator.unwrap_or(0);
    let mut terminating_byte = 0;

    for (i, byte) in byte_iter.enumerate() {
        match byte {
            Ok(b) => {
                if b == terminator || b == 0 {
                    terminating_byte = b;
                    break;
                }
                else if b >= 32 && b.is_ascii() {
                    string.push(b as char);
                }
            }
            Err(_) => return (None, 0),
        }

        if i == max_len.unwrap_or(usize::MAX) {
            break;
        }
    }

    if string.is_empty() {
        (None, terminating_byte)
    }
    else {
        (Some(string), terminating_byte)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc_sync_fixtures() {
        assert_eq!(crc_ibm_3740(&[0xA1, 0xA1, 0xA1], None), CRC_SEED_SECTOR_DATA);
        assert_eq!(crc_ibm_3740(&[0xA1, 0xA1, 0xA1, 0xFE], None), CRC_SEED_SECTOR_HEADER);
    }

    #[test]
    fn test_crc_empty_data_record() {
        // An all-zero 512 byte sector behind the 0xFB data tag.
        let mut record = vec![0xFB];
        record.extend_from_slice(&[0u8; 512]);
        assert_eq!(crc_ibm_3740(&record, Some(CRC_SEED_SECTOR_DATA)), 0xDA6E);

        // Seeding must be equivalent to hashing the full marker prefix.
        let mut full = vec![0xA1, 0xA1, 0xA1];
        full.extend_from_slice(&record);
        assert_eq!(crc_ibm_3740(&full, None), 0xDA6E);
    }

    #[test]
    fn test_crc_byte_matches_slice() {
        let data = [0x12, 0x34, 0x56, 0x78, 0x9A];
        let mut crc = 0xFFFF;
        for &b in data.iter() {
            crc = crc_ibm_3740_byte(b, crc);
        }
        assert_eq!(crc, crc_ibm_3740(&data, None));
    }
}
