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

//! # fluxforge
//!
//! fluxforge is a Rust library for reading and writing magnetic floppy
//! diskettes through USB flux-level adapters (Greaseweazle, KryoFlux,
//! SuperCard Pro), and for converting between a canonical in-memory disk
//! model and several disk image container formats.
//!
//! The heart of the library is the flux-to-bitcell pipeline: a phase-locked
//! loop turns noisy flux transition timings into a clocked MFM bitstream,
//! sector framing extracts and validates IBM PC and Amiga sectors from that
//! bitstream, and the inverse pipeline synthesizes a physically faithful
//! flux stream from sector data, padded to cover a full rotation.
//!
//! The main interface is the [`Disk`] object, produced either by a container
//! parser ([`file_parsers`]) or by reading a physical disk through an adapter
//! ([`transfer::read_disk`]), and consumed by the inverse operations.

pub mod adapters;
pub mod bitstream;
pub mod disk;
pub mod drive;
pub mod file_parsers;
pub mod flux;
mod io;
pub mod track_schema;
pub mod transfer;
pub mod util;
pub mod verify;

use std::fmt;
use std::fmt::{Display, Formatter};

use thiserror::Error;

/// All sector payloads handled by the core are 512 bytes.
pub const SECTOR_SIZE: usize = 512;
/// The IBM size code for a 512 byte sector.
pub const SECTOR_SIZE_CODE: u8 = 2;

#[derive(Debug, Error)]
pub enum FloppyError {
    #[error("An IO error occurred reading or writing: {0}")]
    Io(String),
    #[error("Container failed structural validation: {0}")]
    Format(String),
    #[error("Image geometry incompatible with the configured drive: {0}")]
    GeometryMismatch(String),
    #[error("Bit reader ran past the end of the track stream")]
    BitstreamExhausted,
    #[error("CRC mismatch in {0} record")]
    CrcMismatch(&'static str),
    #[error("Sector {sector} missing on cylinder {cylinder} head {head}")]
    MissingSector { cylinder: u8, head: u8, sector: u8 },
    #[error("Adapter reported {code}: {message}")]
    Adapter { code: AdapterStatus, message: String },
    #[error("Verification of cylinder {cylinder} head {head} failed: {reason}")]
    Verify { cylinder: u8, head: u8, reason: String },
}

// Manually implement `From<io::Error>` for `FloppyError`
impl From<io::Error> for FloppyError {
    fn from(err: io::Error) -> Self {
        FloppyError::Io(err.to_string())
    }
}

// Manually implement `From<binrw::Error>` for `FloppyError`
impl From<binrw::Error> for FloppyError {
    fn from(err: binrw::Error) -> Self {
        FloppyError::Format(err.to_string())
    }
}

/// Vendor-reported failure classes, unified across adapter drivers.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AdapterStatus {
    WriteProtected,
    NoTrack0,
    NoIndex,
    NoUnit,
    BusError,
    BadCommand,
    Underflow,
    Overflow,
    Unknown(u8),
}

impl Display for AdapterStatus {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            AdapterStatus::WriteProtected => write!(f, "write protected"),
            AdapterStatus::NoTrack0 => write!(f, "no track 0"),
            AdapterStatus::NoIndex => write!(f, "no index"),
            AdapterStatus::NoUnit => write!(f, "no unit"),
            AdapterStatus::BusError => write!(f, "bus error"),
            AdapterStatus::BadCommand => write!(f, "bad command"),
            AdapterStatus::Underflow => write!(f, "flux underflow"),
            AdapterStatus::Overflow => write!(f, "flux overflow"),
            AdapterStatus::Unknown(code) => write!(f, "unknown status {:02X}", code),
        }
    }
}

/// The base bitcell encoding method of the tracks on a disk.
#[derive(Default, Copy, Clone, Debug, PartialEq, Eq)]
pub enum TrackEncoding {
    #[default]
    #[doc = "IBM PC style MFM. Used by PC, Atari ST and BK-0010 diskettes."]
    IbmMfm,
    #[doc = "Amiga trackdisk MFM with odd/even shuffled long words."]
    AmigaMfm,
    #[doc = "Frequency Modulation encoding. Used by 8&quot; diskettes."]
    Fm,
    Unknown,
}

impl Display for TrackEncoding {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            TrackEncoding::IbmMfm => write!(f, "IBM MFM"),
            TrackEncoding::AmigaMfm => write!(f, "Amiga MFM"),
            TrackEncoding::Fm => write!(f, "FM"),
            TrackEncoding::Unknown => write!(f, "Unknown"),
        }
    }
}

/// The nominal data rate of a track, in kbit/s of decoded data.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum DataRate {
    #[default]
    Rate250Kbps,
    Rate500Kbps,
    Rate1000Kbps,
}

impl DataRate {
    pub fn khz(&self) -> u32 {
        match self {
            DataRate::Rate250Kbps => 250,
            DataRate::Rate500Kbps => 500,
            DataRate::Rate1000Kbps => 1000,
        }
    }

    /// Duration of one bitcell (half-bit window) in nanoseconds.
    pub fn bitcell_ns(&self) -> f64 {
        1_000_000_000.0 / (self.khz() as f64 * 2000.0)
    }
}

impl TryFrom<u32> for DataRate {
    type Error = FloppyError;

    fn try_from(khz: u32) -> Result<Self, Self::Error> {
        match khz {
            250 => Ok(DataRate::Rate250Kbps),
            500 => Ok(DataRate::Rate500Kbps),
            1000 => Ok(DataRate::Rate1000Kbps),
            _ => Err(FloppyError::GeometryMismatch(format!("unsupported bit rate {}kbit/s", khz))),
        }
    }
}

impl Display for DataRate {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}Kbps", self.khz())
    }
}

/// The nominal rotational speed of the disk.
///
/// All PC floppy disk drives typically rotate at 300 RPM, except for high
/// density 5.25" drives which rotate at 360 RPM.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum DiskRpm {
    #[default]
    Rpm300,
    Rpm360,
}

impl DiskRpm {
    pub fn rpm(&self) -> u32 {
        match self {
            DiskRpm::Rpm300 => 300,
            DiskRpm::Rpm360 => 360,
        }
    }

    /// Duration of one full rotation in nanoseconds.
    pub fn rotation_ns(&self) -> f64 {
        60_000_000_000.0 / self.rpm() as f64
    }

    /// Round a measured rotation rate to the nearest nominal speed.
    pub fn from_measured(rpm: f64) -> DiskRpm {
        if rpm < 330.0 {
            DiskRpm::Rpm300
        }
        else {
            DiskRpm::Rpm360
        }
    }
}

impl Display for DiskRpm {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}RPM", self.rpm())
    }
}

/// Floppy bus interface modes, as recorded in HFE headers and used to match
/// an image against a drive.
#[repr(u8)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum InterfaceMode {
    IbmPcDd = 0x00,
    IbmPcHd = 0x01,
    AtariStDd = 0x02,
    AtariStHd = 0x03,
    AmigaDd = 0x04,
    AmigaHd = 0x05,
    CpcDd = 0x06,
    GenericShugartDd = 0x07,
    IbmPcEd = 0x08,
    Msx2Dd = 0x09,
    C64Dd = 0x0A,
    EmuShugart = 0x0B,
    S950Dd = 0x0C,
    S950Hd = 0x0D,
    Disable = 0xFE,
    #[default]
    Unknown = 0xFF,
}

impl From<u8> for InterfaceMode {
    fn from(value: u8) -> Self {
        match value {
            0x00 => InterfaceMode::IbmPcDd,
            0x01 => InterfaceMode::IbmPcHd,
            0x02 => InterfaceMode::AtariStDd,
            0x03 => InterfaceMode::AtariStHd,
            0x04 => InterfaceMode::AmigaDd,
            0x05 => InterfaceMode::AmigaHd,
            0x06 => InterfaceMode::CpcDd,
            0x07 => InterfaceMode::GenericShugartDd,
            0x08 => InterfaceMode::IbmPcEd,
            0x09 => InterfaceMode::Msx2Dd,
            0x0A => InterfaceMode::C64Dd,
            0x0B => InterfaceMode::EmuShugart,
            0x0C => InterfaceMode::S950Dd,
            0x0D => InterfaceMode::S950Hd,
            0xFE => InterfaceMode::Disable,
            _ => InterfaceMode::Unknown,
        }
    }
}

pub use crate::disk::{Disk, DiskHeader, TrackData};
pub use crate::drive::DriveProfile;
pub use crate::file_parsers::{format_from_ext, supported_extensions, DiskImageFileFormat};
pub use crate::flux::FluxCapture;
