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

//! Disk image container parsers and the extension dispatch that selects
//! them. Dispatch by extension is fixed and case-insensitive; content
//! detection is available as a fallback for unlabeled files.

pub mod adf;
pub mod bkd;
pub mod hfe;
pub mod imd;
pub mod kryoflux;
pub mod raw;

use std::path::Path;

use bitflags::bitflags;
use strum::{EnumIter, IntoEnumIterator};

use crate::disk::Disk;
use crate::io::{ReadSeek, ReadWriteSeek};
use crate::FloppyError;

bitflags! {
    /// Capabilities of an image format, used by dispatch and the CLI to
    /// filter candidate formats.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    #[rustfmt::skip]
    pub struct FormatCaps: u32 {
        const CAP_BITSTREAM = 0b0000_0001; // Stores raw bitcell streams
        const CAP_SECTOR    = 0b0000_0010; // Stores decoded sectors
        const CAP_FLUX      = 0b0000_0100; // Stores flux-level captures
        const CAP_AMIGA     = 0b0000_1000; // Amiga track framing
        const CAP_WRITE     = 0b0001_0000; // Format can be written
    }
}

/// Every container format the library understands.
#[derive(Copy, Clone, Debug, PartialEq, Eq, EnumIter)]
pub enum DiskImageFileFormat {
    HfeImage,
    RawSectorImage,
    AmigaDiskFile,
    BkdImage,
    ImageDisk,
    KryofluxStream,
}

impl DiskImageFileFormat {
    pub fn capabilities(&self) -> FormatCaps {
        match self {
            DiskImageFileFormat::HfeImage => hfe::HfeFormat::capabilities(),
            DiskImageFileFormat::RawSectorImage => raw::RawFormat::capabilities(),
            DiskImageFileFormat::AmigaDiskFile => adf::AdfFormat::capabilities(),
            DiskImageFileFormat::BkdImage => bkd::BkdFormat::capabilities(),
            DiskImageFileFormat::ImageDisk => imd::ImdFormat::capabilities(),
            DiskImageFileFormat::KryofluxStream => kryoflux::KfxFormat::capabilities(),
        }
    }

    pub fn extensions(&self) -> Vec<&'static str> {
        match self {
            DiskImageFileFormat::HfeImage => hfe::HfeFormat::extensions(),
            DiskImageFileFormat::RawSectorImage => raw::RawFormat::extensions(),
            DiskImageFileFormat::AmigaDiskFile => adf::AdfFormat::extensions(),
            DiskImageFileFormat::BkdImage => bkd::BkdFormat::extensions(),
            DiskImageFileFormat::ImageDisk => imd::ImdFormat::extensions(),
            DiskImageFileFormat::KryofluxStream => kryoflux::KfxFormat::extensions(),
        }
    }

    pub fn detect<RWS: ReadSeek>(&self, image: RWS) -> bool {
        match self {
            DiskImageFileFormat::HfeImage => hfe::HfeFormat::detect(image),
            DiskImageFileFormat::RawSectorImage => raw::RawFormat::detect(image),
            DiskImageFileFormat::AmigaDiskFile => adf::AdfFormat::detect(image),
            DiskImageFileFormat::BkdImage => bkd::BkdFormat::detect(image),
            DiskImageFileFormat::ImageDisk => imd::ImdFormat::detect(image),
            DiskImageFileFormat::KryofluxStream => kryoflux::KfxFormat::detect(image),
        }
    }

    pub fn load_image<RWS: ReadSeek>(&self, image: &mut RWS) -> Result<Disk, FloppyError> {
        match self {
            DiskImageFileFormat::HfeImage => hfe::HfeFormat::load_image(image),
            DiskImageFileFormat::RawSectorImage => raw::RawFormat::load_image(image),
            DiskImageFileFormat::AmigaDiskFile => adf::AdfFormat::load_image(image),
            DiskImageFileFormat::BkdImage => bkd::BkdFormat::load_image(image),
            DiskImageFileFormat::ImageDisk => imd::ImdFormat::load_image(image),
            DiskImageFileFormat::KryofluxStream => kryoflux::KfxFormat::load_image(image),
        }
    }

    pub fn save_image<RWS: ReadWriteSeek>(&self, disk: &Disk, output: &mut RWS) -> Result<(), FloppyError> {
        match self {
            DiskImageFileFormat::HfeImage => hfe::HfeFormat::save_image(disk, output),
            DiskImageFileFormat::RawSectorImage => raw::RawFormat::save_image(disk, output),
            DiskImageFileFormat::AmigaDiskFile => adf::AdfFormat::save_image(disk, output),
            DiskImageFileFormat::BkdImage => bkd::BkdFormat::save_image(disk, output),
            DiskImageFileFormat::ImageDisk => imd::ImdFormat::save_image(disk, output),
            DiskImageFileFormat::KryofluxStream => Err(FloppyError::Format(
                "KryoFlux streams are read-only captures".to_string(),
            )),
        }
    }

    pub fn can_write(&self) -> bool {
        self.capabilities().contains(FormatCaps::CAP_WRITE)
    }
}

/// Returns a list of advertised file extensions supported by available
/// image format parsers.
pub fn supported_extensions() -> Vec<&'static str> {
    DiskImageFileFormat::iter().flat_map(|f| f.extensions()).collect()
}

/// Map a file extension to its container format. Dispatch is fixed and
/// case-insensitive; unknown extensions return None.
pub fn format_from_ext(ext: &str) -> Option<DiskImageFileFormat> {
    let ext = ext.to_lowercase();
    DiskImageFileFormat::iter().find(|f| f.extensions().contains(&ext.as_str()))
}

/// Identify a format by content, trying magic-bearing formats before
/// size-keyed ones.
pub fn detect_format<RWS: ReadSeek>(image: &mut RWS) -> Option<DiskImageFileFormat> {
    const DETECT_ORDER: [DiskImageFileFormat; 6] = [
        DiskImageFileFormat::HfeImage,
        DiskImageFileFormat::ImageDisk,
        DiskImageFileFormat::KryofluxStream,
        DiskImageFileFormat::AmigaDiskFile,
        DiskImageFileFormat::BkdImage,
        DiskImageFileFormat::RawSectorImage,
    ];
    DETECT_ORDER.into_iter().find(|f| f.detect(&mut *image))
}

/// Load a disk image from a path, dispatching on the extension. KryoFlux
/// `.raw` files expand to their whole stream-file set.
pub fn read_image_file<P: AsRef<Path>>(path: P) -> Result<Disk, FloppyError> {
    let path = path.as_ref();
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    let format = format_from_ext(ext)
        .ok_or_else(|| FloppyError::Format(format!("unrecognized image extension '{}'", ext)))?;

    if format == DiskImageFileFormat::KryofluxStream {
        return kryoflux::KfxFormat::load_set(path);
    }

    let mut file = std::fs::File::open(path)?;
    format.load_image(&mut file)
}

/// Write a disk image to a path, dispatching on the extension.
pub fn write_image_file<P: AsRef<Path>>(disk: &Disk, path: P) -> Result<(), FloppyError> {
    let path = path.as_ref();
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    let format = format_from_ext(ext)
        .ok_or_else(|| FloppyError::Format(format!("unrecognized image extension '{}'", ext)))?;
    if !format.can_write() {
        return Err(FloppyError::Format(format!("{:?} images cannot be written", format)));
    }

    let mut file = std::fs::File::create(path)?;
    format.save_image(disk, &mut file)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_ext_is_case_insensitive() {
        assert_eq!(format_from_ext("HFE"), Some(DiskImageFileFormat::HfeImage));
        assert_eq!(format_from_ext("Img"), Some(DiskImageFileFormat::RawSectorImage));
        assert_eq!(format_from_ext("ima"), Some(DiskImageFileFormat::RawSectorImage));
        assert_eq!(format_from_ext("adf"), Some(DiskImageFileFormat::AmigaDiskFile));
        assert_eq!(format_from_ext("BKD"), Some(DiskImageFileFormat::BkdImage));
        assert_eq!(format_from_ext("imd"), Some(DiskImageFileFormat::ImageDisk));
        assert_eq!(format_from_ext("raw"), Some(DiskImageFileFormat::KryofluxStream));
        assert_eq!(format_from_ext("td0"), None);
    }

    #[test]
    fn test_writable_formats() {
        assert!(DiskImageFileFormat::HfeImage.can_write());
        assert!(DiskImageFileFormat::RawSectorImage.can_write());
        assert!(!DiskImageFileFormat::KryofluxStream.can_write());
    }

    #[test]
    fn test_supported_extensions() {
        let extensions = supported_extensions();
        for ext in ["hfe", "img", "ima", "adf", "bkd", "imd", "raw"] {
            assert!(extensions.contains(&ext), "{} missing", ext);
        }
    }
}
