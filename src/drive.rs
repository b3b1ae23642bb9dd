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

//! The drive profile: an explicit value describing the physical drive an
//! operation targets, threaded through the container codecs and transfer
//! loops in place of global drive state.

use crate::disk::DiskHeader;
use crate::{DataRate, DiskRpm, FloppyError};

/// Physical envelope of the target drive.
#[derive(Clone, Debug)]
pub struct DriveProfile {
    /// Drive select number on the adapter bus.
    pub unit: u8,
    /// Maximum cylinder the head assembly may seek to.
    pub max_cylinders: u8,
    /// Heads fitted: 1 or 2.
    pub heads: u8,
    /// Data rates the drive/controller pair supports.
    pub supported_rates: Vec<DataRate>,
    pub rpm: DiskRpm,
    /// Double-step: a 40 track image in an 80 track drive.
    pub double_step: bool,
}

impl Default for DriveProfile {
    fn default() -> Self {
        DriveProfile {
            unit: 0,
            max_cylinders: 82,
            heads: 2,
            supported_rates: vec![DataRate::Rate250Kbps, DataRate::Rate500Kbps, DataRate::Rate1000Kbps],
            rpm: DiskRpm::Rpm300,
            double_step: false,
        }
    }
}

impl DriveProfile {
    /// A 3.5" high density PC drive.
    pub fn pc_3_5_hd() -> DriveProfile {
        DriveProfile::default()
    }

    /// A 5.25" high density PC drive, spinning at 360 RPM.
    pub fn pc_5_25_hd() -> DriveProfile {
        DriveProfile {
            rpm: DiskRpm::Rpm360,
            ..DriveProfile::default()
        }
    }

    /// Check that a disk image fits the drive envelope.
    pub fn validate(&self, header: &DiskHeader) -> Result<(), FloppyError> {
        let step = if self.double_step { 2 } else { 1 };
        let last_cylinder = header.cylinders.saturating_sub(1) as u16 * step;
        if last_cylinder >= self.max_cylinders as u16 {
            return Err(FloppyError::GeometryMismatch(format!(
                "image needs cylinder {} but the drive stops at {}",
                last_cylinder,
                self.max_cylinders - 1
            )));
        }
        if header.sides > self.heads {
            return Err(FloppyError::GeometryMismatch(format!(
                "image has {} sides but the drive has {} heads",
                header.sides, self.heads
            )));
        }
        if !self.supported_rates.contains(&header.bit_rate) {
            return Err(FloppyError::GeometryMismatch(format!(
                "drive does not support {}",
                header.bit_rate
            )));
        }
        Ok(())
    }

    /// Physical cylinder for a logical image cylinder.
    pub fn physical_cylinder(&self, cylinder: u8) -> u8 {
        if self.double_step {
            cylinder * 2
        }
        else {
            cylinder
        }
    }
}
