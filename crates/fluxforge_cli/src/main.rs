/*
    ffz
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

    src/main.rs

    ffz: read, write and convert floppy disks through USB flux adapters.

*/

mod args;

use std::fs::OpenOptions;

use anyhow::{bail, Context, Result};

use args::{AdapterKind, AppParams, Command, GlobalOptions};
use fluxforge::adapters::greaseweazle::Greaseweazle;
use fluxforge::adapters::supercardpro::SuperCardPro;
use fluxforge::adapters::FloppyAdapter;
use fluxforge::file_parsers::raw::geometry_from_size;
use fluxforge::file_parsers::{read_image_file, write_image_file};
use fluxforge::track_schema::ibm;
use fluxforge::transfer::{erase_disk, read_disk, write_disk};
use fluxforge::{Disk, DiskHeader, DriveProfile, InterfaceMode, TrackEncoding, SECTOR_SIZE};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let params: AppParams = args::app_params().run();
    let profile = profile_from(&params.global);

    match params.command {
        Command::Status => {
            let mut adapter = open_adapter(&params.global)?;
            let info = adapter.info().clone();
            adapter.status().context("adapter status check failed")?;
            println!(
                "firmware {}.{}, hardware model {}, sample clock {:.0} Hz",
                info.firmware_major, info.firmware_minor, info.hardware_model, info.sample_freq_hz
            );
        }
        Command::Read { file } => {
            let mut adapter = open_adapter(&params.global)?;
            let disk = read_disk(adapter.as_mut(), &profile, params.global.cylinders)
                .context("disk read failed")?;
            write_image_file(&disk, &file).with_context(|| format!("writing {}", file.display()))?;
            println!("read {} cylinders into {}", disk.header.cylinders, file.display());
        }
        Command::Write { file, no_verify } => {
            let disk = read_image_file(&file).with_context(|| format!("loading {}", file.display()))?;
            let mut adapter = open_adapter(&params.global)?;
            write_disk(adapter.as_mut(), &disk, &profile, !no_verify).context("disk write failed")?;
            println!("wrote {} to drive {}", file.display(), profile.unit);
        }
        Command::Format { size_kb, no_verify } => {
            let disk = blank_disk(size_kb)?;
            let mut adapter = open_adapter(&params.global)?;
            write_disk(adapter.as_mut(), &disk, &profile, !no_verify).context("format failed")?;
            println!("formatted {}K disk in drive {}", size_kb, profile.unit);
        }
        Command::Erase => {
            let mut adapter = open_adapter(&params.global)?;
            erase_disk(adapter.as_mut(), &profile, params.global.cylinders).context("erase failed")?;
            println!("erased {} cylinders", params.global.cylinders);
        }
        Command::Convert { source, dest } => {
            let disk = read_image_file(&source).with_context(|| format!("loading {}", source.display()))?;
            write_image_file(&disk, &dest).with_context(|| format!("writing {}", dest.display()))?;
            println!("converted {} -> {}", source.display(), dest.display());
        }
    }

    Ok(())
}

fn profile_from(global: &GlobalOptions) -> DriveProfile {
    DriveProfile {
        unit: global.drive,
        ..DriveProfile::default()
    }
}

fn open_adapter(global: &GlobalOptions) -> Result<Box<dyn FloppyAdapter>> {
    let port = OpenOptions::new()
        .read(true)
        .write(true)
        .open(&global.device)
        .with_context(|| format!("opening adapter device {}", global.device.display()))?;

    let adapter: Box<dyn FloppyAdapter> = match global.adapter {
        AdapterKind::Greaseweazle => Box::new(Greaseweazle::open(port).context("Greaseweazle handshake failed")?),
        AdapterKind::SuperCardPro => Box::new(SuperCardPro::open(port).context("SuperCard Pro handshake failed")?),
    };
    Ok(adapter)
}

/// Build a freshly formatted disk of the requested capacity: every sector
/// present and filled with the DOS format byte.
fn blank_disk(size_kb: usize) -> Result<Disk> {
    let geometry = match geometry_from_size(size_kb * 1024) {
        Some(g) => g,
        None => bail!("no known geometry for a {}K disk", size_kb),
    };

    let mut disk = Disk::new(DiskHeader {
        cylinders: geometry.cylinders,
        sides: geometry.heads,
        encoding: TrackEncoding::IbmMfm,
        bit_rate: geometry.rate,
        rpm: geometry.rpm,
        interface_mode: InterfaceMode::IbmPcDd,
        write_protect: false,
    });

    let sectors = vec![vec![0xF6u8; SECTOR_SIZE]; geometry.sectors_per_track as usize];
    for cylinder in 0..geometry.cylinders {
        for head in 0..geometry.heads {
            let track = ibm::encode_track(&sectors, cylinder, head, geometry.rate, geometry.rpm, true)?;
            disk.set_track(cylinder, head, track);
        }
    }
    Ok(disk)
}
