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
*/

use std::path::PathBuf;
use std::str::FromStr;

use bpaf::*;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AdapterKind {
    Greaseweazle,
    SuperCardPro,
}

impl FromStr for AdapterKind {
    type Err = &'static str;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.to_lowercase().as_str() {
            "greaseweazle" | "gw" => Ok(AdapterKind::Greaseweazle),
            "supercardpro" | "scp" => Ok(AdapterKind::SuperCardPro),
            _ => Err("expected 'greaseweazle' or 'supercardpro'"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct GlobalOptions {
    pub device: PathBuf,
    pub adapter: AdapterKind,
    pub drive: u8,
    pub cylinders: u8,
}

#[derive(Clone, Debug)]
pub enum Command {
    Status,
    Read { file: PathBuf },
    Write { file: PathBuf, no_verify: bool },
    Format { size_kb: usize, no_verify: bool },
    Erase,
    Convert { source: PathBuf, dest: PathBuf },
}

#[derive(Clone, Debug)]
pub struct AppParams {
    pub global: GlobalOptions,
    pub command: Command,
}

fn global_options() -> impl Parser<GlobalOptions> {
    let device = long("device")
        .short('d')
        .help("Serial device of the USB adapter")
        .argument::<PathBuf>("PATH")
        .fallback(PathBuf::from("/dev/ttyACM0"));
    let adapter = long("adapter")
        .short('a')
        .help("Adapter protocol: greaseweazle or supercardpro")
        .argument::<AdapterKind>("KIND")
        .fallback(AdapterKind::Greaseweazle);
    let drive = long("drive")
        .help("Drive unit to select on the adapter bus")
        .argument::<u8>("N")
        .fallback(0);
    let cylinders = long("cylinders")
        .short('c')
        .help("Cylinders to operate on")
        .argument::<u8>("N")
        .fallback(80);
    construct!(GlobalOptions {
        device,
        adapter,
        drive,
        cylinders
    })
}

fn status_command() -> impl Parser<Command> {
    pure(Command::Status)
        .to_options()
        .descr("Report adapter firmware and drive status")
        .command("status")
}

fn read_command() -> impl Parser<Command> {
    let file = positional::<PathBuf>("FILE")
        .help("Output image; the extension selects the container format")
        .fallback(PathBuf::from("disk.img"));
    construct!(Command::Read { file })
        .to_options()
        .descr("Read a disk into an image file")
        .command("read")
}

fn write_command() -> impl Parser<Command> {
    let no_verify = long("no-verify")
        .help("Skip reading back each track for verification")
        .switch();
    let file = positional::<PathBuf>("FILE").help("Image file to write to disk");
    construct!(Command::Write { no_verify, file })
        .to_options()
        .descr("Write an image file to disk, verifying each track")
        .command("write")
}

fn format_command() -> impl Parser<Command> {
    let size_kb = long("size")
        .help("Formatted capacity in KiB: 360, 720, 1200, 1440, 2880")
        .argument::<usize>("KB")
        .fallback(1440);
    let no_verify = long("no-verify")
        .help("Skip reading back each track for verification")
        .switch();
    construct!(Command::Format { size_kb, no_verify })
        .to_options()
        .descr("Format a blank disk with empty sectors")
        .command("format")
}

fn erase_command() -> impl Parser<Command> {
    pure(Command::Erase)
        .to_options()
        .descr("Demagnetize every track of the disk")
        .command("erase")
}

fn convert_command() -> impl Parser<Command> {
    let source = positional::<PathBuf>("SRC").help("Source image");
    let dest = positional::<PathBuf>("DST").help("Destination image");
    construct!(Command::Convert { source, dest })
        .to_options()
        .descr("Convert between image container formats")
        .command("convert")
}

pub fn app_params() -> OptionParser<AppParams> {
    let command = construct!([
        status_command(),
        read_command(),
        write_command(),
        format_command(),
        erase_command(),
        convert_command(),
    ]);
    let global = global_options();
    construct!(AppParams { global, command })
        .to_options()
        .descr("Read, write and convert floppy disks through USB flux adapters")
        .version(env!("CARGO_PKG_VERSION"))
}
