//! Formats a device with the filesystem, if it isn't already one.
//!
//! `Mount::mount` does the actual format-on-magic-mismatch work; this binary
//! just opens and immediately unmounts, so a plain `mkfs.blockfs <device>`
//! leaves a freshly formatted, cleanly unmounted image on disk.

use blockfs::mount::Mount;
use std::env::ArgsOs;
use std::fmt;
use std::path::PathBuf;
use std::process::exit;

fn error<M: fmt::Display>(bin: &str, msg: M) -> ! {
    eprintln!("{bin}: error: {msg}");
    exit(1);
}

struct Args {
    help: bool,
    device_path: Option<PathBuf>,
}

fn parse_args(args: ArgsOs) -> Args {
    let mut res = Args {
        help: false,
        device_path: None,
    };
    for arg in args {
        match arg.to_str() {
            Some("-h" | "--help") => res.help = true,
            _ => res.device_path = Some(PathBuf::from(arg)),
        }
    }
    res
}

fn main() {
    let bin = "mkfs.blockfs";
    let args = parse_args(std::env::args_os().skip(1));
    if args.help {
        println!("usage: {bin} <device>");
        return;
    }
    let device_path = args
        .device_path
        .unwrap_or_else(|| error(bin, "specify path to a device"));

    let mut mount = Mount::mount(&device_path).unwrap_or_else(|e| error(bin, e));
    mount.unmount().unwrap_or_else(|e| error(bin, e));
}
