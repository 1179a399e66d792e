//! The FUSE daemon: mounts a device's filesystem at a mountpoint and serves
//! requests until unmounted.

use blockfs::fuse_adapter::BlockFs;
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
    mount_point: Option<PathBuf>,
}

fn parse_args(args: ArgsOs) -> Args {
    let mut res = Args {
        help: false,
        device_path: None,
        mount_point: None,
    };
    for arg in args {
        match arg.to_str() {
            Some("-h" | "--help") => res.help = true,
            Some(s) if s.starts_with("--device=") => {
                res.device_path = Some(PathBuf::from(&s["--device=".len()..]));
            }
            _ if res.mount_point.is_none() => res.mount_point = Some(PathBuf::from(arg)),
            _ => {}
        }
    }
    res
}

fn main() {
    env_logger::init();
    let bin = "blockfs";
    let args = parse_args(std::env::args_os().skip(1));
    if args.help {
        println!("usage: {bin} --device=<path> <mountpoint>");
        return;
    }
    let device_path = args
        .device_path
        .unwrap_or_else(|| error(bin, "specify --device=<path>"));
    let mount_point = args
        .mount_point
        .unwrap_or_else(|| error(bin, "specify a mountpoint"));

    let mount = Mount::mount(&device_path).unwrap_or_else(|e| error(bin, e));
    let fs = BlockFs::new(mount);

    log::info!("mounting {} at {}", device_path.display(), mount_point.display());
    let options = vec![fuser::MountOption::FSName("blockfs".to_string())];
    fuser::mount2(fs, &mount_point, &options).unwrap_or_else(|e| error(bin, e));
}
