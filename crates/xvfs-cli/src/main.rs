//! xvfs - inspect disc images through the guest virtual filesystem.
//!
//! Usage:
//!   # Mount one image at \Device\Cdrom0 (aliased as game:)
//!   xvfs --image disc.iso ls game:\media
//!   xvfs --image disc.iso tree
//!   xvfs --image disc.iso stat game:\default.xex
//!   xvfs --image disc.iso cat game:\default.xex --offset 0 --length 16 > head.bin
//!
//!   # Mount everything described by a RON config
//!   xvfs --config ~/.config/xvfs/mounts.ron mounts
//!
//! Logs go to stderr; set RUST_LOG=xvfs_core=debug to watch the directory
//! tables being parsed.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use xvfs_core::{DiscImageDevice, Mode, VfsConfig, VirtualFileSystem};
use xvfs_kernel::{FileAccess, KernelState};

const DEFAULT_MOUNT: &str = "\\Device\\Cdrom0";
const GAME_LINK: &str = "game:";

/// Inspect GDFX disc images.
#[derive(Parser, Debug)]
#[command(name = "xvfs")]
#[command(about = "Inspect GDFX disc images through the guest virtual filesystem")]
struct Args {
    /// Disc image to mount
    #[arg(short, long, conflicts_with = "config")]
    image: Option<PathBuf>,

    /// Guest mount point for --image
    #[arg(long, default_value = DEFAULT_MOUNT)]
    mount: String,

    /// RON file listing mounts and symbolic links
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List a directory
    Ls {
        #[arg(default_value = GAME_LINK)]
        path: String,

        /// Only names matching this wildcard, e.g. *.xex
        #[arg(short, long)]
        pattern: Option<String>,
    },
    /// Print every device's full tree
    Tree,
    /// Show one entry's metadata
    Stat { path: String },
    /// Write a file's bytes to stdout
    Cat {
        path: String,

        #[arg(long, default_value_t = 0)]
        offset: u64,

        /// Bytes to write (default: to the end of the file)
        #[arg(long)]
        length: Option<u64>,
    },
    /// List mounted devices
    Mounts,
}

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    let vfs = build_vfs(&args)?;

    match &args.command {
        Command::Ls { path, pattern } => cmd_ls(&vfs, path, pattern.as_deref()),
        Command::Tree => cmd_tree(&vfs),
        Command::Stat { path } => cmd_stat(&vfs, path),
        Command::Cat {
            path,
            offset,
            length,
        } => cmd_cat(&vfs, path, *offset, *length),
        Command::Mounts => cmd_mounts(&vfs),
    }
}

fn build_vfs(args: &Args) -> Result<VirtualFileSystem> {
    let vfs = VirtualFileSystem::new();
    if let Some(config) = &args.config {
        VfsConfig::load(config)
            .and_then(|c| c.apply(&vfs))
            .with_context(|| format!("applying {}", config.display()))?;
    } else if let Some(image) = &args.image {
        let device = DiscImageDevice::open(&args.mount, image)
            .with_context(|| format!("mounting {}", image.display()))?;
        vfs.register_device(Arc::new(device))?;
        vfs.register_symbolic_link(GAME_LINK, &args.mount);
    } else {
        bail!("nothing to inspect: pass --image or --config");
    }
    Ok(vfs)
}

fn cmd_ls(vfs: &VirtualFileSystem, path: &str, pattern: Option<&str>) -> Result<()> {
    let resolved = vfs.resolve_path(path)?;
    let dir = resolved.entry();
    if !dir.kind().is_dir() {
        bail!("{} is not a directory", dir.absolute_path());
    }
    let children = match pattern {
        Some(pattern) => dir.matching_children(pattern),
        None => dir.children(),
    };
    for child in children {
        let info = child.info();
        if info.is_dir() {
            println!("{:>12}  {}\\", "<DIR>", info.name);
        } else {
            println!("{:>12}  {}", info.size, info.name);
        }
    }
    Ok(())
}

fn cmd_tree(vfs: &VirtualFileSystem) -> Result<()> {
    for mount in vfs.list_mounts() {
        if let Some(device) = vfs.find_device(&mount.mount_path) {
            print!("{}", device.dump());
        }
    }
    Ok(())
}

fn cmd_stat(vfs: &VirtualFileSystem, path: &str) -> Result<()> {
    let resolved = vfs.resolve_path(path)?;
    let entry = resolved.entry();
    let info = entry.info();
    println!("path:        {}", entry.absolute_path());
    println!("kind:        {:?}", info.kind);
    println!("attributes:  {:?}", info.attributes);
    println!("size:        {}", info.size);
    println!("allocated:   {}", info.allocation_size);
    println!("mappable:    {}", entry.can_map());

    let kernel = KernelState::new("xvfs");
    let opened = entry
        .open(&kernel, FileAccess::read())
        .with_context(|| format!("opening {path}"))?;
    println!("handle:      {}", opened.handle);
    println!("access:      {:?}", opened.file.granted_access());
    kernel.release_handle(opened.handle)?;
    Ok(())
}

fn cmd_cat(vfs: &VirtualFileSystem, path: &str, offset: u64, length: Option<u64>) -> Result<()> {
    let resolved = vfs.resolve_path(path)?;
    let size = resolved.entry().info().size;
    let length = match length {
        Some(length) => length,
        None => size.saturating_sub(offset),
    };
    let view = vfs
        .open_mapped_path(path, Mode::Read, offset, length)
        .with_context(|| format!("mapping {path} [{offset}, +{length})"))?;
    tracing::debug!(path, offset, length, region_offset = view.region_offset(), "mapped");

    let mut stdout = std::io::stdout().lock();
    stdout.write_all(&view)?;
    stdout.flush()?;
    Ok(())
}

fn cmd_mounts(vfs: &VirtualFileSystem) -> Result<()> {
    for mount in vfs.list_mounts() {
        println!(
            "{:<24} {:<16} {:>8} entries{}",
            mount.mount_path,
            mount.device_name,
            mount.entry_count,
            if mount.read_only { "  (ro)" } else { "" }
        );
    }
    Ok(())
}
