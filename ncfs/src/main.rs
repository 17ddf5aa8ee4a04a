use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use clap::{Parser, ValueEnum};

use ncfs::dataset::InMemoryDataset;
use ncfs::fuse::NcfsFuse;
use ncfs::fuse::mount::mount_unprivileged;
use ncfs::repr::{BinaryVardata, FlatTextVardata, VardataCodec};
use ncfs::vfs::NcFs;

#[derive(Copy, Clone, Debug, ValueEnum)]
enum ReprChoice {
    /// One value per line, fixed-point text
    Text,
    /// Raw native-endian bytes
    Binary,
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Mount a dataset snapshot as a filesystem")]
struct Args {
    /// Dataset snapshot to mount (JSON; rewritten on unmount)
    dataset: PathBuf,
    /// Empty directory to mount onto
    mountpoint: PathBuf,
    /// Array representation exposed by DATA_REPR files
    #[arg(long, value_enum, default_value_t = ReprChoice::Text)]
    repr: ReprChoice,
    /// Fractional digits for the text representation
    #[arg(long, default_value_t = 6)]
    precision: usize,
    /// Be verbose (-vv for debug messages)
    #[arg(short, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let args = Args::parse();

    let level = match args.verbose {
        0 => log::LevelFilter::Error,
        1 => log::LevelFilter::Info,
        _ => log::LevelFilter::Debug,
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .init();

    let dataset = match InMemoryDataset::load(&args.dataset) {
        Ok(ds) => Arc::new(Mutex::new(ds)),
        Err(e) => {
            eprintln!("failed to load {}: {e}", args.dataset.display());
            std::process::exit(1);
        }
    };

    let vardata: Box<dyn VardataCodec> = match args.repr {
        ReprChoice::Text => Box::new(FlatTextVardata::with_precision(args.precision)),
        ReprChoice::Binary => Box::new(BinaryVardata::new()),
    };
    let engine = NcFs::with_shared(dataset.clone(), vardata);
    let fs = NcfsFuse::new(engine);

    println!(
        "Mounting {} at {}...",
        args.dataset.display(),
        args.mountpoint.display()
    );
    println!("Press Ctrl+C to unmount and exit.");
    let handle = match mount_unprivileged(fs, &args.mountpoint).await {
        Ok(h) => h,
        Err(e) => {
            eprintln!(
                "mount failed: {e}\n\nHint: ensure you are on Linux with FUSE (fusermount3) available."
            );
            std::process::exit(1);
        }
    };

    if let Err(e) = tokio::signal::ctrl_c().await {
        eprintln!("signal error: {e}");
    }

    println!("Unmounting...");
    if let Err(e) = handle.unmount().await {
        eprintln!("unmount error: {e}");
    }

    // The snapshot file is the only persisted state; write it back exactly
    // once, after the kernel can no longer issue requests.
    let ds = dataset.lock().unwrap();
    if let Err(e) = ds.save(&args.dataset) {
        eprintln!("failed to save {}: {e}", args.dataset.display());
        std::process::exit(1);
    }
    println!("Saved {}.", args.dataset.display());
}
