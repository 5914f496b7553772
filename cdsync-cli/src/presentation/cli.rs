use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about = "cdsync: content-addressed sync driver", long_about = None)]
pub struct Cli {
    /// Increase log verbosity; repeat for more (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Encode a base (file, directory, or block device) into an archive and
    /// a local object store
    Encode {
        /// source file or directory to encode
        base: PathBuf,

        /// archive output path (omit to write an index-only sync)
        #[arg(long)]
        archive: Option<PathBuf>,

        /// index output path
        #[arg(long)]
        index: Option<PathBuf>,

        /// writable content store directory
        #[arg(long)]
        store: Option<PathBuf>,

        /// additional read-only seed store directories, first to last
        #[arg(long = "seed")]
        seeds: Vec<PathBuf>,

        /// octal permission mode to apply to the produced archive file
        #[arg(long, value_parser = parse_octal)]
        make_perm_mode: Option<u32>,
    },

    /// Decode an archive and/or index back into a base
    Decode {
        /// destination file or directory to (re)materialize
        base: PathBuf,

        /// is the destination a directory, a regular file, or a block device
        #[arg(long, value_enum, default_value_t = BaseModeArg::Regular)]
        base_mode: BaseModeArg,

        /// archive input path (omit when decoding purely from an index + store)
        #[arg(long)]
        archive: Option<PathBuf>,

        /// index input path
        #[arg(long)]
        index: Option<PathBuf>,

        /// writable content store directory (also consulted for reads)
        #[arg(long)]
        store: Option<PathBuf>,

        /// additional read-only seed store directories, first to last
        #[arg(long = "seed")]
        seeds: Vec<PathBuf>,
    },

    /// Run an encode to completion against no durable outputs, printing only
    /// the resulting whole-archive digest
    Digest {
        /// source file or directory to digest
        base: PathBuf,
    },
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum BaseModeArg {
    Regular,
    Directory,
    BlockDevice,
}

fn parse_octal(s: &str) -> Result<u32, String> {
    u32::from_str_radix(s.trim_start_matches("0o"), 8)
        .map_err(|e| format!("invalid octal permission mode {s:?}: {e}"))
}
