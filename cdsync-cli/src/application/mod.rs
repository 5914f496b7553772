pub mod handlers;

use crate::presentation::cli::{Cli, Commands};
use cdsync_core::error::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Encode {
            base,
            archive,
            index,
            store,
            seeds,
            make_perm_mode,
        } => handlers::handle_encode(base, archive, index, store, seeds, make_perm_mode),
        Commands::Decode {
            base,
            base_mode,
            archive,
            index,
            store,
            seeds,
        } => handlers::handle_decode(base, base_mode, archive, index, store, seeds),
        Commands::Digest { base } => handlers::handle_digest(base),
    }
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
