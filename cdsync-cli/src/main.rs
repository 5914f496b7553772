mod application;
mod presentation;

use cdsync_core::error::Result;

fn main() -> Result<()> {
    application::run()
}
