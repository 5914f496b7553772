use std::path::PathBuf;

use cdsync_core::archive::BaseMode;
use cdsync_core::driver::{StepOutcome, SyncDriver};
use cdsync_core::error::Result;

use crate::presentation::cli::BaseModeArg;

fn run_to_finish(driver: &mut SyncDriver) -> Result<()> {
    loop {
        match driver.step()? {
            StepOutcome::Finished => return Ok(()),
            StepOutcome::NextFile => {
                if let Some(path) = driver.current_path() {
                    tracing::debug!(path, "entering file");
                }
            }
            StepOutcome::Step => {}
        }
    }
}

pub fn handle_encode(
    base: PathBuf,
    archive: Option<PathBuf>,
    index: Option<PathBuf>,
    store: Option<PathBuf>,
    seeds: Vec<PathBuf>,
    make_perm_mode: Option<u32>,
) -> Result<()> {
    let mut driver = SyncDriver::new_encode();
    driver.set_base_path(&base)?;
    if let Some(archive) = &archive {
        driver.set_archive_path(archive)?;
    }
    if let Some(perm) = make_perm_mode {
        driver.set_make_perm_mode(perm)?;
    }
    if let Some(index) = &index {
        driver.set_index_path(index)?;
    }
    if let Some(store) = &store {
        driver.set_store_local(store)?;
    }
    for seed in &seeds {
        driver.add_seed_store_local(seed)?;
    }

    run_to_finish(&mut driver)?;
    let digest = driver.get_digest()?;
    tracing::info!(base = %base.display(), digest = %digest, "encode finished");
    println!("{digest}");
    Ok(())
}

pub fn handle_decode(
    base: PathBuf,
    base_mode: BaseModeArg,
    archive: Option<PathBuf>,
    index: Option<PathBuf>,
    store: Option<PathBuf>,
    seeds: Vec<PathBuf>,
) -> Result<()> {
    let mut driver = SyncDriver::new_decode();
    let mode = match base_mode {
        BaseModeArg::Regular => BaseMode::Regular,
        BaseModeArg::Directory => BaseMode::Directory,
        BaseModeArg::BlockDevice => BaseMode::BlockDevice,
    };
    driver.set_base_path(&base)?;
    driver.set_base_mode(mode)?;
    if let Some(archive) = &archive {
        driver.set_archive_path(archive)?;
    }
    if let Some(index) = &index {
        driver.set_index_path(index)?;
    }
    if let Some(store) = &store {
        driver.set_store_local(store)?;
    }
    for seed in &seeds {
        driver.add_seed_store_local(seed)?;
    }

    run_to_finish(&mut driver)?;
    let digest = driver.get_digest()?;
    tracing::info!(base = %base.display(), digest = %digest, "decode finished");
    println!("{digest}");
    Ok(())
}

pub fn handle_digest(base: PathBuf) -> Result<()> {
    let mut driver = SyncDriver::new_encode();
    driver.set_base_path(&base)?;
    run_to_finish(&mut driver)?;
    println!("{}", driver.get_digest()?);
    Ok(())
}
