//! Configuration scaffolding

use anyhow::{bail, Result};
use clap::Args;

use super::Settings;
use crate::output::print_success;

#[derive(Debug, Args)]
pub struct InitArgs {
    /// Overwrite existing files
    #[arg(long)]
    pub force: bool,
}

/// Write the current settings as configuration and testbed files
pub fn execute(args: InitArgs, settings: Settings) -> Result<()> {
    for path in [&settings.config_path, &settings.testbed_path] {
        if path.exists() && !args.force {
            bail!("{} already exists (use --force to overwrite)", path.display());
        }
    }

    let mut engine = settings.engine;
    engine.testbed_path = Some(settings.testbed_path.clone());
    engine.save(&settings.config_path)?;
    settings.testbed.save(&settings.testbed_path)?;

    print_success(&format!("Wrote {}", settings.config_path.display()));
    print_success(&format!("Wrote {}", settings.testbed_path.display()));
    Ok(())
}
