//! `loxly rooms`

use loxly_config::Config;

use crate::cli::GlobalOpts;
use crate::config;
use crate::error::CliError;
use crate::output;

pub async fn handle(global: &GlobalOpts, cfg: &Config) -> Result<(), CliError> {
    let (catalog, _) = super::load_catalog(global, cfg).await?;
    let format = config::output_format(global, cfg);
    output::print_output(&output::render_rooms(format, catalog.rooms())?);
    Ok(())
}
