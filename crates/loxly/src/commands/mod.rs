//! Command handlers.

pub mod map;
pub mod rooms;
pub mod status;
pub mod watch;

use loxly_config::Config;
use loxly_core::StructureCatalog;

use crate::cli::GlobalOpts;
use crate::config::{self, Resolved};
use crate::error::CliError;
use crate::structure_cache::{self, StructureCache};

/// Load the structure catalog the way the global flags ask for.
///
/// With `--structure` nothing is resolved, so no credentials are needed.
/// Otherwise the connection settings are resolved first and handed back
/// for reuse.
pub async fn load_catalog(
    global: &GlobalOpts,
    cfg: &Config,
) -> Result<(StructureCatalog, Option<Resolved>), CliError> {
    if let Some(ref path) = global.structure {
        tracing::debug!(path = %path.display(), "loading local structure file");
        return Ok((structure_cache::load_file(path)?, None));
    }

    let resolved = config::resolve(global, cfg)?;
    let cache = StructureCache::new(config::cache_dir());
    let catalog = structure_cache::load_remote(
        &cache,
        &resolved.client,
        resolved.structure_max_age,
        global.refresh_structure,
    )
    .await?;
    Ok((catalog, Some(resolved)))
}
