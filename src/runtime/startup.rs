use tracing::{info, warn};
use tracksync::config::Settings;
use tracksync::{Files, Result};

/// Start the service with the configured sources plus `extra`. No pass runs
/// yet.
pub fn start_files(settings: &Settings, extra: &[String]) -> Result<Files> {
    let files = Files::builder(settings.clone())
        .locations(settings.sources.iter().cloned())
        .start()?;

    for data in extra {
        files.add_source_path(data, None)?;
    }

    if settings.libraries.auto_discover {
        if let Err(e) = files.add_system_folders() {
            warn!("Could not add system folders: {e}");
        }
    }

    let sources = files.sources();
    if sources.is_empty() {
        warn!("No sources configured; pass a folder on the command line");
    }
    for loc in &sources {
        info!(
            "Source {} ({:?}, {})",
            loc.data,
            loc.kind,
            if loc.include { "include" } else { "ignore" }
        );
    }

    Ok(files)
}
