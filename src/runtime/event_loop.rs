use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::Duration;

use tracing::{debug, info};
use tracksync::Files;
use tracksync::library::Collections;
use tracksync::sources::{FilesEvent, ModificationKind, ScanPhase};

/// Log service events until the service stops. With `once`, return after the
/// first completed pass.
pub fn run(
    files: &Files,
    events: Receiver<FilesEvent>,
    once: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    loop {
        let event = match events.recv_timeout(Duration::from_millis(250)) {
            Ok(event) => event,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => return Ok(()),
        };

        match event {
            FilesEvent::SourceModified { track, kind } => match kind {
                ModificationKind::Added => info!("+ {}", track.path.display()),
                ModificationKind::Removed => info!("- {}", track.path.display()),
                ModificationKind::Updated => debug!("~ {}", track.display),
            },
            FilesEvent::ProgressChanged { percent, phase } => {
                debug!("{phase:?} {percent}%");
                if phase == ScanPhase::Done {
                    summary(&files.collections());
                    if once {
                        return Ok(());
                    }
                }
            }
            FilesEvent::TrackModified { path, field } => {
                debug!("{} changed {:?}", path.display(), field)
            }
            FilesEvent::PathRenamed { old, new } => {
                info!("{} -> {}", old.display(), new.display())
            }
            FilesEvent::SourceAdded(loc) => info!("Source added: {}", loc.data),
            FilesEvent::SourceRemoved(loc) => info!("Source removed: {}", loc.data),
            FilesEvent::SourcesChanged(list) => debug!("{} source(s) configured", list.len()),
        }
    }
}

fn summary(collections: &Collections) {
    let pending = collections.files.iter().filter(|t| !t.processed).count();
    info!(
        "{} track(s) in library, {} waiting for metadata",
        collections.files.len(),
        pending
    );
}
