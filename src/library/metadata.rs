use std::path::Path;

use lofty::error::ErrorKind;
use lofty::prelude::{Accessor, AudioFile, TaggedFileExt};

use crate::error::{Result, SyncError};

use super::model::Metadata;

/// Reads tags and stream properties of one file.
///
/// Implementations must be callable from the scan worker and the janitor
/// thread at the same time.
pub trait MetadataReader: Send + Sync {
    fn read(&self, path: &Path) -> Result<Metadata>;
}

/// [`MetadataReader`] backed by `lofty`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoftyReader;

impl MetadataReader for LoftyReader {
    fn read(&self, path: &Path) -> Result<Metadata> {
        let tagged = lofty::read_from_path(path).map_err(|e| match e.kind() {
            ErrorKind::Io(io) => SyncError::io(path, std::io::Error::new(io.kind(), io.to_string())),
            _ => SyncError::Metadata {
                path: path.to_path_buf(),
                message: e.to_string(),
            },
        })?;

        let props = tagged.properties();
        let mut meta = Metadata {
            duration: Some(props.duration()),
            bitrate: props.audio_bitrate(),
            sample_rate: props.sample_rate(),
            channels: props.channels(),
            ..Metadata::default()
        };

        if let Some(tag) = tagged.primary_tag().or_else(|| tagged.first_tag()) {
            meta.title = non_empty(tag.title().as_deref());
            meta.artist = non_empty(tag.artist().as_deref());
            meta.album = non_empty(tag.album().as_deref());
            meta.genre = non_empty(tag.genre().as_deref());
            meta.track_number = tag.track();
        }

        Ok(meta)
    }
}

fn non_empty(v: Option<&str>) -> Option<String> {
    v.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}
