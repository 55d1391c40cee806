use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use super::display::{make_display, title_from_stem};

/// Tag and stream properties read from an audio file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub genre: Option<String>,
    pub track_number: Option<u32>,
    pub duration: Option<Duration>,
    pub bitrate: Option<u32>,
    pub sample_rate: Option<u32>,
    pub channels: Option<u8>,
}

/// A named position inside a track.
#[derive(Debug, Clone, PartialEq)]
pub struct Bookmark {
    pub label: String,
    pub position: Duration,
}

/// Which field of a [`Track`] changed.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum TrackField {
    Path,
    Title,
    Artist,
    Album,
    Genre,
    TrackNumber,
    Duration,
    Bitrate,
    SampleRate,
    Channels,
}

/// A local audio file in one of the collections.
///
/// Identity is `path`, which is always absolute and normalised.
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    pub path: PathBuf,
    pub title: String,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub genre: Option<String>,
    pub track_number: Option<u32>,
    pub duration: Option<Duration>,
    pub bitrate: Option<u32>,
    pub sample_rate: Option<u32>,
    pub channels: Option<u8>,
    pub display: String,
    /// Modification time of the file when metadata was last read.
    /// `None` until the first successful read.
    pub last_write: Option<SystemTime>,
    /// `false` while the track is a placeholder waiting for its metadata.
    pub processed: bool,
    pub bookmarks: Vec<Bookmark>,
}

impl Track {
    /// A placeholder for a freshly discovered file: no metadata yet.
    pub fn placeholder(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let title = title_from_stem(&path);
        let display = make_display(&title, None);
        Self {
            path,
            title,
            artist: None,
            album: None,
            genre: None,
            track_number: None,
            duration: None,
            bitrate: None,
            sample_rate: None,
            channels: None,
            display,
            last_write: None,
            processed: false,
            bookmarks: Vec::new(),
        }
    }

    /// Whether the file on disk was written after the stored metadata was read.
    pub fn is_stale(&self, modified: SystemTime) -> bool {
        self.last_write.is_none_or(|seen| modified > seen)
    }

    /// Overwrite tag fields from `meta` and return the fields whose value changed.
    pub fn apply_metadata(&mut self, meta: &Metadata) -> Vec<TrackField> {
        let mut changed = Vec::new();

        let title = meta
            .title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| title_from_stem(&self.path));

        set_field(&mut self.title, title, TrackField::Title, &mut changed);
        set_field(&mut self.artist, clean(&meta.artist), TrackField::Artist, &mut changed);
        set_field(&mut self.album, clean(&meta.album), TrackField::Album, &mut changed);
        set_field(&mut self.genre, clean(&meta.genre), TrackField::Genre, &mut changed);
        set_field(&mut self.track_number, meta.track_number, TrackField::TrackNumber, &mut changed);
        set_field(&mut self.duration, meta.duration, TrackField::Duration, &mut changed);
        set_field(&mut self.bitrate, meta.bitrate, TrackField::Bitrate, &mut changed);
        set_field(&mut self.sample_rate, meta.sample_rate, TrackField::SampleRate, &mut changed);
        set_field(&mut self.channels, meta.channels, TrackField::Channels, &mut changed);

        self.display = make_display(&self.title, self.artist.as_deref());
        changed
    }

    /// Copy everything a metadata refresh touches from `other`.
    pub fn copy_info_from(&mut self, other: &Track) {
        self.title.clone_from(&other.title);
        self.artist.clone_from(&other.artist);
        self.album.clone_from(&other.album);
        self.genre.clone_from(&other.genre);
        self.track_number = other.track_number;
        self.duration = other.duration;
        self.bitrate = other.bitrate;
        self.sample_rate = other.sample_rate;
        self.channels = other.channels;
        self.display.clone_from(&other.display);
        self.last_write = other.last_write;
        self.processed = other.processed;
    }
}

fn clean(v: &Option<String>) -> Option<String> {
    v.as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn set_field<T: PartialEq>(slot: &mut T, value: T, field: TrackField, changed: &mut Vec<TrackField>) {
    if *slot != value {
        *slot = value;
        changed.push(field);
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Playlist {
    pub name: String,
    pub tracks: Vec<Track>,
}

/// Every track collection a file path can show up in.
///
/// `files` is the library proper and is the only collection the scanner adds
/// to or removes from; the others only follow renames and metadata refreshes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Collections {
    pub files: Vec<Track>,
    pub queue: Vec<Track>,
    pub history: Vec<Track>,
    pub playlists: Vec<Playlist>,
}

impl Collections {
    pub fn file(&self, path: &Path) -> Option<&Track> {
        self.files.iter().find(|t| t.path == path)
    }

    pub fn contains_file(&self, path: &Path) -> bool {
        self.file(path).is_some()
    }

    /// Every track list, the library first.
    pub fn lists_mut(&mut self) -> impl Iterator<Item = &mut Vec<Track>> {
        [&mut self.files, &mut self.queue, &mut self.history]
            .into_iter()
            .chain(self.playlists.iter_mut().map(|p| &mut p.tracks))
    }

    /// Every track list except the library.
    pub fn secondary_lists_mut(&mut self) -> impl Iterator<Item = &mut Vec<Track>> {
        self.lists_mut().skip(1)
    }
}
