//! Keeps an in-memory track collection in step with a user-configured set of
//! filesystem sources, each of which may be included or ignored.
//!
//! The entry point is [`sources::Files`]: build it from [`config::Settings`],
//! add [`sources::Location`]s and subscribe to its events.

pub mod config;
pub mod error;
pub mod library;
pub mod logging;
pub mod paths;
pub mod sources;

pub use error::{Result, SyncError};
pub use sources::{Files, FilesBuilder, FilesEvent, Location, LocationKind};
