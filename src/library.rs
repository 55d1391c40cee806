//! Track model and the per-file collaborators the scanner relies on:
//! format detection and metadata extraction.

mod display;
mod formats;
mod metadata;
mod model;

pub use display::{make_display, title_from_stem};
pub use formats::{Extensions, FormatSupport};
pub use metadata::{LoftyReader, MetadataReader};
pub use model::*;
