use std::path::Path;

/// Decides whether a path names an audio file the player can handle.
pub trait FormatSupport: Send + Sync {
    fn is_supported(&self, path: &Path) -> bool;
}

/// Extension allow-list, compared case-insensitively.
#[derive(Debug, Clone)]
pub struct Extensions {
    exts: Vec<String>,
}

impl Extensions {
    pub fn new<I, S>(exts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let exts = exts
            .into_iter()
            .map(|e| e.as_ref().trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|e| !e.is_empty())
            .collect();
        Self { exts }
    }
}

impl FormatSupport for Extensions {
    fn is_supported(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|s| s.to_str())
            .map(|ext| {
                let ext = ext.to_ascii_lowercase();
                self.exts.iter().any(|e| e == &ext)
            })
            .unwrap_or(false)
    }
}
