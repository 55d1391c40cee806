use std::path::Path;

/// "Artist - Title", or just the title when there is no usable artist.
pub fn make_display(title: &str, artist: Option<&str>) -> String {
    match artist {
        Some(a) if !a.trim().is_empty() => format!("{} - {}", a.trim(), title),
        _ => title.to_string(),
    }
}

/// Derive a title from the file name when the tags carry none.
///
/// Underscores become spaces and leading track-number tokens ("01", "02.",
/// "3 -") are dropped, unless that would leave nothing.
pub fn title_from_stem(path: &Path) -> String {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("UNKNOWN")
        .replace('_', " ");

    let tokens: Vec<&str> = stem.split_whitespace().collect();
    let first_word = tokens
        .iter()
        .position(|t| !is_number_token(t))
        .unwrap_or(tokens.len());

    let kept = if first_word < tokens.len() {
        &tokens[first_word..]
    } else {
        &tokens[..]
    };

    let title = kept.join(" ");
    if title.is_empty() {
        stem.trim().to_string()
    } else {
        title
    }
}

fn is_number_token(token: &str) -> bool {
    let digits = token.trim_end_matches(['.', '-']);
    token == "-" || (!digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()))
}
