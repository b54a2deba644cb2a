//! Bullet derivation from an accumulated stream buffer.
//!
//! The whole buffer is re-split on every chunk rather than parsing chunks
//! incrementally: a bullet marker can arrive split across chunk boundaries,
//! so earlier lines may be edited implicitly as more text accumulates. The
//! result therefore depends only on the accumulated text, never on how it
//! was chunked.

/// Split accumulated text into ordered list items. Each non-empty line
/// becomes one item with its leading bullet marker stripped; a trailing,
/// not-yet-newline-terminated line is included as the last, still-growing
/// item.
pub fn derive_items(buffer: &str) -> Vec<String> {
    buffer
        .lines()
        .map(strip_marker)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

fn strip_marker(line: &str) -> &str {
    let line = line.trim();
    for marker in ["- ", "* ", "\u{2022} "] {
        if let Some(rest) = line.strip_prefix(marker) {
            return rest.trim_start();
        }
    }
    // A bare marker is a bullet still being typed, not content.
    if matches!(line, "-" | "*" | "\u{2022}") {
        return "";
    }
    line
}
