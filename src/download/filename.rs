//! Filename generation and collision resolution.

use std::path::{Path, PathBuf};

/// Characters that are invalid in filenames on at least one target OS.
const INVALID_CHARS: [char; 9] = ['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

fn is_invalid(c: char) -> bool {
    INVALID_CHARS.contains(&c)
}

/// Remove every invalid filename character.
pub fn sanitize_component(name: &str) -> String {
    name.chars().filter(|&c| !is_invalid(c)).collect()
}

/// Build `"artist - title.ext"` with invalid characters stripped.
pub fn generate_filename(artist: &str, title: &str, extension: &str) -> String {
    format!(
        "{} - {}.{}",
        sanitize_component(artist),
        sanitize_component(title),
        extension
    )
}

/// Folder name for an album: invalid characters become `-`, then trimmed.
pub fn clean_folder_name(name: &str) -> String {
    name.chars()
        .map(|c| if is_invalid(c) { '-' } else { c })
        .collect::<String>()
        .trim()
        .to_string()
}

/// Return `path` if nothing exists there, otherwise the first free
/// `"<stem> - N.<ext>"` for N = 2, 3, ...
pub fn uniquify(path: &Path) -> PathBuf {
    first_free(path, |candidate| !candidate.exists())
}

/// Like [`uniquify`], but also requires the same name with
/// `sibling_extension` to be free.
///
/// Downloads write into a lossless temp file next to the final name; this
/// keeps that temp file from landing on an existing file.
pub fn uniquify_with_sibling(path: &Path, sibling_extension: &str) -> PathBuf {
    first_free(path, |candidate| {
        !candidate.exists() && !candidate.with_extension(sibling_extension).exists()
    })
}

fn first_free(path: &Path, is_free: impl Fn(&Path) -> bool) -> PathBuf {
    if is_free(path) {
        return path.to_path_buf();
    }

    let parent = path.parent().unwrap_or_else(|| Path::new(""));
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = path.extension().map(|e| e.to_string_lossy().into_owned());

    (2u32..)
        .map(|n| {
            let name = match &extension {
                Some(ext) => format!("{} - {}.{}", stem, n, ext),
                None => format!("{} - {}", stem, n),
            };
            parent.join(name)
        })
        .find(|candidate| is_free(candidate))
        .unwrap_or_else(|| path.to_path_buf())
}
