//! Filename extraction, sanitization, and collision-safe path allocation.
//!
//! Destination names are derived from the URL (or a caller suggestion),
//! sanitized for filesystem safety, and probed against the target directory
//! so a new transfer never lands on a pre-existing file.

use std::path::{Component, Path, PathBuf};

use url::Url;

/// Derives a filesystem-safe leaf name from a URL.
///
/// Takes the last path segment, percent-decodes it, and strips anything after
/// a stray `?` (query text that survived decoding). When the segment is empty
/// or has no extension, synthesizes `download_<unix_timestamp>.bin`.
#[must_use]
pub fn filename_from_url(url: &Url) -> String {
    let segment = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .unwrap_or("");

    let decoded = urlencoding::decode(segment)
        .map(std::borrow::Cow::into_owned)
        .unwrap_or_else(|_| segment.to_string());

    let name = decoded.split('?').next().unwrap_or("");
    if name.is_empty() || !name.contains('.') {
        return timestamp_fallback();
    }

    let sanitized = sanitize_filename(name);
    if sanitized.trim_matches('_').is_empty() {
        timestamp_fallback()
    } else {
        sanitized
    }
}

fn timestamp_fallback() -> String {
    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    format!("download_{timestamp}.bin")
}

/// Sanitizes a filename for filesystem safety.
///
/// Replaces characters that are invalid on common filesystems
/// (`/ \ : * ? " < > |`) and control characters with `_`. Dot-only segments
/// (`.`, `..`) are rewritten so the name can never traverse out of the
/// target directory.
#[must_use]
pub fn sanitize_filename(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    if sanitized.is_empty() {
        return "_".to_string();
    }

    if is_safe_filename_segment(&sanitized) {
        sanitized
    } else {
        sanitized
            .chars()
            .map(|c| if c == '.' { '_' } else { c })
            .collect()
    }
}

fn is_safe_filename_segment(name: &str) -> bool {
    !Path::new(name).components().any(|component| {
        matches!(
            component,
            Component::CurDir | Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    })
}

/// Resolves a collision-free destination path in `dir`.
///
/// If `name.ext` is taken, probes `name (1).ext`, `name (2).ext`, ... until a
/// free slot is found. A slot is taken when the file exists on disk or when
/// the `occupied` predicate claims it (the engine passes a predicate over
/// active registry destinations so two concurrent transfers with colliding
/// names get distinct paths).
///
/// Disk probing is not atomic against concurrent external file creation;
/// callers are assumed to serialize transfers per directory outside this
/// engine's registry.
#[must_use]
pub fn resolve_unique_path<F>(dir: &Path, filename: &str, occupied: F) -> PathBuf
where
    F: Fn(&Path) -> bool,
{
    let filename = {
        let sanitized = sanitize_filename(filename);
        if sanitized.contains('/')
            || sanitized.contains('\\')
            || sanitized.trim_matches('_').is_empty()
        {
            timestamp_fallback()
        } else {
            sanitized
        }
    };

    let is_taken = |path: &Path| path.exists() || occupied(path);

    let base_path = dir.join(&filename);
    if !is_taken(&base_path) {
        return base_path;
    }

    let (stem, ext) = match filename.rfind('.') {
        Some(pos) => (&filename[..pos], &filename[pos..]),
        None => (filename.as_str(), ""),
    };

    for i in 1..10_000 {
        let candidate = dir.join(format!("{stem} ({i}){ext}"));
        if !is_taken(&candidate) {
            return candidate;
        }
    }

    // Fallback (extremely unlikely)
    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    dir.join(format!("{stem} ({timestamp}){ext}"))
}

/// Returns true when the URL path looks like a direct link to a downloadable
/// file rather than a navigable page.
///
/// Heuristic used by the browsing surface to decide between navigation and
/// handing the URL to the engine.
#[must_use]
pub fn is_downloadable_url(url: &str) -> bool {
    const DOWNLOADABLE_EXTENSIONS: &[&str] = &[
        ".exe", ".msi", ".zip", ".rar", ".7z", ".tar", ".gz", ".bz2", ".pdf", ".doc", ".docx",
        ".xls", ".xlsx", ".ppt", ".pptx", ".mp4", ".mp3", ".avi", ".mkv", ".mov", ".wav", ".flac",
        ".jpg", ".jpeg", ".png", ".gif", ".bmp", ".webp", ".svg", ".iso", ".dmg", ".apk", ".deb",
        ".rpm", ".torrent", ".crx", ".jar",
    ];

    let Ok(parsed) = Url::parse(url) else {
        return false;
    };
    let path = parsed.path().to_lowercase();
    DOWNLOADABLE_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}
