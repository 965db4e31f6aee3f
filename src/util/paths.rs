use std::path::{Component, Path, PathBuf};

/// Interpret a `/`-separated blob path as a relative filesystem path.
///
/// Rejects empty paths, absolute paths and any `..` or `.` segment.
pub fn safe_relative(path: &str) -> Option<PathBuf> {
    let trimmed = path.trim_start_matches('/');
    if trimmed.is_empty() || trimmed.len() != path.len() {
        return None;
    }

    let mut relative = PathBuf::new();
    for segment in trimmed.split('/') {
        if segment.is_empty() || segment == "." || segment == ".." || segment.contains('\\') {
            return None;
        }
        relative.push(segment);
    }
    Some(relative)
}

/// Render a relative filesystem path back into a `/`-separated blob path.
pub fn to_blob_path(relative: &Path) -> Option<String> {
    let mut segments = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(segment) => segments.push(segment.to_str()?),
            _ => return None,
        }
    }
    (!segments.is_empty()).then(|| segments.join("/"))
}
