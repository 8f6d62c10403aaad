//! Virtual path resolution.
//!
//! Resolution is purely syntactic: it never consults the tree, so it always
//! succeeds, even for paths that do not exist.

/// Resolve `path` against the working directory `pwd` into canonical
/// segments. The empty result denotes the root directory.
///
/// Absolute paths start from root. Relative paths start from `pwd`, which is
/// itself normalized the same way. Empty components are dropped, `.` is
/// skipped and `..` pops one segment (a no-op at root).
pub fn resolve(path: &str, pwd: &str) -> Vec<String> {
    let mut segments = Vec::new();
    if !path.starts_with('/') {
        apply(&mut segments, pwd);
    }
    apply(&mut segments, path);
    segments
}

fn apply(segments: &mut Vec<String>, path: &str) {
    for part in components(path) {
        match part {
            "." => {},
            ".." => {
                segments.pop();
            },
            other => segments.push(other.to_string()),
        }
    }
}

/// Render segments as an absolute path string (`/` for root).
pub fn display<S: AsRef<str>>(segments: &[S]) -> String {
    if segments.is_empty() {
        return "/".to_string();
    }
    let mut out = String::new();
    for seg in segments {
        out.push('/');
        out.push_str(seg.as_ref());
    }
    out
}

/// Resolve and render in one step.
pub fn resolve_display(path: &str, pwd: &str) -> String {
    display(&resolve(path, pwd))
}

/// Whether `segments` lies at or below `prefix`, compared segment-wise so
/// that `/rootkit` is not under `/root`.
pub fn is_within<S: AsRef<str>, P: AsRef<str>>(segments: &[S], prefix: &[P]) -> bool {
    segments.len() >= prefix.len()
        && segments
            .iter()
            .zip(prefix)
            .all(|(a, b)| a.as_ref() == b.as_ref())
}

/// Split resolved segments into parent segments and the final name.
/// Returns `None` for root.
pub fn split_last(segments: &[String]) -> Option<(&[String], &str)> {
    let (name, parent) = segments.split_last()?;
    Some((parent, name.as_str()))
}

/// Non-empty components of a path string.
pub fn components(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|c| !c.is_empty())
}
