//! Path resolution for user-supplied path tokens.
//!
//! Paths are plain strings. An absolute path starts with `/`, has no
//! trailing `/` (except the root itself) and no empty segments.

/// The root directory.
pub const ROOT: &str = "/";

/// Resolve a path token typed by the player against the current directory.
///
/// - absolute tokens are returned as-is (minus a trailing `/`)
/// - `.` is the current directory, `..` its parent (`..` at `/` stays `/`)
/// - anything else is joined onto the current directory; composed
///   relative tokens such as `a/b` are appended whole, not walked
///   segment by segment
pub fn resolve(token: &str, cwd: &str) -> String {
    let token = trim_trailing_slash(token);
    if token.starts_with('/') {
        return token.to_string();
    }
    match token {
        "" | "." => cwd.to_string(),
        ".." => parent(cwd).to_string(),
        _ => join(cwd, token),
    }
}

/// Join a name (or relative path) onto a directory, root-aware.
pub fn join(dir: &str, name: &str) -> String {
    if dir == ROOT {
        format!("/{name}")
    } else {
        format!("{dir}/{name}")
    }
}

/// Return the parent of an absolute path. The parent of `/` is `/`.
pub fn parent(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) | None => ROOT,
        Some(i) => &path[..i],
    }
}

/// Return the final segment of an absolute path (empty for `/`).
pub fn file_name(path: &str) -> &str {
    match path.rfind('/') {
        Some(i) => &path[i + 1..],
        None => path,
    }
}

/// Iterate over the non-empty segments of a path.
pub fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

/// Every ancestor-or-self prefix of `path`, shortest first, excluding `/`.
///
/// `/a/b/c` yields `/a`, `/a/b`, `/a/b/c`.
pub fn prefixes(path: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    for seg in segments(path) {
        current.push('/');
        current.push_str(seg);
        out.push(current.clone());
    }
    out
}

/// Whether `path` is `ancestor` itself or lies somewhere below it.
pub fn is_within(path: &str, ancestor: &str) -> bool {
    if ancestor == ROOT {
        return path.starts_with('/');
    }
    path == ancestor
        || (path.starts_with(ancestor) && path.as_bytes().get(ancestor.len()) == Some(&b'/'))
}

fn trim_trailing_slash(token: &str) -> &str {
    let trimmed = token.trim_end_matches('/');
    if trimmed.is_empty() && token.starts_with('/') {
        ROOT
    } else {
        trimmed
    }
}
