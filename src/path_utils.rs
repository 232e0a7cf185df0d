// src/path_utils.rs
//
// Pure path/prefix helpers shared by every backend. Callers always pass
// forward-slash paths; backend-specific escaping never leaks past here.

/// The logical separator used across all backends.
pub const SEPARATOR: char = '/';

/// Normalize Windows-style separators to the logical one.
pub fn normalize_separators(path: &str) -> String {
    path.replace('\\', "/")
}

/// Split on the first separator: `"a/b/c"` → `(Some("a"), "b/c")`,
/// `"file"` → `(None, "file")`. Used to decide whether a path carries a
/// directory component at all.
pub fn split_prefix(path: &str) -> (Option<&str>, &str) {
    match path.split_once(SEPARATOR) {
        Some((head, rest)) => (Some(head), rest),
        None => (None, path),
    }
}

/// Append the separator unless the string is empty or already ends with one.
/// Keeps `"foo"` from matching `"foobar"` in prefix queries.
pub fn ensure_trailing_slash(s: &str) -> String {
    if s.is_empty() || s.ends_with(SEPARATOR) {
        s.to_string()
    } else {
        format!("{s}/")
    }
}

/// Normalize a rename target into a key prefix. `""` and `"."` both mean
/// "the container root" and collapse to the empty prefix.
pub fn target_prefix(new_name: &str) -> String {
    if new_name.is_empty() || new_name == "." {
        String::new()
    } else {
        ensure_trailing_slash(new_name)
    }
}

/// Everything before the last separator, or `None` for a bare leaf.
pub fn parent_prefix(path: &str) -> Option<&str> {
    path.rsplit_once(SEPARATOR).map(|(parent, _)| parent)
}

/// The leaf segment after the last separator.
pub fn file_name(path: &str) -> &str {
    path.rsplit_once(SEPARATOR).map_or(path, |(_, leaf)| leaf)
}
