/// Escape a single JSON Pointer reference token.
///
/// `~` must be replaced before `/`, otherwise the `~` of an inserted `~1`
/// would be escaped a second time.
pub fn escape_json_pointer(segment: &str) -> String {
    segment.replace('~', "~0").replace('/', "~1")
}

/// Append `key` as an escaped segment to `parent`.
///
/// `parent` may or may not end in `/`; `"/metadata/labels"` and
/// `"/metadata/labels/"` give the same result.
pub fn child_path(parent: &str, key: &str) -> String {
    let parent = parent.strip_suffix('/').unwrap_or(parent);
    format!("{}/{}", parent, escape_json_pointer(key))
}
