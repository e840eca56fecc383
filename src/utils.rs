use crate::error::{RestError, Result};

pub const SEPARATOR: char = '/';

pub fn is_absolute(path: &str) -> bool {
    path.starts_with(SEPARATOR)
}

/// Collapses repeated separators and drops trailing ones. The root stays `/`.
pub fn normalize(path: &str) -> String {
    let absolute = is_absolute(path);
    let joined = path
        .split(SEPARATOR)
        .filter(|seg| !seg.is_empty())
        .collect::<Vec<_>>()
        .join("/");
    if absolute { format!("/{joined}") } else { joined }
}

/// Path lookups skip leading spaces, and a relative path starting with a run of `.`
/// characters keeps only the last one: `../x` and `./x` both mean `x` under the start
/// object. There is no parent-directory notation.
pub fn clean_lookup_path(path: &str) -> &str {
    let mut path = path.trim_start_matches(' ');
    if !is_absolute(path) {
        while path.starts_with("..") {
            path = &path[1..];
        }
    }
    path
}

/// Everything before the last separator. `a` has an empty dirname; `/a` has `/`.
pub fn dirname(path: &str) -> &str {
    match path.rfind(SEPARATOR) {
        Some(0) => "/",
        Some(idx) => &path[..idx],
        None => "",
    }
}

pub fn basename(path: &str) -> &str {
    match path.rfind(SEPARATOR) {
        Some(idx) => &path[idx + 1..],
        None => path,
    }
}

/// Splits the name of an object about to be created into the path of the group that will
/// hold its link and the link name. Trailing separators are ignored.
pub fn split_link_path(path: &str) -> Result<(&str, &str)> {
    let trimmed = path.trim_end_matches(SEPARATOR);
    let base = basename(trimmed);
    if base.is_empty() || base == "." {
        return Err(RestError::Argument(format!(
            "can't determine a link name from path '{path}'"
        )));
    }
    Ok((dirname(trimmed), base))
}

/// The absolute path a new handle will report, given its parent's path and the name used to
/// reach it. Anonymous objects, and objects under an anonymous parent, have none.
pub fn join_handle_path(parent: Option<&str>, name: &str) -> Option<String> {
    if is_absolute(name) {
        return Some(normalize(name));
    }
    let parent = parent?;
    let name = clean_lookup_path(name);
    if name.is_empty() || name == "." {
        return Some(normalize(parent));
    }
    let name = name.strip_prefix("./").unwrap_or(name);
    Some(normalize(&format!("{parent}/{name}")))
}
