mod glob;

pub use glob::*;

use std::path::{Component, Path, PathBuf};

/// Turns an arbitrary parameter value into a file-system and URL safe path
/// segment.
///
/// Unicode is transliterated to ASCII, ASCII alphanumerics and `_` are kept
/// (lowercased), and every other run of characters collapses into a single
/// `-`. Leading and trailing separators are dropped. A value with nothing
/// left to keep slugs to `_`, so a path segment always results.
pub fn slugify(string: &str) -> String {
    let mut output = String::with_capacity(string.len());

    let mut need_dash = false;
    for ch in string.chars() {
        for b in deunicode::deunicode_char(ch).unwrap_or("-").bytes() {
            match b {
                b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'_' => {
                    if need_dash {
                        output.push('-');
                        need_dash = false;
                    }

                    output.push(b.to_ascii_lowercase() as char);
                }
                _ => need_dash = !output.is_empty(),
            }
        }
    }

    if output.is_empty() {
        output.push('_');
    }

    output
}

/// Returns `true` if `input` is likely to contain template syntax.
pub fn is_template(input: &str) -> bool {
    let mut slice = input.as_bytes();
    while let Some(i) = memchr::memchr(b'{', slice) {
        match slice.get(i + 1) {
            Some(b'{') | Some(b'%') => return true,
            Some(_) => slice = &slice[(i + 1)..],
            None => return false,
        }
    }

    false
}

/// Lexically normalizes `path`: removes `.` components and resolves `..`
/// against preceding normal components. Does not touch the file system.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => { out.pop(); }
                _ => out.push(component),
            },
            c => out.push(c),
        }
    }

    out
}

/// Joins the components of a relative path with `/`, regardless of platform.
pub fn url_path(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}
