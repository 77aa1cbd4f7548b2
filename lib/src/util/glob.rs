use std::fmt;

use regex::Regex;

use crate::error::{Chainable, ErrorKind, Result};

/// A shell-style file name pattern.
///
/// Supports `*` (any run of characters except `/`), `**` (any run of
/// characters), `?` (one character except `/`), `[...]`/`[!...]` classes,
/// and `{a,b}` alternation. Matching is anchored at both ends.
#[derive(Clone)]
pub struct Glob {
    pattern: String,
    regex: Regex,
}

impl Glob {
    pub fn new(pattern: &str) -> Result<Glob> {
        let regex = Regex::new(&translate(pattern))
            .chain_with(|| error! {
                "invalid glob pattern",
                "pattern" => pattern,
            })
            .kind(ErrorKind::Parse)?;

        Ok(Glob { pattern: pattern.to_string(), regex })
    }

    pub fn as_str(&self) -> &str {
        &self.pattern
    }

    pub fn is_match(&self, name: &str) -> bool {
        self.regex.is_match(name)
    }
}

fn translate(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() * 2 + 2);
    out.push('^');

    let mut chars = pattern.chars().peekable();
    let mut in_alternation = false;
    while let Some(c) = chars.next() {
        match c {
            '*' if chars.peek() == Some(&'*') => {
                chars.next();
                out.push_str(".*");
            }
            '*' => out.push_str("[^/]*"),
            '?' => out.push_str("[^/]"),
            '[' => {
                let mut class = String::new();
                let mut closed = false;
                if chars.peek() == Some(&'!') {
                    chars.next();
                    class.push('^');
                }

                for c in chars.by_ref() {
                    if c == ']' {
                        closed = true;
                        break;
                    }

                    if c == '\\' || c == '[' {
                        class.push('\\');
                    }

                    class.push(c);
                }

                if closed {
                    out.push('[');
                    out.push_str(&class);
                    out.push(']');
                } else {
                    out.push_str(&regex::escape("["));
                    out.push_str(&regex::escape(&class));
                }
            }
            '{' => {
                in_alternation = true;
                out.push_str("(?:");
            }
            ',' if in_alternation => out.push('|'),
            '}' if in_alternation => {
                in_alternation = false;
                out.push(')');
            }
            c => out.push_str(&regex::escape(c.encode_utf8(&mut [0; 4]))),
        }
    }

    if in_alternation {
        out.push(')');
    }

    out.push('$');
    out
}

/// A list of globs; matches if any member matches.
#[derive(Clone, Default)]
pub struct GlobSet {
    globs: Vec<Glob>,
}

impl GlobSet {
    pub fn new<I, S>(patterns: I) -> Result<GlobSet>
        where I: IntoIterator<Item = S>, S: AsRef<str>
    {
        let globs = patterns.into_iter()
            .map(|p| Glob::new(p.as_ref()))
            .collect::<Result<Vec<_>>>()?;

        Ok(GlobSet { globs })
    }

    pub fn is_empty(&self) -> bool {
        self.globs.is_empty()
    }

    pub fn is_match(&self, name: &str) -> bool {
        self.globs.iter().any(|g| g.is_match(name))
    }
}

impl fmt::Debug for Glob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Glob").field(&self.pattern).finish()
    }
}

impl fmt::Debug for GlobSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.globs.iter().map(|g| g.as_str())).finish()
    }
}
