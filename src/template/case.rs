//! Filename/path-segment case conventions and slugification.
//!
//! Grounded on the teacher's `ai/grok/types.rs::sanitize_filename` /
//! `sanitize_folder_path` (strip characters outside `[A-Za-z0-9._-]`,
//! collapse repeated separators), generalized to the six case conventions
//! of spec.md §4.5.

use serde::{Deserialize, Serialize};

/// One of the six closed-set case conventions a `Template` may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileNameCase {
    Snake,
    Kebab,
    Camel,
    Pascal,
    UpperSnake,
    LowerSnake,
}

impl FileNameCase {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "snake" => Some(Self::Snake),
            "kebab" => Some(Self::Kebab),
            "camel" => Some(Self::Camel),
            "pascal" => Some(Self::Pascal),
            "upper_snake" => Some(Self::UpperSnake),
            "lower_snake" => Some(Self::LowerSnake),
            _ => None,
        }
    }
}

/// Split `s` into words on whitespace, `_`, `-`, and camelCase boundaries,
/// lowercasing and dropping anything outside `[A-Za-z0-9]` within a word.
fn words(s: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut prev_lower = false;

    for c in s.chars() {
        if c.is_whitespace() || c == '_' || c == '-' {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            prev_lower = false;
            continue;
        }
        if c.is_ascii_uppercase() && prev_lower {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
        }
        if c.is_alphanumeric() {
            prev_lower = c.is_lowercase() || c.is_numeric();
            current.push(c.to_ascii_lowercase());
        }
        // anything else (punctuation) is dropped, matching the teacher's
        // "strip characters outside [A-Za-z0-9._-]" sanitizer.
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

/// Apply a case convention to a single path segment or filename stem.
/// Idempotent: `change_case(change_case(s, c), c) == change_case(s, c)`
/// for any slug-safe input (testable property R2).
pub fn change_case(s: &str, case: FileNameCase) -> String {
    let parts = words(s);
    if parts.is_empty() {
        return String::new();
    }

    match case {
        FileNameCase::Snake | FileNameCase::LowerSnake => parts.join("_"),
        FileNameCase::Kebab => parts.join("-"),
        FileNameCase::UpperSnake => parts
            .iter()
            .map(|w| w.to_ascii_uppercase())
            .collect::<Vec<_>>()
            .join("_"),
        FileNameCase::Camel => {
            let mut out = String::new();
            for (i, w) in parts.iter().enumerate() {
                if i == 0 {
                    out.push_str(w);
                } else {
                    out.push_str(&capitalize(w));
                }
            }
            out
        }
        FileNameCase::Pascal => parts.iter().map(|w| capitalize(w)).collect(),
    }
}

fn capitalize(w: &str) -> String {
    let mut chars = w.chars();
    match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}

/// Strip characters outside `[A-Za-z0-9._-]` and collapse repeated
/// separators, the way `sanitize_folder_path` does for each `/`-delimited
/// segment. Applied to a segment *after* case conversion, so the case
/// transform's own separators (`_`, `-`) survive.
pub fn slugify(s: &str) -> String {
    let mut out = String::new();
    let mut last_was_sep = false;
    for c in s.chars() {
        let keep = c.is_alphanumeric() || c == '.' || c == '_' || c == '-';
        if keep {
            let is_sep = c == '_' || c == '-';
            if is_sep && last_was_sep {
                continue;
            }
            out.push(c);
            last_was_sep = is_sep;
        } else {
            last_was_sep = false;
        }
    }
    out.trim_matches(|c| c == '_' || c == '-').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snake_case() {
        assert_eq!(change_case("hello world", FileNameCase::Snake), "hello_world");
    }

    #[test]
    fn kebab_case() {
        assert_eq!(change_case("hello world", FileNameCase::Kebab), "hello-world");
    }

    #[test]
    fn camel_case() {
        assert_eq!(change_case("hello world", FileNameCase::Camel), "helloWorld");
    }

    #[test]
    fn pascal_case() {
        assert_eq!(change_case("hello world", FileNameCase::Pascal), "HelloWorld");
    }

    #[test]
    fn upper_snake_case() {
        assert_eq!(change_case("hello world", FileNameCase::UpperSnake), "HELLO_WORLD");
    }

    #[test]
    fn lower_snake_case() {
        assert_eq!(change_case("Hello World", FileNameCase::LowerSnake), "hello_world");
    }

    #[test]
    fn idempotent_for_every_case() {
        for case in [
            FileNameCase::Snake,
            FileNameCase::Kebab,
            FileNameCase::Camel,
            FileNameCase::Pascal,
            FileNameCase::UpperSnake,
            FileNameCase::LowerSnake,
        ] {
            let once = change_case("Quarterly Sales Report", case);
            let twice = change_case(&once, case);
            assert_eq!(once, twice, "case {:?} is not idempotent", case);
        }
    }

    #[test]
    fn slugify_strips_disallowed_characters() {
        assert_eq!(slugify("q1__sales--report!!.txt"), "q1_sales-report.txt");
    }
}
