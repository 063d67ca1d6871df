//! Placeholder resolution: turns a `Template.namingStructure` plus an
//! `AnalysisResult` into a concrete filesystem path (spec.md §4.5).

use std::path::{Path, PathBuf};

use crate::error::TemplateResolveError;
use crate::pipeline::analysis::AnalysisResult;
use crate::template::case::{change_case, slugify, FileNameCase};
use crate::template::registry::Template;

/// Reserved-word transformers that re-case the value of the immediately
/// preceding placeholder, rather than resolving to an `AnalysisResult`
/// field themselves (spec.md §6 "Placeholder vocabulary").
const TRANSFORMERS: &[(&str, FileNameCase)] = &[
    ("_camel_", FileNameCase::Camel),
    ("_snake_", FileNameCase::Snake),
    ("_kebab_", FileNameCase::Kebab),
    ("_pascal_", FileNameCase::Pascal),
];

/// One `{...}` token found in `namingStructure`, with its byte span in
/// the source string.
struct Token {
    start: usize,
    end: usize,
    name: String,
}

fn find_tokens(structure: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let bytes = structure.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'{' {
            if let Some(rel_end) = structure[i + 1..].find('}') {
                let end = i + 1 + rel_end + 1;
                let name = structure[i + 1..i + 1 + rel_end].to_string();
                tokens.push(Token { start: i, end, name });
                i = end;
                continue;
            }
        }
        i += 1;
    }
    tokens
}

/// Render `namingStructure` against `analysis`, resolving every
/// `{placeholder}` and reserved-word transformer. Returns the rendered
/// `relative/path/filename` string (no extension, no base path, no
/// case/slug transform applied yet — that happens per-segment below).
fn render(structure: &str, analysis: &AnalysisResult) -> String {
    let tokens = find_tokens(structure);
    let mut out = String::new();
    let mut cursor = 0;
    let mut last_value: Option<String> = None;

    for token in &tokens {
        out.push_str(&structure[cursor..token.start]);

        if let Some((_, case)) = TRANSFORMERS.iter().find(|(name, _)| *name == token.name) {
            if let Some(value) = last_value.take() {
                // Replace the text just pushed for the previous value with
                // its re-cased form.
                let trimmed_len = out.len() - value.len();
                out.truncate(trimmed_len);
                out.push_str(&change_case(&value, *case));
            }
            // A transformer token itself contributes nothing further.
        } else {
            match analysis.resolve_field(&token.name) {
                Some(value) => {
                    out.push_str(&value);
                    last_value = Some(value);
                }
                None => {
                    last_value = None;
                }
            }
        }

        cursor = token.end;
    }
    out.push_str(&structure[cursor..]);
    out
}

/// Collapse repeated `/` separators and trim the result, implementing
/// "missing or null values are removed from the rendered output along
/// with any immediately adjacent separator" at the path-segment level.
fn collapse_separators(rendered: &str) -> String {
    let mut collapsed = String::with_capacity(rendered.len());
    let mut last_was_slash = false;
    for c in rendered.chars() {
        if c == '/' {
            if last_was_slash {
                continue;
            }
            last_was_slash = true;
            collapsed.push(c);
        } else {
            last_was_slash = false;
            collapsed.push(c);
        }
    }
    collapsed.trim_matches('/').to_string()
}

/// Expand a leading `~` to the user's home directory, the way template
/// `basePath`s and watcher subscription targets are resolved throughout
/// the core.
pub fn expand_tilde(raw: &str) -> PathBuf {
    if let Some(stripped) = raw.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    } else if raw == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    PathBuf::from(raw)
}

/// Resolve a template and an analysis result into a concrete destination
/// path, *without* an extension — the caller appends the source file's
/// extension. Enforces spec.md §4.4 step 6 / §4.5: when
/// `enforceTemplateStructure` is true and a `selectedFolderPath` was
/// produced, the path must fall under one of the declared folders.
pub fn resolve_path(template: &Template, analysis: &AnalysisResult) -> Result<PathBuf, TemplateResolveError> {
    let rendered = render(&template.naming_structure, analysis);
    let collapsed = collapse_separators(&rendered);

    if collapsed.is_empty() {
        return Err(TemplateResolveError::MissingPlaceholder {
            placeholder: template.naming_structure.clone(),
        });
    }

    let segments: Vec<&str> = collapsed.split('/').filter(|s| !s.is_empty()).collect();
    if segments.is_empty() {
        return Err(TemplateResolveError::MissingPlaceholder {
            placeholder: template.naming_structure.clone(),
        });
    }

    let cased: Vec<String> = segments
        .iter()
        .map(|seg| slugify(&change_case(seg, template.file_name_case)))
        .filter(|seg| !seg.is_empty())
        .collect();

    if cased.is_empty() {
        return Err(TemplateResolveError::MissingPlaceholder {
            placeholder: template.naming_structure.clone(),
        });
    }

    let relative = if let (true, Some(folder)) = (
        template.enforce_template_structure,
        analysis.selected_folder_path.as_ref(),
    ) {
        let allowed = template.folder_structure.clone().unwrap_or_default();
        if !allowed.iter().any(|f| f == folder) {
            return Err(TemplateResolveError::PathNotAllowed {
                selected: folder.clone(),
                allowed,
            });
        }
        let mut path = PathBuf::from(folder);
        // Under enforcement, the folder is fixed; only the filename (last
        // rendered segment) is still driven by `namingStructure`.
        path.push(cased.last().unwrap());
        path
    } else {
        let mut path = PathBuf::new();
        for seg in &cased {
            path.push(seg);
        }
        path
    };

    let base = expand_tilde(&template.base_path);
    Ok(base.join(relative))
}

/// Append the source file's extension to a resolved (extension-less)
/// path.
pub fn with_extension(path: &Path, extension: &str) -> PathBuf {
    if extension.is_empty() {
        path.to_path_buf()
    } else {
        let mut s = path.as_os_str().to_os_string();
        s.push(".");
        s.push(extension);
        PathBuf::from(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::registry::Template;

    fn template(naming: &str, case: FileNameCase) -> Template {
        Template {
            id: "docs".to_string(),
            name: "Docs".to_string(),
            description: String::new(),
            base_path: "~/Documents".to_string(),
            naming_structure: naming.to_string(),
            file_name_case: case,
            folder_structure: None,
            enforce_template_structure: false,
            watch_for_changes: false,
            auto_organize: false,
        }
    }

    #[test]
    fn scenario_plain_text_to_snake_case() {
        let t = template("{file_category_1}/{file_title}", FileNameCase::Snake);
        let analysis = AnalysisResult {
            title: "Q1 Sales Report".to_string(),
            category: "Reports".to_string(),
            ..Default::default()
        };
        let resolved = resolve_path(&t, &analysis).unwrap();
        let expected = expand_tilde("~/Documents").join("reports").join("q1_sales_report");
        assert_eq!(resolved, expected);
    }

    #[test]
    fn missing_placeholder_elides_adjacent_separator() {
        let t = template("{file_category_1}/{file_title}", FileNameCase::Snake);
        let analysis = AnalysisResult {
            title: "Notes".to_string(),
            category: String::new(),
            ..Default::default()
        };
        let resolved = resolve_path(&t, &analysis).unwrap();
        let expected = expand_tilde("~/Documents").join("notes");
        assert_eq!(resolved, expected);
    }

    #[test]
    fn reserved_transformer_recases_preceding_value() {
        // The segment-level `fileNameCase` pass re-applies after every
        // token is substituted (spec.md §4.5), so a transformer's re-cased
        // value only survives intact when it agrees with the template's
        // own case — here both are Camel, so the `_camel_` transformer is
        // a no-op relative to the final pass and the word split it forces
        // ("hello world" -> "hello" + "world") round-trips cleanly.
        let t = template("{file_title}{_camel_}", FileNameCase::Camel);
        let analysis = AnalysisResult {
            title: "hello world".to_string(),
            ..Default::default()
        };
        let resolved = resolve_path(&t, &analysis).unwrap();
        assert_eq!(resolved, expand_tilde("~/Documents").join("helloWorld"));
    }

    #[test]
    fn reserved_transformer_result_is_still_subject_to_the_final_case_pass() {
        // A transformer only affects the text produced by `render()`; the
        // per-segment `fileNameCase` conversion in `resolve_path` always
        // runs afterward over the whole segment, so a transformer whose
        // case disagrees with the template's `fileNameCase` does not
        // survive into the final path.
        let t = template("{file_title}{_camel_}", FileNameCase::Snake);
        let analysis = AnalysisResult {
            title: "hello world".to_string(),
            ..Default::default()
        };
        let resolved = resolve_path(&t, &analysis).unwrap();
        assert_eq!(resolved, expand_tilde("~/Documents").join("hello_world"));
    }

    #[test]
    fn enforced_structure_rejects_path_outside_allowed_list() {
        let mut t = template("{file_category_1}/{file_title}", FileNameCase::Snake);
        t.enforce_template_structure = true;
        t.folder_structure = Some(vec!["Contracts".to_string(), "Personal".to_string()]);
        let analysis = AnalysisResult {
            title: "Lease".to_string(),
            category: "Legal".to_string(),
            selected_folder_path: Some("Invoices".to_string()),
            ..Default::default()
        };
        let err = resolve_path(&t, &analysis).unwrap_err();
        assert!(matches!(err, TemplateResolveError::PathNotAllowed { .. }));
    }

    #[test]
    fn enforced_structure_accepts_allowed_folder() {
        let mut t = template("{file_category_1}/{file_title}", FileNameCase::Snake);
        t.enforce_template_structure = true;
        t.folder_structure = Some(vec!["Contracts".to_string()]);
        let analysis = AnalysisResult {
            title: "Lease".to_string(),
            category: "Legal".to_string(),
            selected_folder_path: Some("Contracts".to_string()),
            ..Default::default()
        };
        let resolved = resolve_path(&t, &analysis).unwrap();
        assert_eq!(resolved, expand_tilde("~/Documents").join("Contracts").join("lease"));
    }

    #[test]
    fn all_entirely_missing_fields_is_an_error() {
        let t = template("{file_title}", FileNameCase::Snake);
        let analysis = AnalysisResult::default();
        assert!(resolve_path(&t, &analysis).is_err());
    }
}
