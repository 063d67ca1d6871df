//! Ambient filesystem safety net.
//!
//! Carried over from the teacher's `security::PathValidator` /
//! `history::store::validate_folder_path` regardless of spec.md's
//! Non-goals: the Organization Pipeline's commit stage and the Watcher's
//! subscription path both consult this before touching a path.

use std::path::{Path, PathBuf};

/// OS/system directories the organizer must never write into or watch
/// directly, even if a template's `basePath` or a resolved target would
/// otherwise land there.
const PROTECTED_PATHS: &[&str] = &[
    "/",
    "/bin",
    "/sbin",
    "/usr",
    "/etc",
    "/var",
    "/System",
    "/Library",
    "/Applications",
    "/private",
    "/dev",
    "/proc",
    "/sys",
];

#[cfg(windows)]
const PROTECTED_PATHS_WINDOWS: &[&str] = &["C:\\Windows", "C:\\Program Files", "C:\\Program Files (x86)"];

/// Validates paths against the protected-directory deny-list.
pub struct PathValidator;

impl PathValidator {
    /// True if `path` is, or lives directly under, a protected system
    /// directory. Canonicalizes when possible so symlink tricks don't
    /// bypass the check; falls back to the given path when it doesn't
    /// exist yet (as is the case for a not-yet-created template folder).
    pub fn is_protected_path(path: &Path) -> bool {
        let check_path = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        let check_str = check_path.to_string_lossy();

        for protected in PROTECTED_PATHS {
            if check_str.as_ref() == *protected {
                return true;
            }
            if check_path.starts_with(protected) {
                // Never block a user's own home directory tree, even if
                // it happens to sit under one of the broader entries above
                // (e.g. /private/var/folders on macOS).
                if let Some(home) = dirs::home_dir() {
                    if check_path.starts_with(&home) {
                        return false;
                    }
                }
                return true;
            }
        }

        #[cfg(windows)]
        {
            for protected in PROTECTED_PATHS_WINDOWS {
                if check_path.starts_with(protected) {
                    return true;
                }
            }
        }

        if let Some(home) = dirs::home_dir() {
            if check_path == home {
                return true;
            }
        }

        false
    }

    /// Validate a user-supplied base path (template `basePath`, watcher
    /// subscription target) before it is used. Rejects path traversal and
    /// protected directories; resolves `~` the same way template
    /// basePaths are resolved elsewhere.
    pub fn validate_base_path(raw: &str) -> Result<PathBuf, String> {
        if raw.contains("..") {
            return Err("path traversal ('..') is not allowed".to_string());
        }

        let expanded = crate::template::expand_tilde(raw);

        if Self::is_protected_path(&expanded) {
            return Err(format!(
                "{} resolves under a protected system directory",
                expanded.display()
            ));
        }

        Ok(expanded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_is_protected() {
        assert!(PathValidator::is_protected_path(Path::new("/")));
        assert!(PathValidator::is_protected_path(Path::new("/etc")));
    }

    #[test]
    fn home_subdirectory_is_not_protected() {
        if let Some(home) = dirs::home_dir() {
            let docs = home.join("Documents");
            assert!(!PathValidator::is_protected_path(&docs));
        }
    }

    #[test]
    fn traversal_is_rejected() {
        assert!(PathValidator::validate_base_path("~/Documents/../../etc").is_err());
    }
}
