//! Architectural Enforcement
//!
//! Source-scanning helpers used by the tests in this package. The tests
//! enforce rules the compiler cannot:
//! - The control path never reaches the LED hardware
//! - No panicking shortcuts in production code
//! - No thread sleeps standing in for proper waiting

#![allow(dead_code)]

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Marker after which the rest of a file is test code
pub const TEST_MODULE_MARKER: &str = "#[cfg(test)]";

/// Root of the workspace this package lives in
#[must_use]
pub fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..")
}

/// All `.rs` files under `rel` (a file or directory, relative to the
/// workspace root)
#[must_use]
pub fn rust_sources(rel: &str) -> Vec<PathBuf> {
    let root = workspace_root().join(rel);
    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(&root)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.path().extension().and_then(|s| s.to_str()) == Some("rs"))
        .map(|e| e.path().to_path_buf())
        .collect();
    files.sort();
    files
}

/// Production lines of a source file, comments stripped
///
/// Stops at the first `#[cfg(test)]`; unit tests sit at the bottom of each
/// module in this workspace. Returns `(line_number, code)` pairs.
#[must_use]
pub fn production_lines(path: &Path) -> Vec<(usize, String)> {
    let Ok(content) = fs::read_to_string(path) else {
        return Vec::new();
    };

    let mut lines = Vec::new();
    for (idx, line) in content.lines().enumerate() {
        if line.trim_start().starts_with(TEST_MODULE_MARKER) {
            break;
        }
        let code = line.split("//").next().unwrap_or(line);
        if !code.trim().is_empty() {
            lines.push((idx + 1, code.to_string()));
        }
    }
    lines
}

/// One offending line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// File containing the line
    pub path: PathBuf,
    /// 1-based line number
    pub line: usize,
    /// Offending code
    pub code: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let root = workspace_root();
        let shown = self.path.strip_prefix(&root).unwrap_or(&self.path);
        write!(f, "{}:{} - {}", shown.display(), self.line, self.code.trim())
    }
}

/// Production lines under `dirs` containing any of `patterns`
#[must_use]
pub fn find_patterns(dirs: &[&str], patterns: &[&str]) -> Vec<Violation> {
    let mut violations = Vec::new();
    for dir in dirs {
        for path in rust_sources(dir) {
            for (line, code) in production_lines(&path) {
                if patterns.iter().any(|p| code.contains(p)) {
                    violations.push(Violation {
                        path: path.clone(),
                        line,
                        code,
                    });
                }
            }
        }
    }
    violations
}

/// Panic with a readable report when `violations` is not empty
pub fn assert_clean(rule: &str, violations: &[Violation]) {
    if violations.is_empty() {
        return;
    }
    eprintln!("\n{rule}\n");
    for v in violations {
        eprintln!("  {v}");
    }
    panic!("Found {} violation(s): {rule}", violations.len());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workspace_root_has_manifest() {
        assert!(workspace_root().join("Cargo.toml").exists());
        assert!(workspace_root().join("halo/core/src/lib.rs").exists());
    }

    #[test]
    fn test_production_lines_stop_at_tests() {
        let dir = std::env::temp_dir().join(format!("arch-enforce-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let file = dir.join("sample.rs");
        fs::write(
            &file,
            "fn a() {} // x.unwrap()\n\nfn b() { y.unwrap() }\n#[cfg(test)]\nmod tests { z.unwrap() }\n",
        )
        .unwrap();

        let lines = production_lines(&file);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].0, 1);
        assert!(!lines[0].1.contains("unwrap"));
        assert_eq!(lines[1].0, 3);

        fs::remove_dir_all(&dir).unwrap();
    }
}
