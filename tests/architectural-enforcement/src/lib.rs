//! Architectural Enforcement Integration Tests
//!
//! Source scans that enforce the streaming core's rules:
//! - No sleeping in the session loop or anywhere else in the library
//! - No blocking I/O inside async functions
//! - No `unwrap()`/`expect()` in library code outside tests
//!
//! This library holds the shared scanning helpers; the checks live in
//! `tests/`.

use std::fs;
use std::path::{Path, PathBuf};

/// Library source directories that must obey the rules
pub const PRODUCTION_DIRS: &[&str] = &["tapline/core/src"];

/// One scanned source file
#[derive(Debug)]
pub struct SourceFile {
    /// Path on disk
    pub path: PathBuf,
    /// Lines before the first `#[cfg(test)]`
    pub lines: Vec<String>,
}

impl SourceFile {
    /// Read a file, dropping everything from its test module on
    pub fn read(path: &Path) -> Option<Self> {
        let content = fs::read_to_string(path).ok()?;
        let lines = content
            .lines()
            .take_while(|line| line.trim() != "#[cfg(test)]")
            .map(str::to_string)
            .collect();
        Some(Self {
            path: path.to_path_buf(),
            lines,
        })
    }

    /// Whether the file is a binary entry point
    pub fn is_binary(&self) -> bool {
        self.path.components().any(|c| c.as_os_str() == "bin")
    }

    /// Lines with their 1-based numbers, comments stripped
    pub fn code_lines(&self) -> impl Iterator<Item = (usize, &str)> {
        self.lines.iter().enumerate().filter_map(|(idx, line)| {
            let code = line.split("//").next().unwrap_or(line);
            (!code.trim().is_empty()).then_some((idx + 1, code))
        })
    }
}

/// Workspace root, resolved from this crate's manifest
pub fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../..")
}

/// Every production `.rs` file in [`PRODUCTION_DIRS`]
pub fn production_sources() -> Vec<SourceFile> {
    let root = workspace_root();
    let mut files = Vec::new();

    for dir in PRODUCTION_DIRS {
        let path = root.join(dir);
        if !path.exists() {
            continue;
        }

        for entry in walkdir::WalkDir::new(&path)
            .into_iter()
            .filter_map(Result::ok)
        {
            if entry.path().extension().and_then(|s| s.to_str()) == Some("rs") {
                if let Some(file) = SourceFile::read(entry.path()) {
                    files.push(file);
                }
            }
        }
    }
    files
}

/// Whether line `idx` (0-based) sits inside an `async fn` body
///
/// Scans backwards to the nearest function header.
pub fn is_in_async_function(lines: &[String], idx: usize) -> bool {
    for line in lines[..idx].iter().rev() {
        let line = line.trim();
        if line.contains("async fn ") {
            return true;
        }
        if line.contains("fn ") {
            return false;
        }
        if line.starts_with("mod ") || (line.starts_with("impl") && line.contains('{')) {
            return false;
        }
    }
    false
}

/// Print violations and panic if there are any
pub fn report(rule: &str, violations: &[String]) {
    if violations.is_empty() {
        return;
    }
    eprintln!("\n❌ {rule}\n");
    for violation in violations {
        eprintln!("  ❌ {violation}");
    }
    panic!(
        "\nFound {} violation(s) of: {rule}\nFix these before merging!",
        violations.len()
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(code: &[&str]) -> Vec<String> {
        code.iter().map(|l| (*l).to_string()).collect()
    }

    #[test]
    fn test_async_function_detection() {
        let code = lines(&[
            "async fn run(&mut self) {",
            "    let x = std::fs::read_to_string(\"a\");",
            "}",
            "fn load() {",
            "    let x = std::fs::read_to_string(\"a\");",
            "}",
        ]);
        assert!(is_in_async_function(&code, 1));
        assert!(!is_in_async_function(&code, 4));
    }

    #[test]
    fn test_production_sources_found() {
        let files = production_sources();
        assert!(
            files.iter().any(|f| f.path.ends_with("lib.rs")),
            "tapline/core/src not found from {}",
            workspace_root().display()
        );
    }
}
