//! Integration Test: Panic-Free Library Code
//!
//! **Policy**: Library code propagates errors with `?` and typed errors.
//! `unwrap()` and `expect()` are allowed in tests and in binaries only.

use architectural_enforcement::{production_sources, report};

#[test]
fn test_no_unwrap_in_library_code() {
    let mut violations = Vec::new();

    for file in production_sources().into_iter().filter(|f| !f.is_binary()) {
        for (line_number, code) in file.code_lines() {
            if code.contains(".unwrap()") || code.contains(".expect(") {
                violations.push(format!(
                    "{}:{} - Panicking call: {}",
                    file.path.display(),
                    line_number,
                    code.trim()
                ));
            }
        }
    }

    report("unwrap()/expect() in library code", &violations);
}
