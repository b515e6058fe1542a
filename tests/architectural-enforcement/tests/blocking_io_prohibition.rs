//! Integration Test: Blocking I/O Prohibition
//!
//! **Policy**: Async code in the streaming library MUST NOT block. Session
//! tasks share the runtime; one blocked task stalls every other session.
//! **Required**: `tokio::fs`, `tokio::net` and async reqwest inside `async fn`.
//! Configuration loading runs before sessions exist and may use `std::fs`
//! from a plain `fn`.

use architectural_enforcement::{is_in_async_function, production_sources, report};

#[test]
fn test_no_blocking_io_in_async_code() {
    let mut violations = Vec::new();

    for file in production_sources() {
        for (line_number, code) in file.code_lines() {
            let in_async = is_in_async_function(&file.lines, line_number - 1);

            if code.contains("reqwest::blocking") || code.contains("std::net::") {
                violations.push(format!(
                    "{}:{} - Blocking network I/O: {}",
                    file.path.display(),
                    line_number,
                    code.trim()
                ));
            }

            if in_async && code.contains("std::fs::") {
                violations.push(format!(
                    "{}:{} - Blocking file I/O in async fn: {}",
                    file.path.display(),
                    line_number,
                    code.trim()
                ));
            }

            if in_async && code.contains("std::process::Command") {
                violations.push(format!(
                    "{}:{} - Blocking process I/O in async fn: {}",
                    file.path.display(),
                    line_number,
                    code.trim()
                ));
            }
        }
    }

    report("blocking I/O in async code", &violations);
}
