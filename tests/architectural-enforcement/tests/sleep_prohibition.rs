//! Integration Test: Sleep Prohibition
//!
//! **Policy**: The streaming library MUST NOT sleep. Sessions wait on the
//! transport or their cancellation token, never on a timer. Callers that
//! want a timeout race one against `SessionHandle::wait`.

use architectural_enforcement::{production_sources, report};

#[test]
fn test_no_sleep_in_production_code() {
    let mut violations = Vec::new();

    for file in production_sources() {
        for (line_number, code) in file.code_lines() {
            if code.contains("thread::sleep") || code.contains("time::sleep") {
                violations.push(format!(
                    "{}:{} - Sleep call: {}",
                    file.path.display(),
                    line_number,
                    code.trim()
                ));
            }
        }
    }

    report("sleep in production code", &violations);
}
