//! Unicode sanitization (§4.10 step 4). Grounded in
//! `original_source/src/learning/UnicodeSanitizer.cpp`'s behavior:
//! strip control characters except TAB/CR/LF, collapse whitespace runs,
//! trim. Idempotent by construction.

/// Returns the sanitized string and whether anything actually changed,
/// so the pipeline can report `SanitizationNeeded` without re-diffing.
pub fn sanitize(input: &str) -> (String, bool) {
    let stripped: String = input
        .chars()
        .filter(|c| !c.is_control() || matches!(c, '\t' | '\r' | '\n'))
        .collect();

    let mut collapsed = String::with_capacity(stripped.len());
    let mut last_was_space = false;
    for c in stripped.chars() {
        if c.is_whitespace() {
            if !last_was_space {
                collapsed.push(' ');
            }
            last_was_space = true;
        } else {
            collapsed.push(c);
            last_was_space = false;
        }
    }

    let trimmed = collapsed.trim().to_string();
    let changed = trimmed != input;
    (trimmed, changed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_is_idempotent() {
        let input = "hello\u{0007}   world\n\n\tfoo";
        let (once, _) = sanitize(input);
        let (twice, changed_again) = sanitize(&once);
        assert_eq!(once, twice);
        assert!(!changed_again);
    }

    #[test]
    fn control_characters_are_stripped_except_tab_cr_lf() {
        // \u{0001} is a disallowed control char and is dropped outright;
        // tab/cr/lf survive the strip step but are still whitespace, so
        // the collapse step folds each run (including theirs) into ' '.
        let (out, changed) = sanitize("a\u{0001}b\tc\rd\ne");
        assert_eq!(out, "ab c d e");
        assert!(changed);
    }

    #[test]
    fn clean_input_reports_unchanged() {
        let (out, changed) = sanitize("already clean");
        assert_eq!(out, "already clean");
        assert!(!changed);
    }
}
