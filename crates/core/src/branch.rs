//! Branch name validation.
//!
//! `^[a-z0-9][a-z0-9._/-]*[a-z0-9]$`, no `//`, `..`, `--`, `__`, and the
//! reserved host refs `HEAD`/`origin` are rejected.

const RESERVED: &[&str] = &["HEAD", "origin"];
const DOUBLE_SEPARATORS: &[&str] = &["//", "..", "--", "__"];

/// Validate a branch name against the workspace naming rules.
pub fn validate_branch_name(name: &str) -> Result<(), String> {
    if RESERVED.iter().any(|r| name.eq_ignore_ascii_case(r)) {
        return Err(format!("'{name}' is a reserved ref name"));
    }

    let mut chars = name.chars();
    let first = chars.next().ok_or_else(|| "branch name must not be empty".to_string())?;
    if !is_edge_char(first) {
        return Err(format!("branch name '{name}' must start with a lowercase alphanumeric"));
    }

    let last = name.chars().next_back().expect("non-empty, checked above");
    if !is_edge_char(last) {
        return Err(format!("branch name '{name}' must end with a lowercase alphanumeric"));
    }

    for c in name.chars() {
        if !is_body_char(c) {
            return Err(format!("branch name '{name}' contains invalid character '{c}'"));
        }
    }

    for sep in DOUBLE_SEPARATORS {
        if name.contains(sep) {
            return Err(format!("branch name '{name}' contains disallowed sequence '{sep}'"));
        }
    }

    Ok(())
}

fn is_edge_char(c: char) -> bool {
    c.is_ascii_lowercase() || c.is_ascii_digit()
}

fn is_body_char(c: char) -> bool {
    is_edge_char(c) || matches!(c, '.' | '_' | '/' | '-')
}

#[cfg(test)]
mod tests {
    use super::*;
    use yare::parameterized;

    #[parameterized(
        simple = { "main" },
        with_slash = { "feature/foo" },
        with_dots = { "release.1.2" },
        with_dash = { "feature-1" },
        single_char = { "a" },
    )]
    fn accepts_valid_names(name: &str) {
        assert!(validate_branch_name(name).is_ok(), "{name} should be valid");
    }

    #[parameterized(
        empty = { "" },
        reserved_head = { "HEAD" },
        reserved_origin = { "origin" },
        reserved_origin_mixed_case = { "Origin" },
        leading_upper = { "Feature" },
        leading_dash = { "-feature" },
        trailing_dash = { "feature-" },
        double_slash = { "feature//foo" },
        double_dot = { "feature..foo" },
        double_dash = { "feature--foo" },
        double_underscore = { "feature__foo" },
        invalid_char = { "feature!?" },
    )]
    fn rejects_invalid_names(name: &str) {
        assert!(validate_branch_name(name).is_err(), "{name} should be invalid");
    }

    proptest::proptest! {
        #[test]
        fn never_panics_on_arbitrary_input(s in ".*") {
            let _ = validate_branch_name(&s);
        }
    }
}
