/// Match `path` against a glob `pattern` (`*`, `**`, `?`, `[abc]`), used by watch-config
/// ignore lists. Thin wrapper over the `glob` crate's `Pattern` so callers don't need to
/// depend on it directly.
pub fn glob_matches(pattern: &str, path: &str) -> bool {
    match glob::Pattern::new(pattern) {
        Ok(p) => p.matches(path),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_wildcard() {
        assert!(glob_matches("*.log", "output.log"));
        assert!(!glob_matches("*.log", "output.txt"));
    }

    #[test]
    fn matches_recursive_glob() {
        assert!(glob_matches("target/**/*.rs", "target/debug/build/main.rs"));
    }

    #[test]
    fn invalid_pattern_never_matches() {
        assert!(!glob_matches("[", "anything"));
    }
}
