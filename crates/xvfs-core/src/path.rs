//! Guest path handling.
//!
//! Guest paths are `\` separated and compared ASCII case-insensitively.
//! `/` is accepted as an alternative separator on input.

/// Canonical guest path separator.
pub const SEPARATOR: char = '\\';

fn is_separator(c: char) -> bool {
    c == '\\' || c == '/'
}

/// Split a path into its non-empty components, skipping `.`.
pub fn components(path: &str) -> impl Iterator<Item = &str> {
    path.split(is_separator).filter(|c| !c.is_empty() && *c != ".")
}

/// Canonicalize a guest path: unify separators, drop empty and `.`
/// components, resolve `..` against preceding components.
///
/// A leading separator is kept; `..` never climbs above the start.
pub fn canonicalize(path: &str) -> String {
    let absolute = path.starts_with(is_separator);
    let mut parts: Vec<&str> = Vec::new();
    for component in components(path) {
        if component == ".." {
            parts.pop();
        } else {
            parts.push(component);
        }
    }
    let joined = parts.join("\\");
    if absolute {
        format!("\\{joined}")
    } else {
        joined
    }
}

/// Join a parent path and a child name.
pub fn join(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else if parent.ends_with(SEPARATOR) {
        format!("{parent}{name}")
    } else {
        format!("{parent}{SEPARATOR}{name}")
    }
}

/// If `path` starts with `prefix` on a component boundary (ignoring ASCII
/// case), return the remainder without its leading separator.
///
/// Both arguments are expected in canonical form.
pub fn strip_prefix_ignore_case<'a>(path: &'a str, prefix: &str) -> Option<&'a str> {
    if prefix.is_empty() || prefix == "\\" {
        return Some(path.trim_start_matches(SEPARATOR));
    }
    if path.len() < prefix.len() || !path.is_char_boundary(prefix.len()) {
        return None;
    }
    let (head, tail) = path.split_at(prefix.len());
    if !head.eq_ignore_ascii_case(prefix) {
        return None;
    }
    // Drive-style prefixes ("game:") end on their own boundary.
    if tail.is_empty() || prefix.ends_with(':') {
        Some(tail.trim_start_matches(SEPARATOR))
    } else {
        tail.strip_prefix(SEPARATOR)
    }
}

/// Match a name against a guest wildcard pattern.
///
/// `*` matches any run of characters, `?` exactly one. Matching ignores
/// ASCII case. The DOS spelling `*.*` matches every name.
pub fn wildcard_match(pattern: &str, name: &str) -> bool {
    if pattern == "*.*" {
        return true;
    }
    let pattern: Vec<char> = pattern.chars().map(|c| c.to_ascii_lowercase()).collect();
    let name: Vec<char> = name.chars().map(|c| c.to_ascii_lowercase()).collect();

    let (mut p, mut n) = (0, 0);
    // Position of the last `*` and the name index it was tried at.
    let mut backtrack: Option<(usize, usize)> = None;

    while n < name.len() {
        if p < pattern.len() && (pattern[p] == '?' || pattern[p] == name[n]) {
            p += 1;
            n += 1;
        } else if p < pattern.len() && pattern[p] == '*' {
            backtrack = Some((p, n));
            p += 1;
        } else if let Some((star, tried)) = backtrack {
            p = star + 1;
            n = tried + 1;
            backtrack = Some((star, n));
        } else {
            return false;
        }
    }
    pattern[p..].iter().all(|&c| c == '*')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_components() {
        let parts: Vec<_> = components("\\media\\\\sub/./file.bin").collect();
        assert_eq!(parts, vec!["media", "sub", "file.bin"]);
        assert_eq!(components("").count(), 0);
    }

    #[test]
    fn test_canonicalize() {
        assert_eq!(canonicalize("/Device/Cdrom0/"), "\\Device\\Cdrom0");
        assert_eq!(canonicalize("\\a\\b\\..\\c"), "\\a\\c");
        assert_eq!(canonicalize("\\..\\a"), "\\a");
        assert_eq!(canonicalize("game:\\x.xex"), "game:\\x.xex");
        assert_eq!(canonicalize("\\"), "\\");
    }

    #[test]
    fn test_join() {
        assert_eq!(join("", "a"), "a");
        assert_eq!(join("a", "b"), "a\\b");
        assert_eq!(join("\\", "b"), "\\b");
    }

    #[test]
    fn test_strip_prefix_ignore_case() {
        assert_eq!(
            strip_prefix_ignore_case("\\Device\\Cdrom0\\default.xex", "\\device\\CDROM0"),
            Some("default.xex")
        );
        assert_eq!(
            strip_prefix_ignore_case("\\Device\\Cdrom0", "\\Device\\Cdrom0"),
            Some("")
        );
        assert_eq!(
            strip_prefix_ignore_case("\\Device\\Cdrom01\\x", "\\Device\\Cdrom0"),
            None
        );
        assert_eq!(strip_prefix_ignore_case("game:\\a", "GAME:"), Some("a"));
        assert_eq!(strip_prefix_ignore_case("\\a\\b", "\\"), Some("a\\b"));
    }

    #[test]
    fn test_wildcard_match() {
        assert!(wildcard_match("*", "default.xex"));
        assert!(wildcard_match("*.*", "noext"));
        assert!(wildcard_match("*.XEX", "default.xex"));
        assert!(wildcard_match("def?ult.*", "Default.xex"));
        assert!(wildcard_match("a*b*c", "aXXbYYc"));
        assert!(!wildcard_match("a*b*c", "aXXbYY"));
        assert!(!wildcard_match("?", ""));
        assert!(wildcard_match("", ""));
        assert!(!wildcard_match("*.bin", "media"));
    }
}
