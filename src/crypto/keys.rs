//! Recipient sets and locally available keys

use std::collections::HashSet;
use std::fmt;

/// Ordered set of unique recipient key identifiers
///
/// Order is kept so a declaration file round-trips unchanged, but two sets
/// compare equal when they hold the same identifiers in any order.
#[derive(Debug, Clone, Default)]
pub struct RecipientSet {
    ids: Vec<String>,
}

impl RecipientSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from identifiers, trimming whitespace and dropping blanks and duplicates
    pub fn from_ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = Self::new();
        for id in ids {
            set.insert(id.as_ref());
        }
        set
    }

    /// Parse declaration file contents: one identifier per line, `#` starts a comment
    pub fn parse(content: &str) -> Self {
        Self::from_ids(content.lines().map(|line| match line.find('#') {
            Some(idx) => &line[..idx],
            None => line,
        }))
    }

    /// Render as declaration file contents
    pub fn to_file_contents(&self) -> String {
        let mut out = String::new();
        for id in &self.ids {
            out.push_str(id);
            out.push('\n');
        }
        out
    }

    /// Add an identifier; returns false for blanks and duplicates
    pub fn insert(&mut self, id: &str) -> bool {
        let id = id.trim();
        if id.is_empty() || self.contains(id) {
            return false;
        }
        self.ids.push(id.to_string());
        true
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.iter().any(|existing| existing == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.ids.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Whether at least one recipient can be decrypted with a local key
    pub fn any_usable(&self, keys: &[KeyInfo]) -> bool {
        self.iter().any(|id| keys.iter().any(|key| key.matches(id)))
    }
}

impl PartialEq for RecipientSet {
    fn eq(&self, other: &Self) -> bool {
        let a: HashSet<&str> = self.iter().collect();
        let b: HashSet<&str> = other.iter().collect();
        a == b
    }
}

impl Eq for RecipientSet {}

impl fmt::Display for RecipientSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.ids.join(", "))
    }
}

impl<'a> IntoIterator for &'a RecipientSet {
    type Item = &'a String;
    type IntoIter = std::slice::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.ids.iter()
    }
}

/// A key with locally available secret material
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyInfo {
    /// Long (16 hex digit) key id
    pub key_id: String,
    /// Full fingerprint, when known
    pub fingerprint: Option<String>,
    /// User ids, e.g. `Alice <alice@example.org>`
    pub user_ids: Vec<String>,
}

impl KeyInfo {
    pub fn new(key_id: impl Into<String>) -> Self {
        KeyInfo {
            key_id: key_id.into(),
            ..Default::default()
        }
    }

    /// Whether a recipient identifier from a declaration file names this key
    ///
    /// Accepts the key id, the fingerprint or a fingerprint suffix (case
    /// insensitive, optional `0x`), or text found in one of the user ids.
    pub fn matches(&self, recipient: &str) -> bool {
        if recipient.trim().eq_ignore_ascii_case(&self.key_id) {
            return true;
        }
        let hex = normalize_hex(recipient);
        if !hex.is_empty() {
            if hex.eq_ignore_ascii_case(&self.key_id) {
                return true;
            }
            if let Some(fpr) = &self.fingerprint {
                let fpr = fpr.to_ascii_uppercase();
                if hex.len() >= 8 && fpr.ends_with(&hex) {
                    return true;
                }
            }
        }
        let needle = recipient.trim().to_lowercase();
        !needle.is_empty()
            && self
                .user_ids
                .iter()
                .any(|uid| uid.to_lowercase().contains(&needle))
    }
}

/// Uppercase hex digits of an identifier, or empty when it is not hex
fn normalize_hex(id: &str) -> String {
    let id = id.trim();
    let id = id
        .strip_prefix("0x")
        .or_else(|| id.strip_prefix("0X"))
        .unwrap_or(id);
    if !id.is_empty() && id.chars().all(|c| c.is_ascii_hexdigit()) {
        id.to_ascii_uppercase()
    } else {
        String::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_skips_blanks_comments_and_duplicates() {
        let set = RecipientSet::parse("K1\n\n# team key\nK2 # laptop\nK1\n");
        assert_eq!(set.iter().collect::<Vec<_>>(), vec!["K1", "K2"]);
        assert_eq!(set.to_file_contents(), "K1\nK2\n");
    }

    #[test]
    fn test_equality_ignores_order() {
        assert_eq!(
            RecipientSet::from_ids(["K1", "K2"]),
            RecipientSet::from_ids(["K2", "K1"])
        );
        assert_ne!(
            RecipientSet::from_ids(["K1"]),
            RecipientSet::from_ids(["K1", "K2"])
        );
    }

    #[test]
    fn test_key_matching() {
        let key = KeyInfo {
            key_id: "0123456789ABCDEF".to_string(),
            fingerprint: Some("AAAABBBBCCCCDDDDEEEEFFFF0123456789ABCDEF".to_string()),
            user_ids: vec!["Alice <alice@example.org>".to_string()],
        };

        assert!(key.matches("0x0123456789abcdef"));
        assert!(key.matches("89ABCDEF"));
        assert!(key.matches("AAAABBBBCCCCDDDDEEEEFFFF0123456789ABCDEF"));
        assert!(key.matches("alice@example.org"));
        assert!(!key.matches("bob@example.org"));
        assert!(!key.matches("FEDCBA98"));
    }

    #[test]
    fn test_any_usable() {
        let keys = vec![KeyInfo::new("K1")];
        assert!(!RecipientSet::from_ids(["K2"]).any_usable(&keys));
        assert!(RecipientSet::from_ids(["K2", "K1"]).any_usable(&keys));
    }
}
