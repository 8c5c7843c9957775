//! Cache key predicates used to select the entries an invalidation touches.
//!
//! A predicate is either an exact key, a key prefix, or a segment pattern in
//! which [`PatternPart::Any`] stands for any single component. Patterns and
//! prefixes also match every longer key that starts with a matching run of
//! components, so `("team-members", *)` covers `("team-members", 7, "page", 2)`.

use std::fmt;

use super::keys::{CacheKey, KeyPart};

/// One position of a [`KeyPredicate::Pattern`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PatternPart {
    Exact(KeyPart),
    Any,
}

impl PatternPart {
    fn matches(&self, part: &KeyPart) -> bool {
        match self {
            PatternPart::Exact(expected) => expected == part,
            PatternPart::Any => true,
        }
    }
}

impl From<KeyPart> for PatternPart {
    fn from(value: KeyPart) -> Self {
        PatternPart::Exact(value)
    }
}

impl From<&str> for PatternPart {
    fn from(value: &str) -> Self {
        PatternPart::Exact(value.into())
    }
}

impl From<i64> for PatternPart {
    fn from(value: i64) -> Self {
        PatternPart::Exact(value.into())
    }
}

impl fmt::Display for PatternPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatternPart::Exact(part) => write!(f, "{}", part),
            PatternPart::Any => f.write_str("*"),
        }
    }
}

/// Selects a set of cache keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeyPredicate {
    /// Matches exactly one key.
    Exact(CacheKey),
    /// Matches the key itself and every key it is a prefix of.
    Prefix(CacheKey),
    /// Matches every key whose leading components match the pattern.
    Pattern(Vec<PatternPart>),
    /// Matches every key.
    All,
}

impl KeyPredicate {
    pub fn exact(key: CacheKey) -> Self {
        KeyPredicate::Exact(key)
    }

    pub fn prefix(key: CacheKey) -> Self {
        KeyPredicate::Prefix(key)
    }

    pub fn pattern(parts: impl IntoIterator<Item = PatternPart>) -> Self {
        KeyPredicate::Pattern(parts.into_iter().collect())
    }

    /// Returns true if `key` is selected by this predicate.
    pub fn matches(&self, key: &CacheKey) -> bool {
        match self {
            KeyPredicate::Exact(expected) => expected == key,
            KeyPredicate::Prefix(prefix) => prefix.is_prefix_of(key),
            KeyPredicate::Pattern(parts) => {
                parts.len() <= key.len()
                    && parts.iter().zip(key.parts()).all(|(p, k)| p.matches(k))
            }
            KeyPredicate::All => true,
        }
    }

    /// Returns true if every key matched by `other` is also matched by `self`.
    pub fn subsumes(&self, other: &KeyPredicate) -> bool {
        let (mine, my_exact) = self.shape();
        let (theirs, their_exact) = other.shape();

        if my_exact {
            return their_exact && mine == theirs;
        }

        mine.len() <= theirs.len()
            && mine.iter().zip(&theirs).all(|(a, b)| match (a, b) {
                (PatternPart::Any, _) => true,
                (PatternPart::Exact(x), PatternPart::Exact(y)) => x == y,
                (PatternPart::Exact(_), PatternPart::Any) => false,
            })
    }

    /// Flattens the predicate into its positional parts plus whether it is
    /// length-bounded (only `Exact` is).
    fn shape(&self) -> (Vec<PatternPart>, bool) {
        match self {
            KeyPredicate::Exact(key) => (exact_parts(key), true),
            KeyPredicate::Prefix(key) => (exact_parts(key), false),
            KeyPredicate::Pattern(parts) => (parts.clone(), false),
            KeyPredicate::All => (Vec::new(), false),
        }
    }
}

fn exact_parts(key: &CacheKey) -> Vec<PatternPart> {
    key.parts().iter().cloned().map(PatternPart::Exact).collect()
}

impl fmt::Display for KeyPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyPredicate::Exact(key) => write!(f, "{}", key),
            KeyPredicate::Prefix(key) => write!(f, "{}:**", key),
            KeyPredicate::Pattern(parts) => {
                for (i, part) in parts.iter().enumerate() {
                    if i > 0 {
                        f.write_str(":")?;
                    }
                    write!(f, "{}", part)?;
                }
                f.write_str(":**")
            }
            KeyPredicate::All => f.write_str("**"),
        }
    }
}

/// Removes predicates already covered by a broader one in the same set.
///
/// When a specific predicate and a prefix that subsumes it are both present
/// only the broader one survives. Equivalent predicates keep their first
/// occurrence. Relative order of the survivors is preserved.
pub fn normalize_predicates(predicates: Vec<KeyPredicate>) -> Vec<KeyPredicate> {
    let redundant: Vec<bool> = predicates
        .iter()
        .enumerate()
        .map(|(i, p)| {
            predicates
                .iter()
                .enumerate()
                .any(|(j, q)| j != i && q.subsumes(p) && (j < i || !p.subsumes(q)))
        })
        .collect();

    predicates
        .into_iter()
        .zip(redundant)
        .filter_map(|(p, drop)| (!drop).then_some(p))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::keys::{
        dashboard_summary_key, team_key, team_members_key, teams_key, tenant_teams_key,
        tenants_filtered_key, tenants_key, TEAM_MEMBERS,
    };

    #[test]
    fn test_exact_match() {
        let predicate = KeyPredicate::exact(team_key(7));
        assert!(predicate.matches(&team_key(7)));
        assert!(!predicate.matches(&team_key(8)));
        assert!(!predicate.matches(&team_key(7).with("extra")));
    }

    #[test]
    fn test_prefix_match() {
        let predicate = KeyPredicate::prefix(tenants_key());
        assert!(predicate.matches(&tenants_key()));
        assert!(predicate.matches(&tenants_filtered_key("active")));
        assert!(!predicate.matches(&teams_key()));
    }

    #[test]
    fn test_pattern_with_wildcard() {
        let predicate = KeyPredicate::pattern([TEAM_MEMBERS.into(), PatternPart::Any]);
        assert!(predicate.matches(&team_members_key(7)));
        assert!(predicate.matches(&team_members_key(9).with("page").with(2)));
        assert!(!predicate.matches(&team_key(7)));
        // A pattern needs at least as many components as it names
        assert!(!predicate.matches(&CacheKey::new(TEAM_MEMBERS)));
    }

    #[test]
    fn test_all_matches_everything() {
        assert!(KeyPredicate::All.matches(&dashboard_summary_key()));
        assert!(KeyPredicate::All.matches(&team_key(1)));
    }

    #[test]
    fn test_prefix_subsumes_exact() {
        let broad = KeyPredicate::prefix(teams_key());
        let narrow = KeyPredicate::exact(tenant_teams_key(42));

        assert!(broad.subsumes(&narrow));
        assert!(!narrow.subsumes(&broad));
    }

    #[test]
    fn test_pattern_subsumes_prefix_and_exact() {
        let pattern = KeyPredicate::pattern([TEAM_MEMBERS.into(), PatternPart::Any]);

        assert!(pattern.subsumes(&KeyPredicate::exact(team_members_key(7))));
        assert!(pattern.subsumes(&KeyPredicate::prefix(team_members_key(7))));
        assert!(!KeyPredicate::exact(team_members_key(7)).subsumes(&pattern));
        assert!(!KeyPredicate::prefix(team_members_key(7)).subsumes(&pattern));
    }

    #[test]
    fn test_exact_subsumes_only_itself() {
        let a = KeyPredicate::exact(team_key(7));
        assert!(a.subsumes(&KeyPredicate::exact(team_key(7))));
        assert!(!a.subsumes(&KeyPredicate::prefix(team_key(7))));
    }

    #[test]
    fn test_normalize_keeps_broader_predicate() {
        let predicates = vec![
            KeyPredicate::exact(tenant_teams_key(42)),
            KeyPredicate::exact(dashboard_summary_key()),
            KeyPredicate::prefix(teams_key()),
        ];

        let normalized = normalize_predicates(predicates);
        assert_eq!(
            normalized,
            vec![
                KeyPredicate::exact(dashboard_summary_key()),
                KeyPredicate::prefix(teams_key()),
            ]
        );
    }

    #[test]
    fn test_normalize_dedupes_equal_predicates() {
        let predicates = vec![
            KeyPredicate::prefix(teams_key()),
            KeyPredicate::prefix(teams_key()),
        ];
        assert_eq!(
            normalize_predicates(predicates),
            vec![KeyPredicate::prefix(teams_key())]
        );
    }

    #[test]
    fn test_normalize_all_swallows_everything() {
        let predicates = vec![
            KeyPredicate::exact(team_key(1)),
            KeyPredicate::All,
            KeyPredicate::prefix(tenants_key()),
        ];
        assert_eq!(normalize_predicates(predicates), vec![KeyPredicate::All]);
    }

    #[test]
    fn test_display() {
        assert_eq!(KeyPredicate::exact(team_key(7)).to_string(), "team:7");
        assert_eq!(KeyPredicate::prefix(teams_key()).to_string(), "teams:**");
        assert_eq!(
            KeyPredicate::pattern([TEAM_MEMBERS.into(), PatternPart::Any]).to_string(),
            "team-members:*:**"
        );
    }
}
