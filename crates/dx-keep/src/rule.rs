//! Keep rules
//!
//! Structured retention rules as handed over by the external rule
//! parser. A rule names a class pattern (descriptor-shaped, `*`
//! wildcard), optionally a member pattern, and a kind stating what
//! treatment the matched symbols must retain or forgo. Conflicting
//! demands are rejected up front, before any optimization runs.

use serde::{Deserialize, Serialize};

/// Treatment a rule demands for matched symbols
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeepKind {
    /// Retain identity, presence, and prototype
    Pin,
    /// Retain identity only (the symbol may still be removed if dead)
    NoRename,
    /// Exclude from class merging
    NoMerge,
    /// Exclude from inlining
    NoInline,
    /// Suppress unresolved-reference diagnostics for matched classes
    DontWarn,
    /// Assume the symbol absent; references to it may be elided
    AssumeRemoved,
}

/// Descriptor-shaped name pattern with `*` matching any run of
/// characters
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NamePattern(String);

impl NamePattern {
    /// Create a pattern
    #[inline]
    #[must_use]
    pub fn new(pattern: impl Into<String>) -> Self {
        Self(pattern.into())
    }

    /// Pattern text
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the pattern contains no wildcard
    #[inline]
    #[must_use]
    pub fn is_exact(&self) -> bool {
        !self.0.contains('*')
    }

    /// Match a candidate against the pattern
    #[must_use]
    pub fn matches(&self, candidate: &str) -> bool {
        Self::matches_at(self.0.as_bytes(), candidate.as_bytes())
    }

    fn matches_at(pattern: &[u8], candidate: &[u8]) -> bool {
        match pattern.split_first() {
            None => candidate.is_empty(),
            Some((b'*', rest)) => (0..=candidate.len())
                .any(|skip| Self::matches_at(rest, &candidate[skip..])),
            Some((ch, rest)) => candidate
                .split_first()
                .map_or(false, |(first, tail)| first == ch && Self::matches_at(rest, tail)),
        }
    }
}

/// Member half of a rule: matches field and method names
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MemberPattern {
    /// Member-name pattern
    pub name: NamePattern,
}

impl MemberPattern {
    /// Pattern matching any member
    #[inline]
    #[must_use]
    pub fn any() -> Self {
        Self {
            name: NamePattern::new("*"),
        }
    }

    /// Pattern matching one member name exactly
    #[inline]
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: NamePattern::new(name),
        }
    }
}

/// One keep rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeepRule {
    /// Demanded treatment
    pub kind: KeepKind,
    /// Class pattern over type descriptors
    pub class: NamePattern,
    /// Member pattern; a class-level rule when absent
    pub member: Option<MemberPattern>,
}

impl KeepRule {
    /// Class-level rule
    #[inline]
    #[must_use]
    pub fn class_rule(kind: KeepKind, class: impl Into<String>) -> Self {
        Self {
            kind,
            class: NamePattern::new(class),
            member: None,
        }
    }

    /// Member-level rule
    #[inline]
    #[must_use]
    pub fn member_rule(
        kind: KeepKind,
        class: impl Into<String>,
        member: MemberPattern,
    ) -> Self {
        Self {
            kind,
            class: NamePattern::new(class),
            member: Some(member),
        }
    }

    /// Whether this rule applies to a class as a whole
    #[inline]
    #[must_use]
    pub fn is_class_level(&self) -> bool {
        self.member.is_none()
    }
}

/// Rule-set validation errors
#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    /// Two rules demand incompatible treatments for the same symbols
    #[error("conflicting rules for {pattern}: {first:?} vs {second:?}")]
    Conflict {
        /// The shared class pattern
        pattern: String,
        /// First demanded treatment
        first: KeepKind,
        /// Incompatible second treatment
        second: KeepKind,
    },
}

/// Validated rule collection
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<KeepRule>,
}

impl RuleSet {
    /// Validate and wrap a rule list
    ///
    /// # Errors
    /// Returns [`RuleError::Conflict`] when one rule pins a symbol that
    /// another rule assumes removed.
    pub fn new(rules: Vec<KeepRule>) -> Result<Self, RuleError> {
        for (index, rule) in rules.iter().enumerate() {
            for other in &rules[index + 1..] {
                let incompatible = matches!(
                    (rule.kind, other.kind),
                    (KeepKind::Pin, KeepKind::AssumeRemoved)
                        | (KeepKind::AssumeRemoved, KeepKind::Pin)
                );
                if incompatible && rule.class == other.class && rule.member == other.member {
                    return Err(RuleError::Conflict {
                        pattern: rule.class.as_str().to_string(),
                        first: rule.kind,
                        second: other.kind,
                    });
                }
            }
        }
        Ok(Self { rules })
    }

    /// Empty rule set
    #[inline]
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Iterate rules
    pub fn iter(&self) -> impl Iterator<Item = &KeepRule> {
        self.rules.iter()
    }

    /// Rules of one kind matching a class descriptor at class level
    pub fn class_rules<'a>(
        &'a self,
        kind: KeepKind,
        descriptor: &'a str,
    ) -> impl Iterator<Item = &'a KeepRule> + 'a {
        self.rules.iter().filter(move |rule| {
            rule.kind == kind && rule.is_class_level() && rule.class.matches(descriptor)
        })
    }

    /// Whether any rule of `kind` matches the class descriptor at class
    /// level
    #[must_use]
    pub fn any_class_rule(&self, kind: KeepKind, descriptor: &str) -> bool {
        self.class_rules(kind, descriptor).next().is_some()
    }

    /// Whether any rule of `kind` matches a member of the class
    #[must_use]
    pub fn any_member_rule(&self, kind: KeepKind, descriptor: &str, member: &str) -> bool {
        self.rules.iter().any(|rule| {
            rule.kind == kind
                && rule.class.matches(descriptor)
                && rule
                    .member
                    .as_ref()
                    .map_or(false, |pattern| pattern.name.matches(member))
        })
    }
}
