use std::fmt;

/// Category of an integrity violation reported by the store.
///
/// This is an internal classification tag; callers outside the guard only
/// ever see the [`DomainError`](super::DomainError) it maps to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConstraintVariant {
    Unique,
    NotNull,
    ForeignKey,
    Check,
    Unknown,
}

impl ConstraintVariant {
    pub const fn as_str(self) -> &'static str {
        match self {
            ConstraintVariant::Unique => "unique",
            ConstraintVariant::NotNull => "not_null",
            ConstraintVariant::ForeignKey => "foreign_key",
            ConstraintVariant::Check => "check",
            ConstraintVariant::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ConstraintVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of classifying one violation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Classification {
    pub variant: ConstraintVariant,
    /// Store-assigned constraint name; `None` only when the store gave none.
    pub constraint: Option<String>,
}

impl Classification {
    pub fn new(variant: ConstraintVariant, constraint: Option<String>) -> Self {
        Self {
            variant,
            constraint,
        }
    }
}
