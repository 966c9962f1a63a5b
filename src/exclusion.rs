use crate::config::{ConfigError, InvalidPatternSnafu};
use crate::models::QualifiedName;
use crate::snapshot::{Snapshot, SnapshotView};
use glob::Pattern;
use serde::{Deserialize, Serialize};
use snafu::ResultExt;

/// A user-supplied rule silencing objects, globally or for one check.
///
/// Patterns containing a `.` are matched against `schema.name`, any other
/// pattern against the bare object name. Glob syntax covers exact names,
/// prefixes (`tmp_*`) and whole schemas (`audit.*`). Since `*`, `?` and `[`
/// are glob syntax, a name containing them is matched literally only with
/// `exact: true` (or by escaping, e.g. `tmp[[]1]`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExclusionRule {
    pub pattern: String,
    /// Restricts the rule to one check id; `None` excludes the object everywhere
    #[serde(default)]
    pub check: Option<String>,
    /// Match `pattern` as a literal name rather than a glob
    #[serde(default)]
    pub exact: bool,
}

impl ExclusionRule {
    pub fn object(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            check: None,
            exact: false,
        }
    }

    /// Matches exactly `name`, glob metacharacters included.
    pub fn exact(name: impl Into<String>) -> Self {
        Self {
            exact: true,
            ..Self::object(name)
        }
    }

    pub fn for_check(pattern: impl Into<String>, check: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            check: Some(check.into()),
            exact: false,
        }
    }
}

#[derive(Debug, Clone)]
struct CompiledRule {
    pattern: Pattern,
    qualified: bool,
    check: Option<String>,
}

impl CompiledRule {
    fn matches(&self, name: &QualifiedName) -> bool {
        if self.qualified {
            self.pattern.matches(&name.to_string())
        } else {
            self.pattern.matches(&name.name)
        }
    }

    fn applies_to(&self, check: &str) -> bool {
        self.check.as_deref().map_or(true, |scope| scope == check)
    }
}

/// Compiled set of exclusion rules
#[derive(Debug, Clone, Default)]
pub struct Exclusions {
    rules: Vec<CompiledRule>,
}

impl Exclusions {
    pub fn compile(rules: &[ExclusionRule]) -> Result<Self, ConfigError> {
        let rules = rules
            .iter()
            .map(|rule| -> Result<CompiledRule, ConfigError> {
                let source = if rule.exact {
                    Pattern::escape(&rule.pattern)
                } else {
                    rule.pattern.clone()
                };
                let pattern = Pattern::new(&source).context(InvalidPatternSnafu {
                    pattern: rule.pattern.clone(),
                })?;
                Ok(CompiledRule {
                    pattern,
                    qualified: rule.pattern.contains('.'),
                    check: rule.check.clone(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { rules })
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Whether `name` is silenced for `check`.
    pub fn is_excluded(&self, name: &QualifiedName, check: &str) -> bool {
        self.rules
            .iter()
            .any(|rule| rule.applies_to(check) && rule.matches(name))
    }

    /// The part of `snapshot` that `check` may report on.
    pub fn view_for<'a>(&self, snapshot: &'a Snapshot, check: &str) -> SnapshotView<'a> {
        if self.rules.is_empty() {
            return SnapshotView::full(snapshot);
        }
        SnapshotView::filtered(snapshot, |name| !self.is_excluded(name, check))
    }
}
