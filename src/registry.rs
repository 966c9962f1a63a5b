use crate::analysis::{default_checks, Check};
use crate::config::{ConfigError, HealthConfig, UnknownCheckSnafu};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

/// Ordered set of checks for one engine.
///
/// Checks without a priority iterate in registration order; checks declaring
/// one come first, by ascending priority then id.
#[derive(Clone, Default)]
pub struct CheckRegistry {
    checks: Vec<Arc<dyn Check>>,
    disabled: HashSet<String>,
}

impl CheckRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default_checks() -> Self {
        let mut registry = Self::new();
        for check in default_checks() {
            registry.register(check);
        }
        registry
    }

    /// Adds `check`, replacing (in place) any check already registered under its id.
    pub fn register(&mut self, check: Arc<dyn Check>) -> &mut Self {
        match self.checks.iter().position(|c| c.id() == check.id()) {
            Some(pos) => {
                debug!("Replacing registered check {}", check.id());
                self.checks[pos] = check;
            }
            None => self.checks.push(check),
        }
        self
    }

    /// Disables `id`; unknown ids are ignored.
    pub fn disable(&mut self, id: &str) -> &mut Self {
        if self.contains(id) {
            self.disabled.insert(id.to_string());
        } else {
            debug!("Ignoring disable request for unregistered check {}", id);
        }
        self
    }

    pub fn enable(&mut self, id: &str) -> &mut Self {
        self.disabled.remove(id);
        self
    }

    pub fn contains(&self, id: &str) -> bool {
        self.checks.iter().any(|c| c.id() == id)
    }

    /// Ids of every registered check, enabled or not, in registration order.
    pub fn ids(&self) -> Vec<&'static str> {
        self.checks.iter().map(|c| c.id()).collect()
    }

    pub fn all_checks(&self) -> &[Arc<dyn Check>] {
        &self.checks
    }

    pub fn enabled_checks(&self) -> Vec<Arc<dyn Check>> {
        let enabled = self
            .checks
            .iter()
            .filter(|c| !self.disabled.contains(c.id()))
            .cloned();
        let (mut prioritized, rest): (Vec<_>, Vec<_>) =
            enabled.partition(|c| c.priority().is_some());
        prioritized.sort_by(|a, b| {
            a.priority()
                .cmp(&b.priority())
                .then_with(|| a.id().cmp(b.id()))
        });
        prioritized.extend(rest);
        prioritized
    }

    /// Applies the check-related parts of `config`, failing on ids that are
    /// not registered.
    pub fn configure(&mut self, config: &HealthConfig) -> Result<(), ConfigError> {
        if let Some(unknown) = config.referenced_checks().find(|id| !self.contains(id)) {
            return UnknownCheckSnafu { id: unknown }.fail();
        }
        for id in &config.disabled_checks {
            self.disable(id);
        }
        Ok(())
    }
}

impl std::fmt::Debug for CheckRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckRegistry")
            .field("checks", &self.ids())
            .field("disabled", &self.disabled)
            .finish()
    }
}
