use std::sync::Arc;

use crate::{Propagation, TransactionManager, TransactionTemplate};

/// A registrable transaction policy.
///
/// Registered in a [`Registry`](crate::Registry) it takes precedence over a
/// bare template or manager during resolution. The conventional bean name of
/// a policy is its propagation name, e.g. `PROPAGATION_REQUIRED`.
#[derive(Debug, Clone)]
pub struct TransactedPolicy {
    template: TransactionTemplate,
}

impl TransactedPolicy {
    pub fn new(manager: Arc<dyn TransactionManager>, propagation: Propagation) -> Self {
        Self {
            template: TransactionTemplate::with_propagation(manager, propagation),
        }
    }

    pub const fn from_template(template: TransactionTemplate) -> Self {
        Self { template }
    }

    #[must_use]
    pub const fn template(&self) -> &TransactionTemplate {
        &self.template
    }

    /// The bean name this policy is conventionally registered under
    #[must_use]
    pub const fn default_name(&self) -> &'static str {
        self.template.propagation().name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryTransactionManager;

    #[test]
    fn test_policy_wraps_template() {
        let policy = TransactedPolicy::new(
            Arc::new(MemoryTransactionManager::new()),
            Propagation::RequiresNew,
        );

        assert_eq!(policy.template().propagation(), Propagation::RequiresNew);
        assert_eq!(policy.default_name(), "PROPAGATION_REQUIRES_NEW");
    }
}
