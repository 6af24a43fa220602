use std::sync::Arc;

use transacted_common::Processor;
use transacted_tx::{Registry, SimpleRegistry, TransactionTemplate, TransactionTemplateResolver};

use crate::{
    ErrorHandlerConfig, ErrorHandlerError, ExceptionPolicyEntry, ExceptionPolicyTable,
    RedeliveryPolicy, RollbackLoggingLevel, TransactionErrorHandler,
};

/// Assembles a [`TransactionErrorHandler`].
///
/// The transaction template is resolved once, in [`build`](Self::build):
/// an explicit template or registry reference wins, otherwise the registry is
/// searched as described on [`TransactionTemplateResolver`].
#[derive(Default)]
pub struct TransactionErrorHandlerBuilder {
    output: Option<Arc<dyn Processor>>,
    registry: Option<Arc<dyn Registry>>,
    template: Option<TransactionTemplate>,
    template_ref: Option<String>,
    policy_ref: Option<String>,
    policies: ExceptionPolicyTable,
    redelivery_policy: Option<RedeliveryPolicy>,
    rollback_logging_level: RollbackLoggingLevel,
}

impl TransactionErrorHandlerBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A builder seeded with the references and policies from `config`
    #[must_use]
    pub fn from_config(config: &ErrorHandlerConfig) -> Self {
        Self {
            template_ref: config.transaction_template.clone(),
            policy_ref: config.transacted_policy.clone(),
            redelivery_policy: config.redelivery_policy.clone(),
            rollback_logging_level: config.rollback_logging_level,
            ..Self::default()
        }
    }

    /// The processor run inside the transaction
    #[must_use]
    pub fn output(mut self, processor: impl Processor + 'static) -> Self {
        self.output = Some(Arc::new(processor));
        self
    }

    /// Where template, policy and manager beans are looked up
    #[must_use]
    pub fn registry(mut self, registry: Arc<dyn Registry>) -> Self {
        self.registry = Some(registry);
        self
    }

    #[must_use]
    pub fn transaction_template(mut self, template: TransactionTemplate) -> Self {
        self.template = Some(template);
        self
    }

    /// Use the template registered under `name`
    #[must_use]
    pub fn transaction_template_ref(mut self, name: impl Into<String>) -> Self {
        self.template_ref = Some(name.into());
        self
    }

    /// Use the transacted policy registered under `name`
    #[must_use]
    pub fn transacted_policy_ref(mut self, name: impl Into<String>) -> Self {
        self.policy_ref = Some(name.into());
        self
    }

    /// Append an exception policy; earlier policies win ties
    #[must_use]
    pub fn exception_policy(mut self, entry: ExceptionPolicyEntry) -> Self {
        self.policies.push(entry);
        self
    }

    /// Replace all exception policies
    #[must_use]
    pub fn exception_policies(mut self, policies: ExceptionPolicyTable) -> Self {
        self.policies = policies;
        self
    }

    #[must_use]
    pub fn redelivery_policy(mut self, policy: RedeliveryPolicy) -> Self {
        self.redelivery_policy = Some(policy);
        self
    }

    #[must_use]
    pub const fn rollback_logging_level(mut self, level: RollbackLoggingLevel) -> Self {
        self.rollback_logging_level = level;
        self
    }

    /// Resolve the transaction template and create the handler.
    ///
    /// # Errors
    /// - [`ErrorHandlerError::Configuration`] if no single transaction
    ///   template can be resolved
    /// - [`ErrorHandlerError::Config`] if the redelivery policy is invalid
    pub fn build(self) -> Result<TransactionErrorHandler, ErrorHandlerError> {
        if let Some(policy) = &self.redelivery_policy {
            policy
                .validate()
                .map_err(|e| ErrorHandlerError::Config(e.to_string()))?;
        }

        let registry = self
            .registry
            .unwrap_or_else(|| Arc::new(SimpleRegistry::new()));

        let template = TransactionTemplateResolver::new(registry.as_ref())
            .with_template(self.template)
            .with_template_ref(self.template_ref)
            .with_policy_ref(self.policy_ref)
            .resolve()?;

        tracing::debug!(
            manager = template.manager().name(),
            propagation = %template.propagation(),
            policies = self.policies.entries().len(),
            "Built transaction error handler"
        );

        Ok(TransactionErrorHandler::new(
            self.output,
            template,
            self.policies,
            self.redelivery_policy,
            self.rollback_logging_level,
        ))
    }
}
