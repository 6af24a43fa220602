use std::{any::Any, collections::BTreeMap, sync::Arc};

use crate::{
    ConfigurationError, Registry, RegistryExt, TransactedPolicy, TransactionManager,
    TransactionTemplate,
};

/// Bean name looked up when the registry holds several policies
pub const DEFAULT_POLICY_NAME: &str = "PROPAGATION_REQUIRED";

const POLICY: &str = "transacted policy";
const TEMPLATE: &str = "transaction template";
const MANAGER: &str = "transaction manager";

/// Outcome of looking for exactly one bean of a type
enum Unique<T> {
    One(String, Arc<T>),
    None,
    Many(Vec<String>),
}

fn unique<T>(registry: &dyn Registry) -> Unique<T>
where
    T: Any + Send + Sync,
{
    let mut found: BTreeMap<String, Arc<T>> = registry.find_by_type_with_name();
    match found.len() {
        0 => Unique::None,
        1 => found
            .pop_first()
            .map_or(Unique::None, |(name, bean)| Unique::One(name, bean)),
        _ => Unique::Many(found.into_keys().collect()),
    }
}

/// Picks the one [`TransactionTemplate`] an error handler runs on.
///
/// Tiers are tried in order and the first that yields exactly one candidate
/// wins:
///
/// 1. an explicit template, or a template/policy reference by bean name
/// 2. the only registered [`TransactedPolicy`]
/// 3. the policy registered under [`DEFAULT_POLICY_NAME`]
/// 4. the only registered [`TransactionTemplate`]
/// 5. the only registered `Arc<dyn TransactionManager>`, wrapped in a
///    `Required` template
///
/// A tier with several candidates is skipped, never resolved by picking one.
pub struct TransactionTemplateResolver<'r> {
    registry: &'r dyn Registry,
    template: Option<TransactionTemplate>,
    template_ref: Option<String>,
    policy_ref: Option<String>,
}

impl<'r> TransactionTemplateResolver<'r> {
    pub fn new(registry: &'r dyn Registry) -> Self {
        Self {
            registry,
            template: None,
            template_ref: None,
            policy_ref: None,
        }
    }

    #[must_use]
    pub fn with_template(mut self, template: Option<TransactionTemplate>) -> Self {
        self.template = template;
        self
    }

    #[must_use]
    pub fn with_template_ref(mut self, name: Option<String>) -> Self {
        self.template_ref = name;
        self
    }

    #[must_use]
    pub fn with_policy_ref(mut self, name: Option<String>) -> Self {
        self.policy_ref = name;
        self
    }

    /// Resolve the template.
    ///
    /// # Errors
    /// - [`ConfigurationError::ConflictingReferences`] if both a template and a
    ///   policy reference are configured
    /// - [`ConfigurationError::MissingBean`] if a reference names nothing usable
    /// - [`ConfigurationError::AmbiguousConfiguration`] if no tier resolved and
    ///   at least one had several candidates
    /// - [`ConfigurationError::MissingTransactionTemplate`] if nothing at all
    ///   was found
    pub fn resolve(&self) -> Result<TransactionTemplate, ConfigurationError> {
        if let Some(template) = self.explicit()? {
            return Ok(template);
        }

        let mut ambiguous = None;

        match unique::<TransactedPolicy>(self.registry) {
            Unique::One(name, policy) => {
                tracing::debug!(bean = %name, "Using the only registered {POLICY}");
                return Ok(policy.template().clone());
            }
            Unique::Many(candidates) => skip(POLICY, candidates, &mut ambiguous),
            Unique::None => {}
        }

        if let Some(policy) = self
            .registry
            .lookup_by_name_and_type::<TransactedPolicy>(DEFAULT_POLICY_NAME)
        {
            tracing::debug!(bean = DEFAULT_POLICY_NAME, "Using the default {POLICY}");
            return Ok(policy.template().clone());
        }

        match unique::<TransactionTemplate>(self.registry) {
            Unique::One(name, template) => {
                tracing::debug!(bean = %name, "Using the only registered {TEMPLATE}");
                return Ok(template.as_ref().clone());
            }
            Unique::Many(candidates) => skip(TEMPLATE, candidates, &mut ambiguous),
            Unique::None => {}
        }

        match unique::<Arc<dyn TransactionManager>>(self.registry) {
            Unique::One(name, manager) => {
                tracing::debug!(bean = %name, "Using the only registered {MANAGER}");
                return Ok(TransactionTemplate::new(Arc::clone(manager.as_ref())));
            }
            Unique::Many(candidates) => skip(MANAGER, candidates, &mut ambiguous),
            Unique::None => {}
        }

        Err(ambiguous.unwrap_or(ConfigurationError::MissingTransactionTemplate))
    }

    fn explicit(&self) -> Result<Option<TransactionTemplate>, ConfigurationError> {
        if let Some(template) = &self.template {
            return Ok(Some(template.clone()));
        }

        match (&self.template_ref, &self.policy_ref) {
            (Some(template), Some(policy)) => Err(ConfigurationError::ConflictingReferences {
                template: template.clone(),
                policy: policy.clone(),
            }),
            (Some(name), None) => {
                let template = self
                    .registry
                    .mandatory_lookup::<TransactionTemplate>(name, TEMPLATE)?;
                Ok(Some(template.as_ref().clone()))
            }
            (None, Some(name)) => {
                let policy = self
                    .registry
                    .mandatory_lookup::<TransactedPolicy>(name, POLICY)?;
                Ok(Some(policy.template().clone()))
            }
            (None, None) => Ok(None),
        }
    }
}

fn skip(
    kind: &'static str,
    candidates: Vec<String>,
    ambiguous: &mut Option<ConfigurationError>,
) {
    tracing::warn!(
        candidates = ?candidates,
        "Found several {kind} beans, trying the next option"
    );
    if ambiguous.is_none() {
        *ambiguous = Some(ConfigurationError::AmbiguousConfiguration { kind, candidates });
    }
}
