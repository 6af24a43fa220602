//! Name → bean lookup used while wiring an error handler.
//!
//! Beans are type-erased. Typed access goes through [`RegistryExt`], which
//! downcasts and silently skips beans of other types. Transaction managers are
//! registered as `Arc<dyn TransactionManager>` values so they can be found by
//! type without knowing the concrete manager.

use std::{any::Any, collections::BTreeMap, fmt, sync::Arc};

use dashmap::DashMap;

use crate::{ConfigurationError, TransactionManager};

/// A registered, type-erased value
pub type Bean = Arc<dyn Any + Send + Sync>;

pub trait Registry: Send + Sync {
    /// The bean registered under `name`, if any
    fn lookup(&self, name: &str) -> Option<Bean>;

    /// Every registered bean with its name, in no particular order
    fn beans(&self) -> Vec<(String, Bean)>;
}

/// Typed helpers over any [`Registry`].
pub trait RegistryExt: Registry {
    /// The bean under `name` if it is a `T`
    fn lookup_by_name_and_type<T>(&self, name: &str) -> Option<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        self.lookup(name).and_then(|bean| bean.downcast::<T>().ok())
    }

    /// All beans of type `T`, keyed (and therefore ordered) by name
    fn find_by_type_with_name<T>(&self) -> BTreeMap<String, Arc<T>>
    where
        T: Any + Send + Sync,
    {
        self.beans()
            .into_iter()
            .filter_map(|(name, bean)| bean.downcast::<T>().ok().map(|bean| (name, bean)))
            .collect()
    }

    /// Like [`RegistryExt::lookup_by_name_and_type`] but a missing bean is an error.
    ///
    /// # Errors
    /// [`ConfigurationError::MissingBean`] if nothing of type `T` is
    /// registered under `name`
    fn mandatory_lookup<T>(
        &self,
        name: &str,
        kind: &'static str,
    ) -> Result<Arc<T>, ConfigurationError>
    where
        T: Any + Send + Sync,
    {
        self.lookup_by_name_and_type(name)
            .ok_or_else(|| ConfigurationError::MissingBean {
                name: name.to_string(),
                kind,
            })
    }
}

impl<R: Registry + ?Sized> RegistryExt for R {}

/// A concurrent in-memory [`Registry`].
#[derive(Default)]
pub struct SimpleRegistry {
    beans: DashMap<String, Bean>,
}

impl fmt::Debug for SimpleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<String> = self.beans.iter().map(|e| e.key().clone()).collect();
        names.sort();
        f.debug_struct("SimpleRegistry").field("beans", &names).finish()
    }
}

impl SimpleRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `value` under `name`, replacing whatever was there
    pub fn bind<T>(&self, name: impl Into<String>, value: T) -> &Self
    where
        T: Any + Send + Sync,
    {
        self.beans.insert(name.into(), Arc::new(value));
        self
    }

    /// Register a transaction manager so it can be found by type.
    ///
    /// Managers are stored as `Arc<dyn TransactionManager>`; binding a
    /// concrete manager with [`bind`](Self::bind) hides it from template
    /// resolution.
    pub fn bind_manager<M>(&self, name: impl Into<String>, manager: Arc<M>) -> &Self
    where
        M: TransactionManager + 'static,
    {
        self.bind::<Arc<dyn TransactionManager>>(name, manager)
    }

    /// Remove the bean under `name`, returning it
    pub fn unbind(&self, name: &str) -> Option<Bean> {
        self.beans.remove(name).map(|(_, bean)| bean)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.beans.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.beans.is_empty()
    }
}

impl Registry for SimpleRegistry {
    fn lookup(&self, name: &str) -> Option<Bean> {
        self.beans.get(name).map(|bean| Arc::clone(bean.value()))
    }

    fn beans(&self) -> Vec<(String, Bean)> {
        self.beans
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect()
    }
}
