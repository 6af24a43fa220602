//! The transactional primitive the error handler runs on top of.
//!
//! The error handler only needs "run this callback transactionally and tell me
//! about the transaction": that is [`TransactionTemplate`] over a
//! [`TransactionManager`]. Everything else here exists to find the template:
//!
//! - [`Registry`]: opaque name → bean lookup, used only at construction
//! - [`TransactedPolicy`]: a registrable template with a propagation behaviour
//! - [`TransactionTemplateResolver`]: picks exactly one template from the registry
//! - [`MemoryTransactionManager`]: an in-process manager for tests and transient work

mod error;
mod manager;
mod memory;
mod policy;
mod propagation;
pub mod registry;
mod resolver;
mod status;
mod template;

pub use error::{ConfigurationError, TransactionError};
pub use manager::TransactionManager;
pub use memory::{
    MemoryTransactionManager, MemoryTransactionStatus, TransactionEvent, TransactionEventKind,
};
pub use policy::TransactedPolicy;
pub use propagation::{Propagation, TransactionDefinition};
pub use registry::{Bean, Registry, RegistryExt, SimpleRegistry};
pub use resolver::{DEFAULT_POLICY_NAME, TransactionTemplateResolver};
pub use status::TransactionStatus;
pub use template::TransactionTemplate;
