//! Primitives shared by the transacted crates.
//!
//! - [`exchange::Exchange`]: the per-invocation record carrying failure and rollback state
//! - [`fault::Fault`]: a clonable, type-inspectable failure value
//! - [`interrupt::Interrupt`]: cooperative cancellation for the redelivery delay
//! - [`traits`]: the unit-of-work and predicate seams

pub mod error;
pub mod exchange;
pub mod fault;
pub mod interrupt;
pub mod logging;
pub mod traits;

pub use tracing;

pub use self::{
    error::Interrupted,
    exchange::{Body, Exchange, Message, StreamCache},
    fault::Fault,
    interrupt::Interrupt,
    traits::{Predicate, Processor},
};
