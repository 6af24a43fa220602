pub mod predicate;
pub mod processor;

pub use self::{predicate::Predicate, processor::Processor};
