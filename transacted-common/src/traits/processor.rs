use std::sync::Arc;

use crate::{Exchange, Fault};

/// A unit of work.
///
/// Failures may be returned as `Err` or recorded on the exchange with
/// [`Exchange::fail`]; callers must treat both the same way.
pub trait Processor: Send + Sync {
    ///
    /// Process the exchange
    ///
    /// # Errors
    /// Whatever failure the unit of work runs into
    ///
    fn process(&self, exchange: &mut Exchange) -> Result<(), Fault>;

    ///
    /// Start this processor before it sees any exchange
    ///
    /// # Errors
    /// If the processor could not acquire what it needs to run
    ///
    fn start(&self) -> Result<(), Fault> {
        Ok(())
    }

    ///
    /// Stop this processor, releasing anything acquired by `start`
    ///
    /// # Errors
    /// If releasing resources failed
    ///
    fn stop(&self) -> Result<(), Fault> {
        Ok(())
    }
}

impl<F> Processor for F
where
    F: Fn(&mut Exchange) -> Result<(), Fault> + Send + Sync,
{
    fn process(&self, exchange: &mut Exchange) -> Result<(), Fault> {
        self(exchange)
    }
}

impl<P: Processor + ?Sized> Processor for Arc<P> {
    fn process(&self, exchange: &mut Exchange) -> Result<(), Fault> {
        (**self).process(exchange)
    }

    fn start(&self) -> Result<(), Fault> {
        (**self).start()
    }

    fn stop(&self) -> Result<(), Fault> {
        (**self).stop()
    }
}
