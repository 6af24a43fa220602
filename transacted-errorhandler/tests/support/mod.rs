//! Shared fixtures for the error handler integration tests
#![allow(dead_code)] // Not every test uses every fixture

use std::{
    any::Any,
    io::Read,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use parking_lot::Mutex;
use thiserror::Error;
use transacted_common::{Body, Exchange, Fault, Processor};
use transacted_tx::{
    TransactionDefinition, TransactionError, TransactionManager, TransactionStatus,
};

#[derive(Debug, Error)]
#[error("illegal state")]
pub struct IllegalState;

#[derive(Debug, Error)]
#[error("timed out")]
pub struct Timeout;

#[derive(Debug, Error)]
#[error("handler broke")]
pub struct HandlerBroke;

type Behaviour = dyn Fn(&mut Exchange) -> Result<(), Fault> + Send + Sync;

/// A processor that counts its calls and lifecycle transitions
pub struct Recorder {
    behaviour: Box<Behaviour>,
    calls: AtomicUsize,
    starts: AtomicUsize,
    stops: AtomicUsize,
    /// Stream content read by the last call, if the body was a stream
    read: Mutex<Option<String>>,
}

impl Recorder {
    pub fn new<F>(behaviour: F) -> Arc<Self>
    where
        F: Fn(&mut Exchange) -> Result<(), Fault> + Send + Sync + 'static,
    {
        Arc::new(Self {
            behaviour: Box::new(behaviour),
            calls: AtomicUsize::new(0),
            starts: AtomicUsize::new(0),
            stops: AtomicUsize::new(0),
            read: Mutex::new(None),
        })
    }

    pub fn ok() -> Arc<Self> {
        Self::new(|_| Ok(()))
    }

    /// Fails every call with the same fault
    pub fn failing(fault: &Fault) -> Arc<Self> {
        let fault = fault.clone();
        Self::new(move |_| Err(fault.clone()))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn read(&self) -> Option<String> {
        self.read.lock().clone()
    }
}

impl Processor for Recorder {
    fn process(&self, exchange: &mut Exchange) -> Result<(), Fault> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Body::Stream(stream) = exchange.message_mut().body_mut() {
            let mut content = String::new();
            stream.read_to_string(&mut content).map_err(Fault::new)?;
            *self.read.lock() = Some(content);
        }

        (self.behaviour)(exchange)
    }

    fn start(&self) -> Result<(), Fault> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&self) -> Result<(), Fault> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// What a [`StubStatus`] reports about its transaction
#[derive(Debug, Clone, Copy, Default)]
pub struct Shape {
    pub new_transaction: bool,
    pub has_transaction: Option<bool>,
    pub actual: bool,
}

pub struct StubStatus {
    shape: Shape,
    rollback_only: Arc<AtomicBool>,
}

impl TransactionStatus for StubStatus {
    fn transaction_id(&self) -> Option<u64> {
        None
    }

    fn is_new_transaction(&self) -> bool {
        self.shape.new_transaction
    }

    fn is_completed(&self) -> bool {
        false
    }

    fn set_rollback_only(&self) {
        self.rollback_only.store(true, Ordering::SeqCst);
    }

    fn is_rollback_only(&self) -> bool {
        self.rollback_only.load(Ordering::SeqCst)
    }

    fn has_transaction(&self) -> Option<bool> {
        self.shape.has_transaction
    }

    fn is_actual_transaction_active(&self) -> bool {
        self.shape.actual
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A manager whose statuses answer the "is there a transaction" questions
/// exactly as told
#[derive(Default)]
pub struct StubManager {
    shape: Shape,
    rollback_only: Arc<AtomicBool>,
    commits: AtomicUsize,
    rollbacks: AtomicUsize,
}

impl StubManager {
    pub fn new(shape: Shape) -> Arc<Self> {
        Arc::new(Self {
            shape,
            ..Self::default()
        })
    }

    /// Whether any status handed out was marked rollback-only
    pub fn marked_rollback_only(&self) -> bool {
        self.rollback_only.load(Ordering::SeqCst)
    }

    pub fn commits(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    pub fn rollbacks(&self) -> usize {
        self.rollbacks.load(Ordering::SeqCst)
    }
}

impl TransactionManager for StubManager {
    fn begin(
        &self,
        _definition: &TransactionDefinition,
    ) -> Result<Box<dyn TransactionStatus>, TransactionError> {
        Ok(Box::new(StubStatus {
            shape: self.shape,
            rollback_only: Arc::clone(&self.rollback_only),
        }))
    }

    fn commit(&self, _status: Box<dyn TransactionStatus>) -> Result<(), TransactionError> {
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn rollback(&self, _status: Box<dyn TransactionStatus>) -> Result<(), TransactionError> {
        self.rollbacks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn name(&self) -> &str {
        "stub"
    }
}
