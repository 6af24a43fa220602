//! The per-invocation record that flows through an error handler.
//!
//! Failure and rollback state live in named fields rather than a property
//! map. An exchange is owned by exactly one in-flight invocation.

use std::io::{self, Read};

use ahash::AHashMap;

use crate::{Fault, Interrupt};

/// A re-readable body stream.
///
/// Reading advances an internal cursor; [`StreamCache::reset`] rewinds it so a
/// later reader sees the whole content again.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamCache {
    data: Vec<u8>,
    position: usize,
}

impl StreamCache {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self {
            data: data.into(),
            position: 0,
        }
    }

    /// Rewind to the start
    pub fn reset(&mut self) {
        self.position = 0;
    }

    #[must_use]
    pub const fn position(&self) -> usize {
        self.position
    }

    #[must_use]
    pub fn remaining(&self) -> usize {
        self.data.len() - self.position
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl Read for StreamCache {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let available = &self.data[self.position..];
        let count = available.len().min(buf.len());
        buf[..count].copy_from_slice(&available[..count]);
        self.position += count;
        Ok(count)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Body {
    #[default]
    Empty,
    Bytes(Vec<u8>),
    Text(String),
    Stream(StreamCache),
}

#[derive(Debug, Clone, Default)]
pub struct Message {
    headers: AHashMap<String, String>,
    body: Body,
}

impl Message {
    pub fn new(body: Body) -> Self {
        Self {
            headers: AHashMap::default(),
            body,
        }
    }

    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.insert(name.into(), value.into());
    }

    pub fn remove_header(&mut self, name: &str) -> Option<String> {
        self.headers.remove(name)
    }

    #[must_use]
    pub const fn body(&self) -> &Body {
        &self.body
    }

    pub const fn body_mut(&mut self) -> &mut Body {
        &mut self.body
    }

    pub fn set_body(&mut self, body: Body) {
        self.body = body;
    }

    /// Rewind the body if it is a stream, so it can be consumed again.
    ///
    /// Returns `true` if there was a stream to rewind.
    pub fn reset_stream_cache(&mut self) -> bool {
        match &mut self.body {
            Body::Stream(stream) => {
                stream.reset();
                true
            }
            Body::Empty | Body::Bytes(_) | Body::Text(_) => false,
        }
    }
}

/// Per-invocation processing record.
///
/// `exception` and `rollback_only` are independent rollback triggers; either
/// one is enough. `exception_caught` holds the failure as it was when handler
/// dispatch began, so it can be restored if the handler does not absorb it.
#[derive(Debug)]
pub struct Exchange {
    id: String,
    message: Message,
    exception: Option<Fault>,
    exception_caught: Option<Fault>,
    rollback_only: bool,
    transacted: bool,
    exception_handled: bool,
    redelivery_counter: u32,
    interrupt: Interrupt,
}

impl Default for Exchange {
    fn default() -> Self {
        Self::new(Message::default())
    }
}

impl Exchange {
    pub fn new(message: Message) -> Self {
        Self {
            id: ulid::Ulid::new().to_string(),
            message,
            exception: None,
            exception_caught: None,
            rollback_only: false,
            transacted: false,
            exception_handled: false,
            redelivery_counter: 0,
            interrupt: Interrupt::new(),
        }
    }

    pub fn with_body(body: Body) -> Self {
        Self::new(Message::new(body))
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub const fn message(&self) -> &Message {
        &self.message
    }

    pub const fn message_mut(&mut self) -> &mut Message {
        &mut self.message
    }

    #[must_use]
    pub const fn exception(&self) -> Option<&Fault> {
        self.exception.as_ref()
    }

    pub fn set_exception(&mut self, exception: Option<Fault>) {
        self.exception = exception;
    }

    /// Record a failure, replacing any previous one
    pub fn fail(&mut self, fault: Fault) {
        self.exception = Some(fault);
    }

    pub fn take_exception(&mut self) -> Option<Fault> {
        self.exception.take()
    }

    #[must_use]
    pub const fn exception_caught(&self) -> Option<&Fault> {
        self.exception_caught.as_ref()
    }

    pub fn set_exception_caught(&mut self, exception: Option<Fault>) {
        self.exception_caught = exception;
    }

    #[must_use]
    pub const fn is_rollback_only(&self) -> bool {
        self.rollback_only
    }

    pub const fn set_rollback_only(&mut self, rollback_only: bool) {
        self.rollback_only = rollback_only;
    }

    /// Set when the exchange ran inside an active transaction
    #[must_use]
    pub const fn is_transacted(&self) -> bool {
        self.transacted
    }

    pub const fn set_transacted(&mut self, transacted: bool) {
        self.transacted = transacted;
    }

    #[must_use]
    pub const fn is_exception_handled(&self) -> bool {
        self.exception_handled
    }

    pub const fn set_exception_handled(&mut self, handled: bool) {
        self.exception_handled = handled;
    }

    /// How many times this exchange has been redelivered by whatever retries it
    #[must_use]
    pub const fn redelivery_counter(&self) -> u32 {
        self.redelivery_counter
    }

    pub const fn set_redelivery_counter(&mut self, counter: u32) {
        self.redelivery_counter = counter;
    }

    #[must_use]
    pub const fn is_redelivered(&self) -> bool {
        self.redelivery_counter > 0
    }

    /// Cancellation handle; clone it to interrupt a waiting invocation
    #[must_use]
    pub const fn interrupt(&self) -> &Interrupt {
        &self.interrupt
    }

    /// Returns `true` if the exchange carries a failure or is marked rollback-only
    #[must_use]
    pub const fn is_failed(&self) -> bool {
        self.exception.is_some() || self.rollback_only
    }
}
