use serde_json::Value;
use std::sync::Arc;

use super::composite::{
    CompositeChunkListener, CompositeItemProcessListener, CompositeItemReadListener,
    CompositeItemWriteListener, CompositeSkipListener, CompositeStepExecutionListener,
};
use super::{
    ChunkListener, ItemProcessListener, ItemReadListener, ItemWriteListener, SkipListener,
    StepExecutionListener,
};
use crate::domain::execution::StepExecution;
use crate::domain::status::ExitStatus;
use crate::error::{CoreError, Result};

/// A listener of one of the step-scoped categories
#[derive(Clone)]
pub enum Listener {
    /// Step lifecycle
    Step(Arc<dyn StepExecutionListener>),
    /// Chunk boundaries
    Chunk(Arc<dyn ChunkListener>),
    /// Item reads
    Read(Arc<dyn ItemReadListener>),
    /// Item processing
    Process(Arc<dyn ItemProcessListener>),
    /// Item writes
    Write(Arc<dyn ItemWriteListener>),
    /// Skips
    Skip(Arc<dyn SkipListener>),
}

/// Single entry point for every step-scoped listener category.
///
/// Failures raised by listeners are wrapped in `CoreError::ListenerFailed`
/// naming the callback, except skip callbacks whose failures are returned
/// unchanged.
#[derive(Default, Clone)]
pub struct StepListenerDispatcher {
    step: CompositeStepExecutionListener,
    chunk: CompositeChunkListener,
    read: CompositeItemReadListener,
    process: CompositeItemProcessListener,
    write: CompositeItemWriteListener,
    skip: CompositeSkipListener,
}

fn wrap<T>(callback: &'static str, result: Result<T>) -> Result<T> {
    result.map_err(|e| CoreError::listener_failed(callback, e))
}

impl StepListenerDispatcher {
    /// Dispatcher with no listeners
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener without an order
    pub fn register(&mut self, listener: Listener) {
        match listener {
            Listener::Step(l) => self.step.register(l),
            Listener::Chunk(l) => self.chunk.register(l),
            Listener::Read(l) => self.read.register(l),
            Listener::Process(l) => self.process.register(l),
            Listener::Write(l) => self.write.register(l),
            Listener::Skip(l) => self.skip.register(l),
        }
    }

    /// Register a listener with an explicit order
    pub fn register_with_order(&mut self, listener: Listener, order: i32) {
        match listener {
            Listener::Step(l) => self.step.register_with_order(l, order),
            Listener::Chunk(l) => self.chunk.register_with_order(l, order),
            Listener::Read(l) => self.read.register_with_order(l, order),
            Listener::Process(l) => self.process.register_with_order(l, order),
            Listener::Write(l) => self.write.register_with_order(l, order),
            Listener::Skip(l) => self.skip.register_with_order(l, order),
        }
    }

    /// Step listeners, in order
    pub fn before_step(&self, step_execution: &StepExecution) -> Result<()> {
        wrap("beforeStep", self.step.before_step(step_execution))
    }

    /// Step listeners, in reverse order. Returned exit statuses are combined
    /// with `ExitStatus::and`.
    pub fn after_step(&self, step_execution: &StepExecution) -> Result<Option<ExitStatus>> {
        wrap("afterStep", self.step.after_step(step_execution))
    }

    /// Chunk listeners, in order
    pub fn before_chunk(&self, step_execution: &StepExecution) -> Result<()> {
        wrap("beforeChunk", self.chunk.before_chunk(step_execution))
    }

    /// Chunk listeners, in reverse order
    pub fn after_chunk(&self, step_execution: &StepExecution) -> Result<()> {
        wrap("afterChunk", self.chunk.after_chunk(step_execution))
    }

    /// Chunk listeners after a failed chunk, in reverse order
    pub fn after_chunk_error(&self, step_execution: &StepExecution) -> Result<()> {
        wrap("afterChunkError", self.chunk.after_chunk_error(step_execution))
    }

    /// Read listeners, in order
    pub fn before_read(&self) -> Result<()> {
        wrap("beforeRead", self.read.before_read())
    }

    /// Read listeners with the item read, in reverse order
    pub fn after_read(&self, item: &Value) -> Result<()> {
        wrap("afterRead", self.read.after_read(item))
    }

    /// Read listeners with the read failure, in reverse order
    pub fn on_read_error(&self, error: &CoreError) -> Result<()> {
        wrap("onReadError", self.read.on_read_error(error))
    }

    /// Process listeners with the input item, in order
    pub fn before_process(&self, item: &Value) -> Result<()> {
        wrap("beforeProcess", self.process.before_process(item))
    }

    /// Process listeners with the input and its result, `None` when the
    /// item was filtered, in reverse order
    pub fn after_process(&self, item: &Value, result: Option<&Value>) -> Result<()> {
        wrap("afterProcess", self.process.after_process(item, result))
    }

    /// Process listeners with the failing item, in reverse order
    pub fn on_process_error(&self, item: &Value, error: &CoreError) -> Result<()> {
        wrap("onProcessError", self.process.on_process_error(item, error))
    }

    /// Write listeners with the chunk to write, in order
    pub fn before_write(&self, items: &[Value]) -> Result<()> {
        wrap("beforeWrite", self.write.before_write(items))
    }

    /// Write listeners with the written chunk, in reverse order
    pub fn after_write(&self, items: &[Value]) -> Result<()> {
        wrap("afterWrite", self.write.after_write(items))
    }

    /// Write listeners with the write failure, in reverse order
    pub fn on_write_error(&self, error: &CoreError, items: &[Value]) -> Result<()> {
        wrap("onWriteError", self.write.on_write_error(error, items))
    }

    // Skip callbacks are not wrapped.
    /// Skip listeners for a skipped read
    pub fn on_skip_in_read(&self, error: &CoreError) -> Result<()> {
        self.skip.on_skip_in_read(error)
    }

    /// Skip listeners for an item skipped while processing
    pub fn on_skip_in_process(&self, item: &Value, error: &CoreError) -> Result<()> {
        self.skip.on_skip_in_process(item, error)
    }

    /// Skip listeners for an item skipped while writing
    pub fn on_skip_in_write(&self, item: &Value, error: &CoreError) -> Result<()> {
        self.skip.on_skip_in_write(item, error)
    }
}
