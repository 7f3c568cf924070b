//! Lifecycle listeners
//!
//! One trait per category. Every callback has a no-op default so an
//! implementation only overrides what it observes. Items are opaque JSON
//! values.

use serde_json::Value;

use crate::domain::execution::{JobExecution, StepExecution};
use crate::domain::status::ExitStatus;
use crate::error::{CoreError, Result};

/// Ordered registration of listeners
pub mod ordered;

/// Composite listeners per category
pub mod composite;

/// Multi-category step listener dispatcher
pub mod dispatcher;

pub use composite::{
    CompositeChunkListener, CompositeItemProcessListener, CompositeItemReadListener,
    CompositeItemWriteListener, CompositeJobExecutionListener, CompositeSkipListener,
    CompositeStepExecutionListener,
};
pub use dispatcher::{Listener, StepListenerDispatcher};
pub use ordered::OrderedComposite;

/// Job lifecycle callbacks
pub trait JobExecutionListener: Send + Sync {
    /// Called before the flow runs. An error fails the job execution
    /// without running any step.
    fn before_job(&self, _job_execution: &JobExecution) -> Result<()> {
        Ok(())
    }

    /// Called after the flow finished, whatever the outcome. An error is
    /// logged and leaves the job status unchanged.
    fn after_job(&self, _job_execution: &JobExecution) -> Result<()> {
        Ok(())
    }
}

/// Step lifecycle callbacks
pub trait StepExecutionListener: Send + Sync {
    /// Called before the step body runs. An error fails the step.
    fn before_step(&self, _step_execution: &StepExecution) -> Result<()> {
        Ok(())
    }

    /// Called after the step body. A returned exit status is combined into
    /// the step's exit status. An error is logged and leaves the step
    /// outcome unchanged.
    fn after_step(&self, _step_execution: &StepExecution) -> Result<Option<ExitStatus>> {
        Ok(None)
    }
}

/// Chunk boundary callbacks
pub trait ChunkListener: Send + Sync {
    /// Before a chunk is processed
    fn before_chunk(&self, _step_execution: &StepExecution) -> Result<()> {
        Ok(())
    }

    /// After a chunk was committed
    fn after_chunk(&self, _step_execution: &StepExecution) -> Result<()> {
        Ok(())
    }

    /// After a chunk failed
    fn after_chunk_error(&self, _step_execution: &StepExecution) -> Result<()> {
        Ok(())
    }
}

/// Item read callbacks
pub trait ItemReadListener: Send + Sync {
    /// Before an item is read
    fn before_read(&self) -> Result<()> {
        Ok(())
    }

    /// After an item was read
    fn after_read(&self, _item: &Value) -> Result<()> {
        Ok(())
    }

    /// Reading failed
    fn on_read_error(&self, _error: &CoreError) -> Result<()> {
        Ok(())
    }
}

/// Item process callbacks
pub trait ItemProcessListener: Send + Sync {
    /// Before an item is processed
    fn before_process(&self, _item: &Value) -> Result<()> {
        Ok(())
    }

    /// After an item was processed; `None` means it was filtered
    fn after_process(&self, _item: &Value, _result: Option<&Value>) -> Result<()> {
        Ok(())
    }

    /// Processing failed
    fn on_process_error(&self, _item: &Value, _error: &CoreError) -> Result<()> {
        Ok(())
    }
}

/// Item write callbacks
pub trait ItemWriteListener: Send + Sync {
    /// Before a batch of items is written
    fn before_write(&self, _items: &[Value]) -> Result<()> {
        Ok(())
    }

    /// After a batch of items was written
    fn after_write(&self, _items: &[Value]) -> Result<()> {
        Ok(())
    }

    /// Writing failed
    fn on_write_error(&self, _error: &CoreError, _items: &[Value]) -> Result<()> {
        Ok(())
    }
}

/// Skip callbacks
pub trait SkipListener: Send + Sync {
    /// An item was skipped while reading
    fn on_skip_in_read(&self, _error: &CoreError) -> Result<()> {
        Ok(())
    }

    /// An item was skipped while processing
    fn on_skip_in_process(&self, _item: &Value, _error: &CoreError) -> Result<()> {
        Ok(())
    }

    /// An item was skipped while writing
    fn on_skip_in_write(&self, _item: &Value, _error: &CoreError) -> Result<()> {
        Ok(())
    }
}
