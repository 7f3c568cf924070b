//! Composite listeners
//!
//! Each composite is itself a listener of its category. "Before" callbacks
//! are delivered in registration order, "after" and error callbacks in
//! reverse, so the first listener entered is the last one exited. The first
//! failure stops delivery and is returned to the caller.

use serde_json::Value;
use std::sync::Arc;

use super::ordered::OrderedComposite;
use super::{
    ChunkListener, ItemProcessListener, ItemReadListener, ItemWriteListener,
    JobExecutionListener, SkipListener, StepExecutionListener,
};
use crate::domain::execution::{JobExecution, StepExecution};
use crate::domain::status::ExitStatus;
use crate::error::{CoreError, Result};

macro_rules! composite {
    ($(#[$meta:meta])* $name:ident, $listener:ident) => {
        $(#[$meta])*
        #[derive(Default, Clone)]
        pub struct $name {
            listeners: OrderedComposite<dyn $listener>,
        }

        impl $name {
            /// Empty composite
            pub fn new() -> Self {
                Self::default()
            }

            /// Register a listener without an order
            pub fn register(&mut self, listener: Arc<dyn $listener>) {
                self.listeners.register(listener);
            }

            /// Register a listener with an explicit order
            pub fn register_with_order(&mut self, listener: Arc<dyn $listener>, order: i32) {
                self.listeners.register_with_order(listener, order);
            }

            /// Number of registered listeners
            pub fn len(&self) -> usize {
                self.listeners.len()
            }

            /// True when nothing is registered
            pub fn is_empty(&self) -> bool {
                self.listeners.is_empty()
            }
        }
    };
}

composite!(
    /// Job listeners
    CompositeJobExecutionListener,
    JobExecutionListener
);
composite!(
    /// Step listeners
    CompositeStepExecutionListener,
    StepExecutionListener
);
composite!(
    /// Chunk listeners
    CompositeChunkListener,
    ChunkListener
);
composite!(
    /// Item read listeners
    CompositeItemReadListener,
    ItemReadListener
);
composite!(
    /// Item process listeners
    CompositeItemProcessListener,
    ItemProcessListener
);
composite!(
    /// Item write listeners
    CompositeItemWriteListener,
    ItemWriteListener
);
composite!(
    /// Skip listeners
    CompositeSkipListener,
    SkipListener
);

impl JobExecutionListener for CompositeJobExecutionListener {
    fn before_job(&self, job_execution: &JobExecution) -> Result<()> {
        for listener in self.listeners.iter() {
            listener.before_job(job_execution)?;
        }
        Ok(())
    }

    fn after_job(&self, job_execution: &JobExecution) -> Result<()> {
        for listener in self.listeners.reverse() {
            listener.after_job(job_execution)?;
        }
        Ok(())
    }
}

impl StepExecutionListener for CompositeStepExecutionListener {
    fn before_step(&self, step_execution: &StepExecution) -> Result<()> {
        for listener in self.listeners.iter() {
            listener.before_step(step_execution)?;
        }
        Ok(())
    }

    fn after_step(&self, step_execution: &StepExecution) -> Result<Option<ExitStatus>> {
        let mut status: Option<ExitStatus> = None;
        for listener in self.listeners.reverse() {
            if let Some(close) = listener.after_step(step_execution)? {
                status = Some(match status {
                    Some(current) => current.and(&close),
                    None => close,
                });
            }
        }
        Ok(status)
    }
}

impl ChunkListener for CompositeChunkListener {
    fn before_chunk(&self, step_execution: &StepExecution) -> Result<()> {
        for listener in self.listeners.iter() {
            listener.before_chunk(step_execution)?;
        }
        Ok(())
    }

    fn after_chunk(&self, step_execution: &StepExecution) -> Result<()> {
        for listener in self.listeners.reverse() {
            listener.after_chunk(step_execution)?;
        }
        Ok(())
    }

    fn after_chunk_error(&self, step_execution: &StepExecution) -> Result<()> {
        for listener in self.listeners.reverse() {
            listener.after_chunk_error(step_execution)?;
        }
        Ok(())
    }
}

impl ItemReadListener for CompositeItemReadListener {
    fn before_read(&self) -> Result<()> {
        for listener in self.listeners.iter() {
            listener.before_read()?;
        }
        Ok(())
    }

    fn after_read(&self, item: &Value) -> Result<()> {
        for listener in self.listeners.reverse() {
            listener.after_read(item)?;
        }
        Ok(())
    }

    fn on_read_error(&self, error: &CoreError) -> Result<()> {
        for listener in self.listeners.reverse() {
            listener.on_read_error(error)?;
        }
        Ok(())
    }
}

impl ItemProcessListener for CompositeItemProcessListener {
    fn before_process(&self, item: &Value) -> Result<()> {
        for listener in self.listeners.iter() {
            listener.before_process(item)?;
        }
        Ok(())
    }

    fn after_process(&self, item: &Value, result: Option<&Value>) -> Result<()> {
        for listener in self.listeners.reverse() {
            listener.after_process(item, result)?;
        }
        Ok(())
    }

    fn on_process_error(&self, item: &Value, error: &CoreError) -> Result<()> {
        for listener in self.listeners.reverse() {
            listener.on_process_error(item, error)?;
        }
        Ok(())
    }
}

impl ItemWriteListener for CompositeItemWriteListener {
    fn before_write(&self, items: &[Value]) -> Result<()> {
        for listener in self.listeners.iter() {
            listener.before_write(items)?;
        }
        Ok(())
    }

    fn after_write(&self, items: &[Value]) -> Result<()> {
        for listener in self.listeners.reverse() {
            listener.after_write(items)?;
        }
        Ok(())
    }

    fn on_write_error(&self, error: &CoreError, items: &[Value]) -> Result<()> {
        for listener in self.listeners.reverse() {
            listener.on_write_error(error, items)?;
        }
        Ok(())
    }
}

impl SkipListener for CompositeSkipListener {
    fn on_skip_in_read(&self, error: &CoreError) -> Result<()> {
        for listener in self.listeners.iter() {
            listener.on_skip_in_read(error)?;
        }
        Ok(())
    }

    fn on_skip_in_process(&self, item: &Value, error: &CoreError) -> Result<()> {
        for listener in self.listeners.iter() {
            listener.on_skip_in_process(item, error)?;
        }
        Ok(())
    }

    fn on_skip_in_write(&self, item: &Value, error: &CoreError) -> Result<()> {
        for listener in self.listeners.iter() {
            listener.on_skip_in_write(item, error)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::{mock, Sequence};

    mock! {
        StepListener {}
        impl StepExecutionListener for StepListener {
            fn before_step(&self, step_execution: &StepExecution) -> Result<()>;
            fn after_step(&self, step_execution: &StepExecution) -> Result<Option<ExitStatus>>;
        }
    }

    fn step_execution() -> StepExecution {
        StepExecution::new("step", Some(1), 1)
    }

    #[test]
    fn test_before_forward_after_reverse() {
        let mut seq = Sequence::new();
        let mut first = MockStepListener::new();
        let mut second = MockStepListener::new();

        first
            .expect_before_step()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        second
            .expect_before_step()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        second
            .expect_after_step()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(None));
        first
            .expect_after_step()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(None));

        let mut composite = CompositeStepExecutionListener::new();
        composite.register(Arc::new(second));
        composite.register_with_order(Arc::new(first), 0);

        let execution = step_execution();
        composite.before_step(&execution).unwrap();
        assert_eq!(composite.after_step(&execution).unwrap(), None);
    }

    #[test]
    fn test_after_step_combines_exit_statuses() {
        let mut first = MockStepListener::new();
        first
            .expect_after_step()
            .returning(|_| Ok(Some(ExitStatus::with_description("COMPLETED", "one"))));
        let mut second = MockStepListener::new();
        second
            .expect_after_step()
            .returning(|_| Ok(Some(ExitStatus::with_description("FAILED", "two"))));

        let mut composite = CompositeStepExecutionListener::new();
        composite.register(Arc::new(first));
        composite.register(Arc::new(second));

        let status = composite.after_step(&step_execution()).unwrap().unwrap();
        assert_eq!(status.exit_code(), ExitStatus::FAILED);
        assert_eq!(status.exit_description(), "two; one");
    }

    #[test]
    fn test_first_failure_stops_delivery() {
        let mut failing = MockStepListener::new();
        failing
            .expect_before_step()
            .times(1)
            .returning(|_| Err(CoreError::Other("boom".to_string())));
        let mut never = MockStepListener::new();
        never.expect_before_step().times(0);

        let mut composite = CompositeStepExecutionListener::new();
        composite.register(Arc::new(failing));
        composite.register(Arc::new(never));

        let result = composite.before_step(&step_execution());
        assert_eq!(result, Err(CoreError::Other("boom".to_string())));
    }
}
