use thiserror::Error;

/// Result alias used throughout the engine
pub type Result<T> = std::result::Result<T, CoreError>;

/// Core error type for the Batchflow engine
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// A job instance with the same name and key already exists
    #[error("A job instance already exists for job={job_name} with key={job_key}")]
    DuplicateJobInstance {
        /// Name of the job
        job_name: String,
        /// Canonical key derived from the identifying parameters
        job_key: String,
    },

    /// An update lost the race against a concurrent writer
    #[error(
        "Attempt to update {entity} id={id} with wrong version ({caller_version}), where current version is {persisted_version}"
    )]
    OptimisticLockingFailure {
        /// Kind of entity being updated
        entity: &'static str,
        /// Id of the entity
        id: i64,
        /// Version held by the caller
        caller_version: i32,
        /// Version currently persisted
        persisted_version: i32,
    },

    /// Execution not found
    #[error("Execution not found: {0}")]
    ExecutionNotFound(String),

    /// Invalid graph, collaborator wiring or precondition
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// Validation error
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Step execution error
    #[error("Step execution error: {0}")]
    StepExecutionError(String),

    /// A flow ended with an error raised by one of its states
    #[error("Ended flow={flow} at state={state} with exception: {cause}")]
    FlowExecutionError {
        /// Name of the flow
        flow: String,
        /// Name of the state that was executing
        state: String,
        /// Underlying failure
        cause: Box<CoreError>,
    },

    /// Flow could not resolve a transition
    #[error("Flow transition error: {0}")]
    TransitionError(String),

    /// Job execution error
    #[error("Job execution error: {0}")]
    JobExecutionError(String),

    /// The job or step cannot be restarted
    #[error("Job restart error: {0}")]
    JobRestartError(String),

    /// An execution for the same instance is still running
    #[error("Job execution already running: {0}")]
    JobExecutionAlreadyRunning(String),

    /// The instance already completed
    #[error("Job instance already complete: {0}")]
    JobInstanceAlreadyComplete(String),

    /// A step was started more often than allowed
    #[error("Start limit exceeded: {0}")]
    StartLimitExceeded(String),

    /// A listener callback failed
    #[error("Listener failed in {callback}: {cause}")]
    ListenerFailed {
        /// Callback that raised the failure
        callback: &'static str,
        /// Original failure
        cause: Box<CoreError>,
    },

    /// State store error
    #[error("State store error: {0}")]
    StateStoreError(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Partition error
    #[error("Partition error: {0}")]
    PartitionError(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl CoreError {
    /// Wrap this error as a listener failure raised by `callback`
    pub fn listener_failed(callback: &'static str, cause: CoreError) -> Self {
        CoreError::ListenerFailed {
            callback,
            cause: Box::new(cause),
        }
    }

    /// True when this is an optimistic locking failure
    pub fn is_optimistic_locking_failure(&self) -> bool {
        matches!(self, CoreError::OptimisticLockingFailure { .. })
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::SerializationError(err.to_string())
    }
}

impl From<tokio::task::JoinError> for CoreError {
    fn from(err: tokio::task::JoinError) -> Self {
        CoreError::Other(format!("Worker task failed: {}", err))
    }
}

impl From<String> for CoreError {
    fn from(err: String) -> Self {
        CoreError::Other(err)
    }
}

impl From<&str> for CoreError {
    fn from(err: &str) -> Self {
        CoreError::Other(err.to_string())
    }
}
