/// Batch and exit statuses
pub mod status;

/// Checkpoint container
pub mod execution_context;

/// Job parameters and job keys
pub mod job_parameters;

/// Job instances and executions
pub mod execution;

/// Repository interfaces
pub mod repository;

/// Checkpoint serialization
pub mod serializer;
