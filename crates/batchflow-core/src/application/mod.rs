/// Job repository over the storage DAOs
pub mod job_repository;

/// Job launching
pub mod job_launcher;
