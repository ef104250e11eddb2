//! Stage executors and their supporting machinery: embedding providers,
//! the batch/wave scheduler, and clients for the source host and the
//! transcription service.

pub mod embedding;
pub mod executors;
pub mod scheduler;
pub mod sourcehost;
pub mod transcription;
