pub mod commits;
pub mod files;
pub mod meeting;

pub use commits::CommitEnricher;
pub use files::FileIndexer;
pub use meeting::{MeetingTranscriber, TranscriptionOutcome};
