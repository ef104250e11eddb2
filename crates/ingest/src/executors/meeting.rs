//! Meeting transcription executor.
//!
//! Drives the submit/poll/retrieve cycle against the transcription
//! service. Every failure mode — submit error, poll timeout, service-side
//! error, empty result — degrades to a single synthetic discussion point,
//! so the meeting always reaches a terminal state with a user-visible
//! explanation instead of hanging in PROCESSING.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use aufnahme_core::DiscussionPoint;

use crate::transcription::{TranscriptStatus, TranscriptionService};

/// What the transcription phase produced.
#[derive(Debug, Clone)]
pub struct TranscriptionOutcome {
    pub points: Vec<DiscussionPoint>,
    pub fell_back: bool,
}

impl TranscriptionOutcome {
    fn fallback(reason: &str) -> Self {
        Self {
            points: vec![DiscussionPoint {
                start_ms: 0,
                end_ms: 0,
                gist: "Transcription unavailable".into(),
                headline: "Transcription unavailable".into(),
                summary: format!(
                    "The recording could not be transcribed ({reason}). \
                     The meeting is saved; re-upload the audio to retry."
                ),
            }],
            fell_back: true,
        }
    }
}

/// Runs the three-phase transcription pattern for one recording.
pub struct MeetingTranscriber {
    service: Arc<dyn TranscriptionService>,
    poll_interval: Duration,
    max_poll_attempts: u32,
}

impl MeetingTranscriber {
    pub fn new(
        service: Arc<dyn TranscriptionService>,
        poll_interval: Duration,
        max_poll_attempts: u32,
    ) -> Self {
        Self {
            service,
            poll_interval,
            max_poll_attempts,
        }
    }

    /// Phase one: submit the audio URL. Fast; returns the remote
    /// transcript id, or `None` when submission itself failed.
    pub async fn submit_phase(&self, audio_url: &str) -> Option<String> {
        match self.service.submit(audio_url).await {
            Ok(id) => {
                info!(transcript = %id, "transcription submitted");
                Some(id)
            }
            Err(e) => {
                warn!(error = %e, "transcription submit failed");
                None
            }
        }
    }

    /// Phases two and three: poll at a fixed interval up to the attempt
    /// cap, then retrieve. Timeout beyond the cap counts as failure.
    pub async fn await_phase(&self, transcript_id: Option<&str>) -> TranscriptionOutcome {
        let Some(id) = transcript_id else {
            return TranscriptionOutcome::fallback("submission to the service failed");
        };

        for attempt in 1..=self.max_poll_attempts {
            match self.service.status(id).await {
                Ok(TranscriptStatus::Completed) => {
                    return match self.service.result(id).await {
                        Ok(points) if !points.is_empty() => TranscriptionOutcome {
                            points,
                            fell_back: false,
                        },
                        Ok(_) => TranscriptionOutcome::fallback("transcript had no chapters"),
                        Err(e) => {
                            warn!(transcript = %id, error = %e, "result retrieval failed");
                            TranscriptionOutcome::fallback("result retrieval failed")
                        }
                    };
                }
                Ok(TranscriptStatus::Error(e)) => {
                    warn!(transcript = %id, error = %e, "transcription errored remotely");
                    return TranscriptionOutcome::fallback("the service reported an error");
                }
                Ok(TranscriptStatus::Processing) => {
                    // Still running; wait out the interval.
                }
                Err(e) => {
                    // Transient poll failure: spend the attempt, keep going.
                    warn!(transcript = %id, attempt, error = %e, "status poll failed");
                }
            }
            if attempt < self.max_poll_attempts {
                tokio::time::sleep(self.poll_interval).await;
            }
        }

        warn!(
            transcript = %id,
            attempts = self.max_poll_attempts,
            "transcription polling timed out"
        );
        TranscriptionOutcome::fallback("transcription timed out")
    }

    /// Full cycle for one recording.
    pub async fn transcribe(&self, audio_url: &str) -> TranscriptionOutcome {
        let id = self.submit_phase(audio_url).await;
        self.await_phase(id.as_deref()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use crate::transcription::TranscriptionError;

    struct FakeService {
        submit: Result<String, ()>,
        statuses: Mutex<VecDeque<TranscriptStatus>>,
        points: Vec<DiscussionPoint>,
        polls: Mutex<u32>,
    }

    impl FakeService {
        fn new(
            submit: Result<String, ()>,
            statuses: Vec<TranscriptStatus>,
            points: Vec<DiscussionPoint>,
        ) -> Self {
            Self {
                submit,
                statuses: Mutex::new(statuses.into()),
                points,
                polls: Mutex::new(0),
            }
        }

        fn poll_count(&self) -> u32 {
            *self.polls.lock().unwrap()
        }
    }

    #[async_trait]
    impl TranscriptionService for FakeService {
        async fn submit(&self, _audio_url: &str) -> Result<String, TranscriptionError> {
            self.submit
                .clone()
                .map_err(|_| TranscriptionError::Api {
                    status: 401,
                    body: "bad key".into(),
                })
        }

        async fn status(
            &self,
            _transcript_id: &str,
        ) -> Result<TranscriptStatus, TranscriptionError> {
            *self.polls.lock().unwrap() += 1;
            // Last scripted status repeats forever.
            let mut statuses = self.statuses.lock().unwrap();
            if statuses.len() > 1 {
                Ok(statuses.pop_front().unwrap())
            } else {
                Ok(statuses
                    .front()
                    .cloned()
                    .unwrap_or(TranscriptStatus::Processing))
            }
        }

        async fn result(
            &self,
            _transcript_id: &str,
        ) -> Result<Vec<DiscussionPoint>, TranscriptionError> {
            Ok(self.points.clone())
        }
    }

    fn point(gist: &str) -> DiscussionPoint {
        DiscussionPoint {
            start_ms: 0,
            end_ms: 60_000,
            gist: gist.into(),
            headline: format!("{gist} headline"),
            summary: format!("{gist} summary"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn completes_after_a_few_polls() {
        let service = Arc::new(FakeService::new(
            Ok("t-1".into()),
            vec![
                TranscriptStatus::Processing,
                TranscriptStatus::Processing,
                TranscriptStatus::Completed,
            ],
            vec![point("budget"), point("roadmap")],
        ));
        let transcriber =
            MeetingTranscriber::new(service.clone(), Duration::from_secs(10), 60);

        let outcome = transcriber.transcribe("https://audio.example/rec.mp3").await;

        assert!(!outcome.fell_back);
        assert_eq!(outcome.points.len(), 2);
        assert_eq!(service.poll_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_produces_exactly_one_fallback_point() {
        let service = Arc::new(FakeService::new(
            Ok("t-2".into()),
            vec![TranscriptStatus::Processing],
            vec![],
        ));
        let transcriber = MeetingTranscriber::new(service.clone(), Duration::from_secs(10), 5);

        let outcome = transcriber.transcribe("https://audio.example/rec.mp3").await;

        assert!(outcome.fell_back);
        assert_eq!(outcome.points.len(), 1);
        assert!(outcome.points[0].summary.contains("timed out"));
        // Exactly the poll cap, no more.
        assert_eq!(service.poll_count(), 5);
    }

    #[tokio::test]
    async fn submit_failure_skips_polling_entirely() {
        let service = Arc::new(FakeService::new(Err(()), vec![], vec![]));
        let transcriber = MeetingTranscriber::new(service.clone(), Duration::from_secs(10), 60);

        let outcome = transcriber.transcribe("https://audio.example/rec.mp3").await;

        assert!(outcome.fell_back);
        assert_eq!(outcome.points.len(), 1);
        assert_eq!(service.poll_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn remote_error_falls_back_without_exhausting_polls() {
        let service = Arc::new(FakeService::new(
            Ok("t-3".into()),
            vec![
                TranscriptStatus::Processing,
                TranscriptStatus::Error("audio undecodable".into()),
            ],
            vec![],
        ));
        let transcriber = MeetingTranscriber::new(service.clone(), Duration::from_secs(10), 60);

        let outcome = transcriber.transcribe("https://audio.example/rec.mp3").await;

        assert!(outcome.fell_back);
        assert_eq!(outcome.points.len(), 1);
        assert_eq!(service.poll_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_chapter_list_falls_back() {
        let service = Arc::new(FakeService::new(
            Ok("t-4".into()),
            vec![TranscriptStatus::Completed],
            vec![],
        ));
        let transcriber = MeetingTranscriber::new(service, Duration::from_secs(10), 60);

        let outcome = transcriber.transcribe("https://audio.example/rec.mp3").await;

        assert!(outcome.fell_back);
        assert_eq!(outcome.points.len(), 1);
    }
}
