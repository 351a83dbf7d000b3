//! Estimated progress for long-running remote calls.
//!
//! The backend reports no progress of its own. While a call runs on a
//! worker task, [`ProgressReporter`] plays a fixed script of phase labels,
//! one per interval, and stops as soon as the worker is seen to be done.
//! The labels are static estimates; they are not derived from what the
//! backend is actually doing.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use riskflow_shared::{Result, RiskflowError};

/// Terminal status for a call that returned an error.
pub const FAILED_STATUS: &str = "Operation failed.";

/// Terminal status for a call that was cancelled.
pub const CANCELLED_STATUS: &str = "Operation cancelled.";

// ---------------------------------------------------------------------------
// Sink trait
// ---------------------------------------------------------------------------

/// Receives progress events, in order, from a [`ProgressReporter`].
pub trait ProgressSink: Send + Sync {
    /// A scripted phase label (`index` is zero-based).
    fn phase(&self, index: usize, total: usize, label: &str);
    /// The call finished; emitted exactly once per run.
    fn finished(&self, status: &str);
}

/// No-op progress sink for headless/test usage.
pub struct SilentProgress;

impl ProgressSink for SilentProgress {
    fn phase(&self, _index: usize, _total: usize, _label: &str) {}
    fn finished(&self, _status: &str) {}
}

// ---------------------------------------------------------------------------
// Scripts
// ---------------------------------------------------------------------------

/// An ordered list of status labels played at a fixed interval.
#[derive(Debug, Clone)]
pub struct ProgressScript {
    pub messages: Vec<&'static str>,
    pub interval: Duration,
    /// Terminal status emitted when the call succeeds.
    pub done_status: &'static str,
}

impl ProgressScript {
    /// Summary generation + feature extraction.
    pub fn extraction(interval: Duration) -> Self {
        Self {
            messages: vec![
                "Reading requirements document...",
                "Generating project summary...",
                "Identifying system features...",
                "Structuring feature details...",
                "Finalizing feature list...",
            ],
            interval,
            done_status: "Features extracted successfully!",
        }
    }

    /// Feature re-evaluation against user feedback.
    pub fn feedback(interval: Duration) -> Self {
        Self {
            messages: vec![
                "Reviewing your feedback...",
                "Re-evaluating features...",
                "Reconciling feature list...",
                "Finalizing updated features...",
            ],
            interval,
            done_status: "Features re-evaluated successfully!",
        }
    }

    /// Risk analysis over approved features.
    pub fn risks(interval: Duration) -> Self {
        Self {
            messages: vec![
                "Analyzing approved features...",
                "Identifying potential threats...",
                "Assessing vulnerabilities...",
                "Evaluating risk severity...",
                "Compiling security recommendations...",
            ],
            interval,
            done_status: "Risk analysis complete!",
        }
    }

    /// Summary generation on its own.
    pub fn summary(interval: Duration) -> Self {
        Self {
            messages: vec![
                "Uploading requirements document...",
                "Extracting document text...",
                "Generating project summary...",
                "Finalizing summary...",
            ],
            interval,
            done_status: "Summary generated successfully!",
        }
    }
}

// ---------------------------------------------------------------------------
// ProgressReporter
// ---------------------------------------------------------------------------

/// Runs one operation on a worker task while playing a [`ProgressScript`].
pub struct ProgressReporter<'a> {
    script: &'a ProgressScript,
    sink: &'a dyn ProgressSink,
}

impl<'a> ProgressReporter<'a> {
    pub fn new(script: &'a ProgressScript, sink: &'a dyn ProgressSink) -> Self {
        Self { script, sink }
    }

    /// Spawn `operation` and play the script until it completes.
    ///
    /// Before each label the worker is polled; once it has finished no
    /// further label is emitted. After the script runs out the caller waits
    /// for the worker. Exactly one `finished` event closes the sequence.
    ///
    /// Cancelling `cancel` stops the script, aborts the worker and returns
    /// [`RiskflowError::Cancelled`].
    pub async fn run<T, F>(&self, operation: F, cancel: &CancellationToken) -> Result<T>
    where
        F: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let total = self.script.messages.len();
        let mut worker = tokio::spawn(operation);

        for (index, label) in self.script.messages.iter().enumerate() {
            if worker.is_finished() {
                debug!(emitted = index, total, "worker done, skipping remaining labels");
                break;
            }
            self.sink.phase(index, total, label);

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return self.abort(worker),
                _ = tokio::time::sleep(self.script.interval) => {}
            }
        }

        let joined = tokio::select! {
            biased;
            _ = cancel.cancelled() => return self.abort(worker),
            joined = &mut worker => joined,
        };

        let result = match joined {
            Ok(result) => result,
            Err(e) => Err(RiskflowError::Worker(e.to_string())),
        };

        match &result {
            Ok(_) => self.sink.finished(self.script.done_status),
            Err(e) => {
                warn!(error = %e, "worker returned an error");
                self.sink.finished(FAILED_STATUS);
            }
        }
        result
    }

    fn abort<T>(&self, worker: JoinHandle<Result<T>>) -> Result<T> {
        worker.abort();
        debug!("operation cancelled, worker aborted");
        self.sink.finished(CANCELLED_STATUS);
        Err(RiskflowError::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};

    use tokio::time::Instant;

    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Event {
        Phase(usize, String),
        Finished(String),
    }

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<Event>>,
    }

    impl Recorder {
        fn events(&self) -> Vec<Event> {
            self.events.lock().unwrap().clone()
        }

        fn phases(&self) -> Vec<usize> {
            self.events()
                .into_iter()
                .filter_map(|e| match e {
                    Event::Phase(i, _) => Some(i),
                    Event::Finished(_) => None,
                })
                .collect()
        }
    }

    impl ProgressSink for Recorder {
        fn phase(&self, index: usize, _total: usize, label: &str) {
            self.events
                .lock()
                .unwrap()
                .push(Event::Phase(index, label.to_string()));
        }

        fn finished(&self, status: &str) {
            self.events
                .lock()
                .unwrap()
                .push(Event::Finished(status.to_string()));
        }
    }

    fn script() -> ProgressScript {
        ProgressScript::risks(Duration::from_secs(10))
    }

    fn assert_elapsed(start: Instant, secs: u64) {
        let elapsed = start.elapsed();
        assert!(
            elapsed >= Duration::from_secs(secs) && elapsed < Duration::from_secs(secs + 1),
            "elapsed {elapsed:?}, expected ~{secs}s"
        );
    }

    async fn slow_value(secs: u64, value: u32) -> Result<u32> {
        tokio::time::sleep(Duration::from_secs(secs)).await;
        Ok(value)
    }

    #[tokio::test(start_paused = true)]
    async fn stops_emitting_once_worker_is_done() {
        let script = script();
        let recorder = Recorder::default();
        let start = Instant::now();

        let value = ProgressReporter::new(&script, &recorder)
            .run(slow_value(25, 7), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(value, 7);
        assert_eq!(
            recorder.events(),
            vec![
                Event::Phase(0, "Analyzing approved features...".into()),
                Event::Phase(1, "Identifying potential threats...".into()),
                Event::Phase(2, "Assessing vulnerabilities...".into()),
                Event::Finished("Risk analysis complete!".into()),
            ]
        );
        // Three waits of 10s; the fourth check sees the worker done.
        assert_elapsed(start, 30);
    }

    #[tokio::test(start_paused = true)]
    async fn plays_whole_script_then_waits() {
        let script = script();
        let recorder = Recorder::default();
        let start = Instant::now();

        ProgressReporter::new(&script, &recorder)
            .run(slow_value(120, 1), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(recorder.phases(), vec![0, 1, 2, 3, 4]);
        assert_elapsed(start, 120);
        assert_eq!(
            recorder.events().last(),
            Some(&Event::Finished("Risk analysis complete!".into()))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn waits_never_exceed_script_length() {
        let script = ProgressScript::feedback(Duration::from_secs(5));
        let recorder = Recorder::default();
        let start = Instant::now();

        ProgressReporter::new(&script, &recorder)
            .run(slow_value(3, 1), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(recorder.phases(), vec![0]);
        assert!(start.elapsed() <= script.interval * script.messages.len() as u32);
    }

    #[tokio::test(start_paused = true)]
    async fn error_result_is_returned() {
        let script = script();
        let recorder = Recorder::default();

        let err = ProgressReporter::new(&script, &recorder)
            .run(
                async {
                    tokio::time::sleep(Duration::from_secs(12)).await;
                    Err::<(), _>(RiskflowError::remote("/risks/analyze", 503, "busy"))
                },
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, RiskflowError::Remote { status: 503, .. }));
        assert_eq!(recorder.phases(), vec![0, 1]);
        assert_eq!(
            recorder.events().last(),
            Some(&Event::Finished(FAILED_STATUS.into()))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_aborts_worker() {
        let script = script();
        let recorder = Recorder::default();
        let cancel = CancellationToken::new();
        let completed = Arc::new(AtomicBool::new(false));

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(15)).await;
            trigger.cancel();
        });

        let flag = Arc::clone(&completed);
        let err = ProgressReporter::new(&script, &recorder)
            .run(
                async move {
                    tokio::time::sleep(Duration::from_secs(100)).await;
                    flag.store(true, Ordering::SeqCst);
                    Ok(())
                },
                &cancel,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, RiskflowError::Cancelled));
        assert_eq!(recorder.phases(), vec![0, 1]);
        assert_eq!(
            recorder.events().last(),
            Some(&Event::Finished(CANCELLED_STATUS.into()))
        );

        tokio::time::sleep(Duration::from_secs(200)).await;
        assert!(!completed.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn worker_panic_becomes_error() {
        let script = script();
        let recorder = Recorder::default();

        let err = ProgressReporter::new(&script, &recorder)
            .run(
                async {
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    if true {
                        panic!("backend client bug");
                    }
                    Ok(())
                },
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, RiskflowError::Worker(_)));
        assert_eq!(
            recorder.events().last(),
            Some(&Event::Finished(FAILED_STATUS.into()))
        );
    }

    #[test]
    fn built_in_scripts() {
        let interval = Duration::from_secs(1);
        assert_eq!(ProgressScript::extraction(interval).messages.len(), 5);
        assert_eq!(ProgressScript::feedback(interval).messages.len(), 4);
        assert_eq!(ProgressScript::risks(interval).messages.len(), 5);
        assert_eq!(ProgressScript::summary(interval).messages.len(), 4);
    }
}
