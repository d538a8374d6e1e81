//! Progress-callback trait for submission events.
//!
//! Inject an [`Arc<dyn SubmissionProgress>`] via
//! [`crate::config::ClientConfigBuilder::progress`] to learn when a
//! submission starts, when the artifact arrives and how the cycle ended.
//! The CLI drives a spinner from it; a GUI would disable its submit button.
//!
//! # Example
//!
//! ```rust
//! use reservoir_convert::{ClientConfig, ConversionKind, SubmissionProgress};
//! use std::sync::{Arc, atomic::{AtomicBool, Ordering}};
//!
//! struct BusyFlag(AtomicBool);
//!
//! impl SubmissionProgress for BusyFlag {
//!     fn on_submit_start(&self, _kind: ConversionKind, _filename: &str) {
//!         self.0.store(true, Ordering::SeqCst);
//!     }
//!     fn on_submit_finish(&self, _kind: ConversionKind) {
//!         self.0.store(false, Ordering::SeqCst);
//!     }
//! }
//!
//! let config = ClientConfig::builder()
//!     .progress(Arc::new(BusyFlag(AtomicBool::new(false))))
//!     .build()
//!     .unwrap();
//! ```

use crate::request::ConversionKind;
use std::path::Path;
use std::sync::Arc;

/// Called by [`crate::client::SubmissionFlow`] around each submission.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. `on_submit_finish` is always called once for every
/// `on_submit_start`, after the success or failure event.
pub trait SubmissionProgress: Send + Sync {
    /// The request is about to be sent.
    fn on_submit_start(&self, kind: ConversionKind, filename: &str) {
        let _ = (kind, filename);
    }

    /// The response headers arrived with a success status.
    fn on_response(&self, kind: ConversionKind, status: u16) {
        let _ = (kind, status);
    }

    /// The artifact was saved.
    fn on_saved(&self, kind: ConversionKind, path: &Path, bytes: usize) {
        let _ = (kind, path, bytes);
    }

    /// The cycle failed; `message` is what the user should see.
    fn on_failed(&self, kind: ConversionKind, message: &str) {
        let _ = (kind, message);
    }

    /// The flow is idle again.
    fn on_submit_finish(&self, kind: ConversionKind) {
        let _ = kind;
    }
}

/// A no-op implementation, used when no observer is configured.
pub struct NoopProgress;

impl SubmissionProgress for NoopProgress {}

/// Convenience alias matching the type stored in [`crate::config::ClientConfig`].
pub type ProgressObserver = Arc<dyn SubmissionProgress>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl SubmissionProgress for Recorder {
        fn on_submit_start(&self, kind: ConversionKind, filename: &str) {
            self.events.lock().unwrap().push(format!("start {kind} {filename}"));
        }

        fn on_failed(&self, _kind: ConversionKind, message: &str) {
            self.events.lock().unwrap().push(format!("failed {message}"));
        }
    }

    #[test]
    fn noop_does_not_panic() {
        let p: ProgressObserver = Arc::new(NoopProgress);
        p.on_submit_start(ConversionKind::Rate, "rates.csv");
        p.on_response(ConversionKind::Rate, 200);
        p.on_saved(ConversionKind::Rate, Path::new("out.vol"), 10);
        p.on_failed(ConversionKind::Rate, "boom");
        p.on_submit_finish(ConversionKind::Rate);
    }

    #[test]
    fn overridden_methods_receive_events() {
        let r = Recorder::default();
        r.on_submit_start(ConversionKind::Completion, "c.xlsx");
        r.on_saved(ConversionKind::Completion, Path::new("x.ev"), 1);
        r.on_failed(ConversionKind::Completion, "Please provide TOP columns!");
        assert_eq!(
            *r.events.lock().unwrap(),
            vec![
                "start completion c.xlsx".to_string(),
                "failed Please provide TOP columns!".to_string()
            ]
        );
    }
}
