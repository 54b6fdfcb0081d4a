//! repcount - On-device repetition counting for pose joint-angle streams
//!
//! repcount turns per-frame body keypoints from an external pose estimator into
//! de-bounced exercise repetition counts through a deterministic pipeline:
//! keypoints → joint angle geometry → hysteresis rep counter → session totals
//! → daily ledger.
//!
//! ## Modules
//!
//! - **Counting**: `geometry`, `counter`, and `session` turn frames into rep events
//! - **History**: `ledger` persists finished sessions; `report` buckets them by interval

pub mod config;
pub mod counter;
pub mod error;
pub mod geometry;
pub mod ledger;
pub mod pipeline;
pub mod profile;
pub mod report;
pub mod session;
pub mod types;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

pub use config::CounterConfig;
pub use counter::{RepCounter, RepCounterState, Thresholds};
pub use error::RepError;
pub use geometry::{bend_angle, limb_angle};
pub use ledger::{DailyLedger, LedgerRecord};
pub use pipeline::{replay, FrameParser, SessionInput, SessionRunner, StreamFormat};
pub use profile::ExerciseProfile;
pub use session::{ExerciseSession, RepNotifier, SharedSession};
pub use types::{ExerciseKind, Frame, Keypoint, RepEvent};

/// Library version
pub const REPCOUNT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default ledger file name
pub const DEFAULT_LEDGER_FILE: &str = "exercise_count.txt";
