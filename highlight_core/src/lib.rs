//! Real-time transcript highlight scheduling.
//!
//! An external voice agent emits one timed event per speech unit (a
//! character, in the demo) while streaming synthesized audio. This crate
//! consumes that stream and decides, against the wall clock, which unit is
//! "currently spoken": each unit's start/end offsets are measured from the
//! instant the first unit of the utterance arrived, and the engine emits
//! begin/end highlight transitions at the matching real-time moments,
//! skipping units whose window already passed and degrading gracefully on
//! missing or malformed timing.

mod engine;
mod session;
mod timer;

pub use engine::{
    EngineError, HighlightEngine, SchedulerStats, SchedulerStatsSnapshot, SessionEvent,
    TranscriptSnapshot, TranscriptUnit, DEFAULT_EVENT_BUFFER,
};
pub use session::{Schedule, SessionState, SpeechUnit, TimedText};
pub use timer::TimerQueue;
