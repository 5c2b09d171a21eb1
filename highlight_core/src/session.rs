//! Utterance session state and the per-unit scheduling decision.
//!
//! Everything in this module is synchronous and side-effect free; the
//! async engine owns an instance and applies the decisions it returns.

use std::time::Duration;

use tokio::time::Instant;

/// One transcription event as the external agent emits it: a chunk of
/// display text plus an optional timing window in seconds relative to
/// the start of audio playback.
#[derive(Debug, Clone, PartialEq)]
pub struct TimedText {
    pub text: String,
    pub start_time: Option<f64>,
    pub end_time: Option<f64>,
}

impl TimedText {
    pub fn new(text: impl Into<String>, start_time: f64, end_time: f64) -> Self {
        Self {
            text: text.into(),
            start_time: Some(start_time),
            end_time: Some(end_time),
        }
    }

    /// An event that arrived without timing metadata.
    pub fn untimed(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            start_time: None,
            end_time: None,
        }
    }
}

/// One speech unit accumulated into the session transcript.
#[derive(Debug, Clone)]
pub struct SpeechUnit {
    pub sequence_index: usize,
    pub text: String,
    pub start_offset: Option<Duration>,
    pub end_offset: Option<Duration>,
    pub received_at: Instant,
}

/// Scheduling decision for one arriving unit, made once at arrival time.
#[derive(Debug, Clone, PartialEq)]
pub enum Schedule {
    /// The unit's window has not opened yet: activate and deactivate later.
    Ahead {
        activate_at: Instant,
        deactivate_at: Instant,
    },
    /// We are late but still inside the speaking window: activate now,
    /// deactivate when the window closes.
    InWindow { deactivate_at: Instant },
    /// The window fully elapsed before the unit arrived; never highlighted.
    Elapsed,
    /// No timing metadata; never highlighted.
    Untimed,
    /// Timing metadata present but unusable (non-finite, negative, or
    /// `end <= start`); never highlighted.
    Malformed,
}

/// Validated timing window.
enum Timing {
    Window { start: Duration, end: Duration },
    Missing,
    Invalid,
}

fn classify_timing(start_time: Option<f64>, end_time: Option<f64>) -> Timing {
    match (start_time, end_time) {
        (Some(s), Some(e)) => {
            if !s.is_finite() || !e.is_finite() || s < 0.0 || e <= s {
                Timing::Invalid
            } else {
                Timing::Window {
                    start: Duration::from_secs_f64(s),
                    end: Duration::from_secs_f64(e),
                }
            }
        }
        _ => Timing::Missing,
    }
}

/// State for one utterance session.
///
/// Invariants: `audio_start` is set on the first unit and untouched until
/// reset; at most one unit is highlighted at any instant; sequence indexes
/// are contiguous; a reset clears units, highlight, and `audio_start`
/// atomically and bumps the epoch so in-flight timer actions become no-ops.
#[derive(Debug)]
pub struct SessionState {
    epoch: u64,
    audio_start: Option<Instant>,
    units: Vec<SpeechUnit>,
    highlighted: Option<usize>,
    last_started: Option<usize>,
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            epoch: 0,
            audio_start: None,
            units: Vec::new(),
            highlighted: None,
            last_started: None,
        }
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn audio_start(&self) -> Option<Instant> {
        self.audio_start
    }

    pub fn units(&self) -> &[SpeechUnit] {
        &self.units
    }

    pub fn highlighted(&self) -> Option<usize> {
        self.highlighted
    }

    /// Clear the session for a new utterance. Pending timer actions are not
    /// cancelled; the epoch bump makes them no-ops when they fire.
    pub fn reset(&mut self) {
        self.epoch += 1;
        self.audio_start = None;
        self.units.clear();
        self.highlighted = None;
        self.last_started = None;
    }

    /// Append one arriving unit and decide its highlight schedule.
    ///
    /// The first unit of a session fixes `audio_start` to its arrival
    /// instant; all offsets in the session are measured from there.
    pub fn push_unit(&mut self, event: TimedText, now: Instant) -> (usize, Schedule) {
        let origin = *self.audio_start.get_or_insert(now);
        let index = self.units.len();

        let timing = classify_timing(event.start_time, event.end_time);
        let (start_offset, end_offset) = match timing {
            Timing::Window { start, end } => (Some(start), Some(end)),
            _ => (None, None),
        };

        self.units.push(SpeechUnit {
            sequence_index: index,
            text: event.text,
            start_offset,
            end_offset,
            received_at: now,
        });

        let schedule = match timing {
            Timing::Missing => Schedule::Untimed,
            Timing::Invalid => Schedule::Malformed,
            Timing::Window { start, end } => {
                let elapsed = now.saturating_duration_since(origin);
                if start > elapsed {
                    Schedule::Ahead {
                        activate_at: origin + start,
                        deactivate_at: origin + end,
                    }
                } else if elapsed < end {
                    Schedule::InWindow {
                        deactivate_at: origin + end,
                    }
                } else {
                    Schedule::Elapsed
                }
            }
        };

        (index, schedule)
    }

    /// Make `index` the highlighted unit. Rejects the activation if it was
    /// scheduled under an earlier epoch, or if a later unit already started
    /// (a stale activation must not overwrite a newer highlight).
    ///
    /// Returns `true` when the highlighted index actually changed.
    pub fn activate(&mut self, epoch: u64, index: usize) -> bool {
        if epoch != self.epoch || index >= self.units.len() {
            return false;
        }
        if self.last_started.is_some_and(|last| index < last) {
            return false;
        }
        self.last_started = Some(index);
        if self.highlighted == Some(index) {
            return false;
        }
        self.highlighted = Some(index);
        true
    }

    /// Compare-and-clear: clear the highlight only if `index` still holds
    /// it. A deactivation firing after a newer unit took over is a designed
    /// race outcome, not an error.
    ///
    /// Returns `true` when the highlight was cleared.
    pub fn deactivate(&mut self, epoch: u64, index: usize) -> bool {
        if epoch != self.epoch {
            return false;
        }
        if self.highlighted == Some(index) {
            self.highlighted = None;
            true
        } else {
            false
        }
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}
