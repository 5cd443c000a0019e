//! Selection tracking.
//!
//! Selection-change and mouse events arrive faster than they should be
//! processed. The [`SelectionTracker`] debounces them into at most one pending
//! timer, and when that timer fires turns the live selection into a
//! [`SelectionNotice`]. Timers are owned by the platform through the
//! [`Scheduler`] trait; the tracker only hands out [`TimerToken`]s and ignores
//! tokens it no longer expects.

use std::time::Duration;

use crate::config::AnnotatorConfig;
use crate::dom::{DomRange, DomTree};
use crate::offset_map::normalize_to_ancestor;

/// Identifies one scheduled callback.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerToken(pub u64);

/// Platform timer facility.
pub trait Scheduler {
    /// Arrange for the tracker to be fired with `token` after `delay`.
    fn schedule(&mut self, token: TimerToken, delay: Duration);

    /// Cancel a scheduled token. Cancelling an unknown or fired token is a
    /// no-op.
    fn cancel(&mut self, token: TimerToken);
}

/// Input events the tracker reacts to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrackerInput {
    SelectionChange,
    MouseDown,
    MouseUp,
}

/// Debounce state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrackerState {
    Idle,
    PendingMouseSelection,
    PendingInputSelection,
}

/// What the platform reports about the live selection when a timer fires.
#[derive(Clone, Debug, PartialEq)]
pub enum LiveSelection<N> {
    /// No range, or a collapsed one.
    Empty,
    /// The selection belongs to a different shadow scope.
    Foreign,
    Range(DomRange<N>),
}

/// Outcome of a settled selection.
#[derive(Clone, Debug, PartialEq)]
pub enum SelectionNotice<N> {
    Cleared,
    Changed {
        range: DomRange<N>,
        /// Whether the range was widened to element boundaries.
        adjusted: bool,
    },
}

/// Result of firing a timer.
#[derive(Clone, Debug, PartialEq)]
pub enum TrackerOutput<N> {
    Notice(SelectionNotice<N>),
    /// Apply this range to the live selection.
    Reapply(DomRange<N>),
}

/// Guard around programmatic selection changes.
#[derive(Clone, Debug, PartialEq)]
enum Reapply<N> {
    Inactive,
    Waiting(TimerToken, DomRange<N>),
    /// The range was applied; the next selection change is our own echo,
    /// unless the timer expires or the mouse moves first.
    Applied(TimerToken),
}

/// Debounces selection events into settled notices.
#[derive(Debug)]
pub struct SelectionTracker<N> {
    state: TrackerState,
    mouse_down: bool,
    pending: Option<TimerToken>,
    reapply: Reapply<N>,
    next_token: u64,
    mouse_delay: Duration,
    input_delay: Duration,
    reapply_delay: Duration,
}

impl<N: Clone + PartialEq> SelectionTracker<N> {
    pub fn new(config: &AnnotatorConfig) -> Self {
        Self {
            state: TrackerState::Idle,
            mouse_down: false,
            pending: None,
            reapply: Reapply::Inactive,
            next_token: 0,
            mouse_delay: config.mouse_delay(),
            input_delay: config.input_delay(),
            reapply_delay: config.reapply_delay(),
        }
    }

    pub fn state(&self) -> TrackerState {
        self.state
    }

    pub fn is_mouse_down(&self) -> bool {
        self.mouse_down
    }

    pub fn pending(&self) -> Option<TimerToken> {
        self.pending
    }

    fn token(&mut self) -> TimerToken {
        let token = TimerToken(self.next_token);
        self.next_token += 1;
        token
    }

    /// Feed an input event.
    pub fn handle<S: Scheduler>(&mut self, input: TrackerInput, scheduler: &mut S) {
        match input {
            TrackerInput::SelectionChange => match self.reapply {
                Reapply::Waiting(..) => return,
                Reapply::Applied(expiry) => {
                    scheduler.cancel(expiry);
                    self.reapply = Reapply::Inactive;
                    return;
                }
                Reapply::Inactive => {}
            },
            TrackerInput::MouseDown | TrackerInput::MouseUp => {
                if let Reapply::Applied(expiry) = self.reapply {
                    scheduler.cancel(expiry);
                    self.reapply = Reapply::Inactive;
                }
                self.mouse_down = input == TrackerInput::MouseDown;
            }
        }

        if self.mouse_down {
            return;
        }

        if let Some(token) = self.pending.take() {
            scheduler.cancel(token);
        }
        let (delay, state) = if input == TrackerInput::MouseUp {
            (self.mouse_delay, TrackerState::PendingMouseSelection)
        } else {
            (self.input_delay, TrackerState::PendingInputSelection)
        };
        let token = self.token();
        scheduler.schedule(token, delay);
        self.pending = Some(token);
        self.state = state;
        tracing::trace!(target: "weaver::annotate", ?input, ?token, ?delay, "selection notice scheduled");
    }

    /// Handle a fired timer. `live` is the selection as the platform sees it
    /// now.
    pub fn fire<D, S>(
        &mut self,
        token: TimerToken,
        dom: &D,
        live: LiveSelection<N>,
        scheduler: &mut S,
    ) -> Option<TrackerOutput<N>>
    where
        D: DomTree<Node = N>,
        S: Scheduler,
    {
        match self.reapply {
            Reapply::Waiting(waiting, _) if waiting == token => {
                let expiry = self.token();
                scheduler.schedule(expiry, self.reapply_delay);
                let Reapply::Waiting(_, range) =
                    std::mem::replace(&mut self.reapply, Reapply::Applied(expiry))
                else {
                    return None;
                };
                return Some(TrackerOutput::Reapply(range));
            }
            Reapply::Applied(expiry) if expiry == token => {
                tracing::trace!(target: "weaver::annotate", "no echo after reapply");
                self.reapply = Reapply::Inactive;
                return None;
            }
            _ => {}
        }

        if self.pending != Some(token) {
            tracing::trace!(target: "weaver::annotate", ?token, "ignoring stale selection timer");
            return None;
        }
        self.pending = None;
        self.state = TrackerState::Idle;

        let range = match live {
            LiveSelection::Range(range) if !range.is_collapsed() => range,
            _ => {
                tracing::debug!(target: "weaver::annotate", "selection cleared");
                return Some(TrackerOutput::Notice(SelectionNotice::Cleared));
            }
        };

        let (range, adjusted) = normalize_to_ancestor(dom, &range);
        if adjusted {
            let reapply = self.token();
            scheduler.schedule(reapply, self.reapply_delay);
            self.reapply = Reapply::Waiting(reapply, range.clone());
        }
        tracing::debug!(target: "weaver::annotate", adjusted, "selection changed");
        Some(TrackerOutput::Notice(SelectionNotice::Changed { range, adjusted }))
    }

    /// Cancel everything pending, e.g. on detach.
    pub fn reset<S: Scheduler>(&mut self, scheduler: &mut S) {
        if let Some(token) = self.pending.take() {
            scheduler.cancel(token);
        }
        match &self.reapply {
            Reapply::Waiting(token, _) | Reapply::Applied(token) => scheduler.cancel(*token),
            Reapply::Inactive => {}
        }
        self.reapply = Reapply::Inactive;
        self.state = TrackerState::Idle;
        self.mouse_down = false;
    }
}

/// Virtual-clock scheduler for headless use.
#[derive(Debug, Default)]
pub struct ManualScheduler {
    now: Duration,
    timers: Vec<(Duration, TimerToken)>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now(&self) -> Duration {
        self.now
    }

    pub fn pending(&self) -> usize {
        self.timers.len()
    }

    /// Move the clock forward and return the tokens that came due, earliest
    /// first.
    pub fn advance(&mut self, by: Duration) -> Vec<TimerToken> {
        self.now += by;
        let now = self.now;
        let mut due: Vec<_> = self.timers.iter().copied().filter(|(at, _)| *at <= now).collect();
        self.timers.retain(|(at, _)| *at > now);
        due.sort();
        due.into_iter().map(|(_, token)| token).collect()
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&mut self, token: TimerToken, delay: Duration) {
        self.timers.push((self.now + delay, token));
    }

    fn cancel(&mut self, token: TimerToken) {
        self.timers.retain(|(_, t)| *t != token);
    }
}
