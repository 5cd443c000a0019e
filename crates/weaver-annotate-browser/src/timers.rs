//! `Scheduler` on browser timeouts.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;

use gloo_timers::callback::Timeout;
use weaver_annotate_core::{Scheduler, TimerToken};

/// Schedules tracker tokens with `setTimeout`.
///
/// A `Timeout` cancels itself when dropped, and must not be dropped from
/// inside its own callback. Fired timeouts are therefore only collected on
/// the next `schedule` or `cancel`, never while one is running.
pub struct BrowserScheduler {
    timeouts: HashMap<TimerToken, Timeout>,
    fired: Rc<RefCell<Vec<TimerToken>>>,
    on_fire: Rc<dyn Fn(TimerToken)>,
}

impl BrowserScheduler {
    /// `on_fire` runs with the token of every timeout that elapses.
    pub fn new(on_fire: impl Fn(TimerToken) + 'static) -> Self {
        Self {
            timeouts: HashMap::new(),
            fired: Rc::new(RefCell::new(Vec::new())),
            on_fire: Rc::new(on_fire),
        }
    }

    /// Timeouts that have neither fired nor been cancelled.
    pub fn pending(&self) -> usize {
        let fired = self.fired.borrow();
        self.timeouts
            .keys()
            .filter(|token| !fired.contains(token))
            .count()
    }

    fn purge(&mut self) {
        let fired: Vec<TimerToken> = self.fired.borrow_mut().drain(..).collect();
        for token in fired {
            self.timeouts.remove(&token);
        }
    }
}

impl Scheduler for BrowserScheduler {
    fn schedule(&mut self, token: TimerToken, delay: Duration) {
        self.purge();
        let on_fire = self.on_fire.clone();
        let fired = self.fired.clone();
        let millis = u32::try_from(delay.as_millis()).unwrap_or(u32::MAX);
        let timeout = Timeout::new(millis, move || {
            on_fire(token);
            fired.borrow_mut().push(token);
        });
        self.timeouts.insert(token, timeout);
    }

    fn cancel(&mut self, token: TimerToken) {
        self.purge();
        // Dropping the handle clears the timeout.
        self.timeouts.remove(&token);
    }
}
