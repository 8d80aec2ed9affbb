//! Timer queue.
//!
//! Pending timers are kept sorted by due time. A new timer is inserted after
//! every timer with the same or an earlier due time, so timers that share a
//! due time fire in registration order.

use crate::error::{ContractViolation, fatal};

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

/// A shareable timer callback.
///
/// The handle doubles as the timer's identity: [`cancel_time`] removes the
/// first pending timer whose due time and handle both match. Clones of one
/// handle are the same callback; two handles built from identical closures
/// are not.
///
/// [`cancel_time`]: crate::EventLoop::cancel_time
pub struct TimerCallback<L>(Rc<RefCell<dyn FnMut(&mut L, f64)>>);

impl<L> TimerCallback<L> {
    /// Wraps `callback`, which receives the event loop and the timer's due
    /// time when it fires.
    pub fn new<F>(callback: F) -> Self
    where
        F: FnMut(&mut L, f64) + 'static,
    {
        Self(Rc::new(RefCell::new(callback)))
    }

    /// Returns `true` if both handles refer to the same callback.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn call(&self, event_loop: &mut L, due: f64) {
        let mut callback = self.0.borrow_mut();
        (&mut *callback)(event_loop, due)
    }
}

impl<L> Clone for TimerCallback<L> {
    fn clone(&self) -> Self {
        Self(Rc::clone(&self.0))
    }
}

impl<L> fmt::Debug for TimerCallback<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TimerCallback")
            .field(&Rc::as_ptr(&self.0).cast::<()>())
            .finish()
    }
}

pub(crate) struct Timer<L> {
    pub(crate) due: f64,
    pub(crate) callback: TimerCallback<L>,
}

pub(crate) struct TimerQueue<L> {
    timers: VecDeque<Timer<L>>,
}

impl<L> TimerQueue<L> {
    pub(crate) fn new() -> Self {
        Self {
            timers: VecDeque::new(),
        }
    }

    pub(crate) fn insert(&mut self, due: f64, callback: TimerCallback<L>) {
        let position = self
            .timers
            .iter()
            .position(|timer| timer.due > due)
            .unwrap_or(self.timers.len());

        self.timers.insert(position, Timer { due, callback });
    }

    /// Removes the first timer matching `due` and `callback`.
    #[track_caller]
    pub(crate) fn cancel(&mut self, due: f64, callback: &TimerCallback<L>) {
        let position = self
            .timers
            .iter()
            .position(|timer| timer.due == due && timer.callback.ptr_eq(callback));

        match position {
            Some(index) => {
                self.timers.remove(index);
            }
            None => fatal(ContractViolation::NoSuchTimer(due)),
        }
    }

    pub(crate) fn next_deadline(&self) -> Option<f64> {
        self.timers.front().map(|timer| timer.due)
    }

    #[track_caller]
    pub(crate) fn pop_next(&mut self) -> Timer<L> {
        match self.timers.pop_front() {
            Some(timer) => timer,
            None => fatal(ContractViolation::NoPendingTimer),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.timers.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }

    pub(crate) fn clear(&mut self) {
        self.timers.clear();
    }
}
