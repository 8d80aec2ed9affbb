use crate::error::{ContractViolation, fatal};
use crate::reactor::event::{self, Timeout, WaitSet};
use crate::reactor::io::{ReadCallback, Registry};
use crate::reactor::timer::{TimerCallback, TimerQueue};
use crate::time;

use std::cell::RefCell;
use std::fmt;
use std::io;
use std::os::unix::io::RawFd;
use std::rc::Rc;

use tracing::{Span, debug, trace, warn};

/// Outcome of a successful [`EventLoop::run_once`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Iteration {
    /// Nothing is registered: no watched descriptors and no pending timers.
    Idle,
    /// A timer fired or ready descriptors were handled.
    Handled,
}

/// Descriptor registry, timer queue and logging span of one event loop.
///
/// Owned by [`Dispatcher`](crate::Dispatcher) and
/// [`NetworkServer`](crate::NetworkServer); not constructible on its own.
pub struct Core<L> {
    files: Registry<L>,
    timers: TimerQueue<L>,
    span: Span,
}

impl<L> Core<L> {
    pub(crate) fn new(span: Span) -> Self {
        Self {
            files: Registry::new(),
            timers: TimerQueue::new(),
            span,
        }
    }

    pub(crate) fn span(&self) -> &Span {
        &self.span
    }

    #[track_caller]
    fn watch(&mut self, file_descriptor: RawFd, callback: ReadCallback<L>) {
        if file_descriptor < 0 {
            fatal(ContractViolation::NegativeDescriptor(file_descriptor));
        }

        debug!(
            parent: &self.span,
            fd = file_descriptor,
            replaced = self.files.contains(file_descriptor),
            "watching descriptor"
        );

        self.files.watch(file_descriptor, callback);
    }

    #[track_caller]
    pub(crate) fn unwatch(&mut self, file_descriptor: RawFd) {
        match self.files.unwatch(file_descriptor) {
            Some(file) => debug!(
                parent: &self.span,
                fd = file_descriptor,
                dropped = file.outgoing.len(),
                "dropped descriptor"
            ),
            None => fatal(ContractViolation::UnknownDescriptor(file_descriptor)),
        }
    }

    #[track_caller]
    pub(crate) fn enqueue(&mut self, file_descriptor: RawFd, data: &[u8]) {
        let Some(file) = self.files.get_mut(file_descriptor) else {
            fatal(ContractViolation::UnknownDescriptor(file_descriptor));
        };

        file.outgoing.extend_from_slice(data);
    }

    #[track_caller]
    fn queued(&self, file_descriptor: RawFd) -> usize {
        match self.files.get(file_descriptor) {
            Some(file) => file.outgoing.len(),
            None => fatal(ContractViolation::UnknownDescriptor(file_descriptor)),
        }
    }

    /// Makes one non-blocking attempt to write the queued output of
    /// `file_descriptor`; whatever the kernel does not take stays queued.
    #[track_caller]
    fn flush(&mut self, file_descriptor: RawFd) {
        let Core { files, span, .. } = self;

        let Some(file) = files.get_mut(file_descriptor) else {
            fatal(ContractViolation::UnknownDescriptor(file_descriptor));
        };

        if file.outgoing.is_empty() {
            return;
        }

        match event::write_some(file_descriptor, &file.outgoing) {
            Ok(written) => {
                file.outgoing.drain(..written);

                trace!(
                    parent: &*span,
                    fd = file_descriptor,
                    written,
                    remaining = file.outgoing.len(),
                    "flushed output"
                );
            }
            Err(error) if event::is_transient(&error) => {}
            Err(error) => {
                warn!(
                    parent: &*span,
                    fd = file_descriptor,
                    %error,
                    dropped = file.outgoing.len(),
                    "write failed, dropping queued output"
                );

                file.outgoing.clear();
            }
        }
    }

    fn prepare_wait(&self) -> WaitSet {
        let timeout = match self.timers.next_deadline() {
            None => Timeout::Never,
            Some(due) => match time::remaining(due) {
                Some(remaining) => Timeout::After(remaining),
                None => Timeout::Expired,
            },
        };

        let mut wait = WaitSet::new(timeout);

        for (file_descriptor, file) in self.files.iter() {
            wait.add(file_descriptor, !file.outgoing.is_empty());
        }

        wait
    }

    pub(crate) fn clear(&mut self) {
        if !self.files.is_empty() || !self.timers.is_empty() {
            debug!(
                parent: &self.span,
                files = self.files.len(),
                timers = self.timers.len(),
                "closing"
            );
        }

        self.files.clear();
        self.timers.clear();
    }
}

impl<L> fmt::Debug for Core<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Core")
            .field("files", &self.files.len())
            .field("timers", &self.timers.len())
            .field("next_deadline", &self.timers.next_deadline())
            .finish()
    }
}

/// The single-threaded reactor surface shared by
/// [`Dispatcher`](crate::Dispatcher) and
/// [`NetworkServer`](crate::NetworkServer).
///
/// Callbacks receive `&mut Self`, so they can register and drop descriptors,
/// queue output, arm timers or [`close`](Self::close) the loop while it runs.
/// Every callback runs to completion before the next readiness wait.
///
/// Operating on a descriptor that is not watched, cancelling a timer that is
/// not pending or watching a negative descriptor is a contract violation and
/// panics with a [`ContractViolation`].
pub trait EventLoop: Sized + 'static {
    #[doc(hidden)]
    fn core(&self) -> &Core<Self>;

    #[doc(hidden)]
    fn core_mut(&mut self) -> &mut Core<Self>;

    /// Calls `callback` whenever `file_descriptor` is readable. Watching a
    /// descriptor again replaces its callback and keeps its queued output.
    /// The callback does the reading itself.
    #[track_caller]
    fn watch<F>(&mut self, file_descriptor: RawFd, callback: F)
    where
        F: FnMut(&mut Self, RawFd) + 'static,
    {
        self.core_mut()
            .watch(file_descriptor, Rc::new(RefCell::new(callback)));
    }

    /// Stops watching `file_descriptor`. Output still queued for it is lost.
    #[track_caller]
    fn unwatch(&mut self, file_descriptor: RawFd) {
        self.core_mut().unwatch(file_descriptor);
    }

    /// Queues `data` for `file_descriptor`. It is written out without
    /// blocking, piece by piece, whenever the descriptor is writable.
    #[track_caller]
    fn write(&mut self, file_descriptor: RawFd, data: &[u8]) {
        self.core_mut().enqueue(file_descriptor, data);
    }

    /// Number of bytes still queued for `file_descriptor`.
    #[track_caller]
    fn queued(&self, file_descriptor: RawFd) -> usize {
        self.core().queued(file_descriptor)
    }

    /// Calls `callback` once at `due`, in seconds since the UNIX epoch (see
    /// [`now`](crate::time::now)).
    fn on_time(&mut self, due: f64, callback: &TimerCallback<Self>) {
        let core = self.core_mut();

        debug!(parent: &core.span, due, pending = core.timers.len(), "timer set");

        core.timers.insert(due, callback.clone());
    }

    /// Cancels the first pending timer set for `due` with `callback`.
    #[track_caller]
    fn cancel_time(&mut self, due: f64, callback: &TimerCallback<Self>) {
        let core = self.core_mut();

        core.timers.cancel(due, callback);

        debug!(parent: &core.span, due, "timer cancelled");
    }

    /// One more than the highest watched descriptor, 0 if none is watched.
    fn fd_count(&self) -> usize {
        self.core().files.bound()
    }

    fn is_watched(&self, file_descriptor: RawFd) -> bool {
        self.core().files.contains(file_descriptor)
    }

    /// Number of timers that have not fired or been cancelled yet.
    fn timer_count(&self) -> usize {
        self.core().timers.len()
    }

    /// Builds the inputs for the next readiness wait. Callers running their
    /// own wait pass the result to [`process_wait`](Self::process_wait).
    fn prepare_wait(&self) -> WaitSet {
        self.core().prepare_wait()
    }

    /// Runs the callback registered for `file_descriptor`.
    #[track_caller]
    fn handle_readable(&mut self, file_descriptor: RawFd) {
        let callback = match self.core().files.get(file_descriptor) {
            Some(file) => Rc::clone(&file.callback),
            None => fatal(ContractViolation::UnknownDescriptor(file_descriptor)),
        };

        let mut callback = callback.borrow_mut();
        (&mut *callback)(self, file_descriptor);
    }

    /// Makes one non-blocking write attempt of the output queued for
    /// `file_descriptor`.
    #[track_caller]
    fn handle_writable(&mut self, file_descriptor: RawFd) {
        self.core_mut().flush(file_descriptor);
    }

    /// Removes the earliest timer and runs its callback.
    #[track_caller]
    fn fire_next_timer(&mut self) {
        let timer = self.core_mut().timers.pop_next();

        trace!(parent: self.core().span(), due = timer.due, "timer fired");

        timer.callback.call(self, timer.due);
    }

    /// Handles the outcome of a readiness wait on `wait`: a timeout fires the
    /// earliest timer once it is due, readiness runs read callbacks and
    /// flushes output, and a failed wait is returned as is.
    fn process_wait(&mut self, result: io::Result<usize>, wait: &WaitSet) -> io::Result<()> {
        if result? == 0 {
            // Waits are capped well short of far-off deadlines; only fire a
            // timer that is actually due.
            if let Some(due) = self.core().timers.next_deadline()
                && time::remaining(due).is_some()
            {
                trace!(parent: self.core().span(), due, "woke before deadline");
                return Ok(());
            }

            self.fire_next_timer();
            return Ok(());
        }

        if let Some(readiness) = wait.ready().find(|readiness| readiness.invalid) {
            warn!(
                parent: self.core().span(),
                fd = readiness.file_descriptor,
                "watched descriptor is not open"
            );

            return Err(io::Error::from_raw_os_error(libc::EBADF));
        }

        for readiness in wait.ready() {
            let file_descriptor = readiness.file_descriptor;

            if readiness.readable && self.is_watched(file_descriptor) {
                self.handle_readable(file_descriptor);
            }

            if readiness.writable && self.is_watched(file_descriptor) {
                self.handle_writable(file_descriptor);
            }
        }

        Ok(())
    }

    /// Waits for one batch of events and handles it. A timer that is already
    /// due fires without waiting at all.
    fn run_once(&mut self) -> io::Result<Iteration> {
        let span = self.core().span().clone();
        let _entered = span.enter();

        let mut wait = self.prepare_wait();

        if wait.timeout() == Timeout::Expired {
            self.process_wait(Ok(0), &wait)?;
            return Ok(Iteration::Handled);
        }

        if wait.is_empty() {
            debug!("nothing left to wait for");
            return Ok(Iteration::Idle);
        }

        trace!(
            readable = ?wait.readable().collect::<Vec<_>>(),
            writable = ?wait.writable().collect::<Vec<_>>(),
            timeout = ?wait.timeout(),
            "waiting"
        );

        let result = wait.wait();

        if let Err(error) = &result {
            if error.kind() == io::ErrorKind::Interrupted {
                return Ok(Iteration::Handled);
            }

            warn!(%error, "readiness wait failed");
        }

        self.process_wait(result, &wait)?;

        Ok(Iteration::Handled)
    }

    /// Handles events until nothing is registered any more. Returns an error
    /// only if a readiness wait fails.
    fn run(&mut self) -> io::Result<()> {
        loop {
            if self.run_once()? == Iteration::Idle {
                return Ok(());
            }
        }
    }

    /// Drops every watched descriptor (and its queued output) and every
    /// timer, which makes a running [`run`](Self::run) return.
    fn close(&mut self) {
        self.core_mut().clear();
    }
}
