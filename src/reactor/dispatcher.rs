use crate::builder::DispatcherBuilder;
use crate::reactor::core::{Core, EventLoop};

/// A plain I/O dispatcher: read callbacks on watched descriptors, buffered
/// non-blocking writes and one-shot timers.
///
/// # Example
///
/// ```no_run
/// use netdispatch::{Dispatcher, EventLoop, TimerCallback, time};
///
/// let mut dispatcher = Dispatcher::new();
///
/// let stop = TimerCallback::new(|dispatcher: &mut Dispatcher, _due| dispatcher.close());
/// dispatcher.on_time(time::now() + 0.5, &stop);
///
/// dispatcher.run().expect("readiness wait failed");
/// ```
#[derive(Debug)]
pub struct Dispatcher {
    core: Core<Dispatcher>,
}

impl Dispatcher {
    /// Creates a dispatcher with the default configuration.
    pub fn new() -> Self {
        DispatcherBuilder::new().build()
    }

    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::new()
    }

    pub(crate) fn with_core(core: Core<Dispatcher>) -> Self {
        Self { core }
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl EventLoop for Dispatcher {
    fn core(&self) -> &Core<Self> {
        &self.core
    }

    fn core_mut(&mut self) -> &mut Core<Self> {
        &mut self.core
    }
}
