//! Single-threaded I/O reactor.
//!
//! This module provides the readiness-based event loop:
//! - [`core`]: the [`EventLoop`](core::EventLoop) trait and the engine behind it
//! - [`dispatcher`]: the standalone [`Dispatcher`](dispatcher::Dispatcher)
//! - [`event`]: readiness-wait plumbing over `poll(2)`
//! - `io`: per-descriptor state and the descriptor registry
//! - [`timer`]: the sorted timer queue

pub mod core;
pub mod dispatcher;
pub mod event;
pub(crate) mod io;
pub mod timer;
