//! Record and replay of calls made through intercepted targets.
//!
//! # Overview
//!
//! A session wraps a set of [`target::Target`]s for the duration of a body:
//! 1. **Recording** – the real callable runs and its result is appended to a
//!    [`recording::Cassette`]. Nested intercepted calls made while computing
//!    a captured result are not captured again, including calls made on
//!    worker threads started with [`recorder::spawn`].
//! 2. **Playback** – recordable calls are answered from the cassette, one
//!    FIFO queue per `(target, arg key)`, without running the real callable.
//!
//! Either way a session's wrappers are removed when the body returns, fails
//! or panics, even when sessions on the same target end out of order.

pub mod recorder;
pub mod recording;
pub mod replayer;
pub mod session;
pub mod spec;
pub mod target;
pub mod wrapper;
