//! Client-side chunk mesh scheduling and visibility-culling pipeline.
//!
//! Converts "these sections of the world changed" and "the camera moved"
//! into prioritized mesh-build work on a bounded worker pool, and hands the
//! finished geometry back to the render thread.

#[macro_use]
extern crate tracing;

pub mod logging;
pub mod settings;
pub mod util_abort_handle;
pub mod cause;
pub mod visibility;
pub mod queue;
pub mod thread_pool;
pub mod world;
pub mod mesher;
pub mod renderer;
