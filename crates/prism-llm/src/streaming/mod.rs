//! The streaming adapter: starter shapes, the start-phase guard, and the
//! lifecycle machine every provider composes.

pub mod adapter;
pub mod guard;
pub mod starter;

pub use adapter::{StreamContext, Translation, fail_stream, run_stream};
pub use guard::{with_start_phase, with_start_phase_retry};
pub use starter::{NativeStream, RawStarter, StarterResult, StreamMeta};
