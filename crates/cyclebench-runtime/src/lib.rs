#![doc = "Measurement primitives: cycle counters, elapsed timers, and the lab sampling sequence."]

pub mod counter;
pub mod measure;
pub mod realtime;
pub mod sleep;
pub mod timer;

pub use counter::*;
pub use measure::*;
pub use realtime::*;
pub use sleep::*;
pub use timer::*;
