//! Benchmark problems: the task model, problem sources and exemplars.

pub mod exemplars;
pub mod source;
pub mod task;

pub use exemplars::ExemplarLibrary;
pub use source::{JsonlProblemSource, ProblemSource};
pub use task::{SampleIo, Task, TaskKind};
