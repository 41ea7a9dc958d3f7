//! Test execution: discovery, scheduling, assertions, traces, and reporting.

pub mod expect;
pub mod reporter;
pub mod runner;
pub mod scenario;
pub mod trace;

pub use reporter::{Reporter, build_reporters};
pub use runner::{Runner, RunnerOptions};
pub use scenario::{Step, TestCase, discover};
