//! Guard elimination and guarded-computation promotion for graph IR.
//!
//! The IR lives in [`guardlift_ir`], the rewrites in [`guardlift_passes`].
//! This crate sequences them into a pipeline with DCE, verification and
//! logging hooks.

pub mod error;
pub mod logger;
pub mod pipeline;

pub use error::{Error, Result};
pub use logger::{GraphLogger, NoopLogger, TracingLogger};
pub use pipeline::{
    Lowered, LoweringConfig, PassKind, PassOutcome, lower_file, lower_text, run_pipeline,
};
