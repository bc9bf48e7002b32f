//! Structural rewrites of guarded conditionals.
//!
//! - [`guard_raise`] deletes conditionals that only raise.
//! - [`promote`] hoists a promotable computation out of a conditional whose
//!   other arm raises.
//! - [`dce`] cleans up the predicates and clones those rewrites leave unused.
//!
//! The rewrites never run DCE themselves; callers sequence it.

mod arm;
pub mod dce;
pub mod error;
pub mod guard_raise;
mod pass;
pub mod promote;

pub use dce::{DceConfig, DceResult, eliminate_dead_code, eliminate_dead_code_with_config};
pub use error::{LoweringError, LoweringResult};
pub use guard_raise::{eliminate_guard_raise, eliminate_guard_raise_with_config};
pub use pass::{PassConfig, PassReport};
pub use promote::{
    PromotableKinds, promote_guarded_computation, promote_guarded_computation_with_config,
};
