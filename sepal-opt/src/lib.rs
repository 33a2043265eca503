//! Transformation passes over the Sepal IR.
//!
//! The flagship rewrite, [`passes::OffloadStateToAccel`], retargets one
//! control-flow state at a time to a spatial accelerator. Whole-graph
//! placement passes ([`passes::demote_unshared_transients`],
//! [`passes::interleave_banks_round_robin`]) then refine where the lowered
//! containers live. The [`pass_manager::PassManager`] registers rewrites by
//! name and drives them to a fixpoint over a [`sepal_ir::Context`].

mod pass_manager;
pub mod passes;
mod transform;

pub use pass_manager::{PassManager, TransformClosure};
pub use transform::{apply_to_fixpoint, Binding, Named, Pattern, Transform};
