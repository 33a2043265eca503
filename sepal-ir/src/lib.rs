//! Internal representation for the Sepal compiler.
//!
//! Programs are hierarchical dataflow graphs: a control-flow graph of
//! [`State`]s, each holding a dataflow multigraph of [`Node`]s connected by
//! memlet-carrying edges. Nodes may recursively own nested [`Graph`]s,
//! giving unbounded nesting depth. Transformation passes (see the
//! `sepal-opt` crate) mutate this representation in place to retarget
//! programs at spatial accelerators.

// Modules defining internal structures.
mod common;
mod context;
mod graph;
mod printer;
mod state;
mod structure;
mod symbolic;

// Re-export types at the module level.
pub use common::{rrc, RRC, WRC};
pub use context::{Context, PassConf};
pub use graph::{ControlFlow, Graph, InterstateEdge, ParentLink};
pub use printer::Printer;
pub use state::{Dataflow, State};
pub use structure::{
    Access, AccessOrder, ArrayDecl, DType, DataDecl, Edge, Map, Memlet, NdRange, NestedGraph,
    Node, RangeDim, Schedule, Shape, Storage, StreamDecl, Tasklet, Wcr,
};
pub use symbolic::SymExpr;

// Re-export types from the utility crate.
pub use sepal_utils::{GetName, Id};
