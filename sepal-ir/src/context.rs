//! The IR context: the top-level object threaded through the transformation
//! framework, pairing the program graph with process-wide configuration.
use crate::graph::Graph;

/// Configuration flags consumed by passes. Read-only from a pass's
/// perspective.
#[derive(Default)]
pub struct PassConf {
    /// Print a summary after each placement pass.
    pub debug_print: bool,
}

/// A complete program together with its configuration.
pub struct Context {
    /// The program graph being compiled.
    pub graph: Graph,
    /// Configuration flags for passes.
    pub conf: PassConf,
    /// Extra options provided on the command line, interpreted by individual
    /// passes.
    pub extra_opts: Vec<String>,
}

impl Context {
    pub fn new(graph: Graph) -> Self {
        Context {
            graph,
            conf: PassConf::default(),
            extra_opts: Vec::new(),
        }
    }
}
