//! The pattern-matching transformation contract.
//!
//! Every graph rewrite implements [`Transform`]: it names the node-shape
//! patterns it matches, filters concrete bindings with an applicability
//! predicate, and mutates the graph in place through `apply`. Enumeration
//! always runs against a frozen snapshot; after any successful `apply`,
//! previously enumerated bindings are discarded and candidates are
//! re-enumerated, because node and edge handles may have been invalidated
//! by the mutation.
use sepal_ir::{self as ir, RRC};
use sepal_utils::SepalResult;

/// Trait that describes named things. Required by the registry so that a
/// transformation can be identified without an instance.
pub trait Named {
    /// The name of a transformation. Used for identifying transformations.
    fn name() -> &'static str;
    /// A short description of the transformation.
    fn description() -> &'static str;
}

/// Candidate subgraph templates used to enumerate syntactic matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pattern {
    /// A single control-flow state, matched independently of its neighbors.
    SingleState,
}

/// A concrete binding of pattern placeholders to graph elements.
#[derive(Clone)]
pub enum Binding {
    State(RRC<ir::State>),
}

/// A graph-rewriting transformation.
pub trait Transform {
    /// The patterns this transformation matches.
    fn patterns(&self) -> Vec<Pattern>;

    /// Enumerate candidate bindings against a snapshot of the graph.
    /// The default implementation expands each pattern structurally.
    fn candidates(&self, graph: &ir::Graph) -> Vec<Binding> {
        self.patterns()
            .into_iter()
            .flat_map(|pattern| match pattern {
                Pattern::SingleState => graph
                    .states
                    .node_weights()
                    .cloned()
                    .map(Binding::State)
                    .collect::<Vec<_>>(),
            })
            .collect()
    }

    /// Applicability predicate for a concrete binding. May inspect the whole
    /// graph for context (e.g. enclosing scopes); must not mutate anything.
    fn can_apply(&self, graph: &ir::Graph, binding: &Binding) -> bool;

    /// Mutate the graph in place. The binding must have passed `can_apply`
    /// against the current graph; violating that precondition is a
    /// programming-contract breach and panics rather than reporting an
    /// error. Runs to completion without interleaved mutation.
    fn apply(&mut self, graph: &mut ir::Graph, binding: &Binding);
}

/// Run one transformation to fixpoint: enumerate candidates over a
/// snapshot, apply the first applicable binding, and re-enumerate until no
/// candidate is applicable. Returns the number of applications.
pub fn apply_to_fixpoint<T: Transform + Named + Default>(
    ctx: &mut ir::Context,
) -> SepalResult<u64> {
    let mut transform = T::default();
    let mut applied = 0u64;
    loop {
        let candidates = transform.candidates(&ctx.graph);
        let binding = candidates
            .into_iter()
            .find(|c| transform.can_apply(&ctx.graph, c));
        match binding {
            Some(binding) => {
                transform.apply(&mut ctx.graph, &binding);
                applied += 1;
            }
            None => break,
        }
    }
    Ok(applied)
}
