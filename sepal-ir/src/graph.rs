//! The top level of the hierarchical program graph: a control-flow graph of
//! states over a per-level catalog of data containers.
use crate::common::{rrc, RRC, WRC};
use crate::state::State;
use crate::structure::{ArrayDecl, DataDecl, Node, StreamDecl};
use crate::symbolic::SymExpr;
use linked_hash_map::LinkedHashMap;
use petgraph::graph::NodeIndex;
use petgraph::stable_graph::StableDiGraph;
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use sepal_utils::{Error, GetName, Id, SepalResult};
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

/// Control edge between two states. Unconditional unless a condition is
/// attached.
#[derive(Debug, Clone, Default)]
pub struct InterstateEdge {
    pub condition: Option<SymExpr>,
}

/// The control-flow graph over a graph's states.
pub type ControlFlow = StableDiGraph<RRC<State>, InterstateEdge>;

/// Typed back-reference from a nested graph to the node that owns it and the
/// state containing that node. Keeping both hops explicit makes ascents
/// through the ownership tree checkable instead of positional.
#[derive(Debug, Clone)]
pub struct ParentLink {
    /// State containing the owning nested-graph node.
    pub state: WRC<State>,
    /// Index of the owning node inside that state.
    pub node: NodeIndex,
}

/// A hierarchical program graph. Each level owns an insertion-ordered
/// catalog of data containers (names unique per level), a symbol table of
/// literal bindings, and a control-flow graph of states. Nested levels hang
/// off `Node::Nested` nodes and never share catalog entries with an
/// ancestor.
#[derive(Debug)]
pub struct Graph {
    pub name: Id,
    pub arrays: LinkedHashMap<Id, DataDecl>,
    pub symbols: HashMap<Id, i64>,
    pub states: ControlFlow,
    pub parent: Option<ParentLink>,
}

impl GetName for Graph {
    fn name(&self) -> Id {
        self.name
    }
}

impl Graph {
    pub fn new<S: Into<Id>>(name: S) -> Self {
        Graph {
            name: name.into(),
            arrays: LinkedHashMap::new(),
            symbols: HashMap::new(),
            states: ControlFlow::default(),
            parent: None,
        }
    }

    // ── Catalog ─────────────────────────────────────────────────────────

    /// Add an array descriptor under a catalog-unique name.
    pub fn add_array<S: Into<Id>>(&mut self, name: S, decl: ArrayDecl) -> SepalResult<()> {
        self.add_data(name.into(), DataDecl::Array(decl))
    }

    /// Add a stream descriptor under a catalog-unique name.
    pub fn add_stream<S: Into<Id>>(&mut self, name: S, decl: StreamDecl) -> SepalResult<()> {
        self.add_data(name.into(), DataDecl::Stream(decl))
    }

    fn add_data(&mut self, name: Id, decl: DataDecl) -> SepalResult<()> {
        if self.arrays.contains_key(&name) {
            return Err(Error::already_exists(
                name,
                format!("in the data catalog of graph `{}'", self.name),
            ));
        }
        self.arrays.insert(name, decl);
        Ok(())
    }

    /// Bind a symbol to a literal value for size resolution at this level.
    pub fn bind_symbol<S: Into<Id>>(&mut self, name: S, value: i64) {
        self.symbols.insert(name.into(), value);
    }

    /// Resolve an expression against this level's symbol table.
    pub fn resolve(&self, expr: &SymExpr) -> Option<i64> {
        expr.resolve(&self.symbols)
    }

    // ── States and control flow ─────────────────────────────────────────

    /// Create a state with a graph-unique label.
    pub fn add_state<S: Into<Id>>(&mut self, label: S) -> SepalResult<RRC<State>> {
        let label = label.into();
        if self.find_state(label).is_some() {
            return Err(Error::already_exists(
                label,
                format!("as a state label in graph `{}'", self.name),
            ));
        }
        let state = rrc(State::new(label));
        self.states.add_node(state.clone());
        Ok(state)
    }

    pub fn find_state<S: Into<Id>>(&self, label: S) -> Option<RRC<State>> {
        let label = label.into();
        self.states
            .node_weights()
            .find(|st| st.borrow().label == label)
            .cloned()
    }

    /// The control-flow index of a state handle.
    pub fn state_index(&self, state: &RRC<State>) -> Option<NodeIndex> {
        self.states
            .node_indices()
            .find(|&idx| Rc::ptr_eq(&self.states[idx], state))
    }

    /// Add a control edge between two states.
    pub fn link_states(
        &mut self,
        src: &RRC<State>,
        dst: &RRC<State>,
        edge: InterstateEdge,
    ) -> SepalResult<()> {
        let (src_idx, dst_idx) = match (self.state_index(src), self.state_index(dst)) {
            (Some(s), Some(d)) => (s, d),
            _ => {
                return Err(Error::malformed_structure(format!(
                    "cannot link states not owned by graph `{}'",
                    self.name
                )))
            }
        };
        self.states.add_edge(src_idx, dst_idx, edge);
        Ok(())
    }

    /// Re-point every control edge entering `from` so it enters `to`.
    pub fn redirect_incoming(&mut self, from: NodeIndex, to: NodeIndex) {
        let edges: Vec<(petgraph::graph::EdgeIndex, NodeIndex)> = self
            .states
            .edges_directed(from, Direction::Incoming)
            .map(|e| (e.id(), e.source()))
            .collect();
        for (id, source) in edges {
            if let Some(weight) = self.states.remove_edge(id) {
                self.states.add_edge(source, to, weight);
            }
        }
    }

    /// Re-point every control edge leaving `from` so it leaves `to`.
    pub fn redirect_outgoing(&mut self, from: NodeIndex, to: NodeIndex) {
        let edges: Vec<(petgraph::graph::EdgeIndex, NodeIndex)> = self
            .states
            .edges_directed(from, Direction::Outgoing)
            .map(|e| (e.id(), e.target()))
            .collect();
        for (id, target) in edges {
            if let Some(weight) = self.states.remove_edge(id) {
                self.states.add_edge(to, target, weight);
            }
        }
    }

    // ── Recursive queries ───────────────────────────────────────────────

    /// Transients referenced from more than one state of this level.
    pub fn shared_transients(&self) -> HashSet<Id> {
        let mut seen_in: HashMap<Id, usize> = HashMap::new();
        let mut shared = HashSet::new();
        for (state_idx, st) in self.states.node_indices().enumerate() {
            let state = self.states[st].borrow();
            let mut local: HashSet<Id> = HashSet::new();
            for node in state.dataflow.node_weights() {
                if let Node::Access(a) = node {
                    if self
                        .arrays
                        .get(&a.array)
                        .map(|d| d.is_transient())
                        .unwrap_or(false)
                    {
                        local.insert(a.array);
                    }
                }
            }
            for name in local {
                match seen_in.get(&name) {
                    Some(&first) if first != state_idx => {
                        shared.insert(name);
                    }
                    Some(_) => {}
                    None => {
                        seen_in.insert(name, state_idx);
                    }
                }
            }
        }
        shared
    }

    /// All nested graphs reachable from this level, in discovery order.
    pub fn nested_recursive(&self) -> Vec<RRC<Graph>> {
        let mut out = Vec::new();
        for st in self.states.node_weights() {
            for node in st.borrow().dataflow.node_weights() {
                if let Node::Nested(n) = node {
                    out.push(n.graph.clone());
                    out.extend(n.graph.borrow().nested_recursive());
                }
            }
        }
        out
    }

    /// Check structural invariants: state labels are unique within this
    /// level, every access node references a declared container, and the
    /// same holds recursively for nested levels.
    pub fn validate(&self) -> SepalResult<()> {
        let mut labels = HashSet::new();
        for st in self.states.node_weights() {
            let state = st.borrow();
            if !labels.insert(state.label) {
                return Err(Error::malformed_structure(format!(
                    "duplicate state label `{}' in graph `{}'",
                    state.label, self.name
                )));
            }
            for node in state.dataflow.node_weights() {
                match node {
                    Node::Access(a) if !self.arrays.contains_key(&a.array) => {
                        return Err(Error::malformed_structure(format!(
                            "access node references undeclared container `{}' in state `{}'",
                            a.array, state.label
                        )));
                    }
                    Node::Nested(n) => n.graph.borrow().validate()?,
                    _ => {}
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structure::{DType, Memlet, NdRange, Schedule, Shape};

    fn array(extent: i64) -> ArrayDecl {
        ArrayDecl::new([SymExpr::from(extent)], DType::F32)
    }

    fn memlet(data: &str, extent: i64) -> Memlet {
        let shape: Shape = [SymExpr::from(extent)].into_iter().collect();
        Memlet::new(data, NdRange::full(&shape))
    }

    #[test]
    fn duplicate_array_name_is_rejected() {
        let mut g = Graph::new("prog");
        g.add_array("A", array(8)).unwrap();
        assert!(g.add_array("A", array(8)).is_err());
    }

    #[test]
    fn duplicate_state_label_is_rejected() {
        let mut g = Graph::new("prog");
        g.add_state("s0").unwrap();
        assert!(g.add_state("s0").is_err());
    }

    #[test]
    fn shared_transients_needs_two_states() {
        let mut g = Graph::new("prog");
        let mut tmp = array(8);
        tmp.transient = true;
        g.add_array("tmp", tmp).unwrap();
        let mut once = array(8);
        once.transient = true;
        g.add_array("once", once).unwrap();

        let s0 = g.add_state("s0").unwrap();
        let s1 = g.add_state("s1").unwrap();
        s0.borrow_mut().add_access("tmp");
        s0.borrow_mut().add_access("once");
        s1.borrow_mut().add_access("tmp");

        let shared = g.shared_transients();
        assert!(shared.contains(&Id::from("tmp")));
        assert!(!shared.contains(&Id::from("once")));
    }

    #[test]
    fn nested_parent_link_points_at_owning_state() {
        let mut outer = Graph::new("outer");
        let state = outer.add_state("host").unwrap();
        let inner = rrc(Graph::new("inner"));
        let idx = State::add_nested(&state, inner.clone(), Schedule::Default, vec![], vec![]);

        let link = inner.borrow().parent.clone().expect("parent link set");
        assert!(Rc::ptr_eq(&link.state.upgrade(), &state));
        assert_eq!(link.node, idx);
        assert_eq!(outer.nested_recursive().len(), 1);
    }

    #[test]
    fn validate_catches_undeclared_access() {
        let mut g = Graph::new("prog");
        g.add_array("A", array(4)).unwrap();
        let s0 = g.add_state("s0").unwrap();
        {
            let mut st = s0.borrow_mut();
            let a = st.add_access("A");
            let ghost = st.add_access("B");
            st.add_edge(a, None, ghost, None, memlet("A", 4));
        }
        assert!(g.validate().is_err());
    }

    #[test]
    fn redirect_incoming_moves_control_edges() {
        let mut g = Graph::new("prog");
        let s0 = g.add_state("s0").unwrap();
        let s1 = g.add_state("s1").unwrap();
        g.link_states(&s0, &s1, InterstateEdge::default()).unwrap();

        let pre = g.add_state("pre_s1").unwrap();
        let s1_idx = g.state_index(&s1).unwrap();
        let pre_idx = g.state_index(&pre).unwrap();
        g.redirect_incoming(s1_idx, pre_idx);
        g.states.add_edge(pre_idx, s1_idx, InterstateEdge::default());

        assert_eq!(
            g.states
                .edges_directed(s1_idx, Direction::Incoming)
                .count(),
            1
        );
        let pred = g
            .states
            .edges_directed(s1_idx, Direction::Incoming)
            .next()
            .map(|e| e.source())
            .unwrap();
        assert_eq!(pred, pre_idx);
        g.validate().unwrap();
    }
}
