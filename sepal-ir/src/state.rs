//! A control-flow state and its dataflow multigraph.
use crate::common::{RRC, WRC};
use crate::graph::{Graph, ParentLink};
use crate::structure::{Access, Edge, Map, Memlet, NdRange, NestedGraph, Node, Schedule, Tasklet};
use petgraph::graph::{EdgeIndex, NodeIndex};
use petgraph::stable_graph::StableDiGraph;
use petgraph::visit::EdgeRef;
use petgraph::{algo, Direction};
use sepal_utils::{GetName, Id};
use std::collections::HashMap;

/// The dataflow multigraph of one state. Stable indices survive unrelated
/// node and edge removals, so handles stay valid across graph surgery within
/// a single `apply`.
pub type Dataflow = StableDiGraph<Node, Edge>;

/// One control-flow state. Owns its nodes and edges; its label is unique
/// within the owning graph.
#[derive(Debug)]
pub struct State {
    pub label: Id,
    pub dataflow: Dataflow,
}

impl GetName for State {
    fn name(&self) -> Id {
        self.label
    }
}

impl State {
    pub fn new<S: Into<Id>>(label: S) -> Self {
        State {
            label: label.into(),
            dataflow: Dataflow::default(),
        }
    }

    // ── Node constructors ───────────────────────────────────────────────

    pub fn add_access<S: Into<Id>>(&mut self, array: S) -> NodeIndex {
        self.dataflow.add_node(Node::Access(Access {
            array: array.into(),
        }))
    }

    pub fn add_tasklet<S: Into<Id>>(&mut self, label: S) -> NodeIndex {
        self.dataflow.add_node(Node::Tasklet(Tasklet {
            label: label.into(),
        }))
    }

    /// Add a map scope, returning its (entry, exit) pair.
    pub fn add_map<S: Into<Id>>(
        &mut self,
        label: S,
        range: NdRange,
        schedule: Schedule,
    ) -> (NodeIndex, NodeIndex) {
        let entry = self.dataflow.add_node(Node::MapEntry(Map {
            label: label.into(),
            range,
            schedule,
        }));
        let exit = self.dataflow.add_node(Node::MapExit { entry });
        (entry, exit)
    }

    /// Add a nested-graph node owning `child` and set the child's parent
    /// back-reference. Takes the state by reference-counted pointer because
    /// the back-reference must point at the owning state.
    pub fn add_nested(
        this: &RRC<State>,
        child: RRC<Graph>,
        schedule: Schedule,
        inputs: Vec<Id>,
        outputs: Vec<Id>,
    ) -> NodeIndex {
        let idx = this.borrow_mut().dataflow.add_node(Node::Nested(NestedGraph {
            graph: child.clone(),
            schedule,
            inputs,
            outputs,
        }));
        child.borrow_mut().parent = Some(ParentLink {
            state: WRC::from(this),
            node: idx,
        });
        idx
    }

    // ── Edges ───────────────────────────────────────────────────────────

    pub fn add_edge(
        &mut self,
        src: NodeIndex,
        src_conn: Option<Id>,
        dst: NodeIndex,
        dst_conn: Option<Id>,
        memlet: Memlet,
    ) -> EdgeIndex {
        self.dataflow.add_edge(
            src,
            dst,
            Edge {
                src_conn,
                dst_conn,
                memlet,
            },
        )
    }

    /// All edges incident to `node`, in either direction.
    pub fn edges_incident(&self, node: NodeIndex) -> Vec<EdgeIndex> {
        self.dataflow
            .edges_directed(node, Direction::Incoming)
            .map(|e| e.id())
            .chain(
                self.dataflow
                    .edges_directed(node, Direction::Outgoing)
                    .map(|e| e.id()),
            )
            .collect()
    }

    // ── Queries ─────────────────────────────────────────────────────────

    /// Nodes with no incoming edges.
    pub fn sources(&self) -> Vec<NodeIndex> {
        self.dataflow
            .node_indices()
            .filter(|&n| {
                self.dataflow
                    .edges_directed(n, Direction::Incoming)
                    .next()
                    .is_none()
            })
            .collect()
    }

    /// Nodes with no outgoing edges.
    pub fn sinks(&self) -> Vec<NodeIndex> {
        self.dataflow
            .node_indices()
            .filter(|&n| {
                self.dataflow
                    .edges_directed(n, Direction::Outgoing)
                    .next()
                    .is_none()
            })
            .collect()
    }

    /// Map every node to its innermost enclosing map entry, or `None` for
    /// unscoped nodes. A map exit belongs to the scope its entry opens;
    /// successors of the exit return to the entry's own scope.
    ///
    /// # Panics
    /// Panics when the dataflow graph contains a cycle; states are DAGs by
    /// construction.
    pub fn scope_tree(&self) -> HashMap<NodeIndex, Option<NodeIndex>> {
        let order = algo::toposort(&self.dataflow, None).unwrap_or_else(|_| {
            panic!("dataflow graph of state `{}' contains a cycle", self.label)
        });

        let mut scope: HashMap<NodeIndex, Option<NodeIndex>> = HashMap::new();
        for idx in order {
            let parent = self
                .dataflow
                .edges_directed(idx, Direction::Incoming)
                .next()
                .map(|e| {
                    let pred = e.source();
                    match &self.dataflow[pred] {
                        Node::MapEntry(_) => Some(pred),
                        Node::MapExit { entry } => scope[entry],
                        _ => scope[&pred],
                    }
                })
                .unwrap_or(None);
            scope.insert(idx, parent);
        }
        scope
    }

    // ── Graph surgery ───────────────────────────────────────────────────

    /// Re-point every edge leaving `from` so it leaves `to` instead.
    pub fn redirect_sources(&mut self, from: NodeIndex, to: NodeIndex) {
        let edges: Vec<(EdgeIndex, NodeIndex)> = self
            .dataflow
            .edges_directed(from, Direction::Outgoing)
            .map(|e| (e.id(), e.target()))
            .collect();
        for (id, target) in edges {
            if let Some(weight) = self.dataflow.remove_edge(id) {
                self.dataflow.add_edge(to, target, weight);
            }
        }
    }

    /// Re-point every edge entering `from` so it enters `to` instead.
    pub fn redirect_dests(&mut self, from: NodeIndex, to: NodeIndex) {
        let edges: Vec<(EdgeIndex, NodeIndex)> = self
            .dataflow
            .edges_directed(from, Direction::Incoming)
            .map(|e| (e.id(), e.source()))
            .collect();
        for (id, source) in edges {
            if let Some(weight) = self.dataflow.remove_edge(id) {
                self.dataflow.add_edge(source, to, weight);
            }
        }
    }

    /// Remove a node. Incident edges must have been re-pointed beforehand;
    /// removing a node with live edges would leave dangling movement.
    pub fn remove_node(&mut self, node: NodeIndex) -> Option<Node> {
        self.dataflow.remove_node(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structure::Shape;
    use crate::symbolic::SymExpr;

    fn unit_memlet(data: &str) -> Memlet {
        let shape: Shape = [SymExpr::from(8)].into_iter().collect();
        Memlet::new(data, NdRange::full(&shape))
    }

    fn unit_range() -> NdRange {
        NdRange::new([(SymExpr::from(0), SymExpr::from(7), SymExpr::from(1))])
    }

    #[test]
    fn sources_and_sinks() {
        let mut st = State::new("s0");
        let x = st.add_access("X");
        let t = st.add_tasklet("copy");
        let y = st.add_access("Y");
        st.add_edge(x, None, t, Some("in".into()), unit_memlet("X"));
        st.add_edge(t, Some("out".into()), y, None, unit_memlet("Y"));

        assert_eq!(st.sources(), vec![x]);
        assert_eq!(st.sinks(), vec![y]);
    }

    #[test]
    fn scope_tree_tracks_map_nesting() {
        let mut st = State::new("s0");
        let x = st.add_access("X");
        let (outer_en, outer_ex) = st.add_map("i", unit_range(), Schedule::Default);
        let (inner_en, inner_ex) = st.add_map("j", unit_range(), Schedule::Default);
        let t = st.add_tasklet("body");
        let y = st.add_access("Y");
        st.add_edge(x, None, outer_en, None, unit_memlet("X"));
        st.add_edge(outer_en, None, inner_en, None, unit_memlet("X"));
        st.add_edge(inner_en, None, t, None, unit_memlet("X"));
        st.add_edge(t, None, inner_ex, None, unit_memlet("Y"));
        st.add_edge(inner_ex, None, outer_ex, None, unit_memlet("Y"));
        st.add_edge(outer_ex, None, y, None, unit_memlet("Y"));

        let scope = st.scope_tree();
        assert_eq!(scope[&x], None);
        assert_eq!(scope[&outer_en], None);
        assert_eq!(scope[&inner_en], Some(outer_en));
        assert_eq!(scope[&t], Some(inner_en));
        assert_eq!(scope[&inner_ex], Some(inner_en));
        assert_eq!(scope[&outer_ex], Some(outer_en));
        // After the outer exit we are back at top level.
        assert_eq!(scope[&y], None);
    }

    #[test]
    fn redirect_sources_moves_all_outgoing_edges() {
        let mut st = State::new("s0");
        let x = st.add_access("X");
        let a = st.add_tasklet("a");
        let b = st.add_tasklet("b");
        st.add_edge(x, None, a, None, unit_memlet("X"));
        st.add_edge(x, None, b, None, unit_memlet("X"));

        let proxy = st.add_access("accel_X");
        st.redirect_sources(x, proxy);

        assert!(st
            .dataflow
            .edges_directed(x, Direction::Outgoing)
            .next()
            .is_none());
        assert_eq!(
            st.dataflow
                .edges_directed(proxy, Direction::Outgoing)
                .count(),
            2
        );
        // The old node is now isolated and safe to remove.
        assert!(st.remove_node(x).is_some());
        assert!(st.dataflow.contains_node(proxy));
    }
}
