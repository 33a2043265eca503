//! Retarget one control-flow state to the accelerator.
//!
//! The rewrite matches a single state, checks that nothing in it is already
//! lowered, and then performs the full lowering surgery: staging states for
//! host-to-device and device-to-host copies are inserted around the matched
//! state, device-resident proxy containers replace the host containers
//! inside it, vector widths are pulled out of adjacent nested levels, and
//! every descriptor and schedule in the subtree is reclassified for the
//! accelerator.
use crate::transform::{Binding, Named, Pattern, Transform};
use linked_hash_map::LinkedHashMap;
use petgraph::graph::{EdgeIndex, NodeIndex};
use petgraph::visit::{EdgeRef, IntoEdgeReferences};
use petgraph::Direction;
use sepal_ir::{
    self as ir, ArrayDecl, DataDecl, Id, InterstateEdge, Memlet, NdRange, NestedGraph, Node,
    Schedule, Storage, RRC,
};
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

/// Prefix used to derive a device proxy's name from the host container it
/// mirrors.
pub const PROXY_PREFIX: &str = "accel_";

/// Retarget a state to the accelerator, staging host/device copies around
/// it and reclassifying placement and scheduling throughout its subtree.
#[derive(Default)]
pub struct OffloadStateToAccel;

impl Named for OffloadStateToAccel {
    fn name() -> &'static str {
        "offload-state"
    }

    fn description() -> &'static str {
        "retarget a control-flow state to the accelerator, inserting host/device staging states"
    }
}

impl Transform for OffloadStateToAccel {
    fn patterns(&self) -> Vec<Pattern> {
        vec![Pattern::SingleState]
    }

    fn can_apply(&self, graph: &ir::Graph, binding: &Binding) -> bool {
        let Binding::State(state) = binding;
        let state = state.borrow();
        let scopes = state.scope_tree();

        for idx in state.dataflow.node_indices() {
            match &state.dataflow[idx] {
                // A state lowered once is never matched again: its access
                // nodes no longer sit at default storage.
                Node::Access(access) => {
                    let placed = graph
                        .arrays
                        .get(&access.array)
                        .map(|decl| decl.storage() != Storage::Default)
                        .unwrap_or(false);
                    if placed {
                        return false;
                    }
                }
                Node::MapEntry(map) => {
                    if map.range.dims() > 3 {
                        return false;
                    }
                    if matches!(
                        map.schedule,
                        Schedule::Distributed | Schedule::AccelDevice | Schedule::AccelThreadBlock
                    ) {
                        return false;
                    }
                    // Walk the chain of enclosing scopes for regions that
                    // are already accelerator-scheduled.
                    let mut current = scopes[&idx];
                    while let Some(entry) = current {
                        if let Node::MapEntry(enclosing) = &state.dataflow[entry] {
                            if matches!(
                                enclosing.schedule,
                                Schedule::AccelDevice | Schedule::AccelThreadBlock
                            ) {
                                return false;
                            }
                        }
                        current = scopes[&entry];
                    }
                }
                _ => {}
            }
        }
        true
    }

    fn apply(&mut self, graph: &mut ir::Graph, binding: &Binding) {
        let Binding::State(state) = binding;
        let state_idx = graph
            .state_index(state)
            .expect("matched state is owned by the graph");
        let label = state.borrow().label;

        let mut input_nodes = state.borrow().sources();
        let output_nodes = state.borrow().sinks();

        // Host containers accumulated into from nested levels must also be
        // staged to the device.
        let wcr_inputs = collect_wcr_inputs(state, &mut input_nodes);

        // Host name -> proxy name, created once per distinct container.
        let mut staged: HashMap<Id, Id> = HashMap::new();
        // Handles removed by the input staging. Freed indices are reused by
        // the proxy nodes added in the same loop, so membership must be
        // tracked here rather than asked of the graph.
        let mut removed: HashSet<NodeIndex> = HashSet::new();

        if !input_nodes.is_empty() {
            let pre_state = graph
                .add_state(format!("pre_{label}"))
                .expect("staging label must be fresh");

            for &node_idx in &input_nodes {
                let Some((name, array)) = host_array(graph, state, node_idx) else {
                    // Only array containers are transferred; streams are
                    // unsupported and skipped.
                    continue;
                };
                let proxy = stage_proxy(graph, &mut staged, name, &array);

                // Full-extent host-to-device copy in the staging state.
                let mut pre = pre_state.borrow_mut();
                let host_node = pre.add_access(name);
                let device_node = pre.add_access(proxy);
                let full = NdRange::full(&array.shape);
                pre.add_edge(host_node, None, device_node, None, Memlet::new(name, full));
                drop(pre);

                // WCR targets keep their original node in the matched state;
                // their producer edges are rewired by the output staging.
                if !wcr_inputs.contains(&node_idx) {
                    let mut st = state.borrow_mut();
                    let replacement = st.add_access(proxy);
                    st.redirect_sources(node_idx, replacement);
                    st.remove_node(node_idx);
                    removed.insert(node_idx);
                }
            }

            let pre_idx = graph
                .state_index(&pre_state)
                .expect("staging state was just added");
            graph.redirect_incoming(state_idx, pre_idx);
            graph
                .states
                .add_edge(pre_idx, state_idx, InterstateEdge::default());
        }

        if !output_nodes.is_empty() {
            let post_state = graph
                .add_state(format!("post_{label}"))
                .expect("staging label must be fresh");

            for &node_idx in &output_nodes {
                // A container staged as an input is already replaced; its
                // handle may meanwhile point at a recycled proxy node.
                if removed.contains(&node_idx) {
                    continue;
                }
                let Some((name, array)) = host_array(graph, state, node_idx) else {
                    continue;
                };
                let proxy = stage_proxy(graph, &mut staged, name, &array);

                // Full-extent device-to-host copy in the staging state.
                let mut post = post_state.borrow_mut();
                let device_node = post.add_access(proxy);
                let host_node = post.add_access(name);
                let full = NdRange::full(&array.shape);
                post.add_edge(device_node, None, host_node, None, Memlet::new(proxy, full));
                drop(post);

                let mut st = state.borrow_mut();
                let replacement = st.add_access(proxy);
                st.redirect_dests(node_idx, replacement);
                st.remove_node(node_idx);
            }

            let post_idx = graph
                .state_index(&post_state)
                .expect("staging state was just added");
            graph.redirect_outgoing(state_idx, post_idx);
            graph
                .states
                .add_edge(state_idx, post_idx, InterstateEdge::default());
        }

        // Rewrite memlets referencing staged containers, propagating vector
        // widths out of adjacent nested levels.
        rewrite_staged_memlets(state, &staged);

        // Reclassify placement and scheduling for the whole subtree.
        accel_update(&mut graph.arrays, state, 0);
    }
}

/// Recursively discover access nodes inside nested levels that are written
/// with a WCR combinator, ascend to the matched state through the typed
/// parent link, and add the corresponding outer node to `input_nodes`.
/// Returns the set of nodes that must keep their original identity in the
/// matched state.
fn collect_wcr_inputs(
    state: &RRC<ir::State>,
    input_nodes: &mut Vec<NodeIndex>,
) -> HashSet<NodeIndex> {
    let mut wcr_inputs = HashSet::new();

    let mut nested_levels: Vec<RRC<ir::Graph>> = Vec::new();
    for node in state.borrow().dataflow.node_weights() {
        if let Node::Nested(nested) = node {
            nested_levels.push(nested.graph.clone());
            nested_levels.extend(nested.graph.borrow().nested_recursive());
        }
    }

    for level in &nested_levels {
        let level = level.borrow();
        let Some(link) = level.parent.clone() else {
            continue;
        };
        let owner_state = link.state.upgrade();

        for inner_state in level.states.node_weights() {
            let inner = inner_state.borrow();
            for idx in inner.dataflow.node_indices() {
                let Node::Access(access) = &inner.dataflow[idx] else {
                    continue;
                };
                let written_with_wcr = inner
                    .dataflow
                    .edges_directed(idx, Direction::Incoming)
                    .any(|e| e.weight().memlet.wcr.is_some());
                if !written_with_wcr {
                    continue;
                }

                // The ascent nested-state -> graph -> owning-state must land
                // at the matched state; a writer nested deeper than one
                // level below it is a documented limitation.
                if !Rc::ptr_eq(&owner_state, state) {
                    log::debug!(
                        "skipping WCR target `{}': nested deeper than one level below `{}'",
                        access.array,
                        state.borrow().label
                    );
                    continue;
                }

                let outer = state.borrow();
                for edge in outer.dataflow.edge_references() {
                    let via_connector = edge.weight().src_conn == Some(access.array);
                    let via_name = outer.dataflow[edge.target()]
                        .as_access()
                        .map(|a| a.array == access.array)
                        .unwrap_or(false);
                    if via_connector || via_name {
                        let target = edge.target();
                        if !input_nodes.contains(&target) {
                            input_nodes.push(target);
                        }
                        wcr_inputs.insert(target);
                    }
                }
            }
        }
    }
    wcr_inputs
}

/// The host array referenced by `node_idx`, if it is an array-backed access
/// node. Returns an owned copy of the descriptor so staging can mutate the
/// catalog while using it.
fn host_array(
    graph: &ir::Graph,
    state: &RRC<ir::State>,
    node_idx: NodeIndex,
) -> Option<(Id, ArrayDecl)> {
    let st = state.borrow();
    let access = st.dataflow.node_weight(node_idx)?.as_access()?;
    let array = graph.arrays.get(&access.array)?.as_array()?.clone();
    Some((access.array, array))
}

/// Create (once per distinct host name) the transient device proxy that
/// mirrors `array`, and return the proxy's name.
fn stage_proxy(
    graph: &mut ir::Graph,
    staged: &mut HashMap<Id, Id>,
    name: Id,
    array: &ArrayDecl,
) -> Id {
    if let Some(proxy) = staged.get(&name) {
        return *proxy;
    }
    let proxy: Id = format!("{PROXY_PREFIX}{name}").into();
    let mut decl = ArrayDecl::new(array.shape.iter().cloned(), array.dtype);
    decl.transient = true;
    decl.storage = Storage::AccelGlobal;
    decl.strides = array.strides.clone();
    decl.offset = array.offset.clone();
    decl.allow_conflicts = array.allow_conflicts;
    decl.access_order = array.access_order;
    graph
        .add_array(proxy, decl)
        .expect("proxy name must be fresh in the catalog");
    staged.insert(name, proxy);
    proxy
}

/// Vector width recorded on the inner access node bound to `conn`, read off
/// one of its incident edges. All memlets touching that node are assumed to
/// share one width.
fn connector_veclen(nested: &NestedGraph, conn: Option<Id>) -> Option<u32> {
    let conn = conn?;
    for inner_state in nested.graph.borrow().states.node_weights() {
        let inner = inner_state.borrow();
        for idx in inner.dataflow.node_indices() {
            let bound = inner.dataflow[idx]
                .as_access()
                .map(|a| a.array == conn)
                .unwrap_or(false);
            if !bound {
                continue;
            }
            if let Some(&edge) = inner.edges_incident(idx).first() {
                return Some(inner.dataflow[edge].memlet.veclen);
            }
        }
    }
    None
}

/// Rewrite every memlet referencing a staged container to its proxy name,
/// taking the vector width from the nested level adjacent to that edge (if
/// any).
fn rewrite_staged_memlets(state: &RRC<ir::State>, staged: &HashMap<Id, Id>) {
    let mut st = state.borrow_mut();
    let edge_ids: Vec<EdgeIndex> = st.dataflow.edge_indices().collect();
    for eid in edge_ids {
        let Some((src, dst)) = st.dataflow.edge_endpoints(eid) else {
            continue;
        };
        let (src_conn, dst_conn) = {
            let edge = &st.dataflow[eid];
            (edge.src_conn, edge.dst_conn)
        };

        let mut veclen = None;
        if let Node::Nested(nested) = &st.dataflow[src] {
            veclen = connector_veclen(nested, src_conn);
        }
        if veclen.is_none() {
            if let Node::Nested(nested) = &st.dataflow[dst] {
                veclen = connector_veclen(nested, dst_conn);
            }
        }

        let edge = &mut st.dataflow[eid];
        if let Some(&proxy) = staged.get(&edge.memlet.data) {
            edge.memlet.data = proxy;
            if let Some(width) = veclen {
                edge.memlet.veclen = width;
            }
        }
    }
}

/// Recursively reclassify placement and scheduling below a retargeted
/// state. `depth` counts nesting levels below the matched state: deep
/// containers always become accelerator-local, while at shallow depths the
/// split is scoped-local / unscoped-global.
fn accel_update(arrays: &mut LinkedHashMap<Id, DataDecl>, state: &RRC<ir::State>, depth: u32) {
    let scopes = state.borrow().scope_tree();
    let mut children: Vec<RRC<ir::Graph>> = Vec::new();

    {
        let mut st = state.borrow_mut();
        let indices: Vec<NodeIndex> = st.dataflow.node_indices().collect();
        for idx in indices {
            match &mut st.dataflow[idx] {
                Node::Access(access) => {
                    if let Some(decl) = arrays.get_mut(&access.array) {
                        if decl.storage() == Storage::Default {
                            let scoped = scopes.get(&idx).copied().flatten().is_some();
                            let storage = if depth >= 2 || scoped {
                                Storage::AccelLocal
                            } else {
                                Storage::AccelGlobal
                            };
                            decl.set_storage(storage);
                        }
                    }
                }
                node => {
                    if let Some(schedule) = node.schedule_mut() {
                        if *schedule == Schedule::Default {
                            *schedule = Schedule::AccelDevice;
                        }
                    }
                    if let Node::Nested(nested) = node {
                        children.push(nested.graph.clone());
                    }
                }
            }
        }
    }

    for child in children {
        let mut child = child.borrow_mut();
        let ir::Graph { arrays, states, .. } = &mut *child;
        let child_states: Vec<RRC<ir::State>> = states.node_weights().cloned().collect();
        for child_state in child_states {
            accel_update(arrays, &child_state, depth + 1);
        }
    }
}
