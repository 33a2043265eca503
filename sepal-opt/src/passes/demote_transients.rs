//! Demote device-global transients to on-chip memory.
use sepal_ir::{self as ir, DataDecl, Id, Storage};

/// Move every transient container that lives in accelerator-global memory
/// but is used from only one state into on-chip memory. Containers shared
/// between states stay off-chip, as do containers whose size cannot be
/// resolved to a constant. Returns the number of demoted containers.
pub fn demote_unshared_transients(ctx: &mut ir::Context) -> usize {
    let shared = ctx.graph.shared_transients();
    let symbols = ctx.graph.symbols.clone();

    let mut demoted: Vec<Id> = Vec::new();
    for (name, decl) in ctx.graph.arrays.iter() {
        let DataDecl::Array(array) = decl else {
            continue;
        };
        if !array.transient || array.storage != Storage::AccelGlobal || shared.contains(name) {
            continue;
        }
        // On-chip buffers need a size known at compile time.
        if array.total_size().resolve(&symbols).is_none() {
            continue;
        }
        demoted.push(*name);
    }

    let nested = ctx.graph.nested_recursive();
    for name in &demoted {
        if let Some(decl) = ctx.graph.arrays.get_mut(name) {
            decl.set_storage(Storage::AccelLocal);
        }
        // Nested levels carry their own catalog entry for the container;
        // keep the entries of levels that actually touch it in sync.
        for level in &nested {
            let mut level = level.borrow_mut();
            let referenced = level.states.node_weights().any(|st| {
                st.borrow()
                    .dataflow
                    .node_weights()
                    .any(|n| n.as_access().map(|a| a.array == *name).unwrap_or(false))
            });
            if referenced {
                if let Some(decl) = level.arrays.get_mut(name) {
                    decl.set_storage(Storage::AccelLocal);
                }
            }
        }
        if ctx.conf.debug_print {
            log::info!("moved `{name}' to on-chip memory");
        }
    }
    demoted.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use sepal_ir::{ArrayDecl, Context, DType, Graph, Memlet, NdRange, Shape, SymExpr};

    fn device_transient(shape: Shape) -> ArrayDecl {
        let mut decl = ArrayDecl::new(shape, DType::F32);
        decl.transient = true;
        decl.storage = Storage::AccelGlobal;
        decl
    }

    fn vec_shape(extent: SymExpr) -> Shape {
        [extent].into_iter().collect()
    }

    fn touch(graph: &Graph, label: &str, name: &str) {
        let state = graph.find_state(label).unwrap();
        state.borrow_mut().add_access(name);
    }

    #[test]
    fn unshared_transient_moves_on_chip() {
        let mut g = Graph::new("prog");
        g.add_array("buf", device_transient(vec_shape(SymExpr::Int(32))))
            .unwrap();
        g.add_state("only").unwrap();
        touch(&g, "only", "buf");

        let mut ctx = Context::new(g);
        assert_eq!(demote_unshared_transients(&mut ctx), 1);
        let storage = ctx.graph.arrays.get(&Id::from("buf")).unwrap().storage();
        assert_eq!(storage, Storage::AccelLocal);
    }

    #[test]
    fn transient_shared_between_states_stays_off_chip() {
        let mut g = Graph::new("prog");
        g.add_array("buf", device_transient(vec_shape(SymExpr::Int(32))))
            .unwrap();
        g.add_state("first").unwrap();
        g.add_state("second").unwrap();
        touch(&g, "first", "buf");
        touch(&g, "second", "buf");

        let mut ctx = Context::new(g);
        assert_eq!(demote_unshared_transients(&mut ctx), 0);
        let storage = ctx.graph.arrays.get(&Id::from("buf")).unwrap().storage();
        assert_eq!(storage, Storage::AccelGlobal);
    }

    #[test]
    fn symbolic_size_blocks_demotion_until_bound() {
        let mut g = Graph::new("prog");
        g.add_array("buf", device_transient(vec_shape(SymExpr::from("N"))))
            .unwrap();
        g.add_state("only").unwrap();
        touch(&g, "only", "buf");

        let mut ctx = Context::new(g);
        assert_eq!(demote_unshared_transients(&mut ctx), 0);

        ctx.graph.bind_symbol("N", 64);
        assert_eq!(demote_unshared_transients(&mut ctx), 1);
        let storage = ctx.graph.arrays.get(&Id::from("buf")).unwrap().storage();
        assert_eq!(storage, Storage::AccelLocal);
    }

    #[test]
    fn non_transient_globals_are_untouched() {
        let mut g = Graph::new("prog");
        let mut decl = ArrayDecl::new(vec_shape(SymExpr::Int(32)), DType::F32);
        decl.storage = Storage::AccelGlobal;
        g.add_array("io", decl).unwrap();
        g.add_state("only").unwrap();
        touch(&g, "only", "io");

        let mut ctx = Context::new(g);
        assert_eq!(demote_unshared_transients(&mut ctx), 0);
    }

    #[test]
    fn nested_catalog_entries_follow_the_demotion() {
        let mut g = Graph::new("prog");
        g.add_array("buf", device_transient(vec_shape(SymExpr::Int(8))))
            .unwrap();
        let state = g.add_state("only").unwrap();

        let mut inner = Graph::new("inner");
        inner
            .add_array("buf", device_transient(vec_shape(SymExpr::Int(8))))
            .unwrap();
        let inner_state = inner.add_state("body").unwrap();
        {
            let mut ist = inner_state.borrow_mut();
            let b = ist.add_access("buf");
            let t = ist.add_tasklet("fill");
            ist.add_edge(t, None, b, None, Memlet::new("buf", NdRange::default()));
        }
        sepal_ir::State::add_nested(
            &state,
            sepal_ir::rrc(inner),
            sepal_ir::Schedule::AccelDevice,
            vec![],
            vec![Id::from("buf")],
        );
        touch(&g, "only", "buf");

        let mut ctx = Context::new(g);
        assert_eq!(demote_unshared_transients(&mut ctx), 1);

        let nested = ctx.graph.nested_recursive();
        let storage = nested[0]
            .borrow()
            .arrays
            .get(&Id::from("buf"))
            .unwrap()
            .storage();
        assert_eq!(storage, Storage::AccelLocal);
    }
}
