//! Human-readable dumps of program graphs, used by the pass manager's dump
//! option and for debugging.
use crate::context::Context;
use crate::graph::Graph;
use crate::structure::{DataDecl, Node};
use itertools::Itertools;
use std::io;

/// Printer for the IR.
pub struct Printer;

impl Printer {
    /// Write the entire program held by a context.
    pub fn write_context(ctx: &Context, out: &mut dyn io::Write) -> io::Result<()> {
        Self::write_graph(&ctx.graph, 0, out)
    }

    /// Write one graph level, recursing into nested graphs with increased
    /// indentation.
    pub fn write_graph(graph: &Graph, indent: usize, out: &mut dyn io::Write) -> io::Result<()> {
        let pad = " ".repeat(indent);
        writeln!(out, "{pad}graph {} {{", graph.name)?;
        for (name, decl) in graph.arrays.iter() {
            match decl {
                DataDecl::Array(a) => {
                    let shape = a.shape.iter().map(|s| s.to_string()).join(", ");
                    writeln!(
                        out,
                        "{pad}  array {name}[{shape}]: {:?}{}",
                        a.storage,
                        if a.transient { " transient" } else { "" },
                    )?;
                }
                DataDecl::Stream(s) => {
                    writeln!(
                        out,
                        "{pad}  stream {name}: {:?}{}",
                        s.storage,
                        if s.transient { " transient" } else { "" },
                    )?;
                }
            }
        }
        for st in graph.states.node_weights() {
            let state = st.borrow();
            writeln!(
                out,
                "{pad}  state {} ({} nodes, {} edges)",
                state.label,
                state.dataflow.node_count(),
                state.dataflow.edge_count(),
            )?;
            for node in state.dataflow.node_weights() {
                if let Node::Nested(n) = node {
                    Self::write_graph(&n.graph.borrow(), indent + 4, out)?;
                }
            }
        }
        writeln!(out, "{pad}}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structure::{ArrayDecl, DType, Storage};
    use crate::symbolic::SymExpr;

    #[test]
    fn dump_mentions_arrays_and_states() {
        let mut g = Graph::new("prog");
        let mut a = ArrayDecl::new([SymExpr::from(16)], DType::F64);
        a.storage = Storage::AccelGlobal;
        g.add_array("A", a).unwrap();
        g.add_state("s0").unwrap();

        let mut buf = Vec::new();
        Printer::write_graph(&g, 0, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("array A[16]: AccelGlobal"));
        assert!(text.contains("state s0"));
    }
}
