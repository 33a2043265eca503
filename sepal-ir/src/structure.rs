//! Structures defined inside a state's dataflow multigraph, plus the data
//! descriptors they reference.
use crate::common::RRC;
use crate::graph::Graph;
use crate::symbolic::SymExpr;
use petgraph::graph::NodeIndex;
use sepal_utils::Id;
use smallvec::SmallVec;
use std::collections::HashMap;

/// Ordered sequence of symbolic extents. Most arrays have few dimensions.
pub type Shape = SmallVec<[SymExpr; 4]>;

/// Storage placement of a data container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Storage {
    /// Placement not yet decided; host-resident until lowering assigns one.
    #[default]
    Default,
    /// Accelerator off-chip memory.
    AccelGlobal,
    /// Accelerator on-chip memory.
    AccelLocal,
    /// Accelerator registers.
    Register,
}

/// Execution mapping of a scope-introducing node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Schedule {
    #[default]
    Default,
    Sequential,
    /// Distributed across ranks; never lowered to an accelerator.
    Distributed,
    /// The accelerator's device-level scheduler.
    AccelDevice,
    /// A thread-block inside an already-lowered accelerator region.
    AccelThreadBlock,
}

/// Element type of a data container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DType {
    Bool,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F16,
    F32,
    F64,
}

/// Preferred traversal order for a container's elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccessOrder {
    #[default]
    RowMajor,
    ColMajor,
}

/// Descriptor for a multi-dimensional array container.
#[derive(Debug, Clone)]
pub struct ArrayDecl {
    pub shape: Shape,
    pub dtype: DType,
    /// Allocated and freed by the program itself rather than passed in.
    pub transient: bool,
    pub storage: Storage,
    pub strides: Shape,
    pub offset: Shape,
    /// Free-form placement metadata, e.g. the memory bank index.
    pub location: HashMap<String, u64>,
    pub allow_conflicts: bool,
    pub access_order: AccessOrder,
}

impl ArrayDecl {
    /// A non-transient array at default storage with contiguous row-major
    /// strides and zero offset.
    pub fn new<S: IntoIterator<Item = SymExpr>>(shape: S, dtype: DType) -> Self {
        let shape: Shape = shape.into_iter().collect();
        let strides = Self::contiguous_strides(&shape);
        let offset = shape.iter().map(|_| SymExpr::Int(0)).collect();
        ArrayDecl {
            shape,
            dtype,
            transient: false,
            storage: Storage::Default,
            strides,
            offset,
            location: HashMap::new(),
            allow_conflicts: false,
            access_order: AccessOrder::default(),
        }
    }

    fn contiguous_strides(shape: &Shape) -> Shape {
        let mut strides: Shape = SmallVec::with_capacity(shape.len());
        for i in 0..shape.len() {
            let stride = shape[i + 1..]
                .iter()
                .cloned()
                .fold(SymExpr::Int(1), |acc, s| acc * s);
            strides.push(stride);
        }
        strides
    }

    /// Total element count as a symbolic product of the shape extents.
    pub fn total_size(&self) -> SymExpr {
        self.shape
            .iter()
            .cloned()
            .fold(SymExpr::Int(1), |acc, s| acc * s)
    }
}

/// Descriptor for a stream container. Streams are carried through the IR but
/// the lowering passes do not stage them.
#[derive(Debug, Clone)]
pub struct StreamDecl {
    pub dtype: DType,
    pub transient: bool,
    pub storage: Storage,
}

/// A named data container in a graph's catalog.
#[derive(Debug, Clone)]
pub enum DataDecl {
    Array(ArrayDecl),
    Stream(StreamDecl),
}

impl DataDecl {
    pub fn storage(&self) -> Storage {
        match self {
            DataDecl::Array(a) => a.storage,
            DataDecl::Stream(s) => s.storage,
        }
    }

    pub fn set_storage(&mut self, storage: Storage) {
        match self {
            DataDecl::Array(a) => a.storage = storage,
            DataDecl::Stream(s) => s.storage = storage,
        }
    }

    pub fn is_transient(&self) -> bool {
        match self {
            DataDecl::Array(a) => a.transient,
            DataDecl::Stream(s) => s.transient,
        }
    }

    pub fn as_array(&self) -> Option<&ArrayDecl> {
        match self {
            DataDecl::Array(a) => Some(a),
            DataDecl::Stream(_) => None,
        }
    }
}

/// One dimension of an iteration or subset range. `stop` is inclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeDim {
    pub start: SymExpr,
    pub stop: SymExpr,
    pub step: SymExpr,
}

/// An N-dimensional range: ordered (start, stop, step) triples.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NdRange {
    pub dims: SmallVec<[RangeDim; 3]>,
}

impl NdRange {
    pub fn new<I>(dims: I) -> Self
    where
        I: IntoIterator<Item = (SymExpr, SymExpr, SymExpr)>,
    {
        NdRange {
            dims: dims
                .into_iter()
                .map(|(start, stop, step)| RangeDim { start, stop, step })
                .collect(),
        }
    }

    /// The range covering every element of `shape`: `(0, s - 1, 1)` per
    /// dimension.
    pub fn full(shape: &Shape) -> Self {
        NdRange::new(shape.iter().map(|s| {
            (
                SymExpr::Int(0),
                s.clone() - SymExpr::Int(1),
                SymExpr::Int(1),
            )
        }))
    }

    pub fn dims(&self) -> usize {
        self.dims.len()
    }

    /// Symbolic element count of the range.
    pub fn num_elements(&self) -> SymExpr {
        self.dims.iter().fold(SymExpr::Int(1), |acc, d| {
            let len = (d.stop.clone() - d.start.clone() + d.step.clone()) / d.step.clone();
            acc * len
        })
    }
}

/// Write-conflict resolution: how an edge accumulates into its destination
/// instead of overwriting it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wcr {
    Sum,
    Product,
    Min,
    Max,
}

/// Data movement carried by a dataflow edge.
#[derive(Debug, Clone)]
pub struct Memlet {
    /// Name of the container being moved.
    pub data: Id,
    /// Accessed subset of the container.
    pub subset: NdRange,
    /// Element volume of the movement.
    pub volume: SymExpr,
    /// Vector width of each transferred element.
    pub veclen: u32,
    /// Present when the destination is accumulated into.
    pub wcr: Option<Wcr>,
}

impl Memlet {
    /// A width-1, overwrite-semantics memlet; the volume is derived from the
    /// subset.
    pub fn new<S: Into<Id>>(data: S, subset: NdRange) -> Self {
        let volume = subset.num_elements();
        Memlet {
            data: data.into(),
            subset,
            volume,
            veclen: 1,
            wcr: None,
        }
    }

    pub fn with_wcr(mut self, wcr: Wcr) -> Self {
        self.wcr = Some(wcr);
        self
    }
}

/// Payload of a dataflow edge: optional connector names on either endpoint
/// plus the memlet describing the movement.
#[derive(Debug, Clone)]
pub struct Edge {
    pub src_conn: Option<Id>,
    pub dst_conn: Option<Id>,
    pub memlet: Memlet,
}

/// A parallel-loop scope: iteration range plus execution schedule. Owned by
/// the scope's entry node.
#[derive(Debug, Clone)]
pub struct Map {
    pub label: Id,
    pub range: NdRange,
    pub schedule: Schedule,
}

/// A reference to one named container.
#[derive(Debug, Clone)]
pub struct Access {
    pub array: Id,
}

/// An opaque computation unit participating in edges via named connectors.
#[derive(Debug, Clone)]
pub struct Tasklet {
    pub label: Id,
}

/// A node exclusively owning a child graph. Connector names correspond to
/// container names inside the child.
#[derive(Debug, Clone)]
pub struct NestedGraph {
    pub graph: RRC<Graph>,
    pub schedule: Schedule,
    pub inputs: Vec<Id>,
    pub outputs: Vec<Id>,
}

/// A node in a state's dataflow multigraph. Only scope-introducing variants
/// (`MapEntry`, `Nested`) carry a schedule.
#[derive(Debug, Clone)]
pub enum Node {
    Access(Access),
    MapEntry(Map),
    /// Closes the scope opened by the paired entry node.
    MapExit { entry: NodeIndex },
    Tasklet(Tasklet),
    Nested(NestedGraph),
}

impl Node {
    pub fn as_access(&self) -> Option<&Access> {
        match self {
            Node::Access(a) => Some(a),
            _ => None,
        }
    }

    /// The schedule tag, for variants that carry one.
    pub fn schedule(&self) -> Option<Schedule> {
        match self {
            Node::MapEntry(m) => Some(m.schedule),
            Node::Nested(n) => Some(n.schedule),
            _ => None,
        }
    }

    pub fn schedule_mut(&mut self) -> Option<&mut Schedule> {
        match self {
            Node::MapEntry(m) => Some(&mut m.schedule),
            Node::Nested(n) => Some(&mut n.schedule),
            _ => None,
        }
    }
}
