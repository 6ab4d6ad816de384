//! Lazy, memoized computation graph
//!
//! Nodes live in an arena owned by [`Graph`] and are addressed by [`NodeId`],
//! their insertion index. A computed node can only reference nodes that
//! already exist, so the graph is acyclic by construction and never changes
//! shape after insertion.
//!
//! A computed node's storage is produced on first read by running its kernel
//! through the graph's [`KernelExecutor`], then cached for every later read.
//! Resolution walks inputs with an explicit stack, so long chains do not
//! grow the call stack.

use std::fmt;
use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::error::{ForgeError, ForgeResult};
use crate::kernel::{Kernel, KernelExecutor, KernelParams};
use crate::storage::Storage;

/// Position of a node in its graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Node produced by a kernel
pub struct ComputedNode {
    kernel: Arc<Kernel>,
    params: KernelParams,
    inputs: Vec<NodeId>,
    shape: Vec<usize>,
    storage: OnceCell<Arc<Storage>>,
}

impl ComputedNode {
    pub fn kernel(&self) -> &Arc<Kernel> {
        &self.kernel
    }

    pub fn params(&self) -> &KernelParams {
        &self.params
    }
}

pub enum GraphNode {
    /// Leaf backed by an existing storage
    Source {
        shape: Vec<usize>,
        storage: Arc<Storage>,
    },
    Computed(ComputedNode),
}

impl GraphNode {
    pub fn shape(&self) -> &[usize] {
        match self {
            GraphNode::Source { shape, .. } => shape,
            GraphNode::Computed(node) => &node.shape,
        }
    }

    /// Inputs in kernel argument order; empty for sources
    pub fn inputs(&self) -> &[NodeId] {
        match self {
            GraphNode::Source { .. } => &[],
            GraphNode::Computed(node) => &node.inputs,
        }
    }

    /// Storage if available without running anything
    fn resolved(&self) -> Option<&Arc<Storage>> {
        match self {
            GraphNode::Source { storage, .. } => Some(storage),
            GraphNode::Computed(node) => node.storage.get(),
        }
    }
}

/// Arena of graph nodes plus the executor that resolves them
pub struct Graph {
    nodes: Vec<GraphNode>,
    executor: Arc<dyn KernelExecutor>,
}

impl Graph {
    pub fn new(executor: Arc<dyn KernelExecutor>) -> Self {
        Self {
            nodes: Vec::new(),
            executor,
        }
    }

    /// Add a leaf node over an existing storage
    pub fn add_source(&mut self, shape: Vec<usize>, storage: impl Into<Arc<Storage>>) -> NodeId {
        self.push(GraphNode::Source {
            shape,
            storage: storage.into(),
        })
    }

    /// Add a node computed by `kernel` from `inputs`.
    ///
    /// # Errors
    /// - `NodeNotFound` if an input is not a node of this graph
    pub fn add_computed(
        &mut self,
        kernel: Arc<Kernel>,
        params: KernelParams,
        inputs: Vec<NodeId>,
        shape: Vec<usize>,
    ) -> ForgeResult<NodeId> {
        if let Some(missing) = inputs.iter().find(|id| id.0 >= self.nodes.len()) {
            return Err(ForgeError::NodeNotFound(missing.0));
        }
        Ok(self.push(GraphNode::Computed(ComputedNode {
            kernel,
            params,
            inputs,
            shape,
            storage: OnceCell::new(),
        })))
    }

    fn push(&mut self, node: GraphNode) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(node);
        id
    }

    pub fn node(&self, id: NodeId) -> ForgeResult<&GraphNode> {
        self.nodes.get(id.0).ok_or(ForgeError::NodeNotFound(id.0))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn shape(&self, id: NodeId) -> ForgeResult<&[usize]> {
        Ok(self.node(id)?.shape())
    }

    pub fn inputs(&self, id: NodeId) -> ForgeResult<&[NodeId]> {
        Ok(self.node(id)?.inputs())
    }

    pub fn is_source(&self, id: NodeId) -> ForgeResult<bool> {
        Ok(matches!(self.node(id)?, GraphNode::Source { .. }))
    }

    /// Whether reading the node's storage would run nothing
    pub fn is_resolved(&self, id: NodeId) -> ForgeResult<bool> {
        Ok(self.node(id)?.resolved().is_some())
    }

    /// Device the node's storage lives (or will live) on
    pub fn device_id(&self, id: NodeId) -> ForgeResult<&str> {
        Ok(match self.node(id)? {
            GraphNode::Source { storage, .. } => storage.device_id(),
            GraphNode::Computed(node) => node.kernel.device_id(),
        })
    }

    /// Storage of a node, computing it and any unresolved inputs first.
    ///
    /// Each computed node runs its kernel at most once; later reads return
    /// the same storage.
    pub fn storage(&self, id: NodeId) -> ForgeResult<Arc<Storage>> {
        if let Some(storage) = self.node(id)?.resolved() {
            return Ok(Arc::clone(storage));
        }

        let mut stack = vec![id];
        while let Some(&top) = stack.last() {
            let node = match self.node(top)? {
                GraphNode::Computed(node) if node.storage.get().is_none() => node,
                _ => {
                    stack.pop();
                    continue;
                }
            };

            let pending: Vec<NodeId> = node
                .inputs
                .iter()
                .copied()
                .filter(|input| self.nodes[input.0].resolved().is_none())
                .collect();
            if !pending.is_empty() {
                stack.extend(pending);
                continue;
            }

            node.storage.get_or_try_init(|| self.execute(top, node))?;
            stack.pop();
        }

        self.node(id)?
            .resolved()
            .cloned()
            .ok_or_else(|| ForgeError::ExecutionFailed(format!("node {} did not resolve", id)))
    }

    fn execute(&self, id: NodeId, node: &ComputedNode) -> ForgeResult<Arc<Storage>> {
        let inputs = node
            .inputs
            .iter()
            .map(|input| {
                self.nodes[input.0]
                    .resolved()
                    .cloned()
                    .ok_or(ForgeError::NodeNotFound(input.0))
            })
            .collect::<ForgeResult<Vec<_>>>()?;

        tracing::debug!("Running kernel {} for node {}", node.kernel.key(), id);
        let output = self
            .executor
            .run(&node.kernel, &inputs, &node.params, &node.shape)?;
        Ok(Arc::new(output))
    }
}

impl fmt::Debug for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let resolved = self.nodes.iter().filter(|n| n.resolved().is_some()).count();
        f.debug_struct("Graph")
            .field("nodes", &self.nodes.len())
            .field("resolved", &resolved)
            .finish()
    }
}
