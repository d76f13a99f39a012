use std::collections::HashMap;

use log::{debug, warn};

use super::{
    BorderMode, BoundParam, GraphRuntime, KernelDescriptor, NodeId, NodeParam, ScalarId,
    ScalarValue,
};
use crate::{
    config::DispatchConfig,
    error::{Result, VxError},
    kernel::{BackendKind, KernelConfig, OperatorId},
    tensor::{reshape_tensor, TensorId, TensorRef},
    utility::shape_str,
};

pub struct HostNode {
    id: NodeId,
    descriptor: KernelDescriptor,
    params: Vec<BoundParam>,
    config: Option<KernelConfig>,
    border: BorderMode,
}

impl HostNode {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn kernel_name(&self) -> &str {
        &self.descriptor.kernel_name
    }

    pub fn backend(&self) -> BackendKind {
        self.descriptor.backend
    }

    pub fn operator(&self) -> OperatorId {
        self.descriptor.operator
    }

    pub fn params(&self) -> &[BoundParam] {
        &self.params
    }

    /// Set once parameters have been bound.
    pub fn config(&self) -> Option<&KernelConfig> {
        self.config.as_ref()
    }

    pub fn border(&self) -> BorderMode {
        self.border
    }
}

/// In-process graph that keeps nodes in creation order and runs host kernels.
pub struct HostGraph {
    config: DispatchConfig,
    nodes: Vec<HostNode>,
    views: HashMap<TensorId, TensorRef>,
    scalars: HashMap<ScalarId, ScalarValue>,
    node_limit: Option<usize>,
}

impl Default for HostGraph {
    fn default() -> Self {
        HostGraph::new(DispatchConfig::default())
    }
}

impl HostGraph {
    pub fn new(config: DispatchConfig) -> Self {
        HostGraph {
            config,
            nodes: vec![],
            views: HashMap::new(),
            scalars: HashMap::new(),
            node_limit: None,
        }
    }

    /// Refuses node creation once `limit` nodes exist.
    pub fn with_node_limit(mut self, limit: usize) -> Self {
        self.node_limit = Some(limit);
        self
    }

    pub fn nodes(&self) -> &[HostNode] {
        &self.nodes
    }

    pub fn node(&self, id: NodeId) -> Option<&HostNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn live_views(&self) -> usize {
        self.views.len()
    }

    pub fn live_scalars(&self) -> usize {
        self.scalars.len()
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut HostNode> {
        self.nodes
            .iter_mut()
            .find(|n| n.id == id)
            .ok_or_else(|| VxError::invalid("node", format!("unknown node {}", id)))
    }

    fn resolve(&self, kernel: &str, params: &[NodeParam]) -> Result<Vec<BoundParam>> {
        params
            .iter()
            .enumerate()
            .map(|(index, p)| match p {
                NodeParam::Tensor(t) => Ok(BoundParam::Tensor(t.clone())),
                NodeParam::Scalar(id) => self
                    .scalars
                    .get(id)
                    .map(|v| BoundParam::Scalar(*v))
                    .ok_or_else(|| VxError::ParamSlotMismatch {
                        kernel: kernel.to_string(),
                        index,
                        reason: format!("scalar handle {} is not live", id),
                    }),
            })
            .collect()
    }

    /// Executes every node in creation order.
    pub fn run(&self) -> Result<()> {
        for node in self.nodes.iter() {
            if node.config.is_none() {
                return Err(VxError::invalid(
                    "node",
                    format!("{} has no bound parameters", node.kernel_name()),
                ));
            }
            let executor = node
                .descriptor
                .executor
                .as_ref()
                .ok_or_else(|| VxError::NotExecutable(node.kernel_name().to_string()))?;
            debug!("Running {}", node.kernel_name());
            executor.execute(&node.params)?;
        }
        Ok(())
    }
}

impl GraphRuntime for HostGraph {
    fn config(&self) -> &DispatchConfig {
        &self.config
    }

    fn create_node(&mut self, descriptor: KernelDescriptor) -> Result<NodeId> {
        if let Some(limit) = self.node_limit {
            if self.nodes.len() >= limit {
                return Err(VxError::BackendResourceExhausted {
                    call: "create_node",
                    reason: format!("node limit {} reached", limit),
                });
            }
        }
        let id = uuid::Uuid::new_v4();
        debug!("Created node {} for {}", id, descriptor.kernel_name);
        self.nodes.push(HostNode {
            id,
            descriptor,
            params: vec![],
            config: None,
            border: BorderMode::Undefined,
        });
        Ok(id)
    }

    fn pass_params(&mut self, node: NodeId, params: &[NodeParam]) -> Result<()> {
        let (kernel, slots, lifecycle) = {
            let n = self
                .node(node)
                .ok_or_else(|| VxError::invalid("node", format!("unknown node {}", node)))?;
            (
                n.descriptor.kernel_name.clone(),
                n.descriptor.slots,
                n.descriptor.lifecycle.clone(),
            )
        };
        let bound = self.resolve(&kernel, params)?;
        lifecycle.validate(&kernel, slots, &bound)?;
        let config = lifecycle.initialize(&bound)?;
        let n = self.node_mut(node)?;
        n.params = bound;
        n.config = Some(config);
        Ok(())
    }

    fn set_border_mode(&mut self, node: NodeId, mode: BorderMode) -> Result<()> {
        self.node_mut(node)?.border = mode;
        Ok(())
    }

    fn create_tensor_view(&mut self, tensor: &TensorRef, shape: &[usize]) -> Result<TensorRef> {
        let view = reshape_tensor(tensor, shape)?;
        debug!(
            "View {} -> {}",
            shape_str(tensor.shape()),
            shape_str(view.shape())
        );
        self.views.insert(view.id(), view.clone());
        Ok(view)
    }

    fn release_tensor_view(&mut self, view: TensorId) {
        if self.views.remove(&view).is_none() {
            warn!("Released unknown tensor view {}", view);
        }
    }

    fn create_scalar(&mut self, value: ScalarValue) -> Result<ScalarId> {
        let id = uuid::Uuid::new_v4();
        self.scalars.insert(id, value);
        Ok(id)
    }

    fn release_scalar(&mut self, scalar: ScalarId) {
        if self.scalars.remove(&scalar).is_none() {
            warn!("Released unknown scalar {}", scalar);
        }
    }

    fn remove_node(&mut self, node: NodeId) {
        match self.nodes.iter().position(|n| n.id == node) {
            Some(index) => {
                let mut removed = self.nodes.remove(index);
                if let Some(config) = removed.config.as_mut() {
                    removed.descriptor.lifecycle.deinitialize(config);
                }
                debug!("Removed node {}", node);
            }
            None => warn!("Removed unknown node {}", node),
        }
    }
}
