use log::debug;

use crate::{
    error::{Result, VxError},
    graph::{BorderMode, GraphRuntime, KernelDescriptor, NodeId, NodeParam, ScalarId, ScalarValue},
    tensor::{TensorId, TensorRef},
};

/// Handles acquired while dispatching one node.
///
/// Views and scalars are released when the scope drops, whatever the outcome.
/// A node that was created but not committed is removed from the graph.
pub struct DispatchScope<'g> {
    graph: &'g mut dyn GraphRuntime,
    views: Vec<TensorId>,
    scalars: Vec<ScalarId>,
    node: Option<NodeId>,
}

impl<'g> DispatchScope<'g> {
    pub fn new(graph: &'g mut dyn GraphRuntime) -> Self {
        DispatchScope {
            graph,
            views: vec![],
            scalars: vec![],
            node: None,
        }
    }

    pub fn graph(&self) -> &dyn GraphRuntime {
        &*self.graph
    }

    pub fn view(&mut self, tensor: &TensorRef, shape: &[usize]) -> Result<TensorRef> {
        let view = self.graph.create_tensor_view(tensor, shape)?;
        self.views.push(view.id());
        Ok(view)
    }

    pub fn scalar(&mut self, value: ScalarValue) -> Result<ScalarId> {
        let id = self.graph.create_scalar(value)?;
        self.scalars.push(id);
        Ok(id)
    }

    pub fn create_node(&mut self, descriptor: KernelDescriptor) -> Result<NodeId> {
        if self.node.is_some() {
            return Err(VxError::invalid("node", "scope already holds a node"));
        }
        let node = self.graph.create_node(descriptor)?;
        self.node = Some(node);
        Ok(node)
    }

    fn current_node(&self) -> Result<NodeId> {
        self.node
            .ok_or_else(|| VxError::invalid("node", "no node has been created"))
    }

    pub fn pass_params(&mut self, params: &[NodeParam]) -> Result<()> {
        let node = self.current_node()?;
        self.graph.pass_params(node, params)
    }

    pub fn set_border_mode(&mut self, mode: BorderMode) -> Result<()> {
        let node = self.current_node()?;
        self.graph.set_border_mode(node, mode)
    }

    /// Hands the node to the graph. Transient handles are still released.
    pub fn commit(mut self) -> Result<NodeId> {
        let node = self.current_node()?;
        self.node = None;
        Ok(node)
    }

    pub fn held(&self) -> (usize, usize) {
        (self.views.len(), self.scalars.len())
    }
}

impl<'g> Drop for DispatchScope<'g> {
    fn drop(&mut self) {
        for scalar in self.scalars.drain(..) {
            self.graph.release_scalar(scalar);
        }
        for view in self.views.drain(..) {
            self.graph.release_tensor_view(view);
        }
        if let Some(node) = self.node.take() {
            debug!("Dropping uncommitted node {}", node);
            self.graph.remove_node(node);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        dtype::{DType, DataType},
        graph::HostGraph,
        tensor::{Tensor, TensorAttr},
    };

    #[test]
    fn drop_releases_everything() {
        let mut graph = HostGraph::default();
        let t = Tensor::new(TensorAttr::new(&[4], DType::new(DataType::Uint8))).unwrap();
        {
            let mut scope = DispatchScope::new(&mut graph);
            scope.view(&t, &[2, 2]).unwrap();
            scope.scalar(ScalarValue::U32(1)).unwrap();
            assert_eq!(scope.held(), (1, 1));
            assert!(scope.pass_params(&[]).is_err());
        }
        assert_eq!(graph.live_views(), 0);
        assert_eq!(graph.live_scalars(), 0);
    }
}
