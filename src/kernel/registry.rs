use std::{collections::HashMap, sync::Arc};

use log::warn;

use super::{
    BackendKind, KernelExecutor, KernelLifecycle, KernelVariant, OperatorId, ParamSlot, VariantKey,
};
use crate::dispatch::KernelSetup;

/// Every variant one backend offers for one operator, plus the hooks they share.
#[derive(Clone)]
pub struct BackendKernels {
    backend: BackendKind,
    variants: Vec<KernelVariant>,
    slots: &'static [ParamSlot],
    setup: Arc<dyn KernelSetup>,
    lifecycle: Arc<dyn KernelLifecycle>,
    executor: Option<Arc<dyn KernelExecutor>>,
}

impl BackendKernels {
    pub fn new(
        backend: BackendKind,
        slots: &'static [ParamSlot],
        setup: Arc<dyn KernelSetup>,
        lifecycle: Arc<dyn KernelLifecycle>,
    ) -> Self {
        BackendKernels {
            backend,
            variants: vec![],
            slots,
            setup,
            lifecycle,
            executor: None,
        }
    }

    pub fn with_executor(mut self, executor: Arc<dyn KernelExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Rows whose key is already present are dropped with a warning.
    pub fn with_variants<I: IntoIterator<Item = KernelVariant>>(mut self, variants: I) -> Self {
        for variant in variants {
            if let Some(existing) = self.lookup(variant.key) {
                warn!(
                    "Duplicate kernel key {:#x}: keeping {}, dropping {}",
                    variant.key.0, existing.kernel_name, variant.kernel_name
                );
                continue;
            }
            self.variants.push(variant);
        }
        self
    }

    pub fn backend(&self) -> BackendKind {
        self.backend
    }

    pub fn lookup(&self, key: VariantKey) -> Option<&KernelVariant> {
        self.variants.iter().find(|v| v.key == key)
    }

    pub fn variants(&self) -> &[KernelVariant] {
        &self.variants
    }

    pub fn slots(&self) -> &'static [ParamSlot] {
        self.slots
    }

    pub fn setup(&self) -> &dyn KernelSetup {
        self.setup.as_ref()
    }

    pub fn lifecycle(&self) -> Arc<dyn KernelLifecycle> {
        self.lifecycle.clone()
    }

    pub fn executor(&self) -> Option<Arc<dyn KernelExecutor>> {
        self.executor.clone()
    }
}

/// Read-only operator → backend → variants table.
pub struct Registry {
    tables: HashMap<OperatorId, HashMap<BackendKind, BackendKernels>>,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder {
            tables: HashMap::new(),
        }
    }

    pub fn kernels(&self, op: OperatorId, backend: BackendKind) -> Option<&BackendKernels> {
        self.tables.get(&op).and_then(|t| t.get(&backend))
    }

    pub fn lookup(&self, op: OperatorId, backend: BackendKind, key: VariantKey) -> Option<&KernelVariant> {
        self.kernels(op, backend).and_then(|k| k.lookup(key))
    }

    pub fn backends(&self, op: OperatorId) -> Vec<BackendKind> {
        self.tables
            .get(&op)
            .map(|t| t.keys().copied().collect())
            .unwrap_or_default()
    }

    pub fn operators(&self) -> Vec<OperatorId> {
        self.tables.keys().copied().collect()
    }
}

pub struct RegistryBuilder {
    tables: HashMap<OperatorId, HashMap<BackendKind, BackendKernels>>,
}

impl RegistryBuilder {
    pub fn register(mut self, op: OperatorId, kernels: BackendKernels) -> Self {
        let backend = kernels.backend;
        if self
            .tables
            .entry(op)
            .or_insert_with(HashMap::new)
            .insert(backend, kernels)
            .is_some()
        {
            warn!("{} kernels for {} registered twice", backend, op.name());
        }
        self
    }

    pub fn build(self) -> Registry {
        Registry {
            tables: self.tables,
        }
    }
}

lazy_static! {
    static ref REGISTRY: Registry = crate::ops::build_registry();
}

/// The process-wide registry, built on first use.
pub fn registry() -> &'static Registry {
    &REGISTRY
}
