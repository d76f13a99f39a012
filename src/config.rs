use std::env;

use log::debug;

use crate::{kernel::BackendKind, shape::ShapeLimits};

pub const ENV_ENABLE_SHADER: &str = "VIV_VX_ENABLE_SHADER";
pub const ENV_EVIS_VERSION: &str = "VSI_NN_EVIS_VERSION";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvisVersion {
    None,
    V1,
    V2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelPriority {
    pub backend: BackendKind,
    pub fps: u32,
}

/// Options consulted while dispatching nodes into a graph.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchConfig {
    pub enable_shader: bool,
    pub evis: EvisVersion,
    pub support_stream_processor: bool,
    /// Highest `fps` first.
    pub priority: Vec<KernelPriority>,
    pub limits: ShapeLimits,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        DispatchConfig {
            enable_shader: true,
            evis: EvisVersion::V2,
            support_stream_processor: false,
            priority: default_priority(),
            limits: ShapeLimits::default(),
        }
    }
}

pub fn default_priority() -> Vec<KernelPriority> {
    let mut priority = vec![
        KernelPriority {
            backend: BackendKind::Sp,
            fps: 5,
        },
        KernelPriority {
            backend: BackendKind::Evis,
            fps: 4,
        },
        KernelPriority {
            backend: BackendKind::Cl,
            fps: 3,
        },
        KernelPriority {
            backend: BackendKind::Vx,
            fps: 2,
        },
        KernelPriority {
            backend: BackendKind::Cpu,
            fps: 1,
        },
    ];
    priority.sort_by(|a, b| b.fps.cmp(&a.fps));
    priority
}

fn parse_evis(value: &str) -> Option<EvisVersion> {
    match value.trim() {
        "0" => Some(EvisVersion::None),
        "1" => Some(EvisVersion::V1),
        "2" => Some(EvisVersion::V2),
        _ => None,
    }
}

impl DispatchConfig {
    pub fn from_env() -> Self {
        let mut config = DispatchConfig::default();
        if let Ok(value) = env::var(ENV_ENABLE_SHADER) {
            config.enable_shader = value.trim() != "0";
        }
        if let Some(evis) = env::var(ENV_EVIS_VERSION).ok().as_deref().and_then(parse_evis) {
            config.evis = evis;
        }
        debug!("Dispatch config: {:?}", config);
        config
    }

    /// CPU only, as if no shader hardware were present.
    pub fn host_only() -> Self {
        DispatchConfig {
            enable_shader: false,
            evis: EvisVersion::None,
            ..DispatchConfig::default()
        }
    }

    pub fn with_priority(mut self, mut priority: Vec<KernelPriority>) -> Self {
        priority.sort_by(|a, b| b.fps.cmp(&a.fps));
        self.priority = priority;
        self
    }
}
