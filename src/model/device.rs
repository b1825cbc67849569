//! # Device Selection
//!
//! Parses the `--device` option and holds the process-wide registry of
//! inference devices. This build runs inference on the CPU; requesting a
//! CUDA device is reported as unavailable rather than silently ignored.

use std::sync::OnceLock;
use tracing::info;

use crate::error::{GraylingError, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeviceKind {
    Cpu,
    Cuda,
}

/// One inference device.
#[derive(Clone, Debug)]
pub struct DeviceInfo {
    pub name: String,
    pub kind: DeviceKind,
}

/// Process-wide registry of the devices selected at startup.
#[derive(Debug)]
pub struct DeviceRegistry {
    devices: Vec<DeviceInfo>,
}

static REGISTRY: OnceLock<DeviceRegistry> = OnceLock::new();

impl DeviceRegistry {
    /// Initialize the global registry from the `--device` option. Called
    /// once at startup; later calls return the existing registry.
    pub fn init(device_str: &str) -> Result<&'static DeviceRegistry> {
        if let Some(existing) = REGISTRY.get() {
            return Ok(existing);
        }
        let devices = parse_device_string(device_str)?;
        for device in &devices {
            info!("Using device: {}", device.name);
        }
        Ok(REGISTRY.get_or_init(|| DeviceRegistry { devices }))
    }

    /// The registry, if `init` has run.
    pub fn global() -> Option<&'static DeviceRegistry> {
        REGISTRY.get()
    }

    pub fn devices(&self) -> &[DeviceInfo] {
        &self.devices
    }

    pub fn is_cpu_only(&self) -> bool {
        self.devices.iter().all(|d| d.kind == DeviceKind::Cpu)
    }
}

/// Parse `cpu`, `cuda[:<ids>]`, or `auto` into a device list.
pub fn parse_device_string(device_str: &str) -> Result<Vec<DeviceInfo>> {
    match device_str {
        "cpu" => Ok(vec![DeviceInfo {
            name: "cpu".to_string(),
            kind: DeviceKind::Cpu,
        }]),
        "auto" => {
            // No accelerator runtime is compiled in, so auto resolves to CPU.
            Ok(vec![DeviceInfo {
                name: "cpu".to_string(),
                kind: DeviceKind::Cpu,
            }])
        }
        other if other == "cuda" || other.starts_with("cuda:") => {
            Err(GraylingError::device(format!(
                "Device '{other}' requested, but this build has no CUDA runtime. \
                 Use --device cpu."
            )))
        }
        other => Err(GraylingError::config(format!(
            "Unsupported device string '{other}'. Expected cpu, cuda[:<ids>], or auto."
        ))),
    }
}
