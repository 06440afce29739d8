// gpu/device.rs — wgpu device abstraction.
//
// Responsibilities:
//   - Enumerate hardware adapters on the primary native backends (Vulkan,
//     Metal, DX12) and prefer real GPUs over software renderers.
//   - Expose a `DeviceProfile` for simulating the limits of a small target
//     device on a development machine.
//   - Check that a pipeline resolution fits the device's texture limits
//     before any buffer is allocated.
//
// ADAPTER SELECTION:
// wgpu's default `request_adapter` uses power preference heuristics that
// may grab llvmpipe/softpipe (which appear as valid Vulkan devices). We
// enumerate explicitly and only fall back to a `DeviceType::Cpu` adapter
// when nothing else exists.
//
// DEVICE LIMITS:
// Under a non-Native profile we request *lower* limits than the hardware
// supports. wgpu validates every texture and dispatch against the requested
// limits, so a resolution that would fail on the target fails here too.
//
// WORKGROUPS:
// Every edge kernel runs over fixed 8×8 tiles (`backend::TILE_SIZE`), so
// there is no per-profile workgroup tuning. 64 invocations fit every
// profile's limit.
//
// NEW RUST CONCEPTS:
// - `pollster::block_on` — runs an async fn to completion on the current
//   thread. wgpu's device/adapter API is async because on WebGPU it maps
//   to JS Promises, but natively we just block.

use std::fmt;

use tracing::{info, warn};

use crate::backend::TILE_SIZE;

/// Hardware profile controlling requested device limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceProfile {
    /// Use the adapter's default limits. No artificial caps.
    Native,
    /// Simulate Raspberry Pi 4/5 (Broadcom VideoCore VI/VII, V3DV Vulkan):
    /// 256 invocations per workgroup and 4096² textures.
    RaspberryPi,
}

impl fmt::Display for DeviceProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceProfile::Native => write!(f, "Native"),
            DeviceProfile::RaspberryPi => write!(f, "RaspberryPi (simulated limits)"),
        }
    }
}

/// Cached adapter information for logging and debugging.
#[derive(Debug, Clone)]
pub struct AdapterInfo {
    pub name: String,
    pub vendor: u32,
    pub device: u32,
    pub device_type: wgpu::DeviceType,
    pub backend: wgpu::Backend,
}

impl fmt::Display for AdapterInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({:?}, {:?})",
            self.name, self.backend, self.device_type
        )
    }
}

/// The core GPU context: adapter, device, queue, and active profile.
///
/// Create via `GpuDevice::new()` or `GpuDevice::new_with_profile()`. It is
/// expensive to create (instance + device initialisation); hold one for the
/// lifetime of the application.
///
/// # Field drop order
/// Rust drops struct fields in declaration order (top → bottom).
/// `_instance` is declared last so the `wgpu::Instance` outlives `device`
/// and `queue`. Some Vulkan layers (dzn on WSL2) crash when the instance is
/// destroyed while device-level objects still reference it.
pub struct GpuDevice {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub profile: DeviceProfile,
    pub adapter_info: AdapterInfo,
    /// Limits the device was created with.
    pub limits: wgpu::Limits,
    /// Keeps the `wgpu::Instance` alive until `device` and `queue` are
    /// dropped. Its sole purpose is to control the drop order.
    _instance: wgpu::Instance,
}

impl GpuDevice {
    /// Create a `GpuDevice` on the best available adapter with
    /// `DeviceProfile::Native` limits.
    ///
    /// # Errors
    /// Returns `Err` if no adapter is found or the device request fails.
    pub fn new() -> Result<Self, GpuError> {
        Self::new_with_profile(DeviceProfile::Native)
    }

    /// Create a `GpuDevice` with an explicit hardware profile.
    pub fn new_with_profile(profile: DeviceProfile) -> Result<Self, GpuError> {
        pollster::block_on(Self::init_async(profile))
    }

    async fn init_async(profile: DeviceProfile) -> Result<Self, GpuError> {
        // Non-compliant adapters (dzn on WSL2) are enumerated too; the edge
        // kernels rely on nothing beyond storage textures and compute.
        let flags = if cfg!(debug_assertions) {
            wgpu::InstanceFlags::VALIDATION
                | wgpu::InstanceFlags::ALLOW_UNDERLYING_NONCOMPLIANT_ADAPTER
        } else {
            wgpu::InstanceFlags::ALLOW_UNDERLYING_NONCOMPLIANT_ADAPTER
        };

        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            flags,
            ..Default::default()
        });

        // Tiered selection:
        //   DiscreteGpu / IntegratedGpu — real hardware        <- preferred
        //   VirtualGpu / Other          — VM pass-through, dzn <- acceptable
        //   Cpu                         — software renderer    <- last resort
        let all_adapters: Vec<wgpu::Adapter> = instance
            .enumerate_adapters(wgpu::Backends::PRIMARY)
            .into_iter()
            .collect();

        if all_adapters.is_empty() {
            return Err(GpuError::NoSuitableAdapter);
        }

        for a in &all_adapters {
            let info = a.get_info();
            info!(
                name = %info.name,
                backend = ?info.backend,
                device_type = ?info.device_type,
                "found adapter"
            );
        }

        let rank = |t: wgpu::DeviceType| match t {
            wgpu::DeviceType::DiscreteGpu | wgpu::DeviceType::IntegratedGpu => 0,
            wgpu::DeviceType::VirtualGpu | wgpu::DeviceType::Other => 1,
            wgpu::DeviceType::Cpu => 2,
        };
        let adapter = all_adapters
            .into_iter()
            .min_by_key(|a| rank(a.get_info().device_type))
            .ok_or(GpuError::NoSuitableAdapter)?;

        let raw_info = adapter.get_info();
        if raw_info.device_type == wgpu::DeviceType::Cpu {
            warn!(name = %raw_info.name, "only a software adapter is available");
        }
        let adapter_info = AdapterInfo {
            name: raw_info.name.clone(),
            vendor: raw_info.vendor,
            device: raw_info.device,
            device_type: raw_info.device_type,
            backend: raw_info.backend,
        };

        // Auto-detect RPi when the caller passed Native but the adapter is V3D.
        let profile = match profile {
            DeviceProfile::Native if raw_info.name.to_ascii_lowercase().contains("v3d") => {
                info!("V3D adapter detected, using RaspberryPi profile");
                DeviceProfile::RaspberryPi
            }
            other => other,
        };

        let limits = limits_for_profile(profile);

        let (device, queue): (wgpu::Device, wgpu::Queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("edgescope"),
                    required_features: wgpu::Features::empty(),
                    required_limits: limits.clone(),
                    memory_hints: wgpu::MemoryHints::default(),
                },
                None,
            )
            .await
            .map_err(GpuError::DeviceRequest)?;

        info!(adapter = %adapter_info, %profile, "gpu device ready");

        Ok(GpuDevice {
            device,
            queue,
            profile,
            adapter_info,
            limits,
            _instance: instance,
        })
    }

    /// Check that `width × height` textures are allowed on this device.
    pub fn check_resolution(&self, width: u32, height: u32) -> Result<(), GpuError> {
        let max = self.limits.max_texture_dimension_2d;
        if width > max || height > max {
            return Err(GpuError::TextureTooLarge { width, height, max });
        }
        Ok(())
    }
}

impl fmt::Display for GpuDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "GpuDevice {{ adapter: {}, profile: {}, workgroup: {}×{} }}",
            self.adapter_info, self.profile, TILE_SIZE, TILE_SIZE
        )
    }
}

// ============================================================
// Limits helpers
// ============================================================

/// Build wgpu limits for the given profile.
fn limits_for_profile(profile: DeviceProfile) -> wgpu::Limits {
    match profile {
        DeviceProfile::Native => wgpu::Limits::default(),

        DeviceProfile::RaspberryPi => wgpu::Limits {
            // VideoCore VI/VII: vulkaninfo reports 256 max invocations.
            max_compute_invocations_per_workgroup: 256,
            max_compute_workgroup_size_x: 256,
            max_compute_workgroup_size_y: 256,
            max_compute_workgroup_size_z: 64,
            // VideoCore VI caps textures at 4096×4096 (vs wgpu default 8192).
            max_texture_dimension_2d: 4096,
            max_storage_buffer_binding_size: 128 << 20,
            ..wgpu::Limits::default()
        },
    }
}

// ============================================================
// Error type
// ============================================================

/// Errors from GPU device initialisation, shader compilation and readback.
#[derive(Debug)]
pub enum GpuError {
    /// No adapter found on any primary backend.
    NoSuitableAdapter,
    /// wgpu device request failed (driver issue, unsupported limits, etc.).
    DeviceRequest(wgpu::RequestDeviceError),
    /// The pipeline resolution exceeds the device's texture limit.
    TextureTooLarge { width: u32, height: u32, max: u32 },
    /// Shader module or pipeline creation raised a validation error.
    ShaderCompile(String),
    /// Mapping a readback buffer failed.
    BufferMap(wgpu::BufferAsyncError),
    /// The map callback was dropped without firing.
    ReadbackLost,
}

impl fmt::Display for GpuError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GpuError::NoSuitableAdapter => write!(
                f,
                "no GPU adapter found. Check that Vulkan, Metal or DX12 drivers are installed."
            ),
            GpuError::DeviceRequest(e) => write!(f, "device request failed: {e}"),
            GpuError::TextureTooLarge { width, height, max } => write!(
                f,
                "resolution {width}×{height} exceeds device texture limit of {max}"
            ),
            GpuError::ShaderCompile(msg) => write!(f, "shader compilation failed: {msg}"),
            GpuError::BufferMap(e) => write!(f, "readback map failed: {e}"),
            GpuError::ReadbackLost => write!(f, "readback map callback never fired"),
        }
    }
}

impl std::error::Error for GpuError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GpuError::DeviceRequest(e) => Some(e),
            GpuError::BufferMap(e) => Some(e),
            _ => None,
        }
    }
}

// ============================================================
// Tests
// ============================================================
