// Backend module - Vulkan abstraction layer
//
// Thin wrappers around ash: each function maps onto one or two driver calls
// and logs what it created.

pub mod buffer;
pub mod commands;
pub mod device;
pub mod pipeline;
pub mod shader;
pub mod surface;
pub mod swapchain;
pub mod sync;
pub mod texture;

pub use buffer::GpuBuffer;
pub use device::GraphicsDevice;
pub use surface::Surface;
pub use swapchain::{Swapchain, SwapchainRequest};
