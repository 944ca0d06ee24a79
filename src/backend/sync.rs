// Synchronization primitives
//
// One FrameSync per back buffer slot. Render-finished semaphores belong to
// swapchain images instead: presentation holds them until the image comes
// back, which a per-slot fence cannot observe.

use anyhow::{Context, Result};
use ash::vk;

use super::GraphicsDevice;

/// Frame synchronization - one per frame in flight
pub struct FrameSync {
    /// Signaled by acquire, waited on by the frame's submit
    pub image_available: vk::Semaphore,
    /// Signaled when the frame's submit retires
    pub in_flight: vk::Fence,
}

impl FrameSync {
    pub fn new(device: &GraphicsDevice) -> Result<Self> {
        let image_available = create_semaphore(device)?;
        // Start signaled so the first wait returns immediately
        let in_flight = match create_fence(device, true) {
            Ok(fence) => fence,
            Err(e) => {
                unsafe { device.device.destroy_semaphore(image_available, None) };
                return Err(e);
            }
        };

        Ok(Self {
            image_available,
            in_flight,
        })
    }

    pub fn destroy(&self, device: &ash::Device) {
        unsafe {
            device.destroy_semaphore(self.image_available, None);
            device.destroy_fence(self.in_flight, None);
        }
    }
}

pub fn create_semaphore(device: &GraphicsDevice) -> Result<vk::Semaphore> {
    let semaphore_info = vk::SemaphoreCreateInfo::default();
    unsafe { device.device.create_semaphore(&semaphore_info, None) }
        .context("Failed to create semaphore")
}

pub fn create_fence(device: &GraphicsDevice, signaled: bool) -> Result<vk::Fence> {
    let flags = if signaled {
        vk::FenceCreateFlags::SIGNALED
    } else {
        vk::FenceCreateFlags::empty()
    };
    let fence_info = vk::FenceCreateInfo::default().flags(flags);
    let fence = unsafe { device.device.create_fence(&fence_info, None) }
        .context("Failed to create fence")?;

    log::debug!("Fence created (signaled: {})", signaled);
    Ok(fence)
}

/// Round-robin index over the frame slots
#[derive(Debug, Clone, Copy)]
pub struct FrameRing {
    current: usize,
    len: usize,
}

impl FrameRing {
    pub fn new(len: usize) -> Self {
        assert!(len > 0, "frame ring needs at least one slot");
        Self { current: 0, len }
    }

    pub fn current(&self) -> usize {
        self.current
    }

    pub fn advance(&mut self) {
        self.current = (self.current + 1) % self.len;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_wraps_around() {
        let mut ring = FrameRing::new(2);
        assert_eq!(ring.current(), 0);
        ring.advance();
        assert_eq!(ring.current(), 1);
        ring.advance();
        assert_eq!(ring.current(), 0);
    }

    #[test]
    fn single_slot_ring_stays_put() {
        let mut ring = FrameRing::new(1);
        ring.advance();
        ring.advance();
        assert_eq!(ring.current(), 0);
    }

    #[test]
    #[should_panic(expected = "at least one slot")]
    fn empty_ring_panics() {
        FrameRing::new(0);
    }
}
