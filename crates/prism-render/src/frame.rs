//! Frames-in-flight synchronization.
//!
//! [`FrameController`] drives the per-frame protocol against a [`FrameBackend`],
//! which performs the actual GPU work. The controller owns the bookkeeping:
//! which slot is current, which slot last rendered each swapchain image, and
//! whether a resize was requested.

use crate::error::{RenderError, Result};
use ash::vk;
use prism_gpu::{AcquiredImage, Fence, Semaphore};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Fixed ring of N per-frame resources, indexed by `frame_counter mod N`.
#[derive(Debug)]
pub struct FrameRing<T> {
    slots: Vec<T>,
    frame_counter: u64,
}

impl<T> FrameRing<T> {
    pub fn new(slots: Vec<T>) -> Result<Self> {
        if slots.is_empty() {
            return Err(RenderError::Config(
                "at least one frame in flight is required".to_string(),
            ));
        }
        Ok(Self {
            slots,
            frame_counter: 0,
        })
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Frames advanced so far.
    pub fn frame_counter(&self) -> u64 {
        self.frame_counter
    }

    pub fn current_index(&self) -> usize {
        (self.frame_counter % self.slots.len() as u64) as usize
    }

    pub fn current(&self) -> &T {
        &self.slots[self.current_index()]
    }

    pub fn advance(&mut self) {
        self.frame_counter += 1;
    }
}

/// Which frame slot last submitted work for each swapchain image.
#[derive(Debug, Clone, Default)]
pub struct ImageTracker {
    owners: Vec<Option<usize>>,
}

impl ImageTracker {
    pub fn new(image_count: usize) -> Self {
        Self {
            owners: vec![None; image_count],
        }
    }

    /// Forget all owners and resize for a new chain.
    pub fn reset(&mut self, image_count: usize) {
        self.owners.clear();
        self.owners.resize(image_count, None);
    }

    pub fn owner(&self, image: u32) -> Option<usize> {
        self.owners.get(image as usize).copied().flatten()
    }

    /// Record `slot` as the owner of `image`, returning the previous owner.
    pub fn claim(&mut self, image: u32, slot: usize) -> Option<usize> {
        let index = image as usize;
        if index >= self.owners.len() {
            self.owners.resize(index + 1, None);
        }
        self.owners[index].replace(slot)
    }

    pub fn image_count(&self) -> usize {
        self.owners.len()
    }
}

/// Resize notification shared with the windowing layer.
///
/// The window side calls [`notify`](Self::notify); the renderer polls it once per frame.
#[derive(Debug, Clone, Default)]
pub struct ResizeSignal(Arc<AtomicBool>);

impl ResizeSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notify(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Clear the flag, returning whether it was set.
    pub fn take(&self) -> bool {
        self.0.swap(false, Ordering::AcqRel)
    }
}

/// Per-slot synchronization objects and command buffer.
pub struct FrameSlot {
    /// Signaled when the acquired image is ready to be rendered to.
    pub image_available: Semaphore,
    /// Signaled when this slot's command buffer has finished executing.
    pub render_finished: Semaphore,
    /// CPU-visible completion of this slot's last submission.
    pub in_flight: Fence,
    pub command_buffer: vk::CommandBuffer,
}

impl FrameSlot {
    pub fn new(device: &Arc<ash::Device>, command_buffer: vk::CommandBuffer) -> Result<Self> {
        Ok(Self {
            image_available: Semaphore::new(device.clone())?,
            render_finished: Semaphore::new(device.clone())?,
            // Signaled so the first wait on a fresh slot returns immediately
            in_flight: Fence::new(device.clone(), true)?,
            command_buffer,
        })
    }
}

/// What happened to a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// The frame was presented.
    Presented,
    /// The frame was presented and the swapchain rebuilt afterwards.
    Recreated,
    /// Acquire found the swapchain out of date. It was rebuilt and nothing was drawn.
    Skipped,
    /// The swapchain needs rebuilding but the window is 0x0. Retried at the
    /// start of the next frame, which draws nothing until it succeeds.
    Deferred,
}

/// GPU operations the per-frame protocol is made of.
pub trait FrameBackend {
    /// Block until `slot`'s fence is signaled.
    fn wait_fence(&mut self, slot: usize) -> Result<()>;
    fn reset_fence(&mut self, slot: usize) -> Result<()>;
    /// Acquire the next image, signaling `slot`'s image-available semaphore.
    fn acquire(&mut self, slot: usize) -> Result<AcquiredImage>;
    /// Update per-image data and record the draw into `slot`'s command buffer.
    fn record(&mut self, slot: usize, image: u32) -> Result<()>;
    /// Submit `slot`'s command buffer, signaling its fence on completion.
    fn submit(&mut self, slot: usize, image: u32) -> Result<()>;
    /// Present `image`. Returns `true` if the swapchain should be rebuilt.
    fn present(&mut self, slot: usize, image: u32) -> Result<bool>;
    /// Rebuild the swapchain and its dependents. Returns the new image count,
    /// or `None` if the window is 0x0 and the rebuild has to wait.
    fn recreate(&mut self) -> Result<Option<usize>>;
}

/// Per-frame bookkeeping for N frames in flight.
#[derive(Debug)]
pub struct FrameController {
    ring: FrameRing<()>,
    images: ImageTracker,
    resize: ResizeSignal,
    recreate_pending: bool,
}

impl FrameController {
    pub fn new(frames_in_flight: usize, image_count: usize) -> Result<Self> {
        Ok(Self {
            ring: FrameRing::new(vec![(); frames_in_flight])?,
            images: ImageTracker::new(image_count),
            resize: ResizeSignal::new(),
            recreate_pending: false,
        })
    }

    pub fn frames_in_flight(&self) -> usize {
        self.ring.len()
    }

    pub fn current_slot(&self) -> usize {
        self.ring.current_index()
    }

    pub fn frame_counter(&self) -> u64 {
        self.ring.frame_counter()
    }

    pub fn resize_signal(&self) -> ResizeSignal {
        self.resize.clone()
    }

    pub fn images(&self) -> &ImageTracker {
        &self.images
    }

    /// Run one frame of the protocol.
    #[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
    pub fn run_frame<B: FrameBackend>(&mut self, backend: &mut B) -> Result<FrameOutcome> {
        let slot = self.ring.current_index();

        if self.recreate_pending {
            if !self.recreate(backend)? {
                return Ok(FrameOutcome::Deferred);
            }
            // The rebuild already covers any resize reported meanwhile
            self.resize.take();
        }

        backend.wait_fence(slot)?;

        let image = match backend.acquire(slot) {
            Ok(acquired) => acquired.index,
            Err(e) if e.kind() == prism_gpu::ErrorKind::Transient => {
                tracing::debug!("Acquire reported out of date, dropping frame");
                self.recreate(backend)?;
                return Ok(FrameOutcome::Skipped);
            }
            Err(e) => return Err(e),
        };

        // The image may still be in use by a different slot's submission
        if let Some(owner) = self.images.owner(image) {
            if owner != slot {
                backend.wait_fence(owner)?;
            }
        }

        backend.record(slot, image)?;

        backend.reset_fence(slot)?;
        backend.submit(slot, image)?;
        self.images.claim(image, slot);

        let needs_recreate = backend.present(slot, image)?;
        let resized = self.resize.take();
        let outcome = if needs_recreate || resized {
            if self.recreate(backend)? {
                FrameOutcome::Recreated
            } else {
                FrameOutcome::Deferred
            }
        } else {
            FrameOutcome::Presented
        };

        self.ring.advance();
        tracing::trace!(slot, image, ?outcome, "Frame done");
        Ok(outcome)
    }

    /// Returns whether the swapchain was rebuilt.
    fn recreate<B: FrameBackend>(&mut self, backend: &mut B) -> Result<bool> {
        match backend.recreate()? {
            Some(image_count) => {
                self.images.reset(image_count);
                self.recreate_pending = false;
                Ok(true)
            }
            None => {
                self.recreate_pending = true;
                Ok(false)
            }
        }
    }
}
