//! Swapchain lifecycle: creation, staleness and recreation.

use crate::error::{RenderError, Result};
use prism_gpu::{GpuContext, SurfaceContext, Swapchain};

/// Lifecycle of the presentable image chain.
///
/// `Uninitialized -> Active -> (Stale -> Recreating -> Active)* -> Destroyed`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapchainState {
    Uninitialized,
    Active,
    Stale,
    Recreating,
    Destroyed,
}

/// State machine guarding the legal lifecycle transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lifecycle {
    state: SwapchainState,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self {
            state: SwapchainState::Uninitialized,
        }
    }
}

impl Lifecycle {
    pub fn state(&self) -> SwapchainState {
        self.state
    }

    /// Fail unless the current state is one of `allowed`.
    pub fn check(&self, allowed: &[SwapchainState], operation: &'static str) -> Result<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(RenderError::InvalidSwapchainState {
                state: self.state,
                operation,
            })
        }
    }

    fn transition(
        &mut self,
        allowed: &[SwapchainState],
        next: SwapchainState,
        operation: &'static str,
    ) -> Result<()> {
        self.check(allowed, operation)?;
        tracing::trace!(from = ?self.state, to = ?next, "Swapchain state");
        self.state = next;
        Ok(())
    }

    /// A chain now exists and can be rendered to.
    pub fn activate(&mut self) -> Result<()> {
        self.transition(
            &[SwapchainState::Uninitialized, SwapchainState::Recreating],
            SwapchainState::Active,
            "activate",
        )
    }

    /// The chain no longer matches the surface. Idempotent while stale.
    pub fn mark_stale(&mut self) -> Result<()> {
        self.transition(
            &[SwapchainState::Active, SwapchainState::Stale],
            SwapchainState::Stale,
            "mark stale",
        )
    }

    pub fn begin_recreate(&mut self) -> Result<()> {
        self.transition(
            &[SwapchainState::Stale],
            SwapchainState::Recreating,
            "recreate",
        )
    }

    pub fn destroy(&mut self) {
        self.state = SwapchainState::Destroyed;
    }
}

/// Where the current framebuffer size comes from.
///
/// Implemented by the windowing layer.
pub trait SurfaceSizeSource {
    /// Current framebuffer size in pixels.
    fn framebuffer_size(&self) -> (u32, u32);

    /// Block until new window events arrive.
    ///
    /// Returns `false` when the caller cannot block here, for example inside
    /// an event loop callback. A 0x0 recreation is then deferred.
    fn wait_events(&self) -> bool;
}

/// Poll `source` until it reports a non-zero framebuffer size.
///
/// `None` if the size is 0x0 and `source` cannot wait for it to change.
pub fn wait_for_nonzero_extent(source: &dyn SurfaceSizeSource) -> Option<(u32, u32)> {
    let mut size = source.framebuffer_size();
    while size.0 == 0 || size.1 == 0 {
        tracing::trace!("Framebuffer is 0x0, waiting");
        if !source.wait_events() {
            return None;
        }
        size = source.framebuffer_size();
    }
    Some(size)
}

/// Creates swapchains for one surface.
pub trait ChainFactory {
    type Chain;

    /// Build a chain for `size`, reusing `old` as a hint when given.
    fn create_chain(
        &self,
        size: (u32, u32),
        vsync: bool,
        old: Option<&Self::Chain>,
    ) -> Result<Self::Chain>;
}

impl ChainFactory for SurfaceContext {
    type Chain = Swapchain;

    fn create_chain(
        &self,
        size: (u32, u32),
        vsync: bool,
        old: Option<&Swapchain>,
    ) -> Result<Swapchain> {
        Ok(self.create_swapchain(size, vsync, old)?)
    }
}

/// Blocks until the device has no work in flight.
pub trait DeviceIdle {
    fn wait_idle(&self) -> Result<()>;
}

impl DeviceIdle for GpuContext {
    fn wait_idle(&self) -> Result<()> {
        Ok(GpuContext::wait_idle(self)?)
    }
}

/// Owns the surface, the current swapchain and its lifecycle.
pub struct SwapchainManager<F: ChainFactory = SurfaceContext> {
    lifecycle: Lifecycle,
    swapchain: Option<F::Chain>,
    factory: F,
    vsync: bool,
}

impl<F: ChainFactory> SwapchainManager<F> {
    pub fn new(factory: F, vsync: bool) -> Self {
        Self {
            lifecycle: Lifecycle::default(),
            swapchain: None,
            factory,
            vsync,
        }
    }

    pub fn state(&self) -> SwapchainState {
        self.lifecycle.state()
    }

    /// The current chain. Fails unless one has been created.
    pub fn swapchain(&self) -> Result<&F::Chain> {
        self.swapchain
            .as_ref()
            .ok_or(RenderError::InvalidSwapchainState {
                state: self.lifecycle.state(),
                operation: "access swapchain",
            })
    }

    /// Create the first chain. Fails if the framebuffer is 0x0 and cannot be waited on.
    pub fn create(&mut self, size_source: &dyn SurfaceSizeSource) -> Result<&F::Chain> {
        self.lifecycle
            .check(&[SwapchainState::Uninitialized], "create")?;
        let size = wait_for_nonzero_extent(size_source).ok_or_else(|| {
            RenderError::Config("cannot create a swapchain for a 0x0 surface".to_string())
        })?;
        let swapchain = self.factory.create_chain(size, self.vsync, None)?;
        self.lifecycle.activate()?;
        Ok(self.swapchain.insert(swapchain))
    }

    /// Flag the chain for recreation.
    pub fn mark_stale(&mut self) -> Result<()> {
        self.lifecycle.mark_stale()
    }

    /// Rebuild the chain after it went stale.
    ///
    /// Waits for a non-zero framebuffer first, then for the device to go
    /// idle. The new chain is created with the old one as a hint; the old one
    /// is destroyed afterwards. Returns `None` and stays stale when the size
    /// is 0x0 and `size_source` cannot block.
    pub fn recreate(
        &mut self,
        device: &dyn DeviceIdle,
        size_source: &dyn SurfaceSizeSource,
    ) -> Result<Option<&F::Chain>> {
        self.lifecycle.check(&[SwapchainState::Stale], "recreate")?;

        let Some(size) = wait_for_nonzero_extent(size_source) else {
            tracing::debug!("Framebuffer is 0x0, deferring swapchain recreation");
            return Ok(None);
        };

        self.lifecycle.begin_recreate()?;
        device.wait_idle()?;

        let new = self
            .factory
            .create_chain(size, self.vsync, self.swapchain.as_ref())?;
        let old = self.swapchain.replace(new);
        drop(old);

        self.lifecycle.activate()?;
        tracing::info!(width = size.0, height = size.1, "Swapchain recreated");

        self.swapchain().map(Some)
    }
}

impl<F: ChainFactory> Drop for SwapchainManager<F> {
    fn drop(&mut self) {
        self.swapchain = None;
        self.lifecycle.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;
    use std::rc::Rc;

    #[test]
    fn full_lifecycle() {
        let mut lifecycle = Lifecycle::default();
        assert_eq!(lifecycle.state(), SwapchainState::Uninitialized);

        lifecycle.activate().unwrap();
        for _ in 0..3 {
            lifecycle.mark_stale().unwrap();
            lifecycle.mark_stale().unwrap();
            assert_eq!(lifecycle.state(), SwapchainState::Stale);
            lifecycle.begin_recreate().unwrap();
            assert_eq!(lifecycle.state(), SwapchainState::Recreating);
            lifecycle.activate().unwrap();
            assert_eq!(lifecycle.state(), SwapchainState::Active);
        }

        lifecycle.destroy();
        assert_eq!(lifecycle.state(), SwapchainState::Destroyed);
    }

    #[test]
    fn illegal_transitions_are_rejected() {
        let mut lifecycle = Lifecycle::default();
        assert!(lifecycle.mark_stale().is_err());
        assert!(lifecycle.begin_recreate().is_err());

        lifecycle.activate().unwrap();
        assert!(lifecycle.activate().is_err());
        assert!(matches!(
            lifecycle.begin_recreate(),
            Err(RenderError::InvalidSwapchainState {
                state: SwapchainState::Active,
                ..
            })
        ));

        lifecycle.destroy();
        assert!(lifecycle.mark_stale().is_err());
        assert!(lifecycle.activate().is_err());
    }

    #[derive(Debug, Clone, PartialEq)]
    enum Event {
        SizeWait,
        Idle,
        Create {
            size: (u32, u32),
            hint: Option<u32>,
        },
    }

    type Log = Rc<RefCell<Vec<Event>>>;

    /// Reports queued sizes one poll at a time, then repeats the last one.
    struct ScriptedWindow {
        sizes: RefCell<Vec<(u32, u32)>>,
        waits: Cell<u32>,
        blocking: bool,
        log: Log,
    }

    impl ScriptedWindow {
        fn new(sizes: Vec<(u32, u32)>) -> Self {
            Self::with_log(sizes, true, Log::default())
        }

        fn with_log(sizes: Vec<(u32, u32)>, blocking: bool, log: Log) -> Self {
            let window = Self {
                sizes: RefCell::default(),
                waits: Cell::new(0),
                blocking,
                log,
            };
            window.script(sizes);
            window
        }

        fn script(&self, mut sizes: Vec<(u32, u32)>) {
            sizes.reverse();
            *self.sizes.borrow_mut() = sizes;
        }
    }

    impl SurfaceSizeSource for ScriptedWindow {
        fn framebuffer_size(&self) -> (u32, u32) {
            let mut sizes = self.sizes.borrow_mut();
            if sizes.len() > 1 {
                sizes.pop().unwrap_or_default()
            } else {
                sizes.last().copied().unwrap_or_default()
            }
        }

        fn wait_events(&self) -> bool {
            self.waits.set(self.waits.get() + 1);
            self.log.borrow_mut().push(Event::SizeWait);
            self.blocking
        }
    }

    #[derive(Debug)]
    struct FakeChain {
        id: u32,
        image_count: usize,
    }

    /// Hands out chains with scripted image counts.
    struct FakeSurface {
        image_counts: RefCell<VecDeque<usize>>,
        next_id: Cell<u32>,
        fail: Cell<bool>,
        log: Log,
    }

    impl FakeSurface {
        fn new(image_counts: &[usize], log: Log) -> Self {
            Self {
                image_counts: RefCell::new(image_counts.iter().copied().collect()),
                next_id: Cell::new(0),
                fail: Cell::new(false),
                log,
            }
        }
    }

    impl ChainFactory for FakeSurface {
        type Chain = FakeChain;

        fn create_chain(
            &self,
            size: (u32, u32),
            _vsync: bool,
            old: Option<&FakeChain>,
        ) -> Result<FakeChain> {
            self.log.borrow_mut().push(Event::Create {
                size,
                hint: old.map(|chain| chain.id),
            });
            if self.fail.get() {
                let lost = prism_gpu::vk::Result::ERROR_DEVICE_LOST;
                return Err(prism_gpu::GpuError::Vulkan(lost).into());
            }
            let id = self.next_id.get();
            self.next_id.set(id + 1);
            let image_count = self.image_counts.borrow_mut().pop_front().unwrap_or(3);
            Ok(FakeChain { id, image_count })
        }
    }

    struct FakeDevice(Log);

    impl DeviceIdle for FakeDevice {
        fn wait_idle(&self) -> Result<()> {
            self.0.borrow_mut().push(Event::Idle);
            Ok(())
        }
    }

    fn manager(image_counts: &[usize], log: &Log) -> SwapchainManager<FakeSurface> {
        SwapchainManager::new(FakeSurface::new(image_counts, log.clone()), false)
    }

    #[test]
    fn minimised_window_blocks_until_nonzero() {
        let window = ScriptedWindow::new(vec![(0, 0), (0, 0), (800, 0), (800, 600)]);
        assert_eq!(wait_for_nonzero_extent(&window), Some((800, 600)));
        assert_eq!(window.waits.get(), 3);
    }

    #[test]
    fn visible_window_does_not_wait() {
        let window = ScriptedWindow::new(vec![(1280, 720)]);
        assert_eq!(wait_for_nonzero_extent(&window), Some((1280, 720)));
        assert_eq!(window.waits.get(), 0);
    }

    #[test]
    fn recreate_hands_old_chain_as_hint_and_activates() {
        let log = Log::default();
        let window = ScriptedWindow::with_log(vec![(800, 600)], true, log.clone());
        let mut chains = manager(&[3, 2], &log);

        assert_eq!(chains.create(&window).unwrap().image_count, 3);
        assert_eq!(chains.state(), SwapchainState::Active);

        chains.mark_stale().unwrap();
        assert_eq!(chains.state(), SwapchainState::Stale);
        let chain = chains
            .recreate(&FakeDevice(log.clone()), &window)
            .unwrap()
            .unwrap();
        assert_eq!((chain.id, chain.image_count), (1, 2));
        assert_eq!(chains.state(), SwapchainState::Active);
        assert_eq!(chains.swapchain().unwrap().image_count, 2);

        assert_eq!(
            *log.borrow(),
            vec![
                Event::Create {
                    size: (800, 600),
                    hint: None
                },
                Event::Idle,
                Event::Create {
                    size: (800, 600),
                    hint: Some(0)
                },
            ]
        );
    }

    #[test]
    fn zero_size_is_waited_out_before_device_idle() {
        let log = Log::default();
        let window = ScriptedWindow::with_log(vec![(800, 600)], true, log.clone());
        let mut chains = manager(&[3, 3], &log);
        chains.create(&window).unwrap();

        window.script(vec![(0, 0), (0, 0), (640, 480)]);
        chains.mark_stale().unwrap();
        chains
            .recreate(&FakeDevice(log.clone()), &window)
            .unwrap()
            .unwrap();

        assert_eq!(
            log.borrow()[1..],
            [
                Event::SizeWait,
                Event::SizeWait,
                Event::Idle,
                Event::Create {
                    size: (640, 480),
                    hint: Some(0)
                },
            ]
        );
    }

    #[test]
    fn zero_size_without_blocking_defers_and_stays_stale() {
        let log = Log::default();
        let window = ScriptedWindow::with_log(vec![(800, 600)], false, log.clone());
        let mut chains = manager(&[3, 2], &log);
        chains.create(&window).unwrap();

        window.script(vec![(0, 0)]);
        chains.mark_stale().unwrap();
        let device = FakeDevice(log.clone());
        assert!(chains.recreate(&device, &window).unwrap().is_none());
        assert_eq!(chains.state(), SwapchainState::Stale);
        assert_eq!(chains.swapchain().unwrap().id, 0);
        assert!(!log.borrow().contains(&Event::Idle));

        window.script(vec![(1024, 768)]);
        chains.mark_stale().unwrap();
        let chain = chains.recreate(&device, &window).unwrap().unwrap();
        assert_eq!((chain.id, chain.image_count), (1, 2));
        assert_eq!(chains.state(), SwapchainState::Active);
    }

    #[test]
    fn recreate_requires_a_stale_chain() {
        let log = Log::default();
        let window = ScriptedWindow::with_log(vec![(800, 600)], true, log.clone());
        let mut chains = manager(&[3], &log);
        let device = FakeDevice(log.clone());

        assert!(chains.recreate(&device, &window).is_err());
        chains.create(&window).unwrap();
        assert!(chains.create(&window).is_err());
        assert!(matches!(
            chains.recreate(&device, &window),
            Err(RenderError::InvalidSwapchainState {
                state: SwapchainState::Active,
                ..
            })
        ));
        assert_eq!(log.borrow().len(), 1);
    }

    #[test]
    fn failed_creation_leaves_chain_recreating() {
        let log = Log::default();
        let window = ScriptedWindow::with_log(vec![(800, 600)], true, log.clone());
        let mut chains = manager(&[3], &log);
        chains.create(&window).unwrap();

        chains.mark_stale().unwrap();
        chains.factory.fail.set(true);
        assert!(chains.recreate(&FakeDevice(log.clone()), &window).is_err());
        assert_eq!(chains.state(), SwapchainState::Recreating);
        assert_eq!(chains.swapchain().unwrap().id, 0);
    }

    #[test]
    fn zero_size_first_creation_cannot_be_deferred() {
        let log = Log::default();
        let window = ScriptedWindow::with_log(vec![(0, 0)], false, log.clone());
        let mut chains = manager(&[3], &log);
        assert!(matches!(chains.create(&window), Err(RenderError::Config(_))));
        assert_eq!(chains.state(), SwapchainState::Uninitialized);
    }
}
