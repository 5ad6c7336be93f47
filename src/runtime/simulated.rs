use super::{
    DisplayTime, FrameEndInfo, FrameState, Fov, ImageHandle, Pose, SessionEvent,
    SpaceHandle, SwapchainCreateInfo, SwapchainHandle, ViewConfiguration, ViewPose, XrError,
    XrRuntime,
};
use glam::Vec3;
use std::collections::VecDeque;

const DEFAULT_FRAME_INTERVAL_NANOS: i64 = 16_666_667;
const DEFAULT_IMAGE_COUNT: u32 = 3;
const EYE_SEPARATION: f32 = 0.064;

/// Runtime lifecycle calls the simulation records, in issue order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleCall {
    BeginSession,
    EndSession,
    DestroySession,
}

#[derive(Debug)]
struct SimSwapchain {
    info: SwapchainCreateInfo,
    images: Vec<ImageHandle>,
    cursor: u32,
    acquired: Option<u32>,
    fail_next_acquire: bool,
    destroyed: bool,
    acquire_count: u64,
    release_count: u64,
}

/// Deterministic in-memory runtime used by tests and headless runs.
///
/// Events are delivered from an explicit queue, one per poll; every
/// lifecycle call and frame submission is recorded so tests can assert on
/// ordering and layer counts. Swapchains hand out images round-robin and
/// enforce acquire/release pairing the way a real runtime would.
#[derive(Debug)]
pub struct SimulatedRuntime {
    events: VecDeque<SessionEvent>,
    view_count: usize,
    extent: [u32; 2],
    image_count: u32,
    swapchains: Vec<SimSwapchain>,
    session_running: bool,
    session_destroyed: bool,
    frame_open: bool,
    time: i64,
    frame_interval: i64,
    lifecycle: Vec<LifecycleCall>,
    submissions: Vec<FrameEndInfo>,
}

impl SimulatedRuntime {
    pub fn new() -> Self {
        Self {
            events: VecDeque::new(),
            view_count: 2,
            extent: [1024, 1024],
            image_count: DEFAULT_IMAGE_COUNT,
            swapchains: Vec::new(),
            session_running: false,
            session_destroyed: false,
            frame_open: false,
            time: 0,
            frame_interval: DEFAULT_FRAME_INTERVAL_NANOS,
            lifecycle: Vec::new(),
            submissions: Vec::new(),
        }
    }

    pub fn with_view_count(mut self, views: usize) -> Self {
        self.view_count = views;
        self
    }

    pub fn with_image_count(mut self, images: u32) -> Self {
        self.image_count = images.max(1);
        self
    }

    pub fn with_extent(mut self, extent: [u32; 2]) -> Self {
        self.extent = extent;
        self
    }

    /// Queues one event for the next poll loop.
    pub fn queue_event(&mut self, event: SessionEvent) {
        self.events.push_back(event);
    }

    /// Makes the next acquire on `swapchain` fail once.
    pub fn fail_next_acquire(&mut self, swapchain: SwapchainHandle) {
        if let Some(chain) = self.swapchains.get_mut(swapchain.0 as usize) {
            chain.fail_next_acquire = true;
        }
    }

    pub fn lifecycle(&self) -> &[LifecycleCall] {
        &self.lifecycle
    }

    pub fn submissions(&self) -> &[FrameEndInfo] {
        &self.submissions
    }

    pub fn layer_counts(&self) -> Vec<usize> {
        self.submissions.iter().map(|s| s.layers.len()).collect()
    }

    pub fn last_submission(&self) -> Option<&FrameEndInfo> {
        self.submissions.last()
    }

    pub fn session_running(&self) -> bool {
        self.session_running
    }

    pub fn session_destroyed(&self) -> bool {
        self.session_destroyed
    }

    pub fn acquire_count(&self, swapchain: SwapchainHandle) -> u64 {
        self.swapchains[swapchain.0 as usize].acquire_count
    }

    pub fn release_count(&self, swapchain: SwapchainHandle) -> u64 {
        self.swapchains[swapchain.0 as usize].release_count
    }

    pub fn has_pending_acquire(&self, swapchain: SwapchainHandle) -> bool {
        self.swapchains[swapchain.0 as usize].acquired.is_some()
    }

    pub fn swapchain_info(&self, swapchain: SwapchainHandle) -> Option<&SwapchainCreateInfo> {
        self.swapchains.get(swapchain.0 as usize).map(|c| &c.info)
    }

    fn chain_mut(&mut self, handle: SwapchainHandle) -> Result<&mut SimSwapchain, XrError> {
        let chain = self
            .swapchains
            .get_mut(handle.0 as usize)
            .ok_or_else(|| XrError::runtime("xrAcquireSwapchainImage", "unknown swapchain"))?;
        if chain.destroyed {
            return Err(XrError::runtime(
                "xrAcquireSwapchainImage",
                "swapchain already destroyed",
            ));
        }
        Ok(chain)
    }
}

impl Default for SimulatedRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl XrRuntime for SimulatedRuntime {
    fn view_configurations(&mut self) -> Result<Vec<ViewConfiguration>, XrError> {
        Ok(vec![
            ViewConfiguration {
                recommended_width: self.extent[0],
                recommended_height: self.extent[1],
            };
            self.view_count
        ])
    }

    fn create_reference_space(&mut self) -> Result<SpaceHandle, XrError> {
        Ok(SpaceHandle(1))
    }

    fn poll_event(&mut self) -> Result<Option<SessionEvent>, XrError> {
        Ok(self.events.pop_front())
    }

    fn begin_session(&mut self) -> Result<(), XrError> {
        if self.session_destroyed {
            return Err(XrError::runtime("xrBeginSession", "session destroyed"));
        }
        if self.session_running {
            return Err(XrError::runtime("xrBeginSession", "session already running"));
        }
        self.session_running = true;
        self.lifecycle.push(LifecycleCall::BeginSession);
        Ok(())
    }

    fn end_session(&mut self) -> Result<(), XrError> {
        if !self.session_running {
            return Err(XrError::runtime("xrEndSession", "session not running"));
        }
        self.session_running = false;
        self.lifecycle.push(LifecycleCall::EndSession);
        Ok(())
    }

    fn destroy_session(&mut self) -> Result<(), XrError> {
        if self.session_destroyed {
            return Err(XrError::runtime("xrDestroySession", "session already destroyed"));
        }
        self.session_running = false;
        self.session_destroyed = true;
        self.lifecycle.push(LifecycleCall::DestroySession);
        Ok(())
    }

    fn wait_frame(&mut self) -> Result<FrameState, XrError> {
        if self.session_destroyed {
            return Err(XrError::runtime("xrWaitFrame", "session destroyed"));
        }
        self.time += self.frame_interval;
        Ok(FrameState {
            predicted_display_time: DisplayTime(self.time),
        })
    }

    fn begin_frame(&mut self) -> Result<(), XrError> {
        if self.frame_open {
            return Err(XrError::runtime("xrBeginFrame", "frame already begun"));
        }
        self.frame_open = true;
        Ok(())
    }

    fn end_frame(&mut self, info: &FrameEndInfo) -> Result<(), XrError> {
        if !self.frame_open {
            return Err(XrError::runtime("xrEndFrame", "no frame begun"));
        }
        self.frame_open = false;
        self.submissions.push(info.clone());
        Ok(())
    }

    fn locate_views(
        &mut self,
        _space: SpaceHandle,
        _time: DisplayTime,
    ) -> Result<Vec<ViewPose>, XrError> {
        let views = (0..self.view_count)
            .map(|eye| {
                let side = if eye == 0 { -1.0 } else { 1.0 };
                ViewPose {
                    pose: Pose {
                        position: Vec3::new(side * EYE_SEPARATION / 2.0, 1.6, 0.0),
                        ..Pose::default()
                    },
                    fov: Fov {
                        angle_left: if eye == 0 { -0.942 } else { -0.698 },
                        angle_right: if eye == 0 { 0.698 } else { 0.942 },
                        angle_up: 0.733,
                        angle_down: -0.785,
                    },
                }
            })
            .collect();
        Ok(views)
    }

    fn create_swapchain(
        &mut self,
        info: &SwapchainCreateInfo,
    ) -> Result<(SwapchainHandle, Vec<ImageHandle>), XrError> {
        let handle = SwapchainHandle(self.swapchains.len() as u64);
        let images = (0..self.image_count)
            .map(|i| (handle.0 + 1) * 100 + i as u64)
            .collect::<Vec<_>>();
        self.swapchains.push(SimSwapchain {
            info: *info,
            images: images.clone(),
            cursor: 0,
            acquired: None,
            fail_next_acquire: false,
            destroyed: false,
            acquire_count: 0,
            release_count: 0,
        });
        Ok((handle, images))
    }

    fn acquire_image(&mut self, swapchain: SwapchainHandle) -> Result<u32, XrError> {
        let chain = self.chain_mut(swapchain)?;
        if chain.fail_next_acquire {
            chain.fail_next_acquire = false;
            return Err(XrError::runtime(
                "xrAcquireSwapchainImage",
                "injected acquire failure",
            ));
        }
        if chain.acquired.is_some() {
            return Err(XrError::runtime(
                "xrAcquireSwapchainImage",
                "image already acquired",
            ));
        }
        let index = chain.cursor;
        chain.cursor = (chain.cursor + 1) % chain.images.len() as u32;
        chain.acquired = Some(index);
        chain.acquire_count += 1;
        Ok(index)
    }

    fn release_image(&mut self, swapchain: SwapchainHandle) -> Result<(), XrError> {
        let chain = self.chain_mut(swapchain)?;
        if chain.acquired.take().is_none() {
            return Err(XrError::runtime(
                "xrReleaseSwapchainImage",
                "no image acquired",
            ));
        }
        chain.release_count += 1;
        Ok(())
    }

    fn destroy_swapchain(&mut self, swapchain: SwapchainHandle) -> Result<(), XrError> {
        let chain = self
            .swapchains
            .get_mut(swapchain.0 as usize)
            .ok_or_else(|| XrError::runtime("xrDestroySwapchain", "unknown swapchain"))?;
        chain.destroyed = true;
        Ok(())
    }
}
