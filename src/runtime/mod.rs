//! Interface boundary to the XR runtime.
//!
//! Everything the session driver needs from a runtime is expressed through
//! the [`XrRuntime`] trait and a small set of plain data types. The crate
//! ships two implementations: [`SimulatedRuntime`] (deterministic, scripted,
//! records every call) and, behind the `vr-openxr` feature, an adapter over
//! the `openxr` crate.

mod simulated;
#[cfg(feature = "vr-openxr")]
pub mod openxr;

pub use simulated::{LifecycleCall, SimulatedRuntime};

use glam::{Quat, Vec3};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum XrError {
    #[error("runtime call {call} failed at {location}: {message}")]
    RuntimeCallFailure {
        call: &'static str,
        location: String,
        message: String,
    },
}

impl XrError {
    /// Wraps a failing runtime call with its identity and the call site,
    /// the way the original `CHECK_XR` macro stamped `__FILE__:__LINE__`.
    #[track_caller]
    pub fn runtime(call: &'static str, message: impl Into<String>) -> Self {
        let caller = std::panic::Location::caller();
        XrError::RuntimeCallFailure {
            call,
            location: format!("{}:{}", caller.file(), caller.line()),
            message: message.into(),
        }
    }
}

/// Session lifecycle state as reported by the runtime's event stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeState {
    Idle,
    Ready,
    Synchronized,
    Visible,
    Focused,
    Stopping,
    Exiting,
}

/// One typed event drained from the runtime queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    StateChanged(RuntimeState),
    /// Any event kind this crate does not act on.
    Other,
}

/// Runtime-supplied timestamp tagging a frame for latency compensation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct DisplayTime(pub i64);

/// Per-frame timing token, valid between a wait-frame and its end-frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameState {
    pub predicted_display_time: DisplayTime,
}

/// Field-of-view half-angles in radians. Left and down are negative for a
/// frustum that extends to both sides of the optical axis.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Fov {
    pub angle_left: f32,
    pub angle_right: f32,
    pub angle_up: f32,
    pub angle_down: f32,
}

/// Head pose relative to the reference space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub orientation: Quat,
    pub position: Vec3,
}

impl Default for Pose {
    fn default() -> Self {
        Self {
            orientation: Quat::IDENTITY,
            position: Vec3::ZERO,
        }
    }
}

/// Per-eye pose and field of view, located fresh each frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewPose {
    pub pose: Pose,
    pub fov: Fov,
}

/// Recommended render resolution for one view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewConfiguration {
    pub recommended_width: u32,
    pub recommended_height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SwapchainHandle(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SpaceHandle(pub u64);

/// Graphics-API image name backing one swapchain slot.
pub type ImageHandle = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapchainUsage {
    ColorAttachment,
    DepthStencilAttachment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapchainFormat {
    Srgb8Alpha8,
    Depth16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapchainCreateInfo {
    pub usage: SwapchainUsage,
    pub format: SwapchainFormat,
    pub width: u32,
    pub height: u32,
    pub array_size: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect2D {
    pub offset: [i32; 2],
    pub extent: [i32; 2],
}

/// A sub-region of one swapchain: full-extent rect plus the array layer
/// carrying this view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubImage {
    pub swapchain: SwapchainHandle,
    pub rect: Rect2D,
    pub array_index: u32,
}

/// Depth attachment description accompanying a projection view.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthSubImage {
    pub sub_image: SubImage,
    pub min_depth: f32,
    pub max_depth: f32,
    pub near_z: f32,
    pub far_z: f32,
}

/// Per-eye composition descriptor: where the rendered content lives and the
/// pose/FOV it was rendered with.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProjectionView {
    pub pose: Pose,
    pub fov: Fov,
    pub color: SubImage,
    pub depth: DepthSubImage,
}

/// A stereo projection layer handed to the runtime compositor.
#[derive(Debug, Clone, PartialEq)]
pub struct CompositionLayer {
    pub space: SpaceHandle,
    pub views: Vec<ProjectionView>,
}

/// Everything submitted at frame end. Zero layers while not visible, one
/// projection layer otherwise.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameEndInfo {
    pub display_time: DisplayTime,
    pub layers: Vec<CompositionLayer>,
}

/// The session driver's view of an XR runtime.
///
/// `wait_frame` and `acquire_image` are the blocking calls; everything else
/// returns immediately. All calls are fallible and failures are never
/// retried by the caller.
pub trait XrRuntime {
    /// Recommended per-view render parameters, fixed for the session.
    fn view_configurations(&mut self) -> Result<Vec<ViewConfiguration>, XrError>;

    /// Creates the fixed-origin local space poses are reported against.
    fn create_reference_space(&mut self) -> Result<SpaceHandle, XrError>;

    /// Returns at most one pending event; `None` drains the queue.
    fn poll_event(&mut self) -> Result<Option<SessionEvent>, XrError>;

    fn begin_session(&mut self) -> Result<(), XrError>;
    fn end_session(&mut self) -> Result<(), XrError>;
    fn destroy_session(&mut self) -> Result<(), XrError>;

    /// Blocks until the runtime is ready for the next frame. This call
    /// paces the entire render loop.
    fn wait_frame(&mut self) -> Result<FrameState, XrError>;
    fn begin_frame(&mut self) -> Result<(), XrError>;
    fn end_frame(&mut self, info: &FrameEndInfo) -> Result<(), XrError>;

    /// Locates every view at `time` relative to `space`.
    fn locate_views(
        &mut self,
        space: SpaceHandle,
        time: DisplayTime,
    ) -> Result<Vec<ViewPose>, XrError>;

    /// Creates a swapchain and enumerates its backing images once.
    fn create_swapchain(
        &mut self,
        info: &SwapchainCreateInfo,
    ) -> Result<(SwapchainHandle, Vec<ImageHandle>), XrError>;

    /// Blocks until an image is available and returns its index.
    fn acquire_image(&mut self, swapchain: SwapchainHandle) -> Result<u32, XrError>;
    fn release_image(&mut self, swapchain: SwapchainHandle) -> Result<(), XrError>;
    fn destroy_swapchain(&mut self, swapchain: SwapchainHandle) -> Result<(), XrError>;
}
