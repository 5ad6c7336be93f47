//! Session lifecycle and the per-frame acquire/render/submit cycle.
//!
//! [`SessionDriver`] owns the runtime session, the color/depth swapchain
//! pair, and the composition state. The embedding renderer calls
//! [`SessionDriver::frame_start`] once before rendering a frame and
//! [`SessionDriver::frame_end`] once after; everything else happens behind
//! those two calls, gated by the session state machine.

mod compositor;
mod state;
mod swapchain;
mod views;

pub use compositor::Compositor;
pub use state::{SessionState, StateMachine};
pub use swapchain::Swapchain;
pub use views::ViewAggregator;

use crate::graphics::{FramebufferId, GraphicsDevice, GraphicsError, WindowSettings};
use crate::math::{FAR_CLIP, NEAR_CLIP};
use crate::runtime::{
    FrameState, SwapchainCreateInfo, SwapchainFormat, SwapchainUsage, XrError, XrRuntime,
};
use glam::Mat4;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Runtime(#[from] XrError),
    #[error(transparent)]
    Graphics(#[from] GraphicsError),
    #[error("runtime enumerated no views")]
    NoViews,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    pub near_clip: f32,
    pub far_clip: f32,
    pub window: WindowSettings,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            near_clip: NEAR_CLIP,
            far_clip: FAR_CLIP,
            window: WindowSettings::default(),
        }
    }
}

impl DriverConfig {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Drives one head-mounted-display rendering session.
pub struct SessionDriver<R: XrRuntime, G: GraphicsDevice> {
    runtime: R,
    graphics: G,
    config: DriverConfig,
    machine: StateMachine,
    aggregator: ViewAggregator,
    compositor: Compositor,
    color: Swapchain,
    depth: Swapchain,
    framebuffer: FramebufferId,
    extent: [u32; 2],
    view_count: usize,
    frame: Option<FrameState>,
    abandoned: bool,
}

impl<R: XrRuntime, G: GraphicsDevice> SessionDriver<R, G> {
    /// Sets up the session-scoped resources: reference space, framebuffer,
    /// and the color/depth swapchain pair sized to the enumerated view
    /// configuration. A failure destroys anything already created and
    /// aborts construction; no partially-initialized session survives.
    pub fn new(mut runtime: R, mut graphics: G, config: DriverConfig) -> Result<Self, SessionError> {
        let view_configs = runtime.view_configurations()?;
        let Some(first) = view_configs.first() else {
            return Err(SessionError::NoViews);
        };
        let extent = [first.recommended_width, first.recommended_height];
        let view_count = view_configs.len();

        let framebuffer = graphics.create_framebuffer()?;
        let space = runtime.create_reference_space()?;

        let mut color = Swapchain::create(
            &mut runtime,
            &SwapchainCreateInfo {
                usage: SwapchainUsage::ColorAttachment,
                format: SwapchainFormat::Srgb8Alpha8,
                width: extent[0],
                height: extent[1],
                array_size: view_count as u32,
            },
        )?;
        let depth = match Swapchain::create(
            &mut runtime,
            &SwapchainCreateInfo {
                usage: SwapchainUsage::DepthStencilAttachment,
                format: SwapchainFormat::Depth16,
                width: extent[0],
                height: extent[1],
                array_size: view_count as u32,
            },
        ) {
            Ok(depth) => depth,
            Err(err) => {
                if let Err(cleanup) = color.destroy(&mut runtime) {
                    log::warn!("[session] color swapchain cleanup failed during setup: {cleanup}");
                }
                return Err(err.into());
            }
        };

        let compositor = Compositor::new(
            space,
            &color,
            &depth,
            extent,
            view_count,
            config.near_clip,
            config.far_clip,
        );
        let aggregator = ViewAggregator::new(space, view_count, config.near_clip, config.far_clip);

        log::info!(
            "[session] initialized: {view_count} views at {}x{}",
            extent[0],
            extent[1]
        );

        Ok(Self {
            runtime,
            graphics,
            config,
            machine: StateMachine::new(),
            aggregator,
            compositor,
            color,
            depth,
            framebuffer,
            extent,
            view_count,
            frame: None,
            abandoned: false,
        })
    }

    /// Opens an application frame: drains pending runtime events (which may
    /// walk the state machine through several states and begin/end the
    /// session along the way), then paces the frame and runs the final
    /// state's frame-start behavior. Only the Visible state locates views
    /// and acquires swapchain images.
    ///
    /// Blocks in wait-frame and acquire; this is what paces the caller's
    /// render loop to the display refresh.
    pub fn frame_start(&mut self) -> Result<(), SessionError> {
        assert!(
            self.frame.is_none(),
            "frame_start called twice without a frame_end"
        );

        while let Some(event) = self.runtime.poll_event()? {
            self.machine.handle_event(&mut self.runtime, event)?;
        }
        if !self.machine.session_alive() {
            return Ok(());
        }

        let frame = self.runtime.wait_frame()?;
        self.runtime.begin_frame()?;
        self.frame = Some(frame);

        match self.machine.state() {
            SessionState::Idle | SessionState::Synchronized => Ok(()),
            SessionState::Visible => {
                if let Err(err) = self.visible_frame_start(frame) {
                    // The frame stays open; frame_end still releases any
                    // acquired images and submits an empty layer list.
                    self.abandoned = true;
                    return Err(err);
                }
                Ok(())
            }
        }
    }

    fn visible_frame_start(&mut self, frame: FrameState) -> Result<(), SessionError> {
        self.aggregator
            .locate(&mut self.runtime, frame.predicted_display_time)?;

        self.color.acquire(&mut self.runtime)?;
        self.depth.acquire(&mut self.runtime)?;

        let color_image = self
            .color
            .current_image()
            .expect("color image acquired above");
        let depth_image = self
            .depth
            .current_image()
            .expect("depth image acquired above");

        self.graphics
            .bind_render_targets(self.framebuffer, color_image, depth_image)?;
        self.graphics.prepare_render_pass(self.extent);
        Ok(())
    }

    /// Closes the frame opened by [`frame_start`]: in Visible, blits the
    /// finished eye buffer to the window, refreshes the composition
    /// descriptors, releases both images, and submits one projection
    /// layer; otherwise submits zero layers. A frame abandoned by an error
    /// still releases whatever was acquired and still submits, so the
    /// runtime never sees an unbalanced frame.
    ///
    /// [`frame_start`]: SessionDriver::frame_start
    pub fn frame_end(&mut self) -> Result<(), SessionError> {
        if !self.machine.session_alive() {
            return Ok(());
        }
        let Some(frame) = self.frame.take() else {
            log::debug!("[session] frame_end without an open frame; nothing to submit");
            return Ok(());
        };

        let visible = self.machine.state() == SessionState::Visible && !self.abandoned;
        if visible {
            self.graphics
                .blit_to_window(self.framebuffer, self.extent, &self.config.window);
            self.compositor.record_views(self.aggregator.located());
        }

        let mut first_error: Option<XrError> = None;
        if self.color.is_acquired() {
            if let Err(err) = self.color.release(&mut self.runtime) {
                first_error.get_or_insert(err);
            }
        }
        if self.depth.is_acquired() {
            if let Err(err) = self.depth.release(&mut self.runtime) {
                first_error.get_or_insert(err);
            }
        }

        let info = if visible {
            self.compositor.visible_frame(frame.predicted_display_time)
        } else {
            self.compositor.empty_frame(frame.predicted_display_time)
        };
        let end_result = self.runtime.end_frame(&info);
        self.abandoned = false;

        if let Some(err) = first_error {
            return Err(err.into());
        }
        end_result.map_err(Into::into)
    }

    /// Corrected stereo view-projection pair for a renderer supplying its
    /// own legacy projection convention.
    pub fn view_projections(&self, caller_projection: Mat4) -> [Mat4; 2] {
        self.aggregator.corrected_pair(caller_projection)
    }

    /// The raw per-view `projection × view` matrices from the last located
    /// frame.
    pub fn raw_view_projections(&self) -> &[Mat4] {
        self.aggregator.view_projections()
    }

    /// Re-applies the eye-buffer viewport after the embedding renderer has
    /// touched viewport state mid-frame.
    pub fn set_render_viewport(&mut self) {
        self.graphics.set_render_viewport(self.extent);
    }

    pub fn state(&self) -> SessionState {
        self.machine.state()
    }

    pub fn session_alive(&self) -> bool {
        self.machine.session_alive()
    }

    pub fn extent(&self) -> [u32; 2] {
        self.extent
    }

    pub fn view_count(&self) -> usize {
        self.view_count
    }

    pub fn color_swapchain(&self) -> &Swapchain {
        &self.color
    }

    pub fn depth_swapchain(&self) -> &Swapchain {
        &self.depth
    }

    pub fn runtime(&self) -> &R {
        &self.runtime
    }

    pub fn runtime_mut(&mut self) -> &mut R {
        &mut self.runtime
    }

    pub fn graphics(&self) -> &G {
        &self.graphics
    }

    pub fn graphics_mut(&mut self) -> &mut G {
        &mut self.graphics
    }
}

impl<R: XrRuntime, G: GraphicsDevice> Drop for SessionDriver<R, G> {
    fn drop(&mut self) {
        if let Err(err) = self.color.destroy(&mut self.runtime) {
            log::warn!("[session] color swapchain teardown failed: {err}");
        }
        if let Err(err) = self.depth.destroy(&mut self.runtime) {
            log::warn!("[session] depth swapchain teardown failed: {err}");
        }
        if self.machine.session_alive() {
            if let Err(err) = self.runtime.destroy_session() {
                log::warn!("[session] session teardown failed: {err}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphics::NullGraphics;
    use crate::runtime::SimulatedRuntime;

    fn driver() -> SessionDriver<SimulatedRuntime, NullGraphics> {
        SessionDriver::new(
            SimulatedRuntime::new(),
            NullGraphics::new(),
            DriverConfig::default(),
        )
        .expect("setup should succeed")
    }

    #[test]
    fn setup_fixes_view_count_and_extent() {
        let driver = driver();
        assert_eq!(driver.view_count(), 2);
        assert_eq!(driver.extent(), [1024, 1024]);
        assert_eq!(driver.state(), SessionState::Idle);
    }

    #[test]
    fn setup_rejects_a_runtime_without_views() {
        let runtime = SimulatedRuntime::new().with_view_count(0);
        let result = SessionDriver::new(runtime, NullGraphics::new(), DriverConfig::default());
        assert!(matches!(result, Err(SessionError::NoViews)));
    }

    #[test]
    #[should_panic(expected = "frame_start called twice")]
    fn reentrant_frame_start_is_a_contract_violation() {
        let mut driver = driver();
        driver.frame_start().unwrap();
        let _ = driver.frame_start();
    }

    #[test]
    fn frame_end_without_a_frame_is_harmless() {
        let mut driver = driver();
        driver.frame_end().expect("nothing to submit");
        assert!(driver.runtime().submissions().is_empty());
    }

    #[test]
    fn config_parses_from_json() {
        let config = DriverConfig::from_json(
            r#"{"window": {"display_width": 1920, "display_height": 1080, "status_bar_height": 0}}"#,
        )
        .expect("valid config json");
        assert_eq!(config.near_clip, NEAR_CLIP);
        assert_eq!(config.window.display_width, 1920);
    }
}
