//! Graphics capability boundary.
//!
//! The driver never talks to a graphics API directly; it issues the handful
//! of framebuffer/viewport/blit operations it needs through
//! [`GraphicsDevice`]. The embedding renderer supplies a real
//! implementation; [`NullGraphics`] records the calls for tests and
//! headless runs.

use crate::runtime::ImageHandle;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GraphicsError {
    #[error("framebuffer incomplete (status {status:#x})")]
    IncompleteFramebuffer { status: u32 },
    #[error("graphics backend failure: {0}")]
    Backend(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FramebufferId(pub u32);

/// Read-only window description consumed by the frame-end blit. The
/// rendered image is letterboxed into the visible region, offset vertically
/// by the status bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowSettings {
    pub display_width: u32,
    pub display_height: u32,
    pub status_bar_height: i32,
}

impl Default for WindowSettings {
    fn default() -> Self {
        Self {
            display_width: 640,
            display_height: 480,
            status_bar_height: 0,
        }
    }
}

impl WindowSettings {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Framebuffer primitives the driver needs from the embedding renderer.
pub trait GraphicsDevice {
    fn create_framebuffer(&mut self) -> Result<FramebufferId, GraphicsError>;

    /// Attaches the acquired color and depth images to `framebuffer` and
    /// verifies completeness before any rendering happens.
    fn bind_render_targets(
        &mut self,
        framebuffer: FramebufferId,
        color: ImageHandle,
        depth: ImageHandle,
    ) -> Result<(), GraphicsError>;

    /// Configures the render pass for one eye-buffer frame: zero-to-one
    /// depth range, viewport and scissor at `extent`, color cleared to
    /// black and depth cleared to 0 (reversed depth).
    fn prepare_render_pass(&mut self, extent: [u32; 2]);

    /// Re-applies the eye-buffer viewport and scissor mid-frame.
    fn set_render_viewport(&mut self, extent: [u32; 2]);

    /// Blits the finished eye buffer into the window's visible region.
    fn blit_to_window(
        &mut self,
        framebuffer: FramebufferId,
        src_extent: [u32; 2],
        window: &WindowSettings,
    );
}

/// Record of one call a [`NullGraphics`] device received.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphicsOp {
    CreateFramebuffer(FramebufferId),
    BindTargets {
        framebuffer: FramebufferId,
        color: ImageHandle,
        depth: ImageHandle,
    },
    PrepareRenderPass {
        extent: [u32; 2],
    },
    SetViewport {
        extent: [u32; 2],
    },
    Blit {
        src_extent: [u32; 2],
        dst_extent: [u32; 2],
        dst_offset_y: i32,
    },
}

/// Recording graphics device. Completeness checks can be made to fail to
/// exercise the driver's abandoned-frame path.
#[derive(Debug, Default)]
pub struct NullGraphics {
    next_framebuffer: u32,
    ops: Vec<GraphicsOp>,
    fail_completeness: bool,
}

impl NullGraphics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent completeness check fail.
    pub fn with_incomplete_framebuffers(mut self) -> Self {
        self.fail_completeness = true;
        self
    }

    pub fn set_fail_completeness(&mut self, fail: bool) {
        self.fail_completeness = fail;
    }

    pub fn ops(&self) -> &[GraphicsOp] {
        &self.ops
    }

    pub fn blit_count(&self) -> usize {
        self.ops
            .iter()
            .filter(|op| matches!(op, GraphicsOp::Blit { .. }))
            .count()
    }
}

impl GraphicsDevice for NullGraphics {
    fn create_framebuffer(&mut self) -> Result<FramebufferId, GraphicsError> {
        self.next_framebuffer += 1;
        let id = FramebufferId(self.next_framebuffer);
        self.ops.push(GraphicsOp::CreateFramebuffer(id));
        Ok(id)
    }

    fn bind_render_targets(
        &mut self,
        framebuffer: FramebufferId,
        color: ImageHandle,
        depth: ImageHandle,
    ) -> Result<(), GraphicsError> {
        self.ops.push(GraphicsOp::BindTargets {
            framebuffer,
            color,
            depth,
        });
        if self.fail_completeness {
            return Err(GraphicsError::IncompleteFramebuffer { status: 0x8cd6 });
        }
        Ok(())
    }

    fn prepare_render_pass(&mut self, extent: [u32; 2]) {
        self.ops.push(GraphicsOp::PrepareRenderPass { extent });
    }

    fn set_render_viewport(&mut self, extent: [u32; 2]) {
        self.ops.push(GraphicsOp::SetViewport { extent });
    }

    fn blit_to_window(
        &mut self,
        _framebuffer: FramebufferId,
        src_extent: [u32; 2],
        window: &WindowSettings,
    ) {
        self.ops.push(GraphicsOp::Blit {
            src_extent,
            dst_extent: [window.display_width, window.display_height],
            dst_offset_y: window.status_bar_height,
        });
    }
}
