use crate::math;
use crate::runtime::{DisplayTime, SpaceHandle, ViewPose, XrError, XrRuntime};
use glam::Mat4;

/// Per-frame view locator: queries head pose/FOV for every view and turns
/// them into `projection × view` matrices for the renderer.
#[derive(Debug)]
pub struct ViewAggregator {
    space: SpaceHandle,
    view_count: usize,
    near: f32,
    far: f32,
    located: Vec<ViewPose>,
    view_projections: Vec<Mat4>,
}

impl ViewAggregator {
    pub fn new(space: SpaceHandle, view_count: usize, near: f32, far: f32) -> Self {
        Self {
            space,
            view_count,
            near,
            far,
            located: Vec::with_capacity(view_count),
            view_projections: vec![Mat4::IDENTITY; view_count],
        }
    }

    /// Locates all views at `time` and refreshes the stored matrices.
    /// The located count must match the view configuration fixed at setup.
    pub fn locate<R: XrRuntime>(
        &mut self,
        runtime: &mut R,
        time: DisplayTime,
    ) -> Result<(), XrError> {
        let views = runtime.locate_views(self.space, time)?;
        assert_eq!(
            views.len(),
            self.view_count,
            "runtime located {} views but the session was configured for {}",
            views.len(),
            self.view_count
        );

        for (slot, view) in self.view_projections.iter_mut().zip(views.iter()) {
            let projection = math::asymmetric_projection(view.fov, self.near, self.far);
            *slot = projection * math::view_matrix(&view.pose);
        }
        self.located = views;
        Ok(())
    }

    /// The poses/FOVs from the most recent locate, in view order.
    pub fn located(&self) -> &[ViewPose] {
        &self.located
    }

    pub fn view_projections(&self) -> &[Mat4] {
        &self.view_projections
    }

    /// Bridges the embedding renderer's own projection convention: per eye,
    /// `stored × scale(LEGACY_FRUSTUM_SCALE) × callerProjection⁻¹`.
    pub fn corrected_pair(&self, caller_projection: Mat4) -> [Mat4; 2] {
        assert!(
            self.view_projections.len() >= 2,
            "stereo bridge requires two views, session has {}",
            self.view_projections.len()
        );
        [
            math::rebase_view_projection(self.view_projections[0], caller_projection),
            math::rebase_view_projection(self.view_projections[1], caller_projection),
        ]
    }
}
