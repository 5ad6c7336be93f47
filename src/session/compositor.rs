use super::swapchain::Swapchain;
use crate::runtime::{
    CompositionLayer, DepthSubImage, DisplayTime, FrameEndInfo, ProjectionView, Rect2D,
    SpaceHandle, SubImage, ViewPose,
};

/// Assembles the composition layer submitted at frame end.
///
/// The per-view descriptors (sub-image rects, array indices, depth ranges)
/// are fixed at setup to exactly mirror the swapchain array layout; only
/// the pose/FOV fields are refreshed each visible frame.
#[derive(Debug)]
pub struct Compositor {
    space: SpaceHandle,
    views: Vec<ProjectionView>,
}

impl Compositor {
    pub fn new(
        space: SpaceHandle,
        color: &Swapchain,
        depth: &Swapchain,
        extent: [u32; 2],
        view_count: usize,
        near: f32,
        far: f32,
    ) -> Self {
        let rect = Rect2D {
            offset: [0, 0],
            extent: [extent[0] as i32, extent[1] as i32],
        };
        let views = (0..view_count)
            .map(|index| ProjectionView {
                pose: Default::default(),
                fov: Default::default(),
                color: SubImage {
                    swapchain: color.handle(),
                    rect,
                    array_index: index as u32,
                },
                depth: DepthSubImage {
                    sub_image: SubImage {
                        swapchain: depth.handle(),
                        rect,
                        array_index: index as u32,
                    },
                    min_depth: 0.0,
                    max_depth: 1.0,
                    near_z: near,
                    far_z: far,
                },
            })
            .collect();
        Self { space, views }
    }

    pub fn view_count(&self) -> usize {
        self.views.len()
    }

    /// Copies the frame's located pose/FOV into each descriptor. Must run
    /// after rendering, before submission.
    pub fn record_views(&mut self, located: &[ViewPose]) {
        assert_eq!(
            located.len(),
            self.views.len(),
            "located view count diverged from the composition layout"
        );
        for (descriptor, view) in self.views.iter_mut().zip(located) {
            descriptor.pose = view.pose;
            descriptor.fov = view.fov;
        }
    }

    /// One projection layer stamped with the frame's display time.
    pub fn visible_frame(&self, display_time: DisplayTime) -> FrameEndInfo {
        FrameEndInfo {
            display_time,
            layers: vec![CompositionLayer {
                space: self.space,
                views: self.views.clone(),
            }],
        }
    }

    /// Zero layers; submitted while the session is not visible.
    pub fn empty_frame(&self, display_time: DisplayTime) -> FrameEndInfo {
        FrameEndInfo {
            display_time,
            layers: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::{FAR_CLIP, NEAR_CLIP};
    use crate::runtime::{
        SimulatedRuntime, SwapchainCreateInfo, SwapchainFormat, SwapchainUsage, XrRuntime,
    };

    fn build() -> (SimulatedRuntime, Compositor) {
        let mut runtime = SimulatedRuntime::new();
        let color = Swapchain::create(
            &mut runtime,
            &SwapchainCreateInfo {
                usage: SwapchainUsage::ColorAttachment,
                format: SwapchainFormat::Srgb8Alpha8,
                width: 1024,
                height: 1024,
                array_size: 2,
            },
        )
        .unwrap();
        let depth = Swapchain::create(
            &mut runtime,
            &SwapchainCreateInfo {
                usage: SwapchainUsage::DepthStencilAttachment,
                format: SwapchainFormat::Depth16,
                width: 1024,
                height: 1024,
                array_size: 2,
            },
        )
        .unwrap();
        let compositor = Compositor::new(
            SpaceHandle(1),
            &color,
            &depth,
            [1024, 1024],
            2,
            NEAR_CLIP,
            FAR_CLIP,
        );
        (runtime, compositor)
    }

    #[test]
    fn descriptors_mirror_the_swapchain_layout() {
        let (_, compositor) = build();
        let frame = compositor.visible_frame(DisplayTime(7));

        assert_eq!(frame.layers.len(), 1);
        let layer = &frame.layers[0];
        assert_eq!(layer.views.len(), 2);
        for (index, view) in layer.views.iter().enumerate() {
            assert_eq!(view.color.array_index, index as u32);
            assert_eq!(view.depth.sub_image.array_index, index as u32);
            assert_eq!(view.color.rect.extent, [1024, 1024]);
            assert_eq!(view.depth.near_z, NEAR_CLIP);
            assert_eq!(view.depth.far_z, FAR_CLIP);
        }
    }

    #[test]
    fn record_views_refreshes_pose_and_fov_only() {
        let (mut runtime, mut compositor) = build();
        let located = runtime
            .locate_views(SpaceHandle(1), DisplayTime(1))
            .unwrap();
        let before = compositor.visible_frame(DisplayTime(1));

        compositor.record_views(&located);
        let after = compositor.visible_frame(DisplayTime(1));

        let view = &after.layers[0].views[0];
        assert_eq!(view.pose, located[0].pose);
        assert_eq!(view.fov, located[0].fov);
        // Sub-images never change after setup.
        assert_eq!(view.color, before.layers[0].views[0].color);
        assert_eq!(
            view.depth.sub_image,
            before.layers[0].views[0].depth.sub_image
        );
    }

    #[test]
    fn empty_frame_carries_no_layers() {
        let (_, compositor) = build();
        let frame = compositor.empty_frame(DisplayTime(3));
        assert!(frame.layers.is_empty());
        assert_eq!(frame.display_time, DisplayTime(3));
    }
}
