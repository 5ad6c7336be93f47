//! Adapter mapping [`XrRuntime`] onto the `openxr` crate with an OpenGL
//! graphics binding. Instance/extension negotiation and the GL context are
//! the embedding application's job; it hands the platform binding in
//! through [`OpenXrRuntime::new`].

use super::{
    DisplayTime, FrameEndInfo, FrameState, Fov, ImageHandle, Pose, RuntimeState, SessionEvent,
    SpaceHandle, SwapchainCreateInfo, SwapchainFormat, SwapchainHandle, SwapchainUsage,
    ViewConfiguration, ViewPose, XrError, XrRuntime,
};
use glam::{Quat, Vec3};
use openxr as xr;
use openxr::sys;
use std::ptr;

const VIEW_TYPE: xr::ViewConfigurationType = xr::ViewConfigurationType::PRIMARY_STEREO;

const GL_SRGB8_ALPHA8: u32 = 0x8c43;
const GL_DEPTH_COMPONENT16: u32 = 0x81a5;

struct SessionHandles {
    session: xr::Session<xr::OpenGL>,
    frame_waiter: xr::FrameWaiter,
    frame_stream: xr::FrameStream<xr::OpenGL>,
    spaces: Vec<xr::Space>,
    swapchains: Vec<Option<xr::Swapchain<xr::OpenGL>>>,
}

pub struct OpenXrRuntime {
    instance: xr::Instance,
    system: xr::SystemId,
    blend_mode: xr::EnvironmentBlendMode,
    session: Option<SessionHandles>,
}

impl OpenXrRuntime {
    /// Creates the instance, system, and session. `session_create` carries
    /// the platform OpenGL binding the embedding application established.
    pub fn new(
        app_name: &str,
        session_create: &xr::opengl::SessionCreateInfo,
    ) -> Result<Self, XrError> {
        let entry = unsafe { xr::Entry::load() }
            .map_err(|err| XrError::runtime("xrCreateInstance", format!("loader: {err}")))?;

        let mut extensions = xr::ExtensionSet::default();
        extensions.khr_opengl_enable = true;
        extensions.khr_composition_layer_depth = true;

        let instance = entry
            .create_instance(
                &xr::ApplicationInfo {
                    application_name: app_name,
                    application_version: 0,
                    engine_name: "",
                    engine_version: 0,
                },
                &extensions,
                &[],
            )
            .map_err(|err| XrError::runtime("xrCreateInstance", format!("{err:?}")))?;

        let system = instance
            .system(xr::FormFactor::HEAD_MOUNTED_DISPLAY)
            .map_err(|err| XrError::runtime("xrGetSystem", format!("{err:?}")))?;

        // Mandatory before session creation; the GL context itself is the
        // embedder's responsibility.
        instance
            .graphics_requirements::<xr::OpenGL>(system)
            .map_err(|err| {
                XrError::runtime("xrGetOpenGLGraphicsRequirementsKHR", format!("{err:?}"))
            })?;

        let blend_mode = instance
            .enumerate_environment_blend_modes(system, VIEW_TYPE)
            .map_err(|err| XrError::runtime("xrEnumerateEnvironmentBlendModes", format!("{err:?}")))?
            .into_iter()
            .next()
            .unwrap_or(xr::EnvironmentBlendMode::OPAQUE);

        let (session, frame_waiter, frame_stream) = unsafe {
            instance
                .create_session::<xr::OpenGL>(system, session_create)
                .map_err(|err| XrError::runtime("xrCreateSession", format!("{err:?}")))?
        };

        Ok(Self {
            instance,
            system,
            blend_mode,
            session: Some(SessionHandles {
                session,
                frame_waiter,
                frame_stream,
                spaces: Vec::new(),
                swapchains: Vec::new(),
            }),
        })
    }

    fn handles_mut(&mut self) -> Result<&mut SessionHandles, XrError> {
        self.session
            .as_mut()
            .ok_or_else(|| XrError::runtime("xrSession", "session already destroyed"))
    }

    fn swapchain(
        handles: &mut SessionHandles,
        handle: SwapchainHandle,
    ) -> Result<&mut xr::Swapchain<xr::OpenGL>, XrError> {
        handles
            .swapchains
            .get_mut(handle.0 as usize)
            .and_then(Option::as_mut)
            .ok_or_else(|| XrError::runtime("xrSwapchain", "unknown or destroyed swapchain"))
    }
}

fn map_event(event: xr::Event<'_>) -> SessionEvent {
    match event {
        xr::Event::SessionStateChanged(change) => {
            let state = match change.state() {
                xr::SessionState::IDLE => RuntimeState::Idle,
                xr::SessionState::READY => RuntimeState::Ready,
                xr::SessionState::SYNCHRONIZED => RuntimeState::Synchronized,
                xr::SessionState::VISIBLE => RuntimeState::Visible,
                xr::SessionState::FOCUSED => RuntimeState::Focused,
                xr::SessionState::STOPPING => RuntimeState::Stopping,
                xr::SessionState::EXITING => RuntimeState::Exiting,
                _ => return SessionEvent::Other,
            };
            SessionEvent::StateChanged(state)
        }
        _ => SessionEvent::Other,
    }
}

fn pose_from_xr(pose: xr::Posef) -> Pose {
    Pose {
        orientation: Quat::from_xyzw(
            pose.orientation.x,
            pose.orientation.y,
            pose.orientation.z,
            pose.orientation.w,
        ),
        position: Vec3::new(pose.position.x, pose.position.y, pose.position.z),
    }
}

fn fov_from_xr(fov: xr::Fovf) -> Fov {
    Fov {
        angle_left: fov.angle_left,
        angle_right: fov.angle_right,
        angle_up: fov.angle_up,
        angle_down: fov.angle_down,
    }
}

fn posef_to_xr(pose: &Pose) -> xr::Posef {
    xr::Posef {
        orientation: xr::Quaternionf {
            x: pose.orientation.x,
            y: pose.orientation.y,
            z: pose.orientation.z,
            w: pose.orientation.w,
        },
        position: xr::Vector3f {
            x: pose.position.x,
            y: pose.position.y,
            z: pose.position.z,
        },
    }
}

fn fov_to_xr(fov: &Fov) -> xr::Fovf {
    xr::Fovf {
        angle_left: fov.angle_left,
        angle_right: fov.angle_right,
        angle_up: fov.angle_up,
        angle_down: fov.angle_down,
    }
}

fn rect_to_xr(rect: &super::Rect2D) -> sys::Rect2Di {
    sys::Rect2Di {
        offset: sys::Offset2Di {
            x: rect.offset[0],
            y: rect.offset[1],
        },
        extent: sys::Extent2Di {
            width: rect.extent[0],
            height: rect.extent[1],
        },
    }
}

impl XrRuntime for OpenXrRuntime {
    fn view_configurations(&mut self) -> Result<Vec<ViewConfiguration>, XrError> {
        let views = self
            .instance
            .enumerate_view_configuration_views(self.system, VIEW_TYPE)
            .map_err(|err| {
                XrError::runtime("xrEnumerateViewConfigurationViews", format!("{err:?}"))
            })?;
        Ok(views
            .into_iter()
            .map(|view| ViewConfiguration {
                recommended_width: view.recommended_image_rect_width,
                recommended_height: view.recommended_image_rect_height,
            })
            .collect())
    }

    fn create_reference_space(&mut self) -> Result<SpaceHandle, XrError> {
        let handles = self.handles_mut()?;
        let space = handles
            .session
            .create_reference_space(xr::ReferenceSpaceType::LOCAL, xr::Posef::IDENTITY)
            .map_err(|err| XrError::runtime("xrCreateReferenceSpace", format!("{err:?}")))?;
        handles.spaces.push(space);
        Ok(SpaceHandle(handles.spaces.len() as u64 - 1))
    }

    fn poll_event(&mut self) -> Result<Option<SessionEvent>, XrError> {
        let mut buffer = xr::EventDataBuffer::new();
        let event = self
            .instance
            .poll_event(&mut buffer)
            .map_err(|err| XrError::runtime("xrPollEvent", format!("{err:?}")))?;
        Ok(event.map(map_event))
    }

    fn begin_session(&mut self) -> Result<(), XrError> {
        self.handles_mut()?
            .session
            .begin(VIEW_TYPE)
            .map(|_| ())
            .map_err(|err| XrError::runtime("xrBeginSession", format!("{err:?}")))
    }

    fn end_session(&mut self) -> Result<(), XrError> {
        self.handles_mut()?
            .session
            .end()
            .map(|_| ())
            .map_err(|err| XrError::runtime("xrEndSession", format!("{err:?}")))
    }

    fn destroy_session(&mut self) -> Result<(), XrError> {
        // Dropping the handles destroys the session and everything owned
        // by it.
        self.session
            .take()
            .map(drop)
            .ok_or_else(|| XrError::runtime("xrDestroySession", "session already destroyed"))
    }

    fn wait_frame(&mut self) -> Result<FrameState, XrError> {
        let state = self
            .handles_mut()?
            .frame_waiter
            .wait()
            .map_err(|err| XrError::runtime("xrWaitFrame", format!("{err:?}")))?;
        Ok(FrameState {
            predicted_display_time: DisplayTime(state.predicted_display_time.as_nanos()),
        })
    }

    fn begin_frame(&mut self) -> Result<(), XrError> {
        self.handles_mut()?
            .frame_stream
            .begin()
            .map_err(|err| XrError::runtime("xrBeginFrame", format!("{err:?}")))
    }

    fn end_frame(&mut self, info: &FrameEndInfo) -> Result<(), XrError> {
        let blend_mode = self.blend_mode;
        let fp_end_frame = self.instance.fp().end_frame;
        let handles = self.handles_mut()?;

        // The depth sub-images ride the projection views as a
        // KHR_composition_layer_depth next chain, which the high-level
        // builders do not express; assemble the raw structures instead.
        let mut layers = Vec::with_capacity(info.layers.len());
        let mut view_storage = Vec::with_capacity(info.layers.len());
        let mut depth_storage = Vec::with_capacity(info.layers.len());
        for layer in &info.layers {
            let depths: Vec<sys::CompositionLayerDepthInfoKHR> = layer
                .views
                .iter()
                .map(|view| -> Result<_, XrError> {
                    let depth_chain = Self::swapchain(handles, view.depth.sub_image.swapchain)?;
                    Ok(sys::CompositionLayerDepthInfoKHR {
                        ty: sys::CompositionLayerDepthInfoKHR::TYPE,
                        next: ptr::null(),
                        sub_image: sys::SwapchainSubImage {
                            swapchain: depth_chain.as_raw(),
                            image_rect: rect_to_xr(&view.depth.sub_image.rect),
                            image_array_index: view.depth.sub_image.array_index,
                        },
                        min_depth: view.depth.min_depth,
                        max_depth: view.depth.max_depth,
                        near_z: view.depth.near_z,
                        far_z: view.depth.far_z,
                    })
                })
                .collect::<Result<_, _>>()?;
            depth_storage.push(depths);
            let depths = depth_storage.last().expect("just pushed");

            let views: Vec<sys::CompositionLayerProjectionView> = layer
                .views
                .iter()
                .zip(depths.iter())
                .map(|(view, depth)| -> Result<_, XrError> {
                    let color_chain = Self::swapchain(handles, view.color.swapchain)?;
                    Ok(sys::CompositionLayerProjectionView {
                        ty: sys::CompositionLayerProjectionView::TYPE,
                        next: depth as *const _ as *const _,
                        pose: posef_to_xr(&view.pose),
                        fov: fov_to_xr(&view.fov),
                        sub_image: sys::SwapchainSubImage {
                            swapchain: color_chain.as_raw(),
                            image_rect: rect_to_xr(&view.color.rect),
                            image_array_index: view.color.array_index,
                        },
                    })
                })
                .collect::<Result<_, _>>()?;
            view_storage.push(views);
            let views = view_storage.last().expect("just pushed");

            let space = handles
                .spaces
                .get(layer.space.0 as usize)
                .ok_or_else(|| XrError::runtime("xrEndFrame", "unknown reference space"))?;
            layers.push(sys::CompositionLayerProjection {
                ty: sys::CompositionLayerProjection::TYPE,
                next: ptr::null(),
                layer_flags: sys::CompositionLayerFlags::EMPTY,
                space: space.as_raw(),
                view_count: views.len() as u32,
                views: views.as_ptr(),
            });
        }

        let headers: Vec<*const sys::CompositionLayerBaseHeader> = layers
            .iter()
            .map(|layer| layer as *const _ as *const sys::CompositionLayerBaseHeader)
            .collect();
        let frame_end = sys::FrameEndInfo {
            ty: sys::FrameEndInfo::TYPE,
            next: ptr::null(),
            display_time: sys::Time::from_nanos(info.display_time.0),
            environment_blend_mode: blend_mode,
            layer_count: headers.len() as u32,
            layers: if headers.is_empty() {
                ptr::null()
            } else {
                headers.as_ptr()
            },
        };

        let result = unsafe { (fp_end_frame)(handles.session.as_raw(), &frame_end) };
        if result.into_raw() < 0 {
            return Err(XrError::runtime("xrEndFrame", format!("{result:?}")));
        }
        Ok(())
    }

    fn locate_views(
        &mut self,
        space: SpaceHandle,
        time: DisplayTime,
    ) -> Result<Vec<ViewPose>, XrError> {
        let handles = self.handles_mut()?;
        let space = handles
            .spaces
            .get(space.0 as usize)
            .ok_or_else(|| XrError::runtime("xrLocateViews", "unknown reference space"))?;
        let (_flags, views) = handles
            .session
            .locate_views(VIEW_TYPE, sys::Time::from_nanos(time.0), space)
            .map_err(|err| XrError::runtime("xrLocateViews", format!("{err:?}")))?;
        Ok(views
            .into_iter()
            .map(|view| ViewPose {
                pose: pose_from_xr(view.pose),
                fov: fov_from_xr(view.fov),
            })
            .collect())
    }

    fn create_swapchain(
        &mut self,
        info: &SwapchainCreateInfo,
    ) -> Result<(SwapchainHandle, Vec<ImageHandle>), XrError> {
        let handles = self.handles_mut()?;
        let usage = match info.usage {
            SwapchainUsage::ColorAttachment => xr::SwapchainUsageFlags::COLOR_ATTACHMENT,
            SwapchainUsage::DepthStencilAttachment => {
                xr::SwapchainUsageFlags::DEPTH_STENCIL_ATTACHMENT
            }
        };
        let format = match info.format {
            SwapchainFormat::Srgb8Alpha8 => GL_SRGB8_ALPHA8,
            SwapchainFormat::Depth16 => GL_DEPTH_COMPONENT16,
        };
        let swapchain = handles
            .session
            .create_swapchain(&xr::SwapchainCreateInfo {
                create_flags: xr::SwapchainCreateFlags::EMPTY,
                usage_flags: usage,
                format,
                sample_count: 1,
                width: info.width,
                height: info.height,
                face_count: 1,
                array_size: info.array_size,
                mip_count: 1,
            })
            .map_err(|err| XrError::runtime("xrCreateSwapchain", format!("{err:?}")))?;
        let images = swapchain
            .enumerate_images()
            .map_err(|err| XrError::runtime("xrEnumerateSwapchainImages", format!("{err:?}")))?
            .into_iter()
            .map(|image| image as ImageHandle)
            .collect();

        handles.swapchains.push(Some(swapchain));
        Ok((
            SwapchainHandle(handles.swapchains.len() as u64 - 1),
            images,
        ))
    }

    fn acquire_image(&mut self, swapchain: SwapchainHandle) -> Result<u32, XrError> {
        let handles = self.handles_mut()?;
        let chain = Self::swapchain(handles, swapchain)?;
        let index = chain
            .acquire_image()
            .map_err(|err| XrError::runtime("xrAcquireSwapchainImage", format!("{err:?}")))?;
        chain
            .wait_image(xr::Duration::INFINITE)
            .map_err(|err| XrError::runtime("xrWaitSwapchainImage", format!("{err:?}")))?;
        Ok(index)
    }

    fn release_image(&mut self, swapchain: SwapchainHandle) -> Result<(), XrError> {
        let handles = self.handles_mut()?;
        Self::swapchain(handles, swapchain)?
            .release_image()
            .map_err(|err| XrError::runtime("xrReleaseSwapchainImage", format!("{err:?}")))
    }

    fn destroy_swapchain(&mut self, swapchain: SwapchainHandle) -> Result<(), XrError> {
        let handles = self.handles_mut()?;
        handles
            .swapchains
            .get_mut(swapchain.0 as usize)
            .and_then(Option::take)
            .map(drop)
            .ok_or_else(|| XrError::runtime("xrDestroySwapchain", "unknown or destroyed swapchain"))
    }
}
