use crate::runtime::{
    ImageHandle, SwapchainCreateInfo, SwapchainHandle, XrError, XrRuntime,
};

/// One runtime swapchain plus its cached backing images and the
/// acquire/release pairing state for the current frame.
///
/// Images are enumerated exactly once at creation; an acquired index is
/// only meaningful until the matching release within the same frame.
#[derive(Debug)]
pub struct Swapchain {
    handle: SwapchainHandle,
    images: Vec<ImageHandle>,
    acquired: Option<u32>,
}

impl Swapchain {
    pub fn create<R: XrRuntime>(
        runtime: &mut R,
        info: &SwapchainCreateInfo,
    ) -> Result<Self, XrError> {
        let (handle, images) = runtime.create_swapchain(info)?;
        log::debug!(
            "[swapchain] created {:?}: {}x{}x{} with {} images",
            handle,
            info.width,
            info.height,
            info.array_size,
            images.len()
        );
        Ok(Self {
            handle,
            images,
            acquired: None,
        })
    }

    pub fn handle(&self) -> SwapchainHandle {
        self.handle
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    pub fn is_acquired(&self) -> bool {
        self.acquired.is_some()
    }

    /// Image backing the currently-acquired index. Only valid between
    /// acquire and release.
    pub fn current_image(&self) -> Option<ImageHandle> {
        self.acquired.map(|index| self.images[index as usize])
    }

    /// Blocks until the runtime hands out an image. At most one acquire
    /// may be outstanding; violating the pairing is a caller bug.
    pub fn acquire<R: XrRuntime>(&mut self, runtime: &mut R) -> Result<u32, XrError> {
        assert!(
            self.acquired.is_none(),
            "swapchain {:?} acquired twice without a release",
            self.handle
        );
        let index = runtime.acquire_image(self.handle)?;
        assert!(
            (index as usize) < self.images.len(),
            "swapchain {:?} returned image index {} outside its {} enumerated images",
            self.handle,
            index,
            self.images.len()
        );
        self.acquired = Some(index);
        Ok(index)
    }

    /// Releases the outstanding image. Exactly one release per acquire.
    pub fn release<R: XrRuntime>(&mut self, runtime: &mut R) -> Result<(), XrError> {
        assert!(
            self.acquired.take().is_some(),
            "swapchain {:?} released without an acquire",
            self.handle
        );
        runtime.release_image(self.handle)
    }

    pub fn destroy<R: XrRuntime>(&mut self, runtime: &mut R) -> Result<(), XrError> {
        runtime.destroy_swapchain(self.handle)
    }
}
