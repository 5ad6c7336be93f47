use xr_session::graphics::{GraphicsOp, NullGraphics};
use xr_session::runtime::{LifecycleCall, RuntimeState, SessionEvent, SimulatedRuntime};
use xr_session::{DriverConfig, SessionDriver, SessionState};

fn new_driver() -> SessionDriver<SimulatedRuntime, NullGraphics> {
    let _ = env_logger::builder().is_test(true).try_init();
    SessionDriver::new(
        SimulatedRuntime::new(),
        NullGraphics::new(),
        DriverConfig::default(),
    )
    .expect("driver setup")
}

fn queue(driver: &mut SessionDriver<SimulatedRuntime, NullGraphics>, state: RuntimeState) {
    driver
        .runtime_mut()
        .queue_event(SessionEvent::StateChanged(state));
}

fn run_to_visible(driver: &mut SessionDriver<SimulatedRuntime, NullGraphics>) {
    queue(driver, RuntimeState::Ready);
    queue(driver, RuntimeState::Synchronized);
    queue(driver, RuntimeState::Visible);
    driver.frame_start().expect("visible frame start");
    driver.frame_end().expect("visible frame end");
}

#[test]
fn scripted_lifecycle_submits_expected_layer_counts() {
    let mut driver = new_driver();

    let script = [
        RuntimeState::Idle,
        RuntimeState::Ready,
        RuntimeState::Synchronized,
        RuntimeState::Visible,
        RuntimeState::Stopping,
        RuntimeState::Idle,
    ];
    for state in script {
        queue(&mut driver, state);
        driver.frame_start().expect("frame start");
        driver.frame_end().expect("frame end");
    }

    assert_eq!(driver.runtime().layer_counts(), vec![0, 0, 0, 1, 0, 0]);
    assert_eq!(
        driver.runtime().lifecycle(),
        &[LifecycleCall::BeginSession, LifecycleCall::EndSession]
    );
}

#[test]
fn event_drain_walks_several_states_in_one_frame() {
    let mut driver = new_driver();

    // All three events arrive before a single frame; the frame runs with
    // the final state reached by the drain.
    queue(&mut driver, RuntimeState::Ready);
    queue(&mut driver, RuntimeState::Synchronized);
    queue(&mut driver, RuntimeState::Visible);
    driver.frame_start().unwrap();
    assert_eq!(driver.state(), SessionState::Visible);
    driver.frame_end().unwrap();

    assert_eq!(driver.runtime().layer_counts(), vec![1]);
    assert_eq!(driver.runtime().lifecycle(), &[LifecycleCall::BeginSession]);
}

#[test]
fn visible_frame_composites_the_swapchain_layout() {
    let mut driver = new_driver();
    run_to_visible(&mut driver);

    let color = driver.color_swapchain().handle();
    let depth = driver.depth_swapchain().handle();
    let submission = driver.runtime().last_submission().expect("one submission");

    assert_eq!(submission.layers.len(), 1);
    let layer = &submission.layers[0];
    assert_eq!(layer.views.len(), driver.view_count());
    for (index, view) in layer.views.iter().enumerate() {
        assert_eq!(view.color.swapchain, color);
        assert_eq!(view.depth.sub_image.swapchain, depth);
        assert_eq!(view.color.array_index, index as u32);
        assert_eq!(view.depth.sub_image.array_index, index as u32);
        assert_eq!(view.color.rect.extent, [1024, 1024]);
    }

    // Frame-start bound the render targets and cleared; frame-end blitted.
    let ops = driver.graphics().ops();
    assert!(ops
        .iter()
        .any(|op| matches!(op, GraphicsOp::BindTargets { .. })));
    assert!(ops
        .iter()
        .any(|op| matches!(op, GraphicsOp::PrepareRenderPass { extent: [1024, 1024] })));
    assert_eq!(driver.graphics().blit_count(), 1);
}

#[test]
fn visible_frame_records_located_poses_in_the_layer() {
    let mut driver = new_driver();
    run_to_visible(&mut driver);

    let submission = driver.runtime().last_submission().unwrap().clone();
    let views = &submission.layers[0].views;
    assert_ne!(views[0].pose.position, views[1].pose.position);
    assert_ne!(views[0].fov, views[1].fov);
    // Matrices were derived from the same locate call.
    assert_eq!(driver.raw_view_projections().len(), 2);
}

#[test]
fn failed_depth_acquire_abandons_the_frame_but_keeps_pairing() {
    let mut driver = new_driver();
    run_to_visible(&mut driver);

    let color = driver.color_swapchain().handle();
    let depth = driver.depth_swapchain().handle();
    driver.runtime_mut().fail_next_acquire(depth);

    queue(&mut driver, RuntimeState::Visible);
    driver.frame_start().expect_err("depth acquire should fail");
    driver.frame_end().expect("frame end still completes");

    // The color acquire was paired with a release and the mandatory
    // submission went out with zero layers.
    assert_eq!(
        driver.runtime().acquire_count(color),
        driver.runtime().release_count(color)
    );
    assert!(!driver.runtime().has_pending_acquire(color));
    assert!(!driver.runtime().has_pending_acquire(depth));
    assert_eq!(driver.runtime().layer_counts(), vec![1, 0]);

    // The next frame recovers fully.
    queue(&mut driver, RuntimeState::Visible);
    driver.frame_start().expect("recovered frame start");
    driver.frame_end().expect("recovered frame end");
    assert_eq!(driver.runtime().layer_counts(), vec![1, 0, 1]);
}

#[test]
fn incomplete_render_target_abandons_the_frame() {
    let mut driver = new_driver();
    run_to_visible(&mut driver);

    driver.graphics_mut().set_fail_completeness(true);
    driver.frame_start().expect_err("completeness check fails");
    driver.frame_end().expect("frame end still completes");

    let color = driver.color_swapchain().handle();
    let depth = driver.depth_swapchain().handle();
    assert!(!driver.runtime().has_pending_acquire(color));
    assert!(!driver.runtime().has_pending_acquire(depth));
    assert_eq!(driver.runtime().layer_counts(), vec![1, 0]);

    driver.graphics_mut().set_fail_completeness(false);
    driver.frame_start().expect("next frame start");
    driver.frame_end().expect("next frame end");
    assert_eq!(driver.runtime().layer_counts(), vec![1, 0, 1]);
}

#[test]
fn exiting_is_terminal() {
    let mut driver = new_driver();
    run_to_visible(&mut driver);

    queue(&mut driver, RuntimeState::Exiting);
    driver.frame_start().expect("terminal frame start");
    driver.frame_end().expect("terminal frame end");

    assert!(!driver.session_alive());
    assert!(driver.runtime().session_destroyed());
    // No pacing or submission once the handle is gone.
    assert_eq!(driver.runtime().layer_counts(), vec![1]);

    driver.frame_start().expect("still a no-op");
    driver.frame_end().expect("still a no-op");
    assert_eq!(driver.runtime().layer_counts(), vec![1]);
}

#[test]
fn corrected_view_projections_differ_per_eye() {
    let mut driver = new_driver();
    run_to_visible(&mut driver);

    let caller = glam::Mat4::perspective_rh_gl(1.0, 4.0 / 3.0, 0.01, 1000.0);
    let pair = driver.view_projections(caller);
    assert_ne!(pair[0], pair[1]);
    for matrix in pair {
        assert!(matrix.determinant().abs() > 0.0);
    }
}

#[test]
fn thousand_frame_soak_keeps_indices_and_pairing_stable() {
    let mut driver = new_driver();
    queue(&mut driver, RuntimeState::Ready);
    queue(&mut driver, RuntimeState::Visible);

    for _ in 0..1000 {
        driver.frame_start().expect("soak frame start");
        driver.frame_end().expect("soak frame end");
    }

    let color = driver.color_swapchain().handle();
    let depth = driver.depth_swapchain().handle();
    let runtime = driver.runtime();
    assert_eq!(runtime.acquire_count(color), 1000);
    assert_eq!(runtime.release_count(color), 1000);
    assert_eq!(runtime.acquire_count(depth), 1000);
    assert_eq!(runtime.release_count(depth), 1000);
    assert_eq!(runtime.submissions().len(), 1000);
    assert!(runtime.layer_counts().iter().all(|&count| count == 1));

    // Stereo configuration: two array layers per swapchain, and every
    // acquired index addressed an enumerated image (the swapchain manager
    // asserts the range on each acquire).
    let info = runtime.swapchain_info(color).expect("color info");
    assert_eq!(info.array_size, 2);
    assert_eq!(driver.color_swapchain().image_count(), 3);
}

#[test]
fn display_time_advances_monotonically() {
    let mut driver = new_driver();
    queue(&mut driver, RuntimeState::Ready);
    queue(&mut driver, RuntimeState::Visible);

    for _ in 0..5 {
        driver.frame_start().unwrap();
        driver.frame_end().unwrap();
    }

    let times: Vec<i64> = driver
        .runtime()
        .submissions()
        .iter()
        .map(|s| s.display_time.0)
        .collect();
    assert!(times.windows(2).all(|pair| pair[0] < pair[1]));
}
