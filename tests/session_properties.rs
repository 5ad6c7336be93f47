use proptest::prelude::*;
use xr_session::graphics::NullGraphics;
use xr_session::runtime::{
    LifecycleCall, RuntimeState, SessionEvent, SimulatedRuntime,
};
use xr_session::{DriverConfig, SessionDriver, SessionState};

fn runtime_state() -> impl Strategy<Value = RuntimeState> {
    prop_oneof![
        Just(RuntimeState::Idle),
        Just(RuntimeState::Ready),
        Just(RuntimeState::Synchronized),
        Just(RuntimeState::Visible),
        Just(RuntimeState::Focused),
        Just(RuntimeState::Stopping),
        Just(RuntimeState::Exiting),
    ]
}

/// Checks the begin/end/destroy alternation: a begin only from the
/// not-running state, an end only from the running state, and nothing
/// after a destroy.
fn assert_lifecycle_well_formed(calls: &[LifecycleCall]) {
    let mut running = false;
    let mut destroyed = false;
    for call in calls {
        assert!(!destroyed, "lifecycle call {call:?} after destroy");
        match call {
            LifecycleCall::BeginSession => {
                assert!(!running, "begin-session issued twice without an end");
                running = true;
            }
            LifecycleCall::EndSession => {
                assert!(running, "end-session issued on a session never begun");
                running = false;
            }
            LifecycleCall::DestroySession => destroyed = true,
        }
    }
}

proptest! {
    // One event per frame, arbitrary order: the driver must never issue an
    // ill-formed lifecycle call sequence and must submit exactly one
    // frame-end per frame while the session handle is alive, with layer
    // count 1 exactly in the Visible state.
    #[test]
    fn arbitrary_event_sequences_keep_the_session_consistent(
        events in proptest::collection::vec(runtime_state(), 1..40)
    ) {
        let mut driver = SessionDriver::new(
            SimulatedRuntime::new(),
            NullGraphics::new(),
            DriverConfig::default(),
        )
        .expect("driver setup");

        let mut expected_submissions = 0usize;
        for state in events {
            driver
                .runtime_mut()
                .queue_event(SessionEvent::StateChanged(state));
            driver.frame_start().expect("frame start");
            let alive = driver.session_alive();
            let visible = driver.state() == SessionState::Visible;
            driver.frame_end().expect("frame end");

            if alive {
                expected_submissions += 1;
                let counts = driver.runtime().layer_counts();
                prop_assert_eq!(counts.len(), expected_submissions);
                let last = *counts.last().expect("at least one submission");
                prop_assert_eq!(last, usize::from(visible));
            }
        }

        assert_lifecycle_well_formed(driver.runtime().lifecycle());
    }

    // Acquire/release pairing survives arbitrary interleavings of visible
    // frames and injected acquire faults.
    #[test]
    fn pairing_holds_under_random_acquire_faults(
        faults in proptest::collection::vec(any::<bool>(), 1..60)
    ) {
        let mut driver = SessionDriver::new(
            SimulatedRuntime::new(),
            NullGraphics::new(),
            DriverConfig::default(),
        )
        .expect("driver setup");
        driver
            .runtime_mut()
            .queue_event(SessionEvent::StateChanged(RuntimeState::Ready));
        driver
            .runtime_mut()
            .queue_event(SessionEvent::StateChanged(RuntimeState::Visible));

        let depth = driver.depth_swapchain().handle();
        for inject in faults {
            if inject {
                driver.runtime_mut().fail_next_acquire(depth);
            }
            let started = driver.frame_start();
            prop_assert_eq!(started.is_err(), inject);
            driver.frame_end().expect("frame end");

            let color = driver.color_swapchain().handle();
            prop_assert!(!driver.runtime().has_pending_acquire(color));
            prop_assert!(!driver.runtime().has_pending_acquire(depth));
            prop_assert_eq!(
                driver.runtime().acquire_count(color),
                driver.runtime().release_count(color)
            );
            prop_assert_eq!(
                driver.runtime().acquire_count(depth),
                driver.runtime().release_count(depth)
            );
        }
    }
}
