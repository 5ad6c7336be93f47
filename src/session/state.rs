use crate::runtime::{RuntimeState, SessionEvent, XrError, XrRuntime};

/// Driver-side session state. `Visible` covers both the runtime's visible
/// and focused states; everything gated per-frame keys off this tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    Synchronized,
    Visible,
}

/// Lifecycle state machine driven by runtime events.
///
/// Transitions happen only here, at most one per event, and may issue
/// begin/end/destroy session calls as side effects. The `running` flag
/// guards against beginning a session twice or ending one that never
/// began, regardless of the event sequence the runtime delivers.
#[derive(Debug)]
pub struct StateMachine {
    state: SessionState,
    running: bool,
    alive: bool,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StateMachine {
    pub fn new() -> Self {
        Self {
            state: SessionState::Idle,
            running: false,
            alive: true,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// False once the session handle has been destroyed; no further
    /// runtime calls are legal.
    pub fn session_alive(&self) -> bool {
        self.alive
    }

    pub fn session_running(&self) -> bool {
        self.running
    }

    pub fn handle_event<R: XrRuntime>(
        &mut self,
        runtime: &mut R,
        event: SessionEvent,
    ) -> Result<(), XrError> {
        let SessionEvent::StateChanged(runtime_state) = event else {
            return Ok(());
        };
        if !self.alive {
            log::warn!("[session] event {runtime_state:?} after session destruction; ignored");
            return Ok(());
        }

        let previous = self.state;
        match runtime_state {
            RuntimeState::Idle => {
                self.state = SessionState::Idle;
            }
            RuntimeState::Ready => {
                if !self.running {
                    runtime.begin_session()?;
                    self.running = true;
                }
                self.state = SessionState::Idle;
            }
            RuntimeState::Synchronized => {
                self.state = SessionState::Synchronized;
            }
            RuntimeState::Visible | RuntimeState::Focused => {
                self.state = SessionState::Visible;
            }
            RuntimeState::Stopping => {
                if self.running {
                    runtime.end_session()?;
                    self.running = false;
                }
                self.state = SessionState::Idle;
            }
            RuntimeState::Exiting => {
                runtime.destroy_session()?;
                self.running = false;
                self.alive = false;
                self.state = SessionState::Idle;
            }
        }

        if previous != self.state {
            log::debug!("[session] state {previous:?} -> {:?} ({runtime_state:?})", self.state);
        }
        Ok(())
    }
}
