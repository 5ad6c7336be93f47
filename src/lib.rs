//! Head-mounted-display session driver: negotiates session state with an
//! XR runtime, runs the per-frame acquire/render/submit cycle, and derives
//! the view and projection transforms the embedding renderer needs.

pub mod graphics;
pub mod math;
pub mod runtime;
pub mod session;

pub use session::{DriverConfig, SessionDriver, SessionState};
