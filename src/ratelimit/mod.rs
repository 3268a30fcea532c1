//! Rate limiting logic and state management.

mod backend;
mod key;
mod limiter;
mod policy;
mod registry;
mod store;
mod window;

pub use backend::CounterStore;
pub use key::WindowKey;
pub use limiter::{Admission, FailureMode, RateLimiter};
pub use policy::{LimiterPolicy, PolicyConfig, TimeUnit};
pub use registry::PolicyRegistry;
pub use store::{
    WindowDecision, WindowHandle, WindowStore, DEFAULT_IDLE_WINDOWS, DEFAULT_MAX_KEYS, MAX_SWEEP_INTERVAL,
};
pub use window::WindowState;
