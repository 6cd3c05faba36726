//! Rate limiting logic and state management.

mod catalog;
mod counter;
mod guard;
mod limiter;
mod policy;
mod sweeper;

pub use catalog::{PolicyCatalog, PolicyName};
pub use counter::WindowCounter;
pub use guard::{with_rate_limit, RateLimited};
pub use limiter::{Decision, RateLimiter};
pub use policy::Policy;
pub use sweeper::{CleanupSweeper, DEFAULT_CLEANUP_INTERVAL};
