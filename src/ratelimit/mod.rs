//! Rate limiting logic and state management.

mod bucket;
mod clock;
mod key;
mod limiter;
mod sweeper;

pub use bucket::TokenBucket;
pub use clock::{Clock, ManualClock, SystemClock};
pub use key::{ClientKey, ANONYMOUS_KEY};
pub use limiter::{AdmissionControl, Decision, LimitConfig, RateLimiter, Rejection};
pub use sweeper::{spawn_sweeper, SweeperConfig};
