#![warn(clippy::unwrap_used)]

pub mod error;
pub mod policy;
pub mod report;
pub mod resolve;
pub mod setter;

pub use error::LimitError;
pub use policy::{LimitPolicy, WindowPolicy};
pub use report::{LimitReport, Outcome, SkipReason, SkippedSource};
pub use resolve::{OwnerResolver, Resolved};
pub use setter::AdaptiveLimitSetter;
