#![warn(clippy::unwrap_used)]

pub mod auth;
pub mod channel;
pub mod interests;
pub mod limits;
pub mod proto;
pub mod sources;

pub use channel::lazy_channel;
pub use interests::InterestsClient;
pub use limits::GrpcLimitsStore;
pub use sources::{directory, ActivityPubClient, FeedsClient, SitesClient, TelegramClient};
