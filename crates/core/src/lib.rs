pub mod config;
pub mod error;
pub mod interests;
pub mod limits;
pub mod query;
pub mod sources;
pub mod types;

pub use config::AppConfig;
pub use error::{ClientError, GatewayError, LimitsError, QueryError};
pub use interests::{InterestSummary, InterestsDirectory};
pub use limits::LimitsStore;
pub use query::MetricsQuery;
pub use sources::{Owner, SourceDirectory, SourceKind, SourceRegistrar, SourceResolver};
pub use types::{Limit, Subject, Window};
