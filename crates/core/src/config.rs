use crate::error::GatewayError;
use crate::sources::SourceKind;
use crate::types::Window;
use serde::Deserialize;

/// Root application configuration. Loaded from an optional config file and
/// environment variables with the prefix `METRICS_GATEWAY__`.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub prometheus: PrometheusConfig,
    #[serde(default)]
    pub sources: SourcesConfig,
    #[serde(default = "default_interests_endpoint")]
    pub interests: ServiceEndpoint,
    #[serde(default = "default_usage_endpoint")]
    pub usage: ServiceEndpoint,
    #[serde(default)]
    pub limits: LimitsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_grpc_port")]
    pub grpc_port: u16,
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    /// Upper bound of concurrent upstream calls made by one report request.
    #[serde(default = "default_fanout_limit")]
    pub fanout_limit: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PrometheusConfig {
    #[serde(default = "default_prometheus_uri")]
    pub uri: String,
    #[serde(default = "default_query_timeout_ms")]
    pub timeout_ms: u64,
}

/// Address and connection settings of an upstream gRPC service.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceEndpoint {
    pub uri: String,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,
}

impl ServiceEndpoint {
    pub fn new(uri: &str) -> Self {
        Self {
            uri: uri.to_string(),
            connect_timeout_ms: default_connect_timeout_ms(),
            keep_alive_secs: default_keep_alive_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourcesConfig {
    #[serde(default = "default_feeds_endpoint")]
    pub feeds: ServiceEndpoint,
    #[serde(default = "default_sites_endpoint")]
    pub sites: ServiceEndpoint,
    #[serde(default = "default_telegram_endpoint")]
    pub telegram: ServiceEndpoint,
    #[serde(default = "default_activitypub_endpoint")]
    pub activitypub: ServiceEndpoint,
    #[serde(default)]
    pub resolution: ResolutionConfig,
}

/// Order in which source identifiers are matched against the resolvers.
#[derive(Debug, Clone, Deserialize)]
pub struct ResolutionConfig {
    /// Identifiers starting with one of these prefixes go straight to the
    /// rule's resolver, with the prefix stripped.
    #[serde(default = "default_prefix_rules")]
    pub prefixes: Vec<PrefixRule>,
    /// Resolvers tried in order for identifiers without a known prefix.
    #[serde(default = "default_fallback")]
    pub fallback: Vec<SourceKind>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PrefixRule {
    pub prefix: String,
    pub kind: SourceKind,
}

/// Publish quota bounds per governed window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct PublishBounds {
    pub hourly: i64,
    pub daily: i64,
}

impl PublishBounds {
    pub fn for_window(&self, window: Window) -> Option<i64> {
        match window {
            Window::Hour => Some(self.hourly),
            Window::Day => Some(self.daily),
            Window::Min5 | Window::Month => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    /// Tenant groups; the first one owns auto-registered sources.
    #[serde(default)]
    pub default_groups: Vec<String>,
    /// Minimum quota every active source gets.
    #[serde(default = "default_publish_min")]
    pub default_user: PublishBounds,
    /// Quota added at a 100% share of the read traffic.
    #[serde(default = "default_publish_max")]
    pub max_user: PublishBounds,
    #[serde(default = "default_windows")]
    pub windows: Vec<Window>,
    #[serde(default = "default_limit_ttl_secs")]
    pub ttl_secs: u64,
    #[serde(default = "default_refresh_threshold_secs")]
    pub refresh_threshold_secs: u64,
    #[serde(default = "default_read_metric")]
    pub read_metric: String,
    #[serde(default = "default_read_sum_by")]
    pub read_sum_by: String,
    #[serde(default = "default_source_metric")]
    pub source_metric: String,
    #[serde(default = "default_source_label")]
    pub source_label: String,
}

impl LimitsConfig {
    pub fn default_group(&self) -> Option<&str> {
        self.default_groups
            .first()
            .map(String::as_str)
            .filter(|g| !g.is_empty())
    }
}

// Default functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_grpc_port() -> u16 {
    50051
}
fn default_http_port() -> u16 {
    8080
}
fn default_fanout_limit() -> usize {
    8
}
fn default_metrics_port() -> u16 {
    9090
}
fn default_prometheus_uri() -> String {
    "http://prometheus-server:80".to_string()
}
fn default_query_timeout_ms() -> u64 {
    10_000
}
fn default_connect_timeout_ms() -> u64 {
    5000
}
fn default_keep_alive_secs() -> u64 {
    60
}
fn default_feeds_endpoint() -> ServiceEndpoint {
    ServiceEndpoint::new("http://source-feeds:50051")
}
fn default_sites_endpoint() -> ServiceEndpoint {
    ServiceEndpoint::new("http://source-sites:50051")
}
fn default_telegram_endpoint() -> ServiceEndpoint {
    ServiceEndpoint::new("http://source-telegram:50051")
}
fn default_activitypub_endpoint() -> ServiceEndpoint {
    ServiceEndpoint::new("http://int-activitypub:50051")
}
fn default_interests_endpoint() -> ServiceEndpoint {
    ServiceEndpoint::new("http://interests-api:50051")
}
fn default_usage_endpoint() -> ServiceEndpoint {
    ServiceEndpoint::new("http://usage:50051")
}
fn default_prefix_rules() -> Vec<PrefixRule> {
    vec![PrefixRule {
        prefix: "site:".to_string(),
        kind: SourceKind::Site,
    }]
}
fn default_fallback() -> Vec<SourceKind> {
    vec![
        SourceKind::Feed,
        SourceKind::Social,
        SourceKind::Chat,
        SourceKind::Site,
    ]
}
fn default_publish_min() -> PublishBounds {
    PublishBounds {
        hourly: 10,
        daily: 100,
    }
}
fn default_publish_max() -> PublishBounds {
    PublishBounds {
        hourly: 3600,
        daily: 86400,
    }
}
fn default_windows() -> Vec<Window> {
    vec![Window::Hour, Window::Day]
}
fn default_limit_ttl_secs() -> u64 {
    3600
}
fn default_refresh_threshold_secs() -> u64 {
    900
}
fn default_read_metric() -> String {
    "awk_reader_read_count".to_string()
}
fn default_read_sum_by() -> String {
    "service".to_string()
}
fn default_source_metric() -> String {
    "awk_reader_sources_read_count".to_string()
}
fn default_source_label() -> String {
    "source".to_string()
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            grpc_port: default_grpc_port(),
            http_port: default_http_port(),
            fanout_limit: default_fanout_limit(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            port: default_metrics_port(),
        }
    }
}

impl Default for PrometheusConfig {
    fn default() -> Self {
        Self {
            uri: default_prometheus_uri(),
            timeout_ms: default_query_timeout_ms(),
        }
    }
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            feeds: default_feeds_endpoint(),
            sites: default_sites_endpoint(),
            telegram: default_telegram_endpoint(),
            activitypub: default_activitypub_endpoint(),
            resolution: ResolutionConfig::default(),
        }
    }
}

impl Default for ResolutionConfig {
    fn default() -> Self {
        Self {
            prefixes: default_prefix_rules(),
            fallback: default_fallback(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            default_groups: Vec::new(),
            default_user: default_publish_min(),
            max_user: default_publish_max(),
            windows: default_windows(),
            ttl_secs: default_limit_ttl_secs(),
            refresh_threshold_secs: default_refresh_threshold_secs(),
            read_metric: default_read_metric(),
            read_sum_by: default_read_sum_by(),
            source_metric: default_source_metric(),
            source_label: default_source_label(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            metrics: MetricsConfig::default(),
            prometheus: PrometheusConfig::default(),
            sources: SourcesConfig::default(),
            interests: default_interests_endpoint(),
            usage: default_usage_endpoint(),
            limits: LimitsConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from an optional config file overlaid with
    /// environment variables.
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path));
        }
        let config = builder.add_source(Self::environment()).build()?;
        config.try_deserialize()
    }

    /// Parse configuration from a TOML document.
    pub fn from_toml_str(toml: &str) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()?
            .try_deserialize()
    }

    fn environment() -> config::Environment {
        config::Environment::with_prefix("METRICS_GATEWAY")
            .separator("__")
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("limits.default_groups")
            .with_list_parse_key("limits.windows")
            .with_list_parse_key("sources.resolution.fallback")
    }

    /// Reject settings the limit setter cannot run with.
    pub fn validate(&self) -> Result<(), GatewayError> {
        let limits = &self.limits;
        if limits.default_group().is_none() {
            return Err(GatewayError::Config(
                "limits.default_groups must name at least one group".into(),
            ));
        }
        if limits.windows.is_empty() {
            return Err(GatewayError::Config("limits.windows must not be empty".into()));
        }
        for window in &limits.windows {
            if window.publish_subject().is_none() {
                return Err(GatewayError::Config(format!(
                    "window {window} does not govern a publish quota"
                )));
            }
            let min = limits.default_user.for_window(*window).unwrap_or_default();
            let max = limits.max_user.for_window(*window).unwrap_or_default();
            if min < 0 || max < 0 {
                return Err(GatewayError::Config(format!(
                    "publish bounds for window {window} must not be negative"
                )));
            }
        }
        if limits.ttl_secs == 0 {
            return Err(GatewayError::Config("limits.ttl_secs must be positive".into()));
        }
        let resolution = &self.sources.resolution;
        if resolution.fallback.is_empty() {
            return Err(GatewayError::Config(
                "sources.resolution.fallback must not be empty".into(),
            ));
        }
        if resolution.prefixes.iter().any(|r| r.prefix.is_empty()) {
            return Err(GatewayError::Config(
                "sources.resolution.prefixes must not contain an empty prefix".into(),
            ));
        }
        Ok(())
    }
}
