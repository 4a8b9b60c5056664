//! Instance parameters and argument parsing

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, ValueEnum};
use validator::Validate;

use crate::error::FeedError;

pub const DEFAULT_LIMIT_ERR: &str = "Please provide a valid limit (positive integer)";

/// Parse a user-supplied integer, failing with `err_msg` as a configuration error
pub fn try_parse_integer(input: &str, err_msg: &str) -> Result<i64, FeedError> {
    input
        .trim()
        .parse::<i64>()
        .map_err(|_| FeedError::config(err_msg))
}

/// TAXII protocol version spoken to the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum TaxiiVersion {
    #[value(name = "2.0")]
    V20,
    #[default]
    #[value(name = "2.1")]
    V21,
}

impl TaxiiVersion {
    /// Media type for the `Accept` header
    pub fn media_type(&self) -> &'static str {
        match self {
            TaxiiVersion::V20 => "application/vnd.oasis.taxii+json; version=2.0",
            TaxiiVersion::V21 => "application/taxii+json;version=2.1",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub identifier: String,
    pub password: String,
}

/// Everything the TAXII client needs to talk to one server
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub url: String,
    pub collection_to_fetch: Option<String>,
    pub credentials: Option<Credentials>,
    /// Honour the environment's proxy settings
    pub proxy: bool,
    pub verify_certificate: bool,
    pub version: TaxiiVersion,
    pub timeout: Duration,
    pub feed_tags: Vec<String>,
    pub tlp_color: Option<String>,
}

impl ClientConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            collection_to_fetch: None,
            credentials: None,
            proxy: false,
            verify_certificate: true,
            version: TaxiiVersion::default(),
            timeout: Duration::from_secs(60),
            feed_tags: vec![],
            tlp_color: None,
        }
    }
}

/// Instance configuration shared by every command
#[derive(Args, Debug, Clone, Validate)]
pub struct InstanceArgs {
    /// TAXII 2 server discovery or API root URL
    #[arg(long, env = "TAXII2_URL")]
    #[validate(url)]
    pub url: String,

    /// Fetch only the collection with this title (or id)
    #[arg(long, env = "TAXII2_COLLECTION")]
    pub collection_to_fetch: Option<String>,

    /// Username, or `_header:<Name>` to send the password in a custom header
    #[arg(long, env = "TAXII2_USERNAME")]
    pub username: Option<String>,

    #[arg(long, env = "TAXII2_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Use the system proxy settings
    #[arg(long, env = "TAXII2_PROXY")]
    pub proxy: bool,

    /// Trust any certificate (not secure)
    #[arg(long, env = "TAXII2_INSECURE")]
    pub insecure: bool,

    #[arg(long = "taxii-version", value_enum, env = "TAXII2_VERSION", default_value = "2.1")]
    pub taxii_version: TaxiiVersion,

    /// Request timeout in seconds
    #[arg(long, env = "TAXII2_TIMEOUT", default_value = "60")]
    #[validate(range(min = 1))]
    pub timeout: u64,

    /// First fetch time, e.g. "24 hours"
    #[arg(long, env = "TAXII2_INITIAL_INTERVAL", default_value = "24 hours")]
    pub initial_interval: String,

    /// Maximum indicators per fetch cycle (negative for no limit)
    #[arg(
        long = "fetch-limit",
        env = "TAXII2_FETCH_LIMIT",
        default_value = "-1",
        allow_hyphen_values = true
    )]
    pub fetch_limit: String,

    /// Tags added to every fetched indicator
    #[arg(long, env = "TAXII2_FEED_TAGS", value_delimiter = ',')]
    pub feed_tags: Vec<String>,

    /// Traffic Light Protocol colour for fetched indicators
    #[arg(long, env = "TAXII2_TLP_COLOR")]
    pub tlp_color: Option<String>,

    /// Instance name, used as the key for persisted state
    #[arg(long, env = "TAXII2_INSTANCE", default_value = "taxii2")]
    #[validate(length(min = 1))]
    pub instance: String,

    /// File holding the fetch cursor when no database is configured
    #[arg(long, env = "TAXII2_CONTEXT_FILE", default_value = ".taxii2_context.json")]
    pub context_file: PathBuf,

    /// PostgreSQL URL for the cursor and indicator tables
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    /// JSON lines file receiving indicators when no database is configured (stdout if unset)
    #[arg(long, env = "TAXII2_INDICATORS_OUT")]
    pub indicators_out: Option<PathBuf>,
}

impl InstanceArgs {
    pub fn check(&self) -> Result<(), FeedError> {
        self.validate()
            .map_err(|e| FeedError::config(format!("Invalid instance configuration: {}", e)))
    }

    pub fn client_config(&self) -> ClientConfig {
        let credentials = match (&self.username, &self.password) {
            (Some(identifier), password) if !identifier.is_empty() => Some(Credentials {
                identifier: identifier.clone(),
                password: password.clone().unwrap_or_default(),
            }),
            _ => None,
        };

        ClientConfig {
            url: self.url.clone(),
            collection_to_fetch: self
                .collection_to_fetch
                .clone()
                .filter(|c| !c.trim().is_empty()),
            credentials,
            proxy: self.proxy,
            verify_certificate: !self.insecure,
            version: self.taxii_version,
            timeout: Duration::from_secs(self.timeout),
            feed_tags: self
                .feed_tags
                .iter()
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect(),
            tlp_color: self.tlp_color.clone(),
        }
    }

    /// Fetch-cycle limit; an empty value means unbounded
    pub fn fetch_limit(&self) -> Result<i64, FeedError> {
        if self.fetch_limit.trim().is_empty() {
            return Ok(-1);
        }
        try_parse_integer(&self.fetch_limit, DEFAULT_LIMIT_ERR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        instance: InstanceArgs,
    }

    #[test]
    fn integer_parsing() {
        assert_eq!(try_parse_integer("10", DEFAULT_LIMIT_ERR).unwrap(), 10);
        assert_eq!(try_parse_integer(" -1 ", DEFAULT_LIMIT_ERR).unwrap(), -1);
        for bad in ["", "ten", "1.5", "10a"] {
            let err = try_parse_integer(bad, DEFAULT_LIMIT_ERR).unwrap_err();
            assert!(err.is_configuration());
            assert_eq!(err.to_string(), DEFAULT_LIMIT_ERR);
        }
    }

    #[test]
    fn builds_client_config_from_flags() {
        let cli = TestCli::parse_from([
            "test",
            "--url",
            "https://taxii.example/taxii2/",
            "--username",
            "_header:Authorization",
            "--password",
            "Token abc",
            "--insecure",
            "--collection-to-fetch",
            "Phish Tank",
            "--feed-tags",
            "a, b,,c",
        ]);
        cli.instance.check().unwrap();

        let config = cli.instance.client_config();
        assert!(!config.verify_certificate);
        assert!(!config.proxy);
        assert_eq!(config.collection_to_fetch.as_deref(), Some("Phish Tank"));
        assert_eq!(
            config.credentials,
            Some(Credentials {
                identifier: "_header:Authorization".into(),
                password: "Token abc".into(),
            })
        );
        assert_eq!(config.feed_tags, vec!["a", "b", "c"]);
        assert_eq!(config.version, TaxiiVersion::V21);
        assert_eq!(cli.instance.fetch_limit().unwrap(), -1);
    }

    #[test]
    fn rejects_bad_url_and_limit() {
        let cli = TestCli::parse_from(["test", "--url", "not a url", "--fetch-limit", "many"]);
        assert!(cli.instance.check().unwrap_err().is_configuration());
        assert!(cli.instance.fetch_limit().unwrap_err().is_configuration());
    }
}
