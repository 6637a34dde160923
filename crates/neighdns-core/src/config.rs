//! Configuration types for the neighdns system
//!
//! The configuration is one JSON document, loaded once at startup and then
//! passed by reference into every component. Nothing mutates it after
//! [`DdnsConfig::load`] returns.

use crate::error::{Error, Result};
use crate::traits::MacAddress;
use serde::de::{self, MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// File name looked up next to the executable when no path is given
pub const DEFAULT_CONFIG_FILE: &str = "config.json";

/// Prefix of the ownership tag written into every managed record's comment
pub const OWNERSHIP_TAG_PREFIX: &str = "DDNS-";

/// Example configuration shown to operators when loading fails
pub const EXAMPLE_CONFIG: &str = r#"{
  "uniqueToken": "router1",
  "cloudflareApiToken": "your-api-token",
  "domainName": "example.com",
  "localIpv6AddrApiUrl": "https://api-ipv6.ip.sb/ip",
  "recordMap": {
    "00:00:00:00:00:00": [
      { "name": "gateway", "comment": "this host" }
    ],
    "bc:24:11:42:15:81": [
      { "name": "nas", "comment": "" },
      { "name": "media", "comment": "same box" }
    ]
  }
}"#;

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DdnsConfig {
    /// Per-deployment token; `DDNS-<token>` marks the records this instance owns
    ///
    /// Every instance writing to the same zone needs its own token, or
    /// instances delete each other's records.
    pub unique_token: String,

    /// Zone apex records are published under (e.g. "example.com")
    pub domain_name: String,

    /// Provider zone id; looked up by `domain_name` when absent
    #[serde(default)]
    pub zone_id: Option<String>,

    /// Scoped API token (preferred)
    #[serde(default)]
    pub cloudflare_api_token: Option<String>,

    /// Account email, used with `cloudflare_api_key`
    #[serde(default)]
    pub cloudflare_email: Option<String>,

    /// Global API key, used with `cloudflare_email`
    #[serde(default)]
    pub cloudflare_api_key: Option<String>,

    /// Service returning this host's public IPv6 address as plain text
    #[serde(default)]
    pub local_ipv6_addr_api_url: Option<String>,

    /// Tracked hosts and the names each one publishes
    ///
    /// Keys are normalized on load; two keys naming the same host (e.g.
    /// differing only in case) are rejected.
    #[serde(deserialize_with = "deserialize_record_map")]
    pub record_map: BTreeMap<MacAddress, Vec<RecordBinding>>,
}

/// One name published for a tracked host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordBinding {
    /// Label under the zone apex (e.g. "nas" for "nas.example.com")
    pub name: String,

    /// Free text stored after the ownership tag in the record comment
    #[serde(default)]
    pub comment: String,
}

impl RecordBinding {
    /// Create a new binding
    pub fn new(name: impl Into<String>, comment: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            comment: comment.into(),
        }
    }
}

/// Credentials used to authenticate against the provider API
#[derive(Clone, PartialEq, Eq)]
pub enum ProviderCredentials {
    /// Scoped API token, sent as a bearer token
    ApiToken(String),
    /// Account email plus global API key
    GlobalKey {
        /// Account email
        email: String,
        /// Global API key
        key: String,
    },
}

// Custom Debug implementation that hides secrets
impl std::fmt::Debug for ProviderCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ApiToken(_) => f.debug_tuple("ApiToken").field(&"<REDACTED>").finish(),
            Self::GlobalKey { email, .. } => f
                .debug_struct("GlobalKey")
                .field("email", email)
                .field("key", &"<REDACTED>")
                .finish(),
        }
    }
}

impl DdnsConfig {
    /// Create a configuration with no tracked hosts
    pub fn new(unique_token: impl Into<String>, domain_name: impl Into<String>) -> Self {
        Self {
            unique_token: unique_token.into(),
            domain_name: domain_name.into(),
            zone_id: None,
            cloudflare_api_token: None,
            cloudflare_email: None,
            cloudflare_api_key: None,
            local_ipv6_addr_api_url: None,
            record_map: BTreeMap::new(),
        }
    }

    /// Track a host, appending to its bindings if already tracked
    pub fn with_binding(mut self, host: MacAddress, binding: RecordBinding) -> Self {
        self.record_map.entry(host).or_default().push(binding);
        self
    }

    /// Set the self-address lookup URL
    pub fn with_lookup_url(mut self, url: impl Into<String>) -> Self {
        self.local_ipv6_addr_api_url = Some(url.into());
        self
    }

    /// Set the provider API token
    pub fn with_api_token(mut self, token: impl Into<String>) -> Self {
        self.cloudflare_api_token = Some(token.into());
        self
    }

    /// Parse and validate a configuration document
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| Error::config(format!("Malformed configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate the configuration file at `path`
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("Cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&text)
    }

    /// `config.json` in the directory holding the running executable
    pub fn default_path() -> Result<PathBuf> {
        let exe = std::env::current_exe()
            .map_err(|e| Error::config(format!("Cannot locate executable: {}", e)))?;
        let dir = exe
            .parent()
            .ok_or_else(|| Error::config("Executable has no parent directory"))?;
        Ok(dir.join(DEFAULT_CONFIG_FILE))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        let token = self.unique_token.trim();
        if token.is_empty() {
            return Err(Error::config("uniqueToken cannot be empty"));
        }
        if token.chars().any(char::is_whitespace) {
            return Err(Error::config(format!(
                "uniqueToken must not contain whitespace. Got: '{}'",
                self.unique_token
            )));
        }

        if self.domain_name.trim().is_empty() {
            return Err(Error::config("domainName cannot be empty"));
        }
        validate_dns_name(&self.domain_name)?;

        if self.record_map.is_empty() {
            return Err(Error::config("recordMap must track at least one host"));
        }

        for (host, bindings) in &self.record_map {
            if bindings.is_empty() {
                return Err(Error::config(format!("recordMap entry {} has no names", host)));
            }
            for binding in bindings {
                validate_dns_name(&binding.name).map_err(|e| {
                    Error::config(format!("recordMap entry {}: {}", host, e))
                })?;
            }
        }

        self.credentials()?;

        if self.tracks_self() {
            match self.local_ipv6_addr_api_url.as_deref().map(str::trim) {
                None | Some("") => {
                    return Err(Error::config(format!(
                        "localIpv6AddrApiUrl is required when {} is tracked",
                        MacAddress::SELF_SENTINEL
                    )));
                }
                Some(url) if !url.starts_with("https://") && !url.starts_with("http://") => {
                    return Err(Error::config(format!(
                        "localIpv6AddrApiUrl must use HTTP or HTTPS scheme. Got: {}",
                        url
                    )));
                }
                Some(_) => {}
            }
        }

        Ok(())
    }

    /// Provider credentials, preferring the scoped token
    pub fn credentials(&self) -> Result<ProviderCredentials> {
        if let Some(token) = non_empty(&self.cloudflare_api_token) {
            return Ok(ProviderCredentials::ApiToken(token.to_string()));
        }

        match (non_empty(&self.cloudflare_email), non_empty(&self.cloudflare_api_key)) {
            (Some(email), Some(key)) => Ok(ProviderCredentials::GlobalKey {
                email: email.to_string(),
                key: key.to_string(),
            }),
            (Some(_), None) | (None, Some(_)) => Err(Error::config(
                "cloudflareEmail and cloudflareApiKey must be set together",
            )),
            (None, None) => Err(Error::config(
                "Provider credentials missing: set cloudflareApiToken, \
                 or cloudflareEmail together with cloudflareApiKey",
            )),
        }
    }

    /// Tag that marks records owned by this deployment
    pub fn ownership_tag(&self) -> String {
        format!("{}{}", OWNERSHIP_TAG_PREFIX, self.unique_token.trim())
    }

    /// Fully-qualified name of a label under the zone apex
    pub fn fqdn(&self, label: &str) -> String {
        format!("{}.{}", label, self.domain_name.trim_end_matches('.'))
    }

    /// Whether `host` has bindings
    pub fn tracks(&self, host: &MacAddress) -> bool {
        self.record_map.contains_key(host)
    }

    /// Whether the self sentinel has bindings
    pub fn tracks_self(&self) -> bool {
        self.tracks(&MacAddress::SELF_SENTINEL)
    }
}

/// Deserialize `recordMap`, rejecting keys that name the same host twice
fn deserialize_record_map<'de, D>(
    deserializer: D,
) -> std::result::Result<BTreeMap<MacAddress, Vec<RecordBinding>>, D::Error>
where
    D: Deserializer<'de>,
{
    struct RecordMapVisitor;

    impl<'de> Visitor<'de> for RecordMapVisitor {
        type Value = BTreeMap<MacAddress, Vec<RecordBinding>>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a map from hardware addresses to record bindings")
        }

        fn visit_map<A: MapAccess<'de>>(
            self,
            mut map: A,
        ) -> std::result::Result<Self::Value, A::Error> {
            let mut record_map = BTreeMap::new();
            while let Some((host, bindings)) = map.next_entry::<MacAddress, Vec<RecordBinding>>()? {
                if record_map.insert(host, bindings).is_some() {
                    return Err(de::Error::custom(format!(
                        "recordMap lists {} more than once",
                        host
                    )));
                }
            }
            Ok(record_map)
        }
    }

    deserializer.deserialize_map(RecordMapVisitor)
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Validate a DNS name or label sequence
///
/// Basic RFC 1035 checks; catches common typos, not every invalid name.
fn validate_dns_name(name: &str) -> Result<()> {
    let name = name.trim_end_matches('.');
    if name.is_empty() {
        return Err(Error::config("Domain name cannot be empty"));
    }

    if name.len() > 253 {
        return Err(Error::config(format!(
            "Domain name too long: {} chars (max 253). Got: {}",
            name.len(),
            name
        )));
    }

    for label in name.split('.') {
        if label.is_empty() {
            return Err(Error::config(format!("Domain name has empty label: '{}'", name)));
        }

        if label.len() > 63 {
            return Err(Error::config(format!(
                "Domain label too long: {} chars (max 63). Label: '{}'",
                label.len(),
                label
            )));
        }

        if !label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
            return Err(Error::config(format!(
                "Domain label contains invalid characters. Label: '{}'. \
                 Valid: alphanumeric, hyphen and underscore only.",
                label
            )));
        }

        if label.starts_with('-') || label.ends_with('-') {
            return Err(Error::config(format!(
                "Domain label cannot start or end with hyphen. Label: '{}'",
                label
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_example_config_is_valid() {
        let config = DdnsConfig::from_json_str(EXAMPLE_CONFIG).unwrap();
        assert_eq!(config.ownership_tag(), "DDNS-router1");
        assert!(config.tracks_self());
        assert_eq!(config.record_map.len(), 2);
        assert_eq!(config.fqdn("nas"), "nas.example.com");
    }

    #[test]
    fn test_mac_keys_are_normalized() {
        let json = r#"{
            "uniqueToken": "t",
            "cloudflareApiToken": "tok",
            "domainName": "example.com",
            "recordMap": { "BC:24:11:42:15:81": [ { "name": "nas" } ] }
        }"#;
        let config = DdnsConfig::from_json_str(json).unwrap();
        let mac: MacAddress = "bc:24:11:42:15:81".parse().unwrap();
        assert!(config.tracks(&mac));
        assert_eq!(config.record_map[&mac][0].comment, "");
    }

    #[test]
    fn test_duplicate_normalized_keys_rejected() {
        let json = r#"{
            "uniqueToken": "t",
            "cloudflareApiToken": "tok",
            "domainName": "example.com",
            "recordMap": {
                "BC:24:11:42:15:81": [ { "name": "nas" } ],
                "bc:24:11:42:15:81": [ { "name": "media" } ]
            }
        }"#;
        let err = DdnsConfig::from_json_str(json).unwrap_err();
        assert!(err.is_config());
        assert!(err.to_string().contains("bc:24:11:42:15:81 more than once"));
    }

    #[test]
    fn test_malformed_mac_key_is_config_error() {
        let json = r#"{
            "uniqueToken": "t",
            "cloudflareApiToken": "tok",
            "domainName": "example.com",
            "recordMap": { "not-a-mac": [ { "name": "nas" } ] }
        }"#;
        let err = DdnsConfig::from_json_str(json).unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn test_self_requires_lookup_url() {
        let config = DdnsConfig::new("t", "example.com")
            .with_api_token("tok")
            .with_binding(MacAddress::SELF_SENTINEL, RecordBinding::new("gw", ""));
        assert!(config.validate().is_err());

        let config = config.with_lookup_url("ftp://example.com/ip");
        assert!(config.validate().is_err());

        let config = config.with_lookup_url("https://api-ipv6.ip.sb/ip");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_credentials() {
        let host: MacAddress = "aa:bb:cc:dd:ee:ff".parse().unwrap();
        let mut config =
            DdnsConfig::new("t", "example.com").with_binding(host, RecordBinding::new("a", ""));
        assert!(config.credentials().is_err());

        config.cloudflare_email = Some("me@example.com".into());
        assert!(config.credentials().is_err());

        config.cloudflare_api_key = Some("key".into());
        assert!(matches!(
            config.credentials().unwrap(),
            ProviderCredentials::GlobalKey { .. }
        ));

        config.cloudflare_api_token = Some("token".into());
        assert_eq!(
            config.credentials().unwrap(),
            ProviderCredentials::ApiToken("token".into())
        );
    }

    #[test]
    fn test_credentials_debug_is_redacted() {
        let creds = ProviderCredentials::GlobalKey {
            email: "me@example.com".into(),
            key: "secret_key_123".into(),
        };
        let debug = format!("{:?}", creds);
        assert!(!debug.contains("secret_key_123"));
        assert!(debug.contains("me@example.com"));
    }

    #[test]
    fn test_invalid_binding_name() {
        let host: MacAddress = "aa:bb:cc:dd:ee:ff".parse().unwrap();
        let config = DdnsConfig::new("t", "example.com")
            .with_api_token("tok")
            .with_binding(host, RecordBinding::new("bad name", ""));
        assert!(config.validate().is_err());

        let config = DdnsConfig::new("t", "example.com")
            .with_api_token("tok")
            .with_binding(host, RecordBinding::new("-dash", ""));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_token_rules() {
        let host: MacAddress = "aa:bb:cc:dd:ee:ff".parse().unwrap();
        let config = DdnsConfig::new("", "example.com")
            .with_api_token("tok")
            .with_binding(host, RecordBinding::new("a", ""));
        assert!(config.validate().is_err());

        let config = DdnsConfig::new("two words", "example.com")
            .with_api_token("tok")
            .with_binding(host, RecordBinding::new("a", ""));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_record_map_rejected() {
        let config = DdnsConfig::new("t", "example.com").with_api_token("tok");
        assert!(config.validate().is_err());
    }
}
