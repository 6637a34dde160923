// # Cloudflare DNS Provider
//
// This crate provides the Cloudflare implementation of `DnsProvider` for
// neighdns.
//
// ## Behavior
//
// - ✅ Zone id lookup by zone name
// - ✅ Paginated listing of AAAA records filtered by comment prefix
// - ✅ One atomic batch request per run (deletes, puts, posts)
// - ✅ HTTP timeout configured (30 seconds)
// - ✅ Specific error handling for HTTP status codes (401, 403, 404, 429, 5xx)
// - ✅ Dry-run mode for safe testing
// - ✅ Scoped API token or legacy global key
// - ❌ NO retry logic (a failed run is retried by the next invocation)
// - ❌ NO caching (every run lists the zone again)
// - ❌ NO background tasks
//
// ## Trust Level: Untrusted (DNS Provider)
//
// **Allowed Capabilities**:
// - ✅ Perform HTTP/HTTPS API calls to api.cloudflare.com only
// - ✅ Parse provider-specific responses
//
// **Forbidden Capabilities**:
// - ❌ Decide which records change (owned by the diff engine)
// - ❌ Implement retry logic
// - ❌ Cache state beyond a single request
//
// ## Security Requirements
//
// - Credentials NEVER appear in logs or `Debug` output
// - Construction fails if no credential is set
//
// ## API Reference
//
// - Cloudflare API v4: https://developers.cloudflare.com/api/
// - List Zones: GET `/zones?name=...`
// - List DNS Records: GET `/zones/:zone_id/dns_records?type=AAAA&comment.startswith=...`
// - Batch DNS Records: POST `/zones/:zone_id/dns_records/batch`

use async_trait::async_trait;
use neighdns_core::config::{DdnsConfig, ProviderCredentials};
use neighdns_core::traits::{
    BatchOutcome, ChangeBatch, DnsProvider, RecordSpec, RemoteRecord, RECORD_TYPE,
};
use neighdns_core::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Cloudflare API base URL
const CLOUDFLARE_API_BASE: &str = "https://api.cloudflare.com/client/v4";

/// Default HTTP timeout for API requests (30 seconds)
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Records requested per listing page
const PAGE_SIZE: u32 = 100;

/// Cloudflare DNS provider
///
/// # Trust Level: Untrusted
///
/// This provider is stateless and single-shot. It never decides what to
/// change; it lists and submits.
///
/// # Dry-Run Mode
///
/// When `dry_run` is true, the provider will:
/// - Perform all GET requests (zone lookup, record listing)
/// - Log the intended batch payload
/// - **NOT** submit the batch
///
/// # Security
///
/// The Debug implementation does NOT expose the credentials.
pub struct CloudflareProvider {
    /// API credentials
    /// ⚠️ NEVER log this value
    credentials: ProviderCredentials,

    /// HTTP client for API requests
    client: reqwest::Client,

    /// API base URL, without trailing slash
    api_base: String,

    /// Dry-run mode: if true, perform GET requests but skip the batch POST
    dry_run: bool,
}

// Custom Debug implementation that hides the credentials
impl std::fmt::Debug for CloudflareProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudflareProvider")
            .field("credentials", &"<REDACTED>")
            .field("api_base", &self.api_base)
            .field("dry_run", &self.dry_run)
            .finish()
    }
}

impl CloudflareProvider {
    /// Create a new Cloudflare provider
    ///
    /// # Parameters
    ///
    /// - `credentials`: API token with Zone:DNS:Edit permission, or global key
    /// - `dry_run`: If true, perform GET requests but skip the batch submission
    ///
    /// # Returns
    ///
    /// - `Err(Error::Config)`: A credential is empty
    /// - `Err(Error::Http)`: The HTTP client could not be built
    pub fn new(credentials: ProviderCredentials, dry_run: bool) -> Result<Self> {
        let empty = match &credentials {
            ProviderCredentials::ApiToken(token) => token.trim().is_empty(),
            ProviderCredentials::GlobalKey { email, key } => {
                email.trim().is_empty() || key.trim().is_empty()
            }
        };
        if empty {
            return Err(Error::config("Cloudflare credentials cannot be empty"));
        }

        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::http(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            credentials,
            client,
            api_base: CLOUDFLARE_API_BASE.to_string(),
            dry_run,
        })
    }

    /// Create a provider from the deployment configuration
    pub fn from_config(config: &DdnsConfig, dry_run: bool) -> Result<Self> {
        if dry_run {
            tracing::warn!("Cloudflare provider running in DRY-RUN mode - no changes will be made");
        }
        Self::new(config.credentials()?, dry_run)
    }

    /// Point the provider at another API base URL
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    /// Whether the provider skips the batch submission
    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Attach the credential headers
    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.credentials {
            ProviderCredentials::ApiToken(token) => request.bearer_auth(token),
            ProviderCredentials::GlobalKey { email, key } => request
                .header("X-Auth-Email", email)
                .header("X-Auth-Key", key),
        }
    }

    /// Send a request and unwrap the Cloudflare response envelope
    ///
    /// # Parameters
    ///
    /// - `request`: Request without credentials
    /// - `context`: What the request does, for error messages
    async fn send<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        context: &str,
    ) -> Result<Envelope<T>> {
        let response = self
            .authorize(request)
            .header("Content-Type", "application/json")
            .send()
            .await
            .map_err(|e| Error::http(format!("{}: request failed: {}", context, e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());
            return Err(status_error(status.as_u16(), &error_text, context));
        }

        let envelope: Envelope<T> = response.json().await.map_err(|e| {
            Error::provider("cloudflare", format!("{}: failed to parse response: {}", context, e))
        })?;

        if !envelope.success {
            return Err(envelope_error(&envelope.errors, context));
        }
        Ok(envelope)
    }
}

#[async_trait]
impl DnsProvider for CloudflareProvider {
    /// Look up the zone id for a zone name
    ///
    /// # API Call
    ///
    /// ```http
    /// GET /zones?name=example.com
    /// ```
    async fn zone_id(&self, zone_name: &str) -> Result<String> {
        let zone_name = zone_name.trim_end_matches('.');
        tracing::debug!("Looking up zone ID for domain: {}", zone_name);

        let request = self
            .client
            .get(format!("{}/zones", self.api_base))
            .query(&[("name", zone_name)]);
        let envelope: Envelope<Vec<Zone>> = self.send(request, "zone lookup").await?;

        let zone = envelope
            .result
            .unwrap_or_default()
            .into_iter()
            .find(|z| z.name.eq_ignore_ascii_case(zone_name))
            .ok_or_else(|| Error::not_found(format!("Zone not found: {}", zone_name)))?;

        tracing::debug!("Found zone ID: {}", zone.id);
        Ok(zone.id)
    }

    /// List the AAAA records whose comment starts with `comment_prefix`
    ///
    /// Follows `result_info.total_pages` until every page is read.
    ///
    /// # API Call
    ///
    /// ```http
    /// GET /zones/:zone_id/dns_records?type=AAAA&comment.startswith=DDNS-router1&page=1&per_page=100
    /// ```
    async fn list_records(&self, zone_id: &str, comment_prefix: &str) -> Result<Vec<RemoteRecord>> {
        let url = format!("{}/zones/{}/dns_records", self.api_base, zone_id);
        let per_page = PAGE_SIZE.to_string();
        let mut records = Vec::new();
        let mut page: u32 = 1;

        loop {
            let page_text = page.to_string();
            let request = self.client.get(&url).query(&[
                ("type", RECORD_TYPE),
                ("comment.startswith", comment_prefix),
                ("page", page_text.as_str()),
                ("per_page", per_page.as_str()),
            ]);
            let envelope: Envelope<Vec<DnsRecord>> = self.send(request, "record listing").await?;

            let batch = envelope.result.unwrap_or_default();
            let fetched = batch.len();
            records.extend(batch.into_iter().map(RemoteRecord::from));

            let total_pages = envelope.result_info.map(|i| i.total_pages).unwrap_or(1);
            if fetched == 0 || page >= total_pages {
                break;
            }
            page += 1;
        }

        tracing::debug!("Listed {} record(s) in zone {}", records.len(), zone_id);
        Ok(records)
    }

    /// Submit the batch in one request
    ///
    /// Cloudflare applies the batch all-or-nothing, deletes first and posts
    /// last. In dry-run mode the payload is logged and nothing is sent.
    ///
    /// # API Call
    ///
    /// ```http
    /// POST /zones/:zone_id/dns_records/batch
    /// {
    ///   "deletes": [{ "id": "..." }],
    ///   "puts": [{ "id": "...", "type": "AAAA", "name": "...", "content": "...", ... }],
    ///   "posts": [{ "type": "AAAA", "name": "...", "content": "...", ... }]
    /// }
    /// ```
    async fn submit_batch(&self, zone_id: &str, batch: &ChangeBatch) -> Result<BatchOutcome> {
        let operations = batch.len();
        let payload = BatchRequest::from(batch);
        let url = format!("{}/zones/{}/dns_records/batch", self.api_base, zone_id);

        tracing::info!(
            "Submitting batch to Cloudflare: {} delete(s), {} put(s), {} post(s) [mode: {}]",
            payload.deletes.len(),
            payload.puts.len(),
            payload.posts.len(),
            if self.dry_run { "DRY-RUN" } else { "LIVE" }
        );

        if self.dry_run {
            let body = serde_json::to_string(&payload)?;
            tracing::info!("[DRY-RUN] Would send POST request to {} with payload: {}", url, body);
            return Ok(BatchOutcome::DryRun { operations });
        }

        let request = self.client.post(&url).json(&payload);
        let _: Envelope<serde_json::Value> = self.send(request, "batch submission").await?;

        tracing::info!("Cloudflare batch applied: {} operation(s)", operations);
        Ok(BatchOutcome::Applied { operations })
    }

    fn provider_name(&self) -> &'static str {
        "cloudflare"
    }
}

/// Map a non-2xx status to an error
fn status_error(status: u16, body: &str, context: &str) -> Error {
    match status {
        401 | 403 => Error::auth(format!(
            "{}: invalid credentials or insufficient permissions. Status: {}",
            context, status
        )),
        404 => Error::not_found(format!("{}: {}", context, body)),
        429 => Error::rate_limited(format!(
            "{}: rate limit exceeded, retry on the next run. Status: {}",
            context, status
        )),
        500..=599 => Error::provider(
            "cloudflare",
            format!("{}: server error (transient): {} - {}", context, status, body),
        ),
        _ => Error::provider("cloudflare", format!("{}: {} - {}", context, status, body)),
    }
}

/// Turn a `success: false` envelope into an error
fn envelope_error(errors: &[ApiMessage], context: &str) -> Error {
    let messages: Vec<String> = errors
        .iter()
        .map(|e| format!("[{}] {}", e.code, e.message))
        .collect();
    let detail = if messages.is_empty() {
        "no error details".to_string()
    } else {
        messages.join("; ")
    };
    Error::provider("cloudflare", format!("{} rejected: {}", context, detail))
}

/// Cloudflare v4 response envelope
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    success: bool,
    #[serde(default)]
    errors: Vec<ApiMessage>,
    result: Option<T>,
    result_info: Option<ResultInfo>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct ResultInfo {
    #[serde(default = "first_page")]
    total_pages: u32,
}

fn first_page() -> u32 {
    1
}

#[derive(Debug, Deserialize)]
struct Zone {
    id: String,
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct DnsRecord {
    id: String,
    name: String,
    #[serde(rename = "type")]
    record_type: String,
    content: String,
    #[serde(default)]
    comment: Option<String>,
}

impl From<DnsRecord> for RemoteRecord {
    fn from(record: DnsRecord) -> Self {
        Self {
            id: record.id,
            name: record.name,
            record_type: record.record_type,
            content: record.content,
            comment: record.comment,
        }
    }
}

/// Body of `POST /dns_records/batch`
#[derive(Debug, Serialize)]
struct BatchRequest<'a> {
    deletes: Vec<RecordRef<'a>>,
    puts: Vec<PutRecord<'a>>,
    posts: Vec<RecordBody<'a>>,
}

#[derive(Debug, Serialize)]
struct RecordRef<'a> {
    id: &'a str,
}

#[derive(Debug, Serialize)]
struct PutRecord<'a> {
    id: &'a str,
    #[serde(flatten)]
    body: RecordBody<'a>,
}

#[derive(Debug, Serialize)]
struct RecordBody<'a> {
    #[serde(rename = "type")]
    record_type: &'static str,
    name: &'a str,
    content: String,
    comment: &'a str,
    ttl: u32,
    proxied: bool,
}

impl<'a> From<&'a RecordSpec> for RecordBody<'a> {
    fn from(spec: &'a RecordSpec) -> Self {
        Self {
            record_type: RECORD_TYPE,
            name: &spec.name,
            content: spec.content.to_string(),
            comment: &spec.comment,
            ttl: spec.ttl,
            proxied: spec.proxied,
        }
    }
}

impl<'a> From<&'a ChangeBatch> for BatchRequest<'a> {
    fn from(batch: &'a ChangeBatch) -> Self {
        Self {
            deletes: batch.deletes.iter().map(|id| RecordRef { id }).collect(),
            puts: batch
                .updates
                .iter()
                .map(|u| PutRecord {
                    id: &u.id,
                    body: RecordBody::from(&u.record),
                })
                .collect(),
            posts: batch.creates.iter().map(RecordBody::from).collect(),
        }
    }
}
