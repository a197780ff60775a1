//! JSON-over-HTTP source collector
//!
//! Fetches `GET {base}/hospitals/{hospital_id}` and accepts either a bare
//! JSON object of fields or a `{ success, data, quality_score, error }`
//! envelope. For the HMS source a hospital's own `hms_endpoint` takes
//! precedence over the configured base URL.
//!
//! # Status Mapping
//! | HTTP | Error |
//! |---|---|
//! | 401, 403 | `Authentication` |
//! | 429 | `QuotaExceeded` |
//! | 404 | `Unavailable` |
//! | 5xx | `Connectivity` |
//!
//! # Rate Limiting
//! Calls for the same hospital are spaced by at least `min_interval_ms`
//! (keyed token bucket, one cell per period). Keys of hospitals whose bucket
//! has refilled are dropped after every wait.

use super::{CollectionOutput, SourceCollector};
use crate::error::CollectorError;
use crate::types::{DataMap, HospitalDescriptor, SourceKind};
use async_trait::async_trait;
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use hpi_common::config::CollectorConfig;
use hpi_common::{Error, Result};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info};

pub struct HttpCollector {
    kind: SourceKind,
    client: Client,
    base_url: Option<String>,
    api_key: Option<String>,
    timeout: Duration,
    /// Hospitals this source serves; empty means every hospital
    covered_hospitals: Vec<String>,
    /// Per-hospital minimum inter-call interval
    rate_limiter: Option<DefaultKeyedRateLimiter<String>>,
}

impl HttpCollector {
    pub fn new(kind: SourceKind, config: &CollectorConfig) -> Result<Self> {
        let timeout = Duration::from_secs(config.timeout_secs.max(1));
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout.min(Duration::from_secs(5)))
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {}", e)))?;

        let rate_limiter = Quota::with_period(Duration::from_millis(config.min_interval_ms))
            .map(RateLimiter::keyed);

        Ok(Self {
            kind,
            client,
            base_url: config
                .base_url
                .as_ref()
                .map(|u| u.trim_end_matches('/').to_string()),
            api_key: config.api_key.clone(),
            timeout,
            covered_hospitals: config.covered_hospitals.clone(),
            rate_limiter,
        })
    }

    fn endpoint(&self, hospital: &HospitalDescriptor) -> Option<String> {
        let base = match (self.kind, &hospital.hms_endpoint) {
            (SourceKind::HmsApi, Some(endpoint)) => endpoint.trim_end_matches('/').to_string(),
            _ => self.base_url.clone()?,
        };
        Some(format!("{}/hospitals/{}", base, hospital.id))
    }

    fn covers(&self, hospital: &HospitalDescriptor) -> bool {
        self.covered_hospitals.is_empty() || self.covered_hospitals.contains(&hospital.id)
    }

    async fn wait_turn(&self, hospital_id: &String) {
        if let Some(limiter) = &self.rate_limiter {
            limiter.until_key_ready(hospital_id).await;
            limiter.retain_recent();
        }
    }

    /// Hospitals currently tracked by the rate limiter
    fn tracked_hospitals(&self) -> usize {
        self.rate_limiter.as_ref().map_or(0, |limiter| limiter.len())
    }
}

#[async_trait]
impl SourceCollector for HttpCollector {
    fn kind(&self) -> SourceKind {
        self.kind
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn is_available(&self, hospital: &HospitalDescriptor) -> bool {
        match self.kind {
            SourceKind::GovernmentApi | SourceKind::Survey => true,
            // Partner networks serve an explicit membership list
            SourceKind::PartnerNetwork => {
                self.base_url.is_some() && self.covered_hospitals.contains(&hospital.id)
            }
            SourceKind::HmsApi | SourceKind::AnalyticsPlatform => {
                self.endpoint(hospital).is_some() && self.covers(hospital)
            }
        }
    }

    async fn collect(
        &self,
        hospital: &HospitalDescriptor,
    ) -> std::result::Result<CollectionOutput, CollectorError> {
        let url = self.endpoint(hospital).ok_or_else(|| {
            CollectorError::Unavailable(format!("no endpoint configured for {}", self.kind))
        })?;

        self.wait_turn(&hospital.id).await;

        debug!(source = %self.kind, hospital_id = %hospital.id, url = %url, "Requesting source data");

        let mut request = self.client.get(&url);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                CollectorError::Timeout(self.timeout.as_millis() as u64)
            } else {
                CollectorError::Connectivity(format!("{} request failed: {}", self.kind, e))
            }
        })?;

        check_status(response.status(), self.kind)?;

        let body: Value = response.json().await.map_err(|e| {
            CollectorError::InvalidResponse(format!("{} returned non-JSON body: {}", self.kind, e))
        })?;
        let output = parse_body(body)?;

        info!(
            source = %self.kind,
            hospital_id = %hospital.id,
            fields = output.data.len(),
            success = output.success,
            "Source responded"
        );
        Ok(output)
    }
}

/// Map an HTTP status onto the collector error taxonomy
pub fn check_status(
    status: StatusCode,
    kind: SourceKind,
) -> std::result::Result<(), CollectorError> {
    if status.is_success() {
        return Ok(());
    }
    let detail = format!("{} returned HTTP {}", kind, status);
    Err(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => CollectorError::Authentication(detail),
        StatusCode::TOO_MANY_REQUESTS => CollectorError::QuotaExceeded(detail),
        StatusCode::NOT_FOUND => CollectorError::Unavailable(detail),
        s if s.is_server_error() => CollectorError::Connectivity(detail),
        _ => CollectorError::InvalidResponse(detail),
    })
}

/// Envelope or bare-object response body → [`CollectionOutput`]
pub fn parse_body(body: Value) -> std::result::Result<CollectionOutput, CollectorError> {
    let Value::Object(object) = body else {
        return Err(CollectorError::InvalidResponse(
            "expected a JSON object".to_string(),
        ));
    };

    let is_envelope = (object.contains_key("success") && object.contains_key("data"))
        || object.get("success") == Some(&Value::Bool(false));
    if is_envelope {
        return serde_json::from_value(Value::Object(object))
            .map_err(|e| CollectorError::InvalidResponse(format!("malformed envelope: {}", e)));
    }

    let data: DataMap = object.into_iter().collect();
    Ok(CollectionOutput::success(data))
}
