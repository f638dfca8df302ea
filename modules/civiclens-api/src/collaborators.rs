//! External collaborators: reverse geocoding and image storage.
//!
//! Both are best-effort from the issue pipeline's point of view: a failed
//! geocode leaves the address empty, a failed storage delete is logged and
//! skipped. Neither may fail the request that triggered it.

use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use tracing::warn;
use url::Url;

use civiclens_common::Address;

const GEOCODE_TIMEOUT: Duration = Duration::from_secs(10);
const STORAGE_TIMEOUT: Duration = Duration::from_secs(15);

/// Reverse geocoding capability.
#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn reverse(&self, lat: f64, lng: f64) -> Result<Address>;
}

/// External image store: deletes stored objects by their storage id.
#[async_trait]
pub trait ImageStore: Send + Sync {
    async fn delete(&self, storage_id: &str) -> Result<()>;
}

/// Nominatim-compatible reverse geocoder.
pub struct NominatimGeocoder {
    base_url: String,
    http: Client,
}

impl NominatimGeocoder {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http: Client::new(),
        }
    }
}

#[async_trait]
impl Geocoder for NominatimGeocoder {
    async fn reverse(&self, lat: f64, lng: f64) -> Result<Address> {
        let mut url = Url::parse(&format!("{}/reverse", self.base_url))?;
        url.query_pairs_mut()
            .append_pair("format", "jsonv2")
            .append_pair("lat", &lat.to_string())
            .append_pair("lon", &lng.to_string());

        let resp = self
            .http
            .get(url)
            .header("User-Agent", "civiclens")
            .timeout(GEOCODE_TIMEOUT)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(anyhow!("geocoder returned {}", resp.status()));
        }

        let body: serde_json::Value = resp.json().await?;
        let addr = &body["address"];
        let get = |key: &str| addr[key].as_str().map(str::to_string);

        Ok(Address {
            street: get("road"),
            city: get("city").or_else(|| get("town")).or_else(|| get("village")),
            state: get("state"),
            zip_code: get("postcode"),
            country: get("country"),
            formatted: body["display_name"].as_str().map(str::to_string),
        })
    }
}

/// HTTP image store client. Deletion is DELETE {base}/images/{storage_id}.
pub struct HttpImageStore {
    base_url: String,
    http: Client,
}

impl HttpImageStore {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http: Client::new(),
        }
    }
}

#[async_trait]
impl ImageStore for HttpImageStore {
    async fn delete(&self, storage_id: &str) -> Result<()> {
        let url = format!("{}/images/{storage_id}", self.base_url);
        let resp = self
            .http
            .delete(&url)
            .timeout(STORAGE_TIMEOUT)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(anyhow!("image store returned {}", resp.status()));
        }
        Ok(())
    }
}

/// No-op geocoder for deployments without a geocoding service.
pub struct NoopGeocoder;

#[async_trait]
impl Geocoder for NoopGeocoder {
    async fn reverse(&self, _lat: f64, _lng: f64) -> Result<Address> {
        Ok(Address::default())
    }
}

/// No-op image store. Deletes succeed silently so cascade cleanup is a no-op.
pub struct NoopImageStore;

#[async_trait]
impl ImageStore for NoopImageStore {
    async fn delete(&self, _storage_id: &str) -> Result<()> {
        Ok(())
    }
}

/// Delete a batch of stored images, logging failures instead of propagating.
pub async fn cleanup_images(store: &dyn ImageStore, storage_ids: &[String]) {
    for storage_id in storage_ids {
        if let Err(e) = store.delete(storage_id).await {
            warn!(storage_id = %storage_id, error = %e, "failed to delete stored image");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn noop_geocoder_returns_empty_address() {
        let addr = NoopGeocoder.reverse(40.7589, -73.9851).await.unwrap();
        assert!(addr.is_empty());
    }

    #[tokio::test]
    async fn noop_image_store_cleanup_succeeds() {
        cleanup_images(&NoopImageStore, &["img-1".to_string(), "img-2".to_string()]).await;
        assert!(NoopImageStore.delete("img-3").await.is_ok());
    }
}
