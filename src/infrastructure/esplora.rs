use crate::domain::balance::BalanceObservation;
use crate::domain::ports::BalanceSource;
use crate::error::BalanceError;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_ESPLORA_URL: &str = "https://blockstream.info/api";

#[derive(Debug, Deserialize)]
struct AddressStats {
    funded_txo_sum: u64,
}

#[derive(Debug, Deserialize)]
struct AddressInfo {
    chain_stats: AddressStats,
}

/// Reads confirmed totals received by BTC addresses from an Esplora API.
///
/// The amount reported is everything the address has ever received on
/// chain, so funds forwarded elsewhere after payment still count.
pub struct EsploraBalanceSource {
    client: Client,
    base_url: String,
    addresses: BTreeMap<String, String>,
}

impl EsploraBalanceSource {
    /// # Arguments
    ///
    /// * `base_url` - API root, e.g. `https://blockstream.info/api`.
    /// * `addresses` - Mapping of policy label to BTC address.
    /// * `timeout` - Per-request timeout.
    pub fn new(
        base_url: impl Into<String>,
        addresses: BTreeMap<String, String>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            addresses,
        })
    }

    fn address_url(&self, address: &str) -> String {
        format!("{}/address/{}", self.base_url, address)
    }
}

#[async_trait]
impl BalanceSource for EsploraBalanceSource {
    async fn fetch(&self, label: &str) -> Result<BalanceObservation, BalanceError> {
        let address = self
            .addresses
            .get(label)
            .ok_or_else(|| BalanceError::NotConfigured(label.to_string()))?;
        let network_error = |e: reqwest::Error| BalanceError::NetworkError {
            label: label.to_string(),
            reason: e.to_string(),
        };

        let info: AddressInfo = self
            .client
            .get(self.address_url(address))
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(network_error)?
            .json()
            .await
            .map_err(network_error)?;

        debug!(label, address, sats = info.chain_stats.funded_txo_sum, "fetched address stats");
        Ok(BalanceObservation::from_sats(
            label,
            info.chain_stats.funded_txo_sum,
        ))
    }
}
