//! Client for the payment collaborators: the checkout-session and
//! payment-intent endpoints, plus the terminal purchase signal the core
//! consumes.
//!
//! The hosted checkout UI itself lives outside the widget. The core only
//! ever sees a [`PurchaseOutcome`]: success credits the wallet, failure is
//! surfaced verbatim with no state changes.

use crowdplay_shared::ApiError;
use serde::{Deserialize, Serialize};

/// Coin packs offered by the purchase flow, priced in minor units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoinPack {
    /// 100 coins — $5.00
    Small,
    /// 250 coins — $10.00
    Medium,
    /// 500 coins — $18.00
    Large,
}

impl CoinPack {
    pub fn coins(self) -> u32 {
        match self {
            CoinPack::Small => 100,
            CoinPack::Medium => 250,
            CoinPack::Large => 500,
        }
    }

    pub fn price_cents(self) -> u32 {
        match self {
            CoinPack::Small => 500,
            CoinPack::Medium => 1000,
            CoinPack::Large => 1800,
        }
    }

    /// Identifier understood by the checkout-session endpoint.
    pub fn pack_id(self) -> &'static str {
        match self {
            CoinPack::Small => "100",
            CoinPack::Medium => "250",
            CoinPack::Large => "500",
        }
    }

    /// Smallest pack covering `shortfall` coins.
    pub fn covering(shortfall: u32) -> CoinPack {
        if shortfall <= 100 {
            CoinPack::Small
        } else if shortfall <= 250 {
            CoinPack::Medium
        } else {
            CoinPack::Large
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct CheckoutSessionRequest<'a> {
    pack: &'a str,
}

/// `POST /api/create-checkout-session` response.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
}

#[derive(Debug, Clone, Serialize)]
struct PaymentIntentRequest {
    amount: u32,
}

/// `POST /api/create-payment-intent` response.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentIntent {
    pub client_secret: String,
}

/// Terminal signal from whichever payment flow is in use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PurchaseOutcome {
    /// Coins were bought: credit the wallet and notify the host.
    Success { coins: u32, session_id: String },
    /// Surfaced verbatim to the user; no state changes.
    Failure(String),
}

/// HTTP client for the payment endpoints.
#[derive(Debug, Clone)]
pub struct CheckoutClient {
    client: reqwest::Client,
    base_url: String,
}

impl CheckoutClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// Ask the collaborator to open a checkout session for `pack`.
    pub async fn create_checkout_session(
        &self,
        pack: CoinPack,
    ) -> Result<CheckoutSession, ApiError> {
        self.post_json(
            "/api/create-checkout-session",
            &CheckoutSessionRequest {
                pack: pack.pack_id(),
            },
        )
        .await
    }

    /// Ask the collaborator for a payment intent over `amount_cents`.
    pub async fn create_payment_intent(&self, amount_cents: u32) -> Result<PaymentIntent, ApiError> {
        self.post_json(
            "/api/create-payment-intent",
            &PaymentIntentRequest {
                amount: amount_cents,
            },
        )
        .await
    }

    async fn post_json<TReq: Serialize, TRes: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: &TReq,
    ) -> Result<TRes, ApiError> {
        let resp = self
            .client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;

        let status = resp.status().as_u16();
        let is_success = resp.status().is_success();

        let text = resp
            .text()
            .await
            .map_err(|e| ApiError::Network(format!("failed to read body: {e}")))?;

        if !is_success {
            return Err(ApiError::Http { status, body: text });
        }

        serde_json::from_str(&text).map_err(|e| ApiError::Deserialize(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_catalog_matches_the_price_list() {
        assert_eq!(CoinPack::Small.coins(), 100);
        assert_eq!(CoinPack::Small.price_cents(), 500);
        assert_eq!(CoinPack::Medium.coins(), 250);
        assert_eq!(CoinPack::Medium.price_cents(), 1000);
        assert_eq!(CoinPack::Large.coins(), 500);
        assert_eq!(CoinPack::Large.price_cents(), 1800);
    }

    #[test]
    fn covering_picks_the_smallest_sufficient_pack() {
        assert_eq!(CoinPack::covering(1), CoinPack::Small);
        assert_eq!(CoinPack::covering(100), CoinPack::Small);
        assert_eq!(CoinPack::covering(101), CoinPack::Medium);
        assert_eq!(CoinPack::covering(250), CoinPack::Medium);
        assert_eq!(CoinPack::covering(400), CoinPack::Large);
    }

    #[test]
    fn urls_join_without_double_slashes() {
        let client = CheckoutClient::new("https://shop.example/");
        assert_eq!(
            client.url("/api/create-checkout-session"),
            "https://shop.example/api/create-checkout-session"
        );
    }
}
