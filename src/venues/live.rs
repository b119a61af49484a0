//! # venues::live
//!
//! **Live Venue**: sends orders to the broker bridge over HTTP.
//!
//! ## Bridge API Contract
//! ```text
//! POST   {base}/orders              → BridgeOrderResponse
//! DELETE {base}/orders/{id}         → BridgeOrderResponse
//! GET    {base}/quote/{symbol}      → { "price": 6326.25 }
//! GET    {base}/account/{id}        → { "balance": 50000.0 }
//! GET    {base}/market/status       → { "open": true }
//! ```
//! A rejected order comes back with `ok = false` and an `error_code`
//! (`INSUFFICIENT_MARGIN`, `MARKET_CLOSED`, …).  Margin rejections may add
//! `required_margin` and `available_margin`.
//!
//! `base_url = "mock"` accepts every order without touching the network.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::config::LiveConfig;
use crate::models::{OrderHandle, OrderSide, OrderType, VenueKind};
use crate::venues::{OrderVenue, VenueError};

// ─── Bridge Request / Response ────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct BridgeOrderRequest<'a> {
    pub account_id: &'a str,
    pub symbol:     &'a str,
    pub side:       &'static str,   // "BUY" | "SELL"
    pub order_type: &'static str,   // "MARKET" | "STOP"
    pub quantity:   u32,
    pub stop_price: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct BridgeOrderResponse {
    pub ok:         bool,
    pub order_id:   Option<String>,
    pub fill_price: Option<f64>,
    pub error_code: Option<String>,
    pub message:    Option<String>,
    /// Sent with `INSUFFICIENT_MARGIN` when the bridge knows the amounts.
    pub required_margin:  Option<f64>,
    pub available_margin: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct QuoteResponse {
    price: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct AccountResponse {
    balance: f64,
}

#[derive(Debug, Deserialize)]
struct MarketStatusResponse {
    open: bool,
}

/// Maps a bridge rejection onto a typed venue error.  A margin rejection
/// without amounts stays a plain rejection carrying the bridge message.
fn map_rejection(resp: &BridgeOrderResponse) -> VenueError {
    let message = resp.message.clone().unwrap_or_else(|| "unknown".to_string());
    match resp.error_code.as_deref() {
        Some("INSUFFICIENT_MARGIN") => match (resp.required_margin, resp.available_margin) {
            (Some(required), Some(available)) => VenueError::InsufficientMargin { required, available },
            _ => VenueError::Rejected(format!("INSUFFICIENT_MARGIN: {message}")),
        },
        Some("MARKET_CLOSED") => VenueError::MarketClosed,
        Some(code) => VenueError::Rejected(format!("{code}: {message}")),
        None => VenueError::Rejected(message),
    }
}

// ─── LiveVenue ────────────────────────────────────────────────────────────────

pub struct LiveVenue {
    client:  reqwest::Client,
    config:  LiveConfig,
    mock_id: AtomicU64,
}

impl LiveVenue {
    pub fn new(config: LiveConfig, client: reqwest::Client) -> Self {
        if config.is_mock() {
            warn!("🎭 [LIVE] Bridge URL is 'mock' — live orders are simulated");
        }
        Self { client, config, mock_id: AtomicU64::new(1) }
    }

    fn is_mock(&self) -> bool {
        self.config.is_mock()
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.base_url.trim_end_matches('/'))
    }

    async fn submit(
        &self,
        side: OrderSide,
        order_type: OrderType,
        quantity: u32,
        stop_price: Option<f64>,
    ) -> Result<OrderHandle, VenueError> {
        if quantity == 0 {
            return Err(VenueError::InvalidQuantity(quantity));
        }

        if self.is_mock() {
            let order_id = format!("MOCK{}", self.mock_id.fetch_add(1, Ordering::Relaxed));
            info!(order_id = %order_id, side = %side, quantity, "🎭 [LIVE] Mock order accepted");
            return Ok(OrderHandle {
                venue: VenueKind::Live,
                order_id,
                side,
                quantity,
                order_type,
                stop_price,
                fill_price: None,
                submitted_at: Utc::now(),
            });
        }

        let request = BridgeOrderRequest {
            account_id: &self.config.account_id,
            symbol:     &self.config.symbol,
            side:       side.as_str(),
            order_type: order_type.as_str(),
            quantity,
            stop_price,
        };

        info!(
            symbol     = %request.symbol,
            side       = %request.side,
            order_type = %request.order_type,
            quantity,
            stop_price = ?stop_price,
            "🚀 [LIVE] Sending order to broker bridge"
        );

        // ── HTTP POST ─────────────────────────────────────────────────────────
        let response = self
            .client
            .post(self.url("/orders"))
            .json(&request)
            .timeout(self.config.request_timeout)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "Broker bridge unreachable");
                VenueError::Unreachable(e.to_string())
            })?;

        let status = response.status();

        // ── Parse Response ────────────────────────────────────────────────────
        // The bridge answers rejections with a 4xx and the same JSON body.
        let body: BridgeOrderResponse = match response.json().await {
            Ok(body) => body,
            Err(e) => {
                error!(http_status = %status, error = %e, "Bridge response parse failed");
                return Err(VenueError::Unreachable(format!("HTTP {status}: {e}")));
            }
        };

        if !body.ok {
            let err = map_rejection(&body);
            warn!(http_status = %status, error = %err, "❌ [LIVE] Bridge rejected order");
            return Err(err);
        }

        let order_id = body
            .order_id
            .ok_or_else(|| VenueError::Rejected("bridge accepted order without an id".into()))?;

        info!(order_id = %order_id, fill_price = ?body.fill_price, "✅ [LIVE] Bridge accepted order");

        Ok(OrderHandle {
            venue: VenueKind::Live,
            order_id,
            side,
            quantity,
            order_type,
            stop_price,
            fill_price: body.fill_price,
            submitted_at: Utc::now(),
        })
    }
}

#[async_trait]
impl OrderVenue for LiveVenue {
    fn kind(&self) -> VenueKind {
        VenueKind::Live
    }

    async fn place_market_order(
        &self,
        side: OrderSide,
        quantity: u32,
    ) -> Result<OrderHandle, VenueError> {
        self.submit(side, OrderType::Market, quantity, None).await
    }

    async fn place_stop_order(
        &self,
        side: OrderSide,
        quantity: u32,
        stop_price: f64,
    ) -> Result<OrderHandle, VenueError> {
        self.submit(side, OrderType::Stop, quantity, Some(stop_price)).await
    }

    async fn cancel_order(&self, handle: &OrderHandle) -> bool {
        if self.is_mock() {
            return true;
        }

        let result = self
            .client
            .delete(self.url(&format!("/orders/{}", handle.order_id)))
            .timeout(self.config.request_timeout)
            .send()
            .await;

        match result {
            Ok(resp) => match resp.json::<BridgeOrderResponse>().await {
                Ok(body) if body.ok => true,
                Ok(body) => {
                    warn!(order_id = %handle.order_id, error = %map_rejection(&body), "Bridge refused cancel");
                    false
                }
                Err(e) => {
                    warn!(order_id = %handle.order_id, error = %e, "Bridge cancel response unreadable");
                    false
                }
            },
            Err(e) => {
                error!(order_id = %handle.order_id, error = %e, "Bridge unreachable on cancel");
                false
            }
        }
    }

    async fn current_price(&self) -> Option<f64> {
        if self.is_mock() {
            return None;
        }

        let resp = self
            .client
            .get(self.url(&format!("/quote/{}", self.config.symbol)))
            .timeout(self.config.request_timeout)
            .send()
            .await
            .ok()?;

        match resp.json::<QuoteResponse>().await {
            Ok(quote) => quote.price,
            Err(e) => {
                warn!(error = %e, "Bridge quote unreadable");
                None
            }
        }
    }

    async fn account_balance(&self) -> Result<f64, VenueError> {
        if self.is_mock() {
            return Err(VenueError::Unreachable("mock bridge has no account".into()));
        }

        let resp = self
            .client
            .get(self.url(&format!("/account/{}", self.config.account_id)))
            .timeout(self.config.request_timeout)
            .send()
            .await
            .map_err(|e| VenueError::Unreachable(e.to_string()))?;

        resp.json::<AccountResponse>()
            .await
            .map(|a| a.balance)
            .map_err(|e| VenueError::Unreachable(format!("account response: {e}")))
    }

    async fn is_market_open(&self) -> bool {
        if self.is_mock() {
            return true;
        }

        let resp = match self
            .client
            .get(self.url("/market/status"))
            .timeout(self.config.request_timeout)
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                warn!(error = %e, "Bridge market status unreachable — treating market as closed");
                return false;
            }
        };

        resp.json::<MarketStatusResponse>().await.map(|s| s.open).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn mock_venue() -> LiveVenue {
        LiveVenue::new(
            LiveConfig {
                base_url:        "mock".into(),
                account_id:      "ACC-1".into(),
                symbol:          "MES".into(),
                request_timeout: Duration::from_secs(1),
            },
            reqwest::Client::new(),
        )
    }

    #[test]
    fn test_map_rejection_codes() {
        let resp = |code: Option<&str>| BridgeOrderResponse {
            ok:               false,
            order_id:         None,
            fill_price:       None,
            error_code:       code.map(str::to_string),
            message:          Some("nope".into()),
            required_margin:  None,
            available_margin: None,
        };

        assert_eq!(
            map_rejection(&resp(Some("INSUFFICIENT_MARGIN"))),
            VenueError::Rejected("INSUFFICIENT_MARGIN: nope".into())
        );
        let with_amounts = BridgeOrderResponse {
            required_margin:  Some(1500.0),
            available_margin: Some(900.0),
            ..resp(Some("INSUFFICIENT_MARGIN"))
        };
        let err = map_rejection(&with_amounts);
        assert_eq!(err, VenueError::InsufficientMargin { required: 1500.0, available: 900.0 });
        assert_eq!(err.to_string(), "insufficient margin: required 1500.00, available 900.00");
        assert_eq!(map_rejection(&resp(Some("MARKET_CLOSED"))), VenueError::MarketClosed);
        assert_eq!(map_rejection(&resp(Some("HALTED"))), VenueError::Rejected("HALTED: nope".into()));
        assert_eq!(map_rejection(&resp(None)), VenueError::Rejected("nope".into()));
    }

    #[tokio::test]
    async fn test_mock_orders_get_sequential_ids() {
        let venue = mock_venue();
        let first  = venue.place_market_order(OrderSide::Buy, 1).await.unwrap();
        let second = venue.place_stop_order(OrderSide::Sell, 1, 6316.0).await.unwrap();

        assert_eq!(first.display_id(), "LIVE_MOCK1");
        assert_eq!(second.display_id(), "LIVE_MOCK2");
        assert_eq!(second.stop_price, Some(6316.0));
        assert!(first.fill_price.is_none());
        assert!(venue.cancel_order(&second).await);
    }

    #[tokio::test]
    async fn test_mock_has_no_quote_or_balance() {
        let venue = mock_venue();
        assert_eq!(venue.current_price().await, None);
        assert!(venue.account_balance().await.is_err());
        assert!(venue.is_market_open().await);
    }

    #[tokio::test]
    async fn test_unreachable_bridge_is_typed_error() {
        let venue = LiveVenue::new(
            LiveConfig {
                base_url:        "http://127.0.0.1:1".into(),
                account_id:      "ACC-1".into(),
                symbol:          "MES".into(),
                request_timeout: Duration::from_millis(200),
            },
            reqwest::Client::new(),
        );
        let err = venue.place_market_order(OrderSide::Buy, 1).await.unwrap_err();
        assert!(matches!(err, VenueError::Unreachable(_)));
        assert!(!venue.is_market_open().await);
    }
}
