//! Order requests handed to the order-routing collaborator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::OrderId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// +1 for buys, -1 for sells.
    pub fn sign(self) -> f64 {
        match self {
            Self::Buy => 1.0,
            Self::Sell => -1.0,
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }
}

/// Market or limit, with the limit price when there is one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum OrderType {
    Market,
    Limit { price: f64 },
}

/// Why the order was sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderPurpose {
    Entry,
    Exit,
    Reversal,
    ScaleIn,
    ScaleOut,
    Protection,
}

/// A single buy/sell request: side, volume and optional price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub id: OrderId,
    pub instrument: String,
    pub side: OrderSide,
    pub volume: f64,
    pub order_type: OrderType,
    pub purpose: OrderPurpose,
    /// Close time of the bar that produced the order.
    pub bar_time: DateTime<Utc>,
}

impl OrderRequest {
    /// Signed volume: positive for buys, negative for sells.
    pub fn signed_volume(&self) -> f64 {
        self.side.sign() * self.volume
    }

    pub fn limit_price(&self) -> Option<f64> {
        match self.order_type {
            OrderType::Limit { price } => Some(price),
            OrderType::Market => None,
        }
    }
}
