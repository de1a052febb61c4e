//! Simulated exchange sessions
//!
//! Each connected dashboard session gets its own `ExchangeSession` with its
//! own balances. Sessions live in a `SessionRegistry` owned by the caller;
//! there is no process-wide balance state.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use thiserror::Error;
use tracing::{debug, info};

pub type SessionId = u64;

/// Quote assets recognised when a symbol has no separator (e.g. `BTCUSDT`)
const KNOWN_QUOTES: [&str; 4] = ["USDT", "USDC", "USD", "BTC"];

pub const DEFAULT_QUOTE_ASSET: &str = "USDT";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    #[error("Unknown session {0}")]
    UnknownSession(SessionId),

    #[error("Invalid order: {0}")]
    InvalidOrder(String),

    #[error("Insufficient {asset} balance: required {required}, available {available}")]
    InsufficientBalance {
        asset: String,
        required: Decimal,
        available: Decimal,
    },
}

impl SessionError {
    pub fn kind(&self) -> &'static str {
        match self {
            SessionError::UnknownSession(_) => "unknown_session",
            SessionError::InvalidOrder(_) => "invalid_order",
            SessionError::InsufficientBalance { .. } => "insufficient_balance",
        }
    }
}

pub type SessionResult<T> = Result<T, SessionError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

/// Market order filled immediately at `price`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketOrder {
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: Decimal,
    pub price: Decimal,
}

/// A filled simulated order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub base: String,
    pub quote: String,
    pub side: OrderSide,
    pub quantity: Decimal,
    pub price: Decimal,
    pub notional: Decimal,
    pub time: DateTime<Utc>,
}

/// Split `BTC/USDT`, `BTC-USDT` or `BTCUSDT` into base and quote
pub fn split_symbol(symbol: &str) -> SessionResult<(String, String)> {
    let symbol = symbol.trim().to_ascii_uppercase();
    if let Some((base, quote)) = symbol.split_once(|c: char| c == '/' || c == '-') {
        if !base.is_empty() && !quote.is_empty() && base != quote {
            return Ok((base.to_string(), quote.to_string()));
        }
    }
    for quote in KNOWN_QUOTES {
        if let Some(base) = symbol.strip_suffix(quote) {
            if !base.is_empty() && base != quote {
                return Ok((base.to_string(), quote.to_string()));
            }
        }
    }
    Err(SessionError::InvalidOrder(format!(
        "cannot split symbol {:?} into base and quote",
        symbol
    )))
}

/// Balances and fill history of one simulated account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeSession {
    pub id: SessionId,
    pub created_at: DateTime<Utc>,
    balances: BTreeMap<String, Decimal>,
    fills: Vec<Fill>,
}

impl ExchangeSession {
    pub fn new(id: SessionId, quote_balance: Decimal) -> Self {
        let mut balances = BTreeMap::new();
        balances.insert(DEFAULT_QUOTE_ASSET.to_string(), quote_balance);
        Self {
            id,
            created_at: Utc::now(),
            balances,
            fills: Vec::new(),
        }
    }

    pub fn balance(&self, asset: &str) -> Decimal {
        self.balances
            .get(&asset.to_ascii_uppercase())
            .copied()
            .unwrap_or(Decimal::ZERO)
    }

    pub fn balances(&self) -> &BTreeMap<String, Decimal> {
        &self.balances
    }

    pub fn fills(&self) -> &[Fill] {
        &self.fills
    }

    pub fn deposit(&mut self, asset: &str, amount: Decimal) -> SessionResult<()> {
        if amount <= Decimal::ZERO {
            return Err(SessionError::InvalidOrder("deposit must be positive".to_string()));
        }
        let asset = asset.to_ascii_uppercase();
        let updated = self
            .balance(&asset)
            .checked_add(amount)
            .ok_or_else(|| SessionError::InvalidOrder(format!("{} balance overflow", asset)))?;
        self.balances.insert(asset, updated);
        Ok(())
    }

    /// Apply a market fill. Balances are untouched when an error is returned.
    pub fn apply_fill(&mut self, order: &MarketOrder) -> SessionResult<Fill> {
        if order.quantity <= Decimal::ZERO {
            return Err(SessionError::InvalidOrder("quantity must be positive".to_string()));
        }
        if order.price <= Decimal::ZERO {
            return Err(SessionError::InvalidOrder("price must be positive".to_string()));
        }

        let (base, quote) = split_symbol(&order.symbol)?;
        let notional = order
            .quantity
            .checked_mul(order.price)
            .ok_or_else(|| SessionError::InvalidOrder("notional overflow".to_string()))?;

        let (debit_asset, debit, credit_asset, credit) = match order.side {
            OrderSide::Buy => (&quote, notional, &base, order.quantity),
            OrderSide::Sell => (&base, order.quantity, &quote, notional),
        };

        let available = self.balance(debit_asset);
        if available < debit {
            return Err(SessionError::InsufficientBalance {
                asset: debit_asset.clone(),
                required: debit,
                available,
            });
        }

        // Both balances are computed before either is written
        let credited = self
            .balance(credit_asset)
            .checked_add(credit)
            .ok_or_else(|| {
                SessionError::InvalidOrder(format!("{} balance overflow", credit_asset))
            })?;
        self.balances.insert(debit_asset.clone(), available - debit);
        self.balances.insert(credit_asset.clone(), credited);

        let fill = Fill {
            base,
            quote,
            side: order.side,
            quantity: order.quantity,
            price: order.price,
            notional,
            time: Utc::now(),
        };

        debug!(
            session = self.id,
            side = ?fill.side,
            base = %fill.base,
            quantity = %fill.quantity,
            price = %fill.price,
            "Simulated fill"
        );

        self.fills.push(fill.clone());
        Ok(fill)
    }
}

/// All live sessions, keyed by id
pub struct SessionRegistry {
    next_id: AtomicU64,
    sessions: RwLock<HashMap<SessionId, ExchangeSession>>,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Open a session funded with `quote_balance` (10 000 USDT when `None`)
    pub fn create(&self, quote_balance: Option<Decimal>) -> SessionResult<ExchangeSession> {
        let balance = quote_balance.unwrap_or(dec!(10000));
        if balance < Decimal::ZERO {
            return Err(SessionError::InvalidOrder(
                "initial balance must not be negative".to_string(),
            ));
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let session = ExchangeSession::new(id, balance);
        self.sessions
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id, session.clone());
        info!(session = id, balance = %balance, "Session opened");
        Ok(session)
    }

    pub fn get(&self, id: SessionId) -> SessionResult<ExchangeSession> {
        self.sessions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&id)
            .cloned()
            .ok_or(SessionError::UnknownSession(id))
    }

    pub fn apply_fill(&self, id: SessionId, order: &MarketOrder) -> SessionResult<Fill> {
        let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
        let session = sessions
            .get_mut(&id)
            .ok_or(SessionError::UnknownSession(id))?;
        session.apply_fill(order)
    }

    pub fn close(&self, id: SessionId) -> SessionResult<()> {
        self.sessions
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&id)
            .map(|_| info!(session = id, "Session closed"))
            .ok_or(SessionError::UnknownSession(id))
    }

    pub fn len(&self) -> usize {
        self.sessions.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
