// Environment-driven configuration. Every knob has a default matching the
// canonical ruleset; `.env` is honored the same way the service reads the
// rest of its environment.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::types::{Instrument, Side};

/// Which price a crossing pair executes at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionPriceRule {
    /// The resting sell order sets the clearing price (canonical).
    SellerPrice,
    /// Midpoint of the crossing pair, rounded half-up.
    Midpoint,
}

/// A scripted one-off order injected at the start of PROCESSING for the
/// given round. It is admitted and matched like any other order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketEvent {
    pub round: u32,
    pub instrument: Instrument,
    pub side: Side,
    pub price: u64,
    pub quantity: u64,
}

#[derive(Debug, Clone)]
pub struct GameConfig {
    pub bind_addr: String,
    pub total_rounds: u32,
    pub order_cap: u32,
    /// Seconds until a trading round closes on its own; 0 disables the timer
    /// and rounds advance only through monitor actions.
    pub round_timer_secs: u64,
    pub starting_cash: u64,
    pub instruments: Vec<Instrument>,
    pub execution_price_rule: ExecutionPriceRule,
    /// Keep unfilled orders resting into the next round instead of clearing
    /// them at the round boundary.
    pub carry_unfilled: bool,
    pub market_makers: u32,
    pub market_events: Vec<MarketEvent>,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            total_rounds: 10,
            order_cap: 5,
            round_timer_secs: 0,
            starting_cash: 10_000,
            instruments: vec![Instrument::Camb, Instrument::Oxfd],
            execution_price_rule: ExecutionPriceRule::SellerPrice,
            carry_unfilled: false,
            market_makers: 5,
            market_events: Vec::new(),
        }
    }
}

impl GameConfig {
    pub fn from_env() -> Self {
        let defaults = GameConfig::default();

        let instruments = std::env::var("INSTRUMENTS")
            .ok()
            .map(|raw| {
                raw.split(',')
                    .filter_map(|s| {
                        let parsed = Instrument::parse(s);
                        if parsed.is_none() {
                            warn!("Ignoring unknown instrument {:?} in INSTRUMENTS", s);
                        }
                        parsed
                    })
                    .collect::<Vec<_>>()
            })
            .filter(|v| !v.is_empty())
            .unwrap_or(defaults.instruments);

        let execution_price_rule = match std::env::var("EXECUTION_PRICE_RULE").as_deref() {
            Ok("midpoint") => ExecutionPriceRule::Midpoint,
            Ok("seller") | Err(_) => ExecutionPriceRule::SellerPrice,
            Ok(other) => {
                warn!("Unknown EXECUTION_PRICE_RULE {:?}, using seller price", other);
                ExecutionPriceRule::SellerPrice
            }
        };

        let market_events = std::env::var("MARKET_EVENTS")
            .ok()
            .map(|raw| match serde_json::from_str::<Vec<MarketEvent>>(&raw) {
                Ok(events) => events,
                Err(e) => {
                    warn!("Failed to parse MARKET_EVENTS: {}", e);
                    Vec::new()
                }
            })
            .unwrap_or_default();

        Self {
            bind_addr: env_or("BIND_ADDR", defaults.bind_addr),
            total_rounds: env_parsed("TOTAL_ROUNDS", defaults.total_rounds),
            order_cap: env_parsed("ORDER_CAP", defaults.order_cap),
            round_timer_secs: env_parsed("ROUND_TIMER_SECS", defaults.round_timer_secs),
            starting_cash: env_parsed("STARTING_CASH", defaults.starting_cash),
            instruments,
            execution_price_rule,
            carry_unfilled: env_parsed("CARRY_UNFILLED", defaults.carry_unfilled),
            market_makers: env_parsed("MARKET_MAKERS", defaults.market_makers),
            market_events,
        }
    }
}

fn env_or(key: &str, default: String) -> String {
    std::env::var(key).unwrap_or(default)
}

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("Could not parse {}={:?}, using default", key, raw);
            default
        }),
        Err(_) => default,
    }
}
