// Core types for the trading game service

use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Tradable instrument. A session trades a configured subset (one or both).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Instrument {
    #[serde(rename = "CAMB")]
    Camb, // Cambridge Mining
    #[serde(rename = "OXFD")]
    Oxfd, // Oxford Water
}

impl Instrument {
    pub fn all() -> [Instrument; 2] {
        [Instrument::Camb, Instrument::Oxfd]
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Instrument::Camb => "CAMB",
            Instrument::Oxfd => "OXFD",
        }
    }

    pub fn parse(s: &str) -> Option<Instrument> {
        match s.trim().to_ascii_uppercase().as_str() {
            "CAMB" => Some(Instrument::Camb),
            "OXFD" => Some(Instrument::Oxfd),
            _ => None,
        }
    }
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderStatus {
    Pending,
    Partial,
    Filled,
}

/// Participant capabilities are fixed by role; a monitor that trades or a
/// trading participant that drives rounds is unrepresentable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Player,
    MarketMaker,
    Monitor,
}

impl Role {
    pub fn can_trade(&self) -> bool {
        matches!(self, Role::Player | Role::MarketMaker)
    }

    pub fn can_admin_round(&self) -> bool {
        matches!(self, Role::Monitor)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum GamePhase {
    Lobby,
    Setup,
    Trading,
    Processing,
    Results,
    Finished,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    pub id: Uuid,
    pub name: String,
    pub role: Role,
    pub cash: u64,
    pub shares: BTreeMap<Instrument, u64>,
    pub total_value: u64,
    pub online: bool,
    pub orders_submitted: u32,
    pub done: bool,
    /// Join order, used as the stable ranking tie-break.
    pub joined_seq: u64,
    pub rank: Option<u32>,
}

impl Participant {
    pub fn new(name: String, role: Role, cash: u64, joined_seq: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            role,
            cash,
            shares: BTreeMap::new(),
            total_value: cash,
            online: true,
            orders_submitted: 0,
            done: false,
            joined_seq,
            rank: None,
        }
    }

    pub fn shares_of(&self, instrument: Instrument) -> u64 {
        self.shares.get(&instrument).copied().unwrap_or(0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub participant_id: Uuid,
    pub instrument: Instrument,
    pub side: Side,
    /// Whole-dollar price. Fractional prices are rejected at the wire.
    pub price: u64,
    pub quantity: u64,
    pub remaining: u64,
    pub filled: u64,
    pub round: u32,
    pub status: OrderStatus,
    /// Monotonic admission sequence, the price-time tiebreak.
    pub seq: u64,
    pub created_at: DateTime<Utc>,
}

impl Order {
    pub fn is_open(&self) -> bool {
        self.status != OrderStatus::Filled && self.remaining > 0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub id: Uuid,
    pub instrument: Instrument,
    pub price: u64,
    pub quantity: u64,
    pub buyer_id: Uuid,
    pub seller_id: Uuid,
    pub round: u32,
    pub executed_at: DateTime<Utc>,
}

/// One point of the published price series. Seeded pre-game history carries
/// no round number; points appended at round close do, plus whether any
/// trade executed that round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricePoint {
    pub day: u32,
    pub round: Option<u32>,
    pub prices: BTreeMap<Instrument, u64>,
    pub traded: bool,
}

/// The full authoritative state pushed to every client after each accepted
/// mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameStateSnapshot {
    pub session_id: String,
    pub phase: GamePhase,
    pub current_round: u32,
    pub total_rounds: u32,
    pub order_cap: u32,
    pub participants: Vec<Participant>,
    pub orders: Vec<Order>,
    pub trades: Vec<Trade>,
    pub price_history: Vec<PricePoint>,
    pub current_prices: BTreeMap<Instrument, u64>,
}

// WebSocket message types

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    Join {
        player_name: String,
        #[serde(default)]
        as_monitor: bool,
    },
    Reconnect {
        participant_id: Uuid,
    },
    StartGame,
    StartTrading,
    SubmitOrder {
        instrument: Instrument,
        side: Side,
        price: u64,
        quantity: u64,
    },
    MarkDone,
    ForceClose,
    ProcessRound,
    NextRound,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    StateSnapshot {
        state: GameStateSnapshot,
    },
    ParticipantAssigned {
        participant_id: Uuid,
    },
    Error {
        kind: String,
        message: String,
    },
}
