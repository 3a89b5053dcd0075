// Round-close matching pipeline: cross the book per instrument, settle the
// published price, and transfer portfolios for every executed trade.

use std::collections::BTreeMap;
use tracing::info;

use crate::config::GameConfig;
use crate::error::GameError;
use crate::types::{Instrument, Participant, Trade};

pub mod engine;
pub mod settlement;

pub use engine::RoundBook;

/// Outcome of processing one instrument at round close.
pub struct InstrumentSettlement {
    pub instrument: Instrument,
    pub trades: Vec<Trade>,
    pub price: u64,
}

/// Run the batch cross and settlement for every configured instrument.
/// Trades are applied to the ledger as they are produced; a ledger failure
/// is an invariant breach and aborts the round (and the session).
pub fn process_round(
    book: &mut RoundBook,
    participants: &mut [Participant],
    prices: &BTreeMap<Instrument, u64>,
    round: u32,
    config: &GameConfig,
) -> Result<Vec<InstrumentSettlement>, GameError> {
    let mut settlements = Vec::with_capacity(config.instruments.len());

    for &instrument in &config.instruments {
        let trades = engine::match_round(
            book.orders_mut(),
            instrument,
            round,
            config.execution_price_rule,
        );

        for trade in &trades {
            settlement::apply_trade(participants, trade)?;
        }

        let (best_bid, best_ask) = book.best_quotes(instrument);
        let current = prices.get(&instrument).copied().unwrap_or(PRICE_SEED_FALLBACK);
        let price = settlement::settle_price(current, &trades, best_bid, best_ask);

        info!(
            "Round {} {}: {} trades, price {} -> {}",
            round,
            instrument,
            trades.len(),
            current,
            price
        );

        settlements.push(InstrumentSettlement {
            instrument,
            trades,
            price,
        });
    }

    Ok(settlements)
}

/// Used only if an instrument somehow has no seeded price yet.
const PRICE_SEED_FALLBACK: u64 = 50;
