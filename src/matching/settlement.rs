// Post-match settlement: portfolio transfers and the published price.

use std::collections::BTreeMap;
use tracing::debug;
use uuid::Uuid;

use crate::error::GameError;
use crate::types::{Instrument, Participant, Role, Trade};

/// One-sided books drift the price by 5% per round, modelling order-book
/// pressure without trades. Bid-only pressure decays the price, ask-only
/// pressure raises it.
const DRIFT_PCT: u64 = 5;
/// Settlement never publishes a price below this.
const PRICE_FLOOR: u64 = 1;

/// Move cash and shares for one executed trade. Both legs are validated
/// before either is applied; a leg that would go negative means admission
/// failed to enforce solvency and the session must halt.
pub fn apply_trade(participants: &mut [Participant], trade: &Trade) -> Result<(), GameError> {
    let cost = trade
        .price
        .checked_mul(trade.quantity)
        .ok_or_else(|| GameError::Invariant(format!("trade {} notional overflow", trade.id)))?;

    let buyer_idx = index_of(participants, trade.buyer_id)
        .ok_or_else(|| GameError::Invariant(format!("trade {} names unknown buyer", trade.id)))?;
    let seller_idx = index_of(participants, trade.seller_id)
        .ok_or_else(|| GameError::Invariant(format!("trade {} names unknown seller", trade.id)))?;

    if participants[buyer_idx].cash < cost {
        return Err(GameError::Invariant(format!(
            "buyer {} cannot cover trade {} ({} < {})",
            participants[buyer_idx].name, trade.id, participants[buyer_idx].cash, cost
        )));
    }
    if participants[seller_idx].shares_of(trade.instrument) < trade.quantity {
        return Err(GameError::Invariant(format!(
            "seller {} cannot deliver trade {} ({} < {})",
            participants[seller_idx].name,
            trade.id,
            participants[seller_idx].shares_of(trade.instrument),
            trade.quantity
        )));
    }

    participants[buyer_idx].cash -= cost;
    *participants[buyer_idx]
        .shares
        .entry(trade.instrument)
        .or_insert(0) += trade.quantity;

    participants[seller_idx].cash += cost;
    *participants[seller_idx]
        .shares
        .entry(trade.instrument)
        .or_insert(0) -= trade.quantity;

    debug!(
        "Settled trade {}: {} x{} @ {} from {} to {}",
        trade.id,
        trade.instrument,
        trade.quantity,
        trade.price,
        participants[seller_idx].name,
        participants[buyer_idx].name
    );

    Ok(())
}

/// Recompute every participant's mark-to-market total value.
pub fn revalue(participants: &mut [Participant], prices: &BTreeMap<Instrument, u64>) {
    for p in participants.iter_mut() {
        let holdings: u64 = p
            .shares
            .iter()
            .map(|(instrument, qty)| qty * prices.get(instrument).copied().unwrap_or(0))
            .sum();
        p.total_value = p.cash + holdings;
    }
}

/// Assign final ranks to Player participants: descending total value,
/// earlier join breaking ties. Market makers and monitors are not ranked.
pub fn rank(participants: &mut [Participant]) {
    let mut ranked: Vec<usize> = participants
        .iter()
        .enumerate()
        .filter(|(_, p)| p.role == Role::Player)
        .map(|(i, _)| i)
        .collect();
    ranked.sort_by(|&a, &b| {
        participants[b]
            .total_value
            .cmp(&participants[a].total_value)
            .then(participants[a].joined_seq.cmp(&participants[b].joined_seq))
    });
    for (position, idx) in ranked.into_iter().enumerate() {
        participants[idx].rank = Some(position as u32 + 1);
    }
}

/// New published price for one instrument at round close.
///
/// Trades this round settle to their volume-weighted average, rounded
/// half-up to a whole dollar. With no trades the price moves to the midpoint
/// of remaining best bid/ask, or drifts toward the one surviving side.
pub fn settle_price(
    current: u64,
    trades: &[Trade],
    best_bid: Option<u64>,
    best_ask: Option<u64>,
) -> u64 {
    let settled = if !trades.is_empty() {
        let volume: u64 = trades.iter().map(|t| t.quantity).sum();
        let notional: u64 = trades.iter().map(|t| t.price * t.quantity).sum();
        (notional + volume / 2) / volume
    } else {
        match (best_bid, best_ask) {
            (Some(bid), Some(ask)) => (bid + ask + 1) / 2,
            (Some(bid), None) => bid * (100 - DRIFT_PCT) / 100,
            (None, Some(ask)) => ask * (100 + DRIFT_PCT) / 100,
            (None, None) => current,
        }
    };
    settled.max(PRICE_FLOOR)
}

fn index_of(participants: &[Participant], id: Uuid) -> Option<usize> {
    participants.iter().position(|p| p.id == id)
}
