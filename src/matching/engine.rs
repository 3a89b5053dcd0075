// Per-round order book: admission checks and the batch crossing pass.

use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

use crate::config::ExecutionPriceRule;
use crate::error::AdmissionError;
use crate::types::{Instrument, Order, OrderStatus, Participant, Side, Trade};

/// Orders collected for the active round, across all instruments. Admission
/// assigns a monotonic sequence number that later serves as the price-time
/// tiebreak, so matching stays deterministic for a given submission order.
#[derive(Debug, Default)]
pub struct RoundBook {
    orders: Vec<Order>,
    next_seq: u64,
}

impl RoundBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn orders(&self) -> &[Order] {
        &self.orders
    }

    pub fn orders_mut(&mut self) -> &mut Vec<Order> {
        &mut self.orders
    }

    pub fn orders_of(&self, participant_id: Uuid) -> impl Iterator<Item = &Order> {
        self.orders
            .iter()
            .filter(move |o| o.participant_id == participant_id)
    }

    /// Validate an order against the submitting participant's live balances
    /// and the per-round cap, then append it as PENDING. Nothing is escrowed:
    /// several individually affordable resting orders may jointly exceed the
    /// participant's cash until settlement.
    pub fn admit(
        &mut self,
        participant: &Participant,
        instrument: Instrument,
        side: Side,
        price: u64,
        quantity: u64,
        round: u32,
        cap: u32,
    ) -> Result<Uuid, AdmissionError> {
        if price == 0 {
            return Err(AdmissionError::InvalidPrice);
        }
        if quantity == 0 {
            return Err(AdmissionError::InvalidQuantity);
        }
        if participant.orders_submitted >= cap {
            return Err(AdmissionError::OrderLimitExceeded { cap });
        }

        match side {
            Side::Buy => {
                let cost = price
                    .checked_mul(quantity)
                    .ok_or(AdmissionError::InsufficientFunds {
                        needed: u64::MAX,
                        available: participant.cash,
                    })?;
                if participant.cash < cost {
                    return Err(AdmissionError::InsufficientFunds {
                        needed: cost,
                        available: participant.cash,
                    });
                }
            }
            Side::Sell => {
                let held = participant.shares_of(instrument);
                if held < quantity {
                    return Err(AdmissionError::InsufficientShares {
                        needed: quantity,
                        available: held,
                    });
                }
            }
        }

        let order = Order {
            id: Uuid::new_v4(),
            participant_id: participant.id,
            instrument,
            side,
            price,
            quantity,
            remaining: quantity,
            filled: 0,
            round,
            status: OrderStatus::Pending,
            seq: self.next_seq,
            created_at: Utc::now(),
        };
        self.next_seq += 1;

        debug!(
            "Admitted {:?} {} x{} @ {} from {} (seq {})",
            side, instrument, quantity, price, participant.name, order.seq
        );

        let id = order.id;
        self.orders.push(order);
        Ok(id)
    }

    /// Best open bid/ask for one instrument, used by the no-trade settlement
    /// rules after the crossing pass has consumed all matched liquidity.
    pub fn best_quotes(&self, instrument: Instrument) -> (Option<u64>, Option<u64>) {
        let mut best_bid = None;
        let mut best_ask = None;
        for order in self.orders.iter().filter(|o| o.instrument == instrument && o.is_open()) {
            match order.side {
                Side::Buy => {
                    if best_bid.map_or(true, |b| order.price > b) {
                        best_bid = Some(order.price);
                    }
                }
                Side::Sell => {
                    if best_ask.map_or(true, |a| order.price < a) {
                        best_ask = Some(order.price);
                    }
                }
            }
        }
        (best_bid, best_ask)
    }

    /// Drop everything at the round boundary, or keep open orders resting
    /// when the carry policy is on. Carried orders keep their admission seq,
    /// so earlier rounds retain time priority.
    pub fn clear_round(&mut self, carry_unfilled: bool) {
        if carry_unfilled {
            self.orders.retain(|o| o.is_open());
        } else {
            self.orders.clear();
        }
    }
}

/// Batch price-time-priority cross for one instrument.
///
/// Bids sort by price descending, asks ascending, admission seq breaking
/// ties. Two cursors walk the lists while the best bid still meets the best
/// ask; each match fills `min(remaining)` at the price picked by `rule` and
/// moves order status strictly PENDING -> PARTIAL -> FILLED.
pub fn match_round(
    orders: &mut [Order],
    instrument: Instrument,
    round: u32,
    rule: ExecutionPriceRule,
) -> Vec<Trade> {
    let mut bids: Vec<usize> = Vec::new();
    let mut asks: Vec<usize> = Vec::new();
    for (i, order) in orders.iter().enumerate() {
        if order.instrument != instrument || !order.is_open() {
            continue;
        }
        match order.side {
            Side::Buy => bids.push(i),
            Side::Sell => asks.push(i),
        }
    }

    bids.sort_by(|&a, &b| {
        orders[b]
            .price
            .cmp(&orders[a].price)
            .then(orders[a].seq.cmp(&orders[b].seq))
    });
    asks.sort_by(|&a, &b| {
        orders[a]
            .price
            .cmp(&orders[b].price)
            .then(orders[a].seq.cmp(&orders[b].seq))
    });

    let mut trades = Vec::new();
    let (mut bi, mut ai) = (0, 0);

    while bi < bids.len() && ai < asks.len() {
        let (b, a) = (bids[bi], asks[ai]);
        let bid_price = orders[b].price;
        let ask_price = orders[a].price;
        if bid_price < ask_price {
            break;
        }

        let quantity = orders[b].remaining.min(orders[a].remaining);
        let price = match rule {
            ExecutionPriceRule::SellerPrice => ask_price,
            ExecutionPriceRule::Midpoint => (bid_price + ask_price + 1) / 2,
        };

        fill(&mut orders[b], quantity);
        fill(&mut orders[a], quantity);

        trades.push(Trade {
            id: Uuid::new_v4(),
            instrument,
            price,
            quantity,
            buyer_id: orders[b].participant_id,
            seller_id: orders[a].participant_id,
            round,
            executed_at: Utc::now(),
        });

        debug!(
            "Matched {} x{} @ {} ({} <- {})",
            instrument, quantity, price, orders[b].participant_id, orders[a].participant_id
        );

        if orders[b].remaining == 0 {
            bi += 1;
        }
        if orders[a].remaining == 0 {
            ai += 1;
        }
    }

    trades
}

fn fill(order: &mut Order, quantity: u64) {
    order.remaining -= quantity;
    order.filled += quantity;
    order.status = if order.remaining == 0 {
        OrderStatus::Filled
    } else {
        OrderStatus::Partial
    };
}
