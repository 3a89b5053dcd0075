// Scripted liquidity agents. Each round the market makers quote a few
// orders on both sides of the current price; their orders go through the
// same admission checks as everyone else's.

use rand::Rng;
use std::collections::BTreeMap;

use crate::types::{Instrument, Side};

pub const MARKET_MAKER_NAMES: [&str; 5] = [
    "Goldman MM",
    "Morgan MM",
    "Citadel MM",
    "Jane Street MM",
    "Virtu MM",
];

pub const MARKET_MAKER_CASH: u64 = 100_000;
pub const MARKET_MAKER_SHARES: u64 = 1_000;

/// Bid 98.0%-99.5% of the current price, ask 100.5%-102.0%, in per-mille
/// steps so prices stay whole dollars.
const BID_PERMILLE_LOW: u64 = 980;
const BID_PERMILLE_HIGH: u64 = 995;
const ASK_PERMILLE_LOW: u64 = 1_005;
const ASK_PERMILLE_HIGH: u64 = 1_020;

const MIN_ORDERS_PER_ROUND: u32 = 2;
const MAX_ORDERS_PER_ROUND: u32 = 5;
const MIN_QUANTITY: u64 = 50;
const MAX_QUANTITY: u64 = 199;

/// One quote a market maker wants admitted this round.
#[derive(Debug, Clone, Copy)]
pub struct Quote {
    pub instrument: Instrument,
    pub side: Side,
    pub price: u64,
    pub quantity: u64,
}

/// Roster names for a session with `count` market makers. Beyond the five
/// canonical desks, extras get numbered names.
pub fn roster(count: u32) -> Vec<String> {
    (0..count as usize)
        .map(|i| match MARKET_MAKER_NAMES.get(i) {
            Some(name) => (*name).to_string(),
            None => format!("Market Maker {}", i + 1),
        })
        .collect()
}

/// Quotes one market maker wants to place this round: 2-5 orders, random
/// side and instrument, priced just inside the current market.
pub fn generate_quotes(
    rng: &mut impl Rng,
    prices: &BTreeMap<Instrument, u64>,
    budget: u32,
) -> Vec<Quote> {
    let instruments: Vec<Instrument> = prices.keys().copied().collect();
    if instruments.is_empty() || budget == 0 {
        return Vec::new();
    }

    let wanted = rng.gen_range(MIN_ORDERS_PER_ROUND..=MAX_ORDERS_PER_ROUND).min(budget);
    let mut quotes = Vec::with_capacity(wanted as usize);

    for _ in 0..wanted {
        let instrument = instruments[rng.gen_range(0..instruments.len())];
        let current = prices[&instrument];
        let side = if rng.gen_bool(0.5) { Side::Buy } else { Side::Sell };

        let price = match side {
            Side::Buy => {
                let permille = rng.gen_range(BID_PERMILLE_LOW..=BID_PERMILLE_HIGH);
                (current * permille / 1_000).max(1)
            }
            Side::Sell => {
                let permille = rng.gen_range(ASK_PERMILLE_LOW..=ASK_PERMILLE_HIGH);
                // Integer rounding can collapse a thin spread; always ask
                // at least a dollar over.
                (current * permille / 1_000).max(current + 1)
            }
        };

        quotes.push(Quote {
            instrument,
            side,
            price,
            quantity: rng.gen_range(MIN_QUANTITY..=MAX_QUANTITY),
        });
    }

    quotes
}
