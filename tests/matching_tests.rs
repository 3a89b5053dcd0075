// Pure matching and settlement tests: crossing algorithm, price rules,
// ledger conservation. No server, no sockets.

use chrono::Utc;
use std::collections::BTreeMap;
use uuid::Uuid;

use trading_game_service::config::ExecutionPriceRule;
use trading_game_service::error::{AdmissionError, GameError};
use trading_game_service::matching::engine::{match_round, RoundBook};
use trading_game_service::matching::settlement;
use trading_game_service::types::{
    Instrument, OrderStatus, Participant, Role, Side, Trade,
};

fn player(name: &str, cash: u64, seq: u64) -> Participant {
    Participant::new(name.to_string(), Role::Player, cash, seq)
}

fn holder(name: &str, cash: u64, shares: u64, seq: u64) -> Participant {
    let mut p = player(name, cash, seq);
    p.shares.insert(Instrument::Camb, shares);
    p
}

fn trade(price: u64, quantity: u64, buyer: Uuid, seller: Uuid) -> Trade {
    Trade {
        id: Uuid::new_v4(),
        instrument: Instrument::Camb,
        price,
        quantity,
        buyer_id: buyer,
        seller_id: seller,
        round: 1,
        executed_at: Utc::now(),
    }
}

#[test]
fn single_cross_settles_at_seller_price() {
    let buyer = player("P1", 10_000, 0);
    let seller = holder("P2", 10_000, 200, 1);

    let mut book = RoundBook::new();
    book.admit(&buyer, Instrument::Camb, Side::Buy, 50, 100, 1, 5)
        .unwrap();
    book.admit(&seller, Instrument::Camb, Side::Sell, 48, 100, 1, 5)
        .unwrap();

    let trades = match_round(
        book.orders_mut(),
        Instrument::Camb,
        1,
        ExecutionPriceRule::SellerPrice,
    );

    assert_eq!(trades.len(), 1);
    assert_eq!(trades[0].price, 48);
    assert_eq!(trades[0].quantity, 100);
    assert_eq!(trades[0].buyer_id, buyer.id);
    assert_eq!(trades[0].seller_id, seller.id);

    let mut participants = vec![buyer, seller];
    settlement::apply_trade(&mut participants, &trades[0]).unwrap();

    assert_eq!(participants[0].cash, 10_000 - 4_800);
    assert_eq!(participants[0].shares_of(Instrument::Camb), 100);
    assert_eq!(participants[1].cash, 10_000 + 4_800);
    assert_eq!(participants[1].shares_of(Instrument::Camb), 100);
}

#[test]
fn midpoint_rule_splits_the_spread() {
    let buyer = player("B", 10_000, 0);
    let seller = holder("S", 0, 100, 1);

    let mut book = RoundBook::new();
    book.admit(&buyer, Instrument::Camb, Side::Buy, 51, 10, 1, 5)
        .unwrap();
    book.admit(&seller, Instrument::Camb, Side::Sell, 48, 10, 1, 5)
        .unwrap();

    let trades = match_round(
        book.orders_mut(),
        Instrument::Camb,
        1,
        ExecutionPriceRule::Midpoint,
    );

    // (51 + 48) / 2 rounds half-up to 50.
    assert_eq!(trades[0].price, 50);
}

#[test]
fn partial_fill_moves_status_forward_only() {
    let buyer = player("B", 10_000, 0);
    let seller = holder("S", 0, 100, 1);

    let mut book = RoundBook::new();
    book.admit(&buyer, Instrument::Camb, Side::Buy, 50, 100, 1, 5)
        .unwrap();
    book.admit(&seller, Instrument::Camb, Side::Sell, 50, 60, 1, 5)
        .unwrap();

    let trades = match_round(
        book.orders_mut(),
        Instrument::Camb,
        1,
        ExecutionPriceRule::SellerPrice,
    );

    assert_eq!(trades.len(), 1);
    assert_eq!(trades[0].quantity, 60);

    let orders = book.orders();
    let buy = orders.iter().find(|o| o.side == Side::Buy).unwrap();
    let sell = orders.iter().find(|o| o.side == Side::Sell).unwrap();

    assert_eq!(buy.status, OrderStatus::Partial);
    assert_eq!(buy.remaining, 40);
    assert_eq!(buy.filled, 60);
    assert_eq!(sell.status, OrderStatus::Filled);
    assert_eq!(sell.remaining, 0);

    // remaining + filled never drifts from the original quantity
    for order in orders {
        assert_eq!(order.remaining + order.filled, order.quantity);
    }
}

#[test]
fn equal_prices_fill_in_admission_order() {
    let buyer = player("B", 100_000, 0);
    let first = holder("S1", 0, 100, 1);
    let second = holder("S2", 0, 100, 2);

    let mut book = RoundBook::new();
    book.admit(&first, Instrument::Camb, Side::Sell, 50, 30, 1, 5)
        .unwrap();
    book.admit(&second, Instrument::Camb, Side::Sell, 50, 30, 1, 5)
        .unwrap();
    book.admit(&buyer, Instrument::Camb, Side::Buy, 50, 40, 1, 5)
        .unwrap();

    let trades = match_round(
        book.orders_mut(),
        Instrument::Camb,
        1,
        ExecutionPriceRule::SellerPrice,
    );

    assert_eq!(trades.len(), 2);
    assert_eq!(trades[0].seller_id, first.id);
    assert_eq!(trades[0].quantity, 30);
    assert_eq!(trades[1].seller_id, second.id);
    assert_eq!(trades[1].quantity, 10);
}

#[test]
fn no_crossed_liquidity_survives_matching() {
    let buyer = player("B", 1_000_000, 0);
    let seller = holder("S", 0, 10_000, 1);

    let mut book = RoundBook::new();
    // A spread of resting interest on both sides, some crossing, some not.
    for (side, price, qty) in [
        (Side::Buy, 52, 30),
        (Side::Buy, 49, 40),
        (Side::Buy, 45, 10),
        (Side::Sell, 47, 25),
        (Side::Sell, 50, 50),
        (Side::Sell, 55, 20),
    ] {
        let who = if side == Side::Buy { &buyer } else { &seller };
        book.admit(who, Instrument::Camb, side, price, qty, 1, 100)
            .unwrap();
    }

    match_round(
        book.orders_mut(),
        Instrument::Camb,
        1,
        ExecutionPriceRule::SellerPrice,
    );

    let (best_bid, best_ask) = book.best_quotes(Instrument::Camb);
    if let (Some(bid), Some(ask)) = (best_bid, best_ask) {
        assert!(bid < ask, "book left crossed: bid {} >= ask {}", bid, ask);
    }
}

#[test]
fn matching_is_deterministic_for_identical_admission_order() {
    let buyer = player("B", 1_000_000, 0);
    let seller = holder("S", 0, 10_000, 1);

    let run = || {
        let mut book = RoundBook::new();
        for (side, price, qty) in [
            (Side::Buy, 51, 10),
            (Side::Sell, 49, 15),
            (Side::Buy, 50, 20),
            (Side::Sell, 50, 5),
            (Side::Buy, 49, 30),
        ] {
            let who = if side == Side::Buy { &buyer } else { &seller };
            book.admit(who, Instrument::Camb, side, price, qty, 1, 100)
                .unwrap();
        }
        match_round(
            book.orders_mut(),
            Instrument::Camb,
            1,
            ExecutionPriceRule::SellerPrice,
        )
        .into_iter()
        .map(|t| (t.price, t.quantity, t.buyer_id, t.seller_id))
        .collect::<Vec<_>>()
    };

    assert_eq!(run(), run());
}

#[test]
fn admission_rejects_unaffordable_and_malformed_orders() {
    let poor = player("Poor", 100, 0);
    let bare = player("Bare", 10_000, 1);
    let mut capped = player("Capped", 10_000, 2);
    capped.orders_submitted = 2;

    let mut book = RoundBook::new();

    assert_eq!(
        book.admit(&poor, Instrument::Camb, Side::Buy, 20, 10, 1, 5),
        Err(AdmissionError::InsufficientFunds {
            needed: 200,
            available: 100
        })
    );
    assert_eq!(
        book.admit(&bare, Instrument::Camb, Side::Sell, 20, 10, 1, 5),
        Err(AdmissionError::InsufficientShares {
            needed: 10,
            available: 0
        })
    );
    assert_eq!(
        book.admit(&bare, Instrument::Camb, Side::Buy, 0, 10, 1, 5),
        Err(AdmissionError::InvalidPrice)
    );
    assert_eq!(
        book.admit(&bare, Instrument::Camb, Side::Buy, 20, 0, 1, 5),
        Err(AdmissionError::InvalidQuantity)
    );
    assert_eq!(
        book.admit(&capped, Instrument::Camb, Side::Buy, 20, 10, 1, 2),
        Err(AdmissionError::OrderLimitExceeded { cap: 2 })
    );

    // Nothing was admitted.
    assert!(book.orders().is_empty());
}

#[test]
fn vwap_settlement_rounds_half_up() {
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    // 100 @ 48 and 50 @ 50: VWAP = 7300/150 = 48.67 -> 49
    let trades = vec![trade(48, 100, a, b), trade(50, 50, a, b)];
    assert_eq!(settlement::settle_price(60, &trades, None, None), 49);

    // 48.5 rounds up
    let trades = vec![trade(48, 1, a, b), trade(49, 1, a, b)];
    assert_eq!(settlement::settle_price(60, &trades, None, None), 49);
}

#[test]
fn no_trade_price_rules() {
    // Both sides resting: midpoint of best bid/ask.
    assert_eq!(settlement::settle_price(100, &[], Some(40), Some(45)), 43);
    // Bid-only pressure decays the price.
    assert_eq!(settlement::settle_price(100, &[], Some(40), None), 38);
    // Ask-only pressure raises it.
    assert_eq!(settlement::settle_price(100, &[], None, Some(40)), 42);
    // Empty book leaves the price alone.
    assert_eq!(settlement::settle_price(100, &[], None, None), 100);
    // Never below the floor.
    assert_eq!(settlement::settle_price(5, &[], Some(1), None), 1);
}

#[test]
fn trades_conserve_cash_and_shares() {
    let buyer = player("B", 50_000, 0);
    let seller = holder("S", 20_000, 500, 1);
    let mut participants = vec![buyer, seller];

    let cash_before: u64 = participants.iter().map(|p| p.cash).sum();
    let shares_before: u64 = participants
        .iter()
        .map(|p| p.shares_of(Instrument::Camb))
        .sum();

    let trades = vec![
        trade(40, 100, participants[0].id, participants[1].id),
        trade(42, 50, participants[0].id, participants[1].id),
        // Seller buys some back.
        trade(41, 30, participants[1].id, participants[0].id),
    ];
    for t in &trades {
        settlement::apply_trade(&mut participants, t).unwrap();
    }

    let cash_after: u64 = participants.iter().map(|p| p.cash).sum();
    let shares_after: u64 = participants
        .iter()
        .map(|p| p.shares_of(Instrument::Camb))
        .sum();

    assert_eq!(cash_before, cash_after);
    assert_eq!(shares_before, shares_after);
}

#[test]
fn ledger_refuses_trades_that_would_go_negative() {
    let buyer = player("B", 100, 0);
    let seller = holder("S", 0, 500, 1);
    let mut participants = vec![buyer, seller];

    // Costs 4000 against 100 cash: admission should have stopped this, so
    // the ledger treats it as fatal and applies nothing.
    let bad = trade(40, 100, participants[0].id, participants[1].id);
    let err = settlement::apply_trade(&mut participants, &bad).unwrap_err();
    assert!(matches!(err, GameError::Invariant(_)));

    assert_eq!(participants[0].cash, 100);
    assert_eq!(participants[0].shares_of(Instrument::Camb), 0);
    assert_eq!(participants[1].cash, 0);
    assert_eq!(participants[1].shares_of(Instrument::Camb), 500);
}

#[test]
fn revalue_marks_holdings_to_market() {
    let mut p = holder("H", 1_000, 10, 0);
    p.shares.insert(Instrument::Oxfd, 4);

    let mut prices = BTreeMap::new();
    prices.insert(Instrument::Camb, 50);
    prices.insert(Instrument::Oxfd, 25);

    let mut participants = vec![p];
    settlement::revalue(&mut participants, &prices);
    assert_eq!(participants[0].total_value, 1_000 + 10 * 50 + 4 * 25);
}

#[test]
fn ranking_is_stable_and_skips_non_players() {
    let mut first = player("First", 0, 0);
    first.total_value = 12_000;
    let mut tied_early = player("TiedEarly", 0, 1);
    tied_early.total_value = 9_000;
    let mut tied_late = player("TiedLate", 0, 2);
    tied_late.total_value = 9_000;
    let mut mm = Participant::new("Desk".to_string(), Role::MarketMaker, 100_000, 3);
    mm.total_value = 1_000_000;
    let monitor = Participant::new("Mon".to_string(), Role::Monitor, 0, 4);

    let mut participants = vec![tied_late, mm, first, monitor, tied_early];
    settlement::rank(&mut participants);

    let rank_of = |name: &str| {
        participants
            .iter()
            .find(|p| p.name == name)
            .unwrap()
            .rank
    };
    assert_eq!(rank_of("First"), Some(1));
    assert_eq!(rank_of("TiedEarly"), Some(2));
    assert_eq!(rank_of("TiedLate"), Some(3));
    assert_eq!(rank_of("Desk"), None);
    assert_eq!(rank_of("Mon"), None);
}
