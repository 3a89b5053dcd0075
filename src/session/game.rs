// The authoritative game state and its phase machine. Every mutation comes
// through one of the intent methods below, called only from the session
// actor, so there is exactly one writer per session.

use rand::Rng;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::GameConfig;
use crate::error::{GameError, ProtocolError};
use crate::market_maker;
use crate::matching::{self, RoundBook};
use crate::matching::settlement;
use crate::types::{
    GamePhase, GameStateSnapshot, Instrument, Participant, PricePoint, Role, Side, Trade,
};

/// Days of synthetic pre-game price history shown during SETUP.
const SEED_DAYS: u32 = 10;

pub struct GameSession {
    pub id: String,
    pub config: GameConfig,
    pub phase: GamePhase,
    pub current_round: u32,
    pub participants: Vec<Participant>,
    pub book: RoundBook,
    pub trades: Vec<Trade>,
    pub price_history: Vec<PricePoint>,
    pub current_prices: BTreeMap<Instrument, u64>,
    join_seq: u64,
    /// Owner of scripted market-event orders, present only when events are
    /// configured. Holds a MarketMaker role but never quotes.
    external_investor: Option<Uuid>,
}

impl GameSession {
    pub fn new(id: String, config: GameConfig) -> Self {
        let price_history = seed_price_history(&config.instruments);
        let current_prices = price_history
            .last()
            .map(|point| point.prices.clone())
            .unwrap_or_default();

        let mut session = Self {
            id,
            phase: GamePhase::Lobby,
            current_round: 1,
            participants: Vec::new(),
            book: RoundBook::new(),
            trades: Vec::new(),
            price_history,
            current_prices,
            join_seq: 0,
            external_investor: None,
            config,
        };

        for name in market_maker::roster(session.config.market_makers) {
            let mut mm = Participant::new(
                name,
                Role::MarketMaker,
                market_maker::MARKET_MAKER_CASH,
                session.next_join_seq(),
            );
            for &instrument in &session.config.instruments {
                mm.shares.insert(instrument, market_maker::MARKET_MAKER_SHARES);
            }
            session.participants.push(mm);
        }

        if !session.config.market_events.is_empty() {
            let mut investor = Participant::new(
                "External Investor".to_string(),
                Role::MarketMaker,
                10_000_000,
                session.next_join_seq(),
            );
            for &instrument in &session.config.instruments {
                investor.shares.insert(instrument, 100_000);
            }
            session.external_investor = Some(investor.id);
            session.participants.push(investor);
        }

        settlement::revalue(&mut session.participants, &session.current_prices);
        session
    }

    // ---- intents -------------------------------------------------------

    pub fn join(&mut self, name: &str, as_monitor: bool) -> Result<Uuid, GameError> {
        if self.phase != GamePhase::Lobby {
            return Err(ProtocolError::InvalidPhaseTransition(
                "joining is only allowed in the lobby".to_string(),
            )
            .into());
        }

        let (role, cash) = if as_monitor {
            (Role::Monitor, 0)
        } else {
            (Role::Player, self.config.starting_cash)
        };
        let seq = self.next_join_seq();
        let participant = Participant::new(name.trim().to_string(), role, cash, seq);
        let id = participant.id;
        info!("{:?} {} joined session {}", role, participant.name, self.id);
        self.participants.push(participant);
        Ok(id)
    }

    /// Rejoining with a known id flips the participant back online; state
    /// (orders, counters, balances) is untouched, so rejoin is idempotent.
    pub fn reconnect(&mut self, participant_id: Uuid) -> Result<Uuid, GameError> {
        let participant = self
            .participants
            .iter_mut()
            .find(|p| p.id == participant_id && p.role != Role::MarketMaker)
            .ok_or(ProtocolError::UnknownParticipant)?;
        participant.online = true;
        info!("{} reconnected to session {}", participant.name, self.id);
        Ok(participant_id)
    }

    /// Transport-level disconnect. Not an error: the participant keeps all
    /// state and may reconnect later. Returns whether anything changed.
    pub fn set_offline(&mut self, participant_id: Uuid) -> bool {
        match self
            .participants
            .iter_mut()
            .find(|p| p.id == participant_id)
        {
            Some(p) if p.online => {
                p.online = false;
                info!("{} went offline in session {}", p.name, self.id);
                true
            }
            _ => false,
        }
    }

    pub fn start_game(&mut self, actor: Uuid) -> Result<(), GameError> {
        self.require_monitor(actor)?;
        if self.phase != GamePhase::Lobby {
            return Err(invalid_phase("the game has already started"));
        }
        if !self.participants.iter().any(|p| p.role == Role::Player) {
            return Err(invalid_phase("at least one player must join first"));
        }
        self.phase = GamePhase::Setup;
        info!("Session {} moved to SETUP", self.id);
        Ok(())
    }

    pub fn start_trading(&mut self, actor: Uuid) -> Result<(), GameError> {
        self.require_monitor(actor)?;
        if self.phase != GamePhase::Setup {
            return Err(invalid_phase("trading opens from the setup screen"));
        }
        self.phase = GamePhase::Trading;
        info!("Session {} round 1 open for orders", self.id);
        Ok(())
    }

    pub fn submit_order(
        &mut self,
        actor: Uuid,
        instrument: Instrument,
        side: Side,
        price: u64,
        quantity: u64,
    ) -> Result<Uuid, GameError> {
        if self.phase != GamePhase::Trading {
            return Err(invalid_phase("orders are only accepted while trading is open"));
        }
        if !self.config.instruments.contains(&instrument) {
            return Err(invalid_phase("instrument is not traded in this session"));
        }

        let idx = self.index_of(actor)?;
        match self.participants[idx].role {
            Role::Player => {}
            Role::Monitor => {
                return Err(ProtocolError::NotAuthorized(
                    "monitors do not trade".to_string(),
                )
                .into())
            }
            Role::MarketMaker => {
                return Err(ProtocolError::NotAuthorized(
                    "market maker orders are generated by the server".to_string(),
                )
                .into())
            }
        }

        let order_id = self.book.admit(
            &self.participants[idx],
            instrument,
            side,
            price,
            quantity,
            self.current_round,
            self.config.order_cap,
        )?;
        self.participants[idx].orders_submitted += 1;
        Ok(order_id)
    }

    pub fn mark_done(&mut self, actor: Uuid) -> Result<(), GameError> {
        if self.phase != GamePhase::Trading {
            return Err(invalid_phase("there is no trading round to finish"));
        }
        let idx = self.index_of(actor)?;
        if self.participants[idx].role != Role::Player {
            return Err(
                ProtocolError::NotAuthorized("only players mark themselves done".to_string())
                    .into(),
            );
        }
        self.participants[idx].done = true;
        Ok(())
    }

    /// Every player has either finished or exhausted their order budget.
    pub fn can_process_round(&self) -> bool {
        self.participants
            .iter()
            .filter(|p| p.role == Role::Player)
            .all(|p| p.done || p.orders_submitted >= self.config.order_cap)
    }

    /// Monitor ends the order window immediately and settles the round.
    pub fn force_close(&mut self, actor: Uuid) -> Result<(), GameError> {
        self.require_monitor(actor)?;
        if self.phase != GamePhase::Trading {
            return Err(invalid_phase("no trading round is open"));
        }
        info!("Session {} round {} force-closed", self.id, self.current_round);
        self.run_processing()
    }

    /// Monitor settles the round once every player is done or capped.
    pub fn process_round(&mut self, actor: Uuid) -> Result<(), GameError> {
        self.require_monitor(actor)?;
        if self.phase != GamePhase::Trading {
            return Err(invalid_phase("no trading round is open"));
        }
        if !self.can_process_round() {
            return Err(invalid_phase(
                "players are still trading; force close to end the round early",
            ));
        }
        self.run_processing()
    }

    /// Round timer expiry, delivered as a mailbox intent. Stale timeouts
    /// (the round already settled, or the phase moved on) are ignored.
    pub fn on_round_timeout(&mut self, round: u32) -> Result<bool, GameError> {
        if self.phase != GamePhase::Trading || self.current_round != round {
            debug!(
                "Ignoring stale round timeout for round {} in session {}",
                round, self.id
            );
            return Ok(false);
        }
        info!("Session {} round {} closed by timer", self.id, round);
        self.run_processing()?;
        Ok(true)
    }

    pub fn next_round(&mut self, actor: Uuid) -> Result<(), GameError> {
        self.require_monitor(actor)?;
        if self.phase != GamePhase::Results {
            return Err(invalid_phase("the round has not been settled yet"));
        }

        if self.current_round >= self.config.total_rounds {
            settlement::rank(&mut self.participants);
            self.phase = GamePhase::Finished;
            info!("Session {} finished after round {}", self.id, self.current_round);
        } else {
            self.current_round += 1;
            self.book.clear_round(self.config.carry_unfilled);
            for p in &mut self.participants {
                p.orders_submitted = 0;
                p.done = false;
            }
            self.phase = GamePhase::Trading;
            info!("Session {} round {} open for orders", self.id, self.current_round);
        }
        Ok(())
    }

    // ---- round processing ----------------------------------------------

    fn run_processing(&mut self) -> Result<(), GameError> {
        self.phase = GamePhase::Processing;

        self.inject_market_events();
        self.place_market_maker_orders();

        let settlements = matching::process_round(
            &mut self.book,
            &mut self.participants,
            &self.current_prices,
            self.current_round,
            &self.config,
        )?;

        let mut traded = false;
        for s in settlements {
            traded |= !s.trades.is_empty();
            self.current_prices.insert(s.instrument, s.price);
            self.trades.extend(s.trades);
        }

        settlement::revalue(&mut self.participants, &self.current_prices);

        let day = self.price_history.last().map(|p| p.day).unwrap_or(0) + 1;
        self.price_history.push(PricePoint {
            day,
            round: Some(self.current_round),
            prices: self.current_prices.clone(),
            traded,
        });

        self.phase = GamePhase::Results;
        Ok(())
    }

    /// Scripted shocks scheduled for this round enter the book as ordinary
    /// orders owned by the external investor; they never bypass matching.
    fn inject_market_events(&mut self) {
        let Some(investor_id) = self.external_investor else {
            return;
        };
        let events: Vec<_> = self
            .config
            .market_events
            .iter()
            .filter(|e| e.round == self.current_round)
            .cloned()
            .collect();
        if events.is_empty() {
            return;
        }

        let idx = match self.participants.iter().position(|p| p.id == investor_id) {
            Some(idx) => idx,
            None => return,
        };
        for event in events {
            match self.book.admit(
                &self.participants[idx],
                event.instrument,
                event.side,
                event.price,
                event.quantity,
                self.current_round,
                u32::MAX,
            ) {
                Ok(_) => {
                    self.participants[idx].orders_submitted += 1;
                    info!(
                        "Injected market event: {:?} {} x{} @ {} in round {}",
                        event.side, event.instrument, event.quantity, event.price, event.round
                    );
                }
                Err(e) => warn!("Market event for round {} not admitted: {}", event.round, e),
            }
        }
    }

    fn place_market_maker_orders(&mut self) {
        let mut rng = rand::thread_rng();
        let mm_indices: Vec<usize> = self
            .participants
            .iter()
            .enumerate()
            .filter(|(_, p)| p.role == Role::MarketMaker && Some(p.id) != self.external_investor)
            .map(|(i, _)| i)
            .collect();

        for idx in mm_indices {
            let budget = self
                .config
                .order_cap
                .saturating_sub(self.participants[idx].orders_submitted);
            let quotes = market_maker::generate_quotes(&mut rng, &self.current_prices, budget);
            for quote in quotes {
                match self.book.admit(
                    &self.participants[idx],
                    quote.instrument,
                    quote.side,
                    quote.price,
                    quote.quantity,
                    self.current_round,
                    self.config.order_cap,
                ) {
                    Ok(_) => self.participants[idx].orders_submitted += 1,
                    // A maker out of cash or inventory just quotes less.
                    Err(e) => debug!(
                        "{} skipped a quote: {}",
                        self.participants[idx].name, e
                    ),
                }
            }
            self.participants[idx].done = true;
        }
    }

    // ---- queries -------------------------------------------------------

    pub fn snapshot(&self) -> GameStateSnapshot {
        GameStateSnapshot {
            session_id: self.id.clone(),
            phase: self.phase,
            current_round: self.current_round,
            total_rounds: self.config.total_rounds,
            order_cap: self.config.order_cap,
            participants: self.participants.clone(),
            orders: self.book.orders().to_vec(),
            trades: self.trades.clone(),
            price_history: self.price_history.clone(),
            current_prices: self.current_prices.clone(),
        }
    }

    pub fn participant(&self, id: Uuid) -> Option<&Participant> {
        self.participants.iter().find(|p| p.id == id)
    }

    fn index_of(&self, id: Uuid) -> Result<usize, GameError> {
        self.participants
            .iter()
            .position(|p| p.id == id)
            .ok_or_else(|| ProtocolError::UnknownParticipant.into())
    }

    fn require_monitor(&self, actor: Uuid) -> Result<(), GameError> {
        let idx = self.index_of(actor)?;
        if !self.participants[idx].role.can_admin_round() {
            return Err(ProtocolError::NotAuthorized(
                "only the monitor drives round progression".to_string(),
            )
            .into());
        }
        Ok(())
    }

    fn next_join_seq(&mut self) -> u64 {
        let seq = self.join_seq;
        self.join_seq += 1;
        seq
    }
}

fn invalid_phase(message: &str) -> GameError {
    ProtocolError::InvalidPhaseTransition(message.to_string()).into()
}

/// Bounded random walk over the pre-game days, one series per instrument.
fn seed_price_history(instruments: &[Instrument]) -> Vec<PricePoint> {
    let mut rng = rand::thread_rng();
    let mut prices: BTreeMap<Instrument, u64> = instruments
        .iter()
        .map(|&instrument| {
            let (start_low, start_high, _, _) = seed_bounds(instrument);
            (instrument, rng.gen_range(start_low..=start_high))
        })
        .collect();

    let mut history = Vec::with_capacity(SEED_DAYS as usize);
    for day in 1..=SEED_DAYS {
        for (&instrument, price) in prices.iter_mut() {
            let (_, _, floor, ceiling) = seed_bounds(instrument);
            let delta: i64 = rng.gen_range(-2..=2);
            *price = (*price as i64 + delta).clamp(floor as i64, ceiling as i64) as u64;
        }
        history.push(PricePoint {
            day,
            round: None,
            prices: prices.clone(),
            traded: false,
        });
    }
    history
}

/// (start low, start high, floor, ceiling) in whole dollars.
fn seed_bounds(instrument: Instrument) -> (u64, u64, u64, u64) {
    match instrument {
        Instrument::Camb => (50, 70, 20, 100),
        Instrument::Oxfd => (30, 45, 15, 60),
    }
}
