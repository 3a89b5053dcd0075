// One actor task per session. All intents (client messages, connection
// lifecycle, round-timer expiries) funnel through a single mailbox and
// apply strictly in arrival order, so the GameSession never needs a lock.

use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::GameConfig;
use crate::error::{GameError, ProtocolError};
use crate::session::game::GameSession;
use crate::types::{ClientMessage, GamePhase, ServerMessage};

/// Capacity of the per-session broadcast channel; a client that lags this
/// far behind simply picks up at the next full snapshot.
const BROADCAST_CAPACITY: usize = 256;

#[derive(Debug)]
pub struct Intent {
    /// Connection the intent arrived on; nil for internal intents.
    pub conn: Uuid,
    /// Requester-scoped replies (errors, participant assignment). Internal
    /// intents carry no reply channel.
    pub reply: Option<mpsc::UnboundedSender<ServerMessage>>,
    pub kind: IntentKind,
}

#[derive(Debug)]
pub enum IntentKind {
    /// New connection wants the current snapshot.
    Connected,
    Client(ClientMessage),
    ConnectionClosed,
    RoundTimeout { round: u32 },
}

/// Cheap handle to a running session actor.
#[derive(Clone)]
pub struct SessionHandle {
    pub intents: mpsc::UnboundedSender<Intent>,
    pub events: broadcast::Sender<ServerMessage>,
}

pub fn spawn(session_id: String, config: GameConfig) -> SessionHandle {
    let (intent_tx, intent_rx) = mpsc::unbounded_channel();
    let (event_tx, _) = broadcast::channel(BROADCAST_CAPACITY);

    let session = GameSession::new(session_id.clone(), config);
    let handle = SessionHandle {
        intents: intent_tx.clone(),
        events: event_tx.clone(),
    };

    tokio::spawn(async move {
        info!("Session {} actor started", session_id);
        run(session, intent_rx, event_tx, intent_tx).await;
        info!("Session {} actor stopped", session_id);
    });

    handle
}

async fn run(
    mut session: GameSession,
    mut intents: mpsc::UnboundedReceiver<Intent>,
    events: broadcast::Sender<ServerMessage>,
    self_sender: mpsc::UnboundedSender<Intent>,
) {
    // Connection -> participant bindings, established by Join/Reconnect.
    let mut bindings: HashMap<Uuid, Uuid> = HashMap::new();

    while let Some(intent) = intents.recv().await {
        let phase_before = session.phase;
        let round_before = session.current_round;

        match handle_intent(&mut session, &mut bindings, intent) {
            Outcome::NoChange => {}
            Outcome::Mutated => {
                // Broadcast only completed mutations; subscribers all see
                // the same snapshots in the same order.
                let _ = events.send(ServerMessage::StateSnapshot {
                    state: session.snapshot(),
                });
                schedule_round_timer(&session, phase_before, round_before, &self_sender);
            }
            Outcome::Fatal(err) => {
                error!(
                    "Session {} halted on invariant violation: {}",
                    session.id, err
                );
                let _ = events.send(ServerMessage::Error {
                    kind: err.kind().to_string(),
                    message: err.to_string(),
                });
                break;
            }
        }
    }
}

enum Outcome {
    NoChange,
    Mutated,
    Fatal(GameError),
}

fn handle_intent(
    session: &mut GameSession,
    bindings: &mut HashMap<Uuid, Uuid>,
    intent: Intent,
) -> Outcome {
    match intent.kind {
        IntentKind::Connected => {
            reply(
                &intent.reply,
                ServerMessage::StateSnapshot {
                    state: session.snapshot(),
                },
            );
            Outcome::NoChange
        }

        IntentKind::ConnectionClosed => match bindings.remove(&intent.conn) {
            Some(participant_id) => {
                if session.set_offline(participant_id) {
                    Outcome::Mutated
                } else {
                    Outcome::NoChange
                }
            }
            None => Outcome::NoChange,
        },

        IntentKind::RoundTimeout { round } => match session.on_round_timeout(round) {
            Ok(true) => Outcome::Mutated,
            Ok(false) => Outcome::NoChange,
            Err(err) if err.is_fatal() => Outcome::Fatal(err),
            Err(err) => {
                warn!("Round timeout rejected in session {}: {}", session.id, err);
                Outcome::NoChange
            }
        },

        IntentKind::Client(message) => {
            let result = apply_client_message(session, bindings, intent.conn, message);
            match result {
                Ok(assigned) => {
                    if let Some(participant_id) = assigned {
                        reply(
                            &intent.reply,
                            ServerMessage::ParticipantAssigned { participant_id },
                        );
                    }
                    Outcome::Mutated
                }
                Err(err) if err.is_fatal() => Outcome::Fatal(err),
                Err(err) => {
                    // Rejections answer the requester only; nothing mutated,
                    // nothing broadcast.
                    reply(
                        &intent.reply,
                        ServerMessage::Error {
                            kind: err.kind().to_string(),
                            message: err.to_string(),
                        },
                    );
                    Outcome::NoChange
                }
            }
        }
    }
}

/// Apply one client message. Returns the newly bound participant id for
/// Join/Reconnect so the caller can emit ParticipantAssigned.
fn apply_client_message(
    session: &mut GameSession,
    bindings: &mut HashMap<Uuid, Uuid>,
    conn: Uuid,
    message: ClientMessage,
) -> Result<Option<Uuid>, GameError> {
    match message {
        ClientMessage::Join {
            player_name,
            as_monitor,
        } => {
            let id = session.join(&player_name, as_monitor)?;
            bindings.insert(conn, id);
            Ok(Some(id))
        }
        ClientMessage::Reconnect { participant_id } => {
            let id = session.reconnect(participant_id)?;
            bindings.insert(conn, id);
            Ok(Some(id))
        }
        other => {
            let actor = *bindings
                .get(&conn)
                .ok_or(ProtocolError::UnknownParticipant)?;
            match other {
                ClientMessage::StartGame => session.start_game(actor)?,
                ClientMessage::StartTrading => session.start_trading(actor)?,
                ClientMessage::SubmitOrder {
                    instrument,
                    side,
                    price,
                    quantity,
                } => {
                    session.submit_order(actor, instrument, side, price, quantity)?;
                }
                ClientMessage::MarkDone => session.mark_done(actor)?,
                ClientMessage::ForceClose => session.force_close(actor)?,
                ClientMessage::ProcessRound => session.process_round(actor)?,
                ClientMessage::NextRound => session.next_round(actor)?,
                ClientMessage::Join { .. } | ClientMessage::Reconnect { .. } => unreachable!(),
            }
            Ok(None)
        }
    }
}

/// When a mutation opened a new trading window, arm its timer. The timer
/// never touches the session; it enqueues a RoundTimeout intent that the
/// mailbox serializes like any other, and stale expiries are ignored there.
fn schedule_round_timer(
    session: &GameSession,
    phase_before: GamePhase,
    round_before: u32,
    sender: &mpsc::UnboundedSender<Intent>,
) {
    if session.config.round_timer_secs == 0 {
        return;
    }
    let entered_trading = session.phase == GamePhase::Trading
        && (phase_before != GamePhase::Trading || session.current_round != round_before);
    if !entered_trading {
        return;
    }

    let round = session.current_round;
    let secs = session.config.round_timer_secs;
    let sender = sender.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(secs)).await;
        let _ = sender.send(Intent {
            conn: Uuid::nil(),
            reply: None,
            kind: IntentKind::RoundTimeout { round },
        });
    });
}

fn reply(channel: &Option<mpsc::UnboundedSender<ServerMessage>>, message: ServerMessage) {
    if let Some(tx) = channel {
        let _ = tx.send(message);
    }
}
