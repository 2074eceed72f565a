// Application state and orchestration logic.
//
// The central event loop that owns the draft service, answers client
// requests arriving over the websocket server, and fans committed session
// events out to every client joined to that session.

use std::collections::HashMap;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use fantabuilder_core::config::SessionSetup;
use fantabuilder_core::draft::{Actor, SessionEvent};
use fantabuilder_core::error::DraftError;
use fantabuilder_core::service::DraftService;

use crate::protocol::{ClientMessage, ServerMessage};
use crate::ws_server::{ClientId, WsEvent};

// ---------------------------------------------------------------------------
// Supporting types
// ---------------------------------------------------------------------------

/// Who a connection speaks for, fixed by its `HELLO`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity {
    pub session_id: String,
    pub actor: Actor,
}

struct ClientConn {
    addr: String,
    outbound: mpsc::Sender<String>,
    identity: Option<ClientIdentity>,
    /// Task relaying session events to `outbound`.
    forwarder: Option<JoinHandle<()>>,
}

impl ClientConn {
    fn stop_forwarding(&mut self) {
        if let Some(handle) = self.forwarder.take() {
            handle.abort();
        }
    }
}

// ---------------------------------------------------------------------------
// AppState
// ---------------------------------------------------------------------------

/// The complete application state.
pub struct AppState {
    pub service: DraftService,
    clients: HashMap<ClientId, ClientConn>,
}

impl AppState {
    pub fn new(service: DraftService) -> Self {
        AppState {
            service,
            clients: HashMap::new(),
        }
    }
}

/// Register configured sessions and their seats, picking up any draft
/// progress already in the database.
pub fn register_sessions(service: &mut DraftService, setups: &[SessionSetup]) -> Result<(), DraftError> {
    for setup in setups {
        service.register_session(setup.session.clone())?;
        for seat in &setup.participants {
            service.add_participant(&setup.session.id, &seat.user_id, &seat.nickname)?;
        }
        match service.cursor_state(&setup.session.id)? {
            Some(cursor) => info!(
                "Session {} resumed at position {:?} of {} ({} sales)",
                setup.session.id,
                cursor.position,
                cursor.order_len,
                service.list_sales(&setup.session.id)?.len()
            ),
            None => info!("Session {} waiting for its admin to start", setup.session.id),
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Event loop
// ---------------------------------------------------------------------------

/// Run the application event loop until shutdown is signalled or the
/// websocket channel closes.
pub async fn run(
    mut ws_rx: mpsc::Receiver<WsEvent>,
    mut shutdown: oneshot::Receiver<()>,
    mut state: AppState,
) -> anyhow::Result<()> {
    info!("Application event loop started");

    loop {
        tokio::select! {
            // --- WebSocket events ---
            ws_event = ws_rx.recv() => {
                match ws_event {
                    Some(WsEvent::Connected { client_id, addr, outbound }) => {
                        info!("Client {client_id} connected from {addr}");
                        state.clients.insert(client_id, ClientConn {
                            addr,
                            outbound,
                            identity: None,
                            forwarder: None,
                        });
                    }
                    Some(WsEvent::Disconnected { client_id }) => {
                        if let Some(conn) = state.clients.get(&client_id) {
                            info!("Client {client_id} ({}) left", conn.addr);
                        }
                        drop_client(&mut state, client_id);
                    }
                    Some(WsEvent::Message { client_id, text }) => {
                        handle_ws_message(&mut state, client_id, &text);
                    }
                    None => {
                        info!("WebSocket channel closed, shutting down");
                        break;
                    }
                }
            }

            // --- Shutdown ---
            _ = &mut shutdown => {
                info!("Shutdown requested");
                break;
            }
        }
    }

    for conn in state.clients.values_mut() {
        conn.stop_forwarding();
    }
    info!("Application event loop exiting");
    Ok(())
}

/// Handle one text frame from a client and queue the reply for it.
///
/// Never waits on a client's queue: a client whose queue is full is not
/// reading its socket and is dropped.
fn handle_ws_message(state: &mut AppState, client_id: ClientId, text: &str) {
    let Some(conn) = state.clients.get_mut(&client_id) else {
        warn!("Message from unknown client {client_id}");
        return;
    };

    let reply = match serde_json::from_str::<ClientMessage>(text) {
        Err(e) => {
            warn!("Failed to parse message from client {client_id}: {e}");
            ServerMessage::invalid_message(e.to_string())
        }
        Ok(ClientMessage::Hello {
            session_id,
            user_id,
        }) => match state.service.actor(&session_id, &user_id) {
            Ok(actor) => {
                let identity = ClientIdentity { session_id, actor };
                join_session(&mut state.service, conn, identity)
            }
            Err(e) => ServerMessage::from_error(&e),
        },
        Ok(msg) => match &conn.identity {
            Some(identity) => dispatch(&mut state.service, identity, msg),
            None => ServerMessage::from_error(&DraftError::precondition(
                "send HELLO with a session before any other request",
            )),
        },
    };

    match conn.outbound.try_send(reply.to_json()) {
        Ok(()) => {}
        Err(TrySendError::Closed(_)) => {
            debug!("Client {client_id} went away before its reply was sent");
        }
        Err(TrySendError::Full(_)) => {
            warn!("Client {client_id} ({}) is not reading its replies; dropping it", conn.addr);
            drop_client(state, client_id);
        }
    }
}

/// Forget a client. Once its sender clones are gone its socket writer ends
/// and the connection closes.
fn drop_client(state: &mut AppState, client_id: ClientId) {
    if let Some(mut conn) = state.clients.remove(&client_id) {
        conn.stop_forwarding();
    }
}

/// Bind `conn` to a session, start relaying its events and build the welcome.
/// An admin joining an unstarted session starts its draft.
fn join_session(service: &mut DraftService, conn: &mut ClientConn, identity: ClientIdentity) -> ServerMessage {
    let session_id = identity.session_id.clone();
    if identity.actor.is_admin {
        if let Err(e) = service.start_or_resume_draft(&session_id, &identity.actor, None) {
            warn!("Could not start the draft of {session_id} for its admin: {e}");
        }
    }
    let (rx, cursor, current_player) = match (
        service.subscribe(&session_id),
        service.cursor_state(&session_id),
        service.get_current_player(&session_id),
    ) {
        (Ok(rx), Ok(cursor), Ok(player)) => (rx, cursor, player),
        (Err(e), _, _) | (_, Err(e), _) | (_, _, Err(e)) => return ServerMessage::from_error(&e),
    };

    conn.stop_forwarding();
    conn.forwarder = Some(tokio::spawn(forward_events(rx, conn.outbound.clone())));
    info!(
        "User {} joined session {session_id}{}",
        identity.actor.user_id,
        if identity.actor.is_admin { " as admin" } else { "" }
    );

    let welcome = ServerMessage::Welcome {
        session_id,
        user_id: identity.actor.user_id.clone(),
        is_admin: identity.actor.is_admin,
        cursor,
        current_player,
    };
    conn.identity = Some(identity);
    welcome
}

/// Relay session events to one client until either end closes. A lagging
/// client is told how much it missed so it can refetch.
async fn forward_events(mut rx: broadcast::Receiver<SessionEvent>, outbound: mpsc::Sender<String>) {
    loop {
        let msg = match rx.recv().await {
            Ok(event) => ServerMessage::Event { event },
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                warn!("Subscriber lagged by {missed} events; requesting resync");
                ServerMessage::Resync { missed }
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };
        if outbound.send(msg.to_json()).await.is_err() {
            break;
        }
    }
}

/// Execute a session-scoped request on behalf of `identity`.
pub fn dispatch(service: &mut DraftService, identity: &ClientIdentity, msg: ClientMessage) -> ServerMessage {
    let session = identity.session_id.as_str();
    let actor = &identity.actor;

    let result = match msg {
        ClientMessage::Hello { .. } => Err(DraftError::precondition(
            "HELLO is handled by the connection layer",
        )),
        ClientMessage::StartDraft { scope } => service
            .start_or_resume_draft(session, actor, scope)
            .map(|cursor| ServerMessage::Cursor { cursor }),
        ClientMessage::RequestScopeChange { scope } => service
            .request_scope_change(session, actor, scope)
            .map(|preview| ServerMessage::ScopeChangePreview { preview }),
        ClientMessage::ConfirmScopeChange => service
            .confirm_scope_change(session, actor)
            .map(|cursor| ServerMessage::Cursor { cursor }),
        ClientMessage::CancelScopeChange => service
            .cancel_scope_change(session, actor)
            .map(|scope| ServerMessage::ScopeChangeCancelled { scope }),
        ClientMessage::Advance => service
            .advance(session, actor)
            .map(|cursor| ServerMessage::Cursor { cursor }),
        ClientMessage::Retreat => service
            .retreat(session, actor)
            .map(|cursor| ServerMessage::Cursor { cursor }),
        ClientMessage::JumpTo { player_id } => service
            .jump_to(session, actor, player_id)
            .map(|cursor| ServerMessage::Cursor { cursor }),
        ClientMessage::JumpToStart => service
            .jump_to_start(session, actor)
            .map(|cursor| ServerMessage::Cursor { cursor }),
        ClientMessage::ConfirmAssignment {
            participant_id,
            price,
        } => service
            .confirm_assignment(session, actor, participant_id, price)
            .map(|sale| ServerMessage::Sale { sale }),
        ClientMessage::GetCurrentPlayer => service
            .get_current_player(session)
            .map(|player| ServerMessage::CurrentPlayer { player }),
        ClientMessage::GetLedgerSummary { participant_id } => service
            .get_ledger_summary(session, participant_id)
            .map(|summary| ServerMessage::LedgerSummary { summary }),
        ClientMessage::ListPlayers { scope } => service
            .list_players(session, scope)
            .map(|players| ServerMessage::Players { scope, players }),
        ClientMessage::ListParticipants => service
            .list_participants(session)
            .map(|participants| ServerMessage::Participants { participants }),
        ClientMessage::ListSales => service
            .list_sales(session)
            .map(|sales| ServerMessage::Sales { sales }),
    };

    result.unwrap_or_else(|e| {
        debug!("Request from {} in {session} failed: {e}", actor.user_id);
        ServerMessage::from_error(&e)
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
