//! WebSocket upgrade handler

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::app::AppState;
use crate::game::ConnectionId;
use crate::util::rate_limit::ConnectionRateLimiter;
use crate::util::time::unix_millis;
use crate::ws::protocol::{parse_client_msg, ClientMsg, ServerMsg};

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, state: AppState) {
    let connection = ConnectionId::new();
    info!(connection_id = %connection, "New WebSocket connection");

    let (mut ws_sink, ws_stream) = socket.split();

    let welcome = ServerMsg::Welcome {
        connection_id: connection,
        server_time: unix_millis(),
    };
    if let Err(e) = send_msg(&mut ws_sink, &welcome).await {
        error!(connection_id = %connection, error = %e, "Failed to send welcome");
        return;
    }

    let outbound = state.hub.register(connection);

    run_session(connection, &state, ws_sink, ws_stream, outbound).await;

    // Cleanup on disconnect
    state.hub.unregister(connection);
    state.matches.disconnect(connection);

    info!(connection_id = %connection, "WebSocket connection closed");
}

/// Run the WebSocket session with read/write split
async fn run_session(
    connection: ConnectionId,
    state: &AppState,
    mut ws_sink: SplitSink<WebSocket, Message>,
    mut ws_stream: SplitStream<WebSocket>,
    mut outbound: mpsc::Receiver<ServerMsg>,
) {
    let rate_limiter = ConnectionRateLimiter::new(state.config.input_rate_limit);

    // Spawn writer task: outbound queue -> WebSocket
    let writer_handle = tokio::spawn(async move {
        while let Some(msg) = outbound.recv().await {
            if let Err(e) = send_msg(&mut ws_sink, &msg).await {
                debug!(connection_id = %connection, error = %e, "WebSocket send failed");
                break;
            }
        }
        debug!(connection_id = %connection, "Outbound queue closed");
    });

    // Reader loop: WebSocket -> lobby / match services
    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                if !rate_limiter.check_input() {
                    warn!(connection_id = %connection, "Rate limited input message");
                    continue;
                }

                match parse_client_msg(&text) {
                    Ok(client_msg) => dispatch(state, connection, client_msg),
                    Err(e) => {
                        warn!(
                            connection_id = %connection,
                            error = %e,
                            "Failed to parse client message"
                        );
                        state
                            .hub
                            .send(connection, ServerMsg::error(e.code(), e.to_string()));
                    }
                }
            }
            Ok(Message::Binary(_)) => {
                warn!(connection_id = %connection, "Received binary message, ignoring");
            }
            Ok(Message::Ping(_)) => {
                debug!(connection_id = %connection, "Received ping");
            }
            Ok(Message::Pong(_)) => {
                debug!(connection_id = %connection, "Received pong");
            }
            Ok(Message::Close(_)) => {
                info!(connection_id = %connection, "Client initiated close");
                break;
            }
            Err(e) => {
                error!(connection_id = %connection, error = %e, "WebSocket error");
                break;
            }
        }
    }

    // Abort writer task
    writer_handle.abort();
}

/// Route one parsed message to the service that owns it
fn dispatch(state: &AppState, connection: ConnectionId, msg: ClientMsg) {
    if let Some((match_id, command)) = msg.match_command() {
        state.matches.handle(connection, match_id, command);
        return;
    }

    match msg {
        ClientMsg::JoinLobby { username } => {
            if let Err(e) = state.lobby.join(connection, &username) {
                state
                    .hub
                    .send(connection, ServerMsg::error(e.code(), e.to_string()));
            }
        }
        ClientMsg::ChallengeUser { opponent } => state.lobby.challenge(connection, opponent),
        ClientMsg::ChallengeResponse { from, accepted } => {
            if !accepted {
                state.lobby.decline(connection, from);
            } else if let Some(participants) = state.lobby.accept(connection, from) {
                state.matches.create_match(participants);
            } else {
                debug!(connection_id = %connection, challenger = %from, "Challenge no longer open");
            }
        }
        ClientMsg::PlayWithBot => {
            if let Some(participants) = state.lobby.claim_bot_match(connection) {
                state.matches.create_match(participants);
            }
        }
        ClientMsg::ExitToLobby { match_id } => state.matches.exit(connection, match_id),
        ClientMsg::Ping { t } => {
            state.hub.send(connection, ServerMsg::Pong { t });
        }
        // Match commands were routed above
        ClientMsg::RequestReshuffle { .. }
        | ClientMsg::PlayerReady { .. }
        | ClientMsg::PlayerMove { .. }
        | ClientMsg::TieBreakChoice { .. }
        | ClientMsg::RequestReplay { .. } => {}
    }
}

/// Send a message over WebSocket
async fn send_msg(sink: &mut SplitSink<WebSocket, Message>, msg: &ServerMsg) -> Result<(), String> {
    let json = serde_json::to_string(msg).map_err(|e| e.to_string())?;
    sink.send(Message::Text(json)).await.map_err(|e| e.to_string())
}
