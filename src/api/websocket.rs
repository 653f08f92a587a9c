use actix_web::{web, Error, HttpRequest, HttpResponse};
use actix_ws::{Message, MessageStream, Session};
use futures_util::StreamExt;
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::interval;

use crate::api::AppState;
use crate::monitor::hub::{BroadcastHub, LatestOnly};

// How often heartbeat pings are sent
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);

// Clients silent for this many heartbeats are dropped
const HEARTBEAT_MISSES: u32 = 3;

/// Handle WebSocket connections
pub async fn ws_index(
    req: HttpRequest,
    body: web::Payload,
    state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let addr = req
        .peer_addr()
        .map(|peer| peer.to_string())
        .unwrap_or_else(|| "unknown".to_string());
    info!("WebSocket connection from: {}", addr);

    let (response, session, msg_stream) = actix_ws::handle(&req, body)?;
    actix_web::rt::spawn(serve_subscriber(state.hub.clone(), session, msg_stream, addr));

    Ok(response)
}

/// Forward hub snapshots to one client until either side goes away
async fn serve_subscriber(
    hub: Arc<BroadcastHub>,
    mut session: Session,
    mut msg_stream: MessageStream,
    addr: String,
) {
    let (subscriber, mut updates) = LatestOnly::channel();

    // Joining may build the first snapshot, which reads the pseudo-filesystems
    let joined = {
        let hub = hub.clone();
        tokio::task::spawn_blocking(move || hub.join(subscriber)).await
    };
    let id = match joined {
        Ok(Some(id)) => id,
        _ => {
            warn!("Could not register WebSocket client {}", addr);
            let _ = session.close(None).await;
            return;
        }
    };

    let mut heartbeat = interval(HEARTBEAT_INTERVAL);
    let mut last_seen = Instant::now();

    let close_reason = loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break None;
                }
                let message = updates.borrow_and_update().clone();
                if let Some(message) = message {
                    if session.text(message.to_string()).await.is_err() {
                        break None;
                    }
                }
            }
            msg = msg_stream.next() => {
                match msg {
                    Some(Ok(Message::Ping(bytes))) => {
                        last_seen = Instant::now();
                        if session.pong(&bytes).await.is_err() {
                            break None;
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {
                        last_seen = Instant::now();
                    }
                    Some(Ok(Message::Text(text))) => {
                        last_seen = Instant::now();
                        match text.trim() {
                            "snapshot" => {
                                if let Some(latest) = hub.latest() {
                                    if session.text(latest.to_string()).await.is_err() {
                                        break None;
                                    }
                                }
                            }
                            other => debug!("Ignoring client message: {}", other),
                        }
                    }
                    Some(Ok(Message::Close(reason))) => {
                        info!("Client {} requested close", addr);
                        break reason;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!("WebSocket protocol error from {}: {}", addr, e);
                        break None;
                    }
                    None => break None,
                }
            }
            _ = heartbeat.tick() => {
                if last_seen.elapsed() > HEARTBEAT_INTERVAL * HEARTBEAT_MISSES {
                    warn!("WebSocket client {} heartbeat timed out", addr);
                    break None;
                }
                if session.ping(b"").await.is_err() {
                    break None;
                }
            }
        }
    };

    hub.leave(&id);
    let _ = session.close(close_reason).await;
    info!("WebSocket connection from {} closed", addr);
}
