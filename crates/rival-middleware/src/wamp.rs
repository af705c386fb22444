//! WAMP gateway for the physical robot.
//!
//! [`WampGateway`] speaks the WAMP v2 "basic profile" as a *caller* over a
//! JSON WebSocket (`wamp.2.json` subprotocol):
//!
//! * **Handshake** – `HELLO [1, realm, {roles}]` answered by
//!   `WELCOME [2, session, details]`; `ABORT [3, ...]` is a hard failure.
//!
//! * **Outbound** – every [`ActuatorCommand`] becomes one
//!   `CALL [48, request, {}, procedure, [], kwargs]` frame.  Frames are queued
//!   to a single writer task, so commands hit the wire in dispatch order.
//!
//! * **Inbound** – `RESULT [50, request, ...]` and `ERROR [8, 48, request, ...]`
//!   resolve the matching pending [`Completion`].  When the socket closes all
//!   pending completions fail with [`RivalError::Channel`].
//!
//! * **Reconnect** – a lost session is rejoined with exponential backoff
//!   (0.5 s doubling up to 30 s).  Calls made in the meantime fail at once
//!   instead of queueing stale speech.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use rival_types::{ActuatorCommand, RivalError};
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tracing::{debug, info, warn};

use crate::gateway::{ActuatorGateway, Completion};

/// WebSocket subprotocol for JSON-serialised WAMP v2.
pub const WAMP_SUBPROTOCOL: &str = "wamp.2.json";

/// How long the TCP connect plus `HELLO`/`WELCOME` exchange may take.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Reconnect backoff bounds after a lost session.
const RECONNECT_MIN: Duration = Duration::from_millis(500);
const RECONNECT_MAX: Duration = Duration::from_secs(30);

const MSG_HELLO: u64 = 1;
const MSG_WELCOME: u64 = 2;
const MSG_ABORT: u64 = 3;
const MSG_GOODBYE: u64 = 6;
const MSG_ERROR: u64 = 8;
const MSG_CALL: u64 = 48;
const MSG_RESULT: u64 = 50;

// ─────────────────────────────────────────────────────────────────────────────
// Procedure mapping
// ─────────────────────────────────────────────────────────────────────────────

/// Map a command to its robot procedure URI and keyword arguments.
pub fn procedure_for(command: &ActuatorCommand) -> (&'static str, Value) {
    match command {
        ActuatorCommand::Speak { text } => ("rie.dialogue.say", json!({ "text": text })),
        ActuatorCommand::StopSpeech => ("rie.dialogue.stop", json!({})),
        ActuatorCommand::PlayGesture { name, blocking } => (
            "rom.optional.behavior.play",
            json!({ "name": name, "sync": blocking }),
        ),
        ActuatorCommand::StreamAudio { url } => (
            "rom.actuator.audio.stream",
            json!({ "url": url, "sync": false }),
        ),
        ActuatorCommand::StopAudio => ("rom.actuator.audio.stop", json!({})),
    }
}

fn hello_frame(realm: &str) -> Value {
    json!([MSG_HELLO, realm, { "roles": { "caller": {} } }])
}

fn call_frame(request_id: u64, command: &ActuatorCommand) -> Value {
    let (procedure, kwargs) = procedure_for(command);
    json!([MSG_CALL, request_id, {}, procedure, [], kwargs])
}

// ─────────────────────────────────────────────────────────────────────────────
// Inbound frames
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, PartialEq)]
enum Inbound {
    Welcome { session: u64 },
    Abort { reason: String },
    CallResult { request: u64 },
    CallError { request: u64, uri: String },
    Goodbye,
    Other,
}

fn parse_frame(text: &str) -> Inbound {
    let Ok(Value::Array(items)) = serde_json::from_str::<Value>(text) else {
        return Inbound::Other;
    };
    let code = items.first().and_then(Value::as_u64);
    let int_at = |i: usize| items.get(i).and_then(Value::as_u64);
    let str_at = |i: usize| {
        items
            .get(i)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };

    match code {
        Some(MSG_WELCOME) => int_at(1)
            .map(|session| Inbound::Welcome { session })
            .unwrap_or(Inbound::Other),
        Some(MSG_ABORT) => Inbound::Abort { reason: str_at(2) },
        Some(MSG_RESULT) => int_at(1)
            .map(|request| Inbound::CallResult { request })
            .unwrap_or(Inbound::Other),
        Some(MSG_ERROR) if int_at(1) == Some(MSG_CALL) => int_at(2)
            .map(|request| Inbound::CallError {
                request,
                uri: str_at(4),
            })
            .unwrap_or(Inbound::Other),
        Some(MSG_GOODBYE) => Inbound::Goodbye,
        _ => Inbound::Other,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// WampGateway
// ─────────────────────────────────────────────────────────────────────────────

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type Reply = oneshot::Sender<Result<(), RivalError>>;

/// One queued `CALL`, answered through `reply`.
struct Call {
    request: u64,
    kind: &'static str,
    frame: Message,
    reply: Reply,
}

enum SessionEnd {
    /// The router or the network dropped the session.
    Lost,
    /// Every [`WampGateway`] handle is gone.
    Released,
}

/// Caller-side WAMP session bound to one realm.
///
/// A background task owns the socket.  When the session drops it fails the
/// calls still in flight, refuses new ones, and rejoins the realm with
/// exponential backoff.
pub struct WampGateway {
    calls: mpsc::UnboundedSender<Call>,
    next_request: AtomicU64,
}

impl WampGateway {
    /// Open the WebSocket, join `realm` and start the session task.
    ///
    /// # Errors
    ///
    /// Returns [`RivalError::Actuator`] when the first connection, the
    /// handshake or the realm join fails or times out.  Later drops are
    /// retried in the background.
    pub async fn connect(url: &str, realm: &str) -> Result<Self, RivalError> {
        let ws = open_session(url, realm).await?;
        let (calls, calls_rx) = mpsc::unbounded_channel();
        tokio::spawn(supervise(url.to_string(), realm.to_string(), ws, calls_rx));
        Ok(Self {
            calls,
            next_request: AtomicU64::new(1),
        })
    }
}

async fn open_session(url: &str, realm: &str) -> Result<WsStream, RivalError> {
    let handshake_err = |details: String| RivalError::Actuator {
        command: "connect".into(),
        details,
    };

    let mut request = url
        .into_client_request()
        .map_err(|e| handshake_err(format!("invalid router url {url}: {e}")))?;
    request
        .headers_mut()
        .insert(SEC_WEBSOCKET_PROTOCOL, HeaderValue::from_static(WAMP_SUBPROTOCOL));

    let (mut ws, _) = tokio::time::timeout(HANDSHAKE_TIMEOUT, connect_async(request))
        .await
        .map_err(|_| handshake_err(format!("timed out connecting to {url}")))?
        .map_err(|e| handshake_err(format!("ws connect to {url}: {e}")))?;

    ws.send(Message::Text(hello_frame(realm).to_string().into()))
        .await
        .map_err(|e| handshake_err(format!("sending HELLO: {e}")))?;

    let welcome = async {
        while let Some(msg) = ws.next().await {
            let msg = msg.map_err(|e| handshake_err(e.to_string()))?;
            let Message::Text(text) = msg else { continue };
            match parse_frame(text.as_str()) {
                Inbound::Welcome { session } => return Ok(session),
                Inbound::Abort { reason } => {
                    return Err(handshake_err(format!("router aborted join: {reason}")));
                }
                _ => continue,
            }
        }
        Err(handshake_err("router closed before WELCOME".into()))
    };
    let session = tokio::time::timeout(HANDSHAKE_TIMEOUT, welcome)
        .await
        .map_err(|_| handshake_err("timed out waiting for WELCOME".into()))??;
    info!(session, realm, url, "WAMP session established");
    Ok(ws)
}

/// Run sessions back to back until every gateway handle is dropped.
async fn supervise(
    url: String,
    realm: String,
    mut ws: WsStream,
    mut calls: mpsc::UnboundedReceiver<Call>,
) {
    loop {
        if let SessionEnd::Released = run_session(ws, &mut calls).await {
            debug!("WAMP gateway released");
            return;
        }
        let mut backoff = RECONNECT_MIN;
        ws = loop {
            warn!(retry_in_ms = backoff.as_millis() as u64, "WAMP session lost; reconnecting");
            if !refuse_calls_for(backoff, &mut calls).await {
                return;
            }
            match open_session(&url, &realm).await {
                Ok(ws) => break ws,
                Err(e) => {
                    warn!(error = %e, "WAMP reconnect failed");
                    backoff = (backoff * 2).min(RECONNECT_MAX);
                }
            }
        };
    }
}

/// Drive one joined session: write queued calls, resolve replies.
async fn run_session(ws: WsStream, calls: &mut mpsc::UnboundedReceiver<Call>) -> SessionEnd {
    let (mut ws_tx, mut ws_rx) = ws.split();
    let mut pending: HashMap<u64, Reply> = HashMap::new();
    let end = loop {
        tokio::select! {
            call = calls.recv() => {
                let Some(call) = call else {
                    let _ = ws_tx.close().await;
                    break SessionEnd::Released;
                };
                if let Err(e) = ws_tx.send(call.frame).await {
                    warn!(error = %e, command = call.kind, "WAMP write failed");
                    let _ = call.reply.send(Err(session_closed()));
                    break SessionEnd::Lost;
                }
                debug!(request = call.request, command = call.kind, "WAMP call issued");
                pending.insert(call.request, call.reply);
            }
            msg = ws_rx.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    if !resolve(&mut pending, parse_frame(text.as_str())) {
                        break SessionEnd::Lost;
                    }
                }
                Some(Ok(Message::Close(_))) | None => break SessionEnd::Lost,
                Some(Err(e)) => {
                    warn!(error = %e, "WAMP socket error");
                    break SessionEnd::Lost;
                }
                Some(Ok(_)) => {}
            },
        }
    };
    if !pending.is_empty() {
        warn!(in_flight = pending.len(), "WAMP session closed; failing pending calls");
    }
    for (_, reply) in pending.drain() {
        let _ = reply.send(Err(session_closed()));
    }
    end
}

/// Fail every call that arrives during `wait`.  `false` once the gateway is
/// released.
async fn refuse_calls_for(wait: Duration, calls: &mut mpsc::UnboundedReceiver<Call>) -> bool {
    let sleep = tokio::time::sleep(wait);
    tokio::pin!(sleep);
    loop {
        tokio::select! {
            _ = &mut sleep => return true,
            call = calls.recv() => match call {
                Some(call) => {
                    debug!(command = call.kind, "WAMP call refused while reconnecting");
                    let _ = call.reply.send(Err(session_closed()));
                }
                None => return false,
            },
        }
    }
}

fn session_closed() -> RivalError {
    RivalError::Channel("WAMP session closed".into())
}

/// Settle the call a frame answers.  `false` when the router ends the
/// session.
fn resolve(pending: &mut HashMap<u64, Reply>, frame: Inbound) -> bool {
    let (request, outcome) = match frame {
        Inbound::CallResult { request } => (request, Ok(())),
        Inbound::CallError { request, uri } => (
            request,
            Err(RivalError::Actuator {
                command: format!("request {request}"),
                details: uri,
            }),
        ),
        Inbound::Goodbye => {
            info!("router sent GOODBYE");
            return false;
        }
        _ => return true,
    };
    if let Some(reply) = pending.remove(&request) {
        let _ = reply.send(outcome);
    }
    true
}

#[async_trait]
impl ActuatorGateway for WampGateway {
    async fn dispatch(&self, command: ActuatorCommand) -> Result<Completion, RivalError> {
        let request = self.next_request.fetch_add(1, Ordering::Relaxed);
        let frame = Message::Text(call_frame(request, &command).to_string().into());
        let (reply, completion) = Completion::pending();
        let call = Call {
            request,
            kind: command.kind(),
            frame,
            reply,
        };
        if self.calls.send(call).is_err() {
            return Err(RivalError::Actuator {
                command: command.kind().into(),
                details: "WAMP session task stopped".into(),
            });
        }
        Ok(completion)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_hdr_async;
    use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};

    #[test]
    fn speak_maps_to_dialogue_say() {
        let (proc_uri, kwargs) = procedure_for(&ActuatorCommand::Speak {
            text: "hello".into(),
        });
        assert_eq!(proc_uri, "rie.dialogue.say");
        assert_eq!(kwargs["text"], "hello");
    }

    #[test]
    fn gesture_carries_sync_flag() {
        let (proc_uri, kwargs) = procedure_for(&ActuatorCommand::PlayGesture {
            name: "BlocklyDab".into(),
            blocking: true,
        });
        assert_eq!(proc_uri, "rom.optional.behavior.play");
        assert_eq!(kwargs["name"], "BlocklyDab");
        assert_eq!(kwargs["sync"], true);
    }

    #[test]
    fn audio_stream_is_never_synchronous() {
        let (_, kwargs) = procedure_for(&ActuatorCommand::StreamAudio {
            url: "https://example.org/a.wav".into(),
        });
        assert_eq!(kwargs["sync"], false);
    }

    #[test]
    fn call_frame_layout() {
        let frame = call_frame(7, &ActuatorCommand::StopAudio);
        assert_eq!(frame[0], MSG_CALL);
        assert_eq!(frame[1], 7);
        assert_eq!(frame[3], "rom.actuator.audio.stop");
    }

    #[test]
    fn parses_result_and_error_frames() {
        assert_eq!(
            parse_frame(r#"[50, 12, {}]"#),
            Inbound::CallResult { request: 12 }
        );
        assert_eq!(
            parse_frame(r#"[8, 48, 13, {}, "wamp.error.no_such_procedure"]"#),
            Inbound::CallError {
                request: 13,
                uri: "wamp.error.no_such_procedure".into()
            }
        );
        assert_eq!(parse_frame(r#"[2, 99, {}]"#), Inbound::Welcome { session: 99 });
        assert_eq!(parse_frame("not json"), Inbound::Other);
    }

    /// Minimal router: joins the client, then answers each CALL with RESULT
    /// except calls to `rie.dialogue.stop`, which get an ERROR.  With
    /// `drop_first_after`, the first connection is closed once it has
    /// answered that many calls; later connections stay up.
    async fn spawn_router(drop_first_after: Option<usize>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut limit = drop_first_after;
            loop {
                let (stream, _) = listener.accept().await.unwrap();
                tokio::spawn(serve(stream, limit.take()));
            }
        });
        format!("ws://{addr}")
    }

    async fn serve(stream: TcpStream, close_after: Option<usize>) {
        let ws = accept_hdr_async(
            stream,
            |_req: &Request, mut resp: Response| -> Result<Response, ErrorResponse> {
                resp.headers_mut().insert(
                    SEC_WEBSOCKET_PROTOCOL,
                    HeaderValue::from_static(WAMP_SUBPROTOCOL),
                );
                Ok(resp)
            },
        )
        .await
        .unwrap();
        let (mut tx, mut rx) = ws.split();
        let mut answered = 0;
        while let Some(Ok(Message::Text(text))) = rx.next().await {
            let frame: Value = serde_json::from_str(text.as_str()).unwrap();
            let reply = match frame[0].as_u64() {
                Some(MSG_HELLO) => json!([MSG_WELCOME, 4242, {}]),
                Some(MSG_CALL) if frame[3] == "rie.dialogue.stop" => {
                    json!([MSG_ERROR, MSG_CALL, frame[1], {}, "wamp.error.runtime_error"])
                }
                Some(MSG_CALL) => json!([MSG_RESULT, frame[1], {}]),
                _ => continue,
            };
            if tx.send(Message::Text(reply.to_string().into())).await.is_err() {
                return;
            }
            if frame[0].as_u64() == Some(MSG_CALL) {
                answered += 1;
                if close_after == Some(answered) {
                    let _ = tx.close().await;
                    return;
                }
            }
        }
    }

    #[tokio::test]
    async fn round_trip_against_local_router() {
        let url = spawn_router(None).await;
        let gateway = WampGateway::connect(&url, "rie.test").await.unwrap();

        let ok = gateway
            .dispatch(ActuatorCommand::Speak { text: "hi".into() })
            .await
            .unwrap();
        assert!(ok.wait().await.is_ok());

        let failing = gateway.dispatch(ActuatorCommand::StopSpeech).await.unwrap();
        let err = failing.wait().await.unwrap_err();
        assert!(err.to_string().contains("runtime_error"));
    }

    #[tokio::test]
    async fn lost_session_is_rejoined() {
        let url = spawn_router(Some(1)).await;
        let gateway = WampGateway::connect(&url, "rie.test").await.unwrap();
        let speak = || ActuatorCommand::Speak { text: "hi".into() };

        let first = gateway.dispatch(speak()).await.unwrap();
        assert!(first.wait().await.is_ok());

        // Calls made while the session is down fail promptly, never hang.
        let mut rejoined = false;
        for _ in 0..50 {
            let completion = gateway.dispatch(speak()).await.unwrap();
            let outcome = tokio::time::timeout(Duration::from_secs(2), completion.wait())
                .await
                .expect("completion settled");
            if outcome.is_ok() {
                rejoined = true;
                break;
            }
            assert!(matches!(outcome, Err(RivalError::Channel(_))));
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert!(rejoined);
    }
}
