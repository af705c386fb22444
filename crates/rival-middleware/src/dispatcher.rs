//! Single authoritative execution context for actuator commands.
//!
//! Both engine loops hold a cloneable [`ActuatorHandle`].  Every command they
//! send lands on one channel consumed by the [`ActuatorDispatcher`] task,
//! which is the only owner of the [`ActuatorGateway`].  Commands are issued in
//! the order they were sent, regardless of which loop sent them.
//!
//! Fire-and-forget sends ([`ActuatorHandle::speak`], ...) never block the
//! caller; failures are logged by the dispatcher.  Awaited sends
//! ([`ActuatorHandle::call`]) resolve once the robot acknowledges the command.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use rival_middleware::{ActuatorDispatcher, RecordingGateway};
//!
//! # async fn demo() {
//! let (dispatcher, handle) = ActuatorDispatcher::new(Arc::new(RecordingGateway::new()));
//! tokio::spawn(dispatcher.run());
//! handle.speak("Your move.");
//! # }
//! ```

use std::sync::Arc;

use rival_types::{ActuatorCommand, RivalError};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::gateway::{ActuatorGateway, Completion};

struct Request {
    command: ActuatorCommand,
    reply: Option<oneshot::Sender<Result<Completion, RivalError>>>,
}

/// Owns the gateway and drains the command channel.
pub struct ActuatorDispatcher {
    gateway: Arc<dyn ActuatorGateway>,
    rx: mpsc::UnboundedReceiver<Request>,
}

impl ActuatorDispatcher {
    /// Create a dispatcher and the first handle feeding it.
    pub fn new(gateway: Arc<dyn ActuatorGateway>) -> (Self, ActuatorHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { gateway, rx }, ActuatorHandle { tx })
    }

    /// Issue commands until every [`ActuatorHandle`] has been dropped.
    ///
    /// Acknowledgements are awaited off the dispatch path, so a slow command
    /// never delays the issue of the next one.
    pub async fn run(mut self) {
        while let Some(Request { command, reply }) = self.rx.recv().await {
            let kind = command.kind();
            let issued = self.gateway.dispatch(command).await;
            match reply {
                Some(reply) => {
                    let _ = reply.send(issued);
                }
                None => match issued {
                    Ok(completion) => {
                        tokio::spawn(async move {
                            if let Err(e) = completion.wait().await {
                                warn!(command = kind, error = %e, "actuator command failed");
                            }
                        });
                    }
                    Err(e) => warn!(command = kind, error = %e, "actuator command not issued"),
                },
            }
        }
        debug!("actuator dispatcher stopped: all handles dropped");
    }
}

/// Cloneable sender side of the dispatcher.
#[derive(Clone)]
pub struct ActuatorHandle {
    tx: mpsc::UnboundedSender<Request>,
}

impl ActuatorHandle {
    /// Queue `command` without waiting for it.
    pub fn send(&self, command: ActuatorCommand) {
        let kind = command.kind();
        if self
            .tx
            .send(Request {
                command,
                reply: None,
            })
            .is_err()
        {
            warn!(command = kind, "actuator dispatcher is gone; command dropped");
        }
    }

    /// Queue `command` and wait until the robot acknowledges it.
    ///
    /// # Errors
    ///
    /// Returns [`RivalError::Channel`] if the dispatcher has stopped, or the
    /// gateway's error if the command failed.
    pub async fn call(&self, command: ActuatorCommand) -> Result<(), RivalError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Request {
                command,
                reply: Some(reply),
            })
            .map_err(|_| RivalError::Channel("actuator dispatcher stopped".into()))?;
        let completion = rx
            .await
            .map_err(|_| RivalError::Channel("actuator dispatcher stopped".into()))??;
        completion.wait().await
    }

    pub fn speak(&self, text: impl Into<String>) {
        self.send(ActuatorCommand::Speak { text: text.into() });
    }

    /// Speak and wait for the robot to acknowledge the line.
    pub async fn speak_and_wait(&self, text: impl Into<String>) -> Result<(), RivalError> {
        self.call(ActuatorCommand::Speak { text: text.into() }).await
    }

    pub fn stop_speech(&self) {
        self.send(ActuatorCommand::StopSpeech);
    }

    pub fn play_gesture(&self, name: impl Into<String>) {
        self.send(ActuatorCommand::PlayGesture {
            name: name.into(),
            blocking: false,
        });
    }

    /// Play a gesture synchronously and wait until it has finished.
    pub async fn play_gesture_blocking(&self, name: impl Into<String>) -> Result<(), RivalError> {
        self.call(ActuatorCommand::PlayGesture {
            name: name.into(),
            blocking: true,
        })
        .await
    }

    pub fn stream_audio(&self, url: impl Into<String>) {
        self.send(ActuatorCommand::StreamAudio { url: url.into() });
    }

    pub fn stop_audio(&self) {
        self.send(ActuatorCommand::StopAudio);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::RecordingGateway;

    fn spawn_dispatcher() -> (Arc<RecordingGateway>, ActuatorHandle) {
        let gw = Arc::new(RecordingGateway::new());
        let (dispatcher, handle) = ActuatorDispatcher::new(gw.clone());
        tokio::spawn(dispatcher.run());
        (gw, handle)
    }

    #[tokio::test]
    async fn fire_and_forget_preserves_order_across_handles() {
        let (gw, handle) = spawn_dispatcher();
        let other = handle.clone();
        handle.speak("first");
        other.play_gesture("BlocklyDab");
        handle.stream_audio("https://example.org/a.wav");
        // An awaited call flushes everything queued before it.
        handle.speak_and_wait("last").await.unwrap();

        let kinds: Vec<_> = gw.commands().iter().map(|c| c.kind()).collect();
        assert_eq!(kinds, vec!["speak", "play_gesture", "stream_audio", "speak"]);
    }

    #[tokio::test]
    async fn blocking_gesture_is_marked_blocking() {
        let (gw, handle) = spawn_dispatcher();
        handle.play_gesture_blocking("BlocklyCrouch").await.unwrap();
        assert_eq!(
            gw.commands(),
            vec![ActuatorCommand::PlayGesture {
                name: "BlocklyCrouch".into(),
                blocking: true
            }]
        );
    }

    #[tokio::test]
    async fn awaited_call_surfaces_gateway_failure() {
        let (gw, handle) = spawn_dispatcher();
        gw.fail_on("speak");
        assert!(handle.speak_and_wait("hello").await.is_err());
    }

    #[tokio::test]
    async fn call_after_dispatcher_stopped_is_channel_error() {
        let gw = Arc::new(RecordingGateway::new());
        let (dispatcher, handle) = ActuatorDispatcher::new(gw);
        drop(dispatcher);
        assert!(matches!(
            handle.call(ActuatorCommand::StopAudio).await,
            Err(RivalError::Channel(_))
        ));
        // Fire-and-forget never panics either.
        handle.stop_speech();
    }
}
