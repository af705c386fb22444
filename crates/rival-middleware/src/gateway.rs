//! The actuator gateway seam.
//!
//! The engine never speaks directly to the robot's RPC router.  It hands
//! [`ActuatorCommand`]s to the [`ActuatorDispatcher`][crate::dispatcher::ActuatorDispatcher],
//! which owns exactly one [`ActuatorGateway`] and translates every command
//! into the protocol of the outside world.
//!
//! # Overview
//!
//! - [`ActuatorGateway`] – the trait every gateway must implement.
//! - [`WampGateway`][crate::wamp::WampGateway] – drives the physical robot
//!   over WAMP (JSON over WebSocket).
//! - [`RecordingGateway`][crate::recording::RecordingGateway] – records the
//!   commands in memory; used for dry runs and tests.

use async_trait::async_trait;
use rival_types::{ActuatorCommand, RivalError};
use tokio::sync::oneshot;

/// Every actuator backend must implement this trait.
///
/// # Contract
///
/// `dispatch` returns as soon as the command has been *issued* (for example
/// written to the socket).  Commands dispatched one after another are issued
/// in that order.  The returned [`Completion`] resolves once the robot
/// acknowledges the command; callers that do not care simply drop it.
#[async_trait]
pub trait ActuatorGateway: Send + Sync {
    /// Issue `command` to the robot.
    async fn dispatch(&self, command: ActuatorCommand) -> Result<Completion, RivalError>;
}

enum CompletionState {
    Ready(Result<(), RivalError>),
    Pending(oneshot::Receiver<Result<(), RivalError>>),
}

/// Acknowledgement handle for an issued command.
pub struct Completion {
    state: CompletionState,
}

impl Completion {
    /// A command that is already finished.
    pub fn ready() -> Self {
        Self {
            state: CompletionState::Ready(Ok(())),
        }
    }

    /// A command that failed after being issued.
    pub fn failed(err: RivalError) -> Self {
        Self {
            state: CompletionState::Ready(Err(err)),
        }
    }

    /// Create a pending completion together with the sender that resolves it.
    pub fn pending() -> (oneshot::Sender<Result<(), RivalError>>, Self) {
        let (tx, rx) = oneshot::channel();
        (
            tx,
            Self {
                state: CompletionState::Pending(rx),
            },
        )
    }

    /// Wait for the robot's acknowledgement.
    ///
    /// A dropped sender (the connection went away) surfaces as
    /// [`RivalError::Channel`].
    pub async fn wait(self) -> Result<(), RivalError> {
        match self.state {
            CompletionState::Ready(res) => res,
            CompletionState::Pending(rx) => rx
                .await
                .map_err(|_| RivalError::Channel("actuator acknowledgement dropped".into()))?,
        }
    }
}
