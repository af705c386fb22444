//! `rival-middleware` – Actuator plumbing
//!
//! Routes actuator commands from the behavior engine to the robot without
//! caring about what the commands mean.
//!
//! # Modules
//!
//! - [`gateway`] – the [`ActuatorGateway`] trait and the [`Completion`]
//!   acknowledgement handle.
//! - [`wamp`] – [`WampGateway`]: WAMP v2 caller over a JSON WebSocket.
//! - [`recording`] – [`RecordingGateway`]: in-memory sink for dry runs and
//!   tests.
//! - [`dispatcher`] – [`ActuatorDispatcher`] task plus cloneable
//!   [`ActuatorHandle`]; the single context that issues commands.

pub mod dispatcher;
pub mod gateway;
pub mod recording;
pub mod wamp;

pub use dispatcher::{ActuatorDispatcher, ActuatorHandle};
pub use gateway::{ActuatorGateway, Completion};
pub use recording::RecordingGateway;
pub use wamp::WampGateway;
