//! In-memory gateway used for `--dry-run` and tests.

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use rival_types::{ActuatorCommand, CommandRecord, RivalError};
use tracing::info;

use crate::gateway::{ActuatorGateway, Completion};

/// Records every dispatched command instead of driving a robot.
///
/// Commands whose [`ActuatorCommand::kind`] was registered with
/// [`RecordingGateway::fail_on`] are still recorded but report a failure,
/// which lets tests exercise error paths.
#[derive(Default)]
pub struct RecordingGateway {
    records: Mutex<Vec<CommandRecord>>,
    failing: Mutex<HashSet<&'static str>>,
}

impl RecordingGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every future command of `kind` (e.g. `"speak"`) fail.
    pub fn fail_on(&self, kind: &'static str) {
        self.failing
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(kind);
    }

    /// All records so far, oldest first.
    pub fn records(&self) -> Vec<CommandRecord> {
        self.records
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    /// All commands so far, oldest first.
    pub fn commands(&self) -> Vec<ActuatorCommand> {
        self.records().into_iter().map(|r| r.command).collect()
    }

    /// Every spoken line, in order.
    pub fn spoken(&self) -> Vec<String> {
        self.commands()
            .into_iter()
            .filter_map(|c| match c {
                ActuatorCommand::Speak { text } => Some(text),
                _ => None,
            })
            .collect()
    }

    /// Every gesture name, in order.
    pub fn gestures(&self) -> Vec<String> {
        self.commands()
            .into_iter()
            .filter_map(|c| match c {
                ActuatorCommand::PlayGesture { name, .. } => Some(name),
                _ => None,
            })
            .collect()
    }

    /// Every streamed audio URL, in order.
    pub fn streamed(&self) -> Vec<String> {
        self.commands()
            .into_iter()
            .filter_map(|c| match c {
                ActuatorCommand::StreamAudio { url } => Some(url),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl ActuatorGateway for RecordingGateway {
    async fn dispatch(&self, command: ActuatorCommand) -> Result<Completion, RivalError> {
        let kind = command.kind();
        let record = CommandRecord::new(command);
        info!(
            id = %record.id,
            command = kind,
            payload = ?record.command,
            "dry-run actuator command"
        );
        self.records
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(record);

        let fails = self
            .failing
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .contains(kind);
        if fails {
            return Ok(Completion::failed(RivalError::Actuator {
                command: kind.into(),
                details: "injected failure".into(),
            }));
        }
        Ok(Completion::ready())
    }
}
