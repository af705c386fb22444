//! Fakes shared by the loop tests.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rival_middleware::{ActuatorDispatcher, RecordingGateway};
use rival_types::{GameSnapshot, RivalError};

use crate::catalog::SoundCatalog;
use crate::game_client::GameStateService;
use crate::mood::MoodTuning;
use crate::random::Dice;
use crate::reactions::Performer;
use crate::scheduler::CooldownConfig;
use crate::state::{EngineState, SharedState};

pub fn snapshot(turn: i64, lead: i64, game_over: bool) -> GameSnapshot {
    GameSnapshot {
        turn_index: turn,
        score_lead: lead,
        game_over,
        ..GameSnapshot::fresh()
    }
}

/// Game service whose current snapshot the test sets by hand.
pub struct ScriptedGame {
    current: Mutex<GameSnapshot>,
    failing: Mutex<bool>,
    reset_failing: Mutex<bool>,
    resets: Mutex<usize>,
}

impl ScriptedGame {
    pub fn new(snap: GameSnapshot) -> Arc<Self> {
        Arc::new(Self {
            current: Mutex::new(snap),
            failing: Mutex::new(false),
            reset_failing: Mutex::new(false),
            resets: Mutex::new(0),
        })
    }

    pub fn set(&self, snap: GameSnapshot) {
        *self.current.lock().unwrap() = snap;
    }

    pub fn fail(&self, failing: bool) {
        *self.failing.lock().unwrap() = failing;
    }

    pub fn fail_reset(&self, failing: bool) {
        *self.reset_failing.lock().unwrap() = failing;
    }

    pub fn resets(&self) -> usize {
        *self.resets.lock().unwrap()
    }
}

#[async_trait]
impl GameStateService for ScriptedGame {
    async fn fetch(&self) -> Result<GameSnapshot, RivalError> {
        if *self.failing.lock().unwrap() {
            return Err(RivalError::GameService("connection refused".into()));
        }
        Ok(self.current.lock().unwrap().clone())
    }

    async fn reset(&self) -> Result<(), RivalError> {
        *self.resets.lock().unwrap() += 1;
        if *self.reset_failing.lock().unwrap() {
            return Err(RivalError::GameService("connection refused".into()));
        }
        Ok(())
    }
}

/// A performer wired to a recording gateway, with every roll fixed.
pub struct Rig {
    pub gateway: Arc<RecordingGateway>,
    pub performer: Performer,
}

impl Rig {
    pub fn new(roll: f64) -> Self {
        let gateway = Arc::new(RecordingGateway::new());
        let (dispatcher, handle) = ActuatorDispatcher::new(gateway.clone());
        tokio::spawn(dispatcher.run());
        let state = SharedState::new(EngineState::new(
            CooldownConfig::default(),
            MoodTuning::default(),
        ));
        let performer = Performer::new(
            handle,
            state,
            Arc::new(Dice::fixed(roll)),
            Arc::new(SoundCatalog::default()),
            Duration::from_secs(5),
        );
        Self { gateway, performer }
    }

    pub fn state(&self) -> &SharedState {
        self.performer.state()
    }

    /// Let the dispatcher drain fire-and-forget commands.
    pub async fn settle(&self) {
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }
}
