//! Named gestures, sound pools, and the mood-driven choices between them.

use std::collections::HashMap;

use rival_types::{GestureTag, MoodCategory, SoundCategory};
use serde::{Deserialize, Serialize};

use crate::random::Dice;

// ─────────────────────────────────────────────────────────────────────────────
// Gestures
// ─────────────────────────────────────────────────────────────────────────────

pub const WIN_BIG: &[&str] = &["BlocklyDiscoDance", "BlocklyStarWars", "BlocklyMacarena"];
pub const WIN_SMALL: &[&str] = &["BlocklyDab", "BlocklyHappy", "BlocklyApplause"];
pub const LOSE: &[&str] = &["BlocklyCrouch", "BlocklyShrug", "BlocklySad"];
pub const ANNOY: &[&str] = &["BlocklySneeze", "BlocklySaxophone", "BlocklyTurnAround"];
pub const IDLE: &[&str] = &["BlocklyTaiChiChuan", "BlocklyStand"];

pub const STAND: &str = "BlocklyStand";
pub const CROUCH: &str = "BlocklyCrouch";
pub const SHRUG: &str = "BlocklyShrug";
pub const DAB: &str = "BlocklyDab";
pub const GANGNAM: &str = "BlocklyGangnamStyle";
pub const SNEEZE: &str = "BlocklySneeze";
pub const APPLAUSE: &str = "BlocklyApplause";

/// Whose good news a gesture celebrates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GestureSide {
    Winning,
    Losing,
    Neutral,
}

pub fn gesture_side(name: &str) -> GestureSide {
    if WIN_BIG.contains(&name) || WIN_SMALL.contains(&name) {
        GestureSide::Winning
    } else if LOSE.contains(&name) {
        GestureSide::Losing
    } else {
        GestureSide::Neutral
    }
}

fn pick_or(dice: &Dice, pool: &[&'static str], fallback: &'static str) -> &'static str {
    dice.pick(pool).copied().unwrap_or(fallback)
}

/// Resolve an action tag to a concrete gesture.
pub fn gesture_for_tag(tag: GestureTag, dice: &Dice) -> &'static str {
    match tag {
        GestureTag::Dance => pick_or(dice, WIN_BIG, "BlocklyDiscoDance"),
        GestureTag::Dab => DAB,
        GestureTag::Sneeze => SNEEZE,
        GestureTag::Clap => APPLAUSE,
        GestureTag::Sad => pick_or(dice, LOSE, CROUCH),
    }
}

/// Candidate gesture after a move; `None` when the mood calls for nothing.
pub fn midgame_gesture(category: MoodCategory, dice: &Dice) -> Option<&'static str> {
    match category {
        MoodCategory::DominatingAgent => Some(pick_or(dice, WIN_BIG, "BlocklyDiscoDance")),
        MoodCategory::LeadingAgent => Some(pick_or(dice, WIN_SMALL, DAB)),
        MoodCategory::DominatingHuman => Some(pick_or(dice, LOSE, CROUCH)),
        MoodCategory::LeadingHuman => {
            if dice.chance(0.6) {
                Some(SHRUG)
            } else {
                Some(pick_or(dice, LOSE, SHRUG))
            }
        }
        MoodCategory::Close => dice
            .chance(0.35)
            .then(|| pick_or(dice, ANNOY, SNEEZE)),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Sound categories by mood
// ─────────────────────────────────────────────────────────────────────────────

/// Category of the deferred stall sound: cocky when ahead, tense when
/// close, bored when behind.
pub fn stall_category(category: MoodCategory, dice: &Dice) -> SoundCategory {
    if category.agent_ahead() {
        if dice.chance(0.75) {
            SoundCategory::Win
        } else {
            SoundCategory::Annoy
        }
    } else if category == MoodCategory::Close {
        if dice.chance(0.85) {
            SoundCategory::Annoy
        } else {
            SoundCategory::Wait
        }
    } else if dice.chance(0.85) {
        SoundCategory::Wait
    } else {
        SoundCategory::Annoy
    }
}

pub fn idle_category(category: MoodCategory) -> SoundCategory {
    if category.human_ahead() {
        SoundCategory::Wait
    } else {
        SoundCategory::Annoy
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Sound pools
// ─────────────────────────────────────────────────────────────────────────────

const DEFAULT_SOUND_BASE: &str = "https://github.com/Ary-x86/HAI-Robot1/raw/refs/heads/main/audio/";

/// Sound effect URLs per category.
///
/// Entries that already look like URLs are used as-is; bare file names are
/// joined onto `base_url`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SoundCatalog {
    pub base_url: String,
    pub pools: HashMap<SoundCategory, Vec<String>>,
}

impl Default for SoundCatalog {
    fn default() -> Self {
        let pool = |files: &[&str]| files.iter().map(|f| f.to_string()).collect::<Vec<_>>();
        let pools = HashMap::from([
            (
                SoundCategory::Win,
                pool(&[
                    "tmp_7901-951678082.mp3",
                    "vine-boom.mp3",
                    "mi-bombo.mp3",
                    "fahhh_KcgAXfs.mp3",
                    "let-me-know.mp3",
                    "meme-de-creditos-finales.mp3",
                    "rat-dance-music.mp3",
                    "wrong-answer-sound-effect.mp3",
                ]),
            ),
            (
                SoundCategory::Lose,
                pool(&[
                    "downer_noise.mp3",
                    "spongebob-fail.mp3",
                    "sponge-stank-noise.mp3",
                    "another-one_dPvHt2Z.mp3",
                    "baby-laughing-meme.mp3",
                    "bye-bye-lumi-athena-sfx.mp3",
                    "ny-video-online-audio-converter.mp3",
                    "sitcom-laughing-1.mp3",
                ]),
            ),
            (
                SoundCategory::Annoy,
                pool(&[
                    "awkward-moment.mp3",
                    "tuco-get-out.mp3",
                    "oh-my-god-bro-oh-hell-nah-man.mp3",
                    "aplausos_2.mp3",
                    "enrique.mp3",
                    "error_CDOxCYm.mp3",
                    "he-he-he-ha-clash-royale-deep-fried.mp3",
                    "metal-pipe-clang.mp3",
                    "rizz-sound-effect.mp3",
                ]),
            ),
            (
                SoundCategory::Wait,
                pool(&[
                    "we-are-charlie-kirk-song.mp3",
                    "500-cigarettes-tiktok-version.mp3",
                    "pluh.mp3",
                ]),
            ),
        ]);
        Self {
            base_url: DEFAULT_SOUND_BASE.to_string(),
            pools,
        }
    }
}

impl SoundCatalog {
    /// A random URL from `category`'s pool, or `None` if the pool is empty.
    pub fn url_for(&self, category: SoundCategory, dice: &Dice) -> Option<String> {
        let entry = dice.pick(self.pools.get(&category)?)?;
        if entry.starts_with("http://") || entry.starts_with("https://") {
            return Some(entry.clone());
        }
        Some(format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            entry.trim_start_matches('/')
        ))
    }
}
