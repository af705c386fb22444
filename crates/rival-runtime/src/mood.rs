//! [`MoodProfile`] – lead → category and action probabilities.
//!
//! A pure function of the latest score lead.  The lead is normalised into
//! `adv ∈ [-1, 1]` by dividing by [`MoodTuning::lead_scale`] and clamping;
//! every probability is a baseline plus a signed linear term in `adv`,
//! clamped to `[0, 1]`.
//!
//! # Example
//!
//! ```
//! use rival_runtime::mood::MoodProfile;
//! use rival_types::MoodCategory;
//!
//! let cocky = MoodProfile::compute(8);
//! assert_eq!(cocky.category, MoodCategory::DominatingAgent);
//! assert!(cocky.stall_sound_probability < MoodProfile::compute(0).stall_sound_probability);
//! ```

use rival_types::MoodCategory;
use serde::{Deserialize, Serialize};

/// Leads at or beyond this magnitude are a blowout.
pub const DOMINATING_LEAD: i64 = 6;
/// Leads at or beyond this magnitude are a clear lead.
pub const LEADING_LEAD: i64 = 3;

/// Baselines of the mood curves.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MoodTuning {
    pub speak_base: f64,
    pub gesture_base: f64,
    pub sound_base: f64,
    pub stall_base: f64,
    pub idle_gesture_base: f64,
    /// Lead that maps to `adv = ±1`.
    pub lead_scale: f64,
}

impl Default for MoodTuning {
    fn default() -> Self {
        Self {
            speak_base: 0.33,
            gesture_base: 0.10,
            sound_base: 0.25,
            stall_base: 0.15,
            idle_gesture_base: 0.25,
            lead_scale: 6.0,
        }
    }
}

/// Live mood derived from the score lead.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MoodProfile {
    pub category: MoodCategory,
    pub lead: i64,
    pub speak_probability: f64,
    pub gesture_probability: f64,
    pub sound_probability: f64,
    pub stall_sound_probability: f64,
    pub idle_gesture_probability: f64,
}

impl Default for MoodProfile {
    fn default() -> Self {
        Self::compute(0)
    }
}

impl MoodProfile {
    pub fn compute(lead: i64) -> Self {
        Self::compute_with(lead, &MoodTuning::default())
    }

    pub fn compute_with(lead: i64, tuning: &MoodTuning) -> Self {
        let category = category_for(lead);
        let scale = if tuning.lead_scale > 0.0 {
            tuning.lead_scale
        } else {
            DOMINATING_LEAD as f64
        };
        let adv = (lead as f64 / scale).clamp(-1.0, 1.0);
        let ahead = adv.max(0.0);
        let behind = (-adv).max(0.0);
        let close_bonus = if category == MoodCategory::Close { 0.05 } else { 0.0 };

        Self {
            category,
            lead,
            speak_probability: clamp01(tuning.speak_base + 0.06 * adv),
            gesture_probability: clamp01(tuning.gesture_base + 0.20 * ahead - 0.10 * behind),
            sound_probability: clamp01(tuning.sound_base + 0.10 * adv.abs() + close_bonus),
            stall_sound_probability: clamp01(tuning.stall_base + 0.20 * behind - 0.15 * ahead),
            idle_gesture_probability: clamp01(
                tuning.idle_gesture_base + 0.10 * ahead - 0.10 * behind,
            ),
        }
    }
}

pub fn category_for(lead: i64) -> MoodCategory {
    if lead >= DOMINATING_LEAD {
        MoodCategory::DominatingAgent
    } else if lead >= LEADING_LEAD {
        MoodCategory::LeadingAgent
    } else if lead <= -DOMINATING_LEAD {
        MoodCategory::DominatingHuman
    } else if lead <= -LEADING_LEAD {
        MoodCategory::LeadingHuman
    } else {
        MoodCategory::Close
    }
}

/// Attitude line appended to the gameplay system prompt.
pub fn prompt_suffix(category: MoodCategory) -> &'static str {
    match category {
        MoodCategory::DominatingAgent => {
            "You are DOMINATING: be smug, cocky, and playful. Flex hard."
        }
        MoodCategory::LeadingAgent => "You are winning: be confident and teasing.",
        MoodCategory::DominatingHuman => {
            "You are getting cooked: be salty, defensive, and a bit stressed."
        }
        MoodCategory::LeadingHuman => {
            "You are losing: be annoyed, blame luck or your sensors, sound less confident."
        }
        MoodCategory::Close => "It's close: be tense, impatient, and competitive.",
    }
}

fn clamp01(x: f64) -> f64 {
    x.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    #[test]
    fn category_thresholds_are_inclusive() {
        assert_eq!(category_for(6), MoodCategory::DominatingAgent);
        assert_eq!(category_for(5), MoodCategory::LeadingAgent);
        assert_eq!(category_for(3), MoodCategory::LeadingAgent);
        assert_eq!(category_for(2), MoodCategory::Close);
        assert_eq!(category_for(-2), MoodCategory::Close);
        assert_eq!(category_for(-3), MoodCategory::LeadingHuman);
        assert_eq!(category_for(-5), MoodCategory::LeadingHuman);
        assert_eq!(category_for(-6), MoodCategory::DominatingHuman);
    }

    #[test]
    fn even_game_uses_baselines_plus_close_bonus() {
        let p = MoodProfile::compute(0);
        assert!((p.speak_probability - 0.33).abs() < EPS);
        assert!((p.gesture_probability - 0.10).abs() < EPS);
        assert!((p.sound_probability - 0.30).abs() < EPS);
        assert!((p.stall_sound_probability - 0.15).abs() < EPS);
    }

    #[test]
    fn big_lead_saturates_at_scale() {
        let at_six = MoodProfile::compute(6);
        let at_forty = MoodProfile::compute(40);
        assert_eq!(at_six.speak_probability, at_forty.speak_probability);
        assert!((at_six.gesture_probability - 0.30).abs() < EPS);
        assert!((at_six.stall_sound_probability - 0.0).abs() < EPS);
    }

    #[test]
    fn losing_badly_raises_stall_and_lowers_gestures() {
        let p = MoodProfile::compute(-6);
        assert!((p.stall_sound_probability - 0.35).abs() < EPS);
        assert!((p.gesture_probability - 0.0).abs() < EPS);
        assert!((p.idle_gesture_probability - 0.15).abs() < EPS);
    }

    #[test]
    fn dominating_lead_stalls_less_than_even_game() {
        let p = MoodProfile::compute(8);
        assert_eq!(p.category, MoodCategory::DominatingAgent);
        assert!(p.stall_sound_probability < MoodProfile::compute(0).stall_sound_probability);
    }

    #[test]
    fn probabilities_stay_in_unit_interval_under_extreme_tuning() {
        let tuning = MoodTuning {
            speak_base: 1.5,
            gesture_base: -0.5,
            sound_base: 0.99,
            stall_base: 2.0,
            idle_gesture_base: -1.0,
            lead_scale: 0.0,
        };
        for lead in -50..=50 {
            let p = MoodProfile::compute_with(lead, &tuning);
            for v in [
                p.speak_probability,
                p.gesture_probability,
                p.sound_probability,
                p.stall_sound_probability,
                p.idle_gesture_probability,
            ] {
                assert!((0.0..=1.0).contains(&v), "lead {lead}: {v}");
            }
        }
    }

    #[test]
    fn every_category_has_a_prompt_suffix() {
        for lead in [-9, -4, 0, 4, 9] {
            assert!(!prompt_suffix(category_for(lead)).is_empty());
        }
    }
}
