//! Narrative collaborator.
//!
//! The engine never writes prose itself. A [`Narrator`] turns a player action
//! into a narration line that the session records in the story log.

use crate::campaign::CampaignId;
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tokio::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NarrationError {
    #[error("Narrator unavailable: {0}")]
    Unavailable(String),

    #[error("Narrator produced no text")]
    Empty,
}

/// What the narrator is asked to respond to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NarrationRequest {
    pub campaign_id: CampaignId,
    pub scene: String,
    pub speaker: Option<String>,
    pub action: String,
}

/// Source of narration text for player actions.
#[async_trait]
pub trait Narrator: Send + Sync {
    async fn narrate(&self, request: &NarrationRequest) -> Result<String, NarrationError>;

    /// Get the narrator name
    fn name(&self) -> &str;
}

/// Broad kind of a player action, judged by keywords.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionCategory {
    Combat,
    Social,
    Investigation,
    Rest,
    Exploration,
}

impl ActionCategory {
    /// Categorize a free-text action. Checked in order; the first match wins.
    pub fn classify(action: &str) -> Self {
        let lower = action.to_lowercase();
        let has = |words: &[&str]| words.iter().any(|w| lower.contains(w));
        if has(&["attack", "fight", "kill"]) {
            ActionCategory::Combat
        } else if has(&["talk", "speak", "ask"]) {
            ActionCategory::Social
        } else if has(&["search", "investigate", "look"]) {
            ActionCategory::Investigation
        } else if has(&["rest", "sleep", "camp"]) {
            ActionCategory::Rest
        } else {
            ActionCategory::Exploration
        }
    }

    fn templates(&self) -> &'static [&'static str] {
        match self {
            ActionCategory::Combat => &[
                "{who} lunges forward, steel flashing in the torchlight.",
                "{who} strikes, and the clash of weapons echoes through the halls.",
                "With a battle cry, {who} presses the attack.",
            ],
            ActionCategory::Social => &[
                "{who} speaks, and the stranger leans in to listen.",
                "The words of {who} hang in the air as the listener weighs them.",
                "A wary smile answers {who}. Perhaps there is common ground here.",
            ],
            ActionCategory::Investigation => &[
                "{who} searches carefully. Dust, old bones, and a faint draft from the far wall.",
                "As {who} looks closer, scratches on the flagstones hint at a hidden mechanism.",
                "{who} finds a dusty journal. The final entry speaks of a guardian that sleeps.",
            ],
            ActionCategory::Rest => &[
                "{who} settles in to rest. The night passes without incident.",
                "Binding wounds and catching breath, {who} takes a moment to recover.",
            ],
            ActionCategory::Exploration => &[
                "{who} ventures onward. The corridor narrows and the air grows cold.",
                "Behind a tapestry, {who} discovers a hidden alcove.",
                "{who} presses deeper into the unknown.",
            ],
        }
    }
}

impl fmt::Display for ActionCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ActionCategory::Combat => "combat",
            ActionCategory::Social => "social",
            ActionCategory::Investigation => "investigation",
            ActionCategory::Rest => "rest",
            ActionCategory::Exploration => "exploration",
        };
        write!(f, "{name}")
    }
}

/// Offline narrator built from fixed templates.
pub struct CannedNarrator {
    rng: Mutex<StdRng>,
}

impl CannedNarrator {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    pub fn from_entropy() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }
}

#[async_trait]
impl Narrator for CannedNarrator {
    async fn narrate(&self, request: &NarrationRequest) -> Result<String, NarrationError> {
        let category = ActionCategory::classify(&request.action);
        let who = request.speaker.as_deref().unwrap_or("The party");
        let mut rng = self.rng.lock().await;
        let template = category
            .templates()
            .choose(&mut *rng)
            .ok_or(NarrationError::Empty)?;
        tracing::debug!(%category, campaign = %request.campaign_id, "canned narration");
        Ok(template.replace("{who}", who))
    }

    fn name(&self) -> &str {
        "canned"
    }
}
