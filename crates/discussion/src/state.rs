//! In-memory discussion state.

use std::collections::{BTreeMap, VecDeque};

use {
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
    uuid::Uuid,
};

/// Recorded when an agent does not answer an opinion request in time.
pub const NO_RESPONSE: &str = "[NO RESPONSE]";
/// Recorded when an agent does not vote in time.
pub const NO_VOTE: &str = "[NO VOTE]";
/// An explicit abstention; excluded from consensus tallies like [`NO_VOTE`].
pub const ABSTAIN: &str = "[ABSTAIN]";

/// Phases advance strictly forward; see the coordinator for the gates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscussionPhase {
    Initializing,
    OpinionCollection,
    ConsensusBuilding,
    Decision,
    NoConsensus,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeetingStatus {
    Pending,
    Active,
    Completed,
}

/// Everything the coordinator knows about one meeting's discussion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscussionState {
    pub meeting_id: Uuid,
    pub phase: DiscussionPhase,
    pub meeting_status: MeetingStatus,
    /// Speaking order; the head is the next speaker.
    pub speakers: VecDeque<String>,
    pub current_speaker: Option<String>,
    pub current_question: Option<String>,
    pub opinions: BTreeMap<String, String>,
    pub votes: BTreeMap<String, String>,
    pub started_at: Option<DateTime<Utc>>,
}

impl DiscussionState {
    #[must_use]
    pub fn new(meeting_id: Uuid) -> Self {
        Self {
            meeting_id,
            phase: DiscussionPhase::Initializing,
            meeting_status: MeetingStatus::Pending,
            speakers: VecDeque::new(),
            current_speaker: None,
            current_question: None,
            opinions: BTreeMap::new(),
            votes: BTreeMap::new(),
            started_at: None,
        }
    }

    /// Rotate the deque until `speaker` is at the head. Unknown speakers
    /// leave the order untouched.
    pub fn rotate_to(&mut self, speaker: &str) {
        let Some(position) = self.speakers.iter().position(|s| s == speaker) else {
            return;
        };
        self.speakers.rotate_left(position);
    }
}
