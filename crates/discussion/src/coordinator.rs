//! The coordinator that drives one meeting's discussion.

use std::{collections::HashMap, sync::Arc, time::Duration};

use {
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
    serde_json::json,
    tokio::sync::{Mutex, oneshot},
    tracing::{debug, info, warn},
    uuid::Uuid,
};

use {conclave_hubs::MeetingHub, conclave_protocol::events::meeting};

use crate::{
    error::{DiscussionError, Result},
    state::{
        ABSTAIN, DiscussionPhase, DiscussionState, MeetingStatus, NO_RESPONSE, NO_VOTE,
    },
};

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Per-agent wait for an opinion or a vote.
    pub timeout: Duration,
    /// Minimum share of valid votes an option needs for consensus.
    pub consensus_threshold: f64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(conclave_protocol::DEFAULT_DISCUSSION_TIMEOUT_SECS),
            consensus_threshold: conclave_protocol::DEFAULT_CONSENSUS_THRESHOLD,
        }
    }
}

/// A recorded decision, with the full opinion/vote context attached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub title: String,
    pub description: String,
    pub proposed_by: String,
    pub options: Vec<serde_json::Value>,
    pub selected_option: Option<serde_json::Value>,
    pub rationale: Option<String>,
    pub status: String,
    pub opinions: std::collections::BTreeMap<String, String>,
    pub votes: std::collections::BTreeMap<String, String>,
    pub decided_at: DateTime<Utc>,
}

/// Drives round-robin opinion collection and consensus voting.
///
/// Single-writer: only the coordinator task mutates state. Agents feed in
/// answers through [`submit_opinion`]/[`submit_vote`], called by the gateway
/// when correlated frames arrive on the meeting socket.
///
/// [`submit_opinion`]: DiscussionCoordinator::submit_opinion
/// [`submit_vote`]: DiscussionCoordinator::submit_vote
pub struct DiscussionCoordinator {
    hub: Arc<MeetingHub>,
    meeting_id: Uuid,
    config: CoordinatorConfig,
    state: Mutex<DiscussionState>,
    opinions: Inbox,
    votes: Inbox,
}

/// Correlated answers for one collection round.
///
/// An answer arriving while its agent's wait is registered fulfils the wait
/// directly; an answer arriving early (the round broadcast reached the agent
/// before its sequential turn) is buffered and picked up when the turn
/// comes. Buffers are cleared at the start of each round.
#[derive(Default)]
struct Inbox {
    pending: Mutex<HashMap<String, oneshot::Sender<String>>>,
    early: Mutex<HashMap<String, String>>,
}

impl Inbox {
    async fn clear(&self) {
        self.pending.lock().await.clear();
        self.early.lock().await.clear();
    }

    /// Deliver an answer. Returns whether anything accepted it.
    async fn deliver(&self, agent_id: &str, answer: &str) -> bool {
        if let Some(sender) = self.pending.lock().await.remove(agent_id) {
            return sender.send(answer.to_string()).is_ok();
        }
        self.early
            .lock()
            .await
            .insert(agent_id.to_string(), answer.to_string());
        true
    }

    /// Wait up to `budget` for this agent's answer.
    async fn collect(&self, agent_id: &str, budget: Duration) -> Option<String> {
        if let Some(answer) = self.early.lock().await.remove(agent_id) {
            return Some(answer);
        }
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(agent_id.to_string(), tx);

        let answer = tokio::time::timeout(budget, rx).await;
        // Drop the slot on timeout so a late answer lands in the early
        // buffer of a future round instead of a dead wait.
        self.pending.lock().await.remove(agent_id);

        match answer {
            Ok(Ok(text)) => Some(text),
            _ => None,
        }
    }
}

impl DiscussionCoordinator {
    #[must_use]
    pub fn new(meeting_id: Uuid, hub: Arc<MeetingHub>, config: CoordinatorConfig) -> Self {
        Self {
            hub,
            meeting_id,
            config,
            state: Mutex::new(DiscussionState::new(meeting_id)),
            opinions: Inbox::default(),
            votes: Inbox::default(),
        }
    }

    #[must_use]
    pub fn meeting_id(&self) -> Uuid {
        self.meeting_id
    }

    /// Snapshot of the current state.
    pub async fn state(&self) -> DiscussionState {
        self.state.lock().await.clone()
    }

    /// Begin the discussion with the given speaking order.
    pub async fn start(
        &self,
        participants: Vec<String>,
        initial_speaker: Option<&str>,
    ) -> Result<()> {
        if participants.is_empty() {
            return Err(DiscussionError::NoParticipants);
        }
        let mut state = self.state.lock().await;
        if state.phase != DiscussionPhase::Initializing {
            return Err(DiscussionError::InvalidPhase {
                operation: "start",
                phase: state.phase,
            });
        }
        state.speakers = participants.into();
        if let Some(speaker) = initial_speaker {
            state.rotate_to(speaker);
        }
        state.current_speaker = state.speakers.front().cloned();
        state.started_at = Some(Utc::now());
        state.phase = DiscussionPhase::OpinionCollection;
        state.meeting_status = MeetingStatus::Active;
        info!(
            meeting_id = %self.meeting_id,
            speakers = state.speakers.len(),
            "discussion started"
        );
        Ok(())
    }

    /// Ask every participant for an opinion, strictly in order.
    ///
    /// Each agent gets an `opinion_request` event naming it, then the
    /// configured timeout to answer; silence records [`NO_RESPONSE`] and the
    /// round moves on.
    pub async fn request_opinions(
        &self,
        question: &str,
        context: Option<serde_json::Value>,
    ) -> Result<std::collections::BTreeMap<String, String>> {
        let speakers = {
            let mut state = self.state.lock().await;
            if state.phase != DiscussionPhase::OpinionCollection {
                return Err(DiscussionError::InvalidPhase {
                    operation: "request opinions",
                    phase: state.phase,
                });
            }
            state.current_question = Some(question.to_string());
            state.opinions.clear();
            state.speakers.clone()
        };
        self.opinions.clear().await;

        for agent_id in speakers {
            self.state.lock().await.current_speaker = Some(agent_id.clone());

            self.hub
                .broadcast(
                    self.meeting_id,
                    &json!({
                        "type": meeting::OPINION_REQUEST,
                        "agent_id": agent_id,
                        "question": question,
                        "context": context.clone().unwrap_or_else(|| json!({})),
                    }),
                )
                .await;

            let opinion = match self.opinions.collect(&agent_id, self.config.timeout).await {
                Some(opinion) => opinion,
                None => {
                    warn!(meeting_id = %self.meeting_id, agent_id, "opinion timed out");
                    NO_RESPONSE.to_string()
                },
            };
            self.state.lock().await.opinions.insert(agent_id, opinion);
        }

        Ok(self.state.lock().await.opinions.clone())
    }

    /// Deliver an agent's opinion for the current round.
    pub async fn submit_opinion(&self, agent_id: &str, opinion: &str) -> bool {
        let accepted = self.opinions.deliver(agent_id, opinion).await;
        if !accepted {
            debug!(agent_id, "opinion wait already gone");
        }
        accepted
    }

    /// Collect votes on a proposal, bounded by `deadline` and the per-agent
    /// timeout.
    pub async fn facilitate_consensus(
        &self,
        proposal: &str,
        options: &[String],
        deadline: Option<DateTime<Utc>>,
    ) -> Result<std::collections::BTreeMap<String, String>> {
        let speakers = {
            let mut state = self.state.lock().await;
            if state.opinions.is_empty() {
                return Err(DiscussionError::InvalidPhase {
                    operation: "facilitate consensus without opinions",
                    phase: state.phase,
                });
            }
            if state.phase != DiscussionPhase::OpinionCollection {
                return Err(DiscussionError::InvalidPhase {
                    operation: "facilitate consensus",
                    phase: state.phase,
                });
            }
            state.phase = DiscussionPhase::ConsensusBuilding;
            state.votes.clear();
            state.speakers.clone()
        };
        self.votes.clear().await;

        self.hub
            .broadcast(
                self.meeting_id,
                &json!({
                    "type": meeting::CONSENSUS_REQUEST,
                    "proposal": proposal,
                    "options": options,
                    "deadline": deadline.map(|d| d.to_rfc3339()),
                }),
            )
            .await;

        let deadline =
            deadline.unwrap_or_else(|| Utc::now() + chrono::Duration::from_std(self.config.timeout)
                .unwrap_or_else(|_| chrono::Duration::seconds(300)));

        for agent_id in speakers {
            let remaining = (deadline - Utc::now()).to_std().unwrap_or(Duration::ZERO);
            if remaining.is_zero() {
                break;
            }
            let budget = remaining.min(self.config.timeout);
            let vote = match self.votes.collect(&agent_id, budget).await {
                Some(vote) => vote,
                None => {
                    warn!(meeting_id = %self.meeting_id, agent_id, "vote timed out");
                    NO_VOTE.to_string()
                },
            };
            self.state.lock().await.votes.insert(agent_id, vote);
        }

        Ok(self.state.lock().await.votes.clone())
    }

    /// Deliver an agent's vote for the current consensus round.
    pub async fn submit_vote(&self, agent_id: &str, vote: &str) -> bool {
        let accepted = self.votes.deliver(agent_id, vote).await;
        if !accepted {
            debug!(agent_id, "vote wait already gone");
        }
        accepted
    }

    /// Tally the votes. Consensus exists when some option's share of valid
    /// votes reaches the threshold.
    pub async fn check_consensus(&self) -> Result<Option<String>> {
        let mut state = self.state.lock().await;
        if state.phase != DiscussionPhase::ConsensusBuilding {
            return Err(DiscussionError::InvalidPhase {
                operation: "check consensus",
                phase: state.phase,
            });
        }
        if state.votes.is_empty() {
            return Ok(None);
        }

        let mut counts: std::collections::BTreeMap<&str, usize> = Default::default();
        for vote in state.votes.values() {
            if vote != NO_VOTE && vote != ABSTAIN {
                *counts.entry(vote.as_str()).or_default() += 1;
            }
        }
        let total: usize = counts.values().sum();
        if total == 0 {
            return Ok(None);
        }

        let winner = counts.iter().find_map(|(option, count)| {
            if *count as f64 / total as f64 >= self.config.consensus_threshold {
                Some(option.to_string())
            } else {
                None
            }
        });
        if let Some(option) = winner {
            state.phase = DiscussionPhase::Decision;
            info!(meeting_id = %self.meeting_id, option, "consensus reached");
            return Ok(Some(option));
        }

        state.phase = DiscussionPhase::NoConsensus;
        info!(meeting_id = %self.meeting_id, "no consensus");
        Ok(None)
    }

    /// Record the decision and close the deliberation.
    pub async fn record_decision(
        &self,
        title: &str,
        description: &str,
        proposed_by: &str,
        options: Vec<serde_json::Value>,
        selected_option: Option<serde_json::Value>,
        rationale: Option<&str>,
    ) -> Result<Decision> {
        let mut state = self.state.lock().await;
        if !matches!(
            state.phase,
            DiscussionPhase::Decision | DiscussionPhase::NoConsensus
        ) {
            return Err(DiscussionError::InvalidPhase {
                operation: "record decision",
                phase: state.phase,
            });
        }
        let decision = Decision {
            title: title.to_string(),
            description: description.to_string(),
            proposed_by: proposed_by.to_string(),
            options,
            status: if selected_option.is_some() {
                "approved".to_string()
            } else {
                "no_consensus".to_string()
            },
            selected_option,
            rationale: rationale.map(str::to_string),
            opinions: state.opinions.clone(),
            votes: state.votes.clone(),
            decided_at: Utc::now(),
        };
        state.phase = DiscussionPhase::Completed;
        Ok(decision)
    }

    /// Broadcast the outcome and clear the in-memory state.
    pub async fn complete_discussion(&self) {
        let (opinions, votes) = {
            let state = self.state.lock().await;
            (state.opinions.clone(), state.votes.clone())
        };

        self.hub
            .broadcast(
                self.meeting_id,
                &json!({
                    "type": meeting::DISCUSSION_COMPLETED,
                    "meeting_id": self.meeting_id.to_string(),
                    "opinions": opinions,
                    "votes": votes,
                }),
            )
            .await;

        let mut state = self.state.lock().await;
        let meeting_id = state.meeting_id;
        *state = DiscussionState::new(meeting_id);
        state.phase = DiscussionPhase::Completed;
        state.meeting_status = MeetingStatus::Completed;
        info!(meeting_id = %self.meeting_id, "discussion completed");
    }

}
