//! Request router: the per-session state machine.
//!
//! No session → posting lookup; `AwaitingCandidateName` → identity
//! resolution and agent creation; `InConversation` → forward to the agent.

use crate::conversation::{CompletionSettings, ConversationAgent};
use crate::knowledge::{KnowledgeStore, Posting};
use crate::session::{Session, SessionPhase, SessionStore};
use recruiter_core::{Error, Result, SessionKey};
use recruiter_llm::ChatProvider;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Reply when a first message matches no posting.
pub const NO_POSTING_REPLY: &str = "Peço desculpas, mas no momento não encontrei um processo seletivo com este nome. Agradeço seu interesse!";

/// Reply once a posting is identified.
pub fn ask_name_reply(posting_title: &str) -> String {
    format!(
        "Excelente! Encontrei a vaga '{}'. Para continuarmos, por favor, me informe seu nome completo.",
        posting_title
    )
}

pub struct Router {
    knowledge: Arc<KnowledgeStore>,
    sessions: Arc<dyn SessionStore>,
    provider: Arc<dyn ChatProvider>,
    settings: CompletionSettings,
}

impl Router {
    pub fn new(
        knowledge: Arc<KnowledgeStore>,
        sessions: Arc<dyn SessionStore>,
        provider: Arc<dyn ChatProvider>,
        settings: CompletionSettings,
    ) -> Self {
        Self {
            knowledge,
            sessions,
            provider,
            settings,
        }
    }

    pub fn knowledge(&self) -> &Arc<KnowledgeStore> {
        &self.knowledge
    }

    pub fn sessions(&self) -> &Arc<dyn SessionStore> {
        &self.sessions
    }

    /// Handle one inbound message. `request_received` and `request_finished`
    /// are emitted on every path, failures and dropped requests included.
    pub async fn handle(&self, key: &SessionKey, user_input: &str) -> Result<String> {
        info!(
            event = "request_received",
            session_id = %key,
            input_length = user_input.chars().count(),
            "request received"
        );
        let mut finish = FinishGuard::new(key);

        let result = self.route(key, user_input).await;

        if let Err(e) = &result {
            error!(
                event = "request_failed",
                session_id = %key,
                error = %e,
                "request failed"
            );
        }
        finish.complete(result.is_ok());
        result
    }

    async fn route(&self, key: &SessionKey, user_input: &str) -> Result<String> {
        // Unknown ids get their posting looked up before a slot is taken, so
        // a query that matches nothing never evicts anyone.
        let mut matched: Option<Posting> = None;
        loop {
            let slot = match self.sessions.get(key) {
                Some(slot) => slot,
                None => {
                    if matched.is_none() {
                        match self.find_posting(key, user_input) {
                            Some(posting) => matched = Some(posting),
                            None => return Ok(NO_POSTING_REPLY.to_string()),
                        }
                    }
                    self.sessions.acquire(key)?
                }
            };
            let mut guard = slot.lock().await;
            if !self.sessions.is_current(key, &slot) {
                // Evicted or discarded while we waited; start over on a fresh slot.
                continue;
            }

            let result = if let Some(session) = guard.as_mut() {
                self.continue_session(key, session, user_input).await
            } else {
                // Empty slot: ours, or one whose creator has not stored yet.
                match matched.take().or_else(|| self.find_posting(key, user_input)) {
                    Some(posting) => {
                        let reply = ask_name_reply(&posting.title);
                        *guard = Some(Session::awaiting_candidate(posting));
                        Ok(reply)
                    }
                    None => Ok(NO_POSTING_REPLY.to_string()),
                }
            };

            self.sessions.release(key, &slot, guard.is_some());
            return result;
        }
    }

    /// First message for an id: find the posting.
    fn find_posting(&self, key: &SessionKey, user_input: &str) -> Option<Posting> {
        let Some(posting) = self.knowledge.search_postings(user_input).into_iter().next() else {
            warn!(
                event = "posting_not_found",
                session_id = %key,
                query = %user_input,
                "no posting matched query"
            );
            return None;
        };

        info!(
            event = "posting_identified",
            session_id = %key,
            posting_id = %posting.id,
            title = %posting.title,
            seniority = posting.seniority.as_deref(),
            client = posting.client.as_deref(),
            "posting identified"
        );
        Some(posting)
    }

    async fn continue_session(
        &self,
        key: &SessionKey,
        session: &mut Session,
        user_input: &str,
    ) -> Result<String> {
        match session.phase() {
            SessionPhase::AwaitingCandidateName => {
                self.resolve_candidate(key, session, user_input).await
            }
            SessionPhase::InConversation => match session.agent_mut() {
                Some(agent) => agent.advance(user_input).await,
                None => Err(Error::InvalidSessionState(format!(
                    "session {} is in conversation without an agent",
                    key
                ))),
            },
        }
    }

    /// Second message: decide Screener vs Interviewer, start the conversation
    /// and return the agent's reply to the kickoff turn.
    async fn resolve_candidate(
        &self,
        key: &SessionKey,
        session: &mut Session,
        name_fragment: &str,
    ) -> Result<String> {
        let posting = session.posting();

        let agent = match self.knowledge.find_candidacy(name_fragment, &posting.id) {
            Err(miss) => {
                info!(
                    event = "new_candidate",
                    session_id = %key,
                    posting_id = %posting.id,
                    candidate_name = %name_fragment,
                    "new candidate"
                );
                debug!(session_id = %key, reason = %miss, "no candidacy matched");
                ConversationAgent::for_new_candidate(
                    posting,
                    name_fragment,
                    self.provider.clone(),
                    self.settings.clone(),
                )
            }
            Ok(candidacy) => {
                info!(
                    event = "known_candidate",
                    session_id = %key,
                    posting_id = %posting.id,
                    candidate_code = %candidacy.candidate_code,
                    "known candidate"
                );
                let dossier = self
                    .knowledge
                    .build_dossier(&posting.id, &candidacy.candidate_code)
                    .map_err(|miss| {
                        error!(
                            event = "dossier_inconsistent",
                            session_id = %key,
                            posting_id = %posting.id,
                            candidate_id = %candidacy.candidate_code,
                            reason = %miss,
                            "candidacy found but dossier could not be built"
                        );
                        Error::InconsistentDossier {
                            posting_id: posting.id.clone(),
                            candidate_id: candidacy.candidate_code.clone(),
                            reason: miss.to_string(),
                        }
                    })?;
                ConversationAgent::for_known_candidate(
                    &dossier,
                    self.provider.clone(),
                    self.settings.clone(),
                )
            }
        };

        let kickoff = agent.kind().kickoff();
        debug!(session_id = %key, agent = agent.kind().as_str(), "conversation started");
        session.begin_conversation(agent).advance(kickoff).await
    }
}

/// Emits `request_finished` when dropped, so a request abandoned mid-flight
/// is still counted.
struct FinishGuard<'a> {
    key: &'a SessionKey,
    started: Instant,
    outcome: Option<bool>,
}

impl<'a> FinishGuard<'a> {
    fn new(key: &'a SessionKey) -> Self {
        Self {
            key,
            started: Instant::now(),
            outcome: None,
        }
    }

    fn complete(&mut self, ok: bool) {
        self.outcome = Some(ok);
    }
}

impl Drop for FinishGuard<'_> {
    fn drop(&mut self) {
        let duration_ms = (self.started.elapsed().as_secs_f64() * 100_000.0).round() / 100.0;
        info!(
            event = "request_finished",
            session_id = %self.key,
            duration_ms,
            ok = self.outcome.unwrap_or(false),
            cancelled = self.outcome.is_none(),
            "request finished"
        );
    }
}
