//! Conversation agent: a seed instruction, an append-only transcript and a
//! chat provider. Screener and Interviewer differ only in the seed text.

use crate::knowledge::{columns, Dossier, Posting};
use recruiter_core::{LlmConfig, Message, Result};
use recruiter_llm::{ChatProvider, ChatRequest, LlmError};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Synthetic first turn sent to a freshly created Screener.
pub const SCREENING_KICKOFF: &str = "Por favor, inicie a entrevista de triagem se apresentando.";

/// Synthetic first turn sent to a freshly created Interviewer.
pub const INTERVIEW_KICKOFF: &str = "Por favor, inicie a entrevista aprofundada se apresentando.";

const NOT_AVAILABLE: &str = "N/A";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AgentKind {
    /// First screening of a candidate with no record on the posting.
    Screener,
    /// In-depth interview of a candidate already tracked on the posting.
    Interviewer,
}

impl AgentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentKind::Screener => "screener",
            AgentKind::Interviewer => "interviewer",
        }
    }

    pub fn kickoff(&self) -> &'static str {
        match self {
            AgentKind::Screener => SCREENING_KICKOFF,
            AgentKind::Interviewer => INTERVIEW_KICKOFF,
        }
    }
}

/// Per-completion parameters shared by every agent.
#[derive(Clone, Debug)]
pub struct CompletionSettings {
    pub model: String,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    /// Deadline for one completion; exceeding it fails the turn.
    pub timeout: Duration,
}

impl Default for CompletionSettings {
    fn default() -> Self {
        Self::from(&LlmConfig::default())
    }
}

impl From<&LlmConfig> for CompletionSettings {
    fn from(config: &LlmConfig) -> Self {
        Self {
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            timeout: config.timeout(),
        }
    }
}

pub struct ConversationAgent {
    kind: AgentKind,
    transcript: Vec<Message>,
    provider: Arc<dyn ChatProvider>,
    settings: CompletionSettings,
}

impl ConversationAgent {
    pub fn new(
        kind: AgentKind,
        seed: impl Into<String>,
        provider: Arc<dyn ChatProvider>,
        settings: CompletionSettings,
    ) -> Self {
        Self {
            kind,
            transcript: vec![Message::system(seed)],
            provider,
            settings,
        }
    }

    /// Screener for a candidate with no candidacy on `posting`.
    pub fn for_new_candidate(
        posting: &Posting,
        candidate_name: &str,
        provider: Arc<dyn ChatProvider>,
        settings: CompletionSettings,
    ) -> Self {
        Self::new(
            AgentKind::Screener,
            screener_instruction(posting, candidate_name),
            provider,
            settings,
        )
    }

    /// Interviewer seeded with everything known about the candidate.
    pub fn for_known_candidate(
        dossier: &Dossier,
        provider: Arc<dyn ChatProvider>,
        settings: CompletionSettings,
    ) -> Self {
        Self::new(
            AgentKind::Interviewer,
            interviewer_instruction(dossier),
            provider,
            settings,
        )
    }

    pub fn kind(&self) -> AgentKind {
        self.kind
    }

    pub fn transcript(&self) -> &[Message] {
        &self.transcript
    }

    pub fn seed(&self) -> &str {
        &self.transcript[0].content
    }

    /// Append `user_text`, send the whole transcript, append and return the
    /// reply. A failed completion leaves the user turn in place.
    pub async fn advance(&mut self, user_text: &str) -> Result<String> {
        self.transcript.push(Message::user(user_text));

        let request = ChatRequest {
            model: self.settings.model.clone(),
            messages: self.transcript.clone(),
            max_tokens: self.settings.max_tokens,
            temperature: self.settings.temperature,
        };
        debug!(
            agent = self.kind.as_str(),
            messages = request.messages.len(),
            "sending transcript"
        );

        let provider = self.provider.name().to_string();
        let response = tokio::time::timeout(self.settings.timeout, self.provider.complete(request))
            .await
            .map_err(|_| LlmError::Timeout {
                timeout_ms: self.settings.timeout.as_millis() as u64,
            })
            .and_then(|result| result)
            .map_err(|e| e.into_service_error(&provider))?;

        let reply = response.message.content;
        self.transcript.push(Message::assistant(reply.clone()));
        Ok(reply)
    }
}

pub fn screener_instruction(posting: &Posting, candidate_name: &str) -> String {
    format!(
        r#"Você é "Alex", recrutador virtual da Decision. Sua tarefa é conduzir a primeira triagem de um NOVO candidato.

**CONTEXTO:**
- Nome do candidato: {name}
- Vaga de interesse: {title}
- Cliente: {client}
- Competências esperadas: {skills}

**ROTEIRO DA TRIAGEM:**
1. Pergunte quais tecnologias o(a) candidato(a) domina e há quantos anos trabalha com elas.
2. Pergunte o nível de inglês, a pretensão salarial e a modalidade de trabalho preferida.
3. Pergunte o que despertou o interesse nesta vaga.
Faça uma pergunta por vez. Ao final, agradeça e produza um resumo em JSON com os dados coletados."#,
        name = candidate_name.trim(),
        title = or_na(Some(posting.title.as_str())),
        client = or_na(posting.client.as_deref()),
        skills = or_na(posting.required_skills.as_deref()),
    )
}

pub fn interviewer_instruction(dossier: &Dossier) -> String {
    let field = |key: &str| dossier.text(key).unwrap_or_else(|| NOT_AVAILABLE.to_string());
    format!(
        r#"Você é "Alex", entrevistador virtual sênior da Decision. Sua tarefa é conduzir uma entrevista APROFUNDADA com um candidato já conhecido.

**DOSSIÊ:**
- Vaga: {title}
- Cliente: {client}
- Nível profissional: {seniority}
- Competências esperadas: {required}
- Candidato: {name}
- Situação no processo: {status}
- Conhecimentos já listados: {skills}

**ROTEIRO:**
Valide a análise técnica, o fit cultural e o engajamento. Baseie as perguntas no dossiê e aprofunde cada resposta. Ao final, agradeça e produza um resumo em JSON."#,
        title = field(columns::TITLE),
        client = field(columns::CLIENT),
        seniority = field(columns::SENIORITY),
        required = field(columns::REQUIRED_SKILLS),
        name = field(columns::CANDIDATE_NAME),
        status = field(columns::STATUS),
        skills = field(columns::TECH_SKILLS),
    )
}

fn or_na(value: Option<&str>) -> &str {
    match value {
        Some(v) if !v.trim().is_empty() => v,
        _ => NOT_AVAILABLE,
    }
}
