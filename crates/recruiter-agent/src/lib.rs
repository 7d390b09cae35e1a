//! Recruiter Agent - Knowledge lookups, conversation agents, sessions and the request router

pub mod conversation;
pub mod knowledge;
pub mod router;
pub mod session;

pub use conversation::{
    AgentKind, CompletionSettings, ConversationAgent, INTERVIEW_KICKOFF, SCREENING_KICKOFF,
};
pub use knowledge::{
    CandidateProfile, Candidacy, Dossier, KnowledgeStore, LookupMiss, Posting,
};
pub use router::{ask_name_reply, Router, NO_POSTING_REPLY};
pub use session::{Session, SessionPhase, SessionRegistry, SessionSlot, SessionStore};
pub use recruiter_core::SessionKey;
