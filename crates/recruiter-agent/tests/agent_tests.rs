//! Tests for recruiter-agent: KnowledgeStore lookups, ConversationAgent, and
//! the Router state machine driven by a MockProvider.

use recruiter_agent::*;
use recruiter_core::{Error, Role};
use recruiter_llm::{ChatProvider, MockBehavior, MockProvider};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

// ===========================================================================
// Fixtures
// ===========================================================================

fn postings_json() -> Value {
    json!([
        {
            "id_vaga": "v01",
            "titulo_vaga": "Engenheiro de Software Sênior",
            "cliente": "Empresa A",
            "competencia_tecnicas_e_comportamentais": "Rust, Kubernetes, comunicação",
            "nivel profissional": "Sênior"
        },
        {
            "id_vaga": "v02",
            "titulo_vaga": "Analista de Dados",
            "cliente": "Empresa B",
            "nivel profissional": "Pleno"
        },
        {
            "id_vaga": "v03",
            "titulo_vaga": "Engenheiro de Dados",
            "cliente": "Empresa C"
        }
    ])
}

fn candidacies_json() -> Value {
    json!([
        {
            "id_vaga": "v01",
            "codigo": "c002",
            "nome": "Maria Silva",
            "situacao_candidado": "Encaminhado ao Requisitante",
            "conhecimentos_tecnicos": "Rust, Go"
        },
        {
            "id_vaga": "v01",
            "codigo": "c999",
            "nome": "João Sem Perfil"
        },
        {
            "id_vaga": "v02",
            "codigo": "c003",
            "nome": "Maria Souza"
        }
    ])
}

fn profiles_json() -> Value {
    json!([
        {
            "id_candidato": "c002",
            "infos_basicas": {"email": "maria@example.com", "cliente": "Perfil X"},
            "formacao_e_idiomas": {"nivel_ingles": "Avançado"},
            "situacao_candidado": "Perfil ativo"
        },
        {
            "id_candidato": "c003",
            "infos_basicas": {"email": "souza@example.com"}
        }
    ])
}

fn write_tables(dir: &Path) {
    std::fs::write(dir.join("vagas.json"), postings_json().to_string()).unwrap();
    std::fs::write(dir.join("prospects.json"), candidacies_json().to_string()).unwrap();
    std::fs::write(dir.join("applicants.json"), profiles_json().to_string()).unwrap();
}

fn store() -> KnowledgeStore {
    let dir = tempfile::tempdir().unwrap();
    write_tables(dir.path());
    KnowledgeStore::load(dir.path()).unwrap()
}

fn settings() -> CompletionSettings {
    CompletionSettings {
        model: "test-model".into(),
        max_tokens: Some(256),
        temperature: None,
        timeout: Duration::from_secs(5),
    }
}

fn router_with(provider: Arc<MockProvider>, settings: CompletionSettings) -> Router {
    let sessions: Arc<dyn SessionStore> =
        Arc::new(SessionRegistry::new(100, Duration::from_secs(3600)));
    Router::new(Arc::new(store()), sessions, provider, settings)
}

fn router(provider: Arc<MockProvider>) -> Router {
    router_with(provider, settings())
}

async fn transcript_len(router: &Router, key: &SessionKey) -> usize {
    let slot = router.sessions().get(key).expect("session registered");
    let guard = slot.lock().await;
    guard
        .as_ref()
        .and_then(|s| s.agent())
        .map(|a| a.transcript().len())
        .unwrap_or(0)
}

async fn phase(router: &Router, key: &SessionKey) -> Option<SessionPhase> {
    let slot = router.sessions().get(key)?;
    let guard = slot.lock().await;
    guard.as_ref().map(|s| s.phase())
}

// ===========================================================================
// KnowledgeStore: loading
// ===========================================================================

#[test]
fn load_reads_all_tables() {
    let store = store();
    assert_eq!(store.postings().len(), 3);
    assert_eq!(store.candidacies().len(), 3);
    assert_eq!(store.profiles().len(), 2);
    assert_eq!(store.profile("c002").unwrap().fields["nivel_ingles"], "Avançado");
}

#[test]
fn load_fails_on_missing_table() {
    let dir = tempfile::tempdir().unwrap();
    write_tables(dir.path());
    std::fs::remove_file(dir.path().join("applicants.json")).unwrap();

    match KnowledgeStore::load(dir.path()) {
        Err(Error::DataLoad { table, .. }) => assert_eq!(table, "profiles"),
        other => panic!("Expected DataLoad, got {:?}", other.err()),
    }
}

#[test]
fn load_fails_on_malformed_table() {
    let dir = tempfile::tempdir().unwrap();
    write_tables(dir.path());
    std::fs::write(dir.path().join("vagas.json"), "{ not json").unwrap();

    match KnowledgeStore::load(dir.path()) {
        Err(Error::DataLoad { table, .. }) => assert_eq!(table, "postings"),
        other => panic!("Expected DataLoad, got {:?}", other.err()),
    }
}

#[test]
fn load_fails_on_row_without_key() {
    let dir = tempfile::tempdir().unwrap();
    write_tables(dir.path());
    std::fs::write(
        dir.path().join("prospects.json"),
        json!([{"nome": "Sem Vaga"}]).to_string(),
    )
    .unwrap();

    let err = KnowledgeStore::load(dir.path()).err().expect("load should fail");
    let message = err.to_string();
    assert!(message.contains("candidacies"), "{message}");
    assert!(message.contains("row 0"), "{message}");
}

// ===========================================================================
// KnowledgeStore: search_postings
// ===========================================================================

#[test]
fn search_ignores_stop_words_and_case() {
    let store = store();
    let hits = store.search_postings("Vaga de ENGENHEIRO de software");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, "v01");
}

#[test]
fn search_requires_every_keyword() {
    let store = store();
    assert!(store.search_postings("engenheiro analista").is_empty());
}

#[test]
fn search_returns_matches_in_source_order() {
    let store = store();
    let ids: Vec<String> = store
        .search_postings("engenheiro")
        .into_iter()
        .map(|p| p.id)
        .collect();
    assert_eq!(ids, vec!["v01", "v03"]);
}

#[test]
fn search_with_only_stop_words_matches_nothing() {
    let store = store();
    assert!(store.search_postings("vaga de").is_empty());
    assert!(store.search_postings("").is_empty());
}

#[test]
fn search_is_stable_across_repeated_queries() {
    let store = store();
    let first = store.search_postings("dados");
    let second = store.search_postings("dados");
    assert_eq!(first, second);
    assert_eq!(first.len(), 2);
}

// ===========================================================================
// KnowledgeStore: find_candidacy / build_dossier
// ===========================================================================

#[test]
fn find_candidacy_is_substring_and_case_insensitive() {
    let store = store();
    let c = store.find_candidacy("  maria  ", "v01").unwrap();
    assert_eq!(c.candidate_code, "c002");
    let c = store.find_candidacy("SILVA", "v01").unwrap();
    assert_eq!(c.candidate_code, "c002");
}

#[test]
fn find_candidacy_is_scoped_to_posting() {
    let store = store();
    let c = store.find_candidacy("Maria", "v02").unwrap();
    assert_eq!(c.candidate_code, "c003");
    assert!(matches!(
        store.find_candidacy("Souza", "v01"),
        Err(LookupMiss::NoNameMatch { .. })
    ));
}

#[test]
fn find_candidacy_misses() {
    let store = store();
    assert!(matches!(
        store.find_candidacy("Maria", "v03"),
        Err(LookupMiss::NoCandidacies(_))
    ));
    assert!(matches!(
        store.find_candidacy("   ", "v01"),
        Err(LookupMiss::NoNameMatch { .. })
    ));
}

#[test]
fn find_candidacy_treats_fragment_literally() {
    let store = store();
    assert!(store.find_candidacy("Mar.a", "v01").is_err());
    assert!(store.find_candidacy(".*", "v01").is_err());
}

#[test]
fn dossier_merges_with_candidacy_winning() {
    let store = store();
    let dossier = store.build_dossier("v01", "c002").unwrap();

    assert!(dossier.has_candidacy());
    assert_eq!(dossier.text("titulo_vaga").as_deref(), Some("Engenheiro de Software Sênior"));
    assert_eq!(dossier.text("email").as_deref(), Some("maria@example.com"));
    // profile overrides posting
    assert_eq!(dossier.text("cliente").as_deref(), Some("Perfil X"));
    // candidacy overrides profile
    assert_eq!(
        dossier.text("situacao_candidado").as_deref(),
        Some("Encaminhado ao Requisitante")
    );
}

#[test]
fn dossier_without_candidacy_still_builds() {
    let store = store();
    let dossier = store.build_dossier("v03", "c002").unwrap();
    assert!(!dossier.has_candidacy());
    assert_eq!(dossier.text("situacao_candidado").as_deref(), Some("Perfil ativo"));
    assert_eq!(dossier.posting_id, "v03");
    assert_eq!(dossier.candidate_id, "c002");
}

#[test]
fn dossier_misses_on_unknown_ids() {
    let store = store();
    assert_eq!(
        store.build_dossier("v99", "c002"),
        Err(LookupMiss::UnknownPosting("v99".into()))
    );
    assert_eq!(
        store.build_dossier("v01", "c999"),
        Err(LookupMiss::UnknownCandidate("c999".into()))
    );
}

// ===========================================================================
// ConversationAgent
// ===========================================================================

#[tokio::test]
async fn agent_advance_appends_both_turns() {
    let provider = Arc::new(MockProvider::constant(MockBehavior::Echo));
    let store = store();
    let posting = store.posting("v01").unwrap();
    let mut agent =
        ConversationAgent::for_new_candidate(posting, "Carlos", provider.clone(), settings());

    assert_eq!(agent.kind(), AgentKind::Screener);
    assert_eq!(agent.transcript().len(), 1);

    let reply = agent.advance("Olá").await.unwrap();
    assert_eq!(reply, "echo: Olá");
    assert_eq!(agent.transcript().len(), 3);
    assert_eq!(agent.transcript()[1].role, Role::User);
    assert_eq!(agent.transcript()[2].role, Role::Assistant);

    let request = &provider.requests().await[0];
    assert_eq!(request.model, "test-model");
    assert_eq!(request.max_tokens, Some(256));
    assert_eq!(request.messages.len(), 2);
}

#[test]
fn screener_seed_describes_posting_and_name() {
    let provider: Arc<dyn ChatProvider> = Arc::new(MockProvider::text("ok"));
    let store = store();
    let agent = ConversationAgent::for_new_candidate(
        store.posting("v02").unwrap(),
        " Carlos Lima ",
        provider,
        settings(),
    );
    let seed = agent.seed();
    assert!(seed.contains("NOVO candidato"));
    assert!(seed.contains("Carlos Lima"));
    assert!(seed.contains("Analista de Dados"));
    assert!(seed.contains("Empresa B"));
    // v02 lists no required skills
    assert!(seed.contains("N/A"));
}

#[test]
fn interviewer_seed_uses_dossier() {
    let provider: Arc<dyn ChatProvider> = Arc::new(MockProvider::text("ok"));
    let store = store();
    let dossier = store.build_dossier("v01", "c002").unwrap();
    let agent = ConversationAgent::for_known_candidate(&dossier, provider, settings());
    assert_eq!(agent.kind(), AgentKind::Interviewer);
    let seed = agent.seed();
    assert!(seed.contains("APROFUNDADA"));
    assert!(seed.contains("Maria Silva"));
    assert!(seed.contains("Encaminhado ao Requisitante"));
    assert!(seed.contains("Sênior"));
}

// ===========================================================================
// Router: opening a session
// ===========================================================================

#[tokio::test]
async fn unmatched_first_message_creates_no_session() {
    let provider = Arc::new(MockProvider::text("unused"));
    let router = router(provider.clone());
    let key = SessionKey::new("s9");

    let reply = router.handle(&key, "vaga de astronauta").await.unwrap();
    assert_eq!(reply, NO_POSTING_REPLY);
    assert!(!router.sessions().contains(&key));
    assert!(router.sessions().is_empty());
    assert_eq!(provider.call_count().await, 0);

    // The next message is treated as a first message again.
    let reply = router.handle(&key, "Engenheiro de Software").await.unwrap();
    assert_eq!(reply, ask_name_reply("Engenheiro de Software Sênior"));
    assert_eq!(phase(&router, &key).await, Some(SessionPhase::AwaitingCandidateName));
}

#[tokio::test]
async fn matched_first_message_asks_for_name() {
    let provider = Arc::new(MockProvider::text("unused"));
    let router = router(provider.clone());
    let key = SessionKey::new("s1");

    let reply = router.handle(&key, "Engenheiro").await.unwrap();
    assert!(reply.contains("Engenheiro de Software Sênior"));
    assert!(reply.contains("nome completo"));
    assert_eq!(provider.call_count().await, 0);

    let slot = router.sessions().get(&key).unwrap();
    let guard = slot.lock().await;
    assert_eq!(guard.as_ref().unwrap().posting().id, "v01");
}

// ===========================================================================
// Router: candidate resolution
// ===========================================================================

#[tokio::test]
async fn new_candidate_gets_screener_with_kickoff() {
    let provider = Arc::new(MockProvider::text("Olá, sou o Alex!"));
    let router = router(provider.clone());
    let key = SessionKey::new("s2");

    router.handle(&key, "Analista de Dados").await.unwrap();
    let reply = router.handle(&key, "Carlos").await.unwrap();
    assert_eq!(reply, "Olá, sou o Alex!");
    assert_eq!(phase(&router, &key).await, Some(SessionPhase::InConversation));
    assert_eq!(transcript_len(&router, &key).await, 3);

    let requests = provider.requests().await;
    assert_eq!(requests.len(), 1);
    let messages = &requests[0].messages;
    assert!(messages[0].content.contains("NOVO candidato"));
    assert!(messages[0].content.contains("Carlos"));
    assert_eq!(messages[1], recruiter_core::Message::user(SCREENING_KICKOFF));
}

#[tokio::test]
async fn end_to_end_known_candidate_interview() {
    let provider = Arc::new(MockProvider::constant(MockBehavior::Echo));
    let router = router(provider.clone());
    let key = SessionKey::new("s1");

    let reply = router.handle(&key, "Engenheiro de Software").await.unwrap();
    assert_eq!(reply, ask_name_reply("Engenheiro de Software Sênior"));

    let reply = router.handle(&key, "Maria").await.unwrap();
    assert_eq!(reply, format!("echo: {}", INTERVIEW_KICKOFF));
    assert_eq!(transcript_len(&router, &key).await, 3);

    let requests = provider.requests().await;
    assert!(requests[0].messages[0].content.contains("APROFUNDADA"));
    assert!(requests[0].messages[0].content.contains("Maria Silva"));

    for (i, turn) in ["Trabalho com Rust há 5 anos", "Inglês avançado"].iter().enumerate() {
        let reply = router.handle(&key, turn).await.unwrap();
        assert_eq!(reply, format!("echo: {}", turn));
        assert_eq!(transcript_len(&router, &key).await, 5 + 2 * i);
    }
    assert_eq!(provider.call_count().await, 3);
    // The agent sees the full transcript every turn.
    assert_eq!(provider.requests().await[2].messages.len(), 6);
}

#[tokio::test]
async fn candidacy_without_profile_is_inconsistent() {
    let provider = Arc::new(MockProvider::text("unused"));
    let router = router(provider.clone());
    let key = SessionKey::new("s3");

    router.handle(&key, "Engenheiro de Software").await.unwrap();
    let err = router.handle(&key, "João").await.unwrap_err();
    match err {
        Error::InconsistentDossier {
            posting_id,
            candidate_id,
            ..
        } => {
            assert_eq!(posting_id, "v01");
            assert_eq!(candidate_id, "c999");
        }
        other => panic!("Expected InconsistentDossier, got {other:?}"),
    }
    assert_eq!(provider.call_count().await, 0);
    assert_eq!(phase(&router, &key).await, Some(SessionPhase::AwaitingCandidateName));
}

// ===========================================================================
// Router: completion failures
// ===========================================================================

#[tokio::test]
async fn completion_timeout_fails_the_turn() {
    let provider = Arc::new(MockProvider::constant(MockBehavior::Hang));
    let mut settings = settings();
    settings.timeout = Duration::from_millis(50);
    let router = router_with(provider, settings);
    let key = SessionKey::new("s4");

    router.handle(&key, "Analista de Dados").await.unwrap();
    let err = router.handle(&key, "Carlos").await.unwrap_err();
    assert!(matches!(err, Error::LlmTimeout { timeout_ms: 50, .. }));

    // The session moved on before the kickoff; the unanswered turn stays.
    assert_eq!(phase(&router, &key).await, Some(SessionPhase::InConversation));
    assert_eq!(transcript_len(&router, &key).await, 2);
}

#[tokio::test]
async fn upstream_error_propagates() {
    let provider = Arc::new(MockProvider::sequence(vec![
        MockBehavior::Text("Olá!".into()),
        MockBehavior::Error("upstream 500".into()),
    ]));
    let router = router(provider);
    let key = SessionKey::new("s5");

    router.handle(&key, "Analista de Dados").await.unwrap();
    router.handle(&key, "Carlos").await.unwrap();
    let err = router.handle(&key, "Sei Python").await.unwrap_err();
    match err {
        Error::LlmError { provider, message } => {
            assert_eq!(provider, "mock");
            assert!(message.contains("upstream 500"));
        }
        other => panic!("Expected LlmError, got {other:?}"),
    }
    // Later turns still reach the agent.
    let reply = router.handle(&key, "Sei Python").await.unwrap();
    assert_eq!(reply, "(mock: sequence exhausted)");
}

// ===========================================================================
// Router: concurrency
// ===========================================================================

#[tokio::test]
async fn concurrent_name_messages_create_one_agent() {
    let provider = Arc::new(MockProvider::constant(MockBehavior::Delayed {
        delay: Duration::from_millis(20),
        text: "ok".into(),
    }));
    let router = Arc::new(router(provider.clone()));
    let key = SessionKey::new("s6");

    router.handle(&key, "Analista de Dados").await.unwrap();

    let (a, b) = {
        let (r1, r2) = (router.clone(), router.clone());
        let (k1, k2) = (key.clone(), key.clone());
        tokio::join!(
            tokio::spawn(async move { r1.handle(&k1, "Carlos").await }),
            tokio::spawn(async move { r2.handle(&k2, "Carlos").await }),
        )
    };
    a.unwrap().unwrap();
    b.unwrap().unwrap();

    // One kickoff exchange plus one forwarded turn.
    assert_eq!(provider.call_count().await, 2);
    assert_eq!(transcript_len(&router, &key).await, 5);
    let requests = provider.requests().await;
    let kickoffs = requests
        .iter()
        .filter(|r| r.messages.len() == 2 && r.messages[1].content == SCREENING_KICKOFF)
        .count();
    assert_eq!(kickoffs, 1);
}

#[tokio::test]
async fn concurrent_unmatched_queries_leave_registry_empty() {
    let provider = Arc::new(MockProvider::text("unused"));
    let router = Arc::new(router(provider));

    let handles: Vec<_> = (0..16)
        .map(|i| {
            let router = router.clone();
            tokio::spawn(async move {
                let key = SessionKey::new(format!("ghost-{}", i % 4));
                router.handle(&key, "vaga de astronauta").await
            })
        })
        .collect();

    for reply in futures::future::join_all(handles).await {
        assert_eq!(reply.unwrap().unwrap(), NO_POSTING_REPLY);
    }
    assert!(router.sessions().is_empty());
}

#[tokio::test]
async fn distinct_sessions_are_independent() {
    let provider = Arc::new(MockProvider::constant(MockBehavior::Echo));
    let router = router(provider);
    let a = SessionKey::new("a");
    let b = SessionKey::new("b");

    router.handle(&a, "Engenheiro de Software").await.unwrap();
    router.handle(&b, "Analista de Dados").await.unwrap();
    router.handle(&a, "Maria").await.unwrap();

    assert_eq!(phase(&router, &a).await, Some(SessionPhase::InConversation));
    assert_eq!(phase(&router, &b).await, Some(SessionPhase::AwaitingCandidateName));
    assert_eq!(router.sessions().len(), 2);
}

#[tokio::test]
async fn capacity_error_surfaces_from_router() {
    let provider = Arc::new(MockProvider::text("unused"));
    let sessions: Arc<dyn SessionStore> =
        Arc::new(SessionRegistry::new(1, Duration::from_secs(3600)));
    let router = Router::new(Arc::new(store()), sessions.clone(), provider, settings());

    let busy = SessionKey::new("busy");
    router.handle(&busy, "Engenheiro").await.unwrap();
    let slot = sessions.get(&busy).unwrap();
    let _guard = slot.lock().await;

    let err = router
        .handle(&SessionKey::new("other"), "Engenheiro")
        .await
        .unwrap_err();
    assert!(err.is_unavailable());
}

#[tokio::test]
async fn unmatched_query_at_capacity_keeps_live_sessions() {
    let provider = Arc::new(MockProvider::text("unused"));
    let sessions: Arc<dyn SessionStore> =
        Arc::new(SessionRegistry::new(1, Duration::from_secs(3600)));
    let router = Router::new(Arc::new(store()), sessions.clone(), provider, settings());

    let live = SessionKey::new("a");
    router.handle(&live, "Engenheiro").await.unwrap();

    let reply = router
        .handle(&SessionKey::new("ghost"), "vaga de astronauta")
        .await
        .unwrap();
    assert_eq!(reply, NO_POSTING_REPLY);
    assert!(sessions.contains(&live));
    assert_eq!(sessions.len(), 1);
    assert_eq!(phase(&router, &live).await, Some(SessionPhase::AwaitingCandidateName));
}

#[tokio::test]
async fn matched_query_at_capacity_still_evicts_idle_session() {
    let provider = Arc::new(MockProvider::text("unused"));
    let sessions: Arc<dyn SessionStore> =
        Arc::new(SessionRegistry::new(1, Duration::from_secs(3600)));
    let router = Router::new(Arc::new(store()), sessions.clone(), provider, settings());

    let old = SessionKey::new("old");
    let new = SessionKey::new("new");
    router.handle(&old, "Engenheiro").await.unwrap();
    router.handle(&new, "Analista de Dados").await.unwrap();

    assert!(!sessions.contains(&old));
    assert_eq!(phase(&router, &new).await, Some(SessionPhase::AwaitingCandidateName));
}

// ===========================================================================
// Router: structured events
// ===========================================================================

/// In-memory sink for the JSON log lines the router emits.
#[derive(Clone, Default)]
struct CapturedLogs(Arc<std::sync::Mutex<Vec<u8>>>);

impl std::io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl CapturedLogs {
    /// Same layout the gateway writes: flattened JSON, one event per line.
    fn install(&self) -> tracing::subscriber::DefaultGuard {
        let writer = self.clone();
        let subscriber = tracing_subscriber::fmt()
            .json()
            .flatten_event(true)
            .with_writer(move || writer.clone())
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    fn lines(&self) -> Vec<Value> {
        let bytes = self.0.lock().unwrap().clone();
        String::from_utf8(bytes)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    fn named(&self, event: &str) -> Vec<Value> {
        self.lines()
            .into_iter()
            .filter(|line| line["event"] == event)
            .collect()
    }
}

#[tokio::test]
async fn successful_turns_emit_request_and_posting_events() {
    let logs = CapturedLogs::default();
    let _subscriber = logs.install();
    let router = router(Arc::new(MockProvider::text("Olá!")));
    let key = SessionKey::new("obs-1");

    router.handle(&key, "Engenheiro de Software").await.unwrap();
    router.handle(&key, "Maria").await.unwrap();

    let received = logs.named("request_received");
    assert_eq!(received.len(), 2);
    assert_eq!(received[0]["session_id"], "obs-1");
    assert_eq!(received[0]["input_length"], 22);
    assert_eq!(received[0]["level"], "INFO");

    let identified = logs.named("posting_identified");
    assert_eq!(identified.len(), 1);
    assert_eq!(identified[0]["posting_id"], "v01");
    assert_eq!(identified[0]["title"], "Engenheiro de Software Sênior");
    assert_eq!(identified[0]["seniority"], "Sênior");
    assert_eq!(identified[0]["client"], "Empresa A");

    let known = logs.named("known_candidate");
    assert_eq!(known.len(), 1);
    assert_eq!(known[0]["candidate_code"], "c002");

    let finished = logs.named("request_finished");
    assert_eq!(finished.len(), 2);
    for line in &finished {
        assert!(line["duration_ms"].as_f64().unwrap() >= 0.0);
        assert_eq!(line["ok"], true);
        assert_eq!(line["cancelled"], false);
    }
    assert!(logs.named("request_failed").is_empty());
}

#[tokio::test]
async fn unmatched_query_emits_warning_with_query() {
    let logs = CapturedLogs::default();
    let _subscriber = logs.install();
    let router = router(Arc::new(MockProvider::text("unused")));

    router
        .handle(&SessionKey::new("obs-2"), "vaga de astronauta")
        .await
        .unwrap();

    let missed = logs.named("posting_not_found");
    assert_eq!(missed.len(), 1);
    assert_eq!(missed[0]["level"], "WARN");
    assert_eq!(missed[0]["query"], "vaga de astronauta");
    assert!(logs.named("posting_identified").is_empty());

    let finished = logs.named("request_finished");
    assert_eq!(finished.len(), 1);
    assert_eq!(finished[0]["ok"], true);
}

#[tokio::test]
async fn inconsistent_dossier_emits_errors_and_failed_finish() {
    let logs = CapturedLogs::default();
    let _subscriber = logs.install();
    let router = router(Arc::new(MockProvider::text("unused")));
    let key = SessionKey::new("obs-3");

    router.handle(&key, "Engenheiro de Software").await.unwrap();
    router.handle(&key, "João").await.unwrap_err();

    let inconsistent = logs.named("dossier_inconsistent");
    assert_eq!(inconsistent.len(), 1);
    assert_eq!(inconsistent[0]["level"], "ERROR");
    assert_eq!(inconsistent[0]["posting_id"], "v01");
    assert_eq!(inconsistent[0]["candidate_id"], "c999");

    let failed = logs.named("request_failed");
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0]["level"], "ERROR");
    assert!(failed[0]["error"].as_str().unwrap().contains("c999"));

    let finished = logs.named("request_finished");
    assert_eq!(finished.len(), 2);
    assert_eq!(finished[1]["ok"], false);
    assert!(finished[1]["duration_ms"].is_number());
}

#[tokio::test]
async fn upstream_error_emits_request_failed() {
    let logs = CapturedLogs::default();
    let _subscriber = logs.install();
    let router = router(Arc::new(MockProvider::constant(MockBehavior::Error(
        "upstream 500".into(),
    ))));
    let key = SessionKey::new("obs-4");

    router.handle(&key, "Analista de Dados").await.unwrap();
    router.handle(&key, "Carlos").await.unwrap_err();

    assert_eq!(logs.named("new_candidate").len(), 1);
    let failed = logs.named("request_failed");
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0]["session_id"], "obs-4");
    assert!(failed[0]["error"].as_str().unwrap().contains("upstream 500"));

    let finished = logs.named("request_finished");
    assert_eq!(finished.len(), 2);
    assert_eq!(finished[1]["ok"], false);
    assert_eq!(finished[1]["cancelled"], false);
}

#[tokio::test]
async fn abandoned_request_still_emits_finished() {
    let logs = CapturedLogs::default();
    let _subscriber = logs.install();
    let mut settings = settings();
    settings.timeout = Duration::from_secs(60);
    let router = router_with(Arc::new(MockProvider::constant(MockBehavior::Hang)), settings);
    let key = SessionKey::new("obs-5");

    router.handle(&key, "Analista de Dados").await.unwrap();
    let outcome =
        tokio::time::timeout(Duration::from_millis(50), router.handle(&key, "Carlos")).await;
    assert!(outcome.is_err());

    assert_eq!(logs.named("request_received").len(), 2);
    let finished = logs.named("request_finished");
    assert_eq!(finished.len(), 2);
    assert_eq!(finished[1]["ok"], false);
    assert_eq!(finished[1]["cancelled"], true);
    assert!(logs.named("request_failed").is_empty());
}
