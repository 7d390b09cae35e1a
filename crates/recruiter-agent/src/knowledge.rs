//! Knowledge store: read-only views over postings, candidacies and
//! candidate profiles, plus the lookups the router needs.
//!
//! Tables are JSON arrays produced by the data pipeline, keyed by the
//! pipeline's own column names (`id_vaga`, `titulo_vaga`, `codigo`, ...).
//! Every lookup is a linear scan in source order.

use recruiter_core::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Mutex;
use tracing::info;

pub const POSTINGS_FILE: &str = "vagas.json";
pub const CANDIDACIES_FILE: &str = "prospects.json";
pub const PROFILES_FILE: &str = "applicants.json";

/// Words dropped from a posting query before keyword matching.
pub const STOP_WORDS: &[&str] = &["vaga", "de", "para", "a", "o"];

const SEARCH_MEMO_CAPACITY: usize = 128;

/// Pipeline column names, as they appear in a merged dossier.
pub mod columns {
    pub const POSTING_ID: &str = "id_vaga";
    pub const TITLE: &str = "titulo_vaga";
    pub const CLIENT: &str = "cliente";
    pub const REQUIRED_SKILLS: &str = "competencia_tecnicas_e_comportamentais";
    pub const SENIORITY: &str = "nivel profissional";
    pub const CANDIDATE_CODE: &str = "codigo";
    pub const CANDIDATE_NAME: &str = "nome";
    pub const STATUS: &str = "situacao_candidado";
    pub const TECH_SKILLS: &str = "conhecimentos_tecnicos";
    pub const PROFILE_ID: &str = "id_candidato";
}

/// A job opening.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Posting {
    #[serde(rename = "id_vaga", deserialize_with = "de_id")]
    pub id: String,
    #[serde(rename = "titulo_vaga", default, deserialize_with = "de_text")]
    pub title: String,
    #[serde(
        rename = "cliente",
        default,
        deserialize_with = "de_opt_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub client: Option<String>,
    #[serde(
        rename = "competencia_tecnicas_e_comportamentais",
        default,
        deserialize_with = "de_opt_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub required_skills: Option<String>,
    #[serde(
        rename = "nivel profissional",
        default,
        deserialize_with = "de_opt_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub seniority: Option<String>,
    /// Columns the service does not interpret; kept for the dossier.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A known association between a candidate and a posting.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Candidacy {
    #[serde(rename = "id_vaga", deserialize_with = "de_id")]
    pub posting_id: String,
    #[serde(rename = "codigo", deserialize_with = "de_id")]
    pub candidate_code: String,
    #[serde(rename = "nome", default, deserialize_with = "de_text")]
    pub name: String,
    #[serde(
        rename = "situacao_candidado",
        default,
        deserialize_with = "de_opt_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub status: Option<String>,
    #[serde(
        rename = "conhecimentos_tecnicos",
        default,
        deserialize_with = "de_opt_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub skills: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A candidate's profile, independent of any posting.
#[derive(Clone, Debug, PartialEq)]
pub struct CandidateProfile {
    pub id: String,
    /// All profile fields, nested sections flattened into one map.
    pub fields: Map<String, Value>,
}

impl CandidateProfile {
    /// Build a profile from a raw record. Object-valued top-level fields are
    /// treated as sections and their entries lifted into the flat field map;
    /// top-level scalar fields win over section fields of the same name.
    pub fn from_record(record: Value) -> std::result::Result<Self, String> {
        let Value::Object(record) = record else {
            return Err("profile record is not an object".into());
        };

        let mut fields = Map::new();
        let mut scalars = Vec::new();
        for (key, value) in record {
            match value {
                Value::Object(section) => fields.extend(section),
                other => scalars.push((key, other)),
            }
        }
        fields.extend(scalars);

        let id = fields
            .get(columns::PROFILE_ID)
            .and_then(value_to_id)
            .ok_or_else(|| format!("missing field `{}`", columns::PROFILE_ID))?;

        Ok(Self { id, fields })
    }
}

/// Read-only merge of posting, profile and (when present) candidacy for one
/// interview. On key collision profile overrides posting and candidacy
/// overrides profile.
#[derive(Clone, Debug, PartialEq)]
pub struct Dossier {
    pub posting_id: String,
    pub candidate_id: String,
    fields: Map<String, Value>,
}

impl Dossier {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Field rendered as text; numbers are stringified, null is absent.
    pub fn text(&self, key: &str) -> Option<String> {
        self.fields.get(key).and_then(value_to_text)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn has_candidacy(&self) -> bool {
        self.fields.contains_key(columns::CANDIDATE_CODE)
    }
}

/// Why a lookup produced nothing. All variants are the same outward
/// "no match"; they exist for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LookupMiss {
    #[error("posting {0} does not exist")]
    UnknownPosting(String),
    #[error("candidate {0} has no profile")]
    UnknownCandidate(String),
    #[error("posting {0} has no candidacies")]
    NoCandidacies(String),
    #[error("no candidate name on posting {posting_id} contains {fragment:?}")]
    NoNameMatch {
        posting_id: String,
        fragment: String,
    },
}

#[derive(Default)]
struct SearchMemo {
    hits: HashMap<String, Vec<usize>>,
    order: VecDeque<String>,
}

impl SearchMemo {
    fn get(&self, query: &str) -> Option<Vec<usize>> {
        self.hits.get(query).cloned()
    }

    fn insert(&mut self, query: &str, hits: Vec<usize>) {
        if self.hits.contains_key(query) {
            return;
        }
        if self.order.len() >= SEARCH_MEMO_CAPACITY {
            if let Some(oldest) = self.order.pop_front() {
                self.hits.remove(&oldest);
            }
        }
        self.order.push_back(query.to_string());
        self.hits.insert(query.to_string(), hits);
    }
}

pub struct KnowledgeStore {
    postings: Vec<Posting>,
    candidacies: Vec<Candidacy>,
    profiles: Vec<CandidateProfile>,
    // Scoped to this instance: a reload builds a new store and a fresh memo.
    search_memo: Mutex<SearchMemo>,
}

impl KnowledgeStore {
    pub fn new(
        postings: Vec<Posting>,
        candidacies: Vec<Candidacy>,
        profiles: Vec<CandidateProfile>,
    ) -> Self {
        Self {
            postings,
            candidacies,
            profiles,
            search_memo: Mutex::new(SearchMemo::default()),
        }
    }

    /// Load the three pipeline tables from `dir`. Any missing or malformed
    /// table fails the whole load.
    pub fn load(dir: &Path) -> Result<Self> {
        let postings = load_table(&dir.join(POSTINGS_FILE), "postings", |row| {
            serde_json::from_value::<Posting>(row).map_err(|e| e.to_string())
        })?;
        let candidacies = load_table(&dir.join(CANDIDACIES_FILE), "candidacies", |row| {
            serde_json::from_value::<Candidacy>(row).map_err(|e| e.to_string())
        })?;
        let profiles = load_table(
            &dir.join(PROFILES_FILE),
            "profiles",
            CandidateProfile::from_record,
        )?;

        info!(
            postings = postings.len(),
            candidacies = candidacies.len(),
            profiles = profiles.len(),
            "knowledge store loaded from {}",
            dir.display()
        );
        Ok(Self::new(postings, candidacies, profiles))
    }

    pub fn postings(&self) -> &[Posting] {
        &self.postings
    }

    pub fn candidacies(&self) -> &[Candidacy] {
        &self.candidacies
    }

    pub fn profiles(&self) -> &[CandidateProfile] {
        &self.profiles
    }

    pub fn posting(&self, posting_id: &str) -> Option<&Posting> {
        self.postings.iter().find(|p| p.id == posting_id)
    }

    pub fn profile(&self, candidate_id: &str) -> Option<&CandidateProfile> {
        self.profiles.iter().find(|p| p.id == candidate_id)
    }

    /// Postings whose title contains every query keyword, case-insensitively.
    /// A query with no keywords left after stop-word removal matches nothing.
    pub fn search_postings(&self, query: &str) -> Vec<Posting> {
        let memo = self.search_memo.lock().unwrap_or_else(|e| e.into_inner());
        let cached = memo.get(query);
        drop(memo);

        let hits = match cached {
            Some(hits) => hits,
            None => {
                let hits = self.scan_postings(query);
                self.search_memo
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .insert(query, hits.clone());
                hits
            }
        };

        hits.into_iter().map(|i| self.postings[i].clone()).collect()
    }

    fn scan_postings(&self, query: &str) -> Vec<usize> {
        let keywords = search_keywords(query);
        if keywords.is_empty() {
            return Vec::new();
        }
        self.postings
            .iter()
            .enumerate()
            .filter(|(_, posting)| {
                let title = posting.title.to_lowercase();
                keywords.iter().all(|k| title.contains(k.as_str()))
            })
            .map(|(i, _)| i)
            .collect()
    }

    /// First candidacy on `posting_id` whose display name contains
    /// `name_fragment`, case-insensitively.
    pub fn find_candidacy(
        &self,
        name_fragment: &str,
        posting_id: &str,
    ) -> std::result::Result<&Candidacy, LookupMiss> {
        let mut on_posting = self
            .candidacies
            .iter()
            .filter(|c| c.posting_id == posting_id)
            .peekable();
        if on_posting.peek().is_none() {
            return Err(LookupMiss::NoCandidacies(posting_id.to_string()));
        }

        let needle = name_fragment.trim().to_lowercase();
        let no_match = || LookupMiss::NoNameMatch {
            posting_id: posting_id.to_string(),
            fragment: name_fragment.to_string(),
        };
        if needle.is_empty() {
            return Err(no_match());
        }

        on_posting
            .find(|c| c.name.to_lowercase().contains(&needle))
            .ok_or_else(no_match)
    }

    /// Merge posting, profile and candidacy for one interview. Only a missing
    /// posting or profile is a miss; a missing candidacy just contributes no
    /// fields.
    pub fn build_dossier(
        &self,
        posting_id: &str,
        candidate_id: &str,
    ) -> std::result::Result<Dossier, LookupMiss> {
        let posting = self
            .posting(posting_id)
            .ok_or_else(|| LookupMiss::UnknownPosting(posting_id.to_string()))?;
        let profile = self
            .profile(candidate_id)
            .ok_or_else(|| LookupMiss::UnknownCandidate(candidate_id.to_string()))?;
        let candidacy = self
            .candidacies
            .iter()
            .find(|c| c.posting_id == posting_id && c.candidate_code == candidate_id);

        let mut fields = to_fields(posting);
        fields.extend(profile.fields.clone());
        if let Some(candidacy) = candidacy {
            fields.extend(to_fields(candidacy));
        }

        Ok(Dossier {
            posting_id: posting_id.to_string(),
            candidate_id: candidate_id.to_string(),
            fields,
        })
    }
}

/// Lowercased query words minus stop words.
pub fn search_keywords(query: &str) -> Vec<String> {
    query
        .to_lowercase()
        .split_whitespace()
        .filter(|w| !STOP_WORDS.contains(w))
        .map(String::from)
        .collect()
}

fn to_fields<T: Serialize>(record: &T) -> Map<String, Value> {
    match serde_json::to_value(record) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    }
}

fn load_table<T>(
    path: &Path,
    table: &str,
    parse_row: impl Fn(Value) -> std::result::Result<T, String>,
) -> Result<Vec<T>> {
    let display = path.display().to_string();
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::data_load(table, &display, e.to_string()))?;
    let rows: Vec<Value> = serde_json::from_str(&content)
        .map_err(|e| Error::data_load(table, &display, e.to_string()))?;

    rows.into_iter()
        .enumerate()
        .map(|(i, row)| {
            parse_row(row).map_err(|e| Error::data_load(table, &display, format!("row {}: {}", i, e)))
        })
        .collect()
}

fn value_to_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn value_to_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn de_id<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<String, D::Error> {
    let value = Value::deserialize(d)?;
    value_to_id(&value).ok_or_else(|| serde::de::Error::custom("expected a string or numeric id"))
}

fn de_opt_text<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Option<String>, D::Error> {
    let value = Value::deserialize(d)?;
    Ok(value_to_text(&value))
}

fn de_text<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<String, D::Error> {
    Ok(de_opt_text(d)?.unwrap_or_default())
}
