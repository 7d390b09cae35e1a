//! Usage, error and drift metrics over the service's event log.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::types::{LogEvent, POSTING_IDENTIFIED, POSTING_NOT_FOUND, REQUEST_FINISHED};

pub const DEFAULT_TOP: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Count {
    pub value: String,
    pub count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Report {
    pub events: usize,
    pub malformed_lines: usize,
    pub total_interactions: usize,
    pub total_errors: usize,
    pub mean_duration_ms: f64,
    pub postings_identified: usize,
    pub postings_not_found: usize,
    pub seniority_distribution: Vec<Count>,
    pub top_clients: Vec<Count>,
    pub top_unmatched_queries: Vec<Count>,
    pub first_event_at: Option<DateTime<Utc>>,
    pub last_event_at: Option<DateTime<Utc>>,
    /// Last events, set by `with_recent_events`.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub recent_events: Vec<LogEvent>,
}

impl Report {
    pub fn build(events: &[LogEvent], malformed_lines: usize, top: usize) -> Self {
        let mut report = Report {
            events: events.len(),
            malformed_lines,
            ..Default::default()
        };

        let mut durations = Vec::new();
        let mut seniority: HashMap<&str, usize> = HashMap::new();
        let mut clients: HashMap<&str, usize> = HashMap::new();
        let mut unmatched: HashMap<String, usize> = HashMap::new();

        for event in events {
            if event.is(REQUEST_FINISHED) {
                report.total_interactions += 1;
            }
            if event.is_error() {
                report.total_errors += 1;
            }
            if let Some(ms) = event.duration_ms {
                durations.push(ms);
            }
            if event.is(POSTING_IDENTIFIED) {
                report.postings_identified += 1;
                if let Some(level) = event.seniority.as_deref() {
                    *seniority.entry(level).or_default() += 1;
                }
                if let Some(client) = event.client.as_deref() {
                    *clients.entry(client).or_default() += 1;
                }
            }
            if event.is(POSTING_NOT_FOUND) {
                report.postings_not_found += 1;
                if let Some(query) = event.query.as_deref() {
                    *unmatched.entry(query.trim().to_lowercase()).or_default() += 1;
                }
            }
            if let Some(at) = event.timestamp.as_deref().and_then(parse_timestamp) {
                report.first_event_at = Some(report.first_event_at.map_or(at, |t| t.min(at)));
                report.last_event_at = Some(report.last_event_at.map_or(at, |t| t.max(at)));
            }
        }

        if !durations.is_empty() {
            report.mean_duration_ms = durations.iter().sum::<f64>() / durations.len() as f64;
        }
        report.seniority_distribution = ranked(seniority, usize::MAX);
        report.top_clients = ranked(clients, top);
        report.top_unmatched_queries = ranked(unmatched, top);
        report
    }

    /// Keep the last `n` events for display alongside the metrics.
    pub fn with_recent_events(mut self, events: &[LogEvent], n: usize) -> Self {
        let start = events.len().saturating_sub(n);
        self.recent_events = events[start..].to_vec();
        self
    }

    pub fn is_empty(&self) -> bool {
        self.events == 0
    }
}

/// Highest count first; ties broken alphabetically.
fn ranked<K: Into<String>>(counts: HashMap<K, usize>, limit: usize) -> Vec<Count> {
    let mut rows: Vec<Count> = counts
        .into_iter()
        .map(|(value, count)| Count {
            value: value.into(),
            count,
        })
        .collect();
    rows.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.value.cmp(&b.value)));
    rows.truncate(limit);
    rows
}

fn parse_timestamp(ts: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(ts)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

pub fn format_report(report: &Report, source: &str) -> String {
    let mut out = String::new();

    out.push_str(&format!("═══ Recruiter monitor: {} ═══\n", source));
    if report.is_empty() {
        out.push_str("No log events found. Use the API to generate some.\n");
        if report.malformed_lines > 0 {
            out.push_str(&format!("({} malformed lines skipped)\n", report.malformed_lines));
        }
        return out;
    }
    if let (Some(first), Some(last)) = (report.first_event_at, report.last_event_at) {
        out.push_str(&format!(
            "Window: {} → {}\n",
            first.format("%Y-%m-%d %H:%M:%S UTC"),
            last.format("%Y-%m-%d %H:%M:%S UTC")
        ));
    }
    out.push_str(&format!(
        "Events: {} ({} malformed lines skipped)\n\n",
        report.events, report.malformed_lines
    ));

    out.push_str("─── Usage ───\n");
    out.push_str(&format!("  Interactions:   {}\n", report.total_interactions));
    out.push_str(&format!("  Errors:         {}\n", report.total_errors));
    out.push_str(&format!("  Mean duration:  {:.2} ms\n", report.mean_duration_ms));
    out.push_str(&format!(
        "  Postings:       {} identified, {} not found\n\n",
        report.postings_identified, report.postings_not_found
    ));

    push_table(&mut out, "Seniority distribution", &report.seniority_distribution);
    push_table(&mut out, "Top clients", &report.top_clients);
    push_table(&mut out, "Top unmatched queries", &report.top_unmatched_queries);
    out
}

fn push_table(out: &mut String, title: &str, rows: &[Count]) {
    out.push_str(&format!("─── {} ───\n", title));
    if rows.is_empty() {
        out.push_str("  (no data yet)\n\n");
        return;
    }
    let width = rows.iter().map(|r| r.value.chars().count()).max().unwrap_or(0);
    for row in rows {
        let pad = width - row.value.chars().count();
        out.push_str(&format!("  {}{}  {}\n", row.value, " ".repeat(pad), row.count));
    }
    out.push('\n');
}
