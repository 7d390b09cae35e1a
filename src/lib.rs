//! Offline monitor for the recruiter service's JSON event log.

pub mod parser;
pub mod report;
pub mod types;
