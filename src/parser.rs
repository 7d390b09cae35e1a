use std::fs;
use std::path::Path;

use crate::types::LogEvent;

pub struct ParseResult {
    pub events: Vec<LogEvent>,
    pub errors: Vec<ParseError>,
}

pub struct ParseError {
    pub line: usize,
    pub message: String,
}

pub fn parse_log(path: &Path) -> Result<ParseResult, std::io::Error> {
    let bytes = fs::read(path)?;
    Ok(parse_lines(&String::from_utf8_lossy(&bytes)))
}

pub fn parse_lines(content: &str) -> ParseResult {
    let mut events = Vec::new();
    let mut errors = Vec::new();

    for (i, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<LogEvent>(line) {
            Ok(event) => events.push(event),
            Err(e) => errors.push(ParseError {
                line: i + 1,
                message: e.to_string(),
            }),
        }
    }

    ParseResult { events, errors }
}
