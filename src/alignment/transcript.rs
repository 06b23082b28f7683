//! Phoneme transcript files: one `start end label` triple per line, times in seconds.

use std::path::Path;

use crate::error::{DataError, Result};
use crate::types::PhonemeInterval;

/// Parse transcript text. Lines without exactly three tokens are skipped.
pub fn parse(text: &str) -> Result<Vec<PhonemeInterval>> {
    let mut intervals = Vec::new();
    for (line_no, line) in text.lines().enumerate() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        let [start, end, label] = parts[..] else {
            continue;
        };
        let parse_time = |token: &str| {
            token.parse::<f64>().map_err(|e| {
                DataError::invalid_input(format!(
                    "transcript line {}: bad time '{token}': {e}",
                    line_no + 1
                ))
            })
        };
        intervals.push(PhonemeInterval {
            start: parse_time(start)?,
            end: parse_time(end)?,
            label: label.to_string(),
        });
    }
    Ok(intervals)
}

pub fn load(path: &Path) -> Result<Vec<PhonemeInterval>> {
    let text =
        std::fs::read_to_string(path).map_err(|e| DataError::io("read phoneme transcript", path, e))?;
    parse(&text)
}

/// End of the last interval minus start of the first.
pub fn duration(intervals: &[PhonemeInterval]) -> Result<f64> {
    match (intervals.first(), intervals.last()) {
        (Some(first), Some(last)) => Ok(last.end - first.start),
        _ => Err(DataError::invalid_input("empty phoneme transcript")),
    }
}
