//! Git output parsing helpers.

use chrono::DateTime;

use super::types::{Hash, Revision};

/// `--format` argument understood by [`parse_log`]: hash, author name,
/// committer unix timestamp and subject, separated by ASCII unit separators.
pub const LOG_FORMAT: &str = "--format=%H%x1f%an%x1f%ct%x1f%s";

const FIELD_SEPARATOR: char = '\u{1f}';

/// Parses `git log` output produced with [`LOG_FORMAT`].
///
/// Lines that do not have all four fields are skipped with a warning.
pub fn parse_log(output: &str) -> Vec<Revision> {
    output
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| {
            let revision = parse_log_line(line);
            if revision.is_none() {
                log::warn!("Skipping unparsable log line: {:?}", line);
            }
            revision
        })
        .collect()
}

fn parse_log_line(line: &str) -> Option<Revision> {
    let mut fields = line.splitn(4, FIELD_SEPARATOR);

    let hash = fields.next()?.trim();
    let author = fields.next()?;
    let timestamp = fields.next()?.trim().parse::<i64>().ok()?;
    let subject = fields.next()?;

    if hash.is_empty() {
        return None;
    }

    Some(Revision {
        hash: Hash::new(hash),
        author: author.to_string(),
        timestamp: DateTime::from_timestamp(timestamp, 0)?,
        subject: subject.to_string(),
    })
}

/// Extracts the first non-empty line, e.g. the hash printed by `rev-list -n1`.
pub fn first_line(output: &str) -> Option<&str> {
    output.lines().map(str::trim).find(|l| !l.is_empty())
}
