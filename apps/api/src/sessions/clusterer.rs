//! Session reconstruction — rebuilds distinct conversations from the flat,
//! unordered chat log.
//!
//! Rows written after session grouping shipped carry an explicit
//! `chat_session_id`; legacy rows do not. Grouping therefore runs in two
//! tiers: explicit id first, then a time-proximity fallback that clusters
//! id-less rows of the same document when they fall within one window
//! (default one hour) of the anchor. Both operations here are pure functions
//! over an in-memory snapshot — no I/O, no locking, recomputed on every read.

use std::collections::HashSet;

use chrono::{DateTime, NaiveDateTime};
use thiserror::Error;

use crate::models::chat::{ChatLogEntry, Session};

/// Reserved `question` value marking a row that only declares the start of a
/// new session and carries no real user content.
pub const NEW_SESSION_SENTINEL: &str = "__new_chat_session__";

/// Placeholder `answer` written on sentinel rows.
pub const SENTINEL_ANSWER: &str = "New chat session started.";

/// `last_message` shown for a session with no real messages yet.
pub const EMPTY_SESSION_PREVIEW: &str = "New chat";

/// Clustering knobs. The window is a heuristic inferred from observed
/// behavior, not a documented contract, so it stays configurable
/// (`SESSION_WINDOW_SECS`). It can misgroup rapid-fire separate conversations
/// about one document inside a single window.
#[derive(Debug, Clone)]
pub struct ClusterConfig {
    /// Maximum |created_at delta| in seconds for the same-document fallback.
    pub window_secs: i64,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self { window_secs: 3600 }
    }
}

#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("no session anchor matches key '{0}'")]
    NotFound(String),

    #[error("invalid chat log entry: {0}")]
    InvalidInput(String),
}

/// Parses a stored timestamp into epoch seconds. Legacy rows may carry
/// malformed values; those normalize to 0 (oldest) rather than failing, so a
/// reconstruction over old history degrades instead of discarding it.
pub fn parse_created_at(raw: &str) -> i64 {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return dt.timestamp();
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return naive.and_utc().timestamp();
    }
    0
}

fn is_sentinel(entry: &ChatLogEntry) -> bool {
    entry.question == NEW_SESSION_SENTINEL
}

/// Normalized grouping key: empty strings in legacy rows count as absent.
fn session_id(entry: &ChatLogEntry) -> Option<&str> {
    entry.chat_session_id.as_deref().filter(|s| !s.is_empty())
}

fn validate(entries: &[ChatLogEntry]) -> Result<(), ClusterError> {
    for entry in entries {
        if entry.id.is_empty() {
            return Err(ClusterError::InvalidInput("entry with empty id".into()));
        }
        if entry.user_id.is_empty() || entry.doc_id.is_empty() || entry.question.is_empty() {
            return Err(ClusterError::InvalidInput(format!(
                "entry '{}' is missing mandatory fields",
                entry.id
            )));
        }
    }
    Ok(())
}

/// Ascending (created_at, id) — the total order used inside a transcript.
fn chronological(a: &ChatLogEntry, b: &ChatLogEntry) -> std::cmp::Ordering {
    parse_created_at(&a.created_at)
        .cmp(&parse_created_at(&b.created_at))
        .then_with(|| a.id.cmp(&b.id))
}

/// Partitions a user's chat log into conversational sessions, newest first.
///
/// Every input row is consumed exactly once: as some session's anchor or
/// inside exactly one session's `messages`. Sentinel rows are anchors only
/// and never appear in any transcript. Repeated calls on the same input (in
/// any order) produce identical output.
pub fn group_into_sessions(
    entries: &[ChatLogEntry],
    cfg: &ClusterConfig,
) -> Result<Vec<Session>, ClusterError> {
    validate(entries)?;

    // Most-recent-first processing order, id ascending on ties.
    let mut pool: Vec<&ChatLogEntry> = entries.iter().collect();
    pool.sort_by(|a, b| {
        parse_created_at(&b.created_at)
            .cmp(&parse_created_at(&a.created_at))
            .then_with(|| a.id.cmp(&b.id))
    });

    // Session ids that some sentinel row declares. A real message carrying
    // one of these is never its own anchor; its sentinel claims it.
    let anchored_sids: HashSet<&str> = pool
        .iter()
        .filter(|e| is_sentinel(e))
        .filter_map(|e| session_id(e))
        .collect();

    let mut processed: HashSet<&str> = HashSet::new();
    // (anchor ts, anchor id) kept alongside for the final ordering pass.
    let mut emitted: Vec<(i64, String, Session)> = Vec::new();

    for &anchor in &pool {
        if processed.contains(anchor.id.as_str()) {
            continue;
        }
        let anchor_sid = session_id(anchor);
        if !is_sentinel(anchor) {
            if let Some(sid) = anchor_sid {
                if anchored_sids.contains(sid) {
                    continue;
                }
            }
        }
        processed.insert(anchor.id.as_str());
        let anchor_ts = parse_created_at(&anchor.created_at);

        // Explicit id beats the window at any time distance. The window only
        // ever claims id-less rows; a row carrying a session id belongs to
        // that id's group and is never pulled into a time-proximity cluster.
        let mut messages: Vec<&ChatLogEntry> = match anchor_sid {
            Some(sid) => pool
                .iter()
                .copied()
                .filter(|e| !processed.contains(e.id.as_str()))
                .filter(|e| !is_sentinel(e))
                .filter(|e| session_id(e) == Some(sid))
                .collect(),
            None => pool
                .iter()
                .copied()
                .filter(|e| !processed.contains(e.id.as_str()))
                .filter(|e| !is_sentinel(e) && session_id(e).is_none())
                .filter(|e| e.doc_id == anchor.doc_id)
                .filter(|e| (parse_created_at(&e.created_at) - anchor_ts).abs() <= cfg.window_secs)
                .collect(),
        };
        for message in &messages {
            processed.insert(message.id.as_str());
        }
        messages.sort_by(|a, b| chronological(a, b));

        let key = anchor_sid
            .map(str::to_owned)
            .unwrap_or_else(|| anchor.id.clone());
        emitted.push((
            anchor_ts,
            anchor.id.clone(),
            build_session(key, anchor, &messages),
        ));
    }

    emitted.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
    Ok(emitted.into_iter().map(|(_, _, s)| s).collect())
}

/// Resolves one session's full transcript for the open-a-conversation view.
///
/// The key is either a real `chat_session_id` or, for sessions synthesized
/// from an id-less anchor, that anchor's row id. Unlike the summary view, a
/// non-sentinel anchor is part of its own transcript here.
pub fn get_session_messages(
    session_key: &str,
    entries: &[ChatLogEntry],
    cfg: &ClusterConfig,
) -> Result<Session, ClusterError> {
    validate(entries)?;

    let carriers: Vec<&ChatLogEntry> = entries
        .iter()
        .filter(|e| session_id(e) == Some(session_key))
        .collect();

    // The sentinel is the declared anchor when present; otherwise the
    // earliest carrier; otherwise fall back to a row id match.
    let anchor: &ChatLogEntry = if let Some(sentinel) =
        carriers.iter().copied().find(|e| is_sentinel(e))
    {
        sentinel
    } else if let Some(earliest) = carriers.iter().copied().min_by(|a, b| chronological(a, b)) {
        earliest
    } else {
        entries
            .iter()
            .find(|e| e.id == session_key)
            .ok_or_else(|| ClusterError::NotFound(session_key.to_string()))?
    };

    let anchor_ts = parse_created_at(&anchor.created_at);
    let mut messages: Vec<&ChatLogEntry> = match session_id(anchor) {
        Some(sid) => entries
            .iter()
            .filter(|e| !is_sentinel(e))
            .filter(|e| session_id(e) == Some(sid))
            .collect(),
        None => entries
            .iter()
            .filter(|e| !is_sentinel(e) && session_id(e).is_none())
            .filter(|e| e.doc_id == anchor.doc_id)
            .filter(|e| (parse_created_at(&e.created_at) - anchor_ts).abs() <= cfg.window_secs)
            .collect(),
    };
    messages.sort_by(|a, b| chronological(a, b));

    Ok(build_session(session_key.to_string(), anchor, &messages))
}

fn build_session(key: String, anchor: &ChatLogEntry, messages: &[&ChatLogEntry]) -> Session {
    let created_at = if is_sentinel(anchor) {
        anchor.created_at.clone()
    } else {
        messages
            .iter()
            .copied()
            .chain(std::iter::once(anchor))
            .min_by(|a, b| chronological(a, b))
            .map(|e| e.created_at.clone())
            .unwrap_or_else(|| anchor.created_at.clone())
    };
    let last_message = messages
        .last()
        .map(|m| m.question.clone())
        .unwrap_or_else(|| EMPTY_SESSION_PREVIEW.to_string());

    Session {
        session_key: key,
        doc_id: anchor.doc_id.clone(),
        doc_name: anchor.doc_name.clone(),
        doc_type: anchor.doc_type.clone(),
        created_at,
        message_count: messages.len(),
        last_message,
        messages: messages.iter().map(|&e| e.clone()).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::collections::HashSet;

    const BASE: i64 = 1_700_000_000;

    fn ts(offset_secs: i64) -> String {
        Utc.timestamp_opt(BASE + offset_secs, 0).unwrap().to_rfc3339()
    }

    fn entry(id: &str, doc: &str, sid: Option<&str>, question: &str, offset_secs: i64) -> ChatLogEntry {
        ChatLogEntry {
            id: id.to_string(),
            user_id: "u1".to_string(),
            doc_id: doc.to_string(),
            doc_name: format!("{doc}.pdf"),
            doc_type: "pdf".to_string(),
            question: question.to_string(),
            answer: if question == NEW_SESSION_SENTINEL {
                SENTINEL_ANSWER.to_string()
            } else {
                format!("answer to {question}")
            },
            chat_session_id: sid.map(str::to_string),
            created_at: ts(offset_secs),
        }
    }

    fn sentinel(id: &str, doc: &str, sid: Option<&str>, offset_secs: i64) -> ChatLogEntry {
        entry(id, doc, sid, NEW_SESSION_SENTINEL, offset_secs)
    }

    #[test]
    fn test_sentinel_with_explicit_id_claims_its_messages() {
        let entries = vec![
            sentinel("a", "d1", Some("S1"), 0),
            entry("b", "d1", Some("S1"), "What is this?", 10),
        ];
        let sessions = group_into_sessions(&entries, &ClusterConfig::default()).unwrap();
        assert_eq!(sessions.len(), 1);
        let s = &sessions[0];
        assert_eq!(s.session_key, "S1");
        assert_eq!(s.message_count, 1);
        assert_eq!(s.messages[0].id, "b");
        assert_eq!(s.last_message, "What is this?");
        assert_eq!(s.created_at, ts(0));
    }

    #[test]
    fn test_explicit_id_beats_window_at_any_distance() {
        // Ten days apart, same chat_session_id: one session regardless.
        let entries = vec![
            sentinel("a", "d1", Some("S1"), 0),
            entry("b", "d1", Some("S1"), "first", 100),
            entry("c", "d1", Some("S1"), "ten days later", 10 * 24 * 3600),
        ];
        let sessions = group_into_sessions(&entries, &ClusterConfig::default()).unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].message_count, 2);
        assert_eq!(sessions[0].last_message, "ten days later");
    }

    #[test]
    fn test_window_boundary_inclusive() {
        // 3599 s apart: same session. 3601 s apart: split.
        let close = vec![
            entry("a", "d1", None, "one", 0),
            entry("b", "d1", None, "two", 3599),
        ];
        let sessions = group_into_sessions(&close, &ClusterConfig::default()).unwrap();
        assert_eq!(sessions.len(), 1);

        let far = vec![
            entry("a", "d1", None, "one", 0),
            entry("b", "d1", None, "two", 3601),
        ];
        let sessions = group_into_sessions(&far, &ClusterConfig::default()).unwrap();
        assert_eq!(sessions.len(), 2);
    }

    #[test]
    fn test_idless_pair_merges_into_one_session() {
        // 30 minutes apart, no ids: exactly one session holding both rows
        // across anchor + messages.
        let entries = vec![
            entry("a", "d1", None, "earlier", 0),
            entry("b", "d1", None, "later", 1800),
        ];
        let sessions = group_into_sessions(&entries, &ClusterConfig::default()).unwrap();
        assert_eq!(sessions.len(), 1);
        let s = &sessions[0];
        // Most-recent-first processing makes "b" the anchor and "a" the message.
        assert_eq!(s.session_key, "b");
        assert_eq!(s.message_count, 1);
        assert_eq!(s.messages[0].id, "a");
        assert_eq!(s.created_at, ts(0));
    }

    #[test]
    fn test_sentinel_rows_never_appear_in_messages() {
        let entries = vec![
            sentinel("a", "d1", Some("S1"), 0),
            entry("b", "d1", Some("S1"), "q1", 10),
            sentinel("c", "d1", None, 20),
            entry("d", "d1", None, "q2", 30),
        ];
        let sessions = group_into_sessions(&entries, &ClusterConfig::default()).unwrap();
        for s in &sessions {
            assert!(s.messages.iter().all(|m| m.question != NEW_SESSION_SENTINEL));
        }
    }

    #[test]
    fn test_lone_sentinel_is_an_empty_session() {
        let entries = vec![sentinel("a", "d1", Some("S1"), 0)];
        let sessions = group_into_sessions(&entries, &ClusterConfig::default()).unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].message_count, 0);
        assert_eq!(sessions[0].last_message, EMPTY_SESSION_PREVIEW);
        assert_eq!(sessions[0].session_key, "S1");
    }

    #[test]
    fn test_idless_sentinel_claims_same_doc_window() {
        let entries = vec![
            sentinel("a", "d1", None, 1000),
            entry("b", "d1", None, "in window", 400),
            entry("c", "d1", None, "out of window", 9000),
            entry("d", "d2", None, "other doc", 300),
        ];
        let sessions = group_into_sessions(&entries, &ClusterConfig::default()).unwrap();
        let anchored = sessions.iter().find(|s| s.session_key == "a").unwrap();
        assert_eq!(anchored.message_count, 1);
        assert_eq!(anchored.messages[0].id, "b");
        // "c" and "d" each end up elsewhere, never inside the sentinel's session.
        assert_eq!(sessions.len(), 3);
    }

    #[test]
    fn test_orphan_with_id_waits_for_its_sentinel() {
        // The message is newer than its sentinel and is seen first in the
        // most-recent-first pass; it must still join the sentinel's session.
        let entries = vec![
            sentinel("a", "d1", Some("S1"), 0),
            entry("z", "d1", Some("S1"), "late question", 7200),
        ];
        let sessions = group_into_sessions(&entries, &ClusterConfig::default()).unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].session_key, "S1");
        assert_eq!(sessions[0].messages[0].id, "z");
    }

    #[test]
    fn test_orphan_with_unanchored_id_groups_by_id() {
        // No sentinel carries S9; the shared id still binds rows across any
        // time distance.
        let entries = vec![
            entry("a", "d1", Some("S9"), "first", 0),
            entry("b", "d1", Some("S9"), "much later", 30 * 24 * 3600),
        ];
        let sessions = group_into_sessions(&entries, &ClusterConfig::default()).unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].session_key, "S9");
        assert_eq!(sessions[0].message_count, 1);
    }

    #[test]
    fn test_coverage_invariant() {
        let entries = vec![
            sentinel("a", "d1", Some("S1"), 0),
            entry("b", "d1", Some("S1"), "q1", 10),
            entry("c", "d1", None, "q2", 100),
            entry("d", "d2", None, "q3", 200),
            sentinel("e", "d2", None, 5000),
            entry("f", "d2", None, "q4", 5100),
            entry("g", "d3", Some("S2"), "q5", 9000),
        ];
        let sessions = group_into_sessions(&entries, &ClusterConfig::default()).unwrap();

        let mut seen: HashSet<String> = HashSet::new();
        let mut total = 0usize;
        for s in &sessions {
            for m in &s.messages {
                assert!(seen.insert(m.id.clone()), "row {} claimed twice", m.id);
                total += 1;
            }
        }
        // Anchors are the rows not inside any messages list.
        let anchors = entries.len() - total;
        assert_eq!(anchors, sessions.len());
        for s in &sessions {
            assert_eq!(s.message_count, s.messages.len());
        }
    }

    #[test]
    fn test_deterministic_under_reordering() {
        let mut entries = vec![
            sentinel("a", "d1", Some("S1"), 0),
            entry("b", "d1", Some("S1"), "q1", 10),
            entry("c", "d1", None, "q2", 100),
            entry("d", "d2", None, "q3", 50),
            entry("e", "d2", None, "q4", 90),
        ];
        let forward = group_into_sessions(&entries, &ClusterConfig::default()).unwrap();
        entries.reverse();
        let backward = group_into_sessions(&entries, &ClusterConfig::default()).unwrap();

        assert_eq!(forward.len(), backward.len());
        for (x, y) in forward.iter().zip(backward.iter()) {
            assert_eq!(x.session_key, y.session_key);
            let xs: Vec<_> = x.messages.iter().map(|m| &m.id).collect();
            let ys: Vec<_> = y.messages.iter().map(|m| &m.id).collect();
            assert_eq!(xs, ys);
        }
    }

    #[test]
    fn test_identical_timestamps_break_ties_by_id() {
        let entries = vec![
            entry("b", "d1", Some("S1"), "second by id", 0),
            entry("a", "d1", Some("S1"), "first by id", 0),
            sentinel("s", "d1", Some("S1"), 0),
        ];
        let sessions = group_into_sessions(&entries, &ClusterConfig::default()).unwrap();
        assert_eq!(sessions.len(), 1);
        let ids: Vec<_> = sessions[0].messages.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn test_no_session_mixes_documents_without_ids() {
        // Pseudo-random spread over two hours across five documents.
        let mut entries = Vec::new();
        for i in 0..100u64 {
            let doc = format!("d{}", i % 5);
            let offset = ((i * 7919) % 7200) as i64;
            entries.push(entry(&format!("e{i:03}"), &doc, None, "q", offset));
        }
        let sessions = group_into_sessions(&entries, &ClusterConfig::default()).unwrap();
        for s in &sessions {
            assert!(s.messages.iter().all(|m| m.doc_id == s.doc_id));
        }
    }

    #[test]
    fn test_sessions_ordered_newest_first() {
        let entries = vec![
            sentinel("a", "d1", Some("S1"), 0),
            sentinel("b", "d2", Some("S2"), 9000),
            sentinel("c", "d3", Some("S3"), 5000),
        ];
        let sessions = group_into_sessions(&entries, &ClusterConfig::default()).unwrap();
        let keys: Vec<_> = sessions.iter().map(|s| s.session_key.as_str()).collect();
        assert_eq!(keys, vec!["S2", "S3", "S1"]);
    }

    #[test]
    fn test_malformed_timestamp_sorts_oldest_without_error() {
        let mut broken = entry("a", "d1", Some("S1"), "legacy question", 0);
        broken.created_at = "not-a-timestamp".to_string();
        let entries = vec![broken, sentinel("s", "d1", Some("S1"), 100)];
        let sessions = group_into_sessions(&entries, &ClusterConfig::default()).unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].message_count, 1);
        // Epoch 0 sorts before every well-formed row.
        assert_eq!(sessions[0].messages[0].id, "a");
    }

    #[test]
    fn test_legacy_space_separated_timestamp_parses() {
        assert_eq!(parse_created_at("1970-01-01 00:00:10"), 10);
        assert_eq!(parse_created_at("garbage"), 0);
        assert_eq!(parse_created_at(""), 0);
    }

    #[test]
    fn test_empty_mandatory_field_is_rejected() {
        let mut bad = entry("a", "d1", None, "q", 0);
        bad.doc_id = String::new();
        let err = group_into_sessions(&[bad], &ClusterConfig::default()).unwrap_err();
        assert!(matches!(err, ClusterError::InvalidInput(_)));
    }

    #[test]
    fn test_empty_string_session_id_is_treated_as_absent() {
        let entries = vec![
            entry("a", "d1", Some(""), "one", 0),
            entry("b", "d1", Some(""), "two", 600),
        ];
        // Empty-string ids must not form an explicit group of their own; the
        // window fallback applies instead.
        let sessions = group_into_sessions(&entries, &ClusterConfig::default()).unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].session_key, "b");
    }

    #[test]
    fn test_deletion_drops_exactly_one_message() {
        let entries = vec![
            sentinel("a", "d1", Some("S1"), 0),
            entry("b", "d1", Some("S1"), "q1", 10),
            entry("c", "d1", Some("S1"), "q2", 20),
            entry("d", "d2", None, "q3", 50),
        ];
        let before: usize = group_into_sessions(&entries, &ClusterConfig::default())
            .unwrap()
            .iter()
            .map(|s| s.message_count)
            .sum();

        let remaining: Vec<_> = entries.into_iter().filter(|e| e.id != "c").collect();
        let after: usize = group_into_sessions(&remaining, &ClusterConfig::default())
            .unwrap()
            .iter()
            .map(|s| s.message_count)
            .sum();

        assert_eq!(before, after + 1);
    }

    #[test]
    fn test_get_session_messages_by_explicit_id() {
        let entries = vec![
            sentinel("a", "d1", Some("S1"), 0),
            entry("b", "d1", Some("S1"), "q1", 10),
            entry("c", "d1", Some("S1"), "q2", 20),
            entry("x", "d1", Some("S2"), "other", 30),
        ];
        let session = get_session_messages("S1", &entries, &ClusterConfig::default()).unwrap();
        assert_eq!(session.session_key, "S1");
        assert_eq!(session.doc_name, "d1.pdf");
        let ids: Vec<_> = session.messages.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c"]);
        assert_eq!(session.created_at, ts(0));
    }

    #[test]
    fn test_get_session_messages_by_anchor_row_id() {
        // Session synthesized from an id-less anchor is addressed by row id;
        // the non-sentinel anchor belongs to its own transcript here.
        let entries = vec![
            entry("a", "d1", None, "anchor question", 0),
            entry("b", "d1", None, "follow-up", 600),
            entry("c", "d1", None, "too late", 8000),
        ];
        let session = get_session_messages("a", &entries, &ClusterConfig::default()).unwrap();
        assert_eq!(session.session_key, "a");
        let ids: Vec<_> = session.messages.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(session.last_message, "follow-up");
    }

    #[test]
    fn test_get_session_messages_unknown_key_is_not_found() {
        let entries = vec![entry("a", "d1", None, "q", 0)];
        let err = get_session_messages("missing", &entries, &ClusterConfig::default()).unwrap_err();
        assert!(matches!(err, ClusterError::NotFound(_)));
    }

    #[test]
    fn test_get_session_messages_prefers_sentinel_anchor_metadata() {
        let mut s = sentinel("s", "d1", Some("S1"), 0);
        s.doc_name = "report.pdf".to_string();
        let mut m = entry("m", "d1", Some("S1"), "q", 10);
        m.doc_name = "renamed.pdf".to_string();
        let session = get_session_messages("S1", &[m, s], &ClusterConfig::default()).unwrap();
        assert_eq!(session.doc_name, "report.pdf");
    }

    #[test]
    fn test_empty_input_yields_no_sessions() {
        let sessions = group_into_sessions(&[], &ClusterConfig::default()).unwrap();
        assert!(sessions.is_empty());
    }
}
