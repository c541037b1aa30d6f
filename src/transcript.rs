//! Per-round event records with a tamper-evident digest.
//!
//! Every executed round appends one [`RoundRecord`] to the run's
//! [`RunTranscript`].  Rendering produces newline-delimited ASCII lines
//! with a trailing `digest:` line holding the hex BLAKE2b-256 digest of
//! the record lines, so a stored transcript can be verified byte for byte
//! after the fact.

use crate::source::Basis;
use blake2::digest::{consts::U32, Digest};
use serde::Serialize;

type Blake2b256 = blake2::Blake2b<U32>;

const TRANSCRIPT_DOMAIN: &[u8] = b"GHZ_ACCORD:TRANSCRIPT";

/// Kind of protocol round a record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RoundKind {
    /// A round that attempts to extract one agreed bit.
    Value,
    /// A round that tests for disturbance without extracting a bit.
    Check,
}

/// One executed round, as recorded in the transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoundRecord {
    /// 0-indexed tick at which the round executed.
    pub tick: usize,
    /// Whether this was a value round or a check round.
    pub kind: RoundKind,
    /// Per-node basis choices; present for check rounds only.
    pub bases: Option<Vec<Basis>>,
    /// The outcome vector returned by the source.
    pub outcome: Vec<u8>,
    /// `true` when a value bit was appended or a check passed.
    pub accepted: bool,
}

impl RoundRecord {
    /// Builds the record of a value round.
    pub fn value(tick: usize, outcome: Vec<u8>, accepted: bool) -> Self {
        Self {
            tick,
            kind: RoundKind::Value,
            bases: None,
            outcome,
            accepted,
        }
    }

    /// Builds the record of a check round.
    pub fn check(tick: usize, bases: Vec<Basis>, outcome: Vec<u8>, accepted: bool) -> Self {
        Self {
            tick,
            kind: RoundKind::Check,
            bases: Some(bases),
            outcome,
            accepted,
        }
    }

    fn render(&self) -> String {
        let outcome: String = self
            .outcome
            .iter()
            .map(|&bit| char::from(b'0' + bit))
            .collect();
        match self.kind {
            RoundKind::Value => format!(
                "round:{} kind:value outcome:{} verdict:{}",
                self.tick,
                outcome,
                if self.accepted { "append" } else { "discard" }
            ),
            RoundKind::Check => {
                let bases: String = self
                    .bases
                    .as_deref()
                    .unwrap_or_default()
                    .iter()
                    .map(|basis| basis.symbol())
                    .collect();
                format!(
                    "round:{} kind:check bases:{} outcome:{} verdict:{}",
                    self.tick,
                    bases,
                    outcome,
                    if self.accepted { "pass" } else { "fail" }
                )
            }
        }
    }

    fn parse(line: &str) -> Result<Self, String> {
        let mut tick = None;
        let mut kind = None;
        let mut bases = None;
        let mut outcome = None;
        let mut verdict = None;
        for token in line.split_whitespace() {
            let (key, value) = token
                .split_once(':')
                .ok_or_else(|| format!("malformed token {token:?}"))?;
            match key {
                "round" => {
                    tick = Some(
                        value
                            .parse::<usize>()
                            .map_err(|_| "invalid round index".to_string())?,
                    )
                }
                "kind" => {
                    kind = Some(match value {
                        "value" => RoundKind::Value,
                        "check" => RoundKind::Check,
                        other => return Err(format!("unknown round kind {other:?}")),
                    })
                }
                "bases" => {
                    bases = Some(
                        value
                            .chars()
                            .map(|symbol| {
                                Basis::from_symbol(symbol)
                                    .ok_or_else(|| format!("unknown basis symbol {symbol:?}"))
                            })
                            .collect::<Result<Vec<_>, _>>()?,
                    )
                }
                "outcome" => {
                    outcome = Some(
                        value
                            .chars()
                            .map(|symbol| match symbol {
                                '0' => Ok(0u8),
                                '1' => Ok(1u8),
                                other => Err(format!("invalid outcome bit {other:?}")),
                            })
                            .collect::<Result<Vec<_>, _>>()?,
                    )
                }
                "verdict" => {
                    verdict = Some(match value {
                        "append" | "pass" => true,
                        "discard" | "fail" => false,
                        other => return Err(format!("unknown verdict {other:?}")),
                    })
                }
                other => return Err(format!("unknown record key {other:?}")),
            }
        }
        let tick = tick.ok_or("missing round index")?;
        let kind = kind.ok_or("missing round kind")?;
        let outcome = outcome.ok_or("missing outcome")?;
        let accepted = verdict.ok_or("missing verdict")?;
        if kind == RoundKind::Check && bases.is_none() {
            return Err("check record missing bases".to_string());
        }
        Ok(Self {
            tick,
            kind,
            bases,
            outcome,
            accepted,
        })
    }
}

/// Append-only log of every round a run executed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunTranscript {
    records: Vec<RoundRecord>,
}

impl RunTranscript {
    /// Creates an empty transcript.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one round record.
    pub fn record(&mut self, record: RoundRecord) {
        self.records.push(record);
    }

    /// Returns the recorded rounds in execution order.
    pub fn records(&self) -> &[RoundRecord] {
        &self.records
    }

    /// Returns the number of recorded rounds.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` when no rounds have been recorded.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Clears all recorded rounds.
    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// Computes the hex digest over the rendered record lines.
    pub fn digest(&self) -> String {
        let mut hasher = Blake2b256::new();
        hasher.update(TRANSCRIPT_DOMAIN);
        for record in &self.records {
            hasher.update(record.render().as_bytes());
            hasher.update(b"\n");
        }
        hex::encode(hasher.finalize())
    }

    /// Renders the transcript as record lines plus a trailing digest line.
    pub fn render_lines(&self) -> Vec<String> {
        let mut lines: Vec<String> = self.records.iter().map(RoundRecord::render).collect();
        lines.push(format!("digest:{}", self.digest()));
        lines
    }

    /// Parses rendered lines back into a transcript, verifying the digest.
    pub fn parse_lines<'a, I>(lines: I) -> Result<Self, String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut records = Vec::new();
        let mut stored_digest = None;
        for line in lines {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if let Some(digest) = line.strip_prefix("digest:") {
                stored_digest = Some(digest.to_string());
                continue;
            }
            if stored_digest.is_some() {
                return Err("record line after digest line".to_string());
            }
            records.push(RoundRecord::parse(line)?);
        }
        let stored = stored_digest.ok_or("missing digest line")?;
        let transcript = Self { records };
        if transcript.digest() != stored {
            return Err("digest mismatch".to_string());
        }
        Ok(transcript)
    }
}

#[cfg(test)]
mod tests {
    use super::{RoundRecord, RunTranscript};
    use crate::source::Basis;

    fn sample_transcript() -> RunTranscript {
        let mut transcript = RunTranscript::new();
        transcript.record(RoundRecord::value(0, vec![1, 1, 1, 1], true));
        transcript.record(RoundRecord::value(1, vec![0, 1, 0, 0], false));
        transcript.record(RoundRecord::check(
            2,
            vec![Basis::Z, Basis::X, Basis::X, Basis::Z],
            vec![0, 1, 1, 0],
            true,
        ));
        transcript
    }

    #[test]
    fn test_render_format_is_stable() {
        let lines = sample_transcript().render_lines();
        assert_eq!(lines[0], "round:0 kind:value outcome:1111 verdict:append");
        assert_eq!(lines[1], "round:1 kind:value outcome:0100 verdict:discard");
        assert_eq!(
            lines[2],
            "round:2 kind:check bases:ZXXZ outcome:0110 verdict:pass"
        );
        assert!(lines[3].starts_with("digest:"));
    }

    #[test]
    fn test_parse_round_trips() {
        let transcript = sample_transcript();
        let lines = transcript.render_lines();
        let parsed =
            RunTranscript::parse_lines(lines.iter().map(String::as_str)).expect("parses back");
        assert_eq!(parsed, transcript);
    }

    #[test]
    fn test_parse_rejects_tampering() {
        let mut lines = sample_transcript().render_lines();
        lines[0] = "round:0 kind:value outcome:0000 verdict:append".to_string();
        let err = RunTranscript::parse_lines(lines.iter().map(String::as_str)).unwrap_err();
        assert_eq!(err, "digest mismatch");
    }

    #[test]
    fn test_parse_requires_digest() {
        let err = RunTranscript::parse_lines(["round:0 kind:value outcome:11 verdict:append"])
            .unwrap_err();
        assert_eq!(err, "missing digest line");
    }

    #[test]
    fn test_digest_is_deterministic() {
        assert_eq!(sample_transcript().digest(), sample_transcript().digest());
        assert_ne!(sample_transcript().digest(), RunTranscript::new().digest());
    }
}
