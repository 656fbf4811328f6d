//! Judging collaborator: turns a debate transcript into a verdict or an interim score.

/// OpenAI chat completions backend.
#[cfg(feature = "openai-judge")]
pub mod openai;
mod static_judge;

use std::{error::Error, fmt};

use futures::future::BoxFuture;
use serde::Deserialize;
use thiserror::Error;

pub use static_judge::StaticJudge;

/// Which side of the debate a line or a verdict refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// The room creator.
    Plaintiff,
    /// The other participant.
    Defendant,
}

impl Side {
    /// Lowercase name used in transcripts and replies.
    pub fn label(self) -> &'static str {
        match self {
            Side::Plaintiff => "plaintiff",
            Side::Defendant => "defendant",
        }
    }

    /// The other side.
    pub fn opponent(self) -> Self {
        match self {
            Side::Plaintiff => Side::Defendant,
            Side::Defendant => Side::Plaintiff,
        }
    }

    fn parse(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "plaintiff" => Some(Side::Plaintiff),
            "defendant" => Some(Side::Defendant),
            _ => None,
        }
    }
}

/// One message of the debate, attributed to a side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptLine {
    /// Side of the sender.
    pub side: Side,
    /// Message text.
    pub content: String,
}

/// Full chronological debate handed to the judge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebateTranscript {
    /// Nickname of the room creator.
    pub plaintiff: String,
    /// Nickname of the other participant.
    pub defendant: String,
    /// Messages, oldest first.
    pub lines: Vec<TranscriptLine>,
}

impl DebateTranscript {
    /// Nickname arguing for `side`.
    pub fn nickname(&self, side: Side) -> &str {
        match side {
            Side::Plaintiff => &self.plaintiff,
            Side::Defendant => &self.defendant,
        }
    }
}

impl fmt::Display for DebateTranscript {
    /// One `side: content` line per message.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, line) in self.lines.iter().enumerate() {
            if index > 0 {
                f.write_str("\n")?;
            }
            write!(f, "{}: {}", line.side.label(), line.content)?;
        }
        Ok(())
    }
}

/// Structured verdict returned by the judge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    /// Winning side.
    pub winner: Side,
    /// Winner's logic score, 0 to 100.
    pub winner_logic_score: u8,
    /// Winner's empathy score, 0 to 100.
    pub winner_empathy_score: u8,
    /// Remarks on the whole debate.
    pub comment: String,
    /// Why the winner won.
    pub winner_reason: String,
    /// Why the loser lost.
    pub loser_reason: String,
}

/// Failures of the judging collaborator.
#[derive(Debug, Error)]
pub enum JudgeError {
    /// The backend call failed.
    #[error("judge backend failed: {message}")]
    Backend {
        /// Context of the failure.
        message: String,
        /// Backend error.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// The reply carried no content.
    #[error("judge returned an empty reply")]
    EmptyReply,
    /// The reply is not the expected JSON object.
    #[error("judge reply is not valid JSON")]
    Parse(#[source] serde_json::Error),
    /// The reply named neither side as winner.
    #[error("judge named an unknown winner `{0}`")]
    UnknownWinner(String),
}

/// External adjudicator. Calls may be slow; callers bound them with a timeout.
pub trait Judge: Send + Sync {
    /// Final verdict on the whole debate.
    fn verdict(&self, transcript: DebateTranscript) -> BoxFuture<'static, Result<Verdict, JudgeError>>;
    /// Plaintiff's share of the argument, 0..=100; the defendant holds the rest.
    fn score(&self, transcript: DebateTranscript) -> BoxFuture<'static, Result<u8, JudgeError>>;
}

#[derive(Deserialize)]
struct RawVerdict {
    winner: String,
    winner_logic_score: i64,
    winner_empathy_score: i64,
    #[serde(default)]
    judgment_comment: String,
    #[serde(default)]
    winner_reason: String,
    #[serde(default)]
    loser_reason: String,
}

#[derive(Deserialize)]
struct RawScore {
    score: i64,
}

/// Strip an optional Markdown code fence and any prose around the JSON object.
pub(crate) fn extract_json(reply: &str) -> &str {
    let trimmed = reply.trim();
    match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if start < end => &trimmed[start..=end],
        _ => trimmed,
    }
}

fn clamp_score(value: i64) -> u8 {
    value.clamp(0, 100) as u8
}

/// Parse a verdict reply of the form
/// `{"winner": "plaintiff", "winner_logic_score": 80, ...}`.
pub(crate) fn parse_verdict(reply: &str) -> Result<Verdict, JudgeError> {
    if reply.trim().is_empty() {
        return Err(JudgeError::EmptyReply);
    }

    let raw: RawVerdict = serde_json::from_str(extract_json(reply)).map_err(JudgeError::Parse)?;
    let winner = Side::parse(&raw.winner).ok_or(JudgeError::UnknownWinner(raw.winner))?;

    Ok(Verdict {
        winner,
        winner_logic_score: clamp_score(raw.winner_logic_score),
        winner_empathy_score: clamp_score(raw.winner_empathy_score),
        comment: raw.judgment_comment,
        winner_reason: raw.winner_reason,
        loser_reason: raw.loser_reason,
    })
}

/// Parse an interim score reply of the form `{"score": 57}`.
pub(crate) fn parse_score(reply: &str) -> Result<u8, JudgeError> {
    if reply.trim().is_empty() {
        return Err(JudgeError::EmptyReply);
    }

    let raw: RawScore = serde_json::from_str(extract_json(reply)).map_err(JudgeError::Parse)?;
    Ok(clamp_score(raw.score))
}
