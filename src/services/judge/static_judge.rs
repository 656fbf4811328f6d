use futures::future::{self, BoxFuture};

use super::{DebateTranscript, Judge, JudgeError, Side, Verdict};

/// Offline judge that favours whoever argued at greater length.
///
/// Deterministic, so it backs local runs without an API key.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticJudge;

fn volume(transcript: &DebateTranscript, side: Side) -> usize {
    transcript
        .lines
        .iter()
        .filter(|line| line.side == side)
        .map(|line| line.content.chars().count())
        .sum()
}

fn plaintiff_share(transcript: &DebateTranscript) -> u8 {
    let plaintiff = volume(transcript, Side::Plaintiff);
    let total = plaintiff + volume(transcript, Side::Defendant);
    if total == 0 {
        return 50;
    }
    ((plaintiff * 100 + total / 2) / total) as u8
}

impl Judge for StaticJudge {
    fn verdict(&self, transcript: DebateTranscript) -> BoxFuture<'static, Result<Verdict, JudgeError>> {
        let share = plaintiff_share(&transcript);
        let (winner, winner_share) = if share >= 50 {
            (Side::Plaintiff, share)
        } else {
            (Side::Defendant, 100 - share)
        };

        let verdict = Verdict {
            winner,
            winner_logic_score: winner_share,
            winner_empathy_score: 50,
            comment: format!(
                "{} made the more developed case.",
                transcript.nickname(winner)
            ),
            winner_reason: "Supported the position with more arguments.".into(),
            loser_reason: format!(
                "{} left more of the opposing points unanswered.",
                transcript.nickname(winner.opponent())
            ),
        };
        Box::pin(future::ready(Ok(verdict)))
    }

    fn score(&self, transcript: DebateTranscript) -> BoxFuture<'static, Result<u8, JudgeError>> {
        Box::pin(future::ready(Ok(plaintiff_share(&transcript))))
    }
}
