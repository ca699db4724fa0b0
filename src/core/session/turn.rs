//! Turn model: one user utterance paired with the assistant's response.

/// A completed or in-flight conversational turn.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Turn {
    /// What the user said, from the input transcription.
    pub question: String,
    /// The assistant's reply, assembled from transcript deltas.
    pub answer: String,
    /// False when the turn was cut short (barge-in or stream end) before the
    /// assistant transcript completed.
    pub is_complete: bool,
}

/// Mutable accumulator for the turn currently in flight.
///
/// Transcript deltas are buffered here and only promoted into a [`Turn`] when
/// the transcript-done event arrives (or the turn is cut short); the service
/// does not delimit structured payloads at delta granularity, so only the done
/// event guarantees a complete, parseable unit.
#[derive(Debug, Default)]
pub struct TurnAccumulator {
    question: Option<String>,
    answer: String,
    open: bool,
}

impl TurnAccumulator {
    /// Begin a new turn, returning the previous one finalized as incomplete
    /// if it never saw its transcript-done event.
    pub fn open(&mut self) -> Option<Turn> {
        let interrupted = self.take_if_open(false);
        self.open = true;
        interrupted
    }

    /// Record the user's transcribed question.
    pub fn set_question(&mut self, transcript: String) {
        self.open = true;
        self.question = Some(transcript);
    }

    /// Append an assistant transcript delta.
    pub fn push_delta(&mut self, delta: &str) {
        self.answer.push_str(delta);
    }

    /// Finalize the in-flight turn as complete.
    pub fn finalize(&mut self) -> Option<Turn> {
        self.take_if_open(true)
    }

    /// Discard any accumulated state without producing a turn.
    pub fn reset(&mut self) {
        self.question = None;
        self.answer.clear();
        self.open = false;
    }

    fn take_if_open(&mut self, complete: bool) -> Option<Turn> {
        if !self.open && self.question.is_none() && self.answer.is_empty() {
            return None;
        }
        let turn = Turn {
            question: self.question.take().unwrap_or_default(),
            answer: std::mem::take(&mut self.answer),
            is_complete: complete,
        };
        self.open = false;
        Some(turn)
    }
}
