use crate::config::OutputMode;
use crate::dispatcher::Outcome;
use crate::markdown;
use crate::session::Request;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Pending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Speaker {
    User,
    Assistant,
    Error,
}

/// One displayed message. `markup` is the HTML rendering of `raw`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub speaker: Speaker,
    pub raw: String,
    pub markup: String,
}

impl Entry {
    fn new(speaker: Speaker, raw: String) -> Self {
        let markup = match speaker {
            Speaker::Assistant => markdown::to_html(&raw),
            // User and error text is shown as typed, never interpreted as markdown.
            Speaker::User | Speaker::Error => markdown::escape(&raw),
        };
        Self {
            speaker,
            raw,
            markup,
        }
    }
}

/// Where answers go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Surface {
    /// Append-only log of every exchange.
    Transcript(Vec<Entry>),
    /// Only the most recent answer or error.
    Single(Option<Entry>),
}

impl Surface {
    pub fn new(mode: OutputMode) -> Self {
        match mode {
            OutputMode::Transcript => Surface::Transcript(Vec::new()),
            OutputMode::Single => Surface::Single(None),
        }
    }

    fn record_question(&mut self, entry: Entry) {
        if let Surface::Transcript(entries) = self {
            entries.push(entry);
        }
    }

    fn present(&mut self, entry: Entry) {
        match self {
            Surface::Transcript(entries) => entries.push(entry),
            Surface::Single(slot) => *slot = Some(entry),
        }
    }

    pub fn entries(&self) -> &[Entry] {
        match self {
            Surface::Transcript(entries) => entries,
            Surface::Single(slot) => slot.as_slice(),
        }
    }

    fn clear(&mut self) {
        match self {
            Surface::Transcript(entries) => entries.clear(),
            Surface::Single(slot) => *slot = None,
        }
    }
}

/// Idle/Pending gate in front of the dispatcher.
#[derive(Debug)]
pub struct ChatState {
    phase: Phase,
    surface: Surface,
}

impl ChatState {
    pub fn new(mode: OutputMode) -> Self {
        Self {
            phase: Phase::Idle,
            surface: Surface::new(mode),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_pending(&self) -> bool {
        self.phase == Phase::Pending
    }

    pub fn can_submit(&self) -> bool {
        self.phase == Phase::Idle
    }

    pub fn entries(&self) -> &[Entry] {
        self.surface.entries()
    }

    /// Idle -> Pending. Returns the request to dispatch, or `None` if the text is blank
    /// or a request is already pending.
    pub fn submit(&mut self, text: &str) -> Option<Request> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        if self.phase == Phase::Pending {
            tracing::debug!("Ignoring submission while a request is pending");
            return None;
        }

        self.surface
            .record_question(Entry::new(Speaker::User, text.to_string()));
        self.phase = Phase::Pending;
        Some(Request {
            user_text: text.to_string(),
        })
    }

    /// Pending -> Idle, rendering the answer or the error. A completion arriving while
    /// Idle is dropped and `false` is returned.
    pub fn complete(&mut self, outcome: Outcome) -> bool {
        if self.phase == Phase::Idle {
            tracing::warn!("Dropping completion that arrived with no request pending");
            return false;
        }

        let entry = match outcome {
            Ok(response) => Entry::new(Speaker::Assistant, response.raw_text),
            Err(err) => {
                tracing::warn!(kind = err.kind(), "Request failed: {}", err);
                Entry::new(Speaker::Error, format!("{}: {}", err.kind(), err))
            }
        };
        self.surface.present(entry);
        self.phase = Phase::Idle;
        true
    }

    /// Clears the output. Refused while a request is pending.
    pub fn reset(&mut self) -> bool {
        if self.is_pending() {
            return false;
        }
        self.surface.clear();
        true
    }
}
