//! Correlation of interactive queries with their responses.
//!
//! Every query a session sends is recorded under the id of the sent message,
//! together with its prompt (needed to echo the picked option) and the
//! handler bound to the response, if any. Entries are single-use: taking one
//! removes it, so a second press of the same keyboard finds nothing. Only the
//! most recent queries are kept, as many as the session keeps history
//! entries; older ones are dropped as stale.

use std::collections::VecDeque;

use parking_lot::Mutex;
use tracing::trace;

use parley_core::{Markup, MessageId};

use crate::answer::Choice;
use crate::handler::BoxedHandler;

/// The rendered prompt of a sent query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub text: String,
    pub choices: Vec<Choice>,
    pub markup: Option<Markup>,
}

impl Prompt {
    /// The label of the choice carrying `data`, or `data` itself.
    pub fn label_for<'a>(&'a self, data: &'a str) -> &'a str {
        self.choices
            .iter()
            .find(|choice| choice.data == data)
            .map_or(data, |choice| choice.label.as_str())
    }

    /// The prompt text with the picked label appended in bold.
    ///
    /// Anything but HTML markup uses the `**` emphasis.
    pub fn answered(&self, data: &str) -> String {
        let label = self
            .markup
            .unwrap_or(Markup::Markdown)
            .bold(self.label_for(data));
        format!("{}\n{label}", self.text)
    }
}

/// One pending query.
#[derive(Debug, Clone)]
pub struct QueryEntry {
    pub prompt: Prompt,
    pub handler: Option<BoxedHandler>,
}

/// Maps sent query messages to their pending entries.
#[derive(Debug)]
pub struct CallbackCorrelator {
    entries: Mutex<VecDeque<(MessageId, QueryEntry)>>,
    capacity: usize,
}

impl Default for CallbackCorrelator {
    fn default() -> Self {
        Self::with_capacity(10)
    }
}

impl CallbackCorrelator {
    pub fn new() -> Self {
        Self::default()
    }

    /// A correlator keeping at most `capacity` unanswered queries.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// Records the query sent as `message`, replacing an older entry.
    ///
    /// When the correlator is full the oldest entry is evicted.
    pub fn bind(&self, message: MessageId, prompt: Prompt, handler: Option<BoxedHandler>) {
        let mut entries = self.entries.lock();
        entries.retain(|(id, _)| *id != message);
        entries.push_back((message, QueryEntry { prompt, handler }));
        while entries.len() > self.capacity {
            if let Some((evicted, _)) = entries.pop_front() {
                trace!(message = %evicted, "unanswered query evicted");
            }
        }
    }

    /// Removes and returns the entry of `message`.
    ///
    /// `None` means the callback is stale: already answered, evicted or never
    /// bound.
    pub fn take(&self, message: MessageId) -> Option<QueryEntry> {
        let mut entries = self.entries.lock();
        let index = entries.iter().position(|(id, _)| *id == message)?;
        entries.remove(index).map(|(_, entry)| entry)
    }

    pub fn contains(&self, message: MessageId) -> bool {
        self.entries.lock().iter().any(|(id, _)| *id == message)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
