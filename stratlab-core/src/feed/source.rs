//! Bar sources: the boundary with the market-data collaborator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::RawBar;

/// One message from an upstream subscription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FeedMessage {
    Bar(RawBar),
    /// Upstream disconnected at `at`.
    Interrupted { at: DateTime<Utc> },
    /// Upstream reconnected at `at`.
    Resumed { at: DateTime<Utc> },
}

impl FeedMessage {
    /// Position of the message on the data clock (bar close time for bars).
    pub fn time(&self) -> DateTime<Utc> {
        match self {
            Self::Bar(bar) => bar.close_time,
            Self::Interrupted { at } | Self::Resumed { at } => *at,
        }
    }
}

/// Anything that yields raw messages for a single subscription.
///
/// Any `Iterator<Item = FeedMessage> + Send` is a source, so a replayed
/// `Vec`, a file reader or `mpsc::Receiver::into_iter()` all plug in directly.
/// A blocking source blocks the merge; that is the transport's concern.
pub trait BarSource: Send {
    fn next_message(&mut self) -> Option<FeedMessage>;
}

impl<I> BarSource for I
where
    I: Iterator<Item = FeedMessage> + Send,
{
    fn next_message(&mut self) -> Option<FeedMessage> {
        self.next()
    }
}

/// Wrap a vector of raw bars as a replay source.
pub fn replay(bars: Vec<RawBar>) -> impl BarSource {
    bars.into_iter().map(FeedMessage::Bar)
}
