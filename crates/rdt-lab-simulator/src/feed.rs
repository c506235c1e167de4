use anyhow::Context;
use rdt_lab_abstract::{AppFeed, AppSink};
use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::task::JoinError;
use tracing::info;

/// Stream requested from the application feed.
pub const STREAM_ID: u32 = 0;

/// Pull the next message on tokio's blocking pool. The feed travels into the
/// pool and back, so the async task never blocks on feed I/O.
pub async fn pull_blocking(
    mut feed: Box<dyn AppFeed>,
) -> Result<(Box<dyn AppFeed>, anyhow::Result<Option<String>>), JoinError> {
    tokio::task::spawn_blocking(move || {
        let next = feed.pull_outbound(STREAM_ID);
        (feed, next)
    })
    .await
}

/// Fixed list of messages, handed out in order.
#[derive(Debug, Clone, Default)]
pub struct ScriptedFeed {
    queue: VecDeque<String>,
}

impl ScriptedFeed {
    pub fn new<I, S>(messages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            queue: messages.into_iter().map(Into::into).collect(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.queue.len()
    }
}

impl AppFeed for ScriptedFeed {
    fn pull_outbound(&mut self, _stream: u32) -> anyhow::Result<Option<String>> {
        Ok(self.queue.pop_front())
    }
}

/// One message per line from any buffered reader (a file, stdin).
pub struct LineFeed<R> {
    lines: Lines<R>,
    source: String,
}

impl<R: BufRead> LineFeed<R> {
    pub fn new(reader: R, source: impl Into<String>) -> Self {
        Self {
            lines: reader.lines(),
            source: source.into(),
        }
    }
}

impl LineFeed<BufReader<File>> {
    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("Failed to open message file {}", path.display()))?;
        Ok(Self::new(BufReader::new(file), path.display().to_string()))
    }
}

impl<R: BufRead + Send> AppFeed for LineFeed<R> {
    fn pull_outbound(&mut self, _stream: u32) -> anyhow::Result<Option<String>> {
        self.lines
            .next()
            .transpose()
            .with_context(|| format!("Failed to read next message from {}", self.source))
    }
}

/// `count` generated messages: `"{prefix} 1"`, `"{prefix} 2"`, ...
#[derive(Debug, Clone)]
pub struct SyntheticFeed {
    prefix: String,
    next: u32,
    count: u32,
}

impl SyntheticFeed {
    pub fn new(prefix: impl Into<String>, count: u32) -> Self {
        Self {
            prefix: prefix.into(),
            next: 1,
            count,
        }
    }
}

impl AppFeed for SyntheticFeed {
    fn pull_outbound(&mut self, _stream: u32) -> anyhow::Result<Option<String>> {
        if self.next > self.count {
            return Ok(None);
        }
        let message = format!("{} {}", self.prefix, self.next);
        self.next += 1;
        Ok(Some(message))
    }
}

/// Sink that keeps every delivered payload. Clones share storage, so the
/// caller can keep a handle while the receiver owns another.
#[derive(Debug, Clone, Default)]
pub struct CollectingSink {
    delivered: Arc<Mutex<Vec<String>>>,
}

impl CollectingSink {
    pub fn delivered(&self) -> Vec<String> {
        match self.delivered.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl AppSink for CollectingSink {
    fn push_inbound(&mut self, payload: &str) {
        let mut guard = match self.delivered.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.push(payload.to_string());
    }
}

/// Sink that only logs deliveries.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl AppSink for LogSink {
    fn push_inbound(&mut self, payload: &str) {
        info!("Application received: {payload}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn scripted_feed_drains_in_order() {
        let mut feed = ScriptedFeed::new(["a", "b"]);
        assert_eq!(feed.remaining(), 2);
        assert_eq!(feed.pull_outbound(0).unwrap().as_deref(), Some("a"));
        assert_eq!(feed.pull_outbound(0).unwrap().as_deref(), Some("b"));
        assert_eq!(feed.pull_outbound(0).unwrap(), None);
        assert_eq!(feed.pull_outbound(0).unwrap(), None);
    }

    #[test]
    fn line_feed_yields_each_line() {
        let mut feed = LineFeed::new(Cursor::new("first line\n\nthird\n"), "memory");
        let mut seen = Vec::new();
        while let Some(line) = feed.pull_outbound(0).unwrap() {
            seen.push(line);
        }
        assert_eq!(seen, vec!["first line", "", "third"]);
    }

    #[test]
    fn missing_file_is_reported() {
        let err = match LineFeed::open("/definitely/not/here.txt") {
            Ok(_) => panic!("opening a missing file must fail"),
            Err(err) => err,
        };
        assert!(format!("{err:#}").contains("/definitely/not/here.txt"));
    }

    #[test]
    fn synthetic_feed_counts_from_one() {
        let mut feed = SyntheticFeed::new("msg", 2);
        assert_eq!(feed.pull_outbound(0).unwrap().as_deref(), Some("msg 1"));
        assert_eq!(feed.pull_outbound(0).unwrap().as_deref(), Some("msg 2"));
        assert_eq!(feed.pull_outbound(0).unwrap(), None);
    }

    #[tokio::test]
    async fn blocking_pull_hands_the_feed_back() {
        let feed: Box<dyn AppFeed> = Box::new(ScriptedFeed::new(["only"]));
        let (feed, first) = pull_blocking(feed).await.unwrap();
        assert_eq!(first.unwrap().as_deref(), Some("only"));
        let (_, second) = pull_blocking(feed).await.unwrap();
        assert_eq!(second.unwrap(), None);
    }

    #[test]
    fn collecting_sink_clones_share_storage() {
        let handle = CollectingSink::default();
        let mut owned = handle.clone();
        owned.push_inbound("x");
        owned.push_inbound("x");
        assert_eq!(handle.delivered(), vec!["x", "x"]);
    }
}
