//! Batch collection of viewer lists from a set of channels.
//!
//! One listener per worker. A batch joins every channel concurrently, reads
//! the shared inbound stream until each channel's name list terminates (or
//! its deadline passes), and parts as it goes. The caller must keep batches
//! inside the platform's join allowance; that is the workbench queue's job,
//! not the listener's.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use super::message::{parse_line, split_frame, IrcEvent};
use super::transport::IrcConnection;
use super::FetcherError;

/// Recheck granularity for the done/deadline poll. Coarser than ~200ms and
/// fast channels pay a visible latency tax.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Per-channel collection state, returned to the caller when the batch ends.
#[derive(Debug, Clone)]
pub struct ChannelFetchData {
    pub names: HashSet<String>,
    pub done: bool,
    pub error: Option<FetcherError>,
    pub duration: Option<Duration>,
    started_at: Instant,
}

impl ChannelFetchData {
    fn new() -> Self {
        Self {
            names: HashSet::new(),
            done: false,
            error: None,
            duration: None,
            started_at: Instant::now(),
        }
    }

    fn finish(&mut self) {
        self.done = true;
        if self.duration.is_none() {
            self.duration = Some(self.started_at.elapsed());
        }
    }
}

type SharedState = Arc<Mutex<HashMap<String, ChannelFetchData>>>;

/// Joins channels, captures their name lists, and parts.
pub struct ChannelListener {
    conn: Arc<dyn IrcConnection>,
    channel_timeout: Duration,
}

impl ChannelListener {
    pub fn new(conn: Arc<dyn IrcConnection>, channel_timeout: Duration) -> Self {
        Self {
            conn,
            channel_timeout,
        }
    }

    /// Fetch the viewer list of every channel in the batch.
    ///
    /// Channel keys are lowercased on entry and every result key comes back
    /// lowercase. Per-channel failures (join refused, deadline passed, part
    /// failed) land in that channel's `error` field and the rest of the
    /// batch carries on; only a batch where every channel failed at the
    /// connection level comes back as [`FetcherError::BatchFailed`].
    pub async fn fetch_for_channels(
        &self,
        channels: &[String],
    ) -> Result<(HashMap<String, ChannelFetchData>, Duration), FetcherError> {
        let batch_start = Instant::now();

        let mut initial: HashMap<String, ChannelFetchData> = HashMap::new();
        for channel in channels {
            initial
                .entry(channel.to_lowercase())
                .or_insert_with(ChannelFetchData::new);
        }
        let names: Vec<String> = initial.keys().cloned().collect();
        let state: SharedState = Arc::new(Mutex::new(initial));

        let reader = tokio::spawn(read_loop(self.conn.clone(), state.clone()));

        futures::future::join_all(
            names
                .iter()
                .map(|channel| self.process_channel(channel, &state)),
        )
        .await;

        reader.abort();

        let results = {
            let mut guard = state.lock().await;
            std::mem::take(&mut *guard)
        };
        let total = batch_start.elapsed();

        let connection_failures = results
            .values()
            .filter(|data| {
                matches!(
                    data.error,
                    Some(
                        FetcherError::Join(_)
                            | FetcherError::Auth(_)
                            | FetcherError::Transport(_)
                    )
                )
            })
            .count();
        if !results.is_empty() && connection_failures == results.len() {
            return Err(FetcherError::BatchFailed);
        }

        Ok((results, total))
    }

    /// Join one channel, then wait for its done flag or its deadline.
    async fn process_channel(&self, channel: &str, state: &SharedState) {
        {
            // The deadline runs from the JOIN, not from batch setup.
            let mut guard = state.lock().await;
            if let Some(data) = guard.get_mut(channel) {
                data.started_at = Instant::now();
            }
        }

        if let Err(e) = self.conn.send_join(channel).await {
            tracing::warn!(channel, error = %e, "Channel join failed");
            let mut guard = state.lock().await;
            if let Some(data) = guard.get_mut(channel) {
                data.error = Some(e);
                data.finish();
            }
            return;
        }
        tracing::debug!(channel, "Joined channel");

        loop {
            {
                let mut guard = state.lock().await;
                let Some(data) = guard.get_mut(channel) else {
                    return;
                };
                if data.done {
                    return;
                }
                if data.started_at.elapsed() >= self.channel_timeout {
                    tracing::warn!(channel, "Channel exceeded fetch deadline, abandoning");
                    data.error = Some(FetcherError::Overtime);
                    data.finish();
                    return;
                }
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}

/// Pump inbound frames into the shared state until the batch is torn down.
async fn read_loop(conn: Arc<dyn IrcConnection>, state: SharedState) {
    loop {
        match conn.next_line().await {
            Ok(Some(frame)) => {
                for line in split_frame(&frame) {
                    if let Some(event) = parse_line(line) {
                        apply_event(&conn, &state, event).await;
                    }
                }
            }
            Ok(None) => {
                fail_unfinished(
                    &state,
                    FetcherError::Transport("connection closed".to_string()),
                )
                .await;
                return;
            }
            Err(e) => {
                fail_unfinished(&state, e).await;
                return;
            }
        }
    }
}

async fn apply_event(conn: &Arc<dyn IrcConnection>, state: &SharedState, event: IrcEvent) {
    match event {
        IrcEvent::Join { channel, user } => {
            let mut guard = state.lock().await;
            if let Some(data) = guard.get_mut(&channel) {
                if !data.done {
                    data.names.insert(user);
                }
            }
        }
        IrcEvent::NamesList { channel, names } => {
            let mut guard = state.lock().await;
            if let Some(data) = guard.get_mut(&channel) {
                if !data.done {
                    tracing::debug!(channel, count = names.len(), "Names page received");
                    data.names.extend(names);
                }
            }
        }
        IrcEvent::EndOfNames { channel } => {
            {
                let mut guard = state.lock().await;
                match guard.get_mut(&channel) {
                    Some(data) => data.finish(),
                    // A 366 for a channel we never targeted; nothing to do.
                    None => return,
                }
            }
            if let Err(e) = conn.send_part(&channel).await {
                tracing::warn!(channel, error = %e, "Channel part failed");
                let mut guard = state.lock().await;
                if let Some(data) = guard.get_mut(&channel) {
                    data.error = Some(e);
                }
            } else {
                tracing::debug!(channel, "Parted channel");
            }
        }
    }
}

/// The stream is gone; everything still waiting gets the error.
async fn fail_unfinished(state: &SharedState, error: FetcherError) {
    let mut guard = state.lock().await;
    for data in guard.values_mut() {
        if !data.done {
            data.error = Some(error.clone());
            data.finish();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;

    /// Scripted connection: serves queued frames then blocks forever, the
    /// way a quiet socket does.
    struct ScriptedConnection {
        lines: Mutex<VecDeque<String>>,
        joined: Mutex<Vec<String>>,
        parted: Mutex<Vec<String>>,
        refuse_joins: Vec<String>,
    }

    impl ScriptedConnection {
        fn new(lines: Vec<&str>) -> Self {
            Self {
                lines: Mutex::new(lines.into_iter().map(str::to_string).collect()),
                joined: Mutex::new(Vec::new()),
                parted: Mutex::new(Vec::new()),
                refuse_joins: Vec::new(),
            }
        }

        fn refusing(mut self, channels: &[&str]) -> Self {
            self.refuse_joins = channels.iter().map(|c| (*c).to_string()).collect();
            self
        }
    }

    #[async_trait]
    impl IrcConnection for ScriptedConnection {
        async fn send_join(&self, channel: &str) -> Result<(), FetcherError> {
            if self.refuse_joins.iter().any(|c| c == channel) {
                return Err(FetcherError::Join("refused by script".to_string()));
            }
            self.joined.lock().await.push(channel.to_string());
            Ok(())
        }

        async fn send_part(&self, channel: &str) -> Result<(), FetcherError> {
            self.parted.lock().await.push(channel.to_string());
            Ok(())
        }

        async fn next_line(&self) -> Result<Option<String>, FetcherError> {
            let next = self.lines.lock().await.pop_front();
            match next {
                Some(line) => Ok(Some(line)),
                None => futures::future::pending().await,
            }
        }
    }

    fn listener_with(conn: Arc<ScriptedConnection>, timeout: Duration) -> ChannelListener {
        ChannelListener::new(conn, timeout)
    }

    #[tokio::test]
    async fn test_single_channel_normal_path() {
        let conn = Arc::new(ScriptedConnection::new(vec![
            ":u.tmi.twitch.tv 353 bot = #coolstreamer :alice bob\r\n:u.tmi.twitch.tv 366 bot #coolstreamer :End of /NAMES list\r\n",
        ]));
        let listener = listener_with(conn.clone(), Duration::from_secs(10));

        let (results, _total) = listener
            .fetch_for_channels(&["coolstreamer".to_string()])
            .await
            .expect("batch succeeds");

        let data = &results["coolstreamer"];
        assert!(data.done);
        assert!(data.error.is_none());
        assert_eq!(
            data.names,
            HashSet::from(["alice".to_string(), "bob".to_string()])
        );
        assert!(data.duration.is_some());
        assert_eq!(*conn.parted.lock().await, vec!["coolstreamer"]);
    }

    #[tokio::test]
    async fn test_multiple_names_pages_union_into_one_set() {
        let page1: Vec<String> = (0..32).map(|i| format!("viewer_a{i}")).collect();
        let page2: Vec<String> = (0..25).map(|i| format!("viewer_b{i}")).collect();
        let page3 = vec!["viewer_last".to_string()];

        let frame = format!(
            ":u.tmi.twitch.tv 353 bot = #bigchannel :{}\r\n:u.tmi.twitch.tv 353 bot = #bigchannel :{}\r\n:u.tmi.twitch.tv 353 bot = #bigchannel :{}\r\n:u.tmi.twitch.tv 366 bot #bigchannel :End of /NAMES list\r\n",
            page1.join(" "),
            page2.join(" "),
            page3.join(" "),
        );
        let conn = Arc::new(ScriptedConnection::new(vec![&frame]));
        let listener = listener_with(conn.clone(), Duration::from_secs(10));

        let (results, _) = listener
            .fetch_for_channels(&["bigchannel".to_string()])
            .await
            .expect("batch succeeds");

        let data = &results["bigchannel"];
        assert!(data.done);
        assert_eq!(data.names.len(), 32 + 25 + 1);
        assert!(data.names.contains("viewer_a0"));
        assert!(data.names.contains("viewer_b24"));
        assert!(data.names.contains("viewer_last"));
        // One PART for the whole page sequence
        assert_eq!(conn.parted.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn test_overtime_abandons_channel_in_place() {
        // Join succeeds, then the wire stays silent.
        let conn = Arc::new(ScriptedConnection::new(vec![]));
        let listener = listener_with(conn.clone(), Duration::from_millis(300));

        let start = Instant::now();
        let (results, _) = listener
            .fetch_for_channels(&["quietchannel".to_string()])
            .await
            .expect("overtime is per-channel, not batch failure");

        let data = &results["quietchannel"];
        assert!(data.done);
        assert_eq!(data.error, Some(FetcherError::Overtime));
        assert!(data.names.is_empty());
        // Abandoned in place: no PART, and no hanging past the deadline.
        assert!(conn.parted.lock().await.is_empty());
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_channel_keys_are_lowercased() {
        let conn = Arc::new(ScriptedConnection::new(vec![
            ":u.tmi.twitch.tv 353 bot = #totallylegit :viewer1\r\n:u.tmi.twitch.tv 366 bot #totallylegit :End of /NAMES list\r\n",
        ]));
        let listener = listener_with(conn.clone(), Duration::from_secs(10));

        let (results, _) = listener
            .fetch_for_channels(&["TotallyLeGit".to_string()])
            .await
            .expect("batch succeeds");

        assert!(results.contains_key("totallylegit"));
        assert!(!results.contains_key("TotallyLeGit"));
        assert_eq!(*conn.joined.lock().await, vec!["totallylegit"]);
    }

    #[tokio::test]
    async fn test_join_failure_is_recorded_and_batch_continues() {
        let conn = Arc::new(
            ScriptedConnection::new(vec![
                ":u.tmi.twitch.tv 353 bot = #goodchannel :carol\r\n:u.tmi.twitch.tv 366 bot #goodchannel :End of /NAMES list\r\n",
            ])
            .refusing(&["badchannel"]),
        );
        let listener = listener_with(conn.clone(), Duration::from_secs(10));

        let (results, _) = listener
            .fetch_for_channels(&["goodchannel".to_string(), "badchannel".to_string()])
            .await
            .expect("one survivor keeps the batch alive");

        assert!(matches!(
            results["badchannel"].error,
            Some(FetcherError::Join(_))
        ));
        assert!(results["badchannel"].done);
        assert!(results["goodchannel"].error.is_none());
        assert!(results["goodchannel"].names.contains("carol"));
    }

    #[tokio::test]
    async fn test_every_channel_refused_fails_the_batch() {
        let conn =
            Arc::new(ScriptedConnection::new(vec![]).refusing(&["one", "two"]));
        let listener = listener_with(conn, Duration::from_secs(10));

        let err = listener
            .fetch_for_channels(&["one".to_string(), "two".to_string()])
            .await
            .expect_err("nothing survived");
        assert_eq!(err, FetcherError::BatchFailed);
    }

    #[tokio::test]
    async fn test_join_echoes_count_as_sightings() {
        let conn = Arc::new(ScriptedConnection::new(vec![
            ":u.tmi.twitch.tv 353 bot = #chan :alice\r\n",
            ":lurker9!lurker9@lurker9.tmi.twitch.tv JOIN #chan",
            ":u.tmi.twitch.tv 366 bot #chan :End of /NAMES list",
        ]));
        let listener = listener_with(conn, Duration::from_secs(10));

        let (results, _) = listener
            .fetch_for_channels(&["chan".to_string()])
            .await
            .expect("batch succeeds");

        assert_eq!(
            results["chan"].names,
            HashSet::from(["alice".to_string(), "lurker9".to_string()])
        );
    }

    #[tokio::test]
    async fn test_degenerate_names_page_recorded_verbatim() {
        // Soft rate-limiting shows up as a 353 holding only the streamer
        // and the bot. The listener records exactly what it saw; whether to
        // trust it is the aggregator's call.
        let conn = Arc::new(ScriptedConnection::new(vec![
            ":u.tmi.twitch.tv 353 bot = #limited :limited bot\r\n:u.tmi.twitch.tv 366 bot #limited :End of /NAMES list\r\n",
        ]));
        let listener = listener_with(conn, Duration::from_secs(10));

        let (results, _) = listener
            .fetch_for_channels(&["limited".to_string()])
            .await
            .expect("batch succeeds");

        assert_eq!(
            results["limited"].names,
            HashSet::from(["limited".to_string(), "bot".to_string()])
        );
        assert!(results["limited"].error.is_none());
    }
}
