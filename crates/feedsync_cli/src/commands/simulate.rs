//! Simulate command implementation.
//!
//! Runs an engine and its poll loop against an in-memory source that keeps
//! publishing posts, then reports what the feed ended up holding.

use async_trait::async_trait;
use feedsync_engine::{
    FeedDescriptor, FeedObserver, FeedUpdate, FetchError, FetchProvider, PaginationStyle,
    PollConfig, PollScheduler, SessionGeneration, SyncConfig, SyncEngine,
};
use feedsync_protocol::{numeric_id, Cursor, FeedItem, FetchedPage, PaginationWindow};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Options for a simulation run.
#[derive(Debug, Clone)]
pub struct SimulateOptions {
    /// Items the source starts with.
    pub items: usize,
    /// Poll interval in milliseconds.
    pub interval_ms: u64,
    /// Number of poll intervals to run.
    pub ticks: u32,
    /// Items published per interval.
    pub burst: usize,
    /// Fail every Nth fetch; 0 disables failures.
    pub fail_every: u64,
    /// Use link-window pagination.
    pub link: bool,
}

/// A synthetic post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Post {
    key: String,
}

impl Post {
    fn new(id: u64) -> Self {
        Self {
            key: id.to_string(),
        }
    }
}

impl FeedItem for Post {
    fn unique_id(&self) -> &str {
        &self.key
    }
}

/// An in-memory source answering cursors over a growing timeline.
pub struct SimulatedSource {
    ids: Mutex<Vec<u64>>,
    link: bool,
    fail_every: u64,
    calls: AtomicU64,
}

impl SimulatedSource {
    /// Creates a source holding ids `1..=items`.
    pub fn new(items: usize, link: bool, fail_every: u64) -> Self {
        Self {
            ids: Mutex::new((1..=items as u64).rev().collect()),
            link,
            fail_every,
            calls: AtomicU64::new(0),
        }
    }

    /// Publishes `count` new posts.
    pub fn publish(&self, count: usize) {
        let mut ids = self.ids.lock();
        for _ in 0..count {
            let next = ids.first().map_or(1, |newest| newest + 1);
            ids.insert(0, next);
        }
    }

    /// Returns the newest published id.
    pub fn newest(&self) -> Option<u64> {
        self.ids.lock().first().copied()
    }

    fn select(&self, cursor: &Cursor, take: usize) -> Vec<u64> {
        let ids = self.ids.lock();
        let bound = cursor.id().map(|id| numeric_id(id).max(0) as u64);
        match (cursor, bound) {
            (Cursor::UpperBound { .. }, Some(bound)) => {
                ids.iter().copied().filter(|id| *id < bound).take(take).collect()
            }
            (Cursor::LowerBoundSince { .. }, Some(bound)) => {
                ids.iter().copied().filter(|id| *id > bound).take(take).collect()
            }
            (Cursor::LowerBoundMin { .. }, Some(bound)) => {
                let newer: Vec<u64> = ids.iter().copied().filter(|id| *id > bound).collect();
                let skip = newer.len().saturating_sub(take);
                newer.into_iter().skip(skip).collect()
            }
            _ => ids.iter().copied().take(take).collect(),
        }
    }
}

#[async_trait]
impl FetchProvider<Post> for SimulatedSource {
    async fn fetch_page(
        &self,
        cursor: &Cursor,
        page_size_hint: u32,
    ) -> Result<FetchedPage<Post>, FetchError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_every > 0 && call % self.fail_every == 0 {
            return Err(FetchError::retryable(format!("simulated failure #{}", call)));
        }

        let take = cursor.requested_limit().unwrap_or(page_size_hint) as usize;
        let selected = self.select(cursor, take);
        let items: Vec<Post> = selected.iter().copied().map(Post::new).collect();
        if !self.link {
            return Ok(FetchedPage::derived(items));
        }

        let has_older = selected
            .last()
            .is_some_and(|oldest| self.ids.lock().iter().any(|id| id < oldest));
        let limit = Some(page_size_hint);
        let window = PaginationWindow::link(
            selected
                .last()
                .filter(|_| has_older)
                .map(|oldest| Cursor::upper_bound(oldest.to_string(), limit)),
            selected
                .first()
                .map(|newest| Cursor::min(newest.to_string(), limit)),
        );
        Ok(FetchedPage::new(items, window))
    }
}

/// Counts observer notifications by kind.
#[derive(Default)]
struct UpdateCounter {
    counts: Mutex<BTreeMap<String, usize>>,
}

impl FeedObserver<Post> for UpdateCounter {
    fn on_feed_updated(&self, update: &FeedUpdate<Post>) {
        let kind = format!("{:?}", update.kind).to_lowercase();
        info!(
            feed = %update.feed,
            kind = %kind,
            total = update.items.len(),
            gap = ?update.gap,
            "feed updated"
        );
        *self.counts.lock().entry(kind).or_insert(0) += 1;
    }
}

/// Simulation result.
#[derive(Debug, Serialize)]
pub struct SimulationReport {
    /// Pagination style used.
    pub pagination: String,
    /// Items held by the feed at the end.
    pub items_held: usize,
    /// Newest id held.
    pub newest_held: Option<String>,
    /// Oldest id held.
    pub oldest_held: Option<String>,
    /// Newest id published by the source.
    pub newest_published: Option<u64>,
    /// Size of the unread block, if a "load more" marker is shown.
    pub gap: Option<usize>,
    /// Whether older content may still be available.
    pub more_available: bool,
    /// Final visible state.
    pub state: String,
    /// Observer notifications by kind.
    pub updates: BTreeMap<String, usize>,
    /// Fetches dispatched.
    pub fetches: u64,
    /// Merges committed.
    pub merges: u64,
    /// Failed fetches.
    pub failures: u64,
    /// Why polling ended.
    pub poll_exit: String,
}

/// Runs the simulate command.
pub fn run(options: &SimulateOptions, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    if options.interval_ms == 0 {
        return Err("--interval-ms must be positive".into());
    }
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let report = runtime.block_on(simulate(options))?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        _ => {
            print_text_output(&report);
        }
    }

    Ok(())
}

async fn simulate(options: &SimulateOptions) -> Result<SimulationReport, Box<dyn std::error::Error>> {
    let style = if options.link {
        PaginationStyle::Link
    } else {
        PaginationStyle::Derived
    };
    let source = Arc::new(SimulatedSource::new(
        options.items,
        options.link,
        options.fail_every,
    ));
    let counter = Arc::new(UpdateCounter::default());
    let engine = Arc::new(
        SyncEngine::new(
            FeedDescriptor::new("simulated").with_pagination(style),
            SyncConfig::default(),
            source.clone(),
            Arc::new(SessionGeneration::new()),
        )?
        .with_observer(counter.clone()),
    );

    if let Err(err) = engine.refresh().await {
        warn!(error = %err, "initial refresh failed");
    }
    for page in 1..=2 {
        if let Err(err) = engine.load_next_page().await {
            warn!(page, error = %err, "loading older page failed");
        }
    }

    let interval = Duration::from_millis(options.interval_ms);
    let scheduler = PollScheduler::new(&engine, PollConfig::new(interval))?;
    scheduler.start();

    let publisher = {
        let source = source.clone();
        let burst = options.burst;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                source.publish(burst);
            }
        })
    };

    tokio::time::sleep(interval * options.ticks).await;
    scheduler.stop();
    publisher.abort();
    let exit = scheduler.wait().await;

    let items = engine.items();
    let stats = engine.stats();
    let updates = counter.counts.lock().clone();
    Ok(SimulationReport {
        pagination: if options.link { "link" } else { "derived" }.to_string(),
        items_held: items.len(),
        newest_held: items.first().map(|item| item.unique_id().to_string()),
        oldest_held: items.last().map(|item| item.unique_id().to_string()),
        newest_published: source.newest(),
        gap: engine.gap(),
        more_available: engine.more_available(),
        state: format!("{:?}", engine.state()),
        updates,
        fetches: stats.fetches,
        merges: stats.merges,
        failures: stats.failures,
        poll_exit: exit.map_or("unknown".to_string(), |exit| format!("{:?}", exit)),
    })
}

fn print_text_output(report: &SimulationReport) {
    println!("Simulation ({} pagination)", report.pagination);
    println!("================================");
    println!();
    println!("Items held:        {}", report.items_held);
    println!(
        "Range held:        {} .. {}",
        report.newest_held.as_deref().unwrap_or("-"),
        report.oldest_held.as_deref().unwrap_or("-")
    );
    println!(
        "Newest published:  {}",
        report
            .newest_published
            .map_or("-".to_string(), |id| id.to_string())
    );
    println!(
        "Unread block:      {}",
        report.gap.map_or("none".to_string(), |gap| gap.to_string())
    );
    println!("More available:    {}", report.more_available);
    println!("State:             {}", report.state);
    println!();
    println!("Fetches:           {}", report.fetches);
    println!("Merges:            {}", report.merges);
    println!("Failures:          {}", report.failures);
    println!("Poll exit:         {}", report.poll_exit);
    if !report.updates.is_empty() {
        println!();
        println!("Updates:");
        for (kind, count) in &report.updates {
            println!("  {:<8} {}", kind, count);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn source_pages_downward() {
        let source = SimulatedSource::new(50, false, 0);
        let page = source
            .fetch_page(&Cursor::upper_bound("20", Some(5)), 5)
            .await
            .unwrap();
        let ids: Vec<&str> = page.items.iter().map(|p| p.unique_id()).collect();
        assert_eq!(ids, vec!["19", "18", "17", "16", "15"]);
    }

    #[tokio::test]
    async fn source_link_window_ends_at_bottom() {
        let source = SimulatedSource::new(3, true, 0);
        let page = source.fetch_page(&Cursor::Default, 10).await.unwrap();
        assert_eq!(page.len(), 3);
        assert!(page.window.is_exhausted());
        assert!(page.window.previous_cursor().is_some());
    }

    #[tokio::test]
    async fn source_fails_on_schedule() {
        let source = SimulatedSource::new(3, false, 2);
        assert!(source.fetch_page(&Cursor::Default, 10).await.is_ok());
        assert!(source.fetch_page(&Cursor::Default, 10).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn simulation_picks_up_published_posts() {
        let options = SimulateOptions {
            items: 100,
            interval_ms: 1_000,
            ticks: 4,
            burst: 2,
            fail_every: 0,
            link: false,
        };
        let report = simulate(&options).await.unwrap();

        assert_eq!(report.failures, 0);
        assert_eq!(report.poll_exit, "Cancelled");
        assert!(report.updates.get("insert").copied().unwrap_or(0) >= 1);
        let newest: u64 = report.newest_held.as_deref().unwrap().parse().unwrap();
        assert!(newest > 100);
        assert!(report.newest_published.unwrap() >= newest);
    }

    #[tokio::test(start_paused = true)]
    async fn simulation_survives_failed_initial_load() {
        let options = SimulateOptions {
            items: 20,
            interval_ms: 1_000,
            ticks: 4,
            burst: 1,
            fail_every: 1,
            link: false,
        };
        let report = simulate(&options).await.unwrap();

        assert_eq!(report.items_held, 0);
        assert!(report.failures >= 2);
        assert_eq!(report.merges, 0);
        assert!(report.state.starts_with("Error"));
    }

    #[tokio::test]
    async fn simulation_rejects_zero_interval() {
        let options = SimulateOptions {
            items: 5,
            interval_ms: 0,
            ticks: 1,
            burst: 1,
            fail_every: 0,
            link: false,
        };
        assert!(simulate(&options).await.is_err());
    }
}
