// Business logic for the subreddit scraper. The service owns the registry,
// the duplicate gate, and the recent-history caches; the Discord layer and
// the background loop only ever call methods on it.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::core::dedup::{
    Decision, DuplicateGate, EdgeDetector, FingerprintStore, GateError, ProfileRing,
};
use crate::core::scrape::{
    CycleReport, RedditFeed, ScrapeError, ScrapeRegistry, SubredditEntry, TrackOutcome,
    WebhookEntry, WebhookQuery, WebhookSink,
};

/// Outcome of pointing a subreddit at a webhook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOutcome {
    Updated,
    SubredditMissing,
    WebhookMissing,
}

/// One subreddit that is actually pollable: it has a webhook assigned.
#[derive(Debug, Clone)]
struct ScrapeTarget {
    subreddit: String,
    webhook_url: String,
}

/// Bounded set of recently handled image urls. Purely a fast path in front
/// of the fingerprint gate; losing it costs one extra download, never a
/// double post.
struct RecentUrls {
    seen: HashSet<String>,
    order: VecDeque<String>,
    capacity: usize,
}

impl RecentUrls {
    fn new(capacity: usize) -> Self {
        Self {
            seen: HashSet::new(),
            order: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    fn contains(&self, url: &str) -> bool {
        self.seen.contains(url)
    }

    fn insert(&mut self, url: &str) {
        if self.seen.insert(url.to_string()) {
            self.order.push_back(url.to_string());
            while self.order.len() > self.capacity {
                if let Some(evicted) = self.order.pop_front() {
                    self.seen.remove(&evicted);
                }
            }
        }
    }

    fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
        while self.order.len() > self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.seen.remove(&evicted);
            }
        }
    }
}

pub struct ScrapeService<F, R, W, S>
where
    F: RedditFeed,
    R: ScrapeRegistry,
    W: WebhookSink,
    S: FingerprintStore,
{
    feed: F,
    registry: R,
    sink: W,
    gate: DuplicateGate<S>,
    detector: EdgeDetector,
    profiles: Mutex<ProfileRing>,
    recent_urls: Mutex<RecentUrls>,
    targets: RwLock<Vec<ScrapeTarget>>,
    last_check: Mutex<DateTime<Utc>>,
    submission_limit: usize,
    /// Set by registry-mutating commands; the next cycle reloads its targets.
    dirty: AtomicBool,
    running: AtomicBool,
}

impl<F, R, W, S> ScrapeService<F, R, W, S>
where
    F: RedditFeed,
    R: ScrapeRegistry,
    W: WebhookSink,
    S: FingerprintStore,
{
    pub async fn new(
        feed: F,
        registry: R,
        sink: W,
        gate: DuplicateGate<S>,
        detector: EdgeDetector,
        submission_limit: usize,
    ) -> Result<Self, ScrapeError> {
        let last_check = registry
            .load_watermark()
            .await?
            .unwrap_or_else(Utc::now);

        Ok(Self {
            feed,
            registry,
            sink,
            gate,
            detector,
            profiles: Mutex::new(ProfileRing::new(submission_limit * 3)),
            recent_urls: Mutex::new(RecentUrls::new(submission_limit * 3)),
            targets: RwLock::new(Vec::new()),
            last_check: Mutex::new(last_check),
            submission_limit,
            dirty: AtomicBool::new(true),
            running: AtomicBool::new(true),
        })
    }

    // ------------------------------------------------------------------
    // Registry operations (backing the /reddit command family)
    // ------------------------------------------------------------------

    pub async fn track_subreddit(&self, name: &str) -> Result<TrackOutcome, ScrapeError> {
        if !self.feed.subreddit_exists(name).await? {
            return Ok(TrackOutcome::NotFound);
        }

        let outcome = match self.registry.add_subreddit(name).await? {
            Some(_) => TrackOutcome::Added,
            None => TrackOutcome::AlreadyTracked,
        };
        if outcome == TrackOutcome::Added {
            self.dirty.store(true, Ordering::SeqCst);
        }
        Ok(outcome)
    }

    pub async fn untrack_subreddit(&self, name: &str) -> Result<u64, ScrapeError> {
        let removed = self.registry.remove_subreddit(name).await?;
        if removed > 0 {
            self.dirty.store(true, Ordering::SeqCst);
        }
        Ok(removed)
    }

    /// Every tracked subreddit paired with its webhook, for list/info output.
    pub async fn subreddit_overview(
        &self,
    ) -> Result<Vec<(SubredditEntry, Option<WebhookEntry>)>, ScrapeError> {
        let mut overview = Vec::new();
        for entry in self.registry.list_subreddits().await? {
            let webhook = match entry.webhook_id {
                Some(id) => self.registry.get_webhook(&WebhookQuery::Id(id)).await?,
                None => None,
            };
            overview.push((entry, webhook));
        }
        Ok(overview)
    }

    pub async fn subreddit_info(
        &self,
        name: &str,
    ) -> Result<Option<(SubredditEntry, Option<WebhookEntry>)>, ScrapeError> {
        let Some(entry) = self.registry.get_subreddit(name).await? else {
            return Ok(None);
        };
        let webhook = match entry.webhook_id {
            Some(id) => self.registry.get_webhook(&WebhookQuery::Id(id)).await?,
            None => None,
        };
        Ok(Some((entry, webhook)))
    }

    /// Assign a webhook (looked up by name, id, or url) to a subreddit, or
    /// clear the assignment when `webhook` is None.
    pub async fn assign_webhook(
        &self,
        subreddit: &str,
        webhook: Option<&str>,
    ) -> Result<AssignOutcome, ScrapeError> {
        let webhook_id = match webhook {
            None => None,
            Some(raw) => {
                let query = WebhookQuery::parse(raw);
                match self.registry.get_webhook(&query).await? {
                    Some(entry) => Some(entry.id),
                    None => return Ok(AssignOutcome::WebhookMissing),
                }
            }
        };

        if self.registry.assign_webhook(subreddit, webhook_id).await? {
            self.dirty.store(true, Ordering::SeqCst);
            Ok(AssignOutcome::Updated)
        } else {
            Ok(AssignOutcome::SubredditMissing)
        }
    }

    /// Register a webhook after proving it accepts deliveries.
    pub async fn register_webhook(
        &self,
        name: &str,
        url: &str,
    ) -> Result<Option<WebhookEntry>, ScrapeError> {
        self.sink
            .deliver(url, &format!("Webhook test for `{name}`."))
            .await?;

        let added = self.registry.add_webhook(name, url).await?;
        if added.is_some() {
            self.dirty.store(true, Ordering::SeqCst);
        }
        Ok(added)
    }

    pub async fn drop_webhook(&self, raw: &str) -> Result<u64, ScrapeError> {
        let removed = self
            .registry
            .remove_webhook(&WebhookQuery::parse(raw))
            .await?;
        if removed > 0 {
            self.dirty.store(true, Ordering::SeqCst);
        }
        Ok(removed)
    }

    pub async fn webhooks(&self) -> Result<Vec<WebhookEntry>, ScrapeError> {
        self.registry.list_webhooks().await
    }

    // ------------------------------------------------------------------
    // Loop control and diagnostics
    // ------------------------------------------------------------------

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::SeqCst);
    }

    pub async fn seen_count(&self) -> Result<u64, GateError> {
        self.gate.seen_count().await
    }

    /// Fetch a url and return its content digest as hex, for the hashcheck
    /// command.
    pub async fn digest_url(&self, url: &str) -> Result<String, ScrapeError> {
        let bytes = self.feed.fetch_image(url).await?;
        let fingerprint = DuplicateGate::<S>::fingerprint_image(&bytes)
            .map_err(|e| ScrapeError::Image(e.to_string()))?;
        Ok(fingerprint.to_hex())
    }

    // ------------------------------------------------------------------
    // The poll cycle
    // ------------------------------------------------------------------

    /// Run one full cycle over every pollable subreddit.
    ///
    /// Individual failures (a dead listing, a bad image, a refused webhook)
    /// degrade to skipping that one candidate; only registry persistence
    /// failures abort the cycle.
    pub async fn poll_once(&self) -> Result<CycleReport, ScrapeError> {
        if self.dirty.swap(false, Ordering::SeqCst) {
            self.reload_targets().await?;
        }

        let since = *self.last_check.lock().await;
        let targets = self.targets.read().await.clone();
        let mut report = CycleReport::default();

        for target in &targets {
            let submissions = match self
                .feed
                .new_submissions(&target.subreddit, self.submission_limit)
                .await
            {
                Ok(submissions) => submissions,
                Err(err) => {
                    warn!(subreddit = %target.subreddit, error = %err, "Listing fetch failed, skipping subreddit");
                    report.failures += 1;
                    continue;
                }
            };
            report.subreddits_checked += 1;

            for submission in submissions {
                if submission.created_at < since {
                    continue;
                }

                for url in &submission.image_urls {
                    if url.to_lowercase().contains("gifs") {
                        debug!(url = %url, "Skipping animated collection url");
                        continue;
                    }
                    if self.recent_urls.lock().await.contains(url) {
                        continue;
                    }

                    let bytes = match self.feed.fetch_image(url).await {
                        Ok(bytes) => bytes,
                        Err(err) => {
                            debug!(url = %url, error = %err, "Image download failed");
                            report.failures += 1;
                            continue;
                        }
                    };

                    match self.gate.check_and_record(&bytes).await {
                        Ok(Decision::Duplicate) => {
                            self.recent_urls.lock().await.insert(url);
                            report.duplicates += 1;
                            continue;
                        }
                        Ok(Decision::Novel) => {
                            self.recent_urls.lock().await.insert(url);
                        }
                        Err(GateError::Decode(err)) => {
                            // Not an image after all; no point retrying the url.
                            debug!(url = %url, error = %err, "Candidate is not a decodable image");
                            self.recent_urls.lock().await.insert(url);
                            report.failures += 1;
                            continue;
                        }
                        Err(GateError::Store(err)) => {
                            // Left uncached so a later cycle can retry it.
                            warn!(url = %url, error = %err, "Fingerprint store unavailable");
                            report.failures += 1;
                            continue;
                        }
                    }

                    match self.detector.profile(&bytes) {
                        Ok(profile) => {
                            let mut ring = self.profiles.lock().await;
                            if ring.matches(&self.detector, &profile) {
                                debug!(url = %url, "Edge profile matches a recent post");
                                report.duplicates += 1;
                                continue;
                            }
                            ring.push(profile);
                        }
                        Err(err) => {
                            // The gate already accepted the content; similarity
                            // is advisory, so carry on.
                            debug!(url = %url, error = %err, "Edge profile extraction failed");
                        }
                    }

                    let content = format!(
                        "**r/{}** -> __[{}]({})__\n{}",
                        target.subreddit, submission.title, submission.permalink, url
                    );
                    match self.sink.deliver(&target.webhook_url, &content).await {
                        Ok(()) => report.posted += 1,
                        Err(err) => {
                            warn!(subreddit = %target.subreddit, error = %err, "Webhook delivery failed");
                            report.failures += 1;
                        }
                    }
                }
            }
        }

        let now = Utc::now();
        *self.last_check.lock().await = now;
        self.registry.save_watermark(now).await?;

        if report.posted > 0 {
            info!(
                posted = report.posted,
                duplicates = report.duplicates,
                failures = report.failures,
                "Scrape cycle finished"
            );
        }
        Ok(report)
    }

    async fn reload_targets(&self) -> Result<(), ScrapeError> {
        let mut targets = Vec::new();
        for (entry, webhook) in self.subreddit_overview().await? {
            match webhook {
                Some(webhook) => targets.push(ScrapeTarget {
                    subreddit: entry.name,
                    webhook_url: webhook.url,
                }),
                None => {
                    warn!(subreddit = %entry.name, "No webhook assigned, skipping subreddit");
                }
            }
        }

        let history_cap = (targets.len().max(1)) * self.submission_limit * 3;
        self.profiles.lock().await.set_capacity(history_cap);
        self.recent_urls.lock().await.set_capacity(history_cap);

        *self.targets.write().await = targets;
        Ok(())
    }
}
