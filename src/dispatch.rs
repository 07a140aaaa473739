//! Dispatch Scheduler: bounded-concurrency, rate-limit-aware delivery of a
//! resolved campaign, with partial-failure bookkeeping.
//!
//! The scheduler is the last line of defense: provider faults never escape
//! it, they become structured [`SendResult`]s.

use std::future::Future;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::available_parallelism;
use std::time::Duration;

use serde::Deserialize;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::domain::Campaign;
use crate::domain::Recipient;
use crate::domain::SendResult;
use crate::email_client::EmailClient;
use crate::email_client::OutboundEmail;
use crate::email_client::ProviderError;
use crate::personalize::render;

/// Tuning knobs for a dispatch run, loaded from the `dispatch` section of
/// the configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DispatchConfig {
    /// Upper bound on simultaneous in-flight sends; the effective worker
    /// count is `min(available_parallelism, max_concurrency)`.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Advisory pacing between requests from the same worker. Applied
    /// per-worker, so under concurrency the aggregate rate exceeds the
    /// nominal `1/min_delay` figure; treat as a tunable, not a guarantee.
    #[serde(default = "default_min_delay_ms")]
    pub min_delay_ms: u64,

    /// Provider-imposed maximum recipients per batch call.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Pause between successive batch calls (not after the last).
    #[serde(default = "default_batch_delay_ms")]
    pub batch_delay_ms: u64,

    /// Suppress real delivery; provider messages are tagged as test.
    #[serde(default)]
    pub test_mode: bool,

    /// Use the provider's batch endpoint instead of one call per recipient.
    #[serde(default)]
    pub batch_mode: bool,
}

fn default_max_concurrency() -> usize { 5 }
fn default_min_delay_ms() -> u64 { 100 }
fn default_batch_size() -> usize { 100 }
fn default_batch_delay_ms() -> u64 { 600 }

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            min_delay_ms: default_min_delay_ms(),
            batch_size: default_batch_size(),
            batch_delay_ms: default_batch_delay_ms(),
            test_mode: false,
            batch_mode: false,
        }
    }
}

impl DispatchConfig {
    fn min_delay(&self) -> Duration { Duration::from_millis(self.min_delay_ms) }

    fn batch_delay(&self) -> Duration { Duration::from_millis(self.batch_delay_ms) }

    /// Degrades to 1 (fully sequential), the ultra-conservative mode for
    /// provider probation periods.
    fn worker_count(&self) -> usize {
        let cores = available_parallelism().map(|n| n.get()).unwrap_or(1);
        cores.min(self.max_concurrency).max(1)
    }
}

/// Fixed-backoff retry for throttled sends: at most `max_attempts` attempts,
/// sleeping `backoff` between them. Only rate-limit errors re-enter the
/// loop; any second failure is terminal. Independent of the transport, so it
/// is unit-tested with plain closures.
struct RetryPolicy {
    max_attempts: u32,
    backoff: Duration,
}

impl RetryPolicy {
    fn rate_limit() -> Self {
        Self {
            max_attempts: 2,
            backoff: Duration::from_secs(1),
        }
    }

    async fn run<T, F, Fut>(
        &self,
        mut attempt: F,
    ) -> Result<T, ProviderError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let mut attempts = 0;
        loop {
            attempts += 1;
            match attempt().await {
                Err(e) if e.is_rate_limited() && attempts < self.max_attempts => {
                    tracing::warn!(
                        backoff_secs = self.backoff.as_secs(),
                        "rate limited; backing off before the retry"
                    );
                    tokio::time::sleep(self.backoff).await;
                }
                outcome => return outcome,
            }
        }
    }
}

/// Turns a resolved campaign into provider calls and per-recipient outcomes.
/// Takes the provider client as an explicit value, so tests substitute a
/// fake and campaigns can carry scoped credentials.
pub struct Dispatcher {
    client: EmailClient,
    config: DispatchConfig,
}

impl Dispatcher {
    pub fn new(
        client: EmailClient,
        config: DispatchConfig,
    ) -> Self {
        Self { client, config }
    }

    /// Deliver the campaign and return one [`SendResult`] per valid
    /// recipient attempted. Individual failures never abort the run; on
    /// cancellation, no new sends are scheduled and the results accumulated
    /// so far are returned.
    pub async fn dispatch(
        &self,
        campaign: &Campaign,
        cancel: CancellationToken,
    ) -> Vec<SendResult> {
        match self.config.batch_mode {
            true => self.dispatch_batched(campaign, cancel).await,
            false => self.dispatch_individual(campaign, cancel).await,
        }
    }

    /// One provider call per recipient, fanned out over a bounded worker
    /// pool that pulls from a shared cursor.
    #[tracing::instrument(
        skip_all,
        fields(
            campaign_id = %campaign.campaign_id,
            recipients = tracing::field::Empty,
            workers = tracing::field::Empty,
        )
    )]
    pub async fn dispatch_individual(
        &self,
        campaign: &Campaign,
        cancel: CancellationToken,
    ) -> Vec<SendResult> {
        let payloads: Vec<(String, OutboundEmail)> = campaign
            .valid_recipients()
            .map(|r| (r.email.clone(), self.personalized(campaign, r)))
            .collect();

        let total = payloads.len();
        let workers = self.config.worker_count().min(total.max(1));
        tracing::Span::current()
            .record("recipients", total)
            .record("workers", workers);

        let payloads = Arc::new(payloads);
        let cursor = Arc::new(AtomicUsize::new(0));
        let results = Arc::new(Mutex::new(Vec::with_capacity(total)));

        // pacing only matters once requests can actually overlap
        let pacing = (workers > 1).then(|| self.config.min_delay());

        let mut pool = JoinSet::new();
        for _ in 0..workers {
            let payloads = Arc::clone(&payloads);
            let cursor = Arc::clone(&cursor);
            let results = Arc::clone(&results);
            let cancel = cancel.clone();
            let client = self.client.clone();

            pool.spawn(async move {
                let retry = RetryPolicy::rate_limit();
                loop {
                    if cancel.is_cancelled() {
                        break;
                    }
                    let next = cursor.fetch_add(1, Ordering::SeqCst);
                    let Some((email, payload)) = payloads.get(next) else {
                        break;
                    };

                    if let Some(delay) = pacing {
                        tokio::time::sleep(delay).await;
                    }

                    let result = match retry.run(|| client.send_email(payload)).await {
                        Ok(message_id) => SendResult::delivered(email.clone(), message_id),
                        Err(e) => {
                            tracing::error!(
                                error.cause_chain = ?e,
                                error.message = %e,
                                "failed to deliver to {email}"
                            );
                            SendResult::failed(email.clone(), e)
                        }
                    };
                    results.lock().await.push(result);
                }
            });
        }
        while pool.join_next().await.is_some() {}

        if cancel.is_cancelled() {
            tracing::info!("dispatch cancelled; returning partial results");
        }

        match Arc::try_unwrap(results) {
            Ok(collected) => collected.into_inner(),
            // a worker still holds a handle only if it was aborted mid-push
            Err(shared) => shared.lock().await.clone(),
        }
    }

    /// Grouped provider calls of up to `batch_size` recipients; a chunk-level
    /// fault fails every recipient in that chunk, with no retry.
    #[tracing::instrument(
        skip_all,
        fields(campaign_id = %campaign.campaign_id, recipients = tracing::field::Empty)
    )]
    pub async fn dispatch_batched(
        &self,
        campaign: &Campaign,
        cancel: CancellationToken,
    ) -> Vec<SendResult> {
        let valid: Vec<&Recipient> = campaign.valid_recipients().collect();
        tracing::Span::current().record("recipients", valid.len());

        let mut results = Vec::with_capacity(valid.len());
        let chunks: Vec<&[&Recipient]> = valid.chunks(self.config.batch_size.max(1)).collect();
        let last = chunks.len().saturating_sub(1);

        for (i, chunk) in chunks.into_iter().enumerate() {
            if cancel.is_cancelled() {
                tracing::info!("dispatch cancelled; returning partial results");
                break;
            }

            let payloads: Vec<OutboundEmail> = chunk
                .iter()
                .map(|r| self.personalized(campaign, r))
                .collect();

            match self.client.send_batch(&payloads).await {
                Ok(accepted) => {
                    tracing::info!(batch = i + 1, accepted, "provider accepted batch");
                    results.extend(
                        chunk
                            .iter()
                            .map(|r| SendResult::delivered(r.email.clone(), None)),
                    );
                }
                Err(e) => {
                    tracing::error!(
                        error.cause_chain = ?e,
                        error.message = %e,
                        "batch {} failed; marking the whole chunk", i + 1
                    );
                    results.extend(chunk.iter().map(|r| SendResult::failed(r.email.clone(), &e)));
                }
            }

            if i < last {
                tokio::time::sleep(self.config.batch_delay()).await;
            }
        }
        results
    }

    /// Personalized wire payload for one recipient; shared by both modes.
    fn personalized(
        &self,
        campaign: &Campaign,
        recipient: &Recipient,
    ) -> OutboundEmail {
        OutboundEmail {
            from: campaign.from.from_field(),
            to: recipient.email.clone(),
            subject: render(
                &campaign.subject,
                recipient,
                &campaign.from,
                &campaign.campaign_id,
                &campaign.template_name,
            ),
            html_body: render(
                &campaign.body_template,
                recipient,
                &campaign.from,
                &campaign.campaign_id,
                &campaign.template_name,
            ),
            scheduled_at: campaign.schedule_time.clone(),
            tag: Some(campaign.campaign_id.clone()),
            track_opens: true,
            test_mode: self.config.test_mode,
        }
    }
}
