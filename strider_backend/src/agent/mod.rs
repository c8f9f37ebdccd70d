use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Timelike, Utc};
use chrono_tz::Tz;
use futures_util::FutureExt;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::time::sleep;
use tracing::Instrument;
use uuid::Uuid;

use crate::clock::{Clock, ScheduleWindow, TimeOfDay};
use crate::config::AgentConfig;
use crate::discovery::DiscoveryScanner;
use crate::error::ConfigError;
use crate::forum::{Destination, ForumPlatform, Receipt};
use crate::generator::ContentGenerator;
use crate::history::{HistoryEntry, HistoryLedger};
use crate::llm_client::TextGenerator;
use crate::persona::{PersonaIdentity, PersonaState};
use crate::publisher::Publisher;
use crate::rate_gate::{Quota, RateGateState};
use crate::transcript::Transcript;

/// Posts shown to the model as recent context.
const PROMPT_HISTORY: usize = 3;

/// Everything that changes while the loop runs. Lives only in memory, except for the
/// persona progress which may be checkpointed.
pub struct AgentState {
    pub persona: PersonaState,
    pub history: HistoryLedger,
    pub post_gate: RateGateState,
    pub comment_gate: RateGateState,
    pub destinations: Vec<Destination>,
    /// Rotation position over post destinations.
    pub post_cursor: usize,
    pub last_liveness: Option<DateTime<Tz>>,
    pub last_post_check: Option<DateTime<Tz>>,
    pub last_comment_check: Option<DateTime<Tz>>,
}

/// What one pass of `tick` actually did.
#[derive(Debug, Default)]
pub struct TickReport {
    pub liveness_checked: bool,
    pub published: Option<Receipt>,
    pub commented: Option<Receipt>,
}

pub struct Agent {
    config: AgentConfig,
    clock: Clock,
    forum: Arc<dyn ForumPlatform>,
    generator: ContentGenerator,
    publisher: Publisher,
    scanner: Option<DiscoveryScanner>,
    comment_log: Transcript,
    /// Indices into `state.destinations` that accept posts, in rotation order.
    post_targets: Vec<usize>,
    post_quota: Quota,
    comment_quota: Quota,
    rng: StdRng,
    state: AgentState,
}

impl Agent {
    pub fn new(
        config: AgentConfig,
        forum: Arc<dyn ForumPlatform>,
        llm: Arc<dyn TextGenerator>,
        persona: PersonaState,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let tz = config.parse_timezone()?;
        let clock = Clock::new(
            tz,
            ScheduleWindow {
                open_hour: config.window_open_hour,
                close_hour: config.window_close_hour,
            },
        );
        let today = clock.now_in_target_zone().date_naive();

        let identity = PersonaIdentity {
            name: config.persona_name.clone(),
            description: config.persona_description.clone(),
            challenge_length_days: config.challenge_length_days,
        };
        let generator = ContentGenerator::new(llm, identity, config.comment_max_chars);

        let destinations: Vec<Destination> =
            config.destinations.iter().map(Destination::from).collect();
        let post_targets = config
            .destinations
            .iter()
            .enumerate()
            .filter(|(_, d)| d.post_target)
            .map(|(i, _)| i)
            .collect();

        let scanner = config
            .enable_comments
            .then(|| DiscoveryScanner::from_config(&config));

        let state = AgentState {
            persona,
            history: HistoryLedger::new(
                config.history_window,
                Some(Transcript::new(&config.history_log_path)),
            ),
            post_gate: RateGateState::new(today),
            comment_gate: RateGateState::new(today),
            destinations,
            post_cursor: 0,
            last_liveness: None,
            last_post_check: None,
            last_comment_check: None,
        };

        Ok(Self {
            post_quota: Quota {
                min_daily: 0,
                max_daily: config.max_posts_per_day,
                min_interval: Duration::from_secs(config.min_post_spacing_mins * 60),
            },
            comment_quota: Quota {
                min_daily: config.min_comments_per_day,
                max_daily: config.max_comments_per_day,
                min_interval: Duration::from_secs(config.comment_interval_secs),
            },
            publisher: Publisher::new(Some(Transcript::new(&config.post_log_path))),
            comment_log: Transcript::new(&config.comment_log_path),
            clock,
            forum,
            generator,
            scanner,
            post_targets,
            rng: StdRng::from_entropy(),
            state,
            config,
        })
    }

    /// Replace the entropy-seeded generator (distance draws, discovery picks).
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    pub fn state(&self) -> &AgentState {
        &self.state
    }

    /// Runs until `shutdown` fires or its sender goes away.
    pub async fn run_loop(&mut self, shutdown: flume::Receiver<()>) {
        tracing::info!(
            "Agent loop starting as {} ({}, comments {})",
            self.generator.identity().name,
            self.state.persona.summary(),
            if self.scanner.is_some() { "on" } else { "off" }
        );

        let tick_pause = Duration::from_secs(self.config.tick_secs);
        let error_pause = Duration::from_secs(self.config.error_pause_secs);

        loop {
            let cycle_id = Uuid::new_v4();
            let now = self.clock.now_in_target_zone();
            let span = tracing::debug_span!("cycle", id = %cycle_id);

            let pause = match AssertUnwindSafe(self.tick(now).instrument(span))
                .catch_unwind()
                .await
            {
                Ok(report) => {
                    if let Some(receipt) = &report.published {
                        tracing::debug!("Cycle {} published {}", cycle_id, receipt.id);
                    }
                    tick_pause
                }
                Err(panic) => {
                    tracing::error!(
                        "Agent cycle {} panicked: {}",
                        cycle_id,
                        panic_message(panic.as_ref())
                    );
                    error_pause
                }
            };

            tokio::select! {
                _ = sleep(pause) => {}
                _ = shutdown.recv_async() => {
                    tracing::info!("Shutdown requested, leaving agent loop");
                    break;
                }
            }
        }
    }

    /// One pass over the three periodic duties. Failures inside a duty are logged and
    /// swallowed so the other duties still run.
    pub async fn tick(&mut self, now: DateTime<Tz>) -> TickReport {
        let mut report = TickReport::default();

        if is_due(
            self.state.last_liveness,
            &now,
            self.config.liveness_interval_mins * 60,
        ) {
            self.state.last_liveness = Some(now);
            self.liveness_probe().await;
            report.liveness_checked = true;
        }

        if is_due(
            self.state.last_post_check,
            &now,
            self.config.post_check_interval_mins * 60,
        ) {
            self.state.last_post_check = Some(now);
            report.published = self.maybe_post(now).await;
        }

        if self.scanner.is_some()
            && is_due(
                self.state.last_comment_check,
                &now,
                self.config.comment_check_interval_mins * 60,
            )
        {
            self.state.last_comment_check = Some(now);
            report.commented = self.maybe_comment(now).await;
        }

        report
    }

    async fn liveness_probe(&self) {
        match self.forum.current_user().await {
            Ok(user) => tracing::info!(
                "Alive: {} session as u/{} is valid",
                self.forum.name(),
                user.name
            ),
            Err(e) => tracing::warn!("Liveness probe against {} failed: {:#}", self.forum.name(), e),
        }
        tracing::info!("Persona: {}", self.state.persona.summary());
        tracing::info!(
            "Posts: {}, history holds {}",
            self.state.post_gate.summary(&self.post_quota),
            self.state.history.len()
        );
        if self.scanner.is_some() {
            tracing::info!(
                "Comments: {}",
                self.state.comment_gate.summary(&self.comment_quota)
            );
        }
    }

    // ========================================================================
    // Posting
    // ========================================================================

    async fn maybe_post(&mut self, now: DateTime<Tz>) -> Option<Receipt> {
        if self.state.post_gate.reset_if_new_day(&now) {
            tracing::info!("New day ({}), post counter reset", now.date_naive());
        }

        let gate = &self.state.post_gate;
        if !gate.can_act(&self.post_quota) {
            tracing::debug!(
                "Post quota reached; next window opens in {}",
                format_wait(self.clock.time_until_next_window_open(&now, true))
            );
            return None;
        }
        if !self.clock.is_within_window(&now) {
            tracing::debug!(
                "Outside posting window; opens in {}",
                format_wait(
                    self.clock
                        .time_until_next_window_open(&now, gate.acted_today())
                )
            );
            return None;
        }
        if !gate.is_spaced(&now, self.post_quota.min_interval) {
            tracing::debug!("Too soon after the last post, waiting");
            return None;
        }

        match self.run_post_cycle(now).await {
            Ok(receipt) => Some(receipt),
            Err(e) => {
                tracing::error!("Post cycle failed: {:#}", e);
                None
            }
        }
    }

    async fn run_post_cycle(&mut self, now: DateTime<Tz>) -> Result<Receipt> {
        let Some(&index) = self
            .post_targets
            .get(self.state.post_cursor % self.post_targets.len().max(1))
        else {
            anyhow::bail!("no destination accepts posts");
        };
        self.state.post_cursor = self.state.post_cursor.wrapping_add(1);
        self.ensure_rules(index).await;

        let destination = &self.state.destinations[index];
        let history = self.state.history.recent_context(PROMPT_HISTORY);
        let time = TimeOfDay::from_hour(now.hour());
        tracing::info!(
            "Writing day {} post for r/{} ({})",
            self.state.persona.day,
            destination.name,
            time.label()
        );

        let post = self
            .generator
            .generate_post(&self.state.persona, &history, time, destination)
            .await
            .context("post generation failed")?;
        if !post.has_title() {
            tracing::warn!("Generated post has no title line; submitting it as-is");
        }

        let receipt = self
            .publisher
            .publish(
                self.forum.as_ref(),
                &mut self.state.destinations[index],
                &post.title,
                &post.body,
            )
            .await?;
        tracing::info!(
            "Published '{}' to r/{} as {}",
            post.title,
            self.state.destinations[index].name,
            receipt.url.as_deref().unwrap_or(&receipt.id)
        );

        let delta = self
            .rng
            .gen_range(self.config.distance_delta_min..=self.config.distance_delta_max);
        let posted_day = self.state.persona.day;
        self.state.persona = self.state.persona.advance(delta);
        self.state.history.append(HistoryEntry {
            day: posted_day,
            title: post.title,
            body: post.body,
        });
        self.state.post_gate.record_action(now);
        self.save_checkpoint();

        Ok(receipt)
    }

    /// Rules are fetched once per destination; a failed fetch counts as "no rules".
    async fn ensure_rules(&mut self, index: usize) {
        let destination = &mut self.state.destinations[index];
        if destination.rules_loaded {
            return;
        }
        destination.rules = match self.forum.destination_rules(&destination.name).await {
            Ok(rules) => rules,
            Err(e) => {
                tracing::warn!("Could not load rules for r/{}: {:#}", destination.name, e);
                Vec::new()
            }
        };
        destination.rules_loaded = true;
    }

    fn save_checkpoint(&self) {
        let Some(path) = &self.config.persona_checkpoint_path else {
            return;
        };
        if let Err(e) = self.state.persona.save_checkpoint(Path::new(path)) {
            tracing::warn!("Failed to save persona checkpoint: {:#}", e);
        }
    }

    // ========================================================================
    // Commenting
    // ========================================================================

    async fn maybe_comment(&mut self, now: DateTime<Tz>) -> Option<Receipt> {
        if self.state.comment_gate.reset_if_new_day(&now) {
            tracing::info!("New day ({}), comment counter reset", now.date_naive());
        }

        let gate = &self.state.comment_gate;
        if !gate.can_act(&self.comment_quota) {
            tracing::debug!("Comment quota reached for today");
            return None;
        }
        let remaining = self.clock.seconds_remaining_today(&now);
        if !gate.delay_elapsed(&self.comment_quota, &now, remaining) {
            tracing::debug!(
                "Next comment in at most {}",
                format_wait(gate.next_action_delay(&self.comment_quota, remaining))
            );
            return None;
        }

        match self.run_comment_cycle(now).await {
            Ok(receipt) => receipt,
            Err(e) => {
                tracing::error!("Comment cycle failed: {:#}", e);
                None
            }
        }
    }

    async fn run_comment_cycle(&mut self, now: DateTime<Tz>) -> Result<Option<Receipt>> {
        let Some(scanner) = &self.scanner else {
            return Ok(None);
        };
        let Some(selected) = scanner
            .select_candidate(self.forum.as_ref(), &self.state.comment_gate, &mut self.rng)
            .await
        else {
            return Ok(None);
        };

        // Marked before generating so a failing item is not retried forever.
        self.state.comment_gate.mark_seen(&selected.item.id);

        let text = self
            .generator
            .generate_comment(
                &selected.item.title,
                &selected.item.body,
                &selected.destination,
            )
            .await
            .context("comment generation failed")?;

        let receipt = self
            .forum
            .reply_to_item(&selected.item.id, &text)
            .await
            .with_context(|| format!("reply to {} failed", selected.item.id))?;
        self.state.comment_gate.record_action(now);

        tracing::info!(
            "Commented on '{}' in r/{} ({})",
            selected.item.title,
            selected.destination,
            self.state.comment_gate.summary(&self.comment_quota)
        );
        self.comment_log.append_best_effort(
            Utc::now(),
            &format!("r/{} {}", selected.destination, selected.item.id),
            &[("Post", selected.item.title.as_str()), ("Comment", text.as_str())],
        );

        Ok(Some(receipt))
    }
}

fn is_due(last: Option<DateTime<Tz>>, now: &DateTime<Tz>, interval_secs: u64) -> bool {
    match last {
        None => true,
        Some(last) => (*now - last).num_seconds() >= interval_secs as i64,
    }
}

fn format_wait(wait: Duration) -> String {
    let mins = wait.as_secs() / 60;
    format!("{}h{:02}m", mins / 60, mins % 60)
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
