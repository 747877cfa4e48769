//! The batch enrollment state machine.
//!
//! A run is a sequence of batches. Each batch walks the participant queue,
//! skipping identities already processed, and resolves every identity it
//! dequeues into exactly one [`Partition`]:
//!
//! 1. a stored manual selection is tried first (no typing into the search);
//! 2. otherwise the identity is searched for under the [`RetryPolicy`];
//! 3. when all attempts miss, the operator is asked to pick the entry and
//!    the checked entry's text is remembered for next time.
//!
//! Invited and already-member results are processed on the spot. Selected
//! identities wait for the operator to confirm the UI "Add" click before they
//! are merged into the processed set. Partition files are written for every
//! batch whether or not the commit is confirmed.

use super::{BatchOutcome, BatchPhase, Partition};
use crate::driver::{DriverError, ElementRef, POLL_INTERVAL, Target, UiDriver};
use crate::errors::{EnrollError, Result};
use crate::operator::{ManualSelection, Operator};
use crate::phone::{PhoneIdentity, display_text};
use crate::retry::{MatchAttempt, RetryOutcome, RetryPolicy};
use crate::roster::ParticipantQueue;
use crate::store::{ManualSelectionMap, PersistenceStore, ProcessedSet, RunState};
use crate::ui::EnrollUI;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct ControllerSettings {
    /// Offered when the operator is asked for a batch size.
    pub default_batch_size: usize,
    /// When set, every batch uses this target and the size prompt is skipped.
    pub fixed_batch_size: Option<usize>,
    /// Start the next batch without asking.
    pub auto_continue: bool,
    pub retry: RetryPolicy,
    pub search_timeout: Duration,
    /// Pause after typing a query before looking for results.
    pub settle: Duration,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            default_batch_size: 5,
            fixed_batch_size: None,
            auto_continue: false,
            retry: RetryPolicy::default(),
            search_timeout: Duration::from_secs(15),
            settle: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BatchReport {
    pub number: u32,
    /// Target in force when the batch closed, extensions included.
    pub target: usize,
    pub outcome: BatchOutcome,
    /// Whether the operator confirmed the add for `outcome.added`.
    pub committed: bool,
}

#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub batches: Vec<BatchReport>,
    pub stopped_by_operator: bool,
    /// Queue identities still unprocessed and not attempted in this run.
    pub remaining: usize,
}

/// A matched UI entry and what was done with it.
struct Resolution {
    partition: Partition,
    text: String,
}

pub struct BatchController<'a, D: UiDriver, O: Operator> {
    driver: &'a mut D,
    operator: &'a mut O,
    store: &'a mut PersistenceStore,
    queue: &'a ParticipantQueue,
    ui: Arc<EnrollUI>,
    settings: ControllerSettings,
    processed: ProcessedSet,
    manual: ManualSelectionMap,
    search_field: Option<ElementRef>,
    cursor: usize,
    phase: BatchPhase,
}

impl<'a, D: UiDriver, O: Operator> BatchController<'a, D, O> {
    pub fn new(
        driver: &'a mut D,
        operator: &'a mut O,
        store: &'a mut PersistenceStore,
        queue: &'a ParticipantQueue,
        ui: Arc<EnrollUI>,
        settings: ControllerSettings,
        state: RunState,
    ) -> Self {
        let RunState { processed, manual } = state;
        Self {
            driver,
            operator,
            store,
            queue,
            ui,
            settings,
            processed,
            manual,
            search_field: None,
            cursor: 0,
            phase: BatchPhase::AwaitBatchSize,
        }
    }

    /// Identities from the cursor on that still need processing.
    pub fn pending(&self) -> usize {
        self.queue.identities()[self.cursor.min(self.queue.len())..]
            .iter()
            .filter(|id| !self.processed.contains(*id))
            .count()
    }

    pub async fn run(&mut self) -> Result<RunSummary> {
        let mut summary = RunSummary::default();
        let mut number = self.store.next_batch_number()?;
        self.sync_progress();

        if self.pending() == 0 {
            self.ui.info("Every roster entry is already processed.");
            self.log("Nothing to do: every roster entry is already processed")?;
        }

        while self.pending() > 0 {
            let report = self.run_batch(number).await?;
            summary.batches.push(report);
            number += 1;

            if self.pending() == 0 {
                break;
            }
            if !self.settings.auto_continue && !self.operator.continue_to_next_batch(number)? {
                summary.stopped_by_operator = true;
                self.ui.info("Stopping. Progress is saved; rerun to continue.");
                self.log("Operator stopped the run")?;
                break;
            }
        }

        summary.remaining = self.pending();
        Ok(summary)
    }

    async fn run_batch(&mut self, number: u32) -> Result<BatchReport> {
        self.phase = BatchPhase::AwaitBatchSize;
        let mut target = match self.settings.fixed_batch_size {
            Some(size) => size,
            None => self
                .operator
                .batch_size(number, self.settings.default_batch_size)?,
        }
        .max(1);

        self.ui.print_batch_header(number, target);
        self.log(&format!("Batch {} started, target {}", number, target))?;
        self.ensure_search_field().await?;

        let mut outcome = BatchOutcome::new();
        let mut selected_texts: Vec<String> = Vec::new();

        loop {
            while outcome.selected_count() < target {
                let Some(identity) = self.next_pending() else {
                    break;
                };
                self.phase = BatchPhase::SelectingParticipant;
                self.process_identity(identity, &mut outcome, &mut selected_texts)
                    .await?;
                self.sync_progress();
            }

            if self.pending() == 0 {
                self.phase = BatchPhase::QueueExhausted;
                break;
            }

            self.phase = BatchPhase::BatchFull;
            let selected = outcome.selected_count();
            match self.operator.extend_batch(number, selected)? {
                Some(new_target) if new_target > selected => {
                    self.log(&format!(
                        "Batch {} extended from {} to {}",
                        number, target, new_target
                    ))?;
                    target = new_target;
                    self.ensure_search_field().await?;
                }
                Some(rejected) => {
                    let msg = format!(
                        "Extension to {} rejected: must be more than the {} already selected",
                        rejected, selected
                    );
                    self.ui.warn(&msg);
                    self.log(&msg)?;
                    break;
                }
                None => break,
            }
        }

        let committed = self.confirm_commit(number, &outcome).await?;
        self.close_batch(number, target, outcome, committed)
    }

    /// Resolve one identity into exactly one partition of `outcome`.
    async fn process_identity(
        &mut self,
        identity: PhoneIdentity,
        outcome: &mut BatchOutcome,
        selected_texts: &mut Vec<String>,
    ) -> Result<()> {
        self.ui.participant_started(&identity);

        if let Some(stored) = self.manual.get(&identity).cloned() {
            self.phase = BatchPhase::ManualLookup;
            match self.manual_lookup(&stored).await {
                Ok(()) => {
                    selected_texts.push(stored);
                    return self.resolve(identity, Partition::Added, "stored selection", outcome);
                }
                Err(e) => {
                    let msg = format!(
                        "Stored selection '{}' for {} not usable ({}); falling back to search",
                        stored, identity, e
                    );
                    self.ui.warn(&msg);
                    self.log(&msg)?;
                }
            }
        }

        self.phase = BatchPhase::AutomaticLookup;
        match self.automatic_lookup(&identity).await? {
            RetryOutcome::Matched {
                value: resolution,
                attempt,
            } => {
                if resolution.partition == Partition::Added {
                    selected_texts.push(resolution.text);
                }
                let how = format!("search, attempt {}", attempt);
                self.resolve(identity, resolution.partition, &how, outcome)
            }
            RetryOutcome::Exhausted {
                attempts,
                last_failure,
            } => {
                self.log(&format!(
                    "No automatic match for {} after {} attempt(s): {}",
                    identity, attempts, last_failure
                ))?;
                self.phase = BatchPhase::InteractiveFallback;
                self.interactive_fallback(identity, outcome, selected_texts)
                    .await
            }
        }
    }

    async fn manual_lookup(&mut self, stored: &str) -> std::result::Result<(), DriverError> {
        // Stored selections are looked up in the unfiltered list.
        if let Some(search) = self.search_field.clone() {
            self.driver.clear(&search).await?;
        }
        let entry =
            find_entry_with_text(&mut *self.driver, stored, self.settings.search_timeout).await?;
        if !self.driver.is_checked(&entry).await? {
            self.driver.click(&entry).await?;
        }
        Ok(())
    }

    async fn automatic_lookup(
        &mut self,
        identity: &PhoneIdentity,
    ) -> Result<RetryOutcome<Resolution>> {
        let search = self
            .search_field
            .clone()
            .ok_or(EnrollError::SearchControlUnavailable)?;
        let policy = self.settings.retry;
        let timeout = self.settings.search_timeout;
        let settle = self.settings.settle;
        let driver = &mut *self.driver;
        let store = &mut *self.store;
        let ui = &self.ui;

        policy
            .run(async |attempt| {
                ui.step(&format!(
                    "Attempt {}/{}: searching for {}",
                    attempt, policy.max_attempts, identity
                ));
                let result =
                    match attempt_match(&mut *driver, &search, identity, timeout, settle).await {
                    Ok(Some(resolution)) => MatchAttempt::Matched(resolution),
                    Ok(None) => MatchAttempt::NoMatch,
                    Err(e) => MatchAttempt::DriverTimeout(e.to_string()),
                };
                let reason = match &result {
                    MatchAttempt::Matched(_) => None,
                    MatchAttempt::NoMatch => Some("no matching participant found".to_string()),
                    MatchAttempt::DriverTimeout(detail) => Some(detail.clone()),
                };
                if let Some(reason) = reason {
                    ui.retry(identity, attempt, policy.max_attempts, &reason);
                    store.append_log(&format!(
                        "Attempt {}/{} for {} failed: {}",
                        attempt, policy.max_attempts, identity, reason
                    ))?;
                }
                Ok::<_, EnrollError>(result)
            })
            .await
    }

    async fn interactive_fallback(
        &mut self,
        identity: PhoneIdentity,
        outcome: &mut BatchOutcome,
        selected_texts: &mut Vec<String>,
    ) -> Result<()> {
        if self.operator.manual_selection(&identity)? == ManualSelection::Declined {
            self.log(&format!("Operator skipped {}", identity))?;
            return self.resolve(identity, Partition::NotAdded, "skipped by operator", outcome);
        }

        match self.newly_checked_entry(selected_texts).await {
            Ok(Some(text)) => {
                self.manual.insert(identity.clone(), text.clone());
                self.store.save_manual_selections(&self.manual)?;
                self.ui
                    .saved(&format!("Remembered '{}' for {}", text, identity));
                self.log(&format!("Stored manual selection '{}' for {}", text, identity))?;
                selected_texts.push(text);
                self.resolve(identity, Partition::Added, "operator selection", outcome)
            }
            Ok(None) => {
                let msg = format!("No newly checked entry found for {}", identity);
                self.ui.warn(&msg);
                self.log(&msg)?;
                self.resolve(identity, Partition::NotAdded, "nothing checked", outcome)
            }
            Err(e) => {
                let msg = format!("Could not read the operator's selection for {}: {}", identity, e);
                self.ui.warn(&msg);
                self.log(&msg)?;
                self.resolve(identity, Partition::NotAdded, "selection unreadable", outcome)
            }
        }
    }

    /// Text of the first checked entry not already selected in this batch.
    async fn newly_checked_entry(
        &mut self,
        selected_texts: &[String],
    ) -> std::result::Result<Option<String>, DriverError> {
        for entry in self.driver.find_all(&Target::CheckedEntry).await? {
            let text = display_text(&self.driver.text(&entry).await?);
            if !text.is_empty() && !selected_texts.contains(&text) {
                return Ok(Some(text));
            }
        }
        Ok(None)
    }

    /// Record `identity` in `partition`, persisting it right away when the
    /// partition needs no commit.
    fn resolve(
        &mut self,
        identity: PhoneIdentity,
        partition: Partition,
        how: &str,
        outcome: &mut BatchOutcome,
    ) -> Result<()> {
        self.ui.participant_resolved(&identity, partition, how);
        self.log(&format!("{}: {} ({})", identity, partition, how))?;
        if partition.resolves_immediately() {
            self.processed.insert(identity.clone());
            self.store.save_processed_set(&self.processed)?;
        }
        outcome.record(identity, partition);
        Ok(())
    }

    async fn confirm_commit(&mut self, number: u32, outcome: &BatchOutcome) -> Result<bool> {
        if outcome.added.is_empty() {
            return Ok(false);
        }
        self.phase = BatchPhase::ConfirmCommit;
        if !self.operator.confirm_add(number, &outcome.added)? {
            self.log(&format!(
                "Batch {}: add not confirmed, {} selection(s) left for a later run",
                number,
                outcome.added.len()
            ))?;
            return Ok(false);
        }
        self.processed.extend(outcome.added.iter().cloned());
        self.store.save_processed_set(&self.processed)?;
        self.log(&format!(
            "Batch {}: add confirmed for {} participant(s)",
            number,
            outcome.added.len()
        ))?;
        Ok(true)
    }

    fn close_batch(
        &mut self,
        number: u32,
        target: usize,
        outcome: BatchOutcome,
        committed: bool,
    ) -> Result<BatchReport> {
        self.phase = BatchPhase::BatchClosed;
        for partition in Partition::ALL {
            self.store
                .write_partition_file(number, partition, outcome.partition(partition))?;
        }
        self.log(&format!(
            "Batch {} closed: added={} already_in_group={} invited={} not_added={} committed={}",
            number,
            outcome.added.len(),
            outcome.already_in_group.len(),
            outcome.invited.len(),
            outcome.not_added.len(),
            committed
        ))?;
        self.ui.print_batch_summary(number, &outcome, committed);
        self.sync_progress();

        Ok(BatchReport {
            number,
            target,
            outcome,
            committed,
        })
    }

    /// Find the search field, asking the operator to open it if it is not
    /// on screen.
    async fn ensure_search_field(&mut self) -> Result<()> {
        self.search_field = None;
        let probed = self
            .driver
            .find_all(&Target::SearchField)
            .await
            .ok()
            .and_then(|found| found.into_iter().next());
        if let Some(field) = probed {
            self.search_field = Some(field);
            return Ok(());
        }

        self.ui.warn("Participant search box not found.");
        self.log("Search field not found; asking operator")?;
        if !self.operator.recover_search_field()? {
            self.log("Operator could not open the search field")?;
            return Err(EnrollError::SearchControlUnavailable);
        }

        match self
            .driver
            .wait_for(&Target::SearchField, self.settings.search_timeout)
            .await
        {
            Ok(field) => {
                self.search_field = Some(field);
                self.log("Search field acquired after operator recovery")?;
                Ok(())
            }
            Err(e) => {
                self.log(&format!("Search field still unavailable: {}", e))?;
                Err(EnrollError::SearchControlUnavailable)
            }
        }
    }

    fn next_pending(&mut self) -> Option<PhoneIdentity> {
        while let Some(identity) = self.queue.get(self.cursor) {
            self.cursor += 1;
            if !self.processed.contains(identity) {
                return Some(identity.clone());
            }
        }
        None
    }

    fn sync_progress(&self) {
        let done = self.queue.len().saturating_sub(self.pending());
        self.ui.set_processed(done as u64);
    }

    fn log(&mut self, line: &str) -> Result<()> {
        tracing::debug!(phase = %self.phase, "{}", line);
        self.store.append_log(line)
    }
}

/// First rendered entry whose display text contains `stored`, polling
/// until `timeout` elapses.
///
/// Entry text spans several lines (name, number, status), so it is
/// normalized before comparing, the same way stored selections are.
async fn find_entry_with_text<D: UiDriver>(
    driver: &mut D,
    stored: &str,
    timeout: Duration,
) -> std::result::Result<ElementRef, DriverError> {
    let deadline = Instant::now() + timeout;
    loop {
        for entry in driver.find_all(&Target::ContactEntry).await? {
            if display_text(&driver.text(&entry).await?).contains(stored) {
                return Ok(entry);
            }
        }
        let now = Instant::now();
        if now >= deadline {
            return Err(DriverError::Timeout {
                target: format!("contact entry containing '{}'", stored),
                waited: timeout,
            });
        }
        tokio::time::sleep(POLL_INTERVAL.min(deadline - now)).await;
    }
}

/// One search attempt: reset the field, type the identity, scan results.
///
/// `Ok(None)` means results rendered but none referred to `identity`.
async fn attempt_match<D: UiDriver>(
    driver: &mut D,
    search: &ElementRef,
    identity: &PhoneIdentity,
    timeout: Duration,
    settle: Duration,
) -> std::result::Result<Option<Resolution>, DriverError> {
    driver.clear(search).await?;
    driver.send_text(search, identity.as_str()).await?;
    if !settle.is_zero() {
        tokio::time::sleep(settle).await;
    }
    driver.wait_for(&Target::ContactEntry, timeout).await?;

    for entry in driver.find_all(&Target::ContactEntry).await? {
        let raw = driver.text(&entry).await?;
        if !identity.matches_entry(&raw) {
            continue;
        }
        let text = display_text(&raw);

        if !driver
            .find_within(&entry, &Target::AlreadyMemberMarker)
            .await?
            .is_empty()
        {
            return Ok(Some(Resolution {
                partition: Partition::AlreadyInGroup,
                text,
            }));
        }
        if let Some(invite) = driver
            .find_within(&entry, &Target::InviteAction)
            .await?
            .into_iter()
            .next()
        {
            driver.click(&invite).await?;
            return Ok(Some(Resolution {
                partition: Partition::Invited,
                text,
            }));
        }
        driver.click(&entry).await?;
        return Ok(Some(Resolution {
            partition: Partition::Added,
            text,
        }));
    }
    Ok(None)
}
