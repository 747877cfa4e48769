use crate::batch::{BatchOutcome, Partition};
use crate::phone::PhoneIdentity;
use crate::ui::icons::{
    CHECK, INVITE, MEMBER, OPERATOR, RETRY, SAVED, SEARCH, SELECTED, SKIPPED, SPARKLE, WARN,
};
use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};

/// Terminal UI for an enrollment run, rendered via `indicatif`.
///
/// A single roster bar tracks how many roster identities are processed.
/// Narrative lines are printed above it; operator prompts run inside
/// [`Self::suspend`] so the bar does not redraw over them.
pub struct EnrollUI {
    multi: MultiProgress,
    roster_bar: ProgressBar,
    verbose: bool,
}

impl EnrollUI {
    /// Create the UI sized to the roster.
    ///
    /// # Arguments
    /// * `roster_len`: total identities in the participant queue
    /// * `verbose`: when `true`, per-attempt steps are printed as well
    pub fn new(roster_len: u64, verbose: bool) -> Self {
        Self::with_target(roster_len, verbose, ProgressDrawTarget::stderr())
    }

    /// A UI that renders nothing, for tests and non-interactive use.
    pub fn hidden(roster_len: u64) -> Self {
        Self::with_target(roster_len, false, ProgressDrawTarget::hidden())
    }

    fn with_target(roster_len: u64, verbose: bool, target: ProgressDrawTarget) -> Self {
        let multi = MultiProgress::with_draw_target(target);

        let roster_style = ProgressStyle::default_bar()
            .template("{prefix:.bold.dim} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .expect("progress bar template is a valid static string")
            .progress_chars("█▓▒░");

        let roster_bar = multi.add(ProgressBar::new(roster_len));
        roster_bar.set_style(roster_style);
        roster_bar.set_prefix("Roster");

        Self {
            multi,
            roster_bar,
            verbose,
        }
    }

    /// Print a line above the bar, falling back to `eprintln!` if the bar
    /// cannot draw.
    fn print_line(&self, msg: impl AsRef<str>) {
        if self.multi.println(msg.as_ref()).is_err() {
            eprintln!("{}", msg.as_ref());
        }
    }

    /// Run `f` with the bar cleared, e.g. while waiting on the operator.
    pub fn suspend<F: FnOnce() -> R, R>(&self, f: F) -> R {
        self.multi.suspend(f)
    }

    pub fn set_processed(&self, processed: u64) {
        self.roster_bar.set_position(processed);
    }

    pub fn info(&self, msg: &str) {
        self.print_line(format!("  {}", msg));
    }

    pub fn warn(&self, msg: &str) {
        self.print_line(format!("  {}{}", WARN, style(msg).yellow()));
    }

    /// Only shown in verbose mode.
    pub fn step(&self, msg: &str) {
        if self.verbose {
            self.print_line(format!("    {} {}", style("→").dim(), style(msg).dim()));
        }
    }

    pub fn operator(&self, msg: &str) {
        self.print_line(format!("  {}{}", OPERATOR, style(msg).bold()));
    }

    pub fn print_batch_header(&self, batch_number: u32, target: usize) {
        self.print_line("");
        self.print_line(format!("{}", style("═".repeat(70)).cyan()));
        self.print_line(format!(
            "{} Batch {}: up to {} participant(s)",
            style("▶").green().bold(),
            style(batch_number).yellow().bold(),
            target
        ));
        self.print_line(format!("{}", style("═".repeat(70)).cyan()));
        self.roster_bar
            .set_message(format!("batch {}", style(batch_number).yellow()));
    }

    pub fn participant_started(&self, identity: &PhoneIdentity) {
        self.print_line(format!("{}{}", SEARCH, style(identity).cyan()));
    }

    pub fn participant_resolved(&self, identity: &PhoneIdentity, partition: Partition, how: &str) {
        let icon = match partition {
            Partition::Added => &SELECTED,
            Partition::AlreadyInGroup => &MEMBER,
            Partition::Invited => &INVITE,
            Partition::NotAdded => &SKIPPED,
        };
        self.print_line(format!(
            "  {}{} {}",
            icon,
            style(partition.label()).bold(),
            style(format!("{} ({})", identity, how)).dim()
        ));
    }

    pub fn retry(&self, identity: &PhoneIdentity, attempt: u32, budget: u32, reason: &str) {
        self.print_line(format!(
            "  {}Attempt {}/{} for {} failed: {}",
            RETRY,
            attempt,
            budget,
            identity,
            style(reason).dim()
        ));
    }

    pub fn saved(&self, msg: &str) {
        self.print_line(format!("  {}{}", SAVED, msg));
    }

    pub fn print_batch_summary(&self, batch_number: u32, outcome: &BatchOutcome, committed: bool) {
        self.print_line("");
        self.print_line(format!(
            "{}",
            style(format!("Summary for batch {}:", batch_number)).underlined()
        ));
        for partition in Partition::ALL {
            let count = outcome.partition(partition).len();
            let count = if count > 0 {
                style(count).green()
            } else {
                style(count).dim()
            };
            self.print_line(format!("  {:<18} {}", partition.label(), count));
        }
        if !outcome.added.is_empty() {
            let status = if committed {
                format!("{}marked as processed", CHECK)
            } else {
                format!("{}not confirmed; will be retried next run", WARN)
            };
            self.print_line(format!("  {:<18} {}", "Selections", status));
        }
    }

    pub fn finish(&self, msg: &str) {
        self.roster_bar
            .finish_with_message(format!("{}{}", SPARKLE, msg));
    }
}
