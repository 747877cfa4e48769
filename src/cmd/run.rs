//! `enroll <GROUP> <ROSTER>`: load everything, open the group, run batches.

use std::sync::Arc;

use enroll::batch::RunSummary;
use enroll::batch::controller::{BatchController, ControllerSettings};
use enroll::config::Config;
use enroll::driver::chrome::ChromeSession;
use enroll::errors::{EnrollError, Result};
use enroll::operator::TerminalOperator;
use enroll::phone::PhoneNormalizer;
use enroll::roster::ParticipantQueue;
use enroll::session::Session;
use enroll::store::{PersistenceStore, RunState};
use enroll::ui::EnrollUI;
use uuid::Uuid;

use super::super::Cli;

pub async fn run_enrollment(cli: &Cli) -> Result<()> {
    let config = Config::new(cli.group.clone(), cli.roster.clone(), cli.overrides())?;
    for warning in config.validate() {
        eprintln!("{} {}", console::style("Warning:").yellow(), warning);
    }

    // Everything that can be checked without a browser is checked first.
    let normalizer = PhoneNormalizer::new(&config.toml.defaults.country_code)?;
    let queue = ParticipantQueue::load(&config.roster_file, &normalizer)?;
    for rejected in queue.rejected() {
        eprintln!(
            "{} skipping roster line {}: '{}'",
            console::style("Warning:").yellow(),
            rejected.line_number,
            rejected.raw
        );
    }

    let mut store = PersistenceStore::open(&config.state_dir)?;
    let state = store.load_state()?;
    let run_id = Uuid::new_v4();
    store.log().start_run(run_id, &config.group, queue.len())?;
    for rejected in queue.rejected() {
        store.append_log(&format!(
            "Skipped roster line {}: '{}'",
            rejected.line_number, rejected.raw
        ))?;
    }
    tracing::info!(%run_id, group = %config.group, roster = queue.len(), "run started");

    let result = enroll_with_browser(&config, &queue, &mut store, state).await;
    match &result {
        Ok(summary) => {
            store.append_log(&format!(
                "Run finished: {} batch(es), {} remaining{}",
                summary.batches.len(),
                summary.remaining,
                if summary.stopped_by_operator {
                    ", stopped by operator"
                } else {
                    ""
                }
            ))?;
        }
        Err(err) => {
            if let Err(log_err) = store.append_log(&format!("Run failed: {}", err)) {
                tracing::warn!(error = %log_err, "could not record failure in run log");
            }
        }
    }
    result.map(|_| ())
}

async fn enroll_with_browser(
    config: &Config,
    queue: &ParticipantQueue,
    store: &mut PersistenceStore,
    state: RunState,
) -> Result<RunSummary> {
    let ui = Arc::new(EnrollUI::new(queue.len() as u64, config.verbose));
    ui.info(&format!(
        "{} roster entries, {} already processed",
        queue.len(),
        queue
            .identities()
            .iter()
            .filter(|id| state.processed.contains(*id))
            .count()
    ));

    let driver = ChromeSession::connect(
        &config.toml.driver,
        config.toml.selectors.clone(),
        config.toml.markers.clone(),
    )
    .await
    .map_err(|e| EnrollError::Session(format!("could not start browser session: {}", e)))?;

    ui.info("Waiting for the app to load (scan the QR code if asked)...");
    let mut session = Session::open(driver, &config.group, config.login_timeout()).await?;

    let settings = ControllerSettings {
        default_batch_size: config.default_batch_size(),
        fixed_batch_size: config.batch_size,
        auto_continue: config.yes,
        retry: config.retry_policy(),
        search_timeout: config.search_timeout(),
        settle: config.settle(),
    };
    let mut operator = TerminalOperator::new(Arc::clone(&ui));
    let result = BatchController::new(
        session.driver(),
        &mut operator,
        store,
        queue,
        Arc::clone(&ui),
        settings,
        state,
    )
    .run()
    .await;

    if let Err(e) = session.release().await {
        tracing::warn!(error = %e, "failed to close browser session");
        ui.warn(&format!("Browser session did not close cleanly: {}", e));
    }

    match &result {
        Ok(summary) if summary.remaining == 0 => ui.finish("roster complete"),
        Ok(summary) => ui.finish(&format!("{} left for the next run", summary.remaining)),
        Err(_) => ui.finish("run aborted"),
    }
    result
}
