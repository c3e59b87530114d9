mod challenge;
mod classify;
mod cli;
mod clock;
mod config;
mod engine;
mod negotiate;
mod protocol;
mod session;
#[cfg(test)]
mod testkit;
mod ui;
mod vendor;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, bail};
use clap::Parser;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::challenge::ChallengeBroker;
use crate::cli::{Cli, Command};
use crate::clock::CivilClock;
use crate::config::{Config, UserConfig};
use crate::engine::{AcquisitionScheduler, SubmitSpec};
use crate::negotiate::Negotiator;
use crate::session::{Credential, SessionGuard};
use crate::ui::Ui;
use crate::vendor::{VendorApi, VendorClient};

/// Cap on a run whose configured end time already passed (the `now`
/// command outside the window, typically).
const FALLBACK_RUN_CAP: Duration = Duration::from_secs(600);

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(Path::new(&cli.config))?;
    if config.users.is_empty() {
        bail!("no users configured in {}", cli.config);
    }
    let clock = CivilClock::new(config.engine.utc_offset_hours);
    let ui = Ui::new();

    match cli.command {
        Command::Run => {
            let spinner = ui.waiting(format!(
                "waiting for login time {}",
                config.engine.login_time
            ));
            clock.wait_until(&config.engine.login_time).await?;
            spinner.finish_and_clear();
            acquire_all(&config, clock, &ui, cli.verbose, true).await
        }
        Command::Now => acquire_all(&config, clock, &ui, cli.verbose, false).await,
        Command::Checkin { at } => checkin_all(&config, clock, &ui, at.as_deref()).await,
    }
}

type LoggedInUser = (Arc<VendorClient>, Arc<SessionGuard<VendorClient>>, UserConfig);

/// Log every configured user in, skipping the ones the vendor rejects.
/// Each user gets their own client so cookie jars never mix.
async fn login_users(config: &Config, ui: &Ui) -> Result<Vec<LoggedInUser>> {
    let mut users = Vec::new();
    for user in &config.users {
        let api = Arc::new(VendorClient::new(config.transport_options()));
        let guard = Arc::new(SessionGuard::new(
            api.clone(),
            Credential {
                username: user.username.clone(),
                password: user.password.clone(),
            },
        ));
        match guard.login().await {
            Ok(()) => {
                ui.login_ok(guard.username());
                users.push((api, guard, user.clone()));
            }
            Err(e) => ui.login_failed(&user.username, &e.to_string()),
        }
    }
    if users.is_empty() {
        bail!("no user could log in");
    }
    Ok(users)
}

async fn acquire_all(
    config: &Config,
    clock: CivilClock,
    ui: &Ui,
    verbose: bool,
    gated: bool,
) -> Result<()> {
    let users = login_users(config, ui).await?;

    if gated {
        let spinner = ui.waiting(format!("waiting for open time {}", config.engine.open_time));
        clock.wait_until(&config.engine.open_time).await?;
        spinner.finish_and_clear();
    }

    let remaining = clock
        .duration_until(&config.engine.end_time)?
        .unwrap_or(FALLBACK_RUN_CAP);
    let deadline = tokio::time::Instant::now() + remaining;

    let weekday = clock.weekday_name();
    let concurrency = Arc::new(Semaphore::new(config.engine.max_concurrency));
    let negotiator = Arc::new(Negotiator::new());
    let classifier = Arc::new(config.classifier());

    let mut tasks = JoinSet::new();
    let mut scheduled = 0usize;
    for (api, guard, user) in &users {
        for (index, task) in user.tasks.iter().enumerate() {
            let label = format!("{} task {}", user.username, index + 1);
            if !task.runs_on(weekday) {
                ui.task_skipped(&label, weekday);
                continue;
            }
            let challenge = config.engine.enable_challenge.then(|| {
                Arc::new(ChallengeBroker::new(Duration::from_secs(
                    config.engine.challenge_cache_secs,
                )))
            });
            let scheduler = AcquisitionScheduler {
                api: api.clone(),
                guard: guard.clone(),
                negotiator: negotiator.clone(),
                classifier: classifier.clone(),
                challenge,
                policy: config.policy(),
                concurrency: concurrency.clone(),
                deadline,
            };
            let spec = SubmitSpec {
                room_id: task.room_id.clone(),
                start_time: task.start.clone(),
                end_time: task.end.clone(),
                day: clock.target_date(task.next_day),
            };
            let seats = task.seats.clone();
            scheduled += 1;
            tasks.spawn(async move {
                let outcome = scheduler.acquire(spec, &seats).await;
                (label, outcome)
            });
        }
    }

    let mut acquired = 0usize;
    let mut completed = 0usize;
    while let Some(joined) = tasks.join_next().await {
        let Ok((label, outcome)) = joined else {
            continue;
        };
        completed += 1;
        ui.task_result(&label, &outcome);
        if verbose {
            ui.print_outcome_json(&label, &outcome);
        }
        if outcome.is_acquired() {
            acquired += 1;
        }
    }

    ui.note(&format!("{acquired}/{completed} task(s) acquired a seat"));
    if scheduled > 0 && acquired == 0 {
        bail!("no task acquired a seat");
    }
    Ok(())
}

async fn checkin_all(
    config: &Config,
    clock: CivilClock,
    ui: &Ui,
    at: Option<&str>,
) -> Result<()> {
    let users = login_users(config, ui).await?;

    if let Some(time_of_day) = at {
        let spinner = ui.waiting(format!("waiting for check-in time {time_of_day}"));
        clock.wait_until(time_of_day).await?;
        spinner.finish_and_clear();
    }

    let today = clock.target_date(false);
    for (api, _guard, user) in &users {
        match todays_reservation(api.as_ref(), &today).await {
            Ok(Some(reservation_id)) => match api.sign_in(reservation_id).await {
                Ok(reply) if reply.success => ui.checkin_ok(&user.username, reservation_id),
                Ok(reply) => ui.checkin_failed(
                    &user.username,
                    reply.msg.as_deref().unwrap_or("rejected"),
                ),
                Err(e) => ui.checkin_failed(&user.username, &e.to_string()),
            },
            Ok(None) => ui.note(&format!("{}: no reservation today", user.username)),
            Err(e) => ui.checkin_failed(&user.username, &e.to_string()),
        }
    }
    Ok(())
}

/// First reservation dated today, if any.
async fn todays_reservation<T: VendorApi>(
    api: &T,
    today: &str,
) -> Result<Option<i64>, crate::vendor::VendorError> {
    let list = api.reserve_list().await?;
    Ok(list
        .data
        .reserve_list
        .iter()
        .find(|item| item.today.as_deref() == Some(today))
        .map(|item| item.id))
}
