//! Fans a task's candidate seats out to concurrent attempt machines.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{Semaphore, watch};
use tokio::task::JoinSet;
use tokio::time::Instant;

use super::attempt::{AttemptMachine, AttemptPolicy, AttemptVerdict, SeatReport, SubmitSpec};
use crate::challenge::ChallengeBroker;
use crate::classify::Classifier;
use crate::negotiate::Negotiator;
use crate::session::SessionGuard;
use crate::vendor::VendorApi;

/// Result of one task's acquisition run. Always carries per-seat reasons on
/// failure; a bare boolean would leave the caller unable to decide whether
/// widening the candidate list next run is worth it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case", tag = "result")]
pub enum AcquireOutcome {
    /// A seat was landed; siblings were cancelled.
    Acquired { seat: String, attempts: u32 },
    /// Every candidate ended without success.
    Exhausted { reports: Vec<SeatReport> },
    /// Re-authentication failed; the whole task is over.
    ReauthFailed { reports: Vec<SeatReport> },
}

impl AcquireOutcome {
    pub fn is_acquired(&self) -> bool {
        matches!(self, AcquireOutcome::Acquired { .. })
    }
}

/// Canonical form of a seat id: leading zeros dropped, whitespace trimmed.
/// The vendor treats "045" and "45" as the same seat, so both collapse to
/// one candidate.
pub fn normalize_seat(seat: &str) -> String {
    let trimmed = seat.trim().trim_start_matches('0');
    if trimmed.is_empty() {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Normalize and dedupe a candidate list, preserving first-seen order.
pub fn normalize_candidates(seats: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(seats.len());
    for seat in seats {
        let canonical = normalize_seat(seat);
        if !out.contains(&canonical) {
            out.push(canonical);
        }
    }
    out
}

/// Runs one task: one machine per candidate seat, first success wins.
pub struct AcquisitionScheduler<T: VendorApi> {
    pub api: Arc<T>,
    pub guard: Arc<SessionGuard<T>>,
    pub negotiator: Arc<Negotiator>,
    pub classifier: Arc<Classifier>,
    pub challenge: Option<Arc<ChallengeBroker>>,
    pub policy: AttemptPolicy,
    /// Global in-flight cap, shared across tasks and users. Unbounded
    /// fan-out trips the upstream rate limiter, which just feeds back into
    /// the busy outcome.
    pub concurrency: Arc<Semaphore>,
    pub deadline: Instant,
}

impl<T: VendorApi> AcquisitionScheduler<T> {
    /// Race every candidate seat to the first success.
    ///
    /// On success the siblings are told to stop; calls already in flight
    /// drain and their results are discarded. A lost session cancels the
    /// run the same way, but reports as [`AcquireOutcome::ReauthFailed`].
    pub async fn acquire(&self, spec: SubmitSpec, seats: &[String]) -> AcquireOutcome {
        let candidates = normalize_candidates(seats);
        let spec = Arc::new(spec);
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let mut machines = JoinSet::new();

        for seat in candidates {
            let machine = AttemptMachine {
                api: self.api.clone(),
                guard: self.guard.clone(),
                negotiator: self.negotiator.clone(),
                classifier: self.classifier.clone(),
                challenge: self.challenge.clone(),
                policy: self.policy.clone(),
                deadline: self.deadline,
                cancel: cancel_rx.clone(),
            };
            let spec = spec.clone();
            let limiter = self.concurrency.clone();
            machines.spawn(async move {
                let _permit = limiter.acquire_owned().await.expect("semaphore closed");
                machine.run(&spec, seat).await
            });
        }
        drop(cancel_rx);

        let mut winner: Option<SeatReport> = None;
        let mut session_lost = false;
        let mut reports = Vec::new();

        while let Some(joined) = machines.join_next().await {
            let Ok(report) = joined else { continue };
            match report.verdict {
                AttemptVerdict::Succeeded if winner.is_none() => {
                    let _ = cancel_tx.send(true);
                    winner = Some(report);
                }
                AttemptVerdict::SessionLost => {
                    session_lost = true;
                    let _ = cancel_tx.send(true);
                    reports.push(report);
                }
                _ => reports.push(report),
            }
        }

        if let Some(report) = winner {
            AcquireOutcome::Acquired {
                seat: report.seat,
                attempts: report.attempts,
            }
        } else if session_lost {
            AcquireOutcome::ReauthFailed { reports }
        } else {
            AcquireOutcome::Exhausted { reports }
        }
    }
}
