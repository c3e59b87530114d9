//! The per-seat attempt state machine.
//!
//! One machine drives one (task, seat) pair through
//! `Negotiating → Solving → Signing → Submitting → Classifying` cycles until
//! it succeeds, exhausts its budget, hits the deadline, or is cancelled by a
//! sibling's success. Every submission consumes its material: a bounced
//! token or signature is never resent, so `BackingOff` loops back through
//! negotiation whenever the reply says the material is stale.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde::Serialize;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::challenge::ChallengeBroker;
use crate::classify::{Classifier, Outcome};
use crate::negotiate::{NegotiateError, Negotiator, PageMaterial};
use crate::protocol;
use crate::session::SessionGuard;
use crate::vendor::VendorApi;

/// The states of the attempt machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AttemptState {
    Idle,
    Negotiating,
    Solving,
    Signing,
    Submitting,
    Classifying,
    BackingOff,
    Succeeded,
    Abandoned,
}

impl fmt::Display for AttemptState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptState::Idle => write!(f, "IDLE"),
            AttemptState::Negotiating => write!(f, "NEGOTIATING"),
            AttemptState::Solving => write!(f, "SOLVING"),
            AttemptState::Signing => write!(f, "SIGNING"),
            AttemptState::Submitting => write!(f, "SUBMITTING"),
            AttemptState::Classifying => write!(f, "CLASSIFYING"),
            AttemptState::BackingOff => write!(f, "BACKING_OFF"),
            AttemptState::Succeeded => write!(f, "SUCCEEDED"),
            AttemptState::Abandoned => write!(f, "ABANDONED"),
        }
    }
}

/// Retry and backoff tunables for one machine.
#[derive(Debug, Clone)]
pub struct AttemptPolicy {
    /// Submission cycles per seat before giving up.
    pub max_attempts: u32,
    /// Unrecognized replies tolerated before giving up; stricter than the
    /// overall budget because unknown phrasing may mean the table is stale.
    pub max_unknown: u32,
    /// Fixed wait after a high-contention reply. Material is re-fetched
    /// afterwards, so minutes-scale values are fine.
    pub busy_wait: Duration,
    /// Base wait when the window is merely imminent.
    pub short_wait: Duration,
    /// Random extra on top of `short_wait`, so parallel machines desynchronize.
    pub jitter: Duration,
}

impl Default for AttemptPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            max_unknown: 2,
            busy_wait: Duration::from_secs(60),
            short_wait: Duration::from_millis(300),
            jitter: Duration::from_millis(400),
        }
    }
}

impl AttemptPolicy {
    fn short_backoff(&self) -> Duration {
        let jitter_ms = self.jitter.as_millis() as u64;
        let extra = if jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=jitter_ms)
        };
        self.short_wait + Duration::from_millis(extra)
    }
}

/// Which configured wait a backoff uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wait {
    /// The fixed high-contention pause.
    Fixed,
    /// The short jittered pause.
    Short,
}

/// The decision taken after classifying one submission reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Succeed,
    Abandon,
    /// Hand the session to the guard for re-authentication.
    Escalate,
    Backoff {
        wait: Wait,
        /// Whether negotiation and challenge material must be re-fetched
        /// before the next submission.
        refresh: bool,
    },
}

/// Pure transition policy: outcome plus spent budget to next step.
pub fn plan(outcome: Outcome, attempts: u32, unknowns: u32, policy: &AttemptPolicy) -> Step {
    match outcome {
        Outcome::Success => Step::Succeed,
        Outcome::TerminalFailure => Step::Abandon,
        Outcome::SessionExpired => Step::Escalate,
        Outcome::RetryableBusy => {
            if attempts >= policy.max_attempts {
                Step::Abandon
            } else {
                Step::Backoff {
                    wait: Wait::Fixed,
                    refresh: true,
                }
            }
        }
        Outcome::RetryableNotYetOpen => {
            if attempts >= policy.max_attempts {
                Step::Abandon
            } else {
                Step::Backoff {
                    wait: Wait::Short,
                    refresh: false,
                }
            }
        }
        Outcome::RetryableUnknown => {
            if attempts >= policy.max_attempts || unknowns >= policy.max_unknown {
                Step::Abandon
            } else {
                Step::Backoff {
                    wait: Wait::Short,
                    refresh: true,
                }
            }
        }
    }
}

/// Mutable per-seat attempt record.
#[derive(Debug, Clone, Serialize)]
pub struct Attempt {
    pub seat: String,
    pub state: AttemptState,
    pub state_history: Vec<AttemptState>,
    /// Submission cycles spent (negotiation-only failures count too).
    pub attempts: u32,
    pub unknowns: u32,
    pub last_outcome: Option<Outcome>,
}

impl Attempt {
    fn new(seat: String) -> Self {
        Self {
            seat,
            state: AttemptState::Idle,
            state_history: Vec::new(),
            attempts: 0,
            unknowns: 0,
            last_outcome: None,
        }
    }

    fn enter(&mut self, next: AttemptState) {
        self.state_history.push(self.state);
        self.state = next;
    }
}

/// How one machine's run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptVerdict {
    Succeeded,
    Abandoned,
    DeadlineExceeded,
    Cancelled,
    /// Re-authentication failed; fatal for every seat sharing the session.
    SessionLost,
}

/// Final per-seat record handed back to the scheduler.
#[derive(Debug, Clone, Serialize)]
pub struct SeatReport {
    pub seat: String,
    pub verdict: AttemptVerdict,
    pub last_outcome: Option<Outcome>,
    pub attempts: u32,
}

/// Everything fixed about a submission besides the seat.
#[derive(Debug, Clone)]
pub struct SubmitSpec {
    pub room_id: String,
    /// Reservation slot, "HH:MM".
    pub start_time: String,
    pub end_time: String,
    /// Target calendar date, "YYYY-MM-DD".
    pub day: String,
}

enum NegotiationFailure {
    Expired,
    Unavailable,
    Transport,
}

/// Drives one seat to a terminal verdict.
pub struct AttemptMachine<T: VendorApi> {
    pub api: Arc<T>,
    pub guard: Arc<SessionGuard<T>>,
    pub negotiator: Arc<Negotiator>,
    pub classifier: Arc<Classifier>,
    /// `None` runs without the slide challenge, submitting an empty captcha
    /// field the way the web client does when no challenge is shown.
    pub challenge: Option<Arc<ChallengeBroker>>,
    pub policy: AttemptPolicy,
    pub deadline: Instant,
    pub cancel: watch::Receiver<bool>,
}

impl<T: VendorApi> AttemptMachine<T> {
    pub async fn run(mut self, spec: &SubmitSpec, seat: String) -> SeatReport {
        let mut attempt = Attempt::new(seat);
        let mut material: Option<PageMaterial> = None;

        loop {
            if let Some(verdict) = self.interrupted() {
                return finish(attempt, verdict);
            }
            if attempt.attempts >= self.policy.max_attempts {
                attempt.enter(AttemptState::Abandoned);
                return finish(attempt, AttemptVerdict::Abandoned);
            }

            let session_generation = self.guard.generation().await;

            if material.is_none() {
                attempt.enter(AttemptState::Negotiating);
                match self.negotiate(spec, &attempt.seat).await {
                    Ok(fresh) => material = Some(fresh),
                    Err(NegotiationFailure::Expired) => {
                        attempt.last_outcome = Some(Outcome::SessionExpired);
                        if self.guard.revalidate(session_generation).await.is_err() {
                            return finish(attempt, AttemptVerdict::SessionLost);
                        }
                        continue;
                    }
                    Err(NegotiationFailure::Unavailable | NegotiationFailure::Transport) => {
                        attempt.attempts += 1;
                        self.back_off(&mut attempt, self.policy.short_backoff()).await;
                        continue;
                    }
                }
            }

            let captcha = match &self.challenge {
                Some(broker) => {
                    attempt.enter(AttemptState::Solving);
                    match broker.validation_token(self.api.as_ref()).await {
                        Ok(token) => token,
                        Err(_) => {
                            // Rejected or unreachable; the next cycle needs
                            // a fresh challenge either way.
                            broker.invalidate().await;
                            attempt.attempts += 1;
                            self.back_off(&mut attempt, self.policy.short_backoff()).await;
                            continue;
                        }
                    }
                }
                None => String::new(),
            };

            attempt.enter(AttemptState::Signing);
            let Some(page) = material.as_ref() else {
                continue;
            };
            let params = signed_params(spec, &attempt.seat, page, &captcha);

            if let Some(verdict) = self.interrupted() {
                return finish(attempt, verdict);
            }
            attempt.enter(AttemptState::Submitting);
            attempt.attempts += 1;
            let reply = match self.api.submit(&params).await {
                Ok(reply) => reply,
                Err(_) => {
                    // Transport failures follow the strict unknown budget:
                    // the submission may or may not have landed.
                    attempt.unknowns += 1;
                    attempt.last_outcome = Some(Outcome::RetryableUnknown);
                    material = None;
                    if attempt.unknowns >= self.policy.max_unknown {
                        attempt.enter(AttemptState::Abandoned);
                        return finish(attempt, AttemptVerdict::Abandoned);
                    }
                    self.back_off(&mut attempt, self.policy.short_backoff()).await;
                    continue;
                }
            };

            attempt.enter(AttemptState::Classifying);
            let outcome = self.classifier.classify(reply.success, reply.message());
            attempt.last_outcome = Some(outcome);
            if outcome == Outcome::RetryableUnknown {
                attempt.unknowns += 1;
            }

            match plan(outcome, attempt.attempts, attempt.unknowns, &self.policy) {
                Step::Succeed => {
                    attempt.enter(AttemptState::Succeeded);
                    return finish(attempt, AttemptVerdict::Succeeded);
                }
                Step::Abandon => {
                    attempt.enter(AttemptState::Abandoned);
                    return finish(attempt, AttemptVerdict::Abandoned);
                }
                Step::Escalate => {
                    material = None;
                    if let Some(broker) = &self.challenge {
                        broker.invalidate().await;
                    }
                    if self.guard.revalidate(session_generation).await.is_err() {
                        return finish(attempt, AttemptVerdict::SessionLost);
                    }
                }
                Step::Backoff { wait, refresh } => {
                    if refresh {
                        material = None;
                        if let Some(broker) = &self.challenge {
                            broker.invalidate().await;
                        }
                    }
                    let duration = match wait {
                        Wait::Fixed => self.policy.busy_wait,
                        Wait::Short => self.policy.short_backoff(),
                    };
                    self.back_off(&mut attempt, duration).await;
                }
            }
        }
    }

    fn interrupted(&self) -> Option<AttemptVerdict> {
        if *self.cancel.borrow() {
            return Some(AttemptVerdict::Cancelled);
        }
        if Instant::now() >= self.deadline {
            return Some(AttemptVerdict::DeadlineExceeded);
        }
        None
    }

    async fn negotiate(
        &self,
        spec: &SubmitSpec,
        seat: &str,
    ) -> Result<PageMaterial, NegotiationFailure> {
        let html = self
            .api
            .fetch_seat_page(&spec.room_id, seat)
            .await
            .map_err(|_| NegotiationFailure::Transport)?;
        self.negotiator.extract(&html).map_err(|e| match e {
            NegotiateError::SessionExpired => NegotiationFailure::Expired,
            NegotiateError::DataUnavailable(_) => NegotiationFailure::Unavailable,
        })
    }

    /// Wait out a backoff, waking early on cancellation or deadline. The
    /// loop head re-checks both, so waking early is always safe.
    async fn back_off(&mut self, attempt: &mut Attempt, duration: Duration) {
        attempt.enter(AttemptState::BackingOff);
        tokio::select! {
            () = tokio::time::sleep(duration) => {}
            _ = self.cancel.changed() => {}
            () = tokio::time::sleep_until(self.deadline) => {}
        }
    }
}

/// Assemble and sign the submission parameter set. The signature covers
/// every other parameter, so it is computed last and recomputed from
/// scratch each cycle.
fn signed_params(
    spec: &SubmitSpec,
    seat: &str,
    page: &PageMaterial,
    captcha: &str,
) -> Vec<(String, String)> {
    let timestamp = chrono::Utc::now().timestamp_millis();
    let trace = protocol::interaction_trace(timestamp);
    let mut params = vec![
        ("deptIdEnc".to_string(), page.dept_id.clone()),
        ("roomId".to_string(), spec.room_id.clone()),
        ("startTime".to_string(), spec.start_time.clone()),
        ("endTime".to_string(), spec.end_time.clone()),
        ("day".to_string(), spec.day.clone()),
        ("seatNum".to_string(), seat.to_string()),
        ("captcha".to_string(), captcha.to_string()),
        ("token".to_string(), page.token.clone()),
        ("behaviorAnalysis".to_string(), trace),
    ];
    let signature = protocol::sign_params(params.iter().map(|(k, v)| (k.as_str(), v.as_str())));
    params.push(("enc".to_string(), signature));
    params
}

fn finish(attempt: Attempt, verdict: AttemptVerdict) -> SeatReport {
    SeatReport {
        seat: attempt.seat,
        verdict,
        last_outcome: attempt.last_outcome,
        attempts: attempt.attempts,
    }
}
