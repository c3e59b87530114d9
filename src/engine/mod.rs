mod attempt;
mod scheduler;

pub use attempt::{
    Attempt, AttemptMachine, AttemptPolicy, AttemptState, AttemptVerdict, SeatReport, Step,
    SubmitSpec, Wait, plan,
};
pub use scheduler::{AcquireOutcome, AcquisitionScheduler, normalize_candidates, normalize_seat};
