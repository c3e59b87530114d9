pub mod service;
pub mod vision;

pub use service::{ChallengeBroker, ChallengeError};
pub use vision::{SolveReport, VisionError};
