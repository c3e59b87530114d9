//! Maps raw server replies to retry-policy outcomes.
//!
//! The vendor reports everything as HTTP 200 with a `success` flag and a
//! free-text message, and the message phrasing has drifted across revisions.
//! Classification is therefore table-driven: an ordered list of phrase
//! families, each mapped to one [`Outcome`]. New vendor phrasing is added as
//! a rule (built-in or from the config file), not as control flow.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The classified result of one submission attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// The reservation was accepted.
    Success,
    /// Window is open but contention is high; retry after the long fixed wait
    /// with fresh material.
    RetryableBusy,
    /// The booking window has not opened yet; retry after a short jittered
    /// wait without re-negotiating.
    RetryableNotYetOpen,
    /// Unrecognized reply; retried on a stricter budget.
    RetryableUnknown,
    /// Seat taken, invalid, or out of policy; never retried for this seat.
    TerminalFailure,
    /// The session cookie is no longer accepted; escalates to re-login.
    SessionExpired,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Success => write!(f, "SUCCESS"),
            Outcome::RetryableBusy => write!(f, "RETRYABLE_BUSY"),
            Outcome::RetryableNotYetOpen => write!(f, "RETRYABLE_NOT_YET_OPEN"),
            Outcome::RetryableUnknown => write!(f, "RETRYABLE_UNKNOWN"),
            Outcome::TerminalFailure => write!(f, "TERMINAL_FAILURE"),
            Outcome::SessionExpired => write!(f, "SESSION_EXPIRED"),
        }
    }
}

/// One phrase family: any contained phrase maps the reply to `outcome`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub phrases: Vec<String>,
    pub outcome: Outcome,
}

/// Ordered substring-matching classifier over server reply messages.
#[derive(Debug, Clone)]
pub struct Classifier {
    rules: Vec<Rule>,
}

impl Default for Classifier {
    /// The phrase families observed in vendor traffic so far. Earlier rules
    /// win, so session markers are checked before the broader failure
    /// phrases.
    fn default() -> Self {
        let rule = |phrases: &[&str], outcome| Rule {
            phrases: phrases.iter().map(|p| (*p).to_string()).collect(),
            outcome,
        };
        Self {
            rules: vec![
                rule(
                    &["用户登录", "请先登录", "登录失效", "未登录"],
                    Outcome::SessionExpired,
                ),
                rule(
                    &["未到开放时间", "尚未开放", "预约时间未到"],
                    Outcome::RetryableNotYetOpen,
                ),
                rule(
                    &["人数过多", "请稍后再试", "操作过于频繁", "系统繁忙"],
                    Outcome::RetryableBusy,
                ),
                rule(
                    &[
                        "已被预约",
                        "不可预约",
                        "座位不存在",
                        "超出可预约",
                        "不在预约时间段",
                        "超过可预约天数",
                    ],
                    Outcome::TerminalFailure,
                ),
            ],
        }
    }
}

impl Classifier {
    /// Append drift rules loaded from configuration. Built-in rules keep
    /// priority; extras are consulted only when nothing built-in matched.
    pub fn with_extra_rules(mut self, extra: Vec<Rule>) -> Self {
        self.rules.extend(extra);
        self
    }

    /// Classify one submission reply.
    ///
    /// The explicit success flag wins outright. Otherwise the message is
    /// matched against each phrase family in order; anything unmatched is
    /// [`Outcome::RetryableUnknown`] — never silently a success or a
    /// terminal failure.
    pub fn classify(&self, success: bool, message: &str) -> Outcome {
        if success {
            return Outcome::Success;
        }
        for rule in &self.rules {
            if rule.phrases.iter().any(|p| message.contains(p.as_str())) {
                return rule.outcome;
            }
        }
        Outcome::RetryableUnknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_flag_wins() {
        let c = Classifier::default();
        assert_eq!(c.classify(true, ""), Outcome::Success);
        // Even a scary message cannot override the flag.
        assert_eq!(c.classify(true, "人数过多"), Outcome::Success);
    }

    #[test]
    fn each_family_maps_to_one_outcome() {
        let c = Classifier::default();
        assert_eq!(c.classify(false, "预约失败，人数过多"), Outcome::RetryableBusy);
        assert_eq!(
            c.classify(false, "未到开放时间，请稍候"),
            Outcome::RetryableNotYetOpen
        );
        assert_eq!(
            c.classify(false, "该座位已被预约"),
            Outcome::TerminalFailure
        );
        assert_eq!(c.classify(false, "用户登录"), Outcome::SessionExpired);
    }

    #[test]
    fn unmatched_text_is_retryable_unknown() {
        let c = Classifier::default();
        let outcome = c.classify(false, "totally novel vendor phrasing");
        assert_eq!(outcome, Outcome::RetryableUnknown);
        assert_ne!(outcome, Outcome::Success);
        assert_ne!(outcome, Outcome::TerminalFailure);
    }

    #[test]
    fn empty_message_is_retryable_unknown() {
        let c = Classifier::default();
        assert_eq!(c.classify(false, ""), Outcome::RetryableUnknown);
    }

    #[test]
    fn session_markers_beat_later_families() {
        // "请先登录，人数过多" contains both a session and a busy phrase;
        // the session rule is earlier in the table and must win.
        let c = Classifier::default();
        assert_eq!(
            c.classify(false, "请先登录，人数过多"),
            Outcome::SessionExpired
        );
    }

    #[test]
    fn extra_rules_extend_the_table() {
        let c = Classifier::default().with_extra_rules(vec![Rule {
            phrases: vec!["maintenance window".into()],
            outcome: Outcome::RetryableBusy,
        }]);
        assert_eq!(
            c.classify(false, "down for maintenance window"),
            Outcome::RetryableBusy
        );
        // Built-ins still apply.
        assert_eq!(c.classify(false, "用户登录"), Outcome::SessionExpired);
    }

    #[test]
    fn outcome_display() {
        assert_eq!(Outcome::Success.to_string(), "SUCCESS");
        assert_eq!(Outcome::RetryableBusy.to_string(), "RETRYABLE_BUSY");
        assert_eq!(Outcome::SessionExpired.to_string(), "SESSION_EXPIRED");
    }

    #[test]
    fn outcome_serde_roundtrip() {
        let json = serde_json::to_string(&Outcome::RetryableNotYetOpen).unwrap();
        assert_eq!(json, r#""retryable_not_yet_open""#);
        let back: Outcome = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Outcome::RetryableNotYetOpen);
    }
}
