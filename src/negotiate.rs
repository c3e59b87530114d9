//! Extraction of ephemeral submission material from a seat page.
//!
//! Every submission needs a page token and a department identifier scraped
//! from the seat's reservation page. The vendor has changed the markup for
//! both several times, so each field carries an ordered list of historical
//! patterns; the first match wins. No match is a retryable condition, not a
//! guess.

use regex::Regex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NegotiateError {
    /// The page served a login prompt instead of seat data.
    #[error("session expired: page served a login prompt")]
    SessionExpired,

    /// No known pattern matched the named field.
    #[error("page data unavailable: no pattern matched `{0}`")]
    DataUnavailable(&'static str),
}

/// Ephemeral material scraped from one seat page fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageMaterial {
    pub token: String,
    pub dept_id: String,
}

/// Pattern-priority extractor for seat pages.
pub struct Negotiator {
    token_patterns: Vec<Regex>,
    dept_patterns: Vec<Regex>,
    login_markers: Vec<&'static str>,
}

impl Default for Negotiator {
    fn default() -> Self {
        Self::new()
    }
}

impl Negotiator {
    pub fn new() -> Self {
        let compile = |p: &str| Regex::new(p).expect("invalid extraction pattern");
        Self {
            // Newest markup first.
            token_patterns: vec![
                compile(r#"token\s*=\s*['"]([^'"]+)['"]"#),
                compile(r#"name="token"\s*content="([^"]+)""#),
            ],
            dept_patterns: vec![
                compile(r#"deptIdEnc["']?\s*[:=]\s*["']([^"']+)["']"#),
                compile(r#"fid["']?\s*[:=]\s*["']([^"']+)["']"#),
                compile(r"deptId\s*=\s*(\d+)"),
            ],
            login_markers: vec!["用户登录", "mlogin"],
        }
    }

    /// Extract the page token and department id from fetched page HTML.
    pub fn extract(&self, html: &str) -> Result<PageMaterial, NegotiateError> {
        if self.login_markers.iter().any(|m| html.contains(m)) {
            return Err(NegotiateError::SessionExpired);
        }

        let token = first_capture(&self.token_patterns, html)
            .ok_or(NegotiateError::DataUnavailable("token"))?;
        let dept_id = first_capture(&self.dept_patterns, html)
            .ok_or(NegotiateError::DataUnavailable("deptIdEnc"))?;

        Ok(PageMaterial { token, dept_id })
    }
}

fn first_capture(patterns: &[Regex], html: &str) -> Option<String> {
    patterns
        .iter()
        .find_map(|p| p.captures(html))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}
