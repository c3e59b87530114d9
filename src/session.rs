//! Authenticated-session ownership and re-login.
//!
//! One [`SessionGuard`] exclusively owns the session for one credential
//! identity; the attempt machines that share it hold it behind an `Arc` and
//! never copy cookie state. Re-authentication is serialized through the
//! guard's mutex: the first machine to report an expired session performs
//! the re-login, siblings observe the bumped generation and simply continue.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Mutex;

use crate::protocol;
use crate::vendor::{VendorApi, VendorError};

/// A session is re-authenticated at most this many times per run; expiring
/// again afterwards is treated as a credential problem, not a blip.
const MAX_RELOGINS: u32 = 1;

#[derive(Debug, Clone)]
pub struct Credential {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Error)]
pub enum SessionError {
    /// The vendor rejected the credential pair at login.
    #[error("login rejected: {0}")]
    LoginRejected(String),

    /// Re-authentication failed or the session expired repeatedly; fatal
    /// for every attempt sharing this session.
    #[error("re-authentication failed: {0}")]
    ReauthFailed(String),

    #[error(transparent)]
    Vendor(#[from] VendorError),
}

struct GuardState {
    /// Bumped on every successful re-login. Machines capture the value at
    /// cycle start and hand it back when reporting expiry, so a re-login
    /// that already happened is never repeated.
    generation: u64,
    relogins: u32,
    live: bool,
}

pub struct SessionGuard<T: VendorApi> {
    api: Arc<T>,
    credential: Credential,
    state: Mutex<GuardState>,
}

impl<T: VendorApi> SessionGuard<T> {
    pub fn new(api: Arc<T>, credential: Credential) -> Self {
        Self {
            api,
            credential,
            state: Mutex::new(GuardState {
                generation: 0,
                relogins: 0,
                live: false,
            }),
        }
    }

    pub fn username(&self) -> &str {
        &self.credential.username
    }

    async fn perform_login(&self) -> Result<(), SessionError> {
        let enc_user = protocol::encrypt_credential(&self.credential.username);
        let enc_pass = protocol::encrypt_credential(&self.credential.password);
        let reply = self.api.login(&enc_user, &enc_pass).await?;
        if !reply.status {
            return Err(SessionError::LoginRejected(
                reply.msg2.unwrap_or_else(|| "unknown login error".to_string()),
            ));
        }
        Ok(())
    }

    /// Authenticate unconditionally. Used at startup, before the first wave.
    pub async fn login(&self) -> Result<(), SessionError> {
        let mut state = self.state.lock().await;
        self.perform_login().await?;
        state.live = true;
        Ok(())
    }

    /// Authenticate only if no live session exists yet.
    pub async fn ensure_valid(&self) -> Result<(), SessionError> {
        let mut state = self.state.lock().await;
        if state.live {
            return Ok(());
        }
        self.perform_login().await?;
        state.live = true;
        Ok(())
    }

    /// Current session generation, captured by machines at cycle start.
    pub async fn generation(&self) -> u64 {
        self.state.lock().await.generation
    }

    /// Report an expired session observed at `observed_generation` and wait
    /// for a usable session.
    ///
    /// If a sibling already re-authenticated since the caller captured its
    /// generation, the current generation is returned without another
    /// login. Otherwise one re-login is performed; failure, or expiring
    /// beyond the per-run budget, escalates to
    /// [`SessionError::ReauthFailed`].
    pub async fn revalidate(&self, observed_generation: u64) -> Result<u64, SessionError> {
        let mut state = self.state.lock().await;
        if state.generation != observed_generation {
            return Ok(state.generation);
        }
        if state.relogins >= MAX_RELOGINS {
            state.live = false;
            return Err(SessionError::ReauthFailed(
                "session expired again after re-login".to_string(),
            ));
        }
        state.relogins += 1;
        match self.perform_login().await {
            Ok(()) => {
                state.generation += 1;
                state.live = true;
                Ok(state.generation)
            }
            Err(e) => {
                state.live = false;
                Err(SessionError::ReauthFailed(e.to_string()))
            }
        }
    }
}
