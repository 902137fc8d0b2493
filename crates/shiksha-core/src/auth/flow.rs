//! Two-step login: request a code for a contact, then verify it.
//!
//! `AuthFlow` owns the form state (step, inputs, focus, inline message) so
//! any front end can drive it. Inputs are validated before any network
//! call. Login attempts made while offline are recorded for later sync.

use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::validate::{sanitize_code, validate_code, validate_contact, CODE_LENGTH};
use crate::api::{ApiClient, ApiError, MessageResponse, VerifyResponse};
use crate::models::{now_millis, OfflineAuthAttempt};
use crate::store::Store;

/// Inline messages disappear after this long.
pub const MESSAGE_TTL: Duration = Duration::from_secs(5);

/// Delay between the sixth digit and automatic verification.
pub const AUTO_SUBMIT_DELAY: Duration = Duration::from_millis(500);

const CODE_SENT: &str = "OTP sent successfully! Check your messages.";
const LOGIN_OK: &str = "Login successful! Redirecting...";

#[async_trait]
pub trait AuthBackend: Send + Sync {
    async fn send_code(&self, contact: &str) -> Result<MessageResponse, ApiError>;
    async fn verify_code(&self, contact: &str, code: &str) -> Result<VerifyResponse, ApiError>;
}

#[async_trait]
impl AuthBackend for ApiClient {
    async fn send_code(&self, contact: &str) -> Result<MessageResponse, ApiError> {
        ApiClient::send_code(self, contact).await
    }

    async fn verify_code(&self, contact: &str, code: &str) -> Result<VerifyResponse, ApiError> {
        ApiClient::verify_code(self, contact, code).await
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Please enter a valid mobile number or email address")]
    InvalidContact,

    #[error("Please enter a valid 6-digit OTP")]
    InvalidCode,

    #[error("You are offline. Please connect to the internet to complete login.")]
    Offline,

    #[error("{0}")]
    Rejected(String),

    #[error("Not available while {0:?}")]
    WrongStep(AuthStep),

    #[error("Network error. Please check your connection and try again.")]
    Api(#[source] ApiError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStep {
    AwaitingContact,
    AwaitingCode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    Contact,
    Code,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Error,
    Success,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineMessage {
    pub kind: MessageKind,
    pub text: String,
    shown_at: Instant,
}

impl InlineMessage {
    pub fn is_visible(&self, now: Instant) -> bool {
        now < self.shown_at + MESSAGE_TTL
    }
}

/// A scheduled verification. Stale once newer input arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutoSubmit {
    generation: u64,
    due: Instant,
}

pub struct AuthFlow<B> {
    backend: B,
    store: Option<Store>,
    step: AuthStep,
    contact: String,
    code: String,
    focus: Focus,
    message: Option<InlineMessage>,
    generation: u64,
}

impl<B: AuthBackend> AuthFlow<B> {
    /// `store` receives offline login attempts; `None` drops them.
    pub fn new(backend: B, store: Option<Store>) -> Self {
        Self {
            backend,
            store,
            step: AuthStep::AwaitingContact,
            contact: String::new(),
            code: String::new(),
            focus: Focus::Contact,
            message: None,
            generation: 0,
        }
    }

    pub fn step(&self) -> AuthStep {
        self.step
    }

    pub fn focus(&self) -> Focus {
        self.focus
    }

    pub fn contact(&self) -> &str {
        &self.contact
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    /// The inline message, unless it has been dismissed by timeout.
    pub fn message(&self) -> Option<&InlineMessage> {
        self.message.as_ref().filter(|m| m.is_visible(Instant::now()))
    }

    fn show(&mut self, kind: MessageKind, text: impl Into<String>) {
        self.message = Some(InlineMessage {
            kind,
            text: text.into(),
            shown_at: Instant::now(),
        });
    }

    fn fail(&mut self, error: AuthError) -> AuthError {
        self.show(MessageKind::Error, error.to_string());
        error
    }

    // ===== Step 1: contact =====

    pub async fn submit_contact(&mut self, contact: &str) -> Result<(), AuthError> {
        if self.step != AuthStep::AwaitingContact {
            return Err(AuthError::WrongStep(self.step));
        }
        let contact = contact.trim();
        if !validate_contact(contact) {
            return Err(self.fail(AuthError::InvalidContact));
        }

        match self.backend.send_code(contact).await {
            Ok(_) => {
                info!("Verification code requested");
                self.contact = contact.to_string();
                self.code.clear();
                self.step = AuthStep::AwaitingCode;
                self.focus = Focus::Code;
                self.show(MessageKind::Success, CODE_SENT);
                Ok(())
            }
            Err(e) => {
                let error = self.classify(contact, e).await;
                Err(self.fail(error))
            }
        }
    }

    // ===== Step 2: code =====

    /// Accept raw code input. Returns a pending auto-submit once six digits
    /// are present; any earlier pending auto-submit is cancelled.
    pub fn input_code(&mut self, raw: &str) -> Option<AutoSubmit> {
        self.code = sanitize_code(raw);
        self.generation += 1;
        (self.code.len() == CODE_LENGTH).then(|| AutoSubmit {
            generation: self.generation,
            due: Instant::now() + AUTO_SUBMIT_DELAY,
        })
    }

    pub fn is_pending(&self, auto: &AutoSubmit) -> bool {
        auto.generation == self.generation && self.step == AuthStep::AwaitingCode
    }

    /// Wait out the debounce and verify, unless superseded. `None` means the
    /// auto-submit was cancelled.
    pub async fn auto_submit(
        &mut self,
        auto: AutoSubmit,
    ) -> Option<Result<VerifyResponse, AuthError>> {
        tokio::time::sleep_until(auto.due).await;
        if !self.is_pending(&auto) {
            debug!("Auto-submit superseded");
            return None;
        }
        Some(self.verify().await)
    }

    pub async fn verify(&mut self) -> Result<VerifyResponse, AuthError> {
        if self.step != AuthStep::AwaitingCode {
            return Err(AuthError::WrongStep(self.step));
        }
        // Consumes any pending auto-submit.
        self.generation += 1;

        if !validate_code(&self.code) {
            return Err(self.fail(AuthError::InvalidCode));
        }

        let contact = self.contact.clone();
        match self.backend.verify_code(&contact, &self.code).await {
            Ok(response) => {
                info!(new_user = response.new_user, "Login verified");
                self.show(MessageKind::Success, LOGIN_OK);
                Ok(response)
            }
            Err(e) => {
                let error = self.classify(&contact, e).await;
                if matches!(error, AuthError::Rejected(_)) {
                    self.code.clear();
                    self.focus = Focus::Code;
                }
                Err(self.fail(error))
            }
        }
    }

    /// Return to the contact step, discarding the code.
    pub fn back(&mut self) {
        if self.step == AuthStep::AwaitingCode {
            self.step = AuthStep::AwaitingContact;
            self.code.clear();
            self.focus = Focus::Contact;
            self.generation += 1;
        }
    }

    async fn classify(&mut self, contact: &str, error: ApiError) -> AuthError {
        if error.is_offline() {
            self.record_offline_attempt(contact).await;
            return AuthError::Offline;
        }
        match error {
            ApiError::Rejected(message)
            | ApiError::NotFound(message)
            | ApiError::ServerError(message)
                if !message.is_empty() =>
            {
                AuthError::Rejected(message)
            }
            other => AuthError::Api(other),
        }
    }

    async fn record_offline_attempt(&self, contact: &str) {
        let Some(store) = &self.store else {
            return;
        };
        let attempt = OfflineAuthAttempt::login(contact, now_millis());
        if let Err(e) = store.record_offline_auth_attempt(attempt).await {
            warn!(error = %e, "Failed to record offline login attempt");
        }
    }
}
