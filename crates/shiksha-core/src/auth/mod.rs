//! Login by one-time code.
//!
//! - `AuthFlow`: the two-step contact/code form, independent of any UI
//! - `Session`: the local record of a completed login, with its cookie
//! - `validate`: contact and code checks, plus masking for display
//!
//! The server owns the real session; the local copy lapses after 30 days.

pub mod flow;
pub mod session;
pub mod validate;

pub use flow::{
    AuthBackend, AuthError, AuthFlow, AuthStep, AutoSubmit, Focus, InlineMessage, MessageKind,
    AUTO_SUBMIT_DELAY, MESSAGE_TTL,
};
pub use session::{Session, SessionData};
pub use validate::{mask_contact, sanitize_code, validate_code, validate_contact, CODE_LENGTH};
