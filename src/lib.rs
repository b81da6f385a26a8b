//! # Sentinela (SecureTeam Access client)
//!
//! `sentinela` is the command line client for the SecureTeam Access
//! identity backend. It establishes and maintains an authenticated session
//! and authorizes subsequent API calls with it.
//!
//! ## Login flow
//!
//! Login is a strict two-step state machine: primary credentials followed by
//! a mandatory time-based one-time code. Each attempt is bound to a fresh
//! PKCE verifier/challenge pair so a captured challenge can never be
//! replayed across attempts. The issued bearer token is persisted in a
//! single-slot session store and attached to every authenticated request
//! together with a stable device identifier.
//!
//! ## Session expiry
//!
//! The API client reports a 401 as a distinct session-expiry condition; the
//! driving layer clears the stored token and returns the state machine to
//! `Unauthenticated`. Token authenticity is never checked locally - the
//! backend rules on every use.

pub mod auth;
pub mod cli;
pub mod client;
pub mod error;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};
