//! # Enlist (account sign-up service)
//!
//! `enlist` accepts an email/password pair over HTTP, validates it, hashes the
//! password with Argon2id and persists a new account, rejecting duplicate emails.
//!
//! ## Registration
//!
//! `POST /signup` runs the credential through three stages and stops at the first
//! failure: validation, hashing, then the account store. The store performs an
//! existence check before inserting, but the unique index on `accounts.email` is
//! what actually guarantees one account per email; a unique violation raised by the
//! insert is reported as a duplicate, exactly like the fast-path check.
//!
//! ## Request logging
//!
//! Every request goes through the request-log middleware, which captures the request
//! body, mirrors the response body as it is streamed to the client and emits one
//! structured record per request once the response is complete.

pub mod cli;
pub mod enlist;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};
