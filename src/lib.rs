//! The library code for the `bluesky-feed` deploy hook, which announces the
//! newest post of a static site on Bluesky. A deploy is a straight line of
//! steps, each of which may end it early:
//!
//! 1. Loading the project file and reading post metadata from disk
//!    ([`crate::config`], [`crate::post`])
//! 2. Reading the account credentials from the environment
//!    ([`crate::credentials`])
//! 3. Composing the message and its link facet ([`crate::message`],
//!    [`crate::facet`])
//! 4. Logging in and creating the post record ([`crate::xrpc`])
//!
//! [`crate::deploy`] ties the steps together. Nothing is retried: a failed
//! step is logged and the deploy ends.

#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]

pub mod config;
pub mod credentials;
pub mod deploy;
pub mod facet;
pub mod message;
pub mod post;
pub mod xrpc;
