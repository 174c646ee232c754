#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Resumable network fetcher and package manifest cache for AddressKit.
//!
//! A quarterly G-NAF release is a multi-gigabyte zip behind a registry
//! manifest. This crate covers the network half of an ingestion run:
//!
//! - [`download::fetch_file`] streams the archive to disk, resuming
//!   partial downloads with `Range` requests and retrying transient
//!   failures with jittered exponential backoff.
//! - [`manifest::fetch_package`] resolves the current archive URL from
//!   the registry manifest through a file-backed cache with
//!   fresh/stale/expired tiers.

pub mod backoff;
pub mod cache;
pub mod download;
pub mod manifest;
pub mod progress;

/// Default user agent for all AddressKit HTTP requests.
pub const USER_AGENT: &str = "addresskit/0.1";

/// Builds the [`reqwest::Client`] used by the fetcher.
///
/// Redirects are disabled: the resumable fetcher follows `3xx`
/// responses itself so that `Range` headers and retry accounting
/// survive the hop.
///
/// # Errors
///
/// Returns the underlying [`reqwest::Error`] if the TLS backend cannot
/// be initialised.
pub fn build_client() -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .redirect(reqwest::redirect::Policy::none())
        .build()
}
