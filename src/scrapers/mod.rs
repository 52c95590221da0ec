//! Credential-free comment scrapers.
//!
//! # Supported Sources
//!
//! | Source | Module | Method | Notes |
//! |--------|--------|--------|-------|
//! | YouTube | [`youtube`] | Watch page + innertube continuations | Same endpoints the web client uses; replies included |
//!
//! Each scraper exposes a lazy comment stream and a `fetch_comments_*`
//! helper that drains it with an optional early-exit cap. Failures are
//! fatal: nothing is skipped and nothing is retried.

pub mod youtube;
