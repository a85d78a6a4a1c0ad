#![deny(missing_docs)]
#![deny(missing_copy_implementations)]
#![deny(trivial_casts)]
#![deny(trivial_numeric_casts)]
#![deny(unused_import_braces)]
#![deny(unused_qualifications)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(rustdoc::private_intra_doc_links)]

//! This crate implements a small client for the Spoolman filament inventory
//! api.

mod info;
mod spool;

use std::time::Duration;

use anyhow::Result;
pub use info::{Health, Info};
pub use spool::{Filament, Spool, SpoolUse, Vendor};

/// Client is a handle to a Spoolman instance.
#[derive(Clone, Debug)]
pub struct Client {
    pub(crate) url_base: String,
    pub(crate) client: reqwest::Client,
}

impl Client {
    /// Create a new Client for the Spoolman instance at `url_base`, e.g.
    /// `http://spoolman.local:7912`.
    ///
    /// With `verify_tls` unset, invalid certificates are accepted, which is
    /// what self-hosted instances behind a self-signed proxy need.
    pub fn new(url_base: &str, verify_tls: bool, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(!verify_tls)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            url_base: url_base.trim_end_matches('/').to_owned(),
            client,
        })
    }

    pub(crate) fn route(&self, route: &str) -> String {
        format!("{}/api/v1/{}", self.url_base, route)
    }
}
