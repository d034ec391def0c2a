//! Persistence proxy
//!
//! Thin asynchronous facade over the background collaborator for the two
//! pieces of state that survive a reload: the overlay collapsed flag and the
//! last-seen version marker. The engine itself persists nothing.

use crate::background::{BackgroundChannel, BackgroundClient};
use crate::models::VersionNotice;
use crate::page::HostPage;
use anyhow::Result;
use tracing::debug;

pub struct PersistenceProxy<'a, B> {
    client: &'a BackgroundClient<B>,
}

impl<'a, B: BackgroundChannel> PersistenceProxy<'a, B> {
    pub fn new(client: &'a BackgroundClient<B>) -> Self {
        Self { client }
    }

    pub async fn collapsed_state(&self, page: &dyn HostPage) -> Result<bool> {
        self.client.get_collapsed_state(page).await
    }

    pub async fn store_collapsed_state(&self, page: &dyn HostPage, is_collapsed: bool) -> Result<()> {
        self.client.set_collapsed_state(page, is_collapsed).await
    }

    /// Compare the persisted version marker against `current` and advance it.
    /// Returns `None` when the versions already match.
    pub async fn check_version_notification(
        &self,
        page: &dyn HostPage,
        current: &str,
    ) -> Result<Option<VersionNotice>> {
        let previous = self.client.get_previous_version(page).await?;
        if previous.as_deref() == Some(current) {
            return Ok(None);
        }

        self.client.set_current_version(page, current).await?;
        debug!(previous = ?previous, current, "Version marker advanced");

        Ok(Some(VersionNotice {
            previous,
            current: current.to_string(),
        }))
    }
}
