//! Paginated list fetching.

use tracing::{debug, info, instrument};

use listmirror_core::cancel::CancelFlag;
use listmirror_core::config::SharePointSettings;
use listmirror_core::error::{SyncError, SyncResult};
use listmirror_core::record::TabularResult;

use crate::client::SharePointClient;
use crate::normalize::normalize_item;

/// Walks a paginated list producing a unified tabular result.
///
/// The whole list is accumulated in memory before any write begins; a
/// failed page discards everything fetched so far (no partial commit of
/// fetched-but-unwritten data).
#[derive(Debug)]
pub struct ListFetcher {
    settings: SharePointSettings,
    client: SharePointClient,
}

impl ListFetcher {
    /// Creates a new fetcher for the configured list.
    pub fn new(settings: SharePointSettings, client: SharePointClient) -> Self {
        Self { settings, client }
    }

    /// Initial request URL for the list's items collection.
    fn items_url(&self) -> String {
        let mut url = format!(
            "{}/_api/web/lists/GetByTitle('{}')/items",
            self.client.site_url(),
            urlencoding::encode(&self.settings.list_name)
        );
        if let Some(page_size) = self.settings.page_size {
            url.push_str(&format!("?$top={page_size}"));
        }
        url
    }

    /// Fetches every page of the configured list.
    ///
    /// An empty list yields an explicitly empty [`TabularResult`], which
    /// is a success distinct from an error. Cancellation is observed
    /// between pages.
    #[instrument(skip(self, cancel), fields(list = %self.settings.list_name))]
    pub async fn fetch(&self, cancel: &CancelFlag) -> SyncResult<TabularResult> {
        let url = self.items_url();
        let mut result = TabularResult::new();

        self.client
            .get_paginated(&url, cancel, |items| {
                debug!("processing page with {} items", items.len());
                for item in &items {
                    result.push(normalize_item(item));
                }
                Ok(())
            })
            .await
            .map_err(|e| match e {
                // Cancellation and auth failures keep their own kind; any
                // other failure aborts the fetch as a fetch error.
                SyncError::Cancelled | SyncError::Authentication { .. } => e,
                other => SyncError::fetch(other.to_string()),
            })?;

        info!("fetched {} records from list", result.len());
        Ok(result)
    }
}
