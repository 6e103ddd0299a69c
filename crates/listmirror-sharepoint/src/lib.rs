//! SharePoint source for listmirror.
//!
//! Implements app-only (client credentials) authentication against the
//! SharePoint access-control service and paginated reading of list items
//! via the site REST API.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use listmirror_core::{config::SharePointSettings, CancelFlag};
//! use listmirror_sharepoint::{ListFetcher, SharePointClient, TokenCache};
//!
//! # async fn example(settings: SharePointSettings) -> listmirror_core::SyncResult<()> {
//! let token_cache = Arc::new(TokenCache::new(settings.clone())?);
//! let client = SharePointClient::new(settings.clone(), token_cache)?;
//! let fetcher = ListFetcher::new(settings, client);
//! let result = fetcher.fetch(&CancelFlag::new()).await?;
//! println!("{} records", result.len());
//! # Ok(())
//! # }
//! ```

mod auth;
mod client;
mod fetch;
mod normalize;

pub use auth::TokenCache;
pub use client::{ListPage, SharePointClient};
pub use fetch::ListFetcher;
pub use normalize::normalize_item;
