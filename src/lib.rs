//! # takayasu-lit
//!
//! Literature pipeline for Takayasu arteritis research.
//!
//! ## Modules
//!
//! - [`europepmc`] - Europe PMC search client with pagination
//! - [`annotate`] - Keyword flags and age ranges from abstracts
//! - [`cluster`] - TF-IDF, LDA topics and k-means clusters
//! - [`dashboard`] - Filters, aggregates and the HTTP dashboard
//! - [`paper`] - Row types of each pipeline stage
//! - [`table`] - CSV reading and writing
//! - [`config`] - Data layout and clustering parameters
//! - [`error`] - Custom error types
//!
//! ## Usage
//!
//! ```rust,no_run
//! use takayasu_lit::europepmc::{EuropePmcClient, FetchOptions};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = EuropePmcClient::new(FetchOptions::default())?;
//!     let result = client.fetch_all().await?;
//!     println!("Fetched {} papers with abstracts", result.papers.len());
//!     Ok(())
//! }
//! ```

pub mod annotate;
pub mod cluster;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod europepmc;
pub mod paper;
pub mod table;

pub use error::{LitError, Result};
