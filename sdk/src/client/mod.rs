//! HTTP client for the exchange REST API.
//!
//! A thin signed-request layer: generic `get`/`post`/`put`/`patch`/`delete`
//! calls plus a few typed wrappers.
//!
//! # Example
//!
//! ```rust,ignore
//! use hitbtc_sdk::client::{ClientConfig, HttpClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = HttpClient::new(ClientConfig::from_env())?;
//!
//!     let book = client.get_order_book("ETHBTC", Some(10)).await?;
//!     println!("Best bid: {:?}", book.best_bid());
//!
//!     for balance in client.get_spot_balances().await? {
//!         println!("{}", balance);
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod http;

pub use config::ClientConfig;
pub use error::ClientError;
pub use http::HttpClient;
