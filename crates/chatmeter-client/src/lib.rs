//! Chatmeter Client SDK.
//!
//! Typed async client for the chatmeter REST API: accounts and credits,
//! subscriptions, metered chats and the admin surface.
//!
//! # Example
//!
//! ```no_run
//! use chatmeter_client::{ChatRequest, ChatmeterClient};
//!
//! # async fn example() -> Result<(), chatmeter_client::ClientError> {
//! let client = ChatmeterClient::new("http://chatmeter:8080")?;
//! let grant = client.login("alice", "secret").await?;
//! let client = client.with_token(grant.access_token);
//!
//! let receipt = client
//!     .send_chat(&ChatRequest {
//!         model_name: "gpt-3.5-turbo".to_string(),
//!         input_tokens: Some(1000),
//!         output_tokens: Some(500),
//!         ..ChatRequest::default()
//!     })
//!     .await?;
//!
//! println!("Charged {}, balance {}", receipt.chat.cost_formatted, receipt.balance_formatted);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

mod client;
mod error;
mod types;

pub use client::{ChatmeterClient, ClientOptions};
pub use error::ClientError;
pub use types::*;
