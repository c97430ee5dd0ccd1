//! `stagger-channels`: outbound delivery of composed emails.

pub mod dispatcher;
pub mod error;
pub mod relay;
pub mod types;

pub use dispatcher::{Dispatcher, LogDispatcher};
pub use error::DeliveryError;
pub use relay::HttpRelayDispatcher;
pub use types::OutboundEmail;
