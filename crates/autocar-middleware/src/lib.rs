//! `autocar-middleware` – Notification transport
//!
//! Carries operator messages, state changes and the picture stream from the
//! control core to whatever front-end is attached, without the core ever
//! waiting on a consumer.
//!
//! # Modules
//!
//! - [`bus`] – topic-based publish/subscribe bus built on Tokio broadcast
//!   channels.

pub mod bus;

pub use bus::{NotificationBus, Topic, TopicReceiver};
