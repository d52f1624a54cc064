pub mod models;
pub mod senders;
pub mod service;

pub use models::{ChannelConfig, ChannelSettings};
pub use service::{NotificationError, NotificationService, Notifier};
