pub mod format;
pub mod models;
pub mod senders;
pub mod service;

pub use models::{Notification, Severity};
pub use service::NotificationService;
