pub mod fanout;
pub mod repository;

pub use fanout::{notify_friends, FanoutError, FanoutReport};
pub use repository::{
    DynNotificationRepository, NotificationRepository, SqliteNotificationRepository,
};
