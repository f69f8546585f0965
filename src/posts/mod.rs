pub mod domain;
pub mod repository;
pub mod service;

pub use repository::{DynPostRepository, PostRepository, SqlitePostRepository};
pub use service::PostService;
