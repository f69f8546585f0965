pub mod repository;

pub use repository::{DynUserRepository, SqliteUserRepository, UserRepository};
