//! HTTP client for the Remnawave VPN panel API.

mod client;
pub mod models;

pub use client::RemnawaveClient;
pub use models::{CreateUserRequest, RemnawaveUser, UpdateUserRequest, UserStatus};
