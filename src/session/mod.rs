pub mod audit;
pub mod client;
pub mod store;

pub use client::{Credentials, RenewalPolicy, SessionedClient};
pub use store::{Identity, Role, SessionStore};
