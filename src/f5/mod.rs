pub mod client;
pub mod session;
pub mod transport;
pub mod types;

pub use client::F5Client;
pub use session::{Acquired, Endpoint, SessionManager, Token, TokenSource};
pub use transport::{Auth, RetryPolicy, Transport};
