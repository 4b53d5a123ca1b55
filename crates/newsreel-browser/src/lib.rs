//! Browser automation and session management.
//!
//! This crate provides:
//! - A thin CDP driver over a single browser page
//! - A persisted cookie store (one jar per user profile)
//! - The platform session manager (verify, headless verify, login flow)

pub mod cookies;
pub mod driver;
pub mod error;
pub mod session;

pub use cookies::{CookieRecord, CookieStore};
pub use driver::PlatformBrowser;
pub use error::{BrowserError, BrowserResult};
pub use session::{HeadlessVerification, SessionManager};
