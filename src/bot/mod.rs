/// Command and message handlers
pub mod handlers;
/// Splitting and sending replies
pub mod messaging;
/// Resilient messaging with automatic retry for Telegram API operations
pub mod resilient;
/// Throttled logging of unauthorized access
pub mod unauthorized_cache;

pub use unauthorized_cache::UnauthorizedCache;
