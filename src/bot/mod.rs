/// Channel post to discussion root cache
pub mod discussion;
/// Long-polling update listener
pub mod listener;
/// Telegram message conversion
pub mod media;
/// Telegram calls with retry
pub mod resilient;
/// Startup wiring
pub mod runner;
/// `Transport` implementation over the Bot API
pub mod transport;

pub use discussion::DiscussionRoots;
pub use runner::{run, StartupError};
pub use transport::TelegramTransport;
