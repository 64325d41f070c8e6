/// Per-chat link → format → delivery workflow
pub mod controller;
/// Channel membership gate
pub mod gate;
/// Telegram update routing and endpoints
pub mod handlers;
/// Messaging transport seam and its Telegram implementation
pub mod transport;
/// User-facing texts and keyboards
pub mod views;

pub use controller::{ControllerConfig, InteractionController};
pub use handlers::{schema, BotController};
