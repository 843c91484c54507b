//! UseCase 層
//!
//! ビジネスロジックを実装するレイヤー。
//! UI 層と Actor から呼び出され、Domain 層を操作します。

pub mod admission;
pub mod bot;
pub mod error;
pub mod handler;
pub mod rate_limiter;

pub use admission::{AdmitConnectionUseCase, ConnectRequest};
pub use bot::{BotEvent, BotResponder, BotSettings, QuotaExceeded, QuotaGate, detect_bot};
pub use error::{AdmissionError, BotError, HandlerError};
pub use handler::{HandlerRegistry, MessageHandler, RoomContext};
pub use rate_limiter::{RateLimitPolicy, RateLimiter, Throttle};
