pub mod health;
pub mod messages;
pub mod sse;

pub use health::get_healthz;
pub use messages::post_messages;
pub use sse::get_sse;
