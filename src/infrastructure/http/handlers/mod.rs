//! HTTP Handlers

mod chat;
mod entity;
mod ping;
mod websocket;

pub use chat::*;
pub use entity::*;
pub use ping::*;
pub use websocket::*;
