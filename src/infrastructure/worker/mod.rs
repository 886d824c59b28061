//! Worker Layer - Background Task Processing
//!
//! 实现 SessionReaper，定期关闭空闲的对话会话

mod session_reaper;

pub use session_reaper::{SessionReaper, SessionReaperConfig};
