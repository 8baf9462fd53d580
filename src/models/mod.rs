//! Data models for platform entities

mod contact;
mod mentor;
mod message;
mod user;

pub use contact::*;
pub use mentor::*;
pub use message::*;
pub use user::*;
