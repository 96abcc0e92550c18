// src/models/mod.rs
pub mod driver;
pub mod messages;
pub mod ride;
pub mod user;

pub use driver::*;
pub use messages::*;
pub use ride::*;
pub use user::*;
