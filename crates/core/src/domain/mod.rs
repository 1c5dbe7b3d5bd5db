pub mod conversation;
pub mod equipment;
pub mod quote;
pub mod session;
