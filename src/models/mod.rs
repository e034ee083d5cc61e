pub mod booking;
pub mod stadium;
pub mod team;
pub mod user;

pub use booking::*;
pub use stadium::*;
pub use team::*;
pub use user::*;
