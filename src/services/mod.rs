pub mod booking;
pub mod stadiums;
pub mod stats;
