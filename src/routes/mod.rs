pub mod auth;
pub mod bookings;
pub mod health;
pub mod stadiums;
pub mod stats;
pub mod teams;
