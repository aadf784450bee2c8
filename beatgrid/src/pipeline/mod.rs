pub mod pattern;
pub mod persistence;
pub mod session;
