pub mod auth;
pub mod cli;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod geo;
pub mod map;
pub mod missions;

#[cfg(test)]
pub mod test_support;
