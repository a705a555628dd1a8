
pub mod bypass;
pub mod config;
pub mod controller;
pub mod notice;
pub mod platform;
pub mod resolver;
pub mod throttle;

#[cfg(windows)]
pub mod hook;
#[cfg(windows)]
pub mod win_apis;

#[cfg(test)]
mod testing;
