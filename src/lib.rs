pub mod bot;
pub mod config;
pub mod monitor;
pub mod notifications;
pub mod probe;
pub mod registry;
pub mod state;
pub mod version;

#[cfg(test)]
pub(crate) mod testing;
