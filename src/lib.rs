pub mod api;
pub mod commits;
pub mod config;
pub mod console;
pub mod deploy;
pub mod errors;
pub mod history;
pub mod logging;
pub mod reconciler;
pub mod store;
pub mod stream;
pub mod trigger;

#[cfg(test)]
mod testing;

pub use console::{Console, SelectedView};
pub use store::{BuildStore, StoreEvent};
