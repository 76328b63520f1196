pub mod browser;
pub mod config;
pub mod diff;
pub mod error;
pub mod favorites;
pub mod file_store;
pub mod model;
pub mod qr;
pub mod role;
pub mod session;
pub mod state;
pub mod store;
pub mod utils;

pub use browser::{Browser, MemoryBrowser};
pub use config::Config;
pub use error::{Error, Result};
pub use file_store::FileStore;
pub use role::SurfaceRole;
pub use session::Session;
pub use store::{MemoryStore, Store};
