pub mod auth;
pub mod pocket;

pub use pocket::PocketClient;
