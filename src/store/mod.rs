mod repository;
mod schema;

pub use repository::{Store, StoreChange};
