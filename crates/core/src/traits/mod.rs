pub mod capability;
pub mod repository;

pub use capability::*;
pub use repository::*;
