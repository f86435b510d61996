pub mod error;
pub mod model;

pub use error::MiltonError;
pub use model::*;
