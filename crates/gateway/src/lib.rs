pub mod dedup;
pub mod http;
pub mod pipeline;

pub use dedup::DedupStore;
pub use http::{router, AppState};
pub use pipeline::{RequestGateway, SubmitOutcome};
