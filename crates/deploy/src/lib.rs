pub mod deploy;
pub mod history;
pub mod load_test;

pub use deploy::{DeployOptions, DeploymentManager};
