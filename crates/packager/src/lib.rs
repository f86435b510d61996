pub mod bundle;
pub mod checksums;

pub use bundle::{create_bundle, extract_manifest, BundleInputs};
