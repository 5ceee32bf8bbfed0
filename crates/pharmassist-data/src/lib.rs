pub mod aggregate;
pub mod doctors;
pub mod loader;

pub use aggregate::aggregate_sites;
pub use doctors::{load_doctors, Doctor};
pub use loader::FileDataSource;
