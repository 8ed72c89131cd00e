pub mod ids;
pub mod logging;

pub use ids::IdGenerator;
