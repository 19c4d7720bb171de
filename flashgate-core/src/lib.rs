pub mod engine;
pub mod errors;
pub mod filters;
pub mod gate;
pub mod models;
pub mod record;
pub mod repo;
pub mod scheduler;
pub mod service;
pub mod state;
pub mod stats;

pub use engine::*;
pub use errors::*;
pub use filters::*;
pub use gate::*;
pub use models::*;
pub use record::*;
pub use repo::*;
pub use service::*;
pub use state::*;
pub use stats::*;
