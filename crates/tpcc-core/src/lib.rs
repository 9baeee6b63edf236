pub mod backend;
pub mod compliance;
pub mod config;
pub mod context;
pub mod controller;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod kind;
pub mod latency;
pub mod mock;
pub mod params;
pub mod random;
pub mod report;
pub mod sequencer;
pub mod sqlite;
pub mod stats;
pub mod worker;

pub use backend::*;
pub use config::*;
pub use controller::*;
pub use engine::*;
pub use error::*;
pub use kind::*;
pub use mock::*;
pub use report::*;
pub use sqlite::*;
pub use stats::*;
