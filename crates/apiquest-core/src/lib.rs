pub mod catalog;
pub mod config;
pub mod directive;
pub mod error;
pub mod harness;
pub mod intent;
pub mod notice;
pub mod progression;
pub mod runner;
pub mod session;

pub use catalog::*;
pub use config::*;
pub use error::*;
pub use harness::*;
pub use notice::*;
pub use progression::*;
pub use runner::*;
pub use session::*;
