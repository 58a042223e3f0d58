pub mod artifact;
pub mod config;
pub mod errors;
pub mod job;
pub mod region;
pub mod run;
pub mod transform;

pub use artifact::*;
pub use config::*;
pub use errors::*;
pub use job::*;
pub use region::*;
pub use run::*;
pub use transform::*;
