pub mod analysis;
pub mod dataset;
pub mod user;

pub use analysis::*;
pub use dataset::*;
pub use user::*;
