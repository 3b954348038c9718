pub mod analysis;
pub mod change;
pub mod pattern;
pub mod recommendation;
pub mod table;
pub mod workload;

pub use analysis::*;
pub use change::*;
pub use pattern::*;
pub use recommendation::*;
pub use table::*;
pub use workload::*;
