mod cables;
mod junction_closures;
mod logical_paths;
mod nodes;
mod rings;
mod segments;
mod splices;
mod topology_sheets;
mod trace;

pub use cables::*;
pub use junction_closures::*;
pub use logical_paths::*;
pub use nodes::*;
pub use rings::*;
pub use segments::*;
pub use splices::*;
pub use topology_sheets::*;
pub use trace::*;
