pub mod registry;
pub mod selection;

pub use registry::{ContentFormat, IndexRegistry, IndexUpdate};
pub use selection::{IndexDescriptor, IndexSelection, NO_INDEX_LABEL};
