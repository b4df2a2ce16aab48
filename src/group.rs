//! Reusable obstacle groups and their expansion into a flat world.

pub mod definition;
pub mod expand;
pub mod instance;
pub mod manager;
pub mod references;

pub use definition::GroupDefinition;
pub use expand::{ExpansionContext, ExpansionReport};
pub use instance::GroupInstance;
pub use manager::GroupDefinitionMgr;
pub use references::{ReferenceError, check_references};
