//! Variable system.
//!
//! Collections are ordered multi-maps owned by a transaction. Host events
//! seed them through [`request`] and [`response`]; rules read them through
//! [`VariableResolver`]; actions write them through [`CollectionStore`].

mod collection;
mod name;
pub mod request;
mod resolver;
pub mod response;
mod store;

pub use collection::{Collection, KeySelector};
pub use name::VariableName;
pub use resolver::{Resolution, VariableResolver};
pub use store::{ArgumentSource, CollectionStore, CAPTURE_REGISTERS};
