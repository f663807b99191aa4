mod container;
mod item;

pub use container::{BlockContainer, LoadState, Loader};
pub use item::{BlockItem, FieldValues, LocalizedData};
