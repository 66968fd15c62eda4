//! Tally core library — domain types, document store, errors.
//!
//! Public API surface:
//! - [`types`] — newtypes and domain structs
//! - [`error`] — [`StoreError`]
//! - [`store`] — load / save / init / id allocation

pub mod error;
pub mod store;
pub mod types;

pub use error::StoreError;
pub use types::{
    CountUpdate, EditDocument, ProjectDocument, ProjectName, PushEvent, SeatGrid, Section,
    SectionId,
};
