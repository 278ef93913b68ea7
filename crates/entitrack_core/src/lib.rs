//! # EntiTrack Core
//!
//! Change tracking and identity management engine for EntiTrack.
//!
//! This crate provides:
//! - Tracking records: lifecycle state, per-field dirty bits, sidecars
//! - An identity map deduplicating tracked instances by key
//! - Key values, key factories, and key generation strategies
//! - A navigation fixup engine keeping foreign keys and paired
//!   navigations bidirectionally consistent
//! - A tracking event feed for observing lifecycle transitions
//!
//! The [`StateManager`] is the entry point: one per logical unit of work,
//! owning every tracking record it registers. Mutations — field writes,
//! state transitions, navigation changes — go through it, and each returns
//! only after the graph is consistent again.
//!
//! ## Example
//!
//! ```
//! use entitrack_core::{Backing, EntityState, StateManager};
//! use entitrack_metadata::{
//!     EntityTypeSpec, FieldSpec, ForeignKeySpec, Model, Value, ValueKind,
//! };
//!
//! # fn main() -> entitrack_core::CoreResult<()> {
//! let model = Model::builder()
//!     .entity(
//!         EntityTypeSpec::new("Category")
//!             .field(FieldSpec::new("id", ValueKind::Integer))
//!             .key(["id"]),
//!     )
//!     .entity(
//!         EntityTypeSpec::new("Product")
//!             .field(FieldSpec::new("id", ValueKind::Integer))
//!             .field(FieldSpec::new("category_id", ValueKind::Integer).nullable())
//!             .key(["id"]),
//!     )
//!     .foreign_key(
//!         ForeignKeySpec::new("Product", ["category_id"], "Category")
//!             .with_reference("category")
//!             .with_collection("products"),
//!     )
//!     .build()?;
//!
//! let category_type = model.entity_type_named("Category").unwrap().id();
//! let product_type = model.entity_type_named("Product").unwrap().id();
//! let id_field = model.entity_type(category_type).field_id("id").unwrap();
//!
//! let mut manager = StateManager::new(model);
//! let category = manager.create_entry(category_type, Backing::shadow(1))?;
//! manager.set_value(category, id_field, Value::Integer(1))?;
//! manager.set_entity_state(category, EntityState::Unchanged)?;
//!
//! let product = manager.create_entry(product_type, Backing::shadow(2))?;
//! assert_eq!(manager.entity_state(product)?, EntityState::Detached);
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod entry;
mod error;
mod events;
mod fixup;
mod key;
mod manager;

pub use config::TrackerConfig;
pub use entry::{
    AccessorKind, Backing, EntityEntry, EntityState, EntryId, FieldBits, Sidecar, SidecarName,
    TypedAccess,
};
pub use error::{CoreError, CoreResult};
pub use events::{TrackingEvent, TrackingEventKind, TrackingFeed};
pub use key::{
    AsyncKeyGenerator, BoxFuture, CanceledKeyGenerator, CompositeKeyFactory, KeyFactory,
    KeyGenerator, KeyValue, RowBuffer, SequenceKeyGenerator, SimpleKeyFactory, UuidKeyGenerator,
    ValueSource,
};
pub use manager::StateManager;
