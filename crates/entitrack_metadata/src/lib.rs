//! # EntiTrack Metadata
//!
//! Entity model metadata for EntiTrack.
//!
//! This crate is the contract layer shared by the tracking engine and its
//! callers. It provides:
//! - A dynamic [`Value`] type for field values
//! - Field, entity-type, foreign-key, and navigation descriptors
//! - The [`Model`] registry with an eagerly-validating builder
//!
//! A [`Model`] is immutable once built. The tracking engine treats it as
//! read-only configuration for the lifetime of a unit of work.
//!
//! ## Usage
//!
//! ```
//! use entitrack_metadata::{
//!     EntityTypeSpec, FieldSpec, ForeignKeySpec, Model, ValueKind,
//! };
//!
//! let model = Model::builder()
//!     .entity(
//!         EntityTypeSpec::new("Category")
//!             .field(FieldSpec::new("id", ValueKind::Integer))
//!             .field(FieldSpec::new("name", ValueKind::Text).nullable())
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
//!     .build()
//!     .unwrap();
//!
//! let product = model.entity_type_named("Product").unwrap();
//! assert!(product.field_named("category_id").unwrap().is_nullable());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod entity_type;
mod error;
mod field;
mod foreign_key;
mod model;
mod value;

pub use entity_type::{ChangeTracking, EntityType, EntityTypeId};
pub use error::{MetadataError, MetadataResult};
pub use field::{FieldDef, FieldId};
pub use foreign_key::{ForeignKey, ForeignKeyId, Navigation, NavigationId, NavigationKind};
pub use model::{EntityTypeSpec, FieldSpec, ForeignKeySpec, Model, ModelBuilder};
pub use value::{Value, ValueKind};
