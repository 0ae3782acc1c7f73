//! Metaweave mapping engine
//!
//! Sits between strongly-typed beans and a graph-shaped repository of typed
//! entities and relationships:
//!
//! ```text
//!   beans ◄──── ElementConverter (ordered type dispatch, overflow map) ◄────┐
//!     │                                                                     │
//!     └──► ElementBuilder (property bag + classifications) ──┐              │
//!                                                            ▼              │
//!   GenericElementHandler ── VisibilityFilter (zones, effectivity) ── RepositoryStore
//!          │    │                                                           ▲
//!          │    └── AnchorPropagator (cascade delete) ──────────────────────┤
//!          └─────── AttachmentManager (cardinality, traversal) ─────────────┘
//! ```
//!
//! Type knowledge comes from a [`TypeRegistry`] loaded from a `.typedefs`
//! module; the bundled Open Metadata subset is available through
//! [`TypeRegistry::open_metadata`]. Every read that filters takes an explicit
//! effective time.

pub mod anchors;
pub mod attachments;
pub mod audit;
pub mod beans;
pub mod config;
pub mod converter;
pub mod element;
pub mod element_builder;
pub mod error;
pub mod feedback;
pub mod handler;
pub mod names;
pub mod property_codec;
pub mod security;
pub mod type_registry;
pub mod visibility;

pub use anchors::AnchorPropagator;
pub use attachments::{
    AttachedElement, AttachedQuery, AttachmentManager, Direction, ElementRef, Sequencing,
};
pub use audit::{AuditEvent, AuditLog, AuditOutcome, MemoryAuditLog, RecordedEvent, TracingAuditLog};
pub use beans::annotation::{
    Annotation, AnnotationBuilder, AnnotationConverter, AnnotationKind, AnnotationReview,
    AnnotationStatus, ResourceProfile,
};
pub use beans::feedback::{Comment, CommentType, Like, Rating, StarRating};
pub use beans::referenceable::{ReferenceableConverter, ReferenceableElement};
pub use beans::ElementHeader;
pub use config::{EngineConfig, GovernanceZones};
pub use converter::{ConversionInput, DispatchTable, ElementConverter};
pub use element::MetadataElement;
pub use element_builder::{ElementBuilder, ElementPayload};
pub use error::{EngineError, EngineResult};
pub use feedback::FeedbackHandler;
pub use handler::{EngineServices, GenericElementHandler};
pub use property_codec::{OrdinalEnum, PropertyCursor, PropertyType};
pub use security::{AccessAction, AccessRequest, AllowAllVerifier, SecurityVerifier};
pub use type_registry::{Cardinality, End, TypeCategory, TypeRegistry};
pub use visibility::VisibilityFilter;
