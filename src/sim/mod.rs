//! Visibility-gated spatial simulation
//!
//! Everything here is single-threaded and driven by the host's frame clock:
//! - Seeded RNG only (per entity and per field)
//! - Stable iteration order (by entity ID)
//! - No rendering or platform dependencies

pub mod bounds;
pub mod entity;
pub mod events;
pub mod field;
pub mod frustum;
pub mod observer;
pub mod respawn;
pub mod tracker;

pub use bounds::{Bounds, BoundsTier, Transform, VisualPart};
pub use entity::{Cycle, SpatialEntity, Visibility};
pub use events::{EntityEvent, EntityId, EventKind, EventSink};
pub use field::{AnnulusPlacement, Composition, CompositionField, Decorator, sample_annulus};
pub use frustum::{Aabb, BoundingSphere, Plane, ViewVolume};
pub use observer::{Observer, ObserverSource};
pub use respawn::{Placement, PlacementOutcome, in_exclusion_cone, place_offscreen};
pub use tracker::{FrustumTracker, Registrar, Registration, SharedEntity, TrackedEntity};
