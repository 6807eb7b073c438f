// ============================================================================
// Event Domain - Capacity-limited events
// ============================================================================
//
// - Value objects (Event, NewEvent, EventSummary, CreateEventRequest)
// - Catalog (EventCatalog: create, read, seat accounting)
//
// ============================================================================

pub mod catalog;
pub mod value_objects;

pub use catalog::*;
pub use value_objects::*;
