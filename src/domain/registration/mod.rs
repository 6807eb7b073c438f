// ============================================================================
// Registration Domain - Ledger and Engine
// ============================================================================
//
// - Value objects (Registration, RegistrationStatus, read models)
// - Errors (RegistrationError taxonomy)
// - Ledger (per-(user, event) status records inside a transaction)
// - Engine (capacity-gated register / cancel, serialized per event)
//
// ============================================================================

pub mod engine;
pub mod errors;
pub mod ledger;
pub mod value_objects;

pub use engine::*;
pub use errors::*;
pub use ledger::*;
pub use value_objects::*;
