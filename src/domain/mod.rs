// ============================================================================
// Domain Layer - Business Logic
// ============================================================================
//
// Each domain area has its own subdirectory:
// - event        - Event catalog (creation, listing, seat accounting)
// - user         - User directory (email identity resolution)
// - registration - Ledger state machine and the registration engine
//
// Persistence is reached only through the traits in crate::store.
//
// ============================================================================

pub mod event;
pub mod registration;
pub mod user;
