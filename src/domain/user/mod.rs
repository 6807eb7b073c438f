// ============================================================================
// User Domain - Email identity
// ============================================================================
//
// - Value objects (User, NewUser)
// - Directory (UserDirectory: resolve-or-create by email)
//
// ============================================================================

pub mod directory;
pub mod value_objects;

pub use directory::*;
pub use value_objects::*;
