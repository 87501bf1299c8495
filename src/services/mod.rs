//! Business logic services.
//!
//! Services validate caller arguments and drive the user store.

mod mixed_mode;
mod publication;
mod roles;

pub use mixed_mode::{MIXED_MODE_STORE_MESSAGES, is_mixed_mode_failure};
pub use publication::{IdentityProvider, Publication, RolesPublication};
pub use roles::{DEFAULT_READ_PREFERENCE, RoleAssignmentService};
