//! Provider routing under compliance constraints
//!
//! Sensitive content only ever reaches compliance-authorized backends; there
//! is no exception path. Unclassified traffic follows the admin-configured
//! preference pair.

mod preferences;
mod router;

pub use preferences::{PreferencePair, RoutingPreferences};
pub use router::{
    BackendAttempt, BackendStatus, ProviderRouter, RouteDecision, RouteRole, RoutedExecution,
};
