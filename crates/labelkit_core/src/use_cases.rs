pub mod alerts;
mod control_plane;
mod ledger;
mod notifications;
mod session;

#[cfg(test)]
mod test_support;

pub use alerts::derive_alerts;
pub use control_plane::ControlPlane;
pub use ledger::{PurchaseOutcome, UsageLedger};
pub use notifications::{AddOutcome, NotificationCenter};
pub use session::{RefreshOutcome, RegistrationOutcome, SessionManager, VerifyOutcome};
