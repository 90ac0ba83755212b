/*!
 * Registration Ledger
 * Tracks launched and registered units through their lifecycle
 */

mod ledger;

pub use ledger::{ExitedUnit, RegisterOutcome, RegistrationLedger, UnitKind, UnitRecord};
