/*!
 * Property Matching
 * Allocation dependency matching and capacity request construction
 */

pub mod compare;
pub mod formula;
pub mod matcher;

pub use compare::compare_values;
pub use formula::{Formula, FormulaOp, DYNAMIC_PREFIX};
pub use matcher::{
    build_capacity_request, check_os, check_processor, check_processor_and_os,
    is_allocation_satisfied,
};

use thiserror::Error;

/// Fatal faults raised while building capacity requests or evaluating
/// capacity formulas. Boolean match outcomes never surface here.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PropertyMatchingError {
    #[error("malformed capacity formula {formula:?}: {reason}")]
    MalformedFormula { formula: String, reason: String },

    #[error("capacity formula references unknown configure property {id}")]
    UnknownFormulaProperty { id: String },

    #[error("configure property {id} has no numeric value for formula use")]
    NonNumericFormulaProperty { id: String },

    #[error("dependency {id} names no allocation property on the host")]
    MissingAllocationProperty { id: String },

    #[error("host offers no allocation properties but dependencies were declared")]
    NoAllocationCatalog,

    #[error("dependency value for {id} cannot be expressed as {reason}")]
    BadDependencyValue { id: String, reason: String },
}
