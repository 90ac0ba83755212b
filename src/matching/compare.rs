/*!
 * Value Comparison
 * Ordered comparison of typed scalars for dependency matching
 */

use crate::descriptor::{ComparisonAction, SimpleValue};
use std::cmp::Ordering;

/// Total order over same-type scalars. Numeric types compare by value,
/// strings lexicographically, booleans false < true.
fn ordering(left: &SimpleValue, right: &SimpleValue) -> Option<Ordering> {
    use SimpleValue::*;
    match (left, right) {
        (Boolean(a), Boolean(b)) => Some(a.cmp(b)),
        (Char(a), Char(b)) => Some(a.cmp(b)),
        (Octet(a), Octet(b)) => Some(a.cmp(b)),
        (Short(a), Short(b)) => Some(a.cmp(b)),
        (UShort(a), UShort(b)) => Some(a.cmp(b)),
        (Long(a), Long(b)) => Some(a.cmp(b)),
        (ULong(a), ULong(b)) => Some(a.cmp(b)),
        (LongLong(a), LongLong(b)) => Some(a.cmp(b)),
        (ULongLong(a), ULongLong(b)) => Some(a.cmp(b)),
        (Float(a), Float(b)) => a.partial_cmp(b),
        (Double(a), Double(b)) => a.partial_cmp(b),
        (String(a), String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

/// Evaluate `allocation ACTION dependency`. The allocation (host) value is
/// always the left operand. Mismatched types never satisfy a comparison,
/// and `external` properties are not compared at all.
pub fn compare_values(
    allocation: &SimpleValue,
    dependency: &SimpleValue,
    action: ComparisonAction,
) -> bool {
    let Some(ord) = ordering(allocation, dependency) else {
        return false;
    };
    match action {
        ComparisonAction::External => false,
        ComparisonAction::Eq => ord == Ordering::Equal,
        ComparisonAction::Ne => ord != Ordering::Equal,
        ComparisonAction::Gt => ord == Ordering::Greater,
        ComparisonAction::Lt => ord == Ordering::Less,
        ComparisonAction::Ge => ord != Ordering::Less,
        ComparisonAction::Le => ord != Ordering::Greater,
    }
}
