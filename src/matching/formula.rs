/*!
 * Capacity Formulas
 * Dynamic dependency values computed from the requester's configure set
 */

use crate::matching::PropertyMatchingError;
use crate::descriptor::SimpleValue;
use std::collections::HashMap;

/// Marker prefix identifying a dynamic dependency value.
pub const DYNAMIC_PREFIX: &str = "__MATH__";

/// Arithmetic applied to the referenced configure value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormulaOp {
    Add,
    Sub,
    Mul,
    Div,
    /// Take the configure value unchanged; the operand is ignored.
    Assign,
}

/// A parsed `__MATH__(operand,propertyId,operator)` expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Formula {
    pub operand: f64,
    pub property_id: String,
    pub operator: FormulaOp,
}

/// True if the literal is a dynamic value rather than a plain literal.
pub fn is_dynamic(literal: &str) -> bool {
    literal.trim_start().starts_with(DYNAMIC_PREFIX)
}

impl Formula {
    /// Parse the text following the `__MATH__` marker. The argument list
    /// must be parenthesized and hold exactly three comma-separated parts.
    pub fn parse(literal: &str) -> Result<Formula, PropertyMatchingError> {
        let malformed = |reason: &str| PropertyMatchingError::MalformedFormula {
            formula: literal.to_string(),
            reason: reason.to_string(),
        };

        let rest = literal
            .trim()
            .strip_prefix(DYNAMIC_PREFIX)
            .ok_or_else(|| malformed("missing __MATH__ prefix"))?
            .trim();
        let inner = rest
            .strip_prefix('(')
            .and_then(|s| s.strip_suffix(')'))
            .ok_or_else(|| malformed("arguments must be parenthesized"))?;

        let args: Vec<&str> = inner.split(',').map(str::trim).collect();
        if args.len() != 3 {
            return Err(malformed("expected exactly 3 arguments"));
        }

        let operand: f64 = args[0]
            .parse()
            .map_err(|_| malformed("operand is not numeric"))?;
        if args[1].is_empty() {
            return Err(malformed("empty property reference"));
        }
        let operator = match args[2] {
            "+" => FormulaOp::Add,
            "-" => FormulaOp::Sub,
            "*" => FormulaOp::Mul,
            "/" => FormulaOp::Div,
            "=" => FormulaOp::Assign,
            other => {
                return Err(PropertyMatchingError::MalformedFormula {
                    formula: literal.to_string(),
                    reason: format!("unknown operator {other:?}"),
                })
            }
        };

        Ok(Formula {
            operand,
            property_id: args[1].to_string(),
            operator,
        })
    }

    /// Evaluate against the requester's configure snapshot:
    /// `operand OP configureValue`, left to right.
    pub fn evaluate(
        &self,
        configure: &HashMap<String, SimpleValue>,
    ) -> Result<f64, PropertyMatchingError> {
        let value = configure.get(&self.property_id).ok_or_else(|| {
            PropertyMatchingError::UnknownFormulaProperty {
                id: self.property_id.clone(),
            }
        })?;
        let config = value
            .as_f64()
            .ok_or_else(|| PropertyMatchingError::NonNumericFormulaProperty {
                id: self.property_id.clone(),
            })?;

        let result = match self.operator {
            FormulaOp::Add => self.operand + config,
            FormulaOp::Sub => self.operand - config,
            FormulaOp::Mul => self.operand * config,
            FormulaOp::Div => self.operand / config,
            FormulaOp::Assign => config,
        };
        Ok(result)
    }
}

/// Parse and evaluate a dynamic literal in one step.
pub fn evaluate_dynamic(
    literal: &str,
    configure: &HashMap<String, SimpleValue>,
) -> Result<f64, PropertyMatchingError> {
    Formula::parse(literal)?.evaluate(configure)
}
