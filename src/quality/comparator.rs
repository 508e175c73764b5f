use crate::error::{EtlError, Result};
use crate::warehouse::ScalarValue;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Relational operator of a comparator check, written `eq`, `ne`, `lt`, `le`,
/// `gt` or `ge` in check specs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Comparator {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Comparator {
    pub const ALL: [Comparator; 6] = [
        Self::Eq,
        Self::Ne,
        Self::Lt,
        Self::Le,
        Self::Gt,
        Self::Ge,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Ne => "ne",
            Self::Lt => "lt",
            Self::Le => "le",
            Self::Gt => "gt",
            Self::Ge => "ge",
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }

    /// `observed <op> expected` using the type's own operators
    pub fn apply<T: PartialOrd + ?Sized>(&self, observed: &T, expected: &T) -> bool {
        match self {
            Self::Eq => observed == expected,
            Self::Ne => observed != expected,
            Self::Lt => observed < expected,
            Self::Le => observed <= expected,
            Self::Gt => observed > expected,
            Self::Ge => observed >= expected,
        }
    }

    /// Like [`Comparator::apply`], but `None` when the two values cannot be
    /// ordered against each other at all (different kinds, null vs value).
    pub fn evaluate(&self, observed: &ScalarValue, expected: &ScalarValue) -> Option<bool> {
        observed.partial_cmp(expected)?;
        Some(self.apply(observed, expected))
    }
}

impl FromStr for Comparator {
    type Err = EtlError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|comparator| comparator.code() == s)
            .ok_or_else(|| {
                EtlError::config(format!(
                    "Unrecognized comparator '{s}' (expected one of eq, ne, lt, le, gt, ge)"
                ))
            })
    }
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_all_codes() {
        for comparator in Comparator::ALL {
            assert_eq!(comparator.code().parse::<Comparator>().unwrap(), comparator);
        }
    }

    #[test]
    fn test_rejects_unknown_symbols() {
        for symbol in ["==", "EQ", "equals", "", " eq", "gte"] {
            assert!(
                matches!(symbol.parse::<Comparator>(), Err(EtlError::Config(_))),
                "{symbol:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_apply_matches_operators() {
        assert!(Comparator::Eq.apply(&0, &0));
        assert!(Comparator::Ne.apply(&1, &0));
        assert!(Comparator::Lt.apply(&-1, &0));
        assert!(Comparator::Le.apply(&0, &0));
        assert!(Comparator::Gt.apply(&5, &0));
        assert!(!Comparator::Ge.apply(&-5, &0));
    }

    #[test]
    fn test_evaluate_refuses_mismatched_kinds() {
        let text = ScalarValue::Text("0".into());
        let zero = ScalarValue::Integer(0);
        assert_eq!(Comparator::Ne.evaluate(&text, &zero), None);
        assert_eq!(Comparator::Eq.evaluate(&ScalarValue::Null, &zero), None);
        assert_eq!(
            Comparator::Eq.evaluate(&ScalarValue::Null, &ScalarValue::Null),
            Some(true)
        );
        assert_eq!(
            Comparator::Gt.evaluate(&ScalarValue::Float(0.5), &zero),
            Some(true)
        );
    }

    #[test]
    fn test_displays_symbol() {
        assert_eq!(Comparator::Le.to_string(), "<=");
        assert_eq!(format!("{}", Comparator::Ne), "!=");
    }
}
