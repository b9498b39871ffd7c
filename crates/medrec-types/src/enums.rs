//! Enumeration types used by cohort filter criteria.

use std::fmt;
use std::str::FromStr;

/// Comparison operator applied between a recorded numeric value and a
/// threshold.
///
/// # Examples
///
/// ```
/// use medrec_types::ComparisonOperator;
///
/// let op: ComparisonOperator = ">=".parse().unwrap();
/// assert_eq!(op, ComparisonOperator::GreaterEqual);
/// assert!(op.holds(5.0, 5.0));
/// assert_eq!(op.symbol(), ">=");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ComparisonOperator {
    /// `<`
    #[cfg_attr(feature = "serde", serde(rename = "<"))]
    LessThan,
    /// `<=`
    #[cfg_attr(feature = "serde", serde(rename = "<="))]
    LessEqual,
    /// `=`
    #[cfg_attr(feature = "serde", serde(rename = "="))]
    Equal,
    /// `>=`
    #[cfg_attr(feature = "serde", serde(rename = ">="))]
    GreaterEqual,
    /// `>`
    #[cfg_attr(feature = "serde", serde(rename = ">"))]
    GreaterThan,
}

impl ComparisonOperator {
    /// All operators, in ascending strictness from `<` to `>`.
    pub const ALL: [ComparisonOperator; 5] = [
        Self::LessThan,
        Self::LessEqual,
        Self::Equal,
        Self::GreaterEqual,
        Self::GreaterThan,
    ];

    /// Returns the symbolic representation of this operator.
    pub fn symbol(self) -> &'static str {
        match self {
            Self::LessThan => "<",
            Self::LessEqual => "<=",
            Self::Equal => "=",
            Self::GreaterEqual => ">=",
            Self::GreaterThan => ">",
        }
    }

    /// Returns true if `recorded <op> threshold` holds.
    pub fn holds(self, recorded: f64, threshold: f64) -> bool {
        match self {
            Self::LessThan => recorded < threshold,
            Self::LessEqual => recorded <= threshold,
            Self::Equal => recorded == threshold,
            Self::GreaterEqual => recorded >= threshold,
            Self::GreaterThan => recorded > threshold,
        }
    }
}

impl fmt::Display for ComparisonOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl FromStr for ComparisonOperator {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "<" => Ok(Self::LessThan),
            "<=" => Ok(Self::LessEqual),
            "=" => Ok(Self::Equal),
            ">=" => Ok(Self::GreaterEqual),
            ">" => Ok(Self::GreaterThan),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

/// Selects which of a patient's observations are tested against a
/// comparison when the patient has several.
///
/// # Examples
///
/// ```
/// use medrec_types::TimeModifier;
///
/// assert!(TimeModifier::Avg.is_aggregate());
/// assert!(!TimeModifier::First.is_aggregate());
/// assert_eq!("LAST".parse::<TimeModifier>().unwrap(), TimeModifier::Last);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "UPPERCASE"))]
pub enum TimeModifier {
    /// At least one observation satisfies the comparison.
    Any,
    /// No observation satisfies the comparison.
    No,
    /// The chronologically first observation satisfies it.
    First,
    /// The chronologically last observation satisfies it.
    Last,
    /// The minimum value satisfies it.
    Min,
    /// The maximum value satisfies it.
    Max,
    /// The mean value satisfies it.
    Avg,
}

impl TimeModifier {
    /// Returns true for modifiers that reduce all values to one number
    /// before comparing.
    pub fn is_aggregate(self) -> bool {
        matches!(self, Self::Min | Self::Max | Self::Avg)
    }

    /// Upper-case name, as used in query text.
    pub fn name(self) -> &'static str {
        match self {
            Self::Any => "ANY",
            Self::No => "NO",
            Self::First => "FIRST",
            Self::Last => "LAST",
            Self::Min => "MIN",
            Self::Max => "MAX",
            Self::Avg => "AVG",
        }
    }
}

impl fmt::Display for TimeModifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TimeModifier {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ANY" => Ok(Self::Any),
            "NO" => Ok(Self::No),
            "FIRST" => Ok(Self::First),
            "LAST" => Ok(Self::Last),
            "MIN" => Ok(Self::Min),
            "MAX" => Ok(Self::Max),
            "AVG" => Ok(Self::Avg),
            _ => Err(UnknownVariant(s.to_string())),
        }
    }
}

/// Error returned when parsing an unrecognised enum variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVariant(pub String);

impl fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown variant: '{}'", self.0)
    }
}

impl std::error::Error for UnknownVariant {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operator_symbols_roundtrip() {
        for op in ComparisonOperator::ALL {
            assert_eq!(op.symbol().parse::<ComparisonOperator>(), Ok(op));
        }
        assert!("<>".parse::<ComparisonOperator>().is_err());
    }

    #[test]
    fn test_operator_holds() {
        assert!(ComparisonOperator::LessThan.holds(1.0, 2.0));
        assert!(!ComparisonOperator::LessThan.holds(2.0, 2.0));
        assert!(ComparisonOperator::LessEqual.holds(2.0, 2.0));
        assert!(ComparisonOperator::Equal.holds(2.5, 2.5));
        assert!(!ComparisonOperator::Equal.holds(2.5, 2.6));
        assert!(ComparisonOperator::GreaterEqual.holds(3.0, 3.0));
        assert!(ComparisonOperator::GreaterThan.holds(6.0, 5.0));
    }

    #[test]
    fn test_time_modifier_parse() {
        assert_eq!("any".parse::<TimeModifier>(), Ok(TimeModifier::Any));
        assert_eq!(" No ".parse::<TimeModifier>(), Ok(TimeModifier::No));
        assert!("median".parse::<TimeModifier>().is_err());
        assert_eq!(TimeModifier::Max.to_string(), "MAX");
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&ComparisonOperator::GreaterEqual).unwrap();
        assert_eq!(json, "\">=\"");
        let modifier: TimeModifier = serde_json::from_str("\"AVG\"").unwrap();
        assert_eq!(modifier, TimeModifier::Avg);
    }
}
