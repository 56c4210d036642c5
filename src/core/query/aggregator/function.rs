// SPDX-License-Identifier: MIT OR Apache-2.0

//! Aggregate function declarations.
//!
//! Aggregates are written as `fn(field) [as alias]`, e.g. `sum(fare) as
//! total_fare` or `count(*)`. Every supported function is commutative and
//! associative so the fold result does not depend on arrival order.

use crate::core::error::{EngineError, EngineResult};

pub const AGGREGATES_KEY: &str = "query.aggregates";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregateFunction {
    Sum,
    Count,
    Avg,
    Min,
    Max,
}

impl AggregateFunction {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "sum" => Some(AggregateFunction::Sum),
            "count" => Some(AggregateFunction::Count),
            "avg" | "average" | "mean" => Some(AggregateFunction::Avg),
            "min" => Some(AggregateFunction::Min),
            "max" => Some(AggregateFunction::Max),
            _ => None,
        }
    }

    #[inline]
    pub const fn as_str(&self) -> &'static str {
        match self {
            AggregateFunction::Sum => "sum",
            AggregateFunction::Count => "count",
            AggregateFunction::Avg => "avg",
            AggregateFunction::Min => "min",
            AggregateFunction::Max => "max",
        }
    }
}

/// A bound aggregate: function, input measure and output column name
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateSpec {
    pub function: AggregateFunction,
    /// Measure field name, `None` for `count(*)`
    pub field: Option<String>,
    /// Position of `field` in a record's measures
    pub measure_index: Option<usize>,
    pub alias: String,
}

impl AggregateSpec {
    /// Bind `function(field)` against the configured measure names
    pub fn new(
        function: AggregateFunction,
        field: &str,
        alias: Option<&str>,
        measures: &[String],
    ) -> EngineResult<Self> {
        let field = field.trim();
        let (field, measure_index) = if field == "*" {
            if function != AggregateFunction::Count {
                return Err(EngineError::configuration_with_key(
                    format!("'{}(*)' is not supported; only count(*) is", function.as_str()),
                    AGGREGATES_KEY,
                ));
            }
            (None, None)
        } else {
            let index = measures.iter().position(|m| m == field).ok_or_else(|| {
                EngineError::configuration_with_key(
                    format!(
                        "aggregate field '{}' is not a declared measure (measures: [{}])",
                        field,
                        measures.join(", ")
                    ),
                    AGGREGATES_KEY,
                )
            })?;
            (Some(field.to_string()), Some(index))
        };

        let alias = match alias.map(str::trim) {
            Some(alias) if !alias.is_empty() => alias.to_string(),
            _ => match &field {
                Some(field) => format!("{}_{}", function.as_str(), field),
                None => function.as_str().to_string(),
            },
        };

        Ok(Self {
            function,
            field,
            measure_index,
            alias,
        })
    }

    /// Parse `fn(field) [as alias]`
    pub fn parse(expression: &str, measures: &[String]) -> EngineResult<Self> {
        let invalid = || {
            EngineError::configuration_with_key(
                format!(
                    "invalid aggregate '{}': expected fn(field) [as alias]",
                    expression.trim()
                ),
                AGGREGATES_KEY,
            )
        };

        let expression = expression.trim();
        let open = expression.find('(').ok_or_else(invalid)?;
        let close = expression.find(')').ok_or_else(invalid)?;
        if close < open {
            return Err(invalid());
        }

        let function = AggregateFunction::parse(&expression[..open]).ok_or_else(|| {
            EngineError::configuration_with_key(
                format!(
                    "unknown aggregate function '{}'; expected sum, count, avg, min or max",
                    expression[..open].trim()
                ),
                AGGREGATES_KEY,
            )
        })?;
        let field = &expression[open + 1..close];
        if field.trim().is_empty() {
            return Err(invalid());
        }

        let rest = expression[close + 1..].trim();
        let alias = if rest.is_empty() {
            None
        } else {
            let mut parts = rest.split_whitespace();
            match (parts.next(), parts.next(), parts.next()) {
                (Some(kw), Some(alias), None) if kw.eq_ignore_ascii_case("as") => Some(alias),
                _ => return Err(invalid()),
            }
        };

        Self::new(function, field, alias, measures)
    }
}
