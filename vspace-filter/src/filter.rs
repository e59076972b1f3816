//! Column-bound filters.

use std::ops::Bound;

use arrow::array::{Array, BooleanArray};
use vspace_result::{Error, Result};

use crate::predicate::{CompareOp, Predicate};
use crate::value::{ScalarValue, is_supported_type, scalar_at};

/// Capabilities the read path needs from a filter.
pub trait StatisticsFilter {
    /// Name of the single column the filter reads.
    fn column_name(&self) -> &str;

    /// Whether a decoded, non-null value satisfies the filter.
    fn evaluate(&self, value: &ScalarValue) -> bool;

    /// Whether a chunk whose column values all lie in `[min, max]` can be
    /// skipped. Absent bounds never skip.
    fn check_statistics(&self, min: Option<&ScalarValue>, max: Option<&ScalarValue>) -> bool;
}

/// An immutable predicate bound to exactly one column.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    column: String,
    predicate: Predicate,
}

impl Filter {
    pub fn new(column: impl Into<String>, predicate: Predicate) -> Self {
        Self {
            column: column.into(),
            predicate,
        }
    }

    pub fn compare(column: impl Into<String>, op: CompareOp, value: impl Into<ScalarValue>) -> Self {
        Self::new(
            column,
            Predicate::Compare {
                op,
                value: value.into(),
            },
        )
    }

    pub fn eq(column: impl Into<String>, value: impl Into<ScalarValue>) -> Self {
        Self::compare(column, CompareOp::Eq, value)
    }

    pub fn ne(column: impl Into<String>, value: impl Into<ScalarValue>) -> Self {
        Self::compare(column, CompareOp::NotEq, value)
    }

    pub fn lt(column: impl Into<String>, value: impl Into<ScalarValue>) -> Self {
        Self::compare(column, CompareOp::Lt, value)
    }

    pub fn le(column: impl Into<String>, value: impl Into<ScalarValue>) -> Self {
        Self::compare(column, CompareOp::LtEq, value)
    }

    pub fn gt(column: impl Into<String>, value: impl Into<ScalarValue>) -> Self {
        Self::compare(column, CompareOp::Gt, value)
    }

    pub fn ge(column: impl Into<String>, value: impl Into<ScalarValue>) -> Self {
        Self::compare(column, CompareOp::GtEq, value)
    }

    pub fn range(
        column: impl Into<String>,
        lower: Bound<ScalarValue>,
        upper: Bound<ScalarValue>,
    ) -> Self {
        Self::new(column, Predicate::Range { lower, upper })
    }

    /// Inclusive `[low, high]` range.
    pub fn between(
        column: impl Into<String>,
        low: impl Into<ScalarValue>,
        high: impl Into<ScalarValue>,
    ) -> Self {
        Self::range(
            column,
            Bound::Included(low.into()),
            Bound::Included(high.into()),
        )
    }

    pub fn is_in<V, I>(column: impl Into<String>, values: I) -> Self
    where
        V: Into<ScalarValue>,
        I: IntoIterator<Item = V>,
    {
        Self::new(
            column,
            Predicate::In(values.into_iter().map(Into::into).collect()),
        )
    }

    /// Conjunction of filters over the same column.
    pub fn and(filters: Vec<Filter>) -> Result<Filter> {
        let Some(first) = filters.first() else {
            return Err(Error::InvalidArgumentError(
                "conjunction needs at least one filter".into(),
            ));
        };
        let column = first.column.clone();
        if let Some(other) = filters.iter().find(|f| f.column != column) {
            return Err(Error::InvalidArgumentError(format!(
                "conjunction mixes columns '{}' and '{}'",
                column, other.column
            )));
        }
        let children = filters.into_iter().map(|f| f.predicate).collect();
        Ok(Filter::new(column, Predicate::And(children)))
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn predicate(&self) -> &Predicate {
        &self.predicate
    }

    /// Evaluate the filter over every row of `array`. Nulls never match.
    pub fn evaluate_array(&self, array: &dyn Array) -> Result<BooleanArray> {
        if !is_supported_type(array.data_type()) {
            return Err(Error::InvalidArgumentError(format!(
                "column '{}' has type {:?}, which filters cannot read",
                self.column,
                array.data_type()
            )));
        }
        let mut mask = Vec::with_capacity(array.len());
        for row in 0..array.len() {
            let keep = match scalar_at(array, row)? {
                Some(value) => self.predicate.matches(&value),
                None => false,
            };
            mask.push(keep);
        }
        Ok(BooleanArray::from(mask))
    }
}

impl StatisticsFilter for Filter {
    fn column_name(&self) -> &str {
        &self.column
    }

    fn evaluate(&self, value: &ScalarValue) -> bool {
        self.predicate.matches(value)
    }

    fn check_statistics(&self, min: Option<&ScalarValue>, max: Option<&ScalarValue>) -> bool {
        match (min, max) {
            (Some(min), Some(max)) => self.predicate.can_skip(min, max),
            _ => false,
        }
    }
}
