//! Parameter space declarations.
//!
//! A [`ParameterSpace`] is assembled through [`ParameterSpaceBuilder`], which
//! validates every declaration as it is added and rejects a name that was
//! already used in any category. Once built the space is read-only.

use hs_types::{invalid_range, type_mismatch, Numeric, ParamValue, SpaceError, ValueKind};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashSet;
use std::str::FromStr;
use tracing::debug;

/// A single parameter dimension in the search space.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterDef {
    /// Parameter name as passed to the training script (e.g. "dropout_1").
    pub name: String,
    /// How the parameter's candidate values are produced.
    pub kind: ParameterKind,
}

/// Describes the candidate values of a parameter.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ParameterKind {
    /// Constant copied into every assignment.
    Static { value: ParamValue },
    /// `min + k*step` for every `k >= 0` that stays `<= max`. `step` always
    /// has the same kind as the bounds.
    SteppedRange {
        min: Numeric,
        max: Numeric,
        step: Numeric,
    },
    /// `base^e` for every integer `e` in `[min_exponent, max_exponent]`.
    PowerRange {
        min_exponent: i32,
        max_exponent: i32,
        base: Numeric,
    },
    /// Explicit choices, all of one kind.
    List { values: Vec<ParamValue> },
}

/// Declaration category, in the order parameters are visited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Category {
    Static,
    SteppedRange,
    PowerRange,
    List,
}

impl ParameterKind {
    pub fn category(&self) -> Category {
        match self {
            Self::Static { .. } => Category::Static,
            Self::SteppedRange { .. } => Category::SteppedRange,
            Self::PowerRange { .. } => Category::PowerRange,
            Self::List { .. } => Category::List,
        }
    }
}

impl ParameterDef {
    /// Kind of every value this parameter can take.
    pub fn value_kind(&self) -> ValueKind {
        match &self.kind {
            ParameterKind::Static { value } => value.kind(),
            ParameterKind::SteppedRange { min, .. } => min.kind(),
            ParameterKind::PowerRange {
                min_exponent, base, ..
            } => match base {
                Numeric::Integer(_) if *min_exponent >= 0 => ValueKind::Integer,
                _ => ValueKind::Real,
            },
            ParameterKind::List { values } => values
                .first()
                .map(ParamValue::kind)
                .unwrap_or(ValueKind::Text),
        }
    }

    /// Number of distinct candidate values.
    pub fn candidate_count(&self) -> Result<u64, SpaceError> {
        match &self.kind {
            ParameterKind::Static { .. } => Ok(1),
            ParameterKind::SteppedRange { min, max, step } => {
                stepped_count(&self.name, *min, *max, *step)
            }
            ParameterKind::PowerRange {
                min_exponent,
                max_exponent,
                ..
            } => Ok((i64::from(*max_exponent) - i64::from(*min_exponent) + 1) as u64),
            ParameterKind::List { values } => Ok(values.len() as u64),
        }
    }

    /// The `index`-th candidate value (0-based, ascending for ranges).
    pub fn candidate(&self, index: u64) -> Result<ParamValue, SpaceError> {
        let count = self.candidate_count()?;
        if index >= count {
            return Err(invalid_range!(
                self.name,
                "candidate index {index} out of bounds ({count} candidates)"
            ));
        }

        match &self.kind {
            ParameterKind::Static { value } => Ok(value.clone()),
            ParameterKind::SteppedRange { min, max, step } => {
                stepped_value(&self.name, *min, *max, *step, index)
            }
            ParameterKind::PowerRange {
                min_exponent, base, ..
            } => {
                let exponent = i64::from(*min_exponent) + index as i64;
                power_value(&self.name, *base, exponent as i32, self.value_kind())
            }
            ParameterKind::List { values } => Ok(values[index as usize].clone()),
        }
    }

    /// Materialize every candidate value in order.
    pub fn candidates(&self) -> Result<Vec<ParamValue>, SpaceError> {
        (0..self.candidate_count()?)
            .map(|i| self.candidate(i))
            .collect()
    }
}

/// The full, validated search space.
///
/// Parameters are kept grouped by [`Category`] (statics, stepped ranges,
/// power ranges, lists) and in declaration order within each group; every
/// consumer visits them in this order.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ParameterSpace {
    parameters: Vec<ParameterDef>,
}

impl ParameterSpace {
    pub fn builder() -> ParameterSpaceBuilder {
        ParameterSpaceBuilder::new()
    }

    pub fn parameters(&self) -> &[ParameterDef] {
        &self.parameters
    }

    pub fn iter(&self) -> impl Iterator<Item = &ParameterDef> {
        self.parameters.iter()
    }

    pub fn get(&self, name: &str) -> Option<&ParameterDef> {
        self.parameters.iter().find(|p| p.name == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.parameters.iter().map(|p| p.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    /// Parameters of one category, in declaration order.
    pub fn of_category(&self, category: Category) -> impl Iterator<Item = &ParameterDef> {
        self.parameters
            .iter()
            .filter(move |p| p.kind.category() == category)
    }

    /// Total number of distinct assignments (returns `None` on overflow).
    pub fn grid_size(&self) -> Option<u64> {
        let mut total: u64 = 1;
        for param in &self.parameters {
            total = total.checked_mul(param.candidate_count().ok()?)?;
        }
        Some(total)
    }
}

impl<'a> IntoIterator for &'a ParameterSpace {
    type Item = &'a ParameterDef;
    type IntoIter = std::slice::Iter<'a, ParameterDef>;

    fn into_iter(self) -> Self::IntoIter {
        self.parameters.iter()
    }
}

/// Incremental, validating constructor for [`ParameterSpace`].
#[derive(Debug, Clone, Default)]
pub struct ParameterSpaceBuilder {
    parameters: Vec<ParameterDef>,
    names: HashSet<String>,
}

impl ParameterSpaceBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a constant.
    pub fn add_static(
        self,
        name: impl Into<String>,
        value: impl Into<ParamValue>,
    ) -> Result<Self, SpaceError> {
        let name = name.into();
        let value = value.into();
        check_finite_value(&name, &value)?;
        self.push(name, ParameterKind::Static { value })
    }

    /// Register a linear range over `[min, max]` with increment `step`.
    pub fn add_stepped_range(
        self,
        name: impl Into<String>,
        min: impl Into<Numeric>,
        max: impl Into<Numeric>,
        step: impl Into<Numeric>,
    ) -> Result<Self, SpaceError> {
        let name = name.into();
        let (min, max, step) = (min.into(), max.into(), step.into());

        if min.kind() != max.kind() {
            return Err(invalid_range!(
                name,
                "min ({}) and max ({}) must be the same numeric kind",
                min.kind(),
                max.kind()
            ));
        }
        let step = match (min, step) {
            (Numeric::Integer(_), Numeric::Real(s)) => {
                return Err(type_mismatch!(
                    name,
                    "integer range cannot use real step {s:?}"
                ));
            }
            (Numeric::Real(_), Numeric::Integer(s)) => Numeric::Real(s as f64),
            (_, s) => s,
        };
        for bound in [min, max, step] {
            if !bound.as_f64().is_finite() {
                return Err(invalid_range!(name, "bounds and step must be finite"));
            }
        }
        if step.as_f64() <= 0.0 {
            return Err(invalid_range!(name, "step {step} must be greater than zero"));
        }
        if numeric_gt(min, max) {
            return Err(invalid_range!(name, "min {min} exceeds max {max}"));
        }
        // Proves the range is representable before anything samples it.
        stepped_count(&name, min, max, step)?;

        self.push(name, ParameterKind::SteppedRange { min, max, step })
    }

    /// Register `base^e` for integer exponents in `[min_exponent, max_exponent]`.
    pub fn add_power_range(
        self,
        name: impl Into<String>,
        min_exponent: i32,
        max_exponent: i32,
        base: impl Into<Numeric>,
    ) -> Result<Self, SpaceError> {
        let name = name.into();
        let base = base.into();

        if min_exponent > max_exponent {
            return Err(invalid_range!(
                name,
                "min exponent {min_exponent} exceeds max exponent {max_exponent}"
            ));
        }
        if !base.as_f64().is_finite() || base.as_f64() <= 0.0 {
            return Err(invalid_range!(name, "base {base} must be positive"));
        }

        let def = ParameterDef {
            name,
            kind: ParameterKind::PowerRange {
                min_exponent,
                max_exponent,
                base,
            },
        };
        // Both ends must be representable; the series is monotonic in between.
        let last = def.candidate_count()? - 1;
        def.candidate(0)?;
        def.candidate(last)?;

        self.push(def.name, def.kind)
    }

    /// Register a non-empty list of same-kind values.
    pub fn add_enumerated_list<I>(self, name: impl Into<String>, values: I) -> Result<Self, SpaceError>
    where
        I: IntoIterator,
        I::Item: Into<ParamValue>,
    {
        let name = name.into();
        let values: Vec<ParamValue> = values.into_iter().map(Into::into).collect();

        let first_kind = match values.first() {
            Some(first) => first.kind(),
            None => return Err(invalid_range!(name, "list must not be empty")),
        };
        if let Some(other) = values.iter().find(|v| v.kind() != first_kind) {
            return Err(invalid_range!(
                name,
                "list mixes {first_kind} and {} values",
                other.kind()
            ));
        }
        for value in &values {
            check_finite_value(&name, value)?;
        }

        self.push(name, ParameterKind::List { values })
    }

    /// Finish the declaration, grouping parameters by category.
    pub fn build(self) -> ParameterSpace {
        let mut parameters = self.parameters;
        // Stable: declaration order survives within a category.
        parameters.sort_by_key(|p| p.kind.category());
        debug!(parameters = parameters.len(), "parameter space declared");
        ParameterSpace { parameters }
    }

    fn push(mut self, name: String, kind: ParameterKind) -> Result<Self, SpaceError> {
        if name.trim().is_empty() {
            return Err(invalid_range!(name, "parameter name must not be empty"));
        }
        if !self.names.insert(name.clone()) {
            return Err(SpaceError::DuplicateParameter { name });
        }
        self.parameters.push(ParameterDef { name, kind });
        Ok(self)
    }
}

// ---------------------------------------------------------------------------
// Range arithmetic
// ---------------------------------------------------------------------------

fn numeric_gt(a: Numeric, b: Numeric) -> bool {
    match (a, b) {
        (Numeric::Integer(a), Numeric::Integer(b)) => a > b,
        _ => a.as_f64() > b.as_f64(),
    }
}

fn check_finite_value(name: &str, value: &ParamValue) -> Result<(), SpaceError> {
    match value {
        ParamValue::Real(v) if !v.is_finite() => {
            Err(invalid_range!(name, "value {v} must be finite"))
        }
        _ => Ok(()),
    }
}

/// Reals are expanded in decimal so that e.g. 0.1 + 2*0.1 lands exactly on
/// 0.3 instead of overshooting the upper bound. Bounds outside what a
/// `Decimal` holds exactly fall back to binary floating point.
#[derive(Debug, Clone, Copy)]
enum RealLattice {
    Exact { min: Decimal, step: Decimal, steps: u64 },
    Binary { min: f64, max: f64, step: f64, steps: u64 },
}

/// Tolerance applied to `(max - min) / step` so a quotient like
/// 1.9999999999999998 still reaches its last point.
const LATTICE_EPSILON: f64 = 1e-9;

impl RealLattice {
    fn new(name: &str, min: f64, max: f64, step: f64) -> Result<Self, SpaceError> {
        if let Some(lattice) = Self::exact(min, max, step) {
            return Ok(lattice);
        }

        let quotient = (max - min) / step;
        let steps = (quotient * (1.0 + LATTICE_EPSILON)).floor();
        if !steps.is_finite() || steps < 0.0 || steps >= u64::MAX as f64 {
            return Err(invalid_range!(name, "range {min}..={max} step {step} overflows"));
        }
        Ok(Self::Binary {
            min,
            max,
            step,
            steps: steps as u64,
        })
    }

    fn exact(min: f64, max: f64, step: f64) -> Option<Self> {
        let (min, max, step) = (exact_decimal(min)?, exact_decimal(max)?, exact_decimal(step)?);
        let steps = max.checked_sub(min)?.checked_div(step)?.floor().to_u64()?;
        Some(Self::Exact { min, step, steps })
    }

    fn count(&self) -> Option<u64> {
        match self {
            Self::Exact { steps, .. } | Self::Binary { steps, .. } => steps.checked_add(1),
        }
    }

    fn value(&self, index: u64) -> Option<f64> {
        match *self {
            Self::Exact { min, step, .. } => {
                let value = Decimal::from(index).checked_mul(step)?.checked_add(min)?;
                f64::from_str(&value.normalize().to_string()).ok()
            }
            Self::Binary { min, max, step, .. } => {
                Some((min + index as f64 * step).min(max))
            }
        }
    }
}

/// `value` as a `Decimal`, only if it converts back to the same `f64`.
fn exact_decimal(value: f64) -> Option<Decimal> {
    let decimal = Decimal::from_str(&value.to_string()).ok()?;
    let back = f64::from_str(&decimal.normalize().to_string()).ok()?;
    (back == value).then_some(decimal)
}

fn stepped_count(name: &str, min: Numeric, max: Numeric, step: Numeric) -> Result<u64, SpaceError> {
    let overflow = || invalid_range!(name, "range {min}..={max} step {step} overflows");

    match (min, max, step) {
        (Numeric::Integer(min), Numeric::Integer(max), Numeric::Integer(step)) => {
            let span = i128::from(max) - i128::from(min);
            u64::try_from(span / i128::from(step) + 1).map_err(|_| overflow())
        }
        _ => RealLattice::new(name, min.as_f64(), max.as_f64(), step.as_f64())?
            .count()
            .ok_or_else(overflow),
    }
}

fn stepped_value(
    name: &str,
    min: Numeric,
    max: Numeric,
    step: Numeric,
    index: u64,
) -> Result<ParamValue, SpaceError> {
    let overflow = || invalid_range!(name, "candidate {index} overflows");

    match (min, step) {
        (Numeric::Integer(min), Numeric::Integer(step)) => {
            let value = i128::from(min) + i128::from(index) * i128::from(step);
            i64::try_from(value)
                .map(ParamValue::Integer)
                .map_err(|_| overflow())
        }
        _ => RealLattice::new(name, min.as_f64(), max.as_f64(), step.as_f64())?
            .value(index)
            .map(ParamValue::Real)
            .ok_or_else(overflow),
    }
}

fn power_value(
    name: &str,
    base: Numeric,
    exponent: i32,
    kind: ValueKind,
) -> Result<ParamValue, SpaceError> {
    match (base, kind) {
        (Numeric::Integer(b), ValueKind::Integer) => b
            .checked_pow(exponent as u32)
            .map(ParamValue::Integer)
            .ok_or_else(|| invalid_range!(name, "{b}^{exponent} overflows")),
        _ => {
            let value = base.as_f64().powi(exponent);
            if value.is_finite() && value > 0.0 {
                Ok(ParamValue::Real(value))
            } else {
                Err(invalid_range!(name, "{base}^{exponent} is out of range"))
            }
        }
    }
}
