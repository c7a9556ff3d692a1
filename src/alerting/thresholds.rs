//! Water quality threshold evaluation.
//!
//! Pure evaluation of a measurement against the fixed potability bounds.
//! Every violated dimension is reported, not just the first one found, so a
//! single notification shows the recipient the full picture. Evaluation has
//! no side effects: the same reading always yields the same condition list.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::models::NewMeasurement;

// ---

/// Potability bounds. Values outside these ranges trigger an alert.
pub const PH_MIN: f64 = 6.5;
pub const PH_MAX: f64 = 8.5;
pub const TURBIDITY_MAX: f64 = 5.0;
pub const TEMPERATURE_MIN: f64 = 10.0;
pub const TEMPERATURE_MAX: f64 = 30.0;
pub const TDS_MAX: f64 = 500.0;

/// A reading with at least one dimension missing. Evaluation fails closed
/// on partial data instead of treating absent values as zero or passing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("incomplete reading: missing {}", .missing.join(", "))]
pub struct IncompleteReading {
    pub missing: Vec<&'static str>,
}

/// A fully populated reading, extracted from a validated measurement.
///
/// Also serves as the structured payload shipped alongside the alert text so
/// the mobile client can render rich UI without re-deriving the violation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WaterValues {
    // ---
    pub ph: f64,
    pub turbidity: f64,
    pub temperature: f64,
    pub tds: f64,
}

/// One violated bound, carrying the measured value.
///
/// Rendered in Portuguese to match the mobile app's alert copy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AlertCondition {
    PhLow(f64),
    PhHigh(f64),
    TurbidityHigh(f64),
    TemperatureLow(f64),
    TemperatureHigh(f64),
    TdsHigh(f64),
}

impl AlertCondition {
    /// The measured value that violated the bound.
    pub fn value(&self) -> f64 {
        // ---
        match *self {
            AlertCondition::PhLow(v)
            | AlertCondition::PhHigh(v)
            | AlertCondition::TurbidityHigh(v)
            | AlertCondition::TemperatureLow(v)
            | AlertCondition::TemperatureHigh(v)
            | AlertCondition::TdsHigh(v) => v,
        }
    }

    /// The bound that was violated.
    pub fn bound(&self) -> f64 {
        // ---
        match self {
            AlertCondition::PhLow(_) => PH_MIN,
            AlertCondition::PhHigh(_) => PH_MAX,
            AlertCondition::TurbidityHigh(_) => TURBIDITY_MAX,
            AlertCondition::TemperatureLow(_) => TEMPERATURE_MIN,
            AlertCondition::TemperatureHigh(_) => TEMPERATURE_MAX,
            AlertCondition::TdsHigh(_) => TDS_MAX,
        }
    }
}

impl fmt::Display for AlertCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // ---
        match *self {
            AlertCondition::PhLow(v) => write!(f, "pH baixo ({v:.1} < {PH_MIN})"),
            AlertCondition::PhHigh(v) => write!(f, "pH alto ({v:.1} > {PH_MAX})"),
            AlertCondition::TurbidityHigh(v) => {
                write!(f, "Turbidez alta ({v:.1} > {TURBIDITY_MAX})")
            }
            AlertCondition::TemperatureLow(v) => {
                write!(f, "Temperatura baixa ({v:.1}°C < {TEMPERATURE_MIN}°C)")
            }
            AlertCondition::TemperatureHigh(v) => {
                write!(f, "Temperatura alta ({v:.1}°C > {TEMPERATURE_MAX}°C)")
            }
            AlertCondition::TdsHigh(v) => write!(f, "TDS alto ({v:.1} > {TDS_MAX})"),
        }
    }
}

/// Result of evaluating one reading: the complete values plus every
/// violated bound, in a stable order.
#[derive(Debug, Clone)]
pub struct AlertSet {
    // ---
    pub values: WaterValues,
    pub conditions: Vec<AlertCondition>,
}

impl AlertSet {
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Notification body: all conditions joined as a bulleted list.
    pub fn body(&self) -> String {
        // ---
        self.conditions
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n• ")
    }
}

// ---

/// Evaluate a reading against the potability bounds.
///
/// Returns every violated dimension in a stable order (pH low, pH high,
/// turbidity, temperature low, temperature high, TDS), or an
/// [`IncompleteReading`] error if any dimension is absent.
pub fn evaluate(reading: &NewMeasurement) -> Result<AlertSet, IncompleteReading> {
    // ---
    let values = complete(reading)?;

    let mut conditions = Vec::new();
    if values.ph < PH_MIN {
        conditions.push(AlertCondition::PhLow(values.ph));
    }
    if values.ph > PH_MAX {
        conditions.push(AlertCondition::PhHigh(values.ph));
    }
    if values.turbidity > TURBIDITY_MAX {
        conditions.push(AlertCondition::TurbidityHigh(values.turbidity));
    }
    if values.temperature < TEMPERATURE_MIN {
        conditions.push(AlertCondition::TemperatureLow(values.temperature));
    }
    if values.temperature > TEMPERATURE_MAX {
        conditions.push(AlertCondition::TemperatureHigh(values.temperature));
    }
    if values.tds > TDS_MAX {
        conditions.push(AlertCondition::TdsHigh(values.tds));
    }

    Ok(AlertSet { values, conditions })
}

/// Require all four dimensions, reporting every missing one by name.
fn complete(reading: &NewMeasurement) -> Result<WaterValues, IncompleteReading> {
    // ---
    let mut missing = Vec::new();
    if reading.ph.is_none() {
        missing.push("ph");
    }
    if reading.turbidity.is_none() {
        missing.push("turbidity");
    }
    if reading.temperature.is_none() {
        missing.push("temperature");
    }
    if reading.tds.is_none() {
        missing.push("tds");
    }
    if !missing.is_empty() {
        return Err(IncompleteReading { missing });
    }

    Ok(WaterValues {
        ph: reading.ph.unwrap_or_default(),
        turbidity: reading.turbidity.unwrap_or_default(),
        temperature: reading.temperature.unwrap_or_default(),
        tds: reading.tds.unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    fn create_test_reading(ph: f64, turbidity: f64, temperature: f64, tds: f64) -> NewMeasurement {
        // ---
        NewMeasurement {
            ph: Some(ph),
            turbidity: Some(turbidity),
            temperature: Some(temperature),
            tds: Some(tds),
        }
    }

    #[test]
    fn test_in_bounds_reading_has_no_conditions() {
        // ---
        let set = evaluate(&create_test_reading(7.0, 2.0, 22.0, 100.0)).unwrap();
        assert!(set.is_empty());

        // Boundary values are still acceptable
        let set = evaluate(&create_test_reading(6.5, 5.0, 10.0, 500.0)).unwrap();
        assert!(set.is_empty());
        let set = evaluate(&create_test_reading(8.5, 0.0, 30.0, 0.0)).unwrap();
        assert!(set.is_empty());
    }

    #[test]
    fn test_single_violation_names_bound_and_value() {
        // ---
        let set = evaluate(&create_test_reading(5.0, 2.0, 22.0, 100.0)).unwrap();
        assert_eq!(set.conditions, vec![AlertCondition::PhLow(5.0)]);
        assert_eq!(set.conditions[0].to_string(), "pH baixo (5.0 < 6.5)");
        assert_eq!(set.conditions[0].value(), 5.0);
        assert_eq!(set.conditions[0].bound(), PH_MIN);

        let set = evaluate(&create_test_reading(7.0, 7.2, 22.0, 100.0)).unwrap();
        assert_eq!(set.conditions, vec![AlertCondition::TurbidityHigh(7.2)]);
        assert_eq!(set.conditions[0].to_string(), "Turbidez alta (7.2 > 5)");

        let set = evaluate(&create_test_reading(7.0, 2.0, 35.0, 100.0)).unwrap();
        assert_eq!(
            set.conditions[0].to_string(),
            "Temperatura alta (35.0°C > 30°C)"
        );

        let set = evaluate(&create_test_reading(7.0, 2.0, 5.0, 100.0)).unwrap();
        assert_eq!(
            set.conditions[0].to_string(),
            "Temperatura baixa (5.0°C < 10°C)"
        );

        let set = evaluate(&create_test_reading(7.0, 2.0, 22.0, 600.0)).unwrap();
        assert_eq!(set.conditions[0].to_string(), "TDS alto (600.0 > 500)");
    }

    #[test]
    fn test_multiple_violations_reported_together() {
        // ---
        let set = evaluate(&create_test_reading(9.0, 2.0, 22.0, 600.0)).unwrap();
        assert_eq!(
            set.conditions,
            vec![AlertCondition::PhHigh(9.0), AlertCondition::TdsHigh(600.0)]
        );

        // Stable order regardless of which dimensions violate
        let set = evaluate(&create_test_reading(5.0, 9.0, 40.0, 900.0)).unwrap();
        assert_eq!(
            set.conditions,
            vec![
                AlertCondition::PhLow(5.0),
                AlertCondition::TurbidityHigh(9.0),
                AlertCondition::TemperatureHigh(40.0),
                AlertCondition::TdsHigh(900.0),
            ]
        );
    }

    #[test]
    fn test_incomplete_reading_fails_closed() {
        // ---
        let reading = NewMeasurement {
            ph: Some(5.0), // would violate, but evaluation must not run
            turbidity: None,
            temperature: Some(22.0),
            tds: None,
        };
        let err = evaluate(&reading).unwrap_err();
        assert_eq!(err.missing, vec!["turbidity", "tds"]);
        assert_eq!(err.to_string(), "incomplete reading: missing turbidity, tds");
    }

    #[test]
    fn test_evaluation_is_deterministic() {
        // ---
        let reading = create_test_reading(9.0, 6.0, 22.0, 100.0);
        let first = evaluate(&reading).unwrap();
        let second = evaluate(&reading).unwrap();
        assert_eq!(first.conditions, second.conditions);
        assert_eq!(first.values, second.values);
    }

    #[test]
    fn test_body_joins_conditions() {
        // ---
        let set = evaluate(&create_test_reading(9.0, 2.0, 22.0, 600.0)).unwrap();
        assert_eq!(set.body(), "pH alto (9.0 > 8.5)\n• TDS alto (600.0 > 500)");
    }
}
