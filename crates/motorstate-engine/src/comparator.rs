/*!
 * Snapshot comparison.
 *
 * Compares a captured snapshot with freshly read state. Only attributes of
 * the captured snapshot are checked; attributes that exist only on the live
 * devices never count as drift.
 */
use std::fmt;

use tracing::{debug, info};

use motorstate_core::types::{AttributeKey, AttributeMap, MotorId, Snapshot, Value};

use crate::error::{Error, Result};

/// One attribute whose live value differs from the captured one
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeDifference {
    /// Attribute key
    pub key: AttributeKey,
    /// Captured value
    pub captured: Value,
    /// Live value, `None` if the attribute no longer exists
    pub live: Option<Value>,
}

/// Per-motor verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Every captured attribute matches
    Same,
    /// At least one captured attribute differs
    Different,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Same => f.write_str("same"),
            Verdict::Different => f.write_str("DIFFERENT"),
        }
    }
}

/// Comparison result of one motor
#[derive(Debug, Clone, PartialEq)]
pub struct MotorComparison {
    /// Motor identifier
    pub motor: MotorId,
    /// Differing attributes, in key order
    pub differences: Vec<AttributeDifference>,
}

impl MotorComparison {
    /// Aggregate verdict
    pub fn verdict(&self) -> Verdict {
        if self.differences.is_empty() {
            Verdict::Same
        } else {
            Verdict::Different
        }
    }
}

/// Comparison result of a whole run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ComparisonReport {
    /// Per-motor results, in motor order
    pub motors: Vec<MotorComparison>,
}

impl ComparisonReport {
    /// Check if no motor drifted
    pub fn is_clean(&self) -> bool {
        self.motors.iter().all(|m| m.verdict() == Verdict::Same)
    }

    /// Motors with at least one difference
    pub fn drifted(&self) -> impl Iterator<Item = &MotorComparison> {
        self.motors
            .iter()
            .filter(|m| m.verdict() == Verdict::Different)
    }
}

impl fmt::Display for ComparisonReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for comparison in &self.motors {
            for difference in &comparison.differences {
                let live = difference
                    .live
                    .as_ref()
                    .map(|v| v.to_string())
                    .unwrap_or_else(|| "missing".to_string());
                writeln!(
                    f,
                    "{} on {}: {} -> {}",
                    difference.key, comparison.motor, difference.captured, live
                )?;
            }
            writeln!(f, "{}: {}", comparison.motor, comparison.verdict())?;
        }
        Ok(())
    }
}

/// Compare the attributes of one motor
pub fn compare_motor(motor: &MotorId, captured: &AttributeMap, live: &AttributeMap) -> MotorComparison {
    let differences: Vec<_> = captured
        .iter()
        .filter_map(|(key, value)| match live.get(key) {
            Some(current) if current.same_as(value) => None,
            current => Some(AttributeDifference {
                key: key.clone(),
                captured: value.clone(),
                live: current.cloned(),
            }),
        })
        .collect();

    for difference in &differences {
        debug!("{} on {} differs", difference.key, motor);
    }

    MotorComparison {
        motor: motor.clone(),
        differences,
    }
}

/// Compare every motor of `live` with its captured state
///
/// Fails with [`Error::MissingMotor`] if `captured` does not cover a motor.
pub fn compare(captured: &Snapshot, live: &Snapshot) -> Result<ComparisonReport> {
    let mut report = ComparisonReport::default();

    for (motor, current) in live.iter() {
        let expected = captured
            .get(motor)
            .ok_or_else(|| Error::MissingMotor(motor.to_string()))?;
        let comparison = compare_motor(motor, expected, current);
        info!("{}: {}", motor, comparison.verdict());
        report.motors.push(comparison);
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parameters(entries: &[(&str, Value)]) -> AttributeMap {
        entries
            .iter()
            .map(|(k, v)| (AttributeKey::from(*k), v.clone()))
            .collect()
    }

    #[test]
    fn test_same_motor() {
        let captured = parameters(&[("oms:SlewRate", Value::Integer(4000))]);
        let live = parameters(&[
            ("oms:SlewRate", Value::Float(4000.0)),
            ("oms:Position", Value::Float(12.5)),
        ]);

        let comparison = compare_motor(&MotorId::from("EH1A.01"), &captured, &live);
        assert_eq!(comparison.verdict(), Verdict::Same);
        assert_eq!(comparison.verdict().to_string(), "same");
    }

    #[test]
    fn test_different_motor() {
        let captured = parameters(&[
            ("oms:SlewRate", Value::Integer(4000)),
            ("zmx:RunCurrent", Value::Float(1.2)),
        ]);
        let live = parameters(&[("oms:SlewRate", Value::Integer(5000))]);

        let comparison = compare_motor(&MotorId::from("EH1A.01"), &captured, &live);
        assert_eq!(comparison.verdict().to_string(), "DIFFERENT");
        assert_eq!(
            comparison.differences,
            vec![
                AttributeDifference {
                    key: "oms:SlewRate".into(),
                    captured: Value::Integer(4000),
                    live: Some(Value::Integer(5000)),
                },
                AttributeDifference {
                    key: "zmx:RunCurrent".into(),
                    captured: Value::Float(1.2),
                    live: None,
                },
            ]
        );
    }

    #[test]
    fn test_report_rendering() {
        let mut captured = Snapshot::new();
        captured.insert("EH1A.01".into(), parameters(&[("oms:BaseRate", Value::Integer(200))]));
        captured.insert("EH1A.02".into(), parameters(&[("oms:BaseRate", Value::Integer(200))]));
        let mut live = Snapshot::new();
        live.insert("EH1A.01".into(), parameters(&[("oms:BaseRate", Value::Integer(200))]));
        live.insert("EH1A.02".into(), parameters(&[("oms:BaseRate", Value::Integer(250))]));

        let report = compare(&captured, &live).unwrap();
        assert!(!report.is_clean());
        assert_eq!(report.drifted().count(), 1);
        assert_eq!(
            report.to_string(),
            "EH1A.01: same\noms:BaseRate on EH1A.02: 200 -> 250\nEH1A.02: DIFFERENT\n"
        );
    }

    #[test]
    fn test_missing_motor() {
        let captured = Snapshot::new();
        let mut live = Snapshot::new();
        live.insert("EH1A.03".into(), AttributeMap::new());

        assert!(matches!(compare(&captured, &live), Err(Error::MissingMotor(m)) if m == "EH1A.03"));
    }
}
