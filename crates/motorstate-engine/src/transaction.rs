/*!
 * Write-back transactions.
 *
 * A write-back moves through a small state machine. Each attempt records the
 * value an attribute held before it was overwritten, so that a failed
 * write-back can be undone.
 */
use std::collections::HashSet;
use std::fmt;

use motorstate_core::types::{AttributeKey, MotorId, Value};

/// State of a write-back
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WriteState {
    /// First pass over the eligible attributes
    Attempt,
    /// Second pass, skipping attributes the first pass wrote
    Retry,
    /// Restoring recorded values after two failed passes
    Rollback,
    /// Rolled back; the run stops
    Abort,
    /// All values written and committed
    Committed,
}

impl WriteState {
    /// Next state after the current pass succeeded
    pub fn on_success(self) -> WriteState {
        match self {
            WriteState::Attempt | WriteState::Retry => WriteState::Committed,
            WriteState::Rollback => WriteState::Abort,
            final_state => final_state,
        }
    }

    /// Next state after the current pass failed
    ///
    /// A failed rollback has no successor state; the caller reports it.
    pub fn on_failure(self) -> WriteState {
        match self {
            WriteState::Attempt => WriteState::Retry,
            WriteState::Retry => WriteState::Rollback,
            other => other,
        }
    }

    /// Check if the write-back is over
    pub fn is_final(&self) -> bool {
        matches!(self, WriteState::Abort | WriteState::Committed)
    }
}

impl fmt::Display for WriteState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WriteState::Attempt => "attempt",
            WriteState::Retry => "retry",
            WriteState::Rollback => "rollback",
            WriteState::Abort => "abort",
            WriteState::Committed => "committed",
        };
        f.write_str(name)
    }
}

/// Values an attribute held before a write-back overwrote it
#[derive(Debug, Clone)]
pub struct WriteTransaction {
    motor: MotorId,
    entries: Vec<(AttributeKey, Value)>,
}

impl WriteTransaction {
    /// Start an empty transaction for `motor`
    pub fn new(motor: MotorId) -> Self {
        Self {
            motor,
            entries: Vec::new(),
        }
    }

    /// Motor the transaction belongs to
    pub fn motor(&self) -> &MotorId {
        &self.motor
    }

    /// Record the value `key` held before being written
    pub fn record(&mut self, key: AttributeKey, previous: Value) {
        self.entries.push((key, previous));
    }

    /// Recorded entries in recording order
    pub fn entries(&self) -> &[(AttributeKey, Value)] {
        &self.entries
    }

    /// Number of recorded entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if nothing was recorded
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Values to restore, most recently recorded key first
    ///
    /// A key recorded more than once is restored to its earliest value, the
    /// one it held before the write-back started.
    pub fn restore_plan(&self) -> Vec<(AttributeKey, Value)> {
        let mut seen = HashSet::new();
        let mut plan: Vec<_> = self
            .entries
            .iter()
            .filter(|(key, _)| seen.insert(key))
            .cloned()
            .collect();
        plan.reverse();
        plan
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_transitions() {
        assert_eq!(WriteState::Attempt.on_success(), WriteState::Committed);
        assert_eq!(WriteState::Attempt.on_failure(), WriteState::Retry);
        assert_eq!(WriteState::Retry.on_success(), WriteState::Committed);
        assert_eq!(WriteState::Retry.on_failure(), WriteState::Rollback);
        assert_eq!(WriteState::Rollback.on_success(), WriteState::Abort);
        assert!(WriteState::Abort.is_final());
        assert!(!WriteState::Rollback.is_final());
        assert_eq!(WriteState::Rollback.to_string(), "rollback");
    }

    #[test]
    fn test_restore_plan_keeps_earliest_value() {
        let mut tx = WriteTransaction::new(MotorId::from("EH1A.01"));
        tx.record("oms:BaseRate".into(), Value::Integer(200));
        tx.record("oms:SlewRate".into(), Value::Integer(4000));
        tx.record("oms:SlewRate".into(), Value::Integer(4500));
        tx.record("zmx:RunCurrent".into(), Value::Float(1.2));
        assert_eq!(tx.len(), 4);

        let plan = tx.restore_plan();
        assert_eq!(
            plan,
            vec![
                (AttributeKey::from("zmx:RunCurrent"), Value::Float(1.2)),
                (AttributeKey::from("oms:SlewRate"), Value::Integer(4000)),
                (AttributeKey::from("oms:BaseRate"), Value::Integer(200)),
            ]
        );
    }

    #[test]
    fn test_empty_transaction() {
        let tx = WriteTransaction::new(MotorId::from("EH1A.01"));
        assert!(tx.is_empty());
        assert!(tx.restore_plan().is_empty());
        assert_eq!(tx.motor().as_str(), "EH1A.01");
    }
}
