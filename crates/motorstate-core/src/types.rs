/*!
 * Core data types for motorstate.
 *
 * This module defines the snapshot data model shared by the device and
 * engine crates: motor identifiers, attribute keys, attribute values and
 * the allow-list of writable attributes.
 */
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Well-known attribute keys with special handling
pub mod keys {
    /// Holds the free-text axis name; never coerced to a number
    pub const AXIS_NAME: &str = "zmx:AxisName";

    /// Driven as a side effect of other operations; never written directly
    pub const DEACTIVATION: &str = "zmx:Deactivation";

    /// Discrete delay setting, written as a lookup-table code
    pub const CURRENT_DELAY_TIME: &str = "zmx:CurrentDelayTime";
}

/// Lookup table of the discrete current delay setting
///
/// The power stage reports the delay in milliseconds but only accepts one of
/// sixteen table codes when it is written.
pub mod delay {
    /// Displayed delay in milliseconds and its table code
    pub const TABLE: [(i64, i64); 16] = [
        (0, 0),
        (4, 1),
        (8, 2),
        (12, 3),
        (16, 4),
        (20, 5),
        (24, 6),
        (28, 7),
        (32, 8),
        (36, 9),
        (40, 10),
        (44, 11),
        (48, 12),
        (52, 13),
        (56, 14),
        (60, 15),
    ];

    /// Table code of a displayed delay, if it is one of the discrete settings
    pub fn code_for(displayed_ms: f64) -> Option<i64> {
        TABLE
            .iter()
            .find(|(ms, _)| *ms as f64 == displayed_ms)
            .map(|(_, code)| *code)
    }

    /// Displayed delay of a table code
    pub fn displayed_for(code: i64) -> Option<i64> {
        TABLE.iter().find(|(_, c)| *c == code).map(|(ms, _)| *ms)
    }
}

/// Identifier of one physical motor within a server group, e.g. `EH1A.07`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MotorId(String);

impl MotorId {
    /// Create a motor ID from a string
    pub fn from_string<S: AsRef<str>>(s: S) -> Self {
        Self(s.as_ref().to_string())
    }

    /// Create the identifier of device `index` in `group`, zero-padded to two digits
    pub fn from_group(group: &str, index: u32) -> Self {
        Self(format!("{}.{:02}", group, index))
    }

    /// Get the string representation of the ID
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MotorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for MotorId {
    fn from(s: &str) -> Self {
        Self::from_string(s)
    }
}

impl From<String> for MotorId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// The two cooperating endpoints that control one motor
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EndpointClass {
    /// Motion controller endpoint (`oms`)
    Primary,
    /// Power stage endpoint (`zmx`); the only one that supports commit
    Secondary,
}

impl EndpointClass {
    /// All endpoint classes, in read order
    pub const ALL: [EndpointClass; 2] = [EndpointClass::Primary, EndpointClass::Secondary];

    /// The token used in attribute keys
    pub fn as_str(&self) -> &'static str {
        match self {
            EndpointClass::Primary => "oms",
            EndpointClass::Secondary => "zmx",
        }
    }
}

impl fmt::Display for EndpointClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EndpointClass {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "oms" => Ok(EndpointClass::Primary),
            "zmx" => Ok(EndpointClass::Secondary),
            _ => Err(Error::validation(format!("Unknown endpoint class '{}'", s))),
        }
    }
}

/// Attribute key in its serialized `<class>:<name>` form
///
/// Keys read back from snapshot files are kept verbatim; the class is only
/// checked by [`AttributeKey::split`] when the key is routed to an endpoint.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AttributeKey(String);

impl AttributeKey {
    /// Build the key of `name` on an endpoint of `class`
    pub fn new(class: EndpointClass, name: &str) -> Self {
        Self(format!("{}:{}", class.as_str(), name))
    }

    /// Get the serialized key
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Split the key into its endpoint class and attribute name
    pub fn split(&self) -> Result<(EndpointClass, &str)> {
        let (class, name) = self.0.split_once(':').ok_or_else(|| {
            Error::validation(format!("Attribute key '{}' has no endpoint class", self.0))
        })?;

        if name.is_empty() {
            return Err(Error::validation(format!(
                "Attribute key '{}' has no attribute name",
                self.0
            )));
        }

        Ok((class.parse()?, name))
    }
}

impl fmt::Display for AttributeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AttributeKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for AttributeKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// An attribute value as read from or written to an endpoint
///
/// Unreadable attributes are represented by the not-a-number sentinel,
/// `Value::Float(f64::NAN)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Integer value
    Integer(i64),
    /// Floating-point value
    Float(f64),
    /// String value
    String(String),
}

impl Value {
    /// The not-a-number sentinel recorded for unreadable attributes
    pub fn nan() -> Self {
        Value::Float(f64::NAN)
    }

    /// Check if the value is the not-a-number sentinel
    pub fn is_nan(&self) -> bool {
        matches!(self, Value::Float(f) if f.is_nan())
    }

    /// Check if the value is numeric (integer or float)
    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Integer(_) | Value::Float(_))
    }

    /// Try to get an integer value
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            Value::Float(f) if *f == (*f as i64) as f64 => Some(*f as i64),
            _ => None,
        }
    }

    /// Try to get a float value
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Try to get a string value
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Compare two values the way an operator reads them: numbers by
    /// magnitude regardless of representation, strings exactly.
    pub fn same_as(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::String(a), Value::String(b)) => a == b,
            (a, b) => match (a.as_float(), b.as_float()) {
                (Some(x), Some(y)) => x == y,
                _ => false,
            },
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(i) => write!(f, "{}", i),
            Value::Float(x) if x.is_nan() => f.write_str("nan"),
            // Debug keeps the decimal point so floats stay floats on re-read
            Value::Float(x) => write!(f, "{:?}", x),
            Value::String(s) => f.write_str(s),
        }
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Integer(i as i64)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

/// Attribute values of one motor, ordered by key
pub type AttributeMap = BTreeMap<AttributeKey, Value>;

/// Captured attribute state of a set of motors at one point in time
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    motors: BTreeMap<MotorId, AttributeMap>,
}

impl Snapshot {
    /// Create an empty snapshot
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert the attributes of one motor, returning any previous entry
    pub fn insert(&mut self, motor: MotorId, attributes: AttributeMap) -> Option<AttributeMap> {
        self.motors.insert(motor, attributes)
    }

    /// Get the attributes of one motor
    pub fn get(&self, motor: &MotorId) -> Option<&AttributeMap> {
        self.motors.get(motor)
    }

    /// Check if the snapshot holds a motor
    pub fn contains(&self, motor: &MotorId) -> bool {
        self.motors.contains_key(motor)
    }

    /// Iterate over motors in identifier order
    pub fn iter(&self) -> impl Iterator<Item = (&MotorId, &AttributeMap)> {
        self.motors.iter()
    }

    /// Motor identifiers in order
    pub fn motor_ids(&self) -> impl Iterator<Item = &MotorId> {
        self.motors.keys()
    }

    /// Number of motors
    pub fn len(&self) -> usize {
        self.motors.len()
    }

    /// Check if the snapshot holds no motors
    pub fn is_empty(&self) -> bool {
        self.motors.is_empty()
    }
}

impl FromIterator<(MotorId, AttributeMap)> for Snapshot {
    fn from_iter<I: IntoIterator<Item = (MotorId, AttributeMap)>>(iter: I) -> Self {
        Self {
            motors: iter.into_iter().collect(),
        }
    }
}

/// Ordered set of attribute keys sanctioned for write-back
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllowList {
    keys: BTreeSet<AttributeKey>,
}

impl AllowList {
    /// Build an allow-list, rejecting keys without a recognised endpoint class
    pub fn from_keys<I>(keys: I) -> Result<Self>
    where
        I: IntoIterator<Item = AttributeKey>,
    {
        let mut checked = BTreeSet::new();
        for key in keys {
            key.split()?;
            checked.insert(key);
        }

        Ok(Self { keys: checked })
    }

    /// Check if a key may be written back
    pub fn contains(&self, key: &AttributeKey) -> bool {
        self.keys.contains(key)
    }

    /// Iterate over the keys in order
    pub fn iter(&self) -> impl Iterator<Item = &AttributeKey> {
        self.keys.iter()
    }

    /// Number of keys
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Check if no key may be written
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_motor_id_padding() {
        assert_eq!(MotorId::from_group("EH1A", 7).as_str(), "EH1A.07");
        assert_eq!(MotorId::from_group("EH2B", 47).as_str(), "EH2B.47");
        assert_eq!(format!("{}", MotorId::from("EH1A.01")), "EH1A.01");
    }

    #[test]
    fn test_attribute_key_split() {
        let key = AttributeKey::new(EndpointClass::Secondary, "RunCurrent");
        assert_eq!(key.as_str(), "zmx:RunCurrent");
        assert_eq!(key.split().unwrap(), (EndpointClass::Secondary, "RunCurrent"));

        let key = AttributeKey::from("oms:SlewRate");
        assert_eq!(key.split().unwrap(), (EndpointClass::Primary, "SlewRate"));

        assert!(AttributeKey::from("abc:SlewRate").split().is_err());
        assert!(AttributeKey::from("SlewRate").split().is_err());
        assert!(AttributeKey::from("oms:").split().is_err());
    }

    #[test]
    fn test_value_display_keeps_type() {
        assert_eq!(Value::Integer(4).to_string(), "4");
        assert_eq!(Value::Float(4.0).to_string(), "4.0");
        assert_eq!(Value::Float(4.3).to_string(), "4.3");
        assert_eq!(Value::nan().to_string(), "nan");
        assert_eq!(Value::from("Sample X").to_string(), "Sample X");
    }

    #[test]
    fn test_value_same_as() {
        assert!(Value::Integer(4).same_as(&Value::Float(4.0)));
        assert!(!Value::Integer(4).same_as(&Value::Float(4.5)));
        assert!(Value::from("x").same_as(&Value::from("x")));
        assert!(!Value::from("4").same_as(&Value::Integer(4)));
        assert!(!Value::nan().same_as(&Value::nan()));
    }

    #[test]
    fn test_value_nan_sentinel() {
        assert!(Value::nan().is_nan());
        assert!(!Value::Float(1.0).is_nan());
        assert!(!Value::Integer(0).is_nan());
        assert_eq!(Value::Float(3.0).as_integer(), Some(3));
        assert_eq!(Value::Float(3.5).as_integer(), None);
    }

    #[test]
    fn test_delay_table() {
        assert_eq!(delay::code_for(0.0), Some(0));
        assert_eq!(delay::code_for(20.0), Some(5));
        assert_eq!(delay::code_for(60.0), Some(15));
        assert_eq!(delay::code_for(21.0), None);
        assert_eq!(delay::displayed_for(5), Some(20));
        assert_eq!(delay::displayed_for(16), None);
    }

    #[test]
    fn test_allow_list_rejects_unknown_class() {
        let list = AllowList::from_keys(vec![
            AttributeKey::from("zmx:RunCurrent"),
            AttributeKey::from("oms:Acceleration"),
        ])
        .unwrap();
        assert_eq!(list.len(), 2);
        assert!(list.contains(&AttributeKey::from("zmx:RunCurrent")));
        assert_eq!(
            list.iter().next().map(|k| k.as_str()),
            Some("oms:Acceleration")
        );

        let err = AllowList::from_keys(vec![AttributeKey::from("foo:Bar")]);
        assert!(matches!(err, Err(Error::Validation(_))));
    }

    #[test]
    fn test_snapshot_ordering() {
        let mut snapshot = Snapshot::new();
        snapshot.insert("EH1A.02".into(), AttributeMap::new());
        snapshot.insert("EH1A.01".into(), AttributeMap::new());
        let ids: Vec<_> = snapshot.motor_ids().map(|m| m.as_str()).collect();
        assert_eq!(ids, vec!["EH1A.01", "EH1A.02"]);
        assert!(snapshot.contains(&MotorId::from("EH1A.02")));
        assert_eq!(snapshot.len(), 2);
    }
}
