/*!
 * Snapshot codec.
 *
 * A snapshot is stored as plain text, one motor per line:
 *
 * ```text
 * EH1A.01,oms:Acceleration,40000.0,zmx:AxisName,Sample X,zmx:RunCurrent,1.2
 * ```
 *
 * The first field is the motor identifier, followed by alternating attribute
 * keys and values. Files that went through a spreadsheet often carry trailing
 * empty fields; those are ignored on decode.
 *
 * Next to the two snapshot files a tab-separated table of the main motor
 * settings is written for people to read. It is never decoded.
 */
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone};
use tracing::{debug, info, warn};

use motorstate_core::types::{keys, AllowList, AttributeKey, AttributeMap, MotorId, Snapshot, Value};
use motorstate_core::utils::timestamp_suffix;

use crate::error::{Error, Result};

/// Field separator
pub const SEPARATOR: char = ',';

/// File extension of snapshot files
pub const EXTENSION: &str = "csv";

/// Marker appended to the name of the reduced snapshot file
pub const REDUCED_MARKER: &str = "_reduced";

/// Marker appended to the name of the readable table
pub const TABLE_MARKER: &str = "_table";

/// File extension of the readable table
pub const TABLE_EXTENSION: &str = "txt";

/// Attributes shown in the readable table, in column order
pub const TABLE_COLUMNS: [&str; 8] = [
    "oms:Acceleration",
    "oms:Conversion",
    "oms:BaseRate",
    "oms:SlewRate",
    "oms:SlewRateMax",
    "zmx:RunCurrent",
    "zmx:StopCurrent",
    keys::AXIS_NAME,
];

/// Encode every attribute of every motor
pub fn encode(snapshot: &Snapshot) -> Result<String> {
    encode_filtered(snapshot, |_| true)
}

/// Encode only the attributes on the allow-list
pub fn encode_reduced(snapshot: &Snapshot, allow_list: &AllowList) -> Result<String> {
    encode_filtered(snapshot, |key| allow_list.contains(key))
}

fn encode_filtered<F>(snapshot: &Snapshot, keep: F) -> Result<String>
where
    F: Fn(&AttributeKey) -> bool,
{
    let mut out = String::new();
    for (motor, parameters) in snapshot.iter() {
        check_field(motor.as_str(), motor)?;
        out.push_str(motor.as_str());

        for (key, value) in parameters.iter().filter(|(key, _)| keep(key)) {
            if !storable(key, value) {
                warn!("Not saving text value of {} for {}", key, motor);
                continue;
            }

            let value = value.to_string();
            check_field(key.as_str(), motor)?;
            check_field(&value, motor)?;

            out.push(SEPARATOR);
            out.push_str(key.as_str());
            out.push(SEPARATOR);
            out.push_str(&value);
        }
        out.push('\n');
    }

    Ok(out)
}

/// Only the axis name may hold text; anything else would not decode
fn storable(key: &AttributeKey, value: &Value) -> bool {
    !matches!(value, Value::String(_)) || key.as_str() == keys::AXIS_NAME
}

fn check_field(field: &str, motor: &MotorId) -> Result<()> {
    if field.contains(SEPARATOR) || field.contains('\n') || field.contains('\r') {
        return Err(Error::format(
            0,
            format!("'{}' of {} cannot be stored in a snapshot field", field, motor),
        ));
    }
    Ok(())
}

/// Decode snapshot text
///
/// Blank lines, including lines of empty fields only, are skipped. Values are
/// read as integers, then floats; the free-text axis name is kept as a string.
/// Not-a-number values are dropped so they can never be written back.
pub fn decode(text: &str) -> Result<Snapshot> {
    let mut snapshot = Snapshot::new();

    for (index, line) in text.lines().enumerate() {
        let number = index + 1;
        let line = line.trim_end_matches('\r');
        if line.trim().split(SEPARATOR).all(|field| field.trim().is_empty()) {
            continue;
        }

        let (motor, parameters) = decode_line(line, number)?;
        if snapshot.contains(&motor) {
            return Err(Error::format(number, format!("Motor {} appears twice", motor)));
        }
        snapshot.insert(motor, parameters);
    }

    Ok(snapshot)
}

fn decode_line(line: &str, number: usize) -> Result<(MotorId, AttributeMap)> {
    let mut fields: Vec<&str> = line.split(SEPARATOR).collect();

    let before = fields.len();
    while fields.last().is_some_and(|field| field.is_empty()) {
        fields.pop();
    }
    // An empty last value is still a value
    if before > fields.len() && fields.len() % 2 == 0 {
        fields.push("");
    }

    let (motor, pairs) = match fields.split_first() {
        Some((motor, pairs)) if !motor.trim().is_empty() => (MotorId::from(*motor), pairs),
        _ => return Err(Error::format(number, "Missing motor identifier")),
    };

    if pairs.len() % 2 != 0 {
        return Err(Error::format(
            number,
            format!("Attribute {} of {} has no value", pairs[pairs.len() - 1], motor),
        ));
    }

    let mut parameters = AttributeMap::new();
    for pair in pairs.chunks(2) {
        let (key, raw) = (pair[0], pair[1]);
        if key.trim().is_empty() {
            return Err(Error::format(number, format!("Empty attribute key for {}", motor)));
        }

        let key = AttributeKey::from(key);
        if parameters.contains_key(&key) {
            return Err(Error::format(
                number,
                format!("Attribute {} of {} appears twice", key, motor),
            ));
        }

        let value = decode_value(&key, raw, number)?;
        if value.is_nan() {
            debug!("Dropping nan value of {} for {}", key, motor);
            continue;
        }
        parameters.insert(key, value);
    }

    Ok((motor, parameters))
}

/// Coerce one raw field into a value
///
/// The axis name is kept verbatim. Numbers may be padded with whitespace.
pub fn decode_value(key: &AttributeKey, raw: &str, line: usize) -> Result<Value> {
    if key.as_str() == keys::AXIS_NAME {
        return Ok(Value::String(raw.to_string()));
    }

    let number = raw.trim();
    if let Ok(i) = number.parse::<i64>() {
        return Ok(Value::Integer(i));
    }
    if let Ok(f) = number.parse::<f64>() {
        return Ok(Value::Float(f));
    }

    Err(Error::format(
        line,
        format!("Value '{}' of {} is not a number", raw, key),
    ))
}

/// Encode the readable table of [`TABLE_COLUMNS`]
///
/// One header row, then one row per motor. Numbers are printed with five
/// decimals; a missing attribute shows as `-`.
pub fn encode_table(snapshot: &Snapshot) -> Result<String> {
    let mut out = String::from("DeviceName");
    for column in TABLE_COLUMNS {
        let name = column.split_once(':').map_or(column, |(_, name)| name);
        out.push('\t');
        out.push_str(name);
    }
    out.push('\n');

    for (motor, parameters) in snapshot.iter() {
        check_cell(motor.as_str(), motor)?;
        out.push_str(motor.as_str());

        for column in TABLE_COLUMNS {
            let cell = match parameters.get(&AttributeKey::from(column)) {
                Some(Value::String(text)) => text.clone(),
                Some(value) if value.is_nan() => "nan".to_string(),
                Some(value) => value
                    .as_float()
                    .map(|f| format!("{:.5}", f))
                    .unwrap_or_else(|| value.to_string()),
                None => "-".to_string(),
            };
            check_cell(&cell, motor)?;
            out.push('\t');
            out.push_str(&cell);
        }
        out.push('\n');
    }

    Ok(out)
}

fn check_cell(cell: &str, motor: &MotorId) -> Result<()> {
    if cell.contains('\t') || cell.contains('\n') || cell.contains('\r') {
        return Err(Error::format(
            0,
            format!("'{}' of {} cannot be stored in a table cell", cell, motor),
        ));
    }
    Ok(())
}

/// Paths of the files written for one snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotFiles {
    /// Every captured attribute
    pub full: PathBuf,
    /// Allow-listed attributes only
    pub reduced: PathBuf,
    /// Readable table
    pub table: PathBuf,
}

/// Write the full and the reduced snapshot file and the readable table into
/// `dir`
///
/// File names are `<prefix>_<YYYYMMDD_HHMMSS>.csv`, the same with the reduced
/// marker before the extension, and `<prefix>_<YYYYMMDD_HHMMSS>_table.txt`.
pub fn write_snapshot_files<Tz>(
    dir: &Path,
    prefix: &str,
    snapshot: &Snapshot,
    allow_list: &AllowList,
    at: &DateTime<Tz>,
) -> Result<SnapshotFiles>
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    let stem = format!("{}_{}", prefix, timestamp_suffix(at));
    let files = SnapshotFiles {
        full: dir.join(format!("{}.{}", stem, EXTENSION)),
        reduced: dir.join(format!("{}{}.{}", stem, REDUCED_MARKER, EXTENSION)),
        table: dir.join(format!("{}{}.{}", stem, TABLE_MARKER, TABLE_EXTENSION)),
    };

    let full = encode(snapshot)?;
    let reduced = encode_reduced(snapshot, allow_list)?;
    let table = encode_table(snapshot)?;

    fs::create_dir_all(dir)?;
    fs::write(&files.full, full)?;
    fs::write(&files.reduced, reduced)?;
    fs::write(&files.table, table)?;

    info!(
        "Saved {} motors to {} and {}",
        snapshot.len(),
        files.full.display(),
        files.reduced.display()
    );
    debug!("Wrote table {}", files.table.display());
    Ok(files)
}

/// Read and decode a snapshot file
pub fn read_snapshot_file<P: AsRef<Path>>(path: P) -> Result<Snapshot> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)?;
    let snapshot = decode(&text)?;
    info!("Loaded {} motors from {}", snapshot.len(), path.display());
    Ok(snapshot)
}

/// Motors of `motors` that `snapshot` does not cover
pub fn missing_motors<'a, I>(snapshot: &Snapshot, motors: I) -> Vec<MotorId>
where
    I: IntoIterator<Item = &'a MotorId>,
{
    let mut missing: BTreeSet<MotorId> = BTreeSet::new();
    for motor in motors {
        if !snapshot.contains(motor) {
            missing.insert(motor.clone());
        }
    }
    missing.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Local, TimeZone};
    use tempfile::tempdir;

    fn parameters(entries: &[(&str, Value)]) -> AttributeMap {
        entries
            .iter()
            .map(|(k, v)| (AttributeKey::from(*k), v.clone()))
            .collect()
    }

    #[test]
    fn test_decode_coerces_values() {
        let snapshot = decode("M1,k,4.3,k2,7\n").unwrap();
        let m1 = snapshot.get(&MotorId::from("M1")).unwrap();
        assert_eq!(m1[&AttributeKey::from("k")], Value::Float(4.3));
        assert_eq!(m1[&AttributeKey::from("k2")], Value::Integer(7));
    }

    #[test]
    fn test_decode_ignores_trailing_empty_fields() {
        let snapshot = decode("M1,oms:SlewRate,4000,,,\r\n\nM2,oms:SlewRate,3000,\n").unwrap();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(
            snapshot.get(&MotorId::from("M2")).unwrap()[&AttributeKey::from("oms:SlewRate")],
            Value::Integer(3000)
        );
    }

    #[test]
    fn test_decode_keeps_axis_name_as_text() {
        let snapshot = decode("M1,zmx:AxisName,42,zmx:RunCurrent,1.0\n").unwrap();
        let m1 = snapshot.get(&MotorId::from("M1")).unwrap();
        assert_eq!(m1[&AttributeKey::from(keys::AXIS_NAME)], Value::from("42"));
        assert_eq!(m1[&AttributeKey::from("zmx:RunCurrent")], Value::Float(1.0));

        let snapshot = decode("M1,zmx:AxisName,\n").unwrap();
        assert_eq!(
            snapshot.get(&MotorId::from("M1")).unwrap()[&AttributeKey::from(keys::AXIS_NAME)],
            Value::from("")
        );
    }

    #[test]
    fn test_decode_drops_nan() {
        let snapshot = decode("M1,oms:Position,nan,oms:BaseRate,200\n").unwrap();
        let m1 = snapshot.get(&MotorId::from("M1")).unwrap();
        assert_eq!(m1.len(), 1);
        assert!(!m1.contains_key(&AttributeKey::from("oms:Position")));
    }

    #[test]
    fn test_decode_errors() {
        assert!(matches!(
            decode("M1,k,1\nM2,k\n"),
            Err(Error::Format { line: 2, .. })
        ));
        assert!(matches!(decode("M1,k,abc\n"), Err(Error::Format { line: 1, .. })));
        assert!(matches!(decode(",k,1\n"), Err(Error::Format { .. })));
        assert!(matches!(decode("M1,k,1\nM1,k,2\n"), Err(Error::Format { line: 2, .. })));
        assert!(matches!(decode("M1,k,1,k,2\n"), Err(Error::Format { .. })));
        assert!(matches!(decode("M1,,1\n"), Err(Error::Format { .. })));
    }

    #[test]
    fn test_empty_input() {
        assert!(decode("").unwrap().is_empty());
        assert!(decode("\n  \n,,,\n").unwrap().is_empty());
        assert_eq!(encode(&Snapshot::new()).unwrap(), "");
    }

    #[test]
    fn test_encode_is_ordered_and_reloads() {
        let mut snapshot = Snapshot::new();
        snapshot.insert(
            "EH1A.02".into(),
            parameters(&[
                ("zmx:RunCurrent", Value::Float(1.0)),
                ("oms:BaseRate", Value::Integer(200)),
                ("zmx:AxisName", Value::from("Sample X")),
            ]),
        );
        snapshot.insert("EH1A.01".into(), parameters(&[("oms:Position", Value::nan())]));

        let text = encode(&snapshot).unwrap();
        assert_eq!(
            text,
            "EH1A.01,oms:Position,nan\n\
             EH1A.02,oms:BaseRate,200,zmx:AxisName,Sample X,zmx:RunCurrent,1.0\n"
        );

        let reloaded = decode(&text).unwrap();
        assert_eq!(reloaded.get(&"EH1A.02".into()), snapshot.get(&"EH1A.02".into()));
        assert!(reloaded.get(&"EH1A.01".into()).unwrap().is_empty());
    }

    #[test]
    fn test_encode_rejects_separator_in_value() {
        let mut snapshot = Snapshot::new();
        snapshot.insert("M1".into(), parameters(&[("zmx:AxisName", Value::from("a,b"))]));
        assert!(encode(&snapshot).is_err());
    }

    #[test]
    fn test_encode_reduced() {
        let allow = AllowList::from_keys(vec![AttributeKey::from("zmx:RunCurrent")]).unwrap();
        let mut snapshot = Snapshot::new();
        snapshot.insert(
            "M1".into(),
            parameters(&[
                ("zmx:RunCurrent", Value::Float(1.0)),
                ("zmx:Temperature", Value::Float(31.5)),
            ]),
        );
        assert_eq!(encode_reduced(&snapshot, &allow).unwrap(), "M1,zmx:RunCurrent,1.0\n");
    }

    #[test]
    fn test_write_and_read_snapshot_files() {
        let dir = tempdir().unwrap();
        let allow = AllowList::from_keys(vec![AttributeKey::from("oms:BaseRate")]).unwrap();
        let mut snapshot = Snapshot::new();
        snapshot.insert(
            "EH1A.01".into(),
            parameters(&[
                ("oms:BaseRate", Value::Integer(200)),
                ("oms:Position", Value::Float(1.5)),
            ]),
        );
        let at = Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();

        let files = write_snapshot_files(dir.path(), "motor_parameters", &snapshot, &allow, &at)
            .unwrap();
        assert_eq!(
            files.full.file_name().unwrap(),
            "motor_parameters_20240309_140507.csv"
        );
        assert_eq!(
            files.reduced.file_name().unwrap(),
            "motor_parameters_20240309_140507_reduced.csv"
        );
        assert_eq!(
            files.table.file_name().unwrap(),
            "motor_parameters_20240309_140507_table.txt"
        );
        assert!(fs::read_to_string(&files.table)
            .unwrap()
            .starts_with("DeviceName\tAcceleration\t"));

        assert_eq!(read_snapshot_file(&files.full).unwrap(), snapshot);
        let reduced = read_snapshot_file(&files.reduced).unwrap();
        assert_eq!(reduced.get(&"EH1A.01".into()).unwrap().len(), 1);
    }

    #[test]
    fn test_text_attribute_is_not_saved() {
        let mut snapshot = Snapshot::new();
        snapshot.insert(
            "M1".into(),
            parameters(&[
                ("oms:State", Value::from("ON")),
                ("oms:BaseRate", Value::Integer(200)),
            ]),
        );

        let text = encode(&snapshot).unwrap();
        assert_eq!(text, "M1,oms:BaseRate,200\n");

        let reloaded = decode(&text).unwrap();
        assert_eq!(
            reloaded.get(&"M1".into()).unwrap(),
            &parameters(&[("oms:BaseRate", Value::Integer(200))])
        );
    }

    #[test]
    fn test_axis_name_whitespace_survives_reload() {
        let mut snapshot = Snapshot::new();
        snapshot.insert(
            "M1".into(),
            parameters(&[
                ("zmx:AxisName", Value::from(" Sample X ")),
                ("zmx:RunCurrent", Value::Float(1.2)),
            ]),
        );

        let text = encode(&snapshot).unwrap();
        assert_eq!(decode(&text).unwrap(), snapshot);

        // Padded numbers still coerce
        let padded = decode("M1,oms:BaseRate, 200 \n").unwrap();
        assert_eq!(
            padded.get(&"M1".into()).unwrap()[&AttributeKey::from("oms:BaseRate")],
            Value::Integer(200)
        );
    }

    #[test]
    fn test_encode_table() {
        let mut snapshot = Snapshot::new();
        snapshot.insert(
            "EH1A.02".into(),
            parameters(&[("oms:BaseRate", Value::Integer(250))]),
        );
        snapshot.insert(
            "EH1A.01".into(),
            parameters(&[
                ("oms:Acceleration", Value::Float(40000.0)),
                ("oms:Conversion", Value::Float(0.00125)),
                ("oms:BaseRate", Value::Integer(200)),
                ("oms:SlewRate", Value::Integer(4000)),
                ("oms:SlewRateMax", Value::Integer(8000)),
                ("oms:Position", Value::Float(3.0)),
                ("zmx:RunCurrent", Value::Float(1.2)),
                ("zmx:StopCurrent", Value::Float(0.6)),
                ("zmx:AxisName", Value::from("Sample X")),
            ]),
        );

        let table = encode_table(&snapshot).unwrap();
        let lines: Vec<_> = table.lines().collect();
        assert_eq!(
            lines,
            vec![
                "DeviceName\tAcceleration\tConversion\tBaseRate\tSlewRate\tSlewRateMax\t\
                 RunCurrent\tStopCurrent\tAxisName",
                "EH1A.01\t40000.00000\t0.00125\t200.00000\t4000.00000\t8000.00000\t\
                 1.20000\t0.60000\tSample X",
                "EH1A.02\t-\t-\t250.00000\t-\t-\t-\t-\t-",
            ]
        );
    }

    #[test]
    fn test_missing_motors() {
        let snapshot = decode("M1,k,1\nM3,k,1\n").unwrap();
        let wanted = [MotorId::from("M1"), MotorId::from("M2"), MotorId::from("M3")];
        assert_eq!(missing_motors(&snapshot, &wanted), vec![MotorId::from("M2")]);
    }
}
