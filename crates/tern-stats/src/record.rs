use serde::ser::{Serialize, SerializeSeq, Serializer};

use crate::error::StatsError;

/// Field separator inside a record line.
pub const SEPARATOR: char = '|';

/// One sample: epoch seconds plus a fixed number of string fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub timestamp: i64,
    pub fields: Vec<String>,
}

impl Record {
    pub fn new(timestamp: i64, fields: Vec<String>) -> Self {
        Self { timestamp, fields }
    }

    /// A known gap: every field set to `empty_value`.
    pub fn empty(timestamp: i64, field_count: usize, empty_value: &str) -> Self {
        Self {
            timestamp,
            fields: vec![empty_value.to_string(); field_count],
        }
    }

    pub fn is_empty(&self, empty_value: &str) -> bool {
        self.fields.iter().all(|f| f == empty_value)
    }

    /// `timestamp|f1|f2|...`
    pub fn to_line(&self) -> String {
        let mut line = self.timestamp.to_string();
        for field in &self.fields {
            line.push(SEPARATOR);
            line.push_str(field);
        }
        line
    }

    /// Parse one line. Short records are padded with `empty_value`; an
    /// unparsable timestamp or too many fields is an error.
    pub fn parse_line(line: &str, field_count: usize, empty_value: &str) -> Result<Self, StatsError> {
        let mut parts = line.split(SEPARATOR);
        let raw_ts = parts.next().unwrap_or_default();
        let timestamp = raw_ts
            .trim()
            .parse::<i64>()
            .map_err(|_| StatsError::InvalidRecord(format!("bad timestamp {raw_ts:?}")))?;

        let mut fields: Vec<String> = parts.map(str::to_string).collect();
        if fields.len() > field_count {
            return Err(StatsError::InvalidRecord(format!(
                "{} fields, expected {field_count}",
                fields.len()
            )));
        }
        fields.resize(field_count, empty_value.to_string());
        Ok(Self { timestamp, fields })
    }

    /// Reject values that would break the line format.
    pub fn validate(&self) -> Result<(), StatsError> {
        match self
            .fields
            .iter()
            .find(|f| f.contains(SEPARATOR) || f.contains('\n') || f.contains('\r'))
        {
            Some(bad) => Err(StatsError::InvalidRecord(format!(
                "field {bad:?} contains a reserved character"
            ))),
            None => Ok(()),
        }
    }
}

/// Serialized as a flat array: `[timestamp, "f1", "f2", ...]`.
impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.fields.len() + 1))?;
        seq.serialize_element(&self.timestamp)?;
        for field in &self.fields {
            seq.serialize_element(field)?;
        }
        seq.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_format() {
        let record = Record::new(1635073200, vec!["2".into(), "".into(), "15".into()]);
        assert_eq!(record.to_line(), "1635073200|2||15");
        assert_eq!(Record::parse_line(&record.to_line(), 3, "").unwrap(), record);
    }

    #[test]
    fn short_lines_are_padded() {
        let record = Record::parse_line("100|1", 3, "").unwrap();
        assert_eq!(record.fields, vec!["1", "", ""]);
        let bare = Record::parse_line("100", 2, "-").unwrap();
        assert!(bare.is_empty("-"));
    }

    #[test]
    fn malformed_lines_are_rejected() {
        assert!(Record::parse_line("abc|1|2", 2, "").is_err());
        assert!(Record::parse_line("100|1|2|3", 2, "").is_err());
        assert!(Record::parse_line("", 2, "").is_err());
    }

    #[test]
    fn reserved_characters_fail_validation() {
        assert!(Record::new(1, vec!["a|b".into()]).validate().is_err());
        assert!(Record::new(1, vec!["a\nb".into()]).validate().is_err());
        assert!(Record::new(1, vec!["12.50".into()]).validate().is_ok());
    }

    #[test]
    fn serializes_as_flat_array() {
        let record = Record::new(60, vec!["1".into(), "".into()]);
        assert_eq!(
            serde_json::to_string(&record).unwrap(),
            r#"[60,"1",""]"#
        );
    }
}
