//! Typed health records and their encrypted forms
//!
//! Lab results travel as a JSON array sealed into one payload; each raw
//! attachment (the source PDF) is sealed separately. Shapes are checked on
//! the way in and on the way out so malformed records never reach storage
//! or the caller.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use crate::cipher::{EncryptedPayload, PayloadSealer};
use crate::error::{MedcardError, Result};

/// Longest accepted attachment filename, in bytes
const MAX_FILENAME_LEN: usize = 255;

/// One blood test: the report date plus analyte values keyed by name
/// (`WBC`, `HGB`, `LYM%`, `RDW-SD`, ...)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BloodTestResult {
    #[serde(rename = "Date", with = "lab_date")]
    pub date: NaiveDate,
    #[serde(flatten)]
    pub values: BTreeMap<String, f64>,
}

impl BloodTestResult {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            values: BTreeMap::new(),
        }
    }

    pub fn with_value(mut self, analyte: impl Into<String>, value: f64) -> Self {
        self.values.insert(analyte.into(), value);
        self
    }

    fn validate(&self) -> Result<()> {
        if let Some((name, _)) = self.values.iter().find(|(_, v)| !v.is_finite()) {
            return Err(MedcardError::InvalidRecord(format!(
                "Non-finite value for {}",
                name
            )));
        }
        Ok(())
    }
}

/// A raw attachment before encryption
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub data: Vec<u8>,
    pub test_date: Option<NaiveDate>,
}

/// An attachment as stored: filename and date in the clear, bytes sealed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedAttachment {
    pub filename: String,
    pub data: EncryptedPayload,
    #[serde(default, with = "lab_date::option")]
    pub test_date: Option<NaiveDate>,
}

/// Everything produced by processing one upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedUpload {
    pub blood_test_results: EncryptedPayload,
    pub raw_attachments: Vec<EncryptedAttachment>,
}

/// Seals and opens records through any [`PayloadSealer`]
pub struct RecordCipher<'a, S: PayloadSealer + ?Sized> {
    sealer: &'a S,
}

impl<'a, S: PayloadSealer + ?Sized> RecordCipher<'a, S> {
    pub fn new(sealer: &'a S) -> Self {
        Self { sealer }
    }

    /// Encrypt a set of results as one JSON payload
    pub fn seal_results(&self, results: &[BloodTestResult]) -> Result<EncryptedPayload> {
        for result in results {
            result.validate()?;
        }
        let json = serde_json::to_vec(results)?;
        let payload = self.sealer.seal_payload(&json)?;
        debug!("Sealed {} blood test results", results.len());
        Ok(payload)
    }

    /// Decrypt and validate a results payload
    pub fn open_results(&self, payload: &EncryptedPayload) -> Result<Vec<BloodTestResult>> {
        let json = self.sealer.open_payload(payload)?;
        let results: Vec<BloodTestResult> = serde_json::from_slice(&json)
            .map_err(|e| MedcardError::InvalidRecord(format!("Invalid results JSON: {}", e)))?;
        for result in &results {
            result.validate()?;
        }
        Ok(results)
    }

    pub fn seal_attachment(&self, attachment: &Attachment) -> Result<EncryptedAttachment> {
        validate_filename(&attachment.filename)?;
        Ok(EncryptedAttachment {
            filename: attachment.filename.clone(),
            data: self.sealer.seal_payload(&attachment.data)?,
            test_date: attachment.test_date,
        })
    }

    pub fn open_attachment(&self, encrypted: &EncryptedAttachment) -> Result<Attachment> {
        validate_filename(&encrypted.filename)?;
        Ok(Attachment {
            filename: encrypted.filename.clone(),
            data: self.sealer.open_payload(&encrypted.data)?,
            test_date: encrypted.test_date,
        })
    }

    /// Seal a processed upload; `None` when there are no results to store
    pub fn seal_upload(
        &self,
        results: &[BloodTestResult],
        attachments: &[Attachment],
    ) -> Result<Option<EncryptedUpload>> {
        if results.is_empty() {
            debug!("No blood test results to encrypt");
            return Ok(None);
        }

        let raw_attachments = attachments
            .iter()
            .map(|a| self.seal_attachment(a))
            .collect::<Result<Vec<_>>>()?;

        Ok(Some(EncryptedUpload {
            blood_test_results: self.seal_results(results)?,
            raw_attachments,
        }))
    }
}

fn validate_filename(filename: &str) -> Result<()> {
    if filename.trim().is_empty() {
        return Err(MedcardError::InvalidRecord("Empty filename".to_string()));
    }
    if filename.len() > MAX_FILENAME_LEN {
        return Err(MedcardError::InvalidRecord(format!(
            "Filename longer than {} bytes",
            MAX_FILENAME_LEN
        )));
    }
    if filename.contains(['/', '\\', '\0']) || filename == "." || filename == ".." {
        return Err(MedcardError::InvalidRecord(format!(
            "Filename must not contain path components: {:?}",
            filename
        )));
    }
    Ok(())
}

/// Lab report dates: `DD.MM.YYYY`, optionally followed by a time
mod lab_date {
    use chrono::NaiveDate;
    use serde::{Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%d.%m.%Y";

    pub fn parse(raw: &str) -> Result<NaiveDate, String> {
        let day = raw.split_whitespace().next().unwrap_or_default();
        NaiveDate::parse_from_str(day, FORMAT)
            .or_else(|_| NaiveDate::parse_from_str(day, "%Y-%m-%d"))
            .map_err(|e| format!("invalid date {:?}: {}", raw, e))
    }

    pub fn serialize<S: Serializer>(date: &NaiveDate, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&date.format(FORMAT))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDate, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).map_err(serde::de::Error::custom)
    }

    pub mod option {
        use super::*;

        pub fn serialize<S: Serializer>(
            date: &Option<NaiveDate>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match date {
                Some(date) => serializer.collect_str(&date.format(FORMAT)),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<NaiveDate>, D::Error> {
            match Option::<String>::deserialize(deserializer)? {
                Some(raw) if !raw.trim().is_empty() => {
                    parse(&raw).map(Some).map_err(serde::de::Error::custom)
                }
                _ => Ok(None),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ClientCipher;
    use crate::crypto::{KdfParams, SymmetricKey};

    fn sealer() -> ClientCipher {
        ClientCipher::new(SymmetricKey::new([0x21; 32]), KdfParams { iterations: 1_000 })
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_result_json_shape() {
        let result = BloodTestResult::new(date(2023, 1, 5))
            .with_value("WBC", 5.4)
            .with_value("LYM%", 31.2);

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["Date"], "05.01.2023");
        assert_eq!(json["WBC"], 5.4);
        assert_eq!(json["LYM%"], 31.2);
    }

    #[test]
    fn test_result_date_with_time() {
        let parsed: BloodTestResult =
            serde_json::from_str(r#"{"Date": "05.01.2023 08:15", "HGB": 14.1}"#).unwrap();
        assert_eq!(parsed.date, date(2023, 1, 5));
        assert_eq!(parsed.values["HGB"], 14.1);
    }

    #[test]
    fn test_results_roundtrip() {
        let sealer = sealer();
        let records = RecordCipher::new(&sealer);
        let results = vec![
            BloodTestResult::new(date(2023, 1, 5)).with_value("WBC", 5.4),
            BloodTestResult::new(date(2023, 6, 12)).with_value("PLT", 250.0),
        ];

        let payload = records.seal_results(&results).unwrap();
        assert_eq!(records.open_results(&payload).unwrap(), results);
    }

    #[test]
    fn test_non_numeric_value_rejected() {
        let sealer = sealer();
        let records = RecordCipher::new(&sealer);
        let payload = sealer
            .seal_payload(br#"[{"Date": "05.01.2023", "WBC": "high"}]"#)
            .unwrap();

        let result = records.open_results(&payload);
        assert!(matches!(result, Err(MedcardError::InvalidRecord(_))));
    }

    #[test]
    fn test_non_finite_value_rejected() {
        let sealer = sealer();
        let records = RecordCipher::new(&sealer);
        let results = vec![BloodTestResult::new(date(2023, 1, 5)).with_value("WBC", f64::NAN)];

        assert!(matches!(
            records.seal_results(&results),
            Err(MedcardError::InvalidRecord(_))
        ));
    }

    #[test]
    fn test_attachment_roundtrip() {
        let sealer = sealer();
        let records = RecordCipher::new(&sealer);
        let attachment = Attachment {
            filename: "report.pdf".to_string(),
            data: b"%PDF-1.4 ...".to_vec(),
            test_date: Some(date(2023, 1, 5)),
        };

        let encrypted = records.seal_attachment(&attachment).unwrap();
        let json = serde_json::to_value(&encrypted).unwrap();
        assert_eq!(json["testDate"], "05.01.2023");
        assert_eq!(json["filename"], "report.pdf");

        assert_eq!(records.open_attachment(&encrypted).unwrap(), attachment);
    }

    #[test]
    fn test_attachment_without_date() {
        let encrypted: EncryptedAttachment =
            serde_json::from_str(r#"{"filename": "a.pdf", "data": "00:11"}"#).unwrap();
        assert_eq!(encrypted.test_date, None);
    }

    #[test]
    fn test_bad_filenames_rejected() {
        let sealer = sealer();
        let records = RecordCipher::new(&sealer);

        for filename in ["", "  ", "../etc/passwd", "a\\b.pdf", "..", "x".repeat(300).as_str()] {
            let attachment = Attachment {
                filename: filename.to_string(),
                data: vec![1],
                test_date: None,
            };
            assert!(
                matches!(
                    records.seal_attachment(&attachment),
                    Err(MedcardError::InvalidRecord(_))
                ),
                "{filename:?} accepted"
            );
        }
    }

    #[test]
    fn test_seal_upload() {
        let sealer = sealer();
        let records = RecordCipher::new(&sealer);
        let attachment = Attachment {
            filename: "report.pdf".to_string(),
            data: vec![0xde, 0xad],
            test_date: None,
        };

        assert!(records.seal_upload(&[], &[attachment.clone()]).unwrap().is_none());

        let results = vec![BloodTestResult::new(date(2024, 2, 29)).with_value("HCT", 42.0)];
        let upload = records
            .seal_upload(&results, &[attachment.clone()])
            .unwrap()
            .unwrap();

        assert_eq!(upload.raw_attachments.len(), 1);
        assert_eq!(records.open_results(&upload.blood_test_results).unwrap(), results);
        assert_eq!(
            records.open_attachment(&upload.raw_attachments[0]).unwrap(),
            attachment
        );

        let json = serde_json::to_value(&upload).unwrap();
        assert!(json.get("bloodTestResults").is_some());
        assert!(json.get("rawAttachments").is_some());
    }
}
