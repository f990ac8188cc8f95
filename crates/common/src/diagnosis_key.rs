//! The diagnosis key value consumed by the distribution engine.
//!
//! Keys arrive already validated by the ingestion and federation paths;
//! construction here only enforces the invariants the bundler and the
//! codec rely on.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, NaiveDate, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// Length of a temporary exposure key in bytes.
pub const KEY_LENGTH: usize = 16;
/// Seconds covered by one rolling interval.
pub const ROLLING_INTERVAL_SECONDS: i64 = 600;
/// Rolling intervals in one day.
pub const INTERVALS_PER_DAY: u32 = 144;
/// Rolling intervals in one hour.
pub const INTERVALS_PER_HOUR: u32 = 6;

#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("invalid key length, expected {KEY_LENGTH}, got {0}")]
    InvalidLength(usize),
    #[error("rolling period must be between 1 and {INTERVALS_PER_DAY}, got {0}")]
    InvalidRollingPeriod(u32),
    #[error("rolling start interval {0} is outside the representable time range")]
    InvalidRollingStart(u32),
    #[error("transmission risk level must be between 0 and 8, got {0}")]
    InvalidTransmissionRisk(i32),
    #[error("invalid country code: {0:?}")]
    InvalidCountry(String),
    #[error("key data is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
}

/// Diagnosis verification type attached to a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportType {
    Unknown,
    ConfirmedTest,
    ConfirmedClinicalDiagnosis,
    SelfReport,
    Recursive,
    Revoked,
}

impl ReportType {
    /// Wire value used in the export format.
    pub fn as_i32(self) -> i32 {
        match self {
            ReportType::Unknown => 0,
            ReportType::ConfirmedTest => 1,
            ReportType::ConfirmedClinicalDiagnosis => 2,
            ReportType::SelfReport => 3,
            ReportType::Recursive => 4,
            ReportType::Revoked => 5,
        }
    }

    pub fn from_i32(value: i32) -> Option<Self> {
        Some(match value {
            0 => ReportType::Unknown,
            1 => ReportType::ConfirmedTest,
            2 => ReportType::ConfirmedClinicalDiagnosis,
            3 => ReportType::SelfReport,
            4 => ReportType::Recursive,
            5 => ReportType::Revoked,
            _ => return None,
        })
    }
}

/// A temporary exposure key shared after a positive diagnosis.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DiagnosisKey {
    key_data: [u8; KEY_LENGTH],
    rolling_start_interval_number: u32,
    rolling_period: u32,
    transmission_risk_level: i32,
    origin_country: String,
    visited_countries: Vec<String>,
    report_type: Option<ReportType>,
    days_since_onset_of_symptoms: Option<i32>,
}

impl DiagnosisKey {
    /// Checks the shape of a key, not its age. Whether the rolling start
    /// lies inside the distributable window depends on the run date, so
    /// [`KeyBundler`](crate::bundler::KeyBundler) drops keys dated before
    /// its retention cutoff and withholds keys dated today or later.
    pub fn new(
        key_data: [u8; KEY_LENGTH],
        rolling_start_interval_number: u32,
        rolling_period: u32,
        transmission_risk_level: i32,
        origin_country: impl Into<String>,
    ) -> Result<Self, KeyError> {
        let origin_country = origin_country.into();
        if rolling_period == 0 || rolling_period > INTERVALS_PER_DAY {
            return Err(KeyError::InvalidRollingPeriod(rolling_period));
        }
        if !(0..=8).contains(&transmission_risk_level) {
            return Err(KeyError::InvalidTransmissionRisk(transmission_risk_level));
        }
        if !is_country_code(&origin_country) {
            return Err(KeyError::InvalidCountry(origin_country));
        }
        if interval_start(rolling_start_interval_number).is_none() {
            return Err(KeyError::InvalidRollingStart(rolling_start_interval_number));
        }

        Ok(Self {
            key_data,
            rolling_start_interval_number,
            rolling_period,
            transmission_risk_level,
            origin_country,
            visited_countries: Vec::new(),
            report_type: None,
            days_since_onset_of_symptoms: None,
        })
    }

    /// Build a key from a byte slice, checking the key length.
    pub fn from_slice(
        key_data: &[u8],
        rolling_start_interval_number: u32,
        rolling_period: u32,
        transmission_risk_level: i32,
        origin_country: impl Into<String>,
    ) -> Result<Self, KeyError> {
        let key_data: [u8; KEY_LENGTH] = key_data
            .try_into()
            .map_err(|_| KeyError::InvalidLength(key_data.len()))?;
        Self::new(
            key_data,
            rolling_start_interval_number,
            rolling_period,
            transmission_risk_level,
            origin_country,
        )
    }

    pub fn with_visited_countries(mut self, countries: Vec<String>) -> Result<Self, KeyError> {
        if let Some(bad) = countries.iter().find(|c| !is_country_code(c)) {
            return Err(KeyError::InvalidCountry(bad.clone()));
        }
        self.visited_countries = countries;
        Ok(self)
    }

    pub fn with_report_type(mut self, report_type: ReportType) -> Self {
        self.report_type = Some(report_type);
        self
    }

    pub fn with_days_since_onset_of_symptoms(mut self, days: i32) -> Self {
        self.days_since_onset_of_symptoms = Some(days);
        self
    }

    pub fn key_data(&self) -> &[u8; KEY_LENGTH] {
        &self.key_data
    }

    pub fn rolling_start_interval_number(&self) -> u32 {
        self.rolling_start_interval_number
    }

    pub fn rolling_period(&self) -> u32 {
        self.rolling_period
    }

    pub fn transmission_risk_level(&self) -> i32 {
        self.transmission_risk_level
    }

    pub fn origin_country(&self) -> &str {
        &self.origin_country
    }

    pub fn visited_countries(&self) -> &[String] {
        &self.visited_countries
    }

    pub fn report_type(&self) -> Option<ReportType> {
        self.report_type
    }

    pub fn days_since_onset_of_symptoms(&self) -> Option<i32> {
        self.days_since_onset_of_symptoms
    }

    /// UTC instant at which the key's first rolling interval starts.
    pub fn rolling_start(&self) -> DateTime<Utc> {
        // checked in the constructor
        interval_start(self.rolling_start_interval_number).unwrap_or_default()
    }

    /// Calendar date (UTC) the key is bucketed under.
    pub fn date(&self) -> NaiveDate {
        self.rolling_start().date_naive()
    }

    /// Hour of day (UTC) the key is bucketed under.
    pub fn hour(&self) -> u32 {
        self.rolling_start().hour()
    }
}

/// Start instant of a rolling interval number.
pub fn interval_start(interval: u32) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(i64::from(interval) * ROLLING_INTERVAL_SECONDS, 0)
}

/// Rolling interval number that starts at the given instant (rounded down).
pub fn interval_number(instant: DateTime<Utc>) -> u32 {
    (instant.timestamp().max(0) / ROLLING_INTERVAL_SECONDS) as u32
}

fn is_country_code(code: &str) -> bool {
    !code.is_empty() && code.len() <= 8 && code.chars().all(|c| c.is_ascii_uppercase())
}

/// Serialized form used by key sources (key data as base64).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosisKeyRecord {
    pub key_data: String,
    pub rolling_start_interval_number: u32,
    #[serde(default = "default_rolling_period")]
    pub rolling_period: u32,
    pub transmission_risk_level: i32,
    pub origin_country: String,
    #[serde(default)]
    pub visited_countries: Vec<String>,
    #[serde(default)]
    pub report_type: Option<ReportType>,
    #[serde(default)]
    pub days_since_onset_of_symptoms: Option<i32>,
}

fn default_rolling_period() -> u32 {
    INTERVALS_PER_DAY
}

impl TryFrom<DiagnosisKeyRecord> for DiagnosisKey {
    type Error = KeyError;

    fn try_from(record: DiagnosisKeyRecord) -> Result<Self, Self::Error> {
        let bytes = STANDARD.decode(record.key_data.as_bytes())?;
        let mut key = DiagnosisKey::from_slice(
            &bytes,
            record.rolling_start_interval_number,
            record.rolling_period,
            record.transmission_risk_level,
            record.origin_country,
        )?
        .with_visited_countries(record.visited_countries)?;
        key.report_type = record.report_type;
        key.days_since_onset_of_symptoms = record.days_since_onset_of_symptoms;
        Ok(key)
    }
}

impl From<&DiagnosisKey> for DiagnosisKeyRecord {
    fn from(key: &DiagnosisKey) -> Self {
        Self {
            key_data: STANDARD.encode(key.key_data),
            rolling_start_interval_number: key.rolling_start_interval_number,
            rolling_period: key.rolling_period,
            transmission_risk_level: key.transmission_risk_level,
            origin_country: key.origin_country.clone(),
            visited_countries: key.visited_countries.clone(),
            report_type: key.report_type,
            days_since_onset_of_symptoms: key.days_since_onset_of_symptoms,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_date_and_hour_from_rolling_interval() {
        let start = Utc.with_ymd_and_hms(2021, 1, 1, 5, 20, 0).unwrap();
        let key = DiagnosisKey::new([1; KEY_LENGTH], interval_number(start), 144, 3, "DE").unwrap();

        assert_eq!(key.date(), NaiveDate::from_ymd_opt(2021, 1, 1).unwrap());
        assert_eq!(key.hour(), 5);
        assert_eq!(key.rolling_start(), start);
    }

    #[test]
    fn test_rejects_bad_length() {
        let result = DiagnosisKey::from_slice(&[0u8; 15], 2_650_000, 144, 3, "DE");
        assert!(matches!(result, Err(KeyError::InvalidLength(15))));
    }

    #[test]
    fn test_rejects_bad_rolling_period() {
        let result = DiagnosisKey::new([0; KEY_LENGTH], 2_650_000, 0, 3, "DE");
        assert!(matches!(result, Err(KeyError::InvalidRollingPeriod(0))));
    }

    #[test]
    fn test_rejects_lowercase_country() {
        let result = DiagnosisKey::new([0; KEY_LENGTH], 2_650_000, 144, 3, "de");
        assert!(matches!(result, Err(KeyError::InvalidCountry(_))));
    }

    #[test]
    fn test_record_conversion() {
        let key = DiagnosisKey::new([7; KEY_LENGTH], 2_650_000, 144, 5, "FR")
            .unwrap()
            .with_report_type(ReportType::ConfirmedTest)
            .with_days_since_onset_of_symptoms(-2);

        let record = DiagnosisKeyRecord::from(&key);
        let json = serde_json::to_string(&record).unwrap();
        let parsed: DiagnosisKeyRecord = serde_json::from_str(&json).unwrap();
        let recovered = DiagnosisKey::try_from(parsed).unwrap();

        assert_eq!(recovered, key);
    }
}
