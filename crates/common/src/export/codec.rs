use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use prost::Message;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::bundler::KeyBundle;
use crate::crypto::SignatureInfo;
use crate::diagnosis_key::{DiagnosisKey, ReportType};

use super::proto;

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("export header {header:?} does not fit into {width} bytes")]
    HeaderTooLong { header: String, width: usize },
    #[error("max_keys_per_file must be at least 1")]
    InvalidBatchSize,
    #[error("export is missing the expected header")]
    MissingHeader,
    #[error("malformed export payload: {0}")]
    Decode(#[from] prost::DecodeError),
    #[error("malformed export field: {0}")]
    InvalidField(&'static str),
    #[error("export has {0} batches, more than the format can express")]
    TooManyBatches(usize),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Magic header; space padded to `header_width` bytes.
    #[serde(default = "default_header")]
    pub header: String,
    #[serde(default = "default_header_width")]
    pub header_width: usize,
    /// Entry holding the serialized export inside an archive.
    #[serde(default = "default_payload_entry")]
    pub payload_entry: String,
    /// Entry holding the signature list inside an archive.
    #[serde(default = "default_signature_entry")]
    pub signature_entry: String,
    /// File name of a signed export archive.
    #[serde(default = "default_archive_name")]
    pub archive_name: String,
    #[serde(default = "default_max_keys_per_file")]
    pub max_keys_per_file: usize,
    /// Region written into exports, per package; defaults to the package name.
    #[serde(default)]
    pub regions: BTreeMap<String, String>,
}

fn default_header() -> String {
    "EK Export v1".to_string()
}

fn default_header_width() -> usize {
    16
}

fn default_payload_entry() -> String {
    "export.bin".to_string()
}

fn default_signature_entry() -> String {
    "export.sig".to_string()
}

fn default_archive_name() -> String {
    "export.zip".to_string()
}

fn default_max_keys_per_file() -> usize {
    750_000
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            header: default_header(),
            header_width: default_header_width(),
            payload_entry: default_payload_entry(),
            signature_entry: default_signature_entry(),
            archive_name: default_archive_name(),
            max_keys_per_file: default_max_keys_per_file(),
            regions: BTreeMap::new(),
        }
    }
}

impl ExportConfig {
    pub fn validate(&self) -> Result<(), ExportError> {
        if self.header.len() > self.header_width {
            return Err(ExportError::HeaderTooLong {
                header: self.header.clone(),
                width: self.header_width,
            });
        }
        if self.max_keys_per_file == 0 {
            return Err(ExportError::InvalidBatchSize);
        }
        Ok(())
    }

    /// Archive name of batch `num` (1-based): the first batch keeps the
    /// configured name, later ones get a `-<num>` suffix on the stem.
    pub fn batch_archive_name(&self, num: u32) -> String {
        if num <= 1 {
            return self.archive_name.clone();
        }
        match self.archive_name.rsplit_once('.') {
            Some((stem, ext)) => format!("{stem}-{num}.{ext}"),
            None => format!("{}-{num}", self.archive_name),
        }
    }
}

/// One export file of a (possibly split) bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportBatch {
    pub batch_num: u32,
    pub batch_size: u32,
    pub bytes: Vec<u8>,
}

impl ExportBatch {
    /// SHA-256 of the serialized export, as exposed to signers.
    pub fn payload_hash(&self) -> [u8; 32] {
        Sha256::digest(&self.bytes).into()
    }
}

/// Key record as it appears in an export.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExportedKey {
    pub key_data: Vec<u8>,
    pub transmission_risk_level: i32,
    pub rolling_start_interval_number: u32,
    pub rolling_period: u32,
    pub report_type: Option<ReportType>,
    pub days_since_onset_of_symptoms: Option<i32>,
}

impl From<&DiagnosisKey> for ExportedKey {
    fn from(key: &DiagnosisKey) -> Self {
        Self {
            key_data: key.key_data().to_vec(),
            transmission_risk_level: key.transmission_risk_level(),
            rolling_start_interval_number: key.rolling_start_interval_number(),
            rolling_period: key.rolling_period(),
            report_type: key.report_type(),
            days_since_onset_of_symptoms: key.days_since_onset_of_symptoms(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedExport {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub region: String,
    pub batch_num: u32,
    pub batch_size: u32,
    pub signature_infos: Vec<SignatureInfo>,
    pub keys: Vec<ExportedKey>,
}

#[derive(Debug, Clone)]
pub struct ExportCodec {
    config: ExportConfig,
}

impl ExportCodec {
    pub fn new(config: ExportConfig) -> Result<Self, ExportError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ExportConfig {
        &self.config
    }

    pub fn header(&self) -> Vec<u8> {
        let mut header = self.config.header.as_bytes().to_vec();
        header.resize(self.config.header_width, b' ');
        header
    }

    pub fn region_for(&self, package: &str) -> String {
        self.config
            .regions
            .get(package)
            .cloned()
            .unwrap_or_else(|| package.to_string())
    }

    /// Encode a bundle into one or more export files.
    ///
    /// Keys (real and padding) are sorted by key bytes and cut into
    /// consecutive batches of at most `max_keys_per_file`. An empty bundle
    /// yields a single export without keys.
    pub fn encode(
        &self,
        bundle: &KeyBundle,
        signature_info: &SignatureInfo,
    ) -> Result<Vec<ExportBatch>, ExportError> {
        let mut keys: Vec<&DiagnosisKey> = bundle.all_keys().collect();
        keys.sort_by(|a, b| a.key_data().cmp(b.key_data()));

        let chunks: Vec<&[&DiagnosisKey]> = if keys.is_empty() {
            vec![keys.as_slice()]
        } else {
            keys.chunks(self.config.max_keys_per_file).collect()
        };
        let batch_size = i32::try_from(chunks.len())
            .map_err(|_| ExportError::TooManyBatches(chunks.len()))?;

        let window = bundle.window();
        let region = self.region_for(bundle.package());
        let info = proto::SignatureInfo::from(signature_info);

        chunks
            .into_iter()
            .zip(1..)
            .map(|(chunk, batch_num)| {
                let export = proto::TemporaryExposureKeyExport {
                    start_timestamp: Some(window.start().timestamp() as u64),
                    end_timestamp: Some(window.end().timestamp() as u64),
                    region: Some(region.clone()),
                    batch_num: Some(batch_num),
                    batch_size: Some(batch_size),
                    signature_infos: vec![info.clone()],
                    keys: chunk.iter().map(|k| to_proto(k)).collect(),
                };

                let mut bytes = self.header();
                bytes.reserve(export.encoded_len());
                export
                    .encode(&mut bytes)
                    .map_err(|_| ExportError::InvalidField("buffer"))?;

                Ok(ExportBatch {
                    batch_num: batch_num as u32,
                    batch_size: batch_size as u32,
                    bytes,
                })
            })
            .collect()
    }

    pub fn decode(&self, bytes: &[u8]) -> Result<DecodedExport, ExportError> {
        let header = self.header();
        let payload = bytes
            .strip_prefix(header.as_slice())
            .ok_or(ExportError::MissingHeader)?;
        let export = proto::TemporaryExposureKeyExport::decode(payload)?;

        let timestamp = |value: Option<u64>, field| {
            value
                .and_then(|v| i64::try_from(v).ok())
                .and_then(|v| DateTime::from_timestamp(v, 0))
                .ok_or(ExportError::InvalidField(field))
        };

        Ok(DecodedExport {
            start: timestamp(export.start_timestamp, "start_timestamp")?,
            end: timestamp(export.end_timestamp, "end_timestamp")?,
            region: export.region.unwrap_or_default(),
            batch_num: export.batch_num.unwrap_or(1).max(0) as u32,
            batch_size: export.batch_size.unwrap_or(1).max(0) as u32,
            signature_infos: export.signature_infos.into_iter().map(Into::into).collect(),
            keys: export
                .keys
                .into_iter()
                .map(from_proto)
                .collect::<Result<_, _>>()?,
        })
    }

    /// Serialize the detached signature entry for one batch.
    pub fn signature_list(
        &self,
        signature_info: &SignatureInfo,
        batch_num: u32,
        batch_size: u32,
        signature: Vec<u8>,
    ) -> Vec<u8> {
        proto::TekSignatureList {
            signatures: vec![proto::TekSignature {
                signature_info: Some(signature_info.into()),
                batch_num: Some(batch_num as i32),
                batch_size: Some(batch_size as i32),
                signature: Some(signature),
            }],
        }
        .encode_to_vec()
    }
}

fn to_proto(key: &DiagnosisKey) -> proto::TemporaryExposureKey {
    proto::TemporaryExposureKey {
        key_data: Some(key.key_data().to_vec()),
        transmission_risk_level: Some(key.transmission_risk_level()),
        rolling_start_interval_number: Some(key.rolling_start_interval_number() as i32),
        rolling_period: Some(key.rolling_period() as i32),
        report_type: key.report_type().map(ReportType::as_i32),
        days_since_onset_of_symptoms: key.days_since_onset_of_symptoms(),
    }
}

fn from_proto(key: proto::TemporaryExposureKey) -> Result<ExportedKey, ExportError> {
    Ok(ExportedKey {
        key_data: key.key_data.ok_or(ExportError::InvalidField("key_data"))?,
        transmission_risk_level: key.transmission_risk_level.unwrap_or_default(),
        rolling_start_interval_number: key
            .rolling_start_interval_number
            .and_then(|v| u32::try_from(v).ok())
            .ok_or(ExportError::InvalidField("rolling_start_interval_number"))?,
        rolling_period: key
            .rolling_period
            .and_then(|v| u32::try_from(v).ok())
            .unwrap_or(crate::diagnosis_key::INTERVALS_PER_DAY),
        report_type: key.report_type.and_then(ReportType::from_i32),
        days_since_onset_of_symptoms: key.days_since_onset_of_symptoms,
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::bundler::Window;
    use crate::crypto::ED25519_ALGORITHM_OID;
    use chrono::NaiveDate;

    fn info() -> SignatureInfo {
        SignatureInfo {
            verification_key_id: "262".into(),
            verification_key_version: "v1".into(),
            signature_algorithm: ED25519_ALGORITHM_OID.into(),
        }
    }

    fn bundle(bytes: &[u8]) -> KeyBundle {
        let keys = bytes
            .iter()
            .map(|b| DiagnosisKey::new([*b; 16], 2_681_280, 144, 3, "DE").unwrap())
            .collect();
        KeyBundle::new("DE", Window::Day(NaiveDate::from_ymd_opt(2020, 12, 25).unwrap()), keys)
    }

    #[test]
    fn test_header_is_padded() {
        let codec = ExportCodec::new(ExportConfig::default()).unwrap();
        assert_eq!(codec.header(), b"EK Export v1    ".to_vec());
    }

    #[test]
    fn test_encode_decode() {
        let codec = ExportCodec::new(ExportConfig::default()).unwrap();
        let batches = codec.encode(&bundle(&[3, 1, 2]), &info()).unwrap();
        assert_eq!(batches.len(), 1);

        let decoded = codec.decode(&batches[0].bytes).unwrap();
        assert_eq!((decoded.batch_num, decoded.batch_size), (1, 1));
        assert_eq!(decoded.region, "DE");
        assert_eq!(decoded.start.timestamp(), 1_608_854_400);
        assert_eq!(decoded.end.timestamp(), 1_608_940_800);
        assert_eq!(decoded.signature_infos, vec![info()]);

        // sorted by key bytes
        let first_bytes: Vec<u8> = decoded.keys.iter().map(|k| k.key_data[0]).collect();
        assert_eq!(first_bytes, vec![1, 2, 3]);
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let codec = ExportCodec::new(ExportConfig::default()).unwrap();
        let a = codec.encode(&bundle(&[5, 9, 1]), &info()).unwrap();
        let b = codec.encode(&bundle(&[1, 5, 9]), &info()).unwrap();
        assert_eq!(a, b);
        assert_eq!(a[0].payload_hash(), b[0].payload_hash());
    }

    #[test]
    fn test_empty_bundle_still_exports() {
        let codec = ExportCodec::new(ExportConfig::default()).unwrap();
        let batches = codec.encode(&bundle(&[]), &info()).unwrap();
        assert_eq!(batches.len(), 1);

        let decoded = codec.decode(&batches[0].bytes).unwrap();
        assert!(decoded.keys.is_empty());
        assert_eq!(decoded.batch_size, 1);
    }

    #[test]
    fn test_split_into_batches() {
        let codec = ExportCodec::new(ExportConfig {
            max_keys_per_file: 2,
            ..Default::default()
        })
        .unwrap();
        let batches = codec.encode(&bundle(&[5, 4, 3, 2, 1]), &info()).unwrap();
        assert_eq!(batches.len(), 3);

        let decoded: Vec<_> = batches.iter().map(|b| codec.decode(&b.bytes).unwrap()).collect();
        assert_eq!(decoded[0].keys.len(), 2);
        assert_eq!(decoded[2].keys.len(), 1);
        assert_eq!(decoded[2].keys[0].key_data[0], 5);
        assert!(decoded.iter().all(|d| d.batch_size == 3));
        assert_eq!(decoded[1].batch_num, 2);
    }

    #[test]
    fn test_missing_header_rejected() {
        let codec = ExportCodec::new(ExportConfig::default()).unwrap();
        assert!(matches!(codec.decode(b"garbage"), Err(ExportError::MissingHeader)));
    }

    #[test]
    fn test_header_too_long_rejected() {
        let config = ExportConfig {
            header: "a header that is far too long".into(),
            ..Default::default()
        };
        assert!(matches!(
            ExportCodec::new(config),
            Err(ExportError::HeaderTooLong { .. })
        ));
    }

    #[test]
    fn test_batch_archive_names() {
        let config = ExportConfig::default();
        assert_eq!(config.batch_archive_name(1), "export.zip");
        assert_eq!(config.batch_archive_name(3), "export-3.zip");
    }
}
