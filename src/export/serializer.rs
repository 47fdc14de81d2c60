//! Artifact serialization
//!
//! Every artifact is an envelope holding a magic tag, a format version, [`ModelMetadata`], the
//! serialized payload and a hex SHA-256 digest of that payload.

use crate::error::{PipelineError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt::Display;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

/// Serialization format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SerializationFormat {
    /// bincode (compact)
    #[default]
    Binary,
    /// Pretty-printed JSON
    Json,
}

impl FromStr for SerializationFormat {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "binary" | "bin" | "bincode" => Ok(SerializationFormat::Binary),
            "json" => Ok(SerializationFormat::Json),
            _ => Err(PipelineError::ConfigError(format!("Unknown artifact format: {}", s))),
        }
    }
}

/// Descriptive metadata stored alongside every artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub name: String,
    pub model_type: String,
    /// Version of the crate that wrote the artifact
    pub crate_version: String,
    /// RFC 3339 timestamp
    pub created_at: String,
    pub feature_names: Vec<String>,
    pub target_name: String,
    pub hyperparameters: BTreeMap<String, String>,
    pub metrics: BTreeMap<String, f64>,
    pub extra: BTreeMap<String, String>,
}

impl Default for ModelMetadata {
    fn default() -> Self {
        Self {
            name: "model".to_string(),
            model_type: "unknown".to_string(),
            crate_version: env!("CARGO_PKG_VERSION").to_string(),
            created_at: chrono::Utc::now().to_rfc3339(),
            feature_names: Vec::new(),
            target_name: String::new(),
            hyperparameters: BTreeMap::new(),
            metrics: BTreeMap::new(),
            extra: BTreeMap::new(),
        }
    }
}

impl ModelMetadata {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_model_type(mut self, model_type: impl Into<String>) -> Self {
        self.model_type = model_type.into();
        self
    }

    pub fn with_features(mut self, features: Vec<String>) -> Self {
        self.feature_names = features;
        self
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target_name = target.into();
        self
    }

    pub fn add_hyperparameter(mut self, key: impl Into<String>, value: impl Display) -> Self {
        self.hyperparameters.insert(key.into(), value.to_string());
        self
    }

    pub fn add_metric(mut self, key: impl Into<String>, value: f64) -> Self {
        self.metrics.insert(key.into(), value);
        self
    }

    pub fn with_metrics(mut self, metrics: BTreeMap<String, f64>) -> Self {
        self.metrics.extend(metrics);
        self
    }

    pub fn add_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

const MAGIC: [u8; 4] = *b"MLPA";
const FORMAT_VERSION: u32 = 1;

/// Binary envelope; bincode writes the magic as the first four bytes of the file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerializedArtifact {
    pub magic: [u8; 4],
    pub format_version: u32,
    pub metadata: ModelMetadata,
    pub payload: Vec<u8>,
    /// Hex SHA-256 of `payload`
    pub checksum: String,
}

impl SerializedArtifact {
    pub fn new(metadata: ModelMetadata, payload: Vec<u8>) -> Self {
        let checksum = sha256_hex(&payload);
        Self {
            magic: MAGIC,
            format_version: FORMAT_VERSION,
            metadata,
            payload,
            checksum,
        }
    }

    pub fn verify(&self) -> Result<()> {
        check_header(&self.magic, self.format_version)?;
        if sha256_hex(&self.payload) != self.checksum {
            return Err(checksum_mismatch());
        }
        Ok(())
    }
}

/// JSON envelope; the payload stays a readable JSON document
#[derive(Debug, Clone, Serialize, Deserialize)]
struct JsonArtifact {
    magic: String,
    format_version: u32,
    metadata: ModelMetadata,
    checksum: String,
    payload: serde_json::Value,
}

impl JsonArtifact {
    fn verify(&self) -> Result<()> {
        check_header(self.magic.as_bytes(), self.format_version)?;
        if sha256_hex(&serde_json::to_vec(&self.payload)?) != self.checksum {
            return Err(checksum_mismatch());
        }
        Ok(())
    }
}

/// Hex-encoded SHA-256 digest
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

fn check_header(magic: &[u8], version: u32) -> Result<()> {
    if magic != MAGIC {
        return Err(PipelineError::SerializationError(
            "Not a pipeline artifact (bad magic)".to_string(),
        ));
    }
    if version > FORMAT_VERSION {
        return Err(PipelineError::SerializationError(format!(
            "Unsupported artifact format version {} (max {})",
            version, FORMAT_VERSION
        )));
    }
    Ok(())
}

fn checksum_mismatch() -> PipelineError {
    PipelineError::SerializationError(
        "Checksum verification failed - file may be corrupted".to_string(),
    )
}

/// Serialize `obj` into an artifact at `path`, creating parent directories
pub fn save_object<T: Serialize>(
    obj: &T,
    path: impl AsRef<Path>,
    metadata: ModelMetadata,
    format: SerializationFormat,
) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let mut writer = BufWriter::new(File::create(path)?);
    match format {
        SerializationFormat::Binary => {
            let artifact = SerializedArtifact::new(metadata, bincode::serialize(obj)?);
            bincode::serialize_into(&mut writer, &artifact)?;
        }
        SerializationFormat::Json => {
            let payload = serde_json::to_value(obj)?;
            let artifact = JsonArtifact {
                magic: String::from_utf8_lossy(&MAGIC).into_owned(),
                format_version: FORMAT_VERSION,
                metadata,
                checksum: sha256_hex(&serde_json::to_vec(&payload)?),
                payload,
            };
            serde_json::to_writer_pretty(&mut writer, &artifact)?;
        }
    }
    writer.flush()?;

    debug!(path = %path.display(), ?format, "artifact saved");
    Ok(())
}

/// Load an artifact written by [`save_object`], detecting its format from the leading bytes
pub fn load_object<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<(T, ModelMetadata)> {
    let path = path.as_ref();
    let bytes = fs::read(path)?;

    if bytes.starts_with(&MAGIC) {
        let artifact: SerializedArtifact = bincode::deserialize(&bytes)?;
        artifact.verify()?;
        let obj = bincode::deserialize(&artifact.payload)?;
        debug!(path = %path.display(), "binary artifact loaded");
        return Ok((obj, artifact.metadata));
    }

    if bytes.iter().find(|b| !b.is_ascii_whitespace()) == Some(&b'{') {
        let artifact: JsonArtifact = serde_json::from_slice(&bytes)?;
        artifact.verify()?;
        let obj = serde_json::from_value(artifact.payload)?;
        debug!(path = %path.display(), "json artifact loaded");
        return Ok((obj, artifact.metadata));
    }

    Err(PipelineError::SerializationError(format!(
        "Unrecognized artifact format: {}",
        path.display()
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct Weights {
        weights: Vec<f64>,
        bias: f64,
    }

    fn sample() -> Weights {
        Weights {
            weights: vec![0.1, -2.5, 1.0 / 3.0],
            bias: 0.5,
        }
    }

    #[test]
    fn test_checksum_detects_corruption() {
        let mut artifact = SerializedArtifact::new(ModelMetadata::new("test"), vec![1, 2, 3, 4, 5]);
        assert_eq!(artifact.checksum.len(), 64);
        assert!(artifact.verify().is_ok());
        artifact.payload[0] = 99;
        assert!(matches!(artifact.verify(), Err(PipelineError::SerializationError(_))));
    }

    #[test]
    fn test_sha256_hex_digest() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_binary_checksum_is_stored_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.bin");
        save_object(&sample(), &path, ModelMetadata::new("w"), SerializationFormat::Binary)
            .unwrap();

        let artifact: SerializedArtifact = bincode::deserialize(&fs::read(&path).unwrap()).unwrap();
        assert_eq!(artifact.checksum, sha256_hex(&artifact.payload));

        let mut forged = artifact.clone();
        forged.checksum = sha256_hex(b"something else");
        fs::write(&path, bincode::serialize(&forged).unwrap()).unwrap();
        assert!(matches!(
            load_object::<Weights>(&path),
            Err(PipelineError::SerializationError(_))
        ));
    }

    #[test]
    fn test_metadata_builder() {
        let metadata = ModelMetadata::new("Ridge")
            .with_model_type("ridge")
            .with_features(vec!["x1".to_string(), "x2".to_string()])
            .with_target("y")
            .add_hyperparameter("alpha", 0.1)
            .add_metric("r2", 0.93);

        assert_eq!(metadata.name, "Ridge");
        assert_eq!(metadata.feature_names.len(), 2);
        assert_eq!(metadata.hyperparameters.get("alpha").map(String::as_str), Some("0.1"));
        assert_eq!(metadata.metrics.get("r2"), Some(&0.93));
        assert_eq!(metadata.crate_version, env!("CARGO_PKG_VERSION"));
        assert!(chrono::DateTime::parse_from_rfc3339(&metadata.created_at).is_ok());
    }

    #[test]
    fn test_binary_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("model.bin");

        save_object(&sample(), &path, ModelMetadata::new("w"), SerializationFormat::Binary)
            .unwrap();
        let bytes = fs::read(&path).unwrap();
        assert_eq!(&bytes[..4], b"MLPA");

        let (restored, metadata): (Weights, _) = load_object(&path).unwrap();
        assert_eq!(restored, sample());
        assert_eq!(metadata.name, "w");
    }

    #[test]
    fn test_json_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");

        save_object(&sample(), &path, ModelMetadata::new("w"), SerializationFormat::Json).unwrap();
        let (restored, _): (Weights, _) = load_object(&path).unwrap();
        assert_eq!(restored, sample());
    }

    #[test]
    fn test_tampered_json_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        save_object(&sample(), &path, ModelMetadata::new("w"), SerializationFormat::Json).unwrap();

        let text = fs::read_to_string(&path).unwrap().replace("0.5", "0.75");
        fs::write(&path, text).unwrap();

        let err = load_object::<Weights>(&path).unwrap_err();
        assert!(matches!(err, PipelineError::SerializationError(_)));
    }

    #[test]
    fn test_unknown_bytes_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("junk.bin");
        fs::write(&path, b"not an artifact").unwrap();
        assert!(load_object::<Weights>(&path).is_err());
    }
}
