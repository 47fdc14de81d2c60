//! Artifact persistence for fitted models and preprocessors
//!
//! Artifacts are written either as bincode (default) or pretty JSON and carry
//! [`ModelMetadata`] plus a SHA-256 payload digest. [`load_object`] detects the format itself.

mod serializer;

pub use serializer::{
    load_object, save_object, sha256_hex, ModelMetadata, SerializationFormat, SerializedArtifact,
};
