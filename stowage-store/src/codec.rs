//! Entry codecs.
//!
//! Stores that persist entries as bytes (files, blob columns) encode them with
//! the codec handed to them in [`StoreContext`](crate::StoreContext). The
//! cache decides which codec every store in a chain uses.

use std::fmt::Debug;

use bytes::Bytes;
use stowage_core::{Raw, StoreEntry};
use thiserror::Error;

/// Error produced while encoding or decoding an entry.
#[derive(Error, Debug)]
pub enum CodecError {
    /// The entry could not be encoded.
    #[error(transparent)]
    Encode(Box<dyn std::error::Error + Send + Sync>),

    /// The bytes could not be decoded into an entry.
    #[error(transparent)]
    Decode(Box<dyn std::error::Error + Send + Sync>),
}

/// Unique identifier for codec types, used to compare codec equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodecTypeId {
    /// [`JsonCodec`]
    Json,
    /// [`BincodeCodec`]
    Bincode,
    /// User-defined codec. The string should be a unique identifier.
    Custom(&'static str),
}

/// Turns a [`StoreEntry`] into bytes and back.
pub trait EntryCodec: Debug + Send + Sync {
    /// Encodes an entry.
    fn encode(&self, entry: &StoreEntry) -> Result<Raw, CodecError>;

    /// Decodes an entry previously produced by [`encode`](Self::encode).
    fn decode(&self, data: &[u8]) -> Result<StoreEntry, CodecError>;

    /// Identifies the codec.
    fn codec_type_id(&self) -> CodecTypeId;
}

/// JSON codec. Human readable, larger on disk.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl EntryCodec for JsonCodec {
    fn encode(&self, entry: &StoreEntry) -> Result<Raw, CodecError> {
        serde_json::to_vec(entry)
            .map(Bytes::from)
            .map_err(|e| CodecError::Encode(Box::new(e)))
    }

    fn decode(&self, data: &[u8]) -> Result<StoreEntry, CodecError> {
        serde_json::from_slice(data).map_err(|e| CodecError::Decode(Box::new(e)))
    }

    fn codec_type_id(&self) -> CodecTypeId {
        CodecTypeId::Json
    }
}

/// Bincode codec (standard configuration, serde bridge).
#[derive(Debug, Clone, Copy, Default)]
pub struct BincodeCodec;

impl EntryCodec for BincodeCodec {
    fn encode(&self, entry: &StoreEntry) -> Result<Raw, CodecError> {
        ::bincode::serde::encode_to_vec(entry, ::bincode::config::standard())
            .map(Bytes::from)
            .map_err(|e| CodecError::Encode(Box::new(e)))
    }

    fn decode(&self, data: &[u8]) -> Result<StoreEntry, CodecError> {
        ::bincode::serde::decode_from_slice(data, ::bincode::config::standard())
            .map(|(entry, _read)| entry)
            .map_err(|e| CodecError::Decode(Box::new(e)))
    }

    fn codec_type_id(&self) -> CodecTypeId {
        CodecTypeId::Bincode
    }
}
