//! Campaign payload codec.
//!
//! A campaign payload is a gzip-compressed JSON document holding the
//! descriptor plus the media files, base64 encoded. A single byte `77`
//! is the server's way of saying that no campaign exists.

use std::io::{Read, Write};

use base64::{engine::general_purpose, Engine};
use error_stack::{Report, ResultExt};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};

use crate::constants::{EMPTY_CAMPAIGN_SENTINEL, MAX_UNPACKED_LEN, MIN_PACKAGE_LEN};
use crate::error::AdReelError;
use crate::parser::CampaignDocument;

/// How a fetched payload should be treated.
#[derive(Debug, PartialEq, Eq)]
pub enum Payload<'a> {
    /// The server has no campaign for this account and id.
    Empty,
    /// A compressed campaign package.
    Package(&'a [u8]),
}

/// Classifies a raw payload by size and sentinel.
///
/// # Errors
///
/// Returns a parse error for payloads too short to be a package.
pub fn classify(bytes: &[u8]) -> Result<Payload<'_>, Report<AdReelError>> {
    match bytes {
        [EMPTY_CAMPAIGN_SENTINEL] => Ok(Payload::Empty),
        _ if bytes.len() <= MIN_PACKAGE_LEN => Err(Report::new(AdReelError::Parse {
            message: format!("Campaign payload too short ({} bytes)", bytes.len()),
        })),
        _ => Ok(Payload::Package(bytes)),
    }
}

/// One media file carried by a package.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageFile {
    pub name: String,
    pub data: String,
}

impl PackageFile {
    #[must_use]
    pub fn from_bytes(name: impl Into<String>, bytes: &[u8]) -> Self {
        Self {
            name: name.into(),
            data: general_purpose::STANDARD.encode(bytes),
        }
    }

    /// # Errors
    ///
    /// Returns a parse error if the data is not valid base64.
    pub fn decode(&self) -> Result<Vec<u8>, Report<AdReelError>> {
        general_purpose::STANDARD
            .decode(self.data.as_bytes())
            .change_context(AdReelError::Parse {
                message: format!("Media file '{}' is not valid base64", self.name),
            })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CampaignPackage {
    #[serde(flatten)]
    pub document: CampaignDocument,
    #[serde(default)]
    pub files: Vec<PackageFile>,
}

/// Decompresses and decodes a campaign package.
///
/// # Errors
///
/// Returns a parse error when the payload is not gzip, unpacks to more than
/// [`MAX_UNPACKED_LEN`] bytes or is not a package document.
pub fn decode_package(bytes: &[u8]) -> Result<CampaignPackage, Report<AdReelError>> {
    decode_package_limited(bytes, MAX_UNPACKED_LEN)
}

fn decode_package_limited(
    bytes: &[u8],
    limit: u64,
) -> Result<CampaignPackage, Report<AdReelError>> {
    // One byte past the limit tells an oversized stream from an exact fit.
    let mut decoder = GzDecoder::new(bytes).take(limit.saturating_add(1));
    let mut json = Vec::new();
    decoder
        .read_to_end(&mut json)
        .change_context(AdReelError::Parse {
            message: "Campaign payload is not a gzip stream".to_string(),
        })?;
    if json.len() as u64 > limit {
        return Err(Report::new(AdReelError::Parse {
            message: format!("Campaign package unpacks to more than {limit} bytes"),
        }));
    }

    serde_json::from_slice(&json).change_context(AdReelError::Parse {
        message: "Campaign package is not a valid document".to_string(),
    })
}

/// Encodes a package the way the ad server ships it.
///
/// # Errors
///
/// Returns a parse error if serialization or compression fails.
pub fn encode_package(package: &CampaignPackage) -> Result<Vec<u8>, Report<AdReelError>> {
    let json = serde_json::to_vec(package).change_context(AdReelError::Parse {
        message: "Failed to serialize campaign package".to_string(),
    })?;
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&json).change_context(AdReelError::Parse {
        message: "Failed to compress campaign package".to_string(),
    })?;
    encoder.finish().change_context(AdReelError::Parse {
        message: "Failed to compress campaign package".to_string(),
    })
}
