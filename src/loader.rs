//! Document loading from files, strings, and HTTP URLs.
//!
//! Manifests and registry indexes are top-level JSON objects; anything
//! else is rejected at the boundary so the core only ever sees ordered
//! mappings.

use std::path::Path;

use serde_json::Value;

use crate::error::LoadError;
use crate::types::{json_type_name, Document};

#[cfg(feature = "remote")]
use std::time::Duration;

/// Default timeout for HTTP requests (10 seconds).
#[cfg(feature = "remote")]
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Load a document from a file path.
///
/// # Errors
///
/// Returns `LoadError::FileNotFound` if the file doesn't exist,
/// `LoadError::InvalidJson` if it isn't valid JSON, or
/// `LoadError::NotAnObject` if the top level isn't an object.
pub fn load_document(path: &Path) -> Result<Document, LoadError> {
    if !path.exists() {
        return Err(LoadError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    let content = std::fs::read_to_string(path).map_err(|source| LoadError::ReadError {
        path: path.to_path_buf(),
        source,
    })?;

    load_document_str(&content)
}

/// Load a document from a JSON string.
///
/// # Errors
///
/// Returns `LoadError::InvalidJson` or `LoadError::NotAnObject`.
pub fn load_document_str(content: &str) -> Result<Document, LoadError> {
    let value: Value =
        serde_json::from_str(content).map_err(|source| LoadError::InvalidJson { source })?;
    match value {
        Value::Object(map) => Ok(map),
        other => Err(LoadError::NotAnObject {
            actual: json_type_name(&other),
        }),
    }
}

/// Load a document from an HTTP/HTTPS URL.
///
/// Requires the `remote` feature (enabled by default).
///
/// # Errors
///
/// Returns `LoadError::NetworkError` if the request fails, or the usual
/// parse errors for the body.
#[cfg(feature = "remote")]
pub fn load_document_url(url: &str) -> Result<Document, LoadError> {
    let client = reqwest::blocking::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .map_err(|source| LoadError::NetworkError {
            url: url.to_string(),
            source,
        })?;

    let response = client
        .get(url)
        .send()
        .and_then(reqwest::blocking::Response::error_for_status)
        .map_err(|source| LoadError::NetworkError {
            url: url.to_string(),
            source,
        })?;

    let value: Value = response.json().map_err(|source| LoadError::NetworkError {
        url: url.to_string(),
        source,
    })?;
    match value {
        Value::Object(map) => Ok(map),
        other => Err(LoadError::NotAnObject {
            actual: json_type_name(&other),
        }),
    }
}

/// Check if a string looks like a URL (starts with http:// or https://).
pub fn is_url(s: &str) -> bool {
    s.starts_with("http://") || s.starts_with("https://")
}

/// Load a document from a file path or URL.
///
/// Automatically detects whether the source is a URL or file path.
/// URL loading requires the `remote` feature.
///
/// # Errors
///
/// Returns appropriate errors based on the source type.
pub fn load_document_auto(source: &str) -> Result<Document, LoadError> {
    if is_url(source) {
        #[cfg(feature = "remote")]
        {
            load_document_url(source)
        }
        #[cfg(not(feature = "remote"))]
        {
            Err(LoadError::FileNotFound {
                path: std::path::PathBuf::from(source),
            })
        }
    } else {
        load_document(Path::new(source))
    }
}
