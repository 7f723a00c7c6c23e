use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::NaiveDateTime;
use image::ImageFormat;
use reqwest::blocking::Client;

use crate::rchain::provider::{GeneratedArtifact, Provider, ProviderError};
use crate::rchain::transcript::timestamp;

/// Directory offered when the user has not chosen one.
pub const DEFAULT_IMAGE_DIR: &str = "generated_images";

/// Fetches one image for `prompt` and saves it under `output_dir`.
///
/// The request is a plain `GET <endpoint>?prompt=...`. Anything other than
/// `200 OK` is reported with its status code; a body that does not decode as
/// an image is rejected before anything is written.
pub fn generate(
    client: &Client,
    endpoint: &str,
    prompt: &str,
    output_dir: &Path,
) -> Result<GeneratedArtifact, ProviderError> {
    fs::create_dir_all(output_dir).map_err(|source| ProviderError::Io {
        path: output_dir.to_path_buf(),
        source,
    })?;
    let now = chrono::Local::now().naive_local();
    let started = Instant::now();

    let response = client
        .get(endpoint)
        .query(&[("prompt", prompt)])
        .send()
        .map_err(|source| ProviderError::Request {
            provider: Provider::Image,
            source,
        })?;

    let status = response.status();
    if status != reqwest::StatusCode::OK {
        tracing::debug!(status = status.as_u16(), "image endpoint refused request");
        return Err(ProviderError::ImageStatus { status });
    }

    let bytes = response.bytes().map_err(|source| ProviderError::Request {
        provider: Provider::Image,
        source,
    })?;
    let path = save_image(&bytes, output_dir, now)?;
    let elapsed = started.elapsed();

    tracing::info!(
        path = %path.display(),
        bytes = bytes.len(),
        elapsed_ms = elapsed.as_millis() as u64,
        "image generated"
    );
    Ok(GeneratedArtifact { path, elapsed })
}

/// Validates `bytes` as an image and writes them as `image_<timestamp>.<ext>`.
pub(crate) fn save_image(
    bytes: &[u8],
    output_dir: &Path,
    now: NaiveDateTime,
) -> Result<PathBuf, ProviderError> {
    let format =
        image::guess_format(bytes).map_err(|source| ProviderError::ImageDecode { source })?;
    image::load_from_memory_with_format(bytes, format)
        .map_err(|source| ProviderError::ImageDecode { source })?;

    let path = output_dir.join(format!("image_{}.{}", timestamp(now), extension(format)));
    // Never replace an image saved earlier within the same second.
    OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&path)
        .and_then(|mut file| file.write_all(bytes))
        .map_err(|source| ProviderError::Io {
            path: path.clone(),
            source,
        })?;
    Ok(path)
}

fn extension(format: ImageFormat) -> &'static str {
    format.extensions_str().first().copied().unwrap_or("img")
}
