//! HTTP client for the OCR sidecar service.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{error, warn};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
// 30 s more than the standard 50 s request timeout; recognition is slow.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(80);
const MAX_RETRIES: u32 = 3;

#[derive(Debug, thiserror::Error)]
pub enum OcrError {
  #[error("failed to read file {path}: {source}")]
  FileRead {
    path: String,
    #[source]
    source: std::io::Error,
  },
  #[error("request failed: {0}")]
  Request(#[from] reqwest::Error),
  #[error("failed to decode OCR response: {0}")]
  Decode(String),
}

#[derive(Debug, Deserialize)]
struct OcrRegion {
  rec_txt: String,
  #[allow(dead_code)]
  #[serde(default)]
  dt_boxes: Vec<Vec<f32>>,
}

/// Text recognition over an image file.
#[async_trait]
pub trait OcrService: Send + Sync {
  async fn ocr(&self, file_path: &str) -> Result<String, OcrError>;
}

#[derive(Debug, Clone)]
pub struct OcrClient {
  url: String,
}

impl OcrClient {
  pub fn new(url: impl Into<String>) -> Self {
    Self { url: url.into() }
  }
}

#[async_trait]
impl OcrService for OcrClient {
  /// Recognize the text in an image file. Retries up to three times on
  /// transport errors and on undecodable responses.
  async fn ocr(&self, file_path: &str) -> Result<String, OcrError> {
    let bytes = std::fs::read(file_path).map_err(|source| {
      error!(file_path, "failed to open file for OCR");
      OcrError::FileRead {
        path: file_path.to_string(),
        source,
      }
    })?;

    let mut attempt: u32 = 0;
    loop {
      let client = reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(REQUEST_TIMEOUT)
        .build()?;

      let part = reqwest::multipart::Part::bytes(bytes.clone())
        .file_name(file_path.to_string())
        .mime_str("image/webp")
        .map_err(OcrError::Request)?;
      let form = reqwest::multipart::Form::new().part("image_file", part);

      let body = match client.post(&self.url).multipart(form).send().await {
        Ok(response) => response.text().await,
        Err(error) => Err(error),
      };

      match body {
        Ok(body) => match parse_response(&body) {
          Ok(text) => return Ok(text),
          Err(error) => {
            error!(%error, "failed to decode OCR response");
            if attempt < MAX_RETRIES {
              attempt += 1;
              warn!(attempt, "retrying OCR request");
              continue;
            }
            return Err(error);
          }
        },
        Err(error) => {
          error!(%error, "OCR request failed");
          if attempt < MAX_RETRIES {
            attempt += 1;
            warn!(attempt, "retrying OCR request");
            continue;
          }
          return Err(error.into());
        }
      }
    }
  }
}

/// Newline-join the recognized text of every region, in region-id order.
fn parse_response(body: &str) -> Result<String, OcrError> {
  let regions: BTreeMap<String, OcrRegion> =
    serde_json::from_str(body).map_err(|e| OcrError::Decode(e.to_string()))?;
  Ok(
    regions
      .values()
      .map(|region| region.rec_txt.as_str())
      .collect::<Vec<_>>()
      .join("\n"),
  )
}
