// src/extraction.rs
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine as _};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::timesheet::ExtractedRecord;

pub const DEFAULT_EXTRACTION_API_URL: &str = "https://api.openai.com/v1/chat/completions";

const SYSTEM_PROMPT: &str = "You are a helpful assistant that extracts timesheet information from images.\n\
Your task is to analyze the provided image and extract the following information for each timesheet entry:\n\
- date: The date in MM-DD-YYYY format\n\
- time_in: The time in (start time) in HH:MM format (24-hour)\n\
- time_out: The time out (end time) in HH:MM format (24-hour)\n\
- lunch_timeout: The lunch/break duration in minutes (numeric)\n\
- total_hours: The total hours worked as a decimal\n\
\n\
Return your response as a JSON object with an array of 'records', where each record contains the extracted information for one timesheet entry.\n\
If there is only one timesheet entry, still use the 'records' array with a single object.\n\
If you're uncertain about any value, provide your best guess based on the available information.";

const EXTRACTION_PROMPT: &str = "Extract all timesheet information from the provided image.\n\
\n\
Extract each timesheet record with the following information:\n\
- date (in MM-DD-YYYY format)\n\
- time_in (in HH:MM 24-hour format)\n\
- time_out (in HH:MM 24-hour format)\n\
- lunch_timeout (in minutes)\n\
- total_hours (as a decimal)\n\
\n\
Please format your response as a JSON object with an array of 'records'.";

// Error type for the extraction client. Per-image failures surface through
// this and are downgraded to soft errors by the aggregator.
#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("could not read image '{path}': {source}")]
    ImageRead {
        path: String,
        source: std::io::Error,
    },

    #[error("extraction API error: Status={status}, Message={message}")]
    Api { status: StatusCode, message: String },

    #[error("extraction service refused the image: {0}")]
    Refused(String),

    #[error("invalid response from extraction service: {0}")]
    InvalidResponse(String),
}

/// External service that reads timesheet records out of one image. The
/// production implementation calls a vision/LLM API; tests script outcomes.
#[async_trait]
pub trait ExtractionService: Send + Sync {
    async fn extract(&self, image_path: &str) -> Result<Vec<ExtractedRecord>, ExtractionError>;
}

#[derive(Clone, Debug)]
pub struct ExtractorConfig {
    pub api_url: String,
    pub api_key: String,
    pub model: String,
}

/// Vision/LLM extraction client. Posts the image as a base64 data URI with
/// the extraction prompt and expects a JSON object carrying a `records`
/// array back.
pub struct VisionExtractor {
    http_client: Client,
    config: ExtractorConfig,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
    refusal: Option<String>,
}

impl VisionExtractor {
    pub fn new(config: ExtractorConfig) -> Self {
        Self {
            http_client: Client::new(),
            config,
        }
    }

    fn parse_records(content: &str) -> Result<Vec<ExtractedRecord>, ExtractionError> {
        let raw: serde_json::Value = serde_json::from_str(content)
            .map_err(|e| ExtractionError::InvalidResponse(format!("invalid JSON: {}", e)))?;

        if let Some(refusal) = raw.get("refusal").and_then(|r| r.as_str()) {
            return Err(ExtractionError::Refused(refusal.to_string()));
        }

        let raw_records = match raw.get("records").and_then(|r| r.as_array()) {
            Some(records) => records.clone(),
            None => Vec::new(),
        };

        let mut records = Vec::new();
        for value in raw_records {
            match serde_json::from_value::<ExtractedRecord>(value.clone()) {
                Ok(record) => records.push(record),
                // A record without the required keys never happened as far
                // as reconciliation is concerned.
                Err(e) => warn!("Skipping malformed extracted record {}: {}", value, e),
            }
        }
        Ok(records)
    }
}

#[async_trait]
impl ExtractionService for VisionExtractor {
    async fn extract(&self, image_path: &str) -> Result<Vec<ExtractedRecord>, ExtractionError> {
        info!("Extracting timesheet data from {}", image_path);
        let bytes = tokio::fs::read(image_path)
            .await
            .map_err(|source| ExtractionError::ImageRead {
                path: image_path.to_string(),
                source,
            })?;
        let base64_image = BASE64_STANDARD.encode(bytes);

        let payload = json!({
            "model": self.config.model,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                {
                    "role": "user",
                    "content": [
                        { "type": "text", "text": EXTRACTION_PROMPT },
                        {
                            "type": "image_url",
                            "image_url": { "url": format!("data:image/png;base64,{}", base64_image) }
                        }
                    ]
                }
            ],
            "temperature": 0.7,
            "top_p": 0.3,
            "max_tokens": 1000,
            "response_format": { "type": "json_object" }
        });

        let response = self
            .http_client
            .post(&self.config.api_url)
            .bearer_auth(&self.config.api_key)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            error!(
                "Extraction API request failed. Status: {}, Body: {}",
                status, message
            );
            return Err(ExtractionError::Api { status, message });
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| ExtractionError::InvalidResponse(e.to_string()))?;
        let choice = chat
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ExtractionError::InvalidResponse("no choices returned".to_string()))?;

        let content = match choice.message.content {
            Some(content) => content,
            None => {
                let reason = choice
                    .message
                    .refusal
                    .unwrap_or_else(|| "no content returned".to_string());
                return Err(ExtractionError::Refused(reason));
            }
        };

        let records = Self::parse_records(&content)?;
        info!(
            "Extracted {} records from {}",
            records.len(),
            image_path
        );
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_records_reads_well_formed_entries() {
        let content = r#"{"records": [
            {"date": "03-04-2024", "time_in": "09:00", "time_out": "17:00", "lunch_timeout": 30, "total_hours": 7.5},
            {"date": "03-05-2024", "time_in": "09:00", "time_out": "17:00", "lunch_timeout": "0:30", "total_hours": "7.5"}
        ]}"#;
        let records = VisionExtractor::parse_records(content).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].date, "03-04-2024");
        assert_eq!(
            records[1].lunch_timeout,
            Some(crate::timesheet::RawField::Text("0:30".to_string()))
        );
    }

    #[test]
    fn test_parse_records_skips_malformed_entries() {
        let content = r#"{"records": [
            {"time_in": "09:00"},
            {"date": "03-04-2024", "time_in": "09:00", "time_out": "17:00", "lunch_timeout": 30, "total_hours": 7.5}
        ]}"#;
        let records = VisionExtractor::parse_records(content).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].date, "03-04-2024");
    }

    #[test]
    fn test_parse_records_missing_records_key_is_empty() {
        let records = VisionExtractor::parse_records("{}").unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn test_parse_records_surfaces_refusal() {
        let result = VisionExtractor::parse_records(r#"{"refusal": "cannot read this"}"#);
        assert!(matches!(result, Err(ExtractionError::Refused(r)) if r == "cannot read this"));
    }

    #[test]
    fn test_parse_records_rejects_invalid_json() {
        assert!(matches!(
            VisionExtractor::parse_records("not json"),
            Err(ExtractionError::InvalidResponse(_))
        ));
    }
}
