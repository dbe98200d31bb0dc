use base64::{engine::general_purpose::STANDARD, Engine as _};
use log::{debug, error, info};
use reqwest::{Client, StatusCode};
use serde::Serialize;
use serde_json::{json, Value};

use super::types::{ScanType, ScanUpload};
use crate::config::{InferenceConfig, InferenceProtocol};
use crate::error::AnalysisError;

/// Body sent to the analysis function.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FunctionRequest<'a> {
    image_data: &'a str,
    scan_type: ScanType,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Value>,
    temperature: f32,
}

pub fn system_prompt(scan_type: ScanType) -> String {
    format!(
        r#"You are an expert neurologist AI assistant analyzing brain scans for signs of dementia and cognitive decline.

Your task is to analyze {scan} brain scans and provide a detailed clinical assessment. Focus on:
1. Detecting signs of dementia (Alzheimer's, vascular dementia, etc.)
2. Identifying brain atrophy, particularly in hippocampus and temporal lobes
3. Assessing white matter lesions and vascular changes
4. Evaluating ventricular enlargement
5. Comparing findings to age-appropriate norms

Provide your response in the following JSON format:
{{
  "riskLevel": "low" | "moderate" | "high",
  "confidence": 85-98 (number representing confidence percentage),
  "findings": ["finding 1", "finding 2", "finding 3", "finding 4"],
  "recommendations": ["recommendation 1", "recommendation 2", "recommendation 3", "recommendation 4"]
}}

Be specific and clinical in your findings. If signs of dementia are detected, note the severity and location."#,
        scan = scan_type
    )
}

/// HTTP client for the external inference service.
#[derive(Clone)]
pub struct InferenceClient {
    client: Client,
    config: InferenceConfig,
}

impl InferenceClient {
    pub fn new(config: InferenceConfig) -> Result<Self, AnalysisError> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .connect_timeout(config.connect_timeout())
            .tcp_keepalive(std::time::Duration::from_secs(60))
            .build()?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &InferenceConfig {
        &self.config
    }

    /// Submits the scan and returns the model's text, reduced from whichever
    /// response shape the service used.
    pub async fn submit(&self, upload: &ScanUpload) -> Result<String, AnalysisError> {
        let image_data = STANDARD.encode(&upload.data);
        info!(
            "🧠 Submitting {} scan '{}' ({} bytes) via {:?}",
            upload.scan_type,
            upload.file_name,
            upload.data.len(),
            self.config.protocol
        );

        let body = match self.config.protocol {
            InferenceProtocol::Function => serde_json::to_value(FunctionRequest {
                image_data: &image_data,
                scan_type: upload.scan_type,
            })
            .map_err(|e| AnalysisError::Transport(e.to_string()))?,
            InferenceProtocol::ChatCompletions => {
                let request = self.chat_request(upload, &image_data);
                serde_json::to_value(request).map_err(|e| AnalysisError::Transport(e.to_string()))?
            }
        };

        let mut request = self
            .client
            .post(&self.config.endpoint)
            .header("Content-Type", "application/json")
            .json(&body);
        if let Some(key) = self.config.api_key.as_deref().filter(|k| !k.is_empty()) {
            request = request.header("Authorization", format!("Bearer {}", key));
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(map_status(status, &error_text));
        }

        let text = response.text().await?;
        debug!("Inference response: {} bytes", text.len());
        Ok(extract_model_text(&text))
    }

    fn chat_request(&self, upload: &ScanUpload, image_data: &str) -> ChatRequest {
        let scan = upload.scan_type;
        ChatRequest {
            model: self.config.model.clone(),
            messages: vec![
                json!({ "role": "system", "content": system_prompt(scan) }),
                json!({
                    "role": "user",
                    "content": [
                        {
                            "type": "text",
                            "text": format!(
                                "Analyze this {} brain scan for signs of dementia and cognitive decline. Provide a detailed clinical assessment.",
                                scan
                            ),
                        },
                        {
                            "type": "image_url",
                            "image_url": { "url": format!("data:{};base64,{}", upload.mime_type, image_data) },
                        },
                    ],
                }),
            ],
            temperature: self.config.temperature,
        }
    }
}

fn map_status(status: StatusCode, body: &str) -> AnalysisError {
    match status {
        StatusCode::TOO_MANY_REQUESTS => {
            error!("❌ Inference rate limit exceeded");
            AnalysisError::RateLimited
        }
        StatusCode::PAYMENT_REQUIRED => {
            error!("❌ Inference credits depleted");
            AnalysisError::QuotaExceeded
        }
        _ => {
            error!("❌ Inference service error {}: {}", status, body);
            let detail = serde_json::from_str::<Value>(body)
                .ok()
                .and_then(|v| v.get("error").and_then(Value::as_str).map(str::to_string))
                .unwrap_or_else(|| format!("service returned {}", status));
            AnalysisError::Transport(detail)
        }
    }
}

/// Probes the known response shapes: chat-completions `choices[0].message.content`,
/// then an `analysis` field, then the raw body.
pub fn extract_model_text(body: &str) -> String {
    let Ok(value) = serde_json::from_str::<Value>(body) else {
        return body.to_string();
    };

    if let Some(content) = value
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
    {
        return content.to_string();
    }

    match value.get("analysis") {
        Some(Value::String(text)) => text.clone(),
        Some(analysis @ Value::Object(_)) => analysis.to_string(),
        _ => body.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_map_to_error_classes() {
        assert!(matches!(map_status(StatusCode::TOO_MANY_REQUESTS, ""), AnalysisError::RateLimited));
        assert!(matches!(map_status(StatusCode::PAYMENT_REQUIRED, ""), AnalysisError::QuotaExceeded));
        assert!(matches!(
            map_status(StatusCode::INTERNAL_SERVER_ERROR, r#"{"error":"AI analysis failed"}"#),
            AnalysisError::Transport(msg) if msg == "AI analysis failed"
        ));
        assert!(matches!(map_status(StatusCode::BAD_GATEWAY, "<html>"), AnalysisError::Transport(_)));
    }

    #[test]
    fn extracts_text_from_known_shapes() {
        let chat = r#"{"choices":[{"message":{"role":"assistant","content":"```json\n{}\n```"}}]}"#;
        assert_eq!(extract_model_text(chat), "```json\n{}\n```");

        let function = r#"{"success":true,"analysis":{"riskLevel":"low"}}"#;
        assert_eq!(extract_model_text(function), r#"{"riskLevel":"low"}"#);

        let text_analysis = r#"{"analysis":"free text"}"#;
        assert_eq!(extract_model_text(text_analysis), "free text");

        assert_eq!(extract_model_text("plain words"), "plain words");
    }

    #[test]
    fn chat_request_embeds_image_as_data_url() {
        let config = InferenceConfig {
            protocol: InferenceProtocol::ChatCompletions,
            ..InferenceConfig::default()
        };
        let client = InferenceClient::new(config).unwrap();
        let upload = ScanUpload::new("a.png", "image/png", ScanType::Ct, vec![1, 2, 3]);
        let request = client.chat_request(&upload, "AQID");

        assert_eq!(request.model, "google/gemini-2.5-flash");
        assert!((request.temperature - 0.3).abs() < f32::EPSILON);
        assert!(request.messages[0]["content"].as_str().unwrap().contains("analyze CT brain scans"));
        assert_eq!(request.messages[1]["content"][1]["image_url"]["url"], "data:image/png;base64,AQID");
    }
}
