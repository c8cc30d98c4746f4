use serde::Serialize;
use serde_json::{Map, Value};

use super::ModelMode;

/// Feature switches sent with every request. The backend expects all of them
/// and the relay never changes their values.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureToggles {
    pub disable_memory: bool,
    pub disable_search: bool,
    pub disable_self_harm_short_circuit: bool,
    pub disable_text_follow_ups: bool,
    pub enable_image_generation: bool,
    pub enable_image_streaming: bool,
    pub enable_side_by_side: bool,
    pub file_attachments: Vec<String>,
    pub force_concise: bool,
    pub force_side_by_side: bool,
    pub image_attachments: Vec<String>,
    pub image_generation_count: u32,
    pub is_async_chat: bool,
    pub is_reasoning: bool,
    pub model_config_override: Map<String, Value>,
    pub model_map: Map<String, Value>,
    pub return_image_bytes: bool,
    pub return_raw_grok_in_xai_request: bool,
    pub send_final_metadata: bool,
    pub tool_overrides: Map<String, Value>,
}

impl Default for FeatureToggles {
    fn default() -> Self {
        Self {
            disable_memory: false,
            disable_search: false,
            disable_self_harm_short_circuit: false,
            disable_text_follow_ups: false,
            enable_image_generation: true,
            enable_image_streaming: true,
            enable_side_by_side: true,
            file_attachments: Vec::new(),
            force_concise: false,
            force_side_by_side: false,
            image_attachments: Vec::new(),
            image_generation_count: 2,
            is_async_chat: false,
            is_reasoning: false,
            model_config_override: Map::new(),
            model_map: Map::new(),
            return_image_bytes: false,
            return_raw_grok_in_xai_request: false,
            send_final_metadata: true,
            tool_overrides: Map::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestModelDetails {
    pub model_id: String,
    pub model_mode: ModelMode,
    pub model_name: String,
}

impl RequestModelDetails {
    fn new(model: &str, model_mode: ModelMode) -> Self {
        Self {
            model_id: model.to_string(),
            model_mode,
            model_name: model.to_string(),
        }
    }
}

/// Body of `POST .../conversations/new`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewConversationPayload {
    #[serde(flatten)]
    pub toggles: FeatureToggles,
    pub message: String,
    pub model_mode: ModelMode,
    pub model_name: String,
    pub response_metadata: Map<String, Value>,
    pub request_model_details: RequestModelDetails,
    pub temporary: bool,
}

/// Snake-cased metadata block the continuation endpoint insists on.
#[derive(Debug, Clone, Serialize)]
pub struct ContinuationMetadata {
    pub mode: &'static str,
    pub model: String,
}

/// Body of `POST .../conversations/{id}/responses`.
///
/// Model identity is repeated at the top level, in `request_metadata` and in
/// `requestModelDetails`; the backend rejects requests missing any of them.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContinuationPayload {
    #[serde(flatten)]
    pub toggles: FeatureToggles,
    pub custom_personality: String,
    pub disable_artifact: bool,
    pub is_from_grok_files: bool,
    pub is_regen_request: bool,
    pub message: String,
    pub metadata: Map<String, Value>,
    #[serde(rename = "request_metadata")]
    pub request_metadata: ContinuationMetadata,
    pub mode: &'static str,
    pub model: String,
    pub model_mode: ModelMode,
    pub request_model_details: RequestModelDetails,
    pub parent_response_id: String,
    pub skip_cancel_current_inflight_requests: bool,
}

const CONTINUATION_MODE: &str = "auto";

/// Request body for either endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum UpstreamPayload {
    New(NewConversationPayload),
    Continue(ContinuationPayload),
}

impl UpstreamPayload {
    #[must_use]
    pub fn is_new(&self) -> bool {
        matches!(self, UpstreamPayload::New(_))
    }

    /// Serialize to the JSON request body.
    ///
    /// # Errors
    ///
    /// Returns the serializer error; with the fixed shapes above this does not happen in practice.
    pub fn to_body(&self) -> Result<bytes::Bytes, serde_json::Error> {
        serde_json::to_vec(self).map(bytes::Bytes::from)
    }
}

/// Build the upstream body: the continuation shape when `parent_response_id`
/// is present, otherwise the new-conversation shape.
#[must_use]
pub fn build_payload(
    message: &str,
    model: &str,
    model_mode: ModelMode,
    parent_response_id: Option<&str>,
) -> UpstreamPayload {
    match parent_response_id {
        None => UpstreamPayload::New(NewConversationPayload {
            toggles: FeatureToggles::default(),
            message: message.to_string(),
            model_mode,
            model_name: model.to_string(),
            response_metadata: Map::new(),
            request_model_details: RequestModelDetails::new(model, model_mode),
            temporary: false,
        }),
        Some(parent_response_id) => UpstreamPayload::Continue(ContinuationPayload {
            toggles: FeatureToggles::default(),
            custom_personality: String::new(),
            disable_artifact: false,
            is_from_grok_files: false,
            is_regen_request: false,
            message: message.to_string(),
            metadata: Map::new(),
            request_metadata: ContinuationMetadata {
                mode: CONTINUATION_MODE,
                model: model.to_string(),
            },
            mode: CONTINUATION_MODE,
            model: model.to_string(),
            model_mode,
            request_model_details: RequestModelDetails::new(model, model_mode),
            parent_response_id: parent_response_id.to_string(),
            skip_cancel_current_inflight_requests: false,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn to_value(payload: &UpstreamPayload) -> Value {
        serde_json::to_value(payload).unwrap()
    }

    #[test]
    fn test_new_conversation_shape() {
        let payload = build_payload("Hello", "grok-3", ModelMode::Fast, None);
        assert!(payload.is_new());
        let value = to_value(&payload);

        assert_eq!(value["message"], "Hello");
        assert_eq!(value["modelName"], "grok-3");
        assert_eq!(value["modelMode"], "MODEL_MODE_FAST");
        assert_eq!(
            value["requestModelDetails"],
            json!({"modelId": "grok-3", "modelMode": "MODEL_MODE_FAST", "modelName": "grok-3"})
        );
        assert_eq!(value["disableSelfHarmShortCircuit"], false);
        assert_eq!(value["enableImageGeneration"], true);
        assert_eq!(value["imageGenerationCount"], 2);
        assert_eq!(value["returnRawGrokInXaiRequest"], false);
        assert_eq!(value["sendFinalMetadata"], true);
        assert_eq!(value["temporary"], false);
        assert_eq!(value["responseMetadata"], json!({}));
        assert_eq!(value["fileAttachments"], json!([]));
        assert!(value.get("parentResponseId").is_none());
        assert!(value.get("request_metadata").is_none());
    }

    #[test]
    fn test_continuation_shape() {
        let payload = build_payload("Again", "grok-2", ModelMode::Auto, Some("r1"));
        assert!(!payload.is_new());
        let value = to_value(&payload);

        assert_eq!(value["parentResponseId"], "r1");
        assert_eq!(value["mode"], "auto");
        assert_eq!(value["model"], "grok-2");
        assert_eq!(
            value["request_metadata"],
            json!({"mode": "auto", "model": "grok-2"})
        );
        assert_eq!(value["requestModelDetails"]["modelId"], "grok-2");
        assert_eq!(value["modelMode"], "MODEL_MODE_AUTO");
        assert_eq!(value["customPersonality"], "");
        assert_eq!(value["isRegenRequest"], false);
        assert_eq!(value["skipCancelCurrentInflightRequests"], false);
        assert_eq!(value["disableMemory"], false);
        assert_eq!(value["toolOverrides"], json!({}));
        assert!(value.get("modelName").is_none());
        assert!(value.get("temporary").is_none());
    }

    #[test]
    fn test_body_is_json_object() {
        let body = build_payload("x", "grok-3", ModelMode::Auto, None)
            .to_body()
            .unwrap();
        let value: Value = serde_json::from_slice(&body).unwrap();
        assert!(value.is_object());
    }
}
