use std::collections::BTreeMap;
use std::env;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use lexiboard_contracts::vocabulary::{Category, VocabularyList};
use reqwest::blocking::{Client as HttpClient, Response as HttpResponse};
use serde_json::{json, Value};
use thiserror::Error;

pub const DEFAULT_ASPECT_RATIO: &str = "9:16";
pub const DEFAULT_RESOLUTION: &str = "4K";
pub const DEFAULT_OUTPUT_FORMAT: &str = "jpg";

const KIE_API_BASE: &str = "https://api.kie.ai/api/v1";
const KIE_MODEL: &str = "nano-banana-pro";
const YUNWU_ENDPOINT: &str =
    "https://yunwu.ai/v1beta/models/gemini-3-pro-image-preview:generateContent";

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_IMAGE_TIMEOUT: Duration = Duration::from_secs(300);
const CANCEL_SLICE: Duration = Duration::from_millis(100);

/// Task-id field variants seen in create-task responses, tried in order;
/// first present wins. New response shapes are additive rows here.
const TASK_ID_RULES: &[&[&str]] = &[&["data", "taskId"], &["taskId"], &["id"]];

/// Inline-image field variants inside a response part, tried in order.
const INLINE_DATA_KEYS: &[&str] = &["inline_data", "inlineData"];
const MIME_TYPE_KEYS: &[&str] = &["mime_type", "mimeType"];
const REASONING_MARKER_KEY: &str = "thoughtSignature";

/// Classified failure surface for one image generation.
///
/// Provider strategies map their wire-level failures onto these variants;
/// callers never see provider field vocabulary.
#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("task creation failed: {0}")]
    TaskCreation(String),
    #[error("task status query failed: {0}")]
    TaskPoll(String),
    #[error("image task failed: {0}")]
    TaskFailed(String),
    #[error("image task still pending after {attempts} status queries")]
    TaskTimeout { attempts: u32 },
    #[error("image request failed (HTTP {status}): {body}")]
    Request { status: u16, body: String },
    #[error("image response unusable: {0}")]
    ResponseShape(String),
    #[error("model is still reasoning and returned no image yet")]
    PendingNoImage,
    #[error("image download failed: {0}")]
    Download(String),
    #[error("generation cancelled")]
    Cancelled,
    #[error("no image provider named '{0}'")]
    UnknownProvider(String),
    #[error("transport failure: {0}")]
    Transport(#[from] reqwest::Error),
}

/// One image generation invocation. Immutable once constructed.
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub prompt: String,
    pub api_key: String,
    pub aspect_ratio: String,
    pub resolution: String,
    pub output_format: String,
}

impl GenerateRequest {
    pub fn new(prompt: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            api_key: api_key.into(),
            aspect_ratio: DEFAULT_ASPECT_RATIO.to_string(),
            resolution: DEFAULT_RESOLUTION.to_string(),
            output_format: DEFAULT_OUTPUT_FORMAT.to_string(),
        }
    }
}

/// A finished generation: base64-encoded image bytes plus the mime type the
/// provider reported, if any. Owned by the caller; the engine keeps nothing.
#[derive(Debug, Clone)]
pub struct GeneratedImage {
    pub data: String,
    pub mime_type: Option<String>,
    pub provider: String,
}

impl GeneratedImage {
    pub fn decode_bytes(&self) -> Result<Vec<u8>, GenerateError> {
        BASE64
            .decode(self.data.as_bytes())
            .map_err(|err| GenerateError::ResponseShape(format!("invalid base64 payload: {err}")))
    }
}

/// Cooperative cancellation for the polling loop. The flag is checked before
/// every status query and inside the inter-poll sleep.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Poll cadence for the async-task strategy. The defaults mirror the service
/// contract (5 s × 60 attempts, five minutes of wall time).
#[derive(Debug, Clone, Copy)]
pub struct PollSettings {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            max_attempts: 60,
        }
    }
}

pub trait ImageProvider: Send + Sync {
    fn name(&self) -> &str;
    fn generate(
        &self,
        request: &GenerateRequest,
        cancel: &CancelFlag,
    ) -> Result<GeneratedImage, GenerateError>;
    /// Cheap connectivity check with the given credential.
    fn probe(&self, api_key: &str) -> Result<(), GenerateError>;
}

#[derive(Default)]
pub struct ProviderRegistry {
    providers: BTreeMap<String, Box<dyn ImageProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<P: ImageProvider + 'static>(&mut self, provider: P) {
        self.providers
            .insert(provider.name().to_string(), Box::new(provider));
    }

    pub fn get(&self, name: &str) -> Option<&dyn ImageProvider> {
        self.providers.get(name).map(|provider| provider.as_ref())
    }

    pub fn names(&self) -> Vec<String> {
        self.providers.keys().cloned().collect()
    }
}

/// Registry with both built-in strategies installed.
pub fn default_provider_registry(poll: PollSettings) -> ProviderRegistry {
    let mut registry = ProviderRegistry::new();
    registry.register(KieProvider::new(poll));
    registry.register(YunwuProvider::new());
    registry
}

/// Dispatches one generation to the selected strategy.
///
/// Holds no retry state of its own; bounded polling lives inside the
/// async-task strategy only. Concurrent calls are independent.
pub fn generate_image(
    registry: &ProviderRegistry,
    provider: &str,
    request: &GenerateRequest,
    cancel: &CancelFlag,
) -> Result<GeneratedImage, GenerateError> {
    let strategy = registry
        .get(provider)
        .ok_or_else(|| GenerateError::UnknownProvider(provider.to_string()))?;
    strategy.generate(request, cancel)
}

/// Async-task strategy: create a job, poll its record until terminal, then
/// fetch the result object and re-encode it as base64.
pub struct KieProvider {
    api_base: String,
    poll: PollSettings,
    request_timeout: Duration,
    http: HttpClient,
}

impl KieProvider {
    pub fn new(poll: PollSettings) -> Self {
        let api_base = non_empty_env("LEXIBOARD_KIE_API_BASE")
            .map(|value| value.trim_end_matches('/').to_string())
            .unwrap_or_else(|| KIE_API_BASE.to_string());
        Self::with_api_base(api_base, poll)
    }

    pub fn with_api_base(api_base: impl Into<String>, poll: PollSettings) -> Self {
        Self {
            api_base: api_base.into(),
            poll,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            http: HttpClient::new(),
        }
    }

    fn create_endpoint(&self) -> String {
        format!("{}/jobs/createTask", self.api_base)
    }

    fn query_endpoint(&self) -> String {
        format!("{}/jobs/recordInfo", self.api_base)
    }

    fn create_task(&self, request: &GenerateRequest) -> Result<String, GenerateError> {
        let payload = json!({
            "model": KIE_MODEL,
            "input": {
                "prompt": request.prompt,
                "aspect_ratio": request.aspect_ratio,
                "resolution": request.resolution,
                "output_format": request.output_format,
            }
        });
        let response = self
            .http
            .post(self.create_endpoint())
            .bearer_auth(&request.api_key)
            .timeout(self.request_timeout)
            .json(&payload)
            .send()?;
        let status = response.status();
        let body = response.text()?;
        if !status.is_success() {
            return Err(GenerateError::TaskCreation(format!(
                "HTTP {}: {}",
                status.as_u16(),
                truncate_text(&body, 512)
            )));
        }
        let parsed: Value = serde_json::from_str(&body).map_err(|_| {
            GenerateError::TaskCreation("create response is not valid JSON".to_string())
        })?;
        extract_task_id(&parsed).ok_or_else(|| {
            GenerateError::TaskCreation(format!(
                "create response carried no task identifier: {}",
                truncate_text(&body, 256)
            ))
        })
    }

    /// Polls until a terminal state, consuming one attempt per status query.
    /// Returns the first result URL on success.
    fn poll_task(
        &self,
        task_id: &str,
        api_key: &str,
        cancel: &CancelFlag,
    ) -> Result<String, GenerateError> {
        for attempt in 1..=self.poll.max_attempts {
            if cancel.is_cancelled() {
                return Err(GenerateError::Cancelled);
            }
            let response = self
                .http
                .get(self.query_endpoint())
                .query(&[("taskId", task_id)])
                .bearer_auth(api_key)
                .timeout(self.request_timeout)
                .send()?;
            let status = response.status();
            let body = response.text()?;
            if !status.is_success() {
                return Err(GenerateError::TaskPoll(format!(
                    "HTTP {}: {}",
                    status.as_u16(),
                    truncate_text(&body, 512)
                )));
            }
            let parsed: Value = serde_json::from_str(&body).map_err(|_| {
                GenerateError::TaskPoll("status response is not valid JSON".to_string())
            })?;
            let code = parsed.get("code").and_then(Value::as_i64);
            if code != Some(200) {
                let msg = parsed
                    .get("msg")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown error");
                return Err(GenerateError::TaskPoll(format!(
                    "service code {}: {msg}",
                    code.map(|value| value.to_string())
                        .unwrap_or_else(|| "missing".to_string())
                )));
            }
            let data = parsed.get("data").cloned().unwrap_or(Value::Null);
            let state = data.get("state").and_then(Value::as_str).unwrap_or("");
            match state {
                "success" => {
                    return extract_result_url(&data).ok_or_else(|| {
                        GenerateError::ResponseShape(
                            "task succeeded but no result URL was returned".to_string(),
                        )
                    });
                }
                "fail" => {
                    let reason = data
                        .get("failMsg")
                        .and_then(Value::as_str)
                        .filter(|value| !value.trim().is_empty())
                        .unwrap_or("unknown failure");
                    return Err(GenerateError::TaskFailed(reason.to_string()));
                }
                "waiting" => {
                    if attempt < self.poll.max_attempts {
                        sleep_with_cancel(self.poll.interval, cancel)?;
                    }
                }
                other => {
                    return Err(GenerateError::TaskPoll(format!(
                        "unexpected task state '{other}'"
                    )));
                }
            }
        }
        Err(GenerateError::TaskTimeout {
            attempts: self.poll.max_attempts,
        })
    }

    fn download_result(&self, url: &str) -> Result<(Vec<u8>, Option<String>), GenerateError> {
        let response = self
            .http
            .get(url)
            .timeout(DEFAULT_IMAGE_TIMEOUT)
            .send()
            .map_err(|err| GenerateError::Download(err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(GenerateError::Download(format!(
                "HTTP {}: {}",
                status.as_u16(),
                truncate_text(&body, 512)
            )));
        }
        let mime_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let bytes = response
            .bytes()
            .map_err(|err| GenerateError::Download(err.to_string()))?
            .to_vec();
        Ok((bytes, mime_type))
    }
}

impl ImageProvider for KieProvider {
    fn name(&self) -> &str {
        "kie"
    }

    fn generate(
        &self,
        request: &GenerateRequest,
        cancel: &CancelFlag,
    ) -> Result<GeneratedImage, GenerateError> {
        if cancel.is_cancelled() {
            return Err(GenerateError::Cancelled);
        }
        let task_id = self.create_task(request)?;
        let result_url = self.poll_task(&task_id, &request.api_key, cancel)?;
        let (bytes, mime_type) = self.download_result(&result_url)?;
        Ok(GeneratedImage {
            data: BASE64.encode(bytes),
            mime_type,
            provider: self.name().to_string(),
        })
    }

    fn probe(&self, api_key: &str) -> Result<(), GenerateError> {
        let throwaway = GenerateRequest {
            prompt: "test".to_string(),
            api_key: api_key.to_string(),
            aspect_ratio: "1:1".to_string(),
            resolution: "1K".to_string(),
            output_format: "png".to_string(),
        };
        self.create_task(&throwaway).map(|_| ())
    }
}

/// How the sync strategy presents its credential.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AuthMode {
    #[default]
    Bearer,
    /// Older deployments expect the key as a `key` query parameter.
    QueryKey,
}

/// Sync-direct strategy: one blocking call that returns the image inline.
pub struct YunwuProvider {
    endpoint: String,
    auth: AuthMode,
    request_timeout: Duration,
    http: HttpClient,
}

impl Default for YunwuProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl YunwuProvider {
    pub fn new() -> Self {
        let endpoint =
            non_empty_env("LEXIBOARD_YUNWU_ENDPOINT").unwrap_or_else(|| YUNWU_ENDPOINT.to_string());
        Self::with_endpoint(endpoint, AuthMode::default())
    }

    pub fn with_endpoint(endpoint: impl Into<String>, auth: AuthMode) -> Self {
        Self {
            endpoint: endpoint.into(),
            auth,
            request_timeout: DEFAULT_IMAGE_TIMEOUT,
            http: HttpClient::new(),
        }
    }

    fn post_content(
        &self,
        prompt: &str,
        api_key: &str,
        aspect_ratio: &str,
        image_size: &str,
    ) -> Result<HttpResponse, GenerateError> {
        let payload = json!({
            "contents": [{
                "role": "user",
                "parts": [{ "text": prompt }]
            }],
            "generationConfig": {
                "responseModalities": ["IMAGE"],
                "imageConfig": {
                    "aspectRatio": aspect_ratio,
                    "imageSize": image_size,
                }
            }
        });
        let mut builder = self
            .http
            .post(&self.endpoint)
            .timeout(self.request_timeout)
            .json(&payload);
        builder = match self.auth {
            AuthMode::Bearer => builder.bearer_auth(api_key),
            AuthMode::QueryKey => builder.query(&[("key", api_key)]),
        };
        Ok(builder.send()?)
    }
}

impl ImageProvider for YunwuProvider {
    fn name(&self) -> &str {
        "yunwu"
    }

    fn generate(
        &self,
        request: &GenerateRequest,
        cancel: &CancelFlag,
    ) -> Result<GeneratedImage, GenerateError> {
        if cancel.is_cancelled() {
            return Err(GenerateError::Cancelled);
        }
        let response = self.post_content(
            &request.prompt,
            &request.api_key,
            &request.aspect_ratio,
            &request.resolution,
        )?;
        let status = response.status();
        let body = response.text()?;
        if !status.is_success() {
            return Err(GenerateError::Request {
                status: status.as_u16(),
                body: truncate_text(&body, 512),
            });
        }
        let parsed: Value = serde_json::from_str(&body).map_err(|_| {
            GenerateError::ResponseShape("image response is not valid JSON".to_string())
        })?;
        let (data, mime_type) = extract_inline_image(&parsed)?;
        Ok(GeneratedImage {
            data,
            mime_type,
            provider: self.name().to_string(),
        })
    }

    fn probe(&self, api_key: &str) -> Result<(), GenerateError> {
        let response = self.post_content("test", api_key, "1:1", "HD")?;
        let status = response.status();
        // HTTP 400 still proves the endpoint and credential path are live.
        if status.is_success() || status.as_u16() == 400 {
            return Ok(());
        }
        let body = response.text().unwrap_or_default();
        Err(GenerateError::Request {
            status: status.as_u16(),
            body: truncate_text(&body, 512),
        })
    }
}

fn extract_task_id(payload: &Value) -> Option<String> {
    TASK_ID_RULES.iter().find_map(|path| {
        let value = lookup_path(payload, path)?;
        match value {
            Value::String(raw) => {
                let trimmed = raw.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            }
            Value::Number(raw) => Some(raw.to_string()),
            _ => None,
        }
    })
}

/// Parses the embedded result payload of a succeeded task and returns its
/// first URL. The payload arrives JSON-encoded inside the status body.
fn extract_result_url(data: &Value) -> Option<String> {
    let raw = data.get("resultJson").and_then(Value::as_str)?;
    let parsed: Value = serde_json::from_str(raw).ok()?;
    parsed
        .get("resultUrls")
        .and_then(Value::as_array)?
        .iter()
        .filter_map(Value::as_str)
        .map(str::trim)
        .find(|value| !value.is_empty())
        .map(str::to_string)
}

/// Scans the first candidate's parts for inline image data. At most one part
/// carries the image; a reasoning marker without image data means the result
/// is explicitly not available yet.
fn extract_inline_image(payload: &Value) -> Result<(String, Option<String>), GenerateError> {
    let parts = payload
        .get("candidates")
        .and_then(Value::as_array)
        .and_then(|rows| rows.first())
        .and_then(|candidate| candidate.get("content"))
        .and_then(|content| content.get("parts"))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    for part in &parts {
        let Some(inline) = INLINE_DATA_KEYS.iter().find_map(|key| part.get(*key)) else {
            continue;
        };
        let data = inline.get("data").and_then(Value::as_str).unwrap_or("");
        if data.is_empty() {
            continue;
        }
        let mime_type = MIME_TYPE_KEYS
            .iter()
            .find_map(|key| inline.get(*key))
            .and_then(Value::as_str)
            .map(str::to_string);
        return Ok((data.to_string(), mime_type));
    }

    if parts
        .iter()
        .any(|part| part.get(REASONING_MARKER_KEY).is_some())
    {
        return Err(GenerateError::PendingNoImage);
    }
    Err(GenerateError::ResponseShape(
        "no inline image data in any response part".to_string(),
    ))
}

#[derive(Debug, Error)]
pub enum VocabError {
    #[error("text api request failed (HTTP {status}): {body}")]
    Api { status: u16, body: String },
    #[error("text api reply held no parseable JSON: {0}")]
    Parse(String),
    #[error("transport failure: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Chat-completion client for vocabulary generation and translation.
pub struct VocabularyClient {
    api_url: String,
    api_key: String,
    model: String,
    request_timeout: Duration,
    http: HttpClient,
}

impl VocabularyClient {
    pub fn new(
        api_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            api_url: api_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            http: HttpClient::new(),
        }
    }

    fn chat(
        &self,
        system: &str,
        user: &str,
        temperature: f64,
        max_tokens: u32,
    ) -> Result<String, VocabError> {
        let payload = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user },
            ],
            "temperature": temperature,
            "max_tokens": max_tokens,
        });
        let response = self
            .http
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .timeout(self.request_timeout)
            .json(&payload)
            .send()?;
        let status = response.status();
        let body = response.text()?;
        if !status.is_success() {
            return Err(VocabError::Api {
                status: status.as_u16(),
                body: truncate_text(&body, 512),
            });
        }
        let parsed: Value = serde_json::from_str(&body)
            .map_err(|_| VocabError::Parse("reply is not valid JSON".to_string()))?;
        parsed
            .get("choices")
            .and_then(Value::as_array)
            .and_then(|rows| rows.first())
            .and_then(|choice| choice.get("message"))
            .and_then(|message| message.get("content"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| VocabError::Parse("reply carried no message content".to_string()))
    }

    /// Generates a categorized bilingual word list for a custom scene.
    ///
    /// The model is asked for pure JSON but routinely wraps it in prose or a
    /// markdown fence, so the first balanced object is extracted before
    /// parsing. Entries are normalized to the lowercase-english convention.
    pub fn generate_vocabulary(&self, scene: &str) -> Result<VocabularyList, VocabError> {
        let user_prompt = format!(
            r#"你是儿童识字专家。请为场景"{scene}"生成 15-20 个适合 5-9 岁儿童的双语词汇。

要求：
1. 每个词汇必须包含英文和汉字（格式：english 汉字）
2. 英文单词必须全部小写
3. 分为三类：
   - 核心角色与设施（3-5个）
   - 常见物品/工具（5-8个）
   - 环境与装饰（3-5个）
4. 返回纯 JSON 格式，不要任何其他文字：
{{
  "核心": ["english 汉字", "english 汉字", ...],
  "物品": ["english 汉字", "english 汉字", ...],
  "环境": ["english 汉字", "english 汉字", ...]
}}

示例：
{{
  "核心": ["cashier 收银员", "shelf 货架"],
  "物品": ["apple 苹果", "milk 牛奶"],
  "环境": ["exit 出口", "light 灯"]
}}"#
        );
        let content = self.chat(
            "你是一个专业的儿童教育专家，擅长为儿童场景生成双语词汇。",
            &user_prompt,
            0.7,
            1000,
        )?;
        let object = extract_json_object(&content)
            .ok_or_else(|| VocabError::Parse(truncate_text(&content, 256)))?;
        let parsed: Value = serde_json::from_str(object)
            .map_err(|err| VocabError::Parse(format!("extracted object rejected: {err}")))?;

        let mut list = VocabularyList::default();
        for category in Category::ALL {
            let words = parsed
                .get(category.label())
                .and_then(Value::as_array)
                .map(|rows| {
                    rows.iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default();
            *list.category_mut(category) = words;
        }
        list.normalize();
        Ok(list)
    }

    /// Translates one Chinese word to lowercase English.
    pub fn translate_word(&self, chinese: &str) -> Result<String, VocabError> {
        let content = self.chat(
            "你是一个专业的翻译专家，将中文词汇翻译成简洁的英文。只返回英文翻译（全部小写），不要其他解释。",
            &format!("请将\"{chinese}\"翻译成英文，只返回英文单词或短语（全部小写），不要其他内容。"),
            0.3,
            20,
        )?;
        Ok(content.trim().to_string())
    }

    /// Translates each word in order; the first failure aborts the batch.
    pub fn batch_translate(&self, words: &[String]) -> Result<Vec<String>, VocabError> {
        words
            .iter()
            .map(|word| self.translate_word(word))
            .collect()
    }

    /// Tiny echo request to verify the endpoint, key, and model name.
    pub fn probe(&self) -> Result<(), VocabError> {
        self.chat("", "test", 0.0, 10).map(|_| ())
    }
}

/// Maps a reported mime type to a file extension, falling back to the
/// requested output format.
pub fn output_extension(mime_type: Option<&str>, output_format: &str) -> &'static str {
    if let Some(mime) = mime_type {
        let lowered = mime.to_ascii_lowercase();
        if lowered.contains("jpeg") || lowered.contains("jpg") {
            return "jpg";
        }
        if lowered.contains("webp") {
            return "webp";
        }
        if lowered.contains("png") {
            return "png";
        }
    }
    match output_format.trim().to_ascii_lowercase().as_str() {
        "png" => "png",
        "webp" => "webp",
        _ => "jpg",
    }
}

/// Finds the first balanced `{...}` object in free-form model output,
/// respecting string literals and escapes.
fn extract_json_object(content: &str) -> Option<&str> {
    let start = content.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, ch) in content[start..].char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&content[start..start + offset + ch.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    None
}

fn lookup_path<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    let mut current = value;
    for key in path {
        current = current.get(*key)?;
    }
    Some(current)
}

/// Sleeps one poll interval in short slices so a cancellation lands quickly.
fn sleep_with_cancel(interval: Duration, cancel: &CancelFlag) -> Result<(), GenerateError> {
    let mut remaining = interval;
    while !remaining.is_zero() {
        if cancel.is_cancelled() {
            return Err(GenerateError::Cancelled);
        }
        let slice = remaining.min(CANCEL_SLICE);
        thread::sleep(slice);
        remaining = remaining.saturating_sub(slice);
    }
    if cancel.is_cancelled() {
        return Err(GenerateError::Cancelled);
    }
    Ok(())
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}
