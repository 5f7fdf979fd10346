//! Upstream services are not trusted to return a single consistent shape.
//! Responses are decoded through an ordered list of shape matchers into a
//! tagged union; a payload matching none of them is a distinct error
//! ("no usable artifact"), not a transport failure.

use serde_json::Value;

use crate::{GatewayError, TaskStatus};

/// Canonical decoded response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Normalized {
    /// Panel artifacts: data URIs or URLs, in reading order.
    Panels(Vec<String>),
    /// A colorized panel as a data URI.
    Colorized(String),
    /// An async task to poll.
    Task { id: String, status_url: String },
    /// A directly available video URL.
    Video(String),
    /// A produced file, optionally named (merge results).
    File { url: String, name: Option<String> },
}

/// Prefix bare base64 payloads so callers always receive a renderable
/// reference. URLs and existing data URIs pass through untouched.
pub fn ensure_data_uri(payload: &str) -> String {
    if payload.starts_with("data:image/")
        || payload.starts_with("http://")
        || payload.starts_with("https://")
    {
        payload.to_string()
    } else {
        format!("data:image/png;base64,{payload}")
    }
}

fn string_array(value: &Value) -> Option<Vec<String>> {
    let items = value.as_array()?;
    let strings: Vec<String> = items
        .iter()
        .filter_map(|v| v.as_str().map(str::to_string))
        .collect();
    if strings.is_empty() {
        None
    } else {
        Some(strings)
    }
}

fn match_panel_crops(value: &Value) -> Option<Normalized> {
    let crops = string_array(value.get("panel_crops")?)?;
    Some(Normalized::Panels(
        crops.iter().map(|c| ensure_data_uri(c)).collect(),
    ))
}

fn match_panel_urls(value: &Value) -> Option<Normalized> {
    let urls = value
        .get("panel_urls")
        .and_then(string_array)
        .or_else(|| value.get("panels").and_then(string_array))?;
    Some(Normalized::Panels(urls))
}

/// `{img1: ..., img2: ...}` numbered keys, probed up to img20.
fn match_numbered_images(value: &Value) -> Option<Normalized> {
    let mut urls = Vec::new();
    for i in 1..=20 {
        if let Some(url) = value.get(format!("img{i}")).and_then(Value::as_str) {
            urls.push(url.to_string());
        }
    }
    if urls.is_empty() {
        None
    } else {
        Some(Normalized::Panels(urls))
    }
}

fn match_colorized(value: &Value) -> Option<Normalized> {
    let image = value.get("colorized_image")?.as_str()?;
    Some(Normalized::Colorized(ensure_data_uri(image)))
}

fn match_task(value: &Value) -> Option<Normalized> {
    let id = value.get("task_id")?.as_str()?.to_string();
    let status_url = value.get("status_url")?.as_str()?.to_string();
    Some(Normalized::Task { id, status_url })
}

fn match_video(value: &Value) -> Option<Normalized> {
    let url = value.get("video")?.get("url")?.as_str()?;
    Some(Normalized::Video(url.to_string()))
}

fn match_file(value: &Value) -> Option<Normalized> {
    let url = value.get("file_url")?.as_str()?.to_string();
    let name = value
        .get("file_name")
        .and_then(Value::as_str)
        .map(str::to_string);
    Some(Normalized::File { url, name })
}

type Matcher = fn(&Value) -> Option<Normalized>;

/// Priority order matters: panel shapes first, then scalar artifacts.
const MATCHERS: &[Matcher] = &[
    match_panel_crops,
    match_panel_urls,
    match_numbered_images,
    match_colorized,
    match_task,
    match_video,
    match_file,
];

/// Decode an upstream payload into the canonical shape.
pub fn normalize(value: &Value) -> Result<Normalized, GatewayError> {
    MATCHERS
        .iter()
        .find_map(|m| m(value))
        .ok_or(GatewayError::NoArtifact)
}

/// Decode a task status payload: `{status, result?: {video: {url}}, error?}`.
/// An `error` field is terminal failure regardless of the status string.
pub fn parse_task_status(value: &Value) -> TaskStatus {
    if let Some(err) = value.get("error").and_then(Value::as_str) {
        return TaskStatus::Failed(err.to_string());
    }
    match value.get("status").and_then(Value::as_str) {
        Some("pending") => TaskStatus::Pending,
        Some("running") => TaskStatus::Running,
        Some("done") => {
            let url = value
                .get("result")
                .and_then(|r| r.get("video"))
                .and_then(|v| v.get("url"))
                .and_then(Value::as_str)
                .map(str::to_string);
            TaskStatus::Done(url)
        }
        Some("error") => TaskStatus::Failed("task reported error status".to_string()),
        other => TaskStatus::Failed(format!("unrecognized task status: {other:?}")),
    }
}
