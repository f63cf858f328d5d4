//! JIRA-style HTTP tracker client.
//!
//! Talks JSON over HTTP with two auto-detections, both cached for the
//! process lifetime:
//!
//! - auth mode: under `auto`, bearer is tried first and basic on 401;
//! - API version: v2 is probed first, a 410 (cloud deprecation signal)
//!   flips the client to v3.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;

use reqwest::blocking::{Client, RequestBuilder};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, warn};
use url::Url;

use daf_config::{AuthType, BackendConfig, CommentVisibility, FieldSpec, Settings};
use daf_models::IssueKey;

use crate::error::{Result, TrackerError};
use crate::traits::IssueTracker;
use crate::types::{IssueFields, SyncFilter, Ticket, TicketDetails, Transition};

/// Environment variable holding the API token.
pub const TOKEN_ENV: &str = "JIRA_API_TOKEN";

/// Environment variable holding the tracker URL.
pub const URL_ENV: &str = "JIRA_URL";

/// Environment variable overriding the auth type (`basic`/`bearer`/`auto`).
pub const AUTH_TYPE_ENV: &str = "JIRA_AUTH_TYPE";

/// Environment variable holding the account email for basic auth.
pub const EMAIL_ENV: &str = "JIRA_EMAIL";

/// Maximum body excerpt carried in `Api` errors and debug logs.
const BODY_EXCERPT_LEN: usize = 2048;

/// Attempt ceiling for the detect-and-retry loop: one auth fallback plus
/// one version fallback at most.
const MAX_ATTEMPTS: usize = 3;

/// A resolved authentication mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AuthMode {
    Basic,
    Bearer,
}

/// Tracker REST API version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ApiVersion {
    V2,
    V3,
}

impl ApiVersion {
    fn as_str(&self) -> &'static str {
        match self {
            Self::V2 => "2",
            Self::V3 => "3",
        }
    }
}

/// Detection state cached across requests.
#[derive(Debug)]
struct DetectState {
    auth: Option<AuthMode>,
    api_version: ApiVersion,
}

/// Blocking HTTP client for a JIRA-style tracker.
pub struct JiraClient {
    http: Client,
    base_url: Url,
    token: String,
    email: Option<String>,
    configured_auth: AuthType,
    state: Mutex<DetectState>,
}

impl JiraClient {
    /// Builds a client from resolved settings and backend configuration.
    ///
    /// Endpoint and credentials come from the environment first
    /// (`JIRA_URL`, `JIRA_API_TOKEN`, `JIRA_AUTH_TYPE`, `JIRA_EMAIL`),
    /// then from configuration.
    pub fn from_config(settings: &Settings, backend: &BackendConfig) -> Result<Self> {
        let url = std::env::var(URL_ENV)
            .ok()
            .or_else(|| backend.url.clone())
            .or_else(|| settings.tracker_url.clone())
            .ok_or_else(|| TrackerError::Config("tracker URL is not configured".to_string()))?;
        let token = std::env::var(TOKEN_ENV)
            .map_err(|_| TrackerError::missing_credential(TOKEN_ENV))?;
        let auth = match std::env::var(AUTH_TYPE_ENV).ok().as_deref() {
            Some("basic") => AuthType::Basic,
            Some("bearer") => AuthType::Bearer,
            Some("auto") => AuthType::Auto,
            Some(other) => {
                return Err(TrackerError::Config(format!(
                    "unknown {} value '{}'",
                    AUTH_TYPE_ENV, other
                )))
            }
            None => backend.auth_type.unwrap_or(settings.auth_type),
        };
        Self::new(&url, token, auth, std::env::var(EMAIL_ENV).ok())
    }

    /// Builds a client for an explicit endpoint and token.
    pub fn new(
        url: &str,
        token: String,
        configured_auth: AuthType,
        email: Option<String>,
    ) -> Result<Self> {
        let base_url = Url::parse(url)
            .map_err(|e| TrackerError::Config(format!("invalid tracker URL '{}': {}", url, e)))?;
        Ok(Self {
            http: Client::new(),
            base_url,
            token,
            email,
            configured_auth,
            state: Mutex::new(DetectState {
                auth: initial_auth(configured_auth),
                api_version: ApiVersion::V2,
            }),
        })
    }

    /// Detection state accessor; a poisoned lock only means another
    /// thread panicked mid-update, and the cached state is still usable.
    fn state(&self) -> std::sync::MutexGuard<'_, DetectState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn api_url(&self, version: ApiVersion, path: &str) -> Result<Url> {
        self.base_url
            .join(&format!("rest/api/{}/{}", version.as_str(), path))
            .map_err(|e| TrackerError::Config(format!("invalid API path '{}': {}", path, e)))
    }

    fn apply_auth(&self, request: RequestBuilder, mode: AuthMode) -> RequestBuilder {
        match mode {
            AuthMode::Bearer => request.bearer_auth(&self.token),
            AuthMode::Basic => {
                let user = self.email.clone().unwrap_or_default();
                request.basic_auth(user, Some(&self.token))
            }
        }
    }

    /// Sends one API request with detect-and-retry handling.
    ///
    /// Retries happen at most once per detection axis: 401 under `auto`
    /// switches bearer to basic, 410 switches v2 to v3. The winning
    /// combination is cached for the process lifetime.
    fn send(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<(u16, String)> {
        for attempt in 0..MAX_ATTEMPTS {
            let (version, auth_guess) = {
                let state = self.state();
                (state.api_version, state.auth.unwrap_or(AuthMode::Bearer))
            };

            let url = self.api_url(version, path)?;
            let mut request = self.http.request(method.clone(), url.clone());
            if !query.is_empty() {
                request = request.query(query);
            }
            if let Some(body) = body {
                request = request.json(body);
            }
            request = self.apply_auth(request, auth_guess);

            let response = request.send()?;
            let status = response.status().as_u16();
            let text = response.text().unwrap_or_default();

            debug!(
                method = %method,
                url = %url,
                status,
                attempt,
                body = %excerpt(&text),
                "tracker request"
            );

            if status == 410 && version == ApiVersion::V2 {
                warn!("tracker reports API v2 gone (410), switching to v3");
                self.state().api_version = ApiVersion::V3;
                continue;
            }

            let auth_undetected = self.state().auth.is_none();
            if status == 401
                && self.configured_auth == AuthType::Auto
                && auth_undetected
                && auth_guess == AuthMode::Bearer
            {
                debug!("bearer auth rejected (401), retrying with basic");
                self.state().auth = Some(AuthMode::Basic);
                continue;
            }

            if (200..300).contains(&status) {
                let mut state = self.state();
                if state.auth.is_none() {
                    debug!(mode = ?auth_guess, "caching detected auth mode");
                    state.auth = Some(auth_guess);
                }
                return Ok((status, text));
            }

            return Err(error_from_response(status, &text));
        }
        Err(TrackerError::Config(
            "tracker detection did not converge".to_string(),
        ))
    }

    fn get_issue_value(&self, key: &IssueKey) -> Result<Value> {
        let (_, body) = self
            .send(Method::GET, &format!("issue/{}", key), &[], None)
            .map_err(|e| contextualize_not_found(e, "issue", key.as_str()))?;
        serde_json::from_str(&body).map_err(|e| TrackerError::Api {
            status: 200,
            messages: vec![format!("unparseable issue body: {}", e)],
            body: excerpt(&body),
        })
    }

    fn browse_url(&self, key: &IssueKey) -> Option<String> {
        self.base_url
            .join(&format!("browse/{}", key))
            .ok()
            .map(String::from)
    }

    /// Wraps plain text into the v3 document format when needed.
    fn encode_body_text(&self, text: &str) -> Value {
        match self.state().api_version {
            ApiVersion::V2 => Value::String(text.to_string()),
            ApiVersion::V3 => json!({
                "type": "doc",
                "version": 1,
                "content": [{
                    "type": "paragraph",
                    "content": [{"type": "text", "text": text}]
                }]
            }),
        }
    }

    fn fields_payload(&self, fields: &IssueFields) -> Value {
        let mut map = serde_json::Map::new();
        for (id, value) in fields.iter() {
            let value = match (id.as_str(), value) {
                ("description", Value::String(text)) => self.encode_body_text(text),
                _ => value.clone(),
            };
            map.insert(id.clone(), value);
        }
        Value::Object(map)
    }
}

impl IssueTracker for JiraClient {
    fn name(&self) -> &str {
        "jira"
    }

    fn get_ticket(&self, key: &IssueKey) -> Result<Ticket> {
        let value = self.get_issue_value(key)?;
        Ok(parse_ticket(&value, key.clone(), self.browse_url(key)))
    }

    fn get_ticket_detailed(&self, key: &IssueKey) -> Result<TicketDetails> {
        let value = self.get_issue_value(key)?;
        Ok(parse_ticket_details(&value, key.clone(), self.browse_url(key)))
    }

    fn list_tickets(&self, filter: &SyncFilter) -> Result<Vec<Ticket>> {
        let jql = filter.to_jql();
        let (_, body) = self.send(
            Method::GET,
            "search",
            &[("jql", jql), ("maxResults", "200".to_string())],
            None,
        )?;
        let value: Value = serde_json::from_str(&body).map_err(|e| TrackerError::Api {
            status: 200,
            messages: vec![format!("unparseable search body: {}", e)],
            body: excerpt(&body),
        })?;
        let issues = value
            .get("issues")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        Ok(issues
            .iter()
            .filter_map(|issue| {
                let key: IssueKey = issue.get("key")?.as_str()?.parse().ok()?;
                let url = self.browse_url(&key);
                Some(parse_ticket(issue, key, url))
            })
            .collect())
    }

    fn create_issue(&self, project: &str, kind: &str, fields: &IssueFields) -> Result<IssueKey> {
        let mut payload = self.fields_payload(fields);
        if let Some(map) = payload.as_object_mut() {
            map.insert("project".to_string(), json!({"key": project}));
            map.insert("issuetype".to_string(), json!({"name": kind}));
        }
        let (_, body) = self.send(Method::POST, "issue", &[], Some(&json!({"fields": payload})))?;
        let value: Value = serde_json::from_str(&body).unwrap_or(Value::Null);
        value
            .get("key")
            .and_then(Value::as_str)
            .and_then(|k| k.parse().ok())
            .ok_or_else(|| TrackerError::Api {
                status: 201,
                messages: vec!["create response carried no issue key".to_string()],
                body: excerpt(&body),
            })
    }

    fn update_issue(&self, key: &IssueKey, fields: &IssueFields) -> Result<()> {
        let payload = json!({"fields": self.fields_payload(fields)});
        self.send(
            Method::PUT,
            &format!("issue/{}", key),
            &[],
            Some(&payload),
        )
        .map_err(|e| contextualize_not_found(e, "issue", key.as_str()))?;
        Ok(())
    }

    fn transition(&self, key: &IssueKey, target_state: &str) -> Result<()> {
        let transitions = self.available_transitions(key)?;
        let Some(transition) = transitions
            .iter()
            .find(|t| t.to_state.eq_ignore_ascii_case(target_state) || t.name.eq_ignore_ascii_case(target_state))
        else {
            return Err(TrackerError::validation(
                "transition",
                format!(
                    "no transition to '{}' from the current state (available: {})",
                    target_state,
                    transitions
                        .iter()
                        .map(|t| t.to_state.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
            ));
        };
        let payload = json!({"transition": {"id": transition.id}});
        self.send(
            Method::POST,
            &format!("issue/{}/transitions", key),
            &[],
            Some(&payload),
        )?;
        Ok(())
    }

    fn available_transitions(&self, key: &IssueKey) -> Result<Vec<Transition>> {
        let (_, body) = self
            .send(Method::GET, &format!("issue/{}/transitions", key), &[], None)
            .map_err(|e| contextualize_not_found(e, "issue", key.as_str()))?;
        let value: Value = serde_json::from_str(&body).unwrap_or(Value::Null);
        Ok(parse_transitions(&value))
    }

    fn add_comment(
        &self,
        key: &IssueKey,
        text: &str,
        visibility: Option<&CommentVisibility>,
    ) -> Result<()> {
        let mut payload = serde_json::Map::new();
        payload.insert("body".to_string(), self.encode_body_text(text));
        if let Some(visibility) = visibility {
            payload.insert(
                "visibility".to_string(),
                serde_json::to_value(visibility).unwrap_or(Value::Null),
            );
        }
        self.send(
            Method::POST,
            &format!("issue/{}/comment", key),
            &[],
            Some(&Value::Object(payload)),
        )
        .map_err(|e| contextualize_not_found(e, "issue", key.as_str()))?;
        Ok(())
    }

    fn attach_file(&self, key: &IssueKey, path: &Path) -> Result<()> {
        let (version, auth_guess) = {
            let state = self.state();
            (state.api_version, state.auth.unwrap_or(AuthMode::Bearer))
        };

        let url = self.api_url(version, &format!("issue/{}/attachments", key))?;
        let form = reqwest::blocking::multipart::Form::new()
            .file("file", path)
            .map_err(|source| TrackerError::Api {
                status: 0,
                messages: vec![format!(
                    "cannot read attachment {}: {}",
                    path.display(),
                    source
                )],
                body: String::new(),
            })?;
        let request = self
            .http
            .post(url)
            .header("X-Atlassian-Token", "no-check")
            .multipart(form);
        let response = self.apply_auth(request, auth_guess).send()?;
        let status = response.status().as_u16();
        if (200..300).contains(&status) {
            Ok(())
        } else {
            let text = response.text().unwrap_or_default();
            Err(error_from_response(status, &text))
        }
    }

    fn link_issues(&self, key: &IssueKey, link_type: &str, other: &IssueKey) -> Result<()> {
        let payload = json!({
            "type": {"name": link_type},
            "inwardIssue": {"key": key.as_str()},
            "outwardIssue": {"key": other.as_str()},
        });
        self.send(Method::POST, "issueLink", &[], Some(&payload))?;
        Ok(())
    }

    fn get_editable_fields(&self, key: &IssueKey) -> Result<Vec<FieldSpec>> {
        let (_, body) = self
            .send(Method::GET, &format!("issue/{}/editmeta", key), &[], None)
            .map_err(|e| contextualize_not_found(e, "issue", key.as_str()))?;
        let value: Value = serde_json::from_str(&body).unwrap_or(Value::Null);
        Ok(parse_field_metadata(value.get("fields")))
    }

    fn get_creatable_fields(&self, project: &str, kind: &str) -> Result<Vec<FieldSpec>> {
        let (_, body) = self.send(
            Method::GET,
            "issue/createmeta",
            &[
                ("projectKeys", project.to_string()),
                ("issuetypeNames", kind.to_string()),
                ("expand", "projects.issuetypes.fields".to_string()),
            ],
            None,
        )?;
        let value: Value = serde_json::from_str(&body).unwrap_or(Value::Null);
        let fields = value
            .get("projects")
            .and_then(|p| p.get(0))
            .and_then(|p| p.get("issuetypes"))
            .and_then(|t| t.get(0))
            .and_then(|t| t.get("fields"));
        Ok(parse_field_metadata(fields))
    }
}

fn initial_auth(configured: AuthType) -> Option<AuthMode> {
    match configured {
        AuthType::Basic => Some(AuthMode::Basic),
        AuthType::Bearer => Some(AuthMode::Bearer),
        AuthType::Auto => None,
    }
}

fn excerpt(body: &str) -> String {
    if body.len() <= BODY_EXCERPT_LEN {
        body.to_string()
    } else {
        let mut end = BODY_EXCERPT_LEN;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &body[..end])
    }
}

/// Maps a non-success HTTP response to the error taxonomy.
fn error_from_response(status: u16, body: &str) -> TrackerError {
    let value: Value = serde_json::from_str(body).unwrap_or(Value::Null);
    let messages: Vec<String> = value
        .get("errorMessages")
        .and_then(Value::as_array)
        .map(|msgs| {
            msgs.iter()
                .filter_map(Value::as_str)
                .map(String::from)
                .collect()
        })
        .unwrap_or_default();

    match status {
        400 => {
            let field_errors: BTreeMap<String, String> = value
                .get("errors")
                .and_then(Value::as_object)
                .map(|errors| {
                    errors
                        .iter()
                        .filter_map(|(field, msg)| {
                            Some((field.clone(), msg.as_str()?.to_string()))
                        })
                        .collect()
                })
                .unwrap_or_default();
            if field_errors.is_empty() {
                TrackerError::Api {
                    status,
                    messages,
                    body: excerpt(body),
                }
            } else {
                TrackerError::Validation { field_errors }
            }
        }
        401 | 403 => TrackerError::Auth {
            status: Some(status),
            message: messages
                .first()
                .cloned()
                .unwrap_or_else(|| "credentials rejected".to_string()),
        },
        404 => TrackerError::NotFound {
            kind: "resource".to_string(),
            id: String::new(),
        },
        _ => TrackerError::Api {
            status,
            messages,
            body: excerpt(body),
        },
    }
}

/// Fills in resource context on a bare 404.
fn contextualize_not_found(error: TrackerError, kind: &str, id: &str) -> TrackerError {
    match error {
        TrackerError::NotFound { .. } => TrackerError::NotFound {
            kind: kind.to_string(),
            id: id.to_string(),
        },
        other => other,
    }
}

fn parse_ticket(issue: &Value, key: IssueKey, url: Option<String>) -> Ticket {
    let fields = issue.get("fields").cloned().unwrap_or(Value::Null);
    Ticket {
        key,
        summary: fields
            .get("summary")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        status: fields
            .pointer("/status/name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        kind: fields
            .pointer("/issuetype/name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        assignee: fields
            .pointer("/assignee/displayName")
            .and_then(Value::as_str)
            .map(String::from),
        url,
    }
}

fn parse_ticket_details(issue: &Value, key: IssueKey, url: Option<String>) -> TicketDetails {
    let ticket = parse_ticket(issue, key, url);
    let fields = issue.get("fields").cloned().unwrap_or(Value::Null);
    let custom_fields = fields
        .as_object()
        .map(|map| {
            map.iter()
                .filter(|(id, value)| {
                    daf_config::fields::is_custom_field_id(id) && !value.is_null()
                })
                .map(|(id, value)| (id.clone(), value.clone()))
                .collect()
        })
        .unwrap_or_default();

    TicketDetails {
        ticket,
        description: fields.get("description").map(extract_text).filter(|t| !t.is_empty()),
        labels: fields
            .get("labels")
            .and_then(Value::as_array)
            .map(|labels| {
                labels
                    .iter()
                    .filter_map(Value::as_str)
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default(),
        components: fields
            .get("components")
            .and_then(Value::as_array)
            .map(|components| {
                components
                    .iter()
                    .filter_map(|c| c.get("name").and_then(Value::as_str))
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default(),
        parent: fields
            .pointer("/parent/key")
            .and_then(Value::as_str)
            .and_then(|k| k.parse().ok()),
        priority: fields
            .pointer("/priority/name")
            .and_then(Value::as_str)
            .map(String::from),
        custom_fields,
    }
}

/// Extracts plain text from a description value, which is a string on
/// API v2 and a structured document on v3.
fn extract_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Object(_) => {
            let mut out = Vec::new();
            collect_text(value, &mut out);
            out.join("\n")
        }
        _ => String::new(),
    }
}

fn collect_text(node: &Value, out: &mut Vec<String>) {
    if let Some(text) = node.get("text").and_then(Value::as_str) {
        out.push(text.to_string());
    }
    if let Some(content) = node.get("content").and_then(Value::as_array) {
        for child in content {
            collect_text(child, out);
        }
    }
}

fn parse_transitions(value: &Value) -> Vec<Transition> {
    value
        .get("transitions")
        .and_then(Value::as_array)
        .map(|transitions| {
            transitions
                .iter()
                .filter_map(|t| {
                    Some(Transition {
                        id: t.get("id")?.as_str()?.to_string(),
                        name: t.get("name")?.as_str()?.to_string(),
                        to_state: t
                            .pointer("/to/name")
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string(),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

fn parse_field_metadata(fields: Option<&Value>) -> Vec<FieldSpec> {
    let Some(fields) = fields.and_then(Value::as_object) else {
        return Vec::new();
    };
    fields
        .iter()
        .map(|(id, meta)| FieldSpec {
            id: id.clone(),
            display_name: meta
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or(id)
                .to_string(),
            field_type: meta
                .pointer("/schema/type")
                .and_then(Value::as_str)
                .unwrap_or("string")
                .to_string(),
            required: meta
                .get("required")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            allowed_values: meta
                .get("allowedValues")
                .and_then(Value::as_array)
                .map(|values| {
                    values
                        .iter()
                        .filter_map(|v| {
                            v.get("name")
                                .or_else(|| v.get("value"))
                                .and_then(Value::as_str)
                        })
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default(),
        })
        .collect()
}
