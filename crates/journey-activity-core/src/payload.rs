//! Payload normalization for execute calls.
//!
//! The orchestrator delivers the per-record arguments in one of two shapes:
//!
//! - **Direct arguments**: a JSON body with a non-empty `inArguments` array.
//! - **Signed token**: a JWT (in `keyValue`, `jwt`, or as the whole body)
//!   whose verified claims carry the arguments at one of several locations.
//!
//! Both reduce to a [`NormalizedPayload`]. Normalization never fails; any
//! field that cannot be found falls back to a default and is flagged so the
//! fallback is visible in logs.
//!
//! Field lookups are expressed as [`ExtractionRule`]s: pure functions from the
//! raw payload to an optional value, evaluated in priority order with the first
//! non-empty match winning.

use chrono::Utc;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::config::InboundFieldNames;
use crate::credentials::{CredentialVerifier, Verification};

/// Record key used when no source carries one.
pub const UNKNOWN_RECORD_KEY: &str = "UNKNOWN_CONTACT";

/// Message used when no source carries one.
pub const DEFAULT_MESSAGE: &str = "Contact processed by custom journey activity";

const CORRELATION_FALLBACK_PREFIX: &str = "unknown-";

/// Location of the argument list inside a verified token, below `request`.
const NESTED_ARGUMENTS_PATH: &str = "request.currentActivity.arguments.execute.inArguments";
const TOP_LEVEL_ARGUMENTS_PATH: &str = "inArguments";

// ============================================================================
// Execution request
// ============================================================================

/// One inbound lifecycle call, reduced to a JSON body.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionRequest {
    body: Value,
}

impl ExecutionRequest {
    /// Build a request from raw HTTP body bytes.
    ///
    /// `application/jwt` and `text/plain` bodies become `{"jwt": "<trimmed>"}`.
    /// Form bodies become a flat object of strings. Anything else is parsed as
    /// JSON; an empty or unparsable body becomes `{}`, unless it looks like a
    /// bare compact JWT, which is wrapped the same way as `application/jwt`.
    pub fn from_raw(content_type: Option<&str>, body: &[u8]) -> Self {
        let media_type = content_type
            .and_then(|ct| ct.split(';').next())
            .map(|ct| ct.trim().to_ascii_lowercase());

        let value = match media_type.as_deref() {
            Some("application/jwt") | Some("text/plain") => wrap_raw_token(body),
            Some("application/x-www-form-urlencoded") => {
                let fields: Map<String, Value> = url::form_urlencoded::parse(body)
                    .map(|(k, v)| (k.into_owned(), Value::String(v.into_owned())))
                    .collect();
                Value::Object(fields)
            }
            _ => parse_json_body(body),
        };

        Self { body: value }
    }

    /// Build a request from an already-decoded JSON body.
    pub fn from_json(body: Value) -> Self {
        Self { body }
    }

    pub fn body(&self) -> &Value {
        &self.body
    }

    /// The signed token carried by this request: `keyValue`, then `jwt`, then
    /// the body itself when it is a bare string.
    pub fn token(&self) -> Option<&str> {
        if let Some(body) = self.body.as_str() {
            return Some(body).filter(|t| !t.trim().is_empty());
        }

        ["keyValue", "jwt"]
            .iter()
            .filter_map(|key| self.body.get(*key).and_then(Value::as_str))
            .find(|token| !token.trim().is_empty())
    }

    /// A top-level string field, for lifecycle logging.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.body.get(name).and_then(Value::as_str)
    }
}

fn wrap_raw_token(body: &[u8]) -> Value {
    let text = String::from_utf8_lossy(body);
    let text = text.trim();
    if text.is_empty() {
        return Value::Object(Map::new());
    }

    let mut wrapped = Map::new();
    wrapped.insert("jwt".to_string(), Value::String(text.to_string()));
    Value::Object(wrapped)
}

fn parse_json_body(body: &[u8]) -> Value {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Value::Object(Map::new());
    }

    match serde_json::from_slice::<Value>(body) {
        Ok(value) => value,
        Err(e) => {
            if looks_like_compact_jwt(body) {
                debug!("Unparsable JSON body looks like a bare token; wrapping it");
                return wrap_raw_token(body);
            }
            warn!(error = %e, "Request body is not valid JSON; treating it as empty");
            Value::Object(Map::new())
        }
    }
}

fn looks_like_compact_jwt(body: &[u8]) -> bool {
    let text = String::from_utf8_lossy(body);
    let text = text.trim();
    let segments: Vec<&str> = text.split('.').collect();

    segments.len() == 3
        && segments.iter().all(|s| {
            !s.is_empty()
                && s
                    .bytes()
                    .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_' || b == b'=')
        })
}

// ============================================================================
// Extraction rules
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
enum PathSegment {
    Key(String),
    Index(usize),
}

/// A named lookup of one dotted path, where numeric segments index arrays.
///
/// String values must be non-empty; integers are rendered as text. Anything
/// else counts as absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionRule {
    name: String,
    segments: Vec<PathSegment>,
}

impl ExtractionRule {
    pub fn new(path: &str) -> Self {
        let segments = path
            .split('.')
            .filter(|s| !s.is_empty())
            .map(|s| match s.parse::<usize>() {
                Ok(index) => PathSegment::Index(index),
                Err(_) => PathSegment::Key(s.to_string()),
            })
            .collect();

        Self {
            name: path.to_string(),
            segments,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn apply(&self, payload: &Value) -> Option<String> {
        resolve(payload, &self.segments).and_then(scalar_text)
    }
}

/// Evaluate `rules` in order; the first non-empty match wins.
pub fn first_match<'r>(rules: &'r [ExtractionRule], payload: &Value) -> Option<(&'r str, String)> {
    rules
        .iter()
        .find_map(|rule| rule.apply(payload).map(|value| (rule.name(), value)))
}

fn resolve<'v>(value: &'v Value, segments: &[PathSegment]) -> Option<&'v Value> {
    segments
        .iter()
        .try_fold(value, |current, segment| match segment {
            PathSegment::Key(key) => current.get(key.as_str()),
            PathSegment::Index(index) => current.get(*index),
        })
}

fn resolve_path<'v>(value: &'v Value, path: &str) -> Option<&'v Value> {
    resolve(value, &ExtractionRule::new(path).segments)
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) if n.is_i64() || n.is_u64() => Some(n.to_string()),
        _ => None,
    }
}

fn first_alias(element: &Value, aliases: &[String]) -> Option<String> {
    aliases
        .iter()
        .find_map(|alias| element.get(alias.as_str()).and_then(scalar_text))
}

// ============================================================================
// Normalized payload
// ============================================================================

/// Which inbound shape produced the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadSource {
    DirectArguments,
    SignedToken,
    Defaults,
}

impl PayloadSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DirectArguments => "direct_arguments",
            Self::SignedToken => "signed_token",
            Self::Defaults => "defaults",
        }
    }
}

/// Fields that fell back to their default value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DefaultedFields {
    pub record_key: bool,
    pub message: bool,
    pub correlation_id: bool,
}

impl DefaultedFields {
    pub fn any(&self) -> bool {
        self.record_key || self.message || self.correlation_id
    }
}

/// Canonical per-record data extracted from an execute call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedPayload {
    /// Never empty; [`UNKNOWN_RECORD_KEY`] when absent from every source.
    pub record_key: String,
    pub message: String,
    pub correlation_id: String,
    pub source: PayloadSource,
    pub defaulted: DefaultedFields,
}

impl NormalizedPayload {
    fn build(
        source: PayloadSource,
        record_key: Option<String>,
        message: Option<String>,
        correlation_id: Option<String>,
    ) -> Self {
        let defaulted = DefaultedFields {
            record_key: record_key.is_none(),
            message: message.is_none(),
            correlation_id: correlation_id.is_none(),
        };

        Self {
            record_key: record_key.unwrap_or_else(|| UNKNOWN_RECORD_KEY.to_string()),
            message: message.unwrap_or_else(|| DEFAULT_MESSAGE.to_string()),
            correlation_id: correlation_id.unwrap_or_else(fallback_correlation_id),
            source,
            defaulted,
        }
    }

    /// Payload with every field defaulted.
    pub fn defaults() -> Self {
        Self::build(PayloadSource::Defaults, None, None, None)
    }
}

fn fallback_correlation_id() -> String {
    format!(
        "{}{}",
        CORRELATION_FALLBACK_PREFIX,
        Utc::now().timestamp_millis()
    )
}

// ============================================================================
// Normalizer
// ============================================================================

/// Reduces execute calls to a [`NormalizedPayload`].
#[derive(Debug, Clone)]
pub struct PayloadNormalizer {
    fields: InboundFieldNames,
    verifier: CredentialVerifier,
    token_record_key_rules: Vec<ExtractionRule>,
}

impl PayloadNormalizer {
    pub fn new(fields: InboundFieldNames, verifier: CredentialVerifier) -> Self {
        let token_record_key_rules = token_record_key_rules(&fields);
        Self {
            fields,
            verifier,
            token_record_key_rules,
        }
    }

    /// Record key lookups applied to verified token claims, in priority order.
    pub fn token_record_key_rules(&self) -> &[ExtractionRule] {
        &self.token_record_key_rules
    }

    pub fn normalize(&self, request: &ExecutionRequest) -> NormalizedPayload {
        let payload = self
            .from_direct_arguments(request.body())
            .or_else(|| self.from_signed_token(request))
            .unwrap_or_else(NormalizedPayload::defaults);

        if payload.defaulted.any() {
            info!(
                source = payload.source.as_str(),
                record_key_defaulted = payload.defaulted.record_key,
                message_defaulted = payload.defaulted.message,
                correlation_id_defaulted = payload.defaulted.correlation_id,
                "Normalization fell back to default values"
            );
        }

        payload
    }

    fn from_direct_arguments(&self, body: &Value) -> Option<NormalizedPayload> {
        let first = body
            .get(TOP_LEVEL_ARGUMENTS_PATH)
            .and_then(Value::as_array)
            .and_then(|args| args.first())?;

        debug!("Normalizing direct arguments payload");

        Some(NormalizedPayload::build(
            PayloadSource::DirectArguments,
            first_alias(first, &self.fields.record_key),
            first_alias(first, &self.fields.message),
            first_alias(first, &self.fields.correlation_id),
        ))
    }

    fn from_signed_token(&self, request: &ExecutionRequest) -> Option<NormalizedPayload> {
        let token = request.token()?;

        let claims = match self.verifier.verify(Some(token)) {
            Verification::Verified { claims } => claims,
            Verification::Skipped { reason } => {
                warn!(reason = %reason, "Token supplied but not verified; ignoring its claims");
                return None;
            }
            Verification::Rejected { reason } => {
                warn!(reason = %reason, "Token failed verification; ignoring its claims");
                return None;
            }
        };

        debug!("Normalizing signed token payload");

        let record_key = first_match(&self.token_record_key_rules, &claims).map(|(rule, key)| {
            debug!(rule = %rule, "Record key found in token claims");
            key
        });

        let arguments: &[Value] = [NESTED_ARGUMENTS_PATH, TOP_LEVEL_ARGUMENTS_PATH]
            .iter()
            .find_map(|path| resolve_path(&claims, path).and_then(Value::as_array))
            .map(Vec::as_slice)
            .unwrap_or(&[]);

        let message = arguments
            .iter()
            .find_map(|arg| first_alias(arg, &self.fields.message));
        let correlation_id = arguments
            .iter()
            .find_map(|arg| first_alias(arg, &self.fields.correlation_id));

        Some(NormalizedPayload::build(
            PayloadSource::SignedToken,
            record_key,
            message,
            correlation_id,
        ))
    }
}

/// Location-major: every record key alias is tried at one location before
/// moving to the next.
fn token_record_key_rules(fields: &InboundFieldNames) -> Vec<ExtractionRule> {
    let locations = [
        "request".to_string(),
        format!("{}.0", NESTED_ARGUMENTS_PATH),
        format!("{}.0", TOP_LEVEL_ARGUMENTS_PATH),
        String::new(),
    ];

    locations
        .iter()
        .flat_map(|location| {
            fields.record_key.iter().map(move |alias| {
                if location.is_empty() {
                    ExtractionRule::new(alias)
                } else {
                    ExtractionRule::new(&format!("{}.{}", location, alias))
                }
            })
        })
        .collect()
}

#[cfg(test)]
#[path = "payload_tests.rs"]
mod tests;
