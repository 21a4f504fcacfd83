//! Request parameter flattening.
//!
//! Routes accept the same parameters from the query string, a form body or a
//! JSON body, so handlers look values up in one flat string map.

use std::collections::HashMap;
use std::convert::Infallible;

use axum::extract::{FromRequest, Query, Request};
use axum::http::{Method, header};
use axum::{Form, Json};
use serde_json::Value;

/// Flattened request parameters. Body values override query values.
#[derive(Debug, Clone, Default)]
pub struct Params(pub HashMap<String, String>);

impl Params {
    /// First non-empty trimmed value among `keys`.
    pub fn first(&self, keys: &[&str]) -> Option<&str> {
        keys.iter()
            .filter_map(|k| self.0.get(*k))
            .map(|v| v.trim())
            .find(|v| !v.is_empty())
    }

    pub fn first_or<'a>(&'a self, keys: &[&str], fallback: &'a str) -> &'a str {
        self.first(keys).unwrap_or(fallback)
    }

    /// Integer under `key`, or `fallback` when missing or unparsable.
    pub fn int(&self, key: &str, fallback: i64) -> i64 {
        self.first(&[key])
            .and_then(|v| v.parse().ok())
            .unwrap_or(fallback)
    }
}

impl<S: Send + Sync> FromRequest<S> for Params {
    type Rejection = Infallible;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let mut map: HashMap<String, String> = Query::try_from_uri(req.uri())
            .map(|Query(q)| q)
            .unwrap_or_default();

        if req.method() == Method::POST {
            let is_json = req
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .is_some_and(|ct| ct.to_ascii_lowercase().contains("application/json"));

            if is_json {
                if let Ok(Json(Value::Object(obj))) = Json::<Value>::from_request(req, state).await {
                    map.extend(obj.iter().map(|(k, v)| (k.clone(), format_json_value(v))));
                }
            } else if let Ok(Form(form)) =
                Form::<HashMap<String, String>>::from_request(req, state).await
            {
                map.extend(form);
            }
        }

        Ok(Self(map))
    }
}

/// Render a JSON value as a plain parameter string.
#[allow(clippy::cast_possible_truncation, clippy::float_cmp)]
pub fn format_json_value(v: &Value) -> String {
    match v {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => {
            if n.is_i64() || n.is_u64() {
                return n.to_string();
            }
            match n.as_f64() {
                Some(f) if f.is_finite() && f.fract() == 0.0 && f.abs() < 9.0e15 => {
                    (f as i64).to_string()
                }
                _ => n.to_string(),
            }
        }
        Value::Array(items) => items
            .iter()
            .map(format_json_value)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(","),
        Value::Object(_) => v.to_string(),
    }
}
