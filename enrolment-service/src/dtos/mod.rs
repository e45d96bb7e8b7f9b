//! Inbound callback payload.
//!
//! iPaymu posts JSON, form bodies and plain query strings depending on the
//! notification channel, so all three are folded into one struct here.

use serde_json::{Map, Value};

use crate::error::CallbackError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackRequest {
    pub merchant_order_id: String,
    /// Session reference from checkout; empty when the caller omitted it.
    pub sid: String,
    pub trx_id: String,
}

/// Decoded sources of one request.
#[derive(Debug, Default)]
struct Params {
    json: Option<Map<String, Value>>,
    form: Vec<(String, String)>,
    query: Vec<(String, String)>,
}

impl Params {
    fn parse(query: Option<&str>, body: &[u8]) -> Self {
        let query = query
            .and_then(|q| serde_urlencoded::from_str(q).ok())
            .unwrap_or_default();

        let mut params = Params {
            query,
            ..Default::default()
        };

        if body.iter().all(u8::is_ascii_whitespace) {
            return params;
        }

        match serde_json::from_slice::<Value>(body) {
            Ok(Value::Object(map)) => params.json = Some(map),
            Ok(_) => {}
            Err(_) => {
                params.form = serde_urlencoded::from_bytes(body).unwrap_or_default();
            }
        }

        params
    }

    /// String or number field from the JSON body. Null counts as absent.
    fn json_field(&self, key: &str) -> Option<String> {
        match self.json.as_ref()?.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Form parameter first, then query string.
    fn param(&self, key: &str) -> Option<String> {
        self.form
            .iter()
            .chain(self.query.iter())
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    }
}

impl CallbackRequest {
    pub fn from_parts(query: Option<&str>, body: &[u8]) -> Result<Self, CallbackError> {
        let params = Params::parse(query, body);

        let merchant_order_id = params
            .param("merchantOrderId")
            .filter(|v| !v.is_empty())
            .or_else(|| params.json_field("merchantOrderId"))
            .ok_or(CallbackError::MissingParameter("merchantOrderId"))?;

        let trx_id = params
            .json_field("trx_id")
            .or_else(|| params.param("trx_id"))
            .filter(|v| !v.is_empty())
            .ok_or(CallbackError::MissingParameter("trx_id"))?;

        let sid = match params.json_field("sid").or_else(|| params.param("sid")) {
            Some(sid) => sid,
            None => {
                tracing::warn!(
                    merchant_order_id = %merchant_order_id,
                    "Callback without sid; matching payment record on empty reference"
                );
                String::new()
            }
        };

        Ok(CallbackRequest {
            merchant_order_id,
            sid,
            trx_id,
        })
    }
}
