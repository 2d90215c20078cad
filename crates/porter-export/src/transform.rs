//! Per-value transforms
//!
//! A transform is picked by name when a plan is built and stored on the mapping
//! as a concrete [`Transform`] value. Applying it is a pure function of the raw
//! value and the full source row.

use crate::blob::{AttachmentColumns, PathPolicy};
use crate::error::Result;
use crate::value::{Row, Value};
use regex::{Captures, Regex};

/// A named value transform
#[derive(Debug, Clone)]
pub enum Transform {
    /// Decode HTML entities left in titles by the source forum
    HtmlDecode(HtmlDecoder),
    /// Turn bare image extensions into MIME types
    MimeType,
    /// False for guest-like and banned groups, judged by the group title
    SignInPermission,
    /// True iff every bit of `mask` is set in `field`
    Permission { field: String, mask: i64 },
    /// Attachment file path computed from the row (see [`crate::blob`])
    AttachmentPath(AttachmentColumns),
    /// Replace the value with a constant
    Constant(Value),
}

impl Transform {
    pub fn html_decode() -> Result<Self> {
        Ok(Transform::HtmlDecode(HtmlDecoder::new()?))
    }

    /// Short name used in logs and plan files
    pub fn name(&self) -> &'static str {
        match self {
            Transform::HtmlDecode(_) => "html_decode",
            Transform::MimeType => "mime_type",
            Transform::SignInPermission => "sign_in_permission",
            Transform::Permission { .. } => "permission",
            Transform::AttachmentPath(_) => "attachment_path",
            Transform::Constant(_) => "constant",
        }
    }

    pub fn apply(&self, value: &Value, row: &Row) -> Value {
        match self {
            Transform::HtmlDecode(decoder) => match value {
                Value::Text(text) => Value::Text(decoder.decode(text)),
                other => other.clone(),
            },
            Transform::MimeType => match value {
                Value::Text(ext) if matches!(ext.as_str(), "jpg" | "gif" | "png") => {
                    Value::Text(format!("image/{}", ext))
                },
                other => other.clone(),
            },
            Transform::SignInPermission => {
                let title = value.as_text().unwrap_or_default().to_lowercase();
                Value::Bool(!(title.contains("unregistered") || title.contains("banned")))
            },
            Transform::Permission { field, mask } => {
                let bits = row.get(field).and_then(Value::as_i64);
                Value::Bool(has_mask(bits, *mask))
            },
            Transform::AttachmentPath(columns) => PathPolicy::select(row, columns)
                .map_or(Value::Null, |policy| Value::Text(policy.path())),
            Transform::Constant(constant) => constant.clone(),
        }
    }
}

/// `(field & mask) == mask`; a missing field never matches.
pub fn has_mask(field: Option<i64>, mask: i64) -> bool {
    field.is_some_and(|bits| bits & mask == mask)
}

/// HTML entity decoder
#[derive(Debug, Clone)]
pub struct HtmlDecoder {
    pattern: Regex,
}

impl HtmlDecoder {
    pub fn new() -> Result<Self> {
        let pattern = Regex::new(r"&(#[0-9]{1,7}|#[xX][0-9a-fA-F]{1,6}|[a-zA-Z]{2,8});")?;
        Ok(Self { pattern })
    }

    pub fn decode(&self, input: &str) -> String {
        if !input.contains('&') {
            return input.to_string();
        }
        self.pattern
            .replace_all(input, |caps: &Captures<'_>| {
                let whole = caps.get(0).map_or("", |m| m.as_str());
                let body = caps.get(1).map_or("", |m| m.as_str());
                decode_entity(body).map_or_else(|| whole.to_string(), String::from)
            })
            .into_owned()
    }
}

fn decode_entity(body: &str) -> Option<char> {
    if let Some(num) = body.strip_prefix('#') {
        let code = match num.strip_prefix(['x', 'X']) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => num.parse().ok()?,
        };
        return char::from_u32(code);
    }
    Some(match body {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => '\u{a0}',
        "copy" => '©',
        "reg" => '®',
        "rarr" => '→',
        "hellip" => '…',
        "mdash" => '—',
        "ndash" => '–',
        _ => return None,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_mask() {
        let rule = Transform::Permission { field: "genericpermissions".to_string(), mask: 1024 };
        let eval = |bits: i64| rule.apply(&Value::Null, &Row::new().with("genericpermissions", bits));

        assert_eq!(eval(1024), Value::Bool(true));
        assert_eq!(eval(1026), Value::Bool(true));
        assert_eq!(eval(2), Value::Bool(false));
        assert_eq!(rule.apply(&Value::Null, &Row::new()), Value::Bool(false));
    }

    #[test]
    fn test_multi_bit_mask_needs_every_bit() {
        assert!(has_mask(Some(0b111), 0b101));
        assert!(!has_mask(Some(0b100), 0b101));
        assert!(!has_mask(None, 1));
    }

    #[test]
    fn test_html_decode() {
        let rule = Transform::html_decode().unwrap();
        let out = rule.apply(&Value::from("Tom &amp; Jerry &#39;99 &#x41; &lt;b&gt; &bogus;"), &Row::new());
        assert_eq!(out, Value::from("Tom & Jerry '99 A <b> &bogus;"));
        assert_eq!(rule.apply(&Value::Integer(4), &Row::new()), Value::Integer(4));
    }

    #[test]
    fn test_mime_type() {
        let row = Row::new();
        assert_eq!(Transform::MimeType.apply(&Value::from("png"), &row), Value::from("image/png"));
        assert_eq!(Transform::MimeType.apply(&Value::from("zip"), &row), Value::from("zip"));
    }

    #[test]
    fn test_sign_in_permission() {
        let row = Row::new();
        let allowed = |title: &str| Transform::SignInPermission.apply(&Value::from(title), &row);
        assert_eq!(allowed("Registered Users"), Value::Bool(true));
        assert_eq!(allowed("Unregistered / Not Logged In"), Value::Bool(false));
        assert_eq!(allowed("Banned Users"), Value::Bool(false));
    }

    #[test]
    fn test_attachment_path_uses_whole_row() {
        let rule = Transform::AttachmentPath(AttachmentColumns::default());
        let row = Row::new()
            .with("userid", 312)
            .with("attachmentid", 77)
            .with("hash", Value::Null);
        assert_eq!(rule.apply(&Value::Null, &row), Value::from("attachments/3/1/2/77.attach"));

        let orphan = Row::new().with("attachmentid", 77);
        assert_eq!(rule.apply(&Value::Null, &orphan), Value::Null);
    }

    #[test]
    fn test_constant() {
        let rule = Transform::Constant(Value::from("BBCode"));
        assert_eq!(rule.apply(&Value::Integer(1), &Row::new()), Value::from("BBCode"));
        assert_eq!(rule.name(), "constant");
    }
}
