//! Mail options and the shallow merge used to combine them with defaults.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Key enabling plain-text generation from the HTML body.
pub const GENERATE_TEXT_FROM_HTML: &str = "generateTextFromHTML";

/// Key holding template variables.
pub const LOCALS: &str = "locals";

/// Key holding the rendered, CSS-inlined HTML body.
pub const HTML: &str = "html";

/// A mapping of mail message fields.
///
/// Recognised keys are `from`, `to`, `cc`, `bcc`, `replyTo`, `subject`,
/// `text`, `html`, `headers`, `locals` and `generateTextFromHTML`. Any other
/// key is carried along untouched so transports with extra knobs can read it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MailOptions(Map<String, Value>);

impl MailOptions {
    /// Create empty options.
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// The defaults installed when the caller supplies none:
    /// `{ generateTextFromHTML: true }`.
    pub fn base_defaults() -> Self {
        Self::new().set(GENERATE_TEXT_FROM_HTML, true)
    }

    /// Set an arbitrary field.
    pub fn set(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Set the sender.
    pub fn from(self, from: impl Into<String>) -> Self {
        self.set("from", from.into())
    }

    /// Set the recipients (a single address or a comma separated list).
    pub fn to(self, to: impl Into<String>) -> Self {
        self.set("to", to.into())
    }

    /// Set the CC recipients.
    pub fn cc(self, cc: impl Into<String>) -> Self {
        self.set("cc", cc.into())
    }

    /// Set the BCC recipients.
    pub fn bcc(self, bcc: impl Into<String>) -> Self {
        self.set("bcc", bcc.into())
    }

    /// Set the reply-to address.
    pub fn reply_to(self, reply_to: impl Into<String>) -> Self {
        self.set("replyTo", reply_to.into())
    }

    /// Set the subject.
    pub fn subject(self, subject: impl Into<String>) -> Self {
        self.set("subject", subject.into())
    }

    /// Set the plain text body.
    pub fn text(self, text: impl Into<String>) -> Self {
        self.set("text", text.into())
    }

    /// Set the template variables.
    pub fn locals(self, locals: impl Into<Value>) -> Self {
        self.set(LOCALS, locals)
    }

    /// Add a custom header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let headers = self
            .0
            .entry("headers")
            .or_insert_with(|| Value::Object(Map::new()));
        if !headers.is_object() {
            *headers = Value::Object(Map::new());
        }
        if let Value::Object(map) = headers {
            map.insert(name.into(), Value::String(value.into()));
        }
        self
    }

    /// Get a field.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Get a string field.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    /// Insert a field in place, returning the previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    /// Remove a field.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    /// Template variables, `Value::Null` when unset.
    pub fn locals_value(&self) -> &Value {
        self.0.get(LOCALS).unwrap_or(&Value::Null)
    }

    /// The HTML body, if set.
    pub fn html_body(&self) -> Option<&str> {
        self.get_str(HTML)
    }

    /// Replace the HTML body.
    pub fn set_html(&mut self, html: impl Into<String>) {
        self.0.insert(HTML.to_string(), Value::String(html.into()));
    }

    /// The plain text body, if set.
    pub fn text_body(&self) -> Option<&str> {
        self.get_str("text")
    }

    /// Whether a plain-text part should be derived from the HTML body.
    pub fn generate_text_from_html(&self) -> bool {
        self.0.get(GENERATE_TEXT_FROM_HTML).is_some_and(is_truthy)
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no field is set.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over the fields.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Borrow the underlying map.
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Copy every field of `source` onto `self`, overwriting existing keys.
    ///
    /// A missing `source` leaves `self` untouched.
    pub fn merge(&mut self, source: Option<&MailOptions>) -> &mut Self {
        if let Some(source) = source {
            for (key, value) in &source.0 {
                self.0.insert(key.clone(), value.clone());
            }
        }
        self
    }
}

impl From<Map<String, Value>> for MailOptions {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl From<MailOptions> for Value {
    fn from(options: MailOptions) -> Self {
        Value::Object(options.0)
    }
}

impl TryFrom<Value> for MailOptions {
    type Error = crate::MailError;

    fn try_from(value: Value) -> crate::Result<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            Value::Null => Ok(Self::new()),
            other => Err(crate::MailError::Config(format!(
                "mail options must be an object, got {other}"
            ))),
        }
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for MailOptions {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Copy every field of `source` onto `dest` and return `dest`.
///
/// When either side is absent `dest` is returned unchanged. Later values
/// win: a key present in both ends up with `source`'s value.
pub fn merge(dest: Option<MailOptions>, source: Option<&MailOptions>) -> Option<MailOptions> {
    dest.map(|mut dest| {
        dest.merge(source);
        dest
    })
}

/// JavaScript-style truthiness for option flags.
pub(crate) fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
