//! Conversion of [`MailOptions`] into a wire-ready lettre message.

use lettre::message::header::{HeaderName, HeaderValue};
use lettre::message::{Message, MultiPart, SinglePart};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::{Address, MailError, MailOptions, Result};

/// Line width used when deriving a plain-text part from HTML.
const TEXT_WIDTH: usize = 80;

/// Envelope addresses of a sent message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Envelope sender.
    pub from: Option<String>,
    /// Envelope recipients.
    pub to: Vec<String>,
}

/// Result of handing a message to a transport.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentMail {
    /// Message-ID header of the sent message.
    pub message_id: Option<String>,
    /// Envelope used for delivery.
    pub envelope: Envelope,
    /// Raw RFC 5322 message, for transports that do not deliver.
    pub message: Option<Vec<u8>>,
    /// Final server response, when the transport reports one.
    pub response: Option<String>,
}

/// A message built from mail options, plus what the transport reports back.
pub struct ComposedMessage {
    /// The lettre message.
    pub message: Message,
    /// The Message-ID assigned to it.
    pub message_id: String,
}

impl ComposedMessage {
    /// Envelope addresses of the composed message.
    pub fn envelope(&self) -> Envelope {
        let envelope = self.message.envelope();
        Envelope {
            from: envelope.from().map(ToString::to_string),
            to: envelope.to().iter().map(ToString::to_string).collect(),
        }
    }
}

/// Build a lettre message from mail options.
///
/// When `generateTextFromHTML` is truthy and no `text` field is present the
/// plain-text alternative is derived from the HTML body.
pub fn compose(options: &MailOptions) -> Result<ComposedMessage> {
    let from = options
        .get("from")
        .map(Address::parse_single)
        .transpose()?
        .flatten()
        .ok_or(MailError::MissingField("from"))?;

    let mut builder = Message::builder()
        .from(from.to_mailbox()?)
        .subject(options.get_str("subject").unwrap_or_default());

    let mut recipients = 0;
    for addr in field_addresses(options, "to")? {
        builder = builder.to(addr.to_mailbox()?);
        recipients += 1;
    }
    for addr in field_addresses(options, "cc")? {
        builder = builder.cc(addr.to_mailbox()?);
        recipients += 1;
    }
    for addr in field_addresses(options, "bcc")? {
        builder = builder.bcc(addr.to_mailbox()?);
        recipients += 1;
    }
    if recipients == 0 {
        return Err(MailError::MissingField("to/cc/bcc"));
    }

    for addr in field_addresses(options, "replyTo")? {
        builder = builder.reply_to(addr.to_mailbox()?);
    }

    let message_id = options
        .get_str("messageId")
        .map(str::to_string)
        .unwrap_or_else(|| format!("<{}@posthorn>", Uuid::new_v4()));
    builder = builder.message_id(Some(message_id.clone()));

    if let Some(Value::Object(headers)) = options.get("headers") {
        for (name, value) in headers {
            let name = HeaderName::new_from_ascii(name.clone())
                .map_err(|e| MailError::Config(format!("invalid header name {name}: {e}")))?;
            let value = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            builder = builder.raw_header(HeaderValue::new(name, value));
        }
    }

    let html = options.html_body().map(str::to_string);
    let text = match options.text_body() {
        Some(text) => Some(text.to_string()),
        None if options.generate_text_from_html() => html.as_deref().map(html_to_text),
        None => None,
    };

    let message = match (text, html) {
        (Some(text), Some(html)) => {
            builder.multipart(MultiPart::alternative_plain_html(text, html))?
        }
        (None, Some(html)) => builder.singlepart(SinglePart::html(html))?,
        (Some(text), None) => builder.singlepart(SinglePart::plain(text))?,
        (None, None) => return Err(MailError::MissingField("text/html body")),
    };

    Ok(ComposedMessage {
        message,
        message_id,
    })
}

/// Render HTML as plain text.
pub fn html_to_text(html: &str) -> String {
    html2text::from_read(html.as_bytes(), TEXT_WIDTH)
        .trim_end()
        .to_string()
}

fn field_addresses(options: &MailOptions, key: &str) -> Result<Vec<Address>> {
    options
        .get(key)
        .map(Address::parse_list)
        .transpose()
        .map(Option::unwrap_or_default)
}
