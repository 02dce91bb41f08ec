//! Parsing of structured multi-field generator replies.
//!
//! The generator is asked to answer in a small XML-like envelope, e.g.
//!
//! ```text
//! <response>
//!   <plan>...</plan>
//!   <test_cases><![CDATA[...]]></test_cases>
//! </response>
//! ```
//!
//! Real replies are messy: wrapped in markdown fences, missing the root,
//! mixing escaped and raw `<`/`&`, or cut off mid-field. Parsing is therefore
//! tag-directed rather than a strict XML parse, and never fails. When no
//! requested field can be found at all the reply is [`ProtocolReply::Degraded`]
//! and every field reads as empty.

use std::collections::BTreeMap;

use regex::Regex;

/// Outcome of parsing a structured reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolReply {
    /// At least one requested field was present. Absent ones map to "".
    Parsed(BTreeMap<String, String>),
    /// Nothing usable was found.
    Degraded { reason: String },
}

impl ProtocolReply {
    /// Value of a field, or "" when absent or degraded.
    pub fn field(&self, name: &str) -> &str {
        match self {
            ProtocolReply::Parsed(fields) => fields.get(name).map(String::as_str).unwrap_or(""),
            ProtocolReply::Degraded { .. } => "",
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, ProtocolReply::Degraded { .. })
    }
}

/// Removes a surrounding ```xml / ``` fence.
fn strip_fence(text: &str) -> &str {
    let mut text = text.trim();
    for opener in ["```xml", "```XML", "```"] {
        if let Some(rest) = text.strip_prefix(opener) {
            text = rest.trim_start();
            break;
        }
    }
    text.strip_suffix("```").unwrap_or(text).trim()
}

/// Splits out CDATA sections, unescaping entities only outside them.
fn decode(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;

    while let Some(start) = rest.find("<![CDATA[") {
        out.push_str(&unescape(&rest[..start]));
        let body = &rest[start + "<![CDATA[".len()..];
        match body.find("]]>") {
            Some(end) => {
                out.push_str(&body[..end]);
                rest = &body[end + "]]>".len()..];
            }
            None => {
                out.push_str(body);
                rest = "";
            }
        }
    }
    out.push_str(&unescape(rest));
    out.trim().to_string()
}

fn unescape(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

fn extract_field(text: &str, name: &str) -> Option<String> {
    let tag = regex::escape(name);

    if Regex::new(&format!(r"<{tag}\s*/>")).ok()?.is_match(text) {
        return Some(String::new());
    }

    let open = Regex::new(&format!(r"<{tag}(?:\s[^>]*)?>")).ok()?;
    let open_match = open.find(text)?;
    let body = &text[open_match.end()..];

    // The closing tag is searched outside CDATA so that code containing
    // "</plan>"-like text inside a CDATA block does not end the field early.
    let close = format!("</{name}>");
    let mut search_from = 0;
    let end = loop {
        let cdata = body[search_from..].find("<![CDATA[").map(|i| i + search_from);
        let closing = body[search_from..].find(&close).map(|i| i + search_from);
        match (cdata, closing) {
            (Some(c), Some(e)) if c < e => match body[c..].find("]]>") {
                Some(cdata_end) => search_from = c + cdata_end + "]]>".len(),
                None => break None,
            },
            (_, closing) => break closing,
        }
    };

    let raw = match end {
        Some(end) => &body[..end],
        // Truncated reply: keep everything up to the envelope's end.
        None => body
            .rfind("</response>")
            .map(|idx| &body[..idx])
            .unwrap_or(body),
    };
    Some(decode(raw))
}

/// Parses the named fields out of a generator reply.
pub fn parse_reply(text: &str, fields: &[&str]) -> ProtocolReply {
    let body = strip_fence(text);
    if body.is_empty() {
        return ProtocolReply::Degraded {
            reason: "empty reply".to_string(),
        };
    }

    let parsed: BTreeMap<String, String> = fields
        .iter()
        .filter_map(|name| extract_field(body, name).map(|value| (name.to_string(), value)))
        .collect();

    if parsed.is_empty() {
        return ProtocolReply::Degraded {
            reason: format!("none of the fields {fields:?} were found"),
        };
    }
    ProtocolReply::Parsed(parsed)
}

/// The plan reviewer's judgement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanVerdict {
    Sufficient,
    Insufficient { reasons: String },
}

impl PlanVerdict {
    pub fn is_sufficient(&self) -> bool {
        matches!(self, PlanVerdict::Sufficient)
    }
}

/// Reads a reviewer reply.
///
/// Prefers `<verdict>`/`<reasons>` fields and falls back to scanning for the
/// keywords. Negative keywords are checked first because "CORRECT" is a
/// substring of "INCORRECT". Anything unrecognisable counts as insufficient.
pub fn parse_verdict(text: &str) -> PlanVerdict {
    let reply = parse_reply(text, &["verdict", "reasons"]);
    let (verdict, reasons) = if reply.field("verdict").is_empty() {
        (text.trim().to_string(), text.trim().to_string())
    } else {
        (reply.field("verdict").to_string(), reply.field("reasons").to_string())
    };

    let upper = verdict.to_uppercase();
    let negative = Regex::new(r"\b(INCORRECT|NOT\s+CORRECT|INSUFFICIENT)\b")
        .map(|re| re.is_match(&upper))
        .unwrap_or_else(|_| upper.contains("INCORRECT"));
    if negative {
        return PlanVerdict::Insufficient { reasons };
    }

    let positive = Regex::new(r"\b(CORRECT|SUFFICIENT)\b")
        .map(|re| re.is_match(&upper))
        .unwrap_or_else(|_| upper.contains("CORRECT"));
    if positive {
        PlanVerdict::Sufficient
    } else {
        PlanVerdict::Insufficient { reasons }
    }
}
