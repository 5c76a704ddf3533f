//! TNC2 frame parsing and building for the APRS-IS text stream.
//!
//! Inbound lines look like
//! `DF1JSL-8>APDR16,TCPIP*,qAC,T2SERVER::OSKAR    :wx tomorrow{AB1`.
//! Only the message format (info field starting with `:`) is of interest
//! to the daemon; everything else is tagged [`FrameFormat::Other`] and
//! dropped at ingress.

use regex::Regex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameFormat {
    Message,
    Other,
}

#[derive(Debug, Clone)]
pub struct InboundFrame {
    /// Sender callsign, uppercased, SSID included.
    pub source: String,
    /// Message addressee (only set for the message format).
    pub addressee: String,
    /// Message text with any id trailer stripped.
    pub text: String,
    /// Standard message id, if one was present.
    pub msg_no: Option<String>,
    /// Ack id carried in a reply-ack trailer (`{MM}AA`).
    pub ack_no: Option<String>,
    pub format: FrameFormat,
}

impl InboundFrame {
    /// True when the message id arrived in the reply-ack form; responses
    /// to this sender then carry the reply-ack trailer themselves.
    pub fn uses_reply_ack(&self) -> bool {
        self.ack_no.is_some()
    }

    /// For payloads `ack<id>` / `rej<id>`: the referenced message id.
    pub fn ack_or_rej_ref(&self) -> Option<&str> {
        let re = Regex::new(r"^(?:ack|rej)([A-Za-z0-9]{1,5})$").unwrap();
        re.captures(self.text.trim())
            .map(|c| c.get(1).unwrap().as_str())
    }
}

/// Parse one line from the APRS-IS stream. Server comments (leading `#`)
/// and unparseable lines yield `None`.
pub fn parse_tnc2(line: &str) -> Option<InboundFrame> {
    let line = line.trim_end();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }

    let (source, rest) = line.split_once('>')?;
    let (_, info) = rest.split_once(':')?;

    let message_fields = if info.starts_with(':') && info.as_bytes().get(10) == Some(&b':') {
        // A 9-byte addressee field may still contain garbage that is not
        // a character boundary; such frames are not messages for us.
        info.get(1..10).zip(info.get(11..))
    } else {
        None
    };
    let Some((addressee, text)) = message_fields else {
        return Some(InboundFrame {
            source: source.to_uppercase(),
            addressee: String::new(),
            text: String::new(),
            msg_no: None,
            ack_no: None,
            format: FrameFormat::Other,
        });
    };

    let addressee = addressee.trim().to_uppercase();
    let (text, msg_no, ack_no) = split_msg_trailer(text);

    Some(InboundFrame {
        source: source.to_uppercase(),
        addressee,
        text,
        msg_no,
        ack_no,
        format: FrameFormat::Message,
    })
}

/// Split the standard `{id` trailer or the reply-ack `{id}ack` trailer
/// off the message text.
fn split_msg_trailer(text: &str) -> (String, Option<String>, Option<String>) {
    let reply_ack = Regex::new(r"^(.*)\{([A-Za-z0-9]{1,5})\}([A-Za-z0-9]{1,5})$").unwrap();
    if let Some(caps) = reply_ack.captures(text) {
        return (
            caps[1].to_string(),
            Some(caps[2].to_string()),
            Some(caps[3].to_string()),
        );
    }
    let legacy = Regex::new(r"^(.*)\{([A-Za-z0-9]{1,5})$").unwrap();
    if let Some(caps) = legacy.captures(text) {
        return (caps[1].to_string(), Some(caps[2].to_string()), None);
    }
    (text.to_string(), None, None)
}

/// Some clients terminate the message id with a closing bracket
/// (`text{12345}`), which the standard trailer grammar does not cover.
/// Recover the id from such frames and return the cleaned text.
pub fn repair_defective_trailer(text: &str) -> (String, Option<String>) {
    let re = Regex::new(r"^(.*)\{([A-Za-z0-9]{1,5})\}\s*$").unwrap();
    if let Some(caps) = re.captures(text) {
        (caps[1].to_string(), Some(caps[2].to_string()))
    } else {
        (text.to_string(), None)
    }
}

/// Build a full TNC2 message frame with the 9-character padded addressee.
pub fn format_message_frame(alias: &str, tocall: &str, addressee: &str, payload: &str) -> String {
    format!("{}>{}::{:<9}:{}", alias, tocall, addressee, payload)
}

/// Build a non-message frame (beacon, status).
pub fn format_plain_frame(alias: &str, tocall: &str, payload: &str) -> String {
    format!("{}>{}:{}", alias, tocall, payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_message_with_legacy_id() {
        let frame = parse_tnc2("DF1JSL-8>APDR16,TCPIP*,qAC,T2SRV::OSKAR    :wx tomorrow{AB1")
            .unwrap();
        assert_eq!(frame.format, FrameFormat::Message);
        assert_eq!(frame.source, "DF1JSL-8");
        assert_eq!(frame.addressee, "OSKAR");
        assert_eq!(frame.text, "wx tomorrow");
        assert_eq!(frame.msg_no.as_deref(), Some("AB1"));
        assert!(frame.ack_no.is_none());
    }

    #[test]
    fn parses_reply_ack_trailer() {
        let frame =
            parse_tnc2("DF1JSL-8>APOSW,TCPIP*::OSKAR    :metar{MM}AA").unwrap();
        assert_eq!(frame.text, "metar");
        assert_eq!(frame.msg_no.as_deref(), Some("MM"));
        assert_eq!(frame.ack_no.as_deref(), Some("AA"));
        assert!(frame.uses_reply_ack());
    }

    #[test]
    fn message_without_id() {
        let frame = parse_tnc2("DF1JSL-8>APRS::OSKAR    :94043").unwrap();
        assert_eq!(frame.text, "94043");
        assert!(frame.msg_no.is_none());
    }

    #[test]
    fn non_message_frames_are_tagged_other() {
        let frame = parse_tnc2("DF1JSL-8>APRS:=5150.33N/00819.60E-hello").unwrap();
        assert_eq!(frame.format, FrameFormat::Other);
    }

    #[test]
    fn server_comments_are_skipped() {
        assert!(parse_tnc2("# aprsc 2.1.10-gd72a17c").is_none());
        assert!(parse_tnc2("").is_none());
    }

    #[test]
    fn recognizes_inbound_ack() {
        let frame = parse_tnc2("DF1JSL-8>APRS::OSKAR    :ack00123").unwrap();
        assert_eq!(frame.ack_or_rej_ref(), Some("00123"));
    }

    #[test]
    fn repairs_bracket_terminated_id() {
        let (text, msg_no) = repair_defective_trailer("wx tomorrow{12345}");
        assert_eq!(text, "wx tomorrow");
        assert_eq!(msg_no.as_deref(), Some("12345"));

        let (text, msg_no) = repair_defective_trailer("wx tomorrow");
        assert_eq!(text, "wx tomorrow");
        assert!(msg_no.is_none());
    }

    #[test]
    fn formats_message_frame_with_padding() {
        let frame = format_message_frame("OSKAR", "APRS", "DF1JSL-8", "ack17");
        assert_eq!(frame, "OSKAR>APRS::DF1JSL-8 :ack17");
    }
}
