//! Acknowledgement building blocks: ack/rej payloads, the reply-ack
//! trailer and the persistent outbound message-id counter.
//!
//! The daemon never retransmits unacked outbound traffic; the remote
//! sender re-sends the original on timeout. Rejections are reserved for
//! messages that are acknowledgeable but semantically refused.

use std::path::{Path, PathBuf};

use tracing::debug;

/// Payload acknowledging an inbound message id.
pub fn ack_payload(msg_no: &str) -> String {
    format!("ack{}", msg_no)
}

/// Payload refusing an inbound message id.
pub fn rej_payload(msg_no: &str) -> String {
    format!("rej{}", msg_no)
}

/// Attach the outbound id trailer to a fragment payload. When the
/// sender used the reply-ack form, the trailer confirms their id
/// in-band; otherwise the legacy bare id is used.
pub fn with_msg_id(payload: &str, out_id: &str, reply_ack_origin: Option<&str>) -> String {
    match reply_ack_origin {
        Some(orig) => format!("{}{{{}}}ack{}", payload, out_id, orig),
        None => format!("{}{{{}", payload, out_id),
    }
}

/// Allocator for outgoing message ids: zero-padded 5-digit decimals,
/// wrapping at 99999 and persisted across restarts.
pub struct MessageIdAllocator {
    counter: u32,
    path: PathBuf,
}

impl MessageIdAllocator {
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let counter = std::fs::read_to_string(&path)
            .ok()
            .and_then(|content| content.trim().parse::<u32>().ok())
            .filter(|n| (1..=99999).contains(n))
            .unwrap_or(1);
        debug!("Outbound message counter starts at {}", counter);
        Self { counter, path }
    }

    pub fn next(&mut self) -> String {
        let id = format!("{:05}", self.counter);
        self.counter += 1;
        if self.counter > 99999 {
            self.counter = 1;
        }
        if let Err(e) = std::fs::write(&self.path, self.counter.to_string()) {
            debug!("Cannot persist message counter: {}", e);
        }
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn ack_and_rej_payloads() {
        assert_eq!(ack_payload("AB1"), "ackAB1");
        assert_eq!(rej_payload("17"), "rej17");
    }

    #[test]
    fn legacy_and_reply_ack_trailers() {
        assert_eq!(with_msg_id("hello", "00001", None), "hello{00001");
        assert_eq!(
            with_msg_id("hello", "00001", Some("MM")),
            "hello{00001}ackMM"
        );
    }

    #[test]
    fn allocator_persists_and_wraps() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("served.dat");

        let mut alloc = MessageIdAllocator::load(&path);
        assert_eq!(alloc.next(), "00001");
        assert_eq!(alloc.next(), "00002");

        // A fresh instance continues where the previous one stopped.
        let mut alloc = MessageIdAllocator::load(&path);
        assert_eq!(alloc.next(), "00003");

        std::fs::write(&path, "99999").unwrap();
        let mut alloc = MessageIdAllocator::load(&path);
        assert_eq!(alloc.next(), "99999");
        assert_eq!(alloc.next(), "00001");
    }

    #[test]
    fn corrupt_counter_file_restarts_at_one() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("served.dat");
        std::fs::write(&path, "not a number").unwrap();
        let mut alloc = MessageIdAllocator::load(&path);
        assert_eq!(alloc.next(), "00001");
    }
}
