//! Inbound admission: drops everything that is not a message for one of
//! our addressees, repairs defective id trailers, suppresses duplicates
//! and acknowledges what passed. Admitted requests leave through a
//! channel and are dispatched strictly in arrival order.

use std::collections::HashSet;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::ack::ack_payload;
use crate::aprs::frame::{format_message_frame, repair_defective_trailer};
use crate::aprs::{FrameFormat, InboundFrame, OutCategory, OutboundBatch};
use crate::dedup::{DedupCache, DedupKey};

/// One admitted request, ready for parsing and dispatch.
#[derive(Debug, Clone)]
pub struct InboundRequest {
    pub sender: String,
    pub text: String,
    pub msg_no: Option<String>,
    /// Sender used the reply-ack message-id form.
    pub reply_ack: bool,
}

pub struct Ingress {
    addressees: HashSet<String>,
    alias: String,
    tocall: String,
    dedup: DedupCache,
    outbound: mpsc::Sender<OutboundBatch>,
    requests: mpsc::Sender<InboundRequest>,
}

impl Ingress {
    pub fn new(
        addressees: &[String],
        alias: &str,
        tocall: &str,
        dedup_ttl: Duration,
        dedup_entries: usize,
        outbound: mpsc::Sender<OutboundBatch>,
        requests: mpsc::Sender<InboundRequest>,
    ) -> Self {
        Self {
            addressees: addressees.iter().map(|a| a.to_uppercase()).collect(),
            alias: alias.to_string(),
            tocall: tocall.to_string(),
            dedup: DedupCache::new(dedup_ttl, dedup_entries),
            outbound,
            requests,
        }
    }

    /// Run the admission loop until the frame channel closes.
    pub async fn run(mut self, mut frames: mpsc::Receiver<InboundFrame>) {
        while let Some(frame) = frames.recv().await {
            self.handle(frame).await;
        }
    }

    async fn handle(&mut self, frame: InboundFrame) {
        if frame.format != FrameFormat::Message {
            trace!("Dropping non-message frame from {}", frame.source);
            return;
        }
        if !self.addressees.contains(&frame.addressee) {
            trace!(
                "Dropping message for {} (not one of ours)",
                frame.addressee
            );
            return;
        }

        // Confirmations for our own outbound traffic are consumed here.
        if let Some(id) = frame.ack_or_rej_ref() {
            debug!("{} confirmed outbound message {}", frame.source, id);
            return;
        }

        let reply_ack = frame.uses_reply_ack();
        let (text, msg_no) = match frame.msg_no {
            Some(msg_no) => (frame.text.clone(), Some(msg_no)),
            None => repair_defective_trailer(&frame.text),
        };
        let text = text.trim().to_string();
        if text.is_empty() {
            trace!("Dropping empty message from {}", frame.source);
            return;
        }

        let key = DedupKey::new(&frame.source, msg_no.as_deref(), &text);
        if !self.dedup.insert_if_absent(key) {
            debug!(
                "Duplicate request from {} within retention window, dropping",
                frame.source
            );
            return;
        }

        // Ack precedes any response fragment for this request: it is
        // enqueued before the request reaches the dispatcher.
        if let Some(msg_no) = &msg_no {
            let ack_frame = format_message_frame(
                &self.alias,
                &self.tocall,
                &frame.source,
                &ack_payload(msg_no),
            );
            let batch = OutboundBatch {
                category: OutCategory::Ack,
                frames: vec![ack_frame],
            };
            if self.outbound.send(batch).await.is_err() {
                return;
            }
        }

        let request = InboundRequest {
            sender: frame.source,
            text,
            msg_no,
            reply_ack,
        };
        let _ = self.requests.send(request).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aprs::parse_tnc2;

    fn ingress(
        outbound: mpsc::Sender<OutboundBatch>,
        requests: mpsc::Sender<InboundRequest>,
    ) -> Ingress {
        Ingress::new(
            &["OSKAR".to_string(), "OSKR".to_string()],
            "OSKAR",
            "APRS",
            Duration::from_secs(3600),
            100,
            outbound,
            requests,
        )
    }

    #[tokio::test]
    async fn admits_and_acks_message_with_id() {
        let (out_tx, mut out_rx) = mpsc::channel(8);
        let (req_tx, mut req_rx) = mpsc::channel(8);
        let mut ingress = ingress(out_tx, req_tx);

        let frame =
            parse_tnc2("DF1JSL-8>APRS::OSKAR    :wx tomorrow{AB1").unwrap();
        ingress.handle(frame).await;

        let batch = out_rx.try_recv().unwrap();
        assert_eq!(batch.category, OutCategory::Ack);
        assert_eq!(batch.frames, vec!["OSKAR>APRS::DF1JSL-8 :ackAB1"]);

        let request = req_rx.try_recv().unwrap();
        assert_eq!(request.sender, "DF1JSL-8");
        assert_eq!(request.text, "wx tomorrow");
        assert_eq!(request.msg_no.as_deref(), Some("AB1"));
        assert!(!request.reply_ack);
    }

    #[tokio::test]
    async fn duplicate_without_id_is_fully_suppressed() {
        let (out_tx, mut out_rx) = mpsc::channel(8);
        let (req_tx, mut req_rx) = mpsc::channel(8);
        let mut ingress = ingress(out_tx, req_tx);

        let frame = parse_tnc2("DF1JSL-8>APRS::OSKAR    :94043").unwrap();
        ingress.handle(frame.clone()).await;
        ingress.handle(frame).await;

        // One request, zero acks, and no second pass.
        assert!(out_rx.try_recv().is_err());
        assert!(req_rx.try_recv().is_ok());
        assert!(req_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn foreign_addressee_is_dropped() {
        let (out_tx, mut out_rx) = mpsc::channel(8);
        let (req_tx, mut req_rx) = mpsc::channel(8);
        let mut ingress = ingress(out_tx, req_tx);

        let frame = parse_tnc2("DF1JSL-8>APRS::WXBOT    :wx{1").unwrap();
        ingress.handle(frame).await;
        assert!(out_rx.try_recv().is_err());
        assert!(req_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn defective_trailer_is_repaired_and_acked() {
        let (out_tx, mut out_rx) = mpsc::channel(8);
        let (req_tx, mut req_rx) = mpsc::channel(8);
        let mut ingress = ingress(out_tx, req_tx);

        let frame = parse_tnc2("DF1JSL-8>APRS::OSKR     :wx{123}").unwrap();
        ingress.handle(frame).await;

        let batch = out_rx.try_recv().unwrap();
        assert!(batch.frames[0].ends_with(":ack123"));
        let request = req_rx.try_recv().unwrap();
        assert_eq!(request.text, "wx");
        assert_eq!(request.msg_no.as_deref(), Some("123"));
    }

    #[tokio::test]
    async fn reply_ack_form_is_flagged() {
        let (out_tx, _out_rx) = mpsc::channel(8);
        let (req_tx, mut req_rx) = mpsc::channel(8);
        let mut ingress = ingress(out_tx, req_tx);

        let frame = parse_tnc2("DF1JSL-8>APRS::OSKAR    :metar{MM}AA").unwrap();
        ingress.handle(frame).await;
        let request = req_rx.try_recv().unwrap();
        assert!(request.reply_ack);
    }

    #[tokio::test]
    async fn inbound_ack_is_consumed() {
        let (out_tx, mut out_rx) = mpsc::channel(8);
        let (req_tx, mut req_rx) = mpsc::channel(8);
        let mut ingress = ingress(out_tx, req_tx);

        let frame = parse_tnc2("DF1JSL-8>APRS::OSKAR    :ack00042").unwrap();
        ingress.handle(frame).await;
        assert!(out_rx.try_recv().is_err());
        assert!(req_rx.try_recv().is_err());
    }
}
