//! Pipeline filter elements wrapping the H.265 RTP engines.

use crate::buffer::BufferStream;
use crate::element::{BufferHandler, Element, PadRef, Sink, Source};
use crate::error::Error;
use crate::h265::{
    Depacketizer, DepacketizerStats, EncodedFrame, Packetizer, PacketizerStats, RtpPacket,
};
use crate::pipeline::Pipeline;
use futures::stream;
use futures::FutureExt;
use std::sync::{Arc, Mutex};

const DEFAULT_CAPACITY: usize = 64;

// ============================================================================
// RtpH265Pay
// ============================================================================

/// H.265 RTP packetizer as a pipeline filter.
///
/// Consumes [`EncodedFrame`]s, produces [`RtpPacket`]s in sequence order.
///
/// # Example
///
/// ```rust,ignore
/// use sluice::elements::RtpH265Pay;
/// use sluice::h265::Packetizer;
///
/// let pay = RtpH265Pay::new("pay", Packetizer::new(0x1234_5678));
/// ```
pub struct RtpH265Pay {
    id: String,
    packetizer: Arc<Mutex<Packetizer>>,
    tx: Mutex<Option<kanal::AsyncSender<RtpPacket>>>,
    rx: kanal::AsyncReceiver<RtpPacket>,
}

impl RtpH265Pay {
    /// Wrap a configured packetizer.
    pub fn new(id: impl Into<String>, packetizer: Packetizer) -> Self {
        let (tx, rx) = kanal::bounded_async(DEFAULT_CAPACITY);
        Self {
            id: id.into(),
            packetizer: Arc::new(Mutex::new(packetizer)),
            tx: Mutex::new(Some(tx)),
            rx,
        }
    }

    /// Set the internal channel capacity. Only meaningful before wiring.
    pub fn with_capacity(self, capacity: usize) -> Self {
        let (tx, rx) = kanal::bounded_async(capacity.max(1));
        Self {
            tx: Mutex::new(Some(tx)),
            rx,
            ..self
        }
    }

    /// Sender statistics, as fed to the RTCP layer.
    pub fn stats(&self) -> PacketizerStats {
        self.packetizer.lock().unwrap().stats()
    }

    /// Release the output stream; it ends after the remaining packets drain
    /// and the upstream edges complete.
    pub fn finish(&self) {
        self.tx.lock().unwrap().take();
    }
}

impl Element for RtpH265Pay {
    fn id(&self) -> &str {
        &self.id
    }
}

impl Sink for RtpH265Pay {
    type Input = EncodedFrame;

    fn handler(&self, pad: &PadRef) -> Option<BufferHandler<EncodedFrame>> {
        if *pad != PadRef::InputDefault {
            return None;
        }
        let packetizer = self.packetizer.clone();
        let tx = self.tx.lock().unwrap().clone();
        Some(Box::new(move |_pipeline: Pipeline, frame: EncodedFrame| {
            let packetizer = packetizer.clone();
            let tx = tx.clone();
            async move {
                let Some(tx) = tx else {
                    return Err(Error::Element("packetizer already finished".into()));
                };
                let packets = packetizer.lock().unwrap().packetize(&frame);
                for packet in packets {
                    tx.send(packet)
                        .await
                        .map_err(|_| Error::Element("packetizer output closed".into()))?;
                }
                Ok(())
            }
            .boxed()
        }))
    }
}

impl Source for RtpH265Pay {
    type Output = RtpPacket;

    fn stream(&self, pad: &PadRef) -> Option<BufferStream<RtpPacket>> {
        if *pad != PadRef::OutputDefault {
            return None;
        }
        let rx = self.rx.clone();
        Some(Box::pin(stream::unfold(rx, |rx| async move {
            rx.recv().await.ok().map(|packet| (packet, rx))
        })))
    }
}

// ============================================================================
// RtpH265Depay
// ============================================================================

/// H.265 RTP depacketizer as a pipeline filter.
///
/// Consumes [`RtpPacket`]s, produces reassembled [`EncodedFrame`]s. Call
/// [`RtpH265Depay::finish`] when the feeding stream ends to flush pending
/// timestamps and release the output.
pub struct RtpH265Depay {
    id: String,
    depacketizer: Arc<Mutex<Depacketizer>>,
    tx: Mutex<Option<kanal::AsyncSender<EncodedFrame>>>,
    rx: kanal::AsyncReceiver<EncodedFrame>,
}

impl RtpH265Depay {
    /// Wrap a configured depacketizer.
    pub fn new(id: impl Into<String>, depacketizer: Depacketizer) -> Self {
        let (tx, rx) = kanal::bounded_async(DEFAULT_CAPACITY);
        Self {
            id: id.into(),
            depacketizer: Arc::new(Mutex::new(depacketizer)),
            tx: Mutex::new(Some(tx)),
            rx,
        }
    }

    /// Set the internal channel capacity. Only meaningful before wiring.
    pub fn with_capacity(self, capacity: usize) -> Self {
        let (tx, rx) = kanal::bounded_async(capacity.max(1));
        Self {
            tx: Mutex::new(Some(tx)),
            rx,
            ..self
        }
    }

    /// Receiver statistics.
    pub fn stats(&self) -> DepacketizerStats {
        self.depacketizer.lock().unwrap().stats()
    }

    /// Flush every pending timestamp in ascending order and release the
    /// output stream.
    pub async fn finish(&self) {
        let remaining = self.depacketizer.lock().unwrap().finish();
        let tx = self.tx.lock().unwrap().take();
        if let Some(tx) = tx {
            for frame in remaining {
                if tx.send(frame).await.is_err() {
                    break;
                }
            }
        }
    }
}

impl Element for RtpH265Depay {
    fn id(&self) -> &str {
        &self.id
    }
}

impl Sink for RtpH265Depay {
    type Input = RtpPacket;

    fn handler(&self, pad: &PadRef) -> Option<BufferHandler<RtpPacket>> {
        if *pad != PadRef::InputDefault {
            return None;
        }
        let depacketizer = self.depacketizer.clone();
        let tx = self.tx.lock().unwrap().clone();
        Some(Box::new(move |_pipeline: Pipeline, packet: RtpPacket| {
            let depacketizer = depacketizer.clone();
            let tx = tx.clone();
            async move {
                let Some(tx) = tx else {
                    return Err(Error::Element("depacketizer already finished".into()));
                };
                let frames = depacketizer.lock().unwrap().push(&packet);
                for frame in frames {
                    tx.send(frame)
                        .await
                        .map_err(|_| Error::Element("depacketizer output closed".into()))?;
                }
                Ok(())
            }
            .boxed()
        }))
    }
}

impl Source for RtpH265Depay {
    type Output = EncodedFrame;

    fn stream(&self, pad: &PadRef) -> Option<BufferStream<EncodedFrame>> {
        if *pad != PadRef::OutputDefault {
            return None;
        }
        let rx = self.rx.clone();
        Some(Box::pin(stream::unfold(rx, |rx| async move {
            rx.recv().await.ok().map(|frame| (frame, rx))
        })))
    }
}
