use crate::protocol::Packet;

/// Connection to the remote side. Nothing here may block: the battle is ticked from the host's frame callback.
pub trait Transport {
    /// Queues a packet. Delivery is in order, or not at all once the connection is gone.
    fn send(&mut self, packet: &Packet) -> anyhow::Result<()>;

    /// Drains every packet that has arrived so far.
    fn poll(&mut self) -> Vec<Packet>;

    fn is_connected(&self) -> bool;
}

/// In-process transport over a pair of tokio channels.
pub struct ChannelTransport {
    tx: tokio::sync::mpsc::UnboundedSender<Vec<u8>>,
    rx: tokio::sync::mpsc::UnboundedReceiver<Vec<u8>>,
    connected: bool,
}

impl ChannelTransport {
    pub fn pair() -> (Self, Self) {
        let (a_tx, b_rx) = tokio::sync::mpsc::unbounded_channel();
        let (b_tx, a_rx) = tokio::sync::mpsc::unbounded_channel();
        (
            Self {
                tx: a_tx,
                rx: a_rx,
                connected: true,
            },
            Self {
                tx: b_tx,
                rx: b_rx,
                connected: true,
            },
        )
    }
}

impl Transport for ChannelTransport {
    fn send(&mut self, packet: &Packet) -> anyhow::Result<()> {
        if !self.connected {
            anyhow::bail!("transport is disconnected");
        }
        if self.tx.send(packet.serialize()?).is_err() {
            self.connected = false;
            anyhow::bail!("transport is disconnected");
        }
        Ok(())
    }

    fn poll(&mut self) -> Vec<Packet> {
        let mut packets = vec![];
        loop {
            match self.rx.try_recv() {
                Ok(buf) => match Packet::deserialize(&buf) {
                    Ok(packet) => packets.push(packet),
                    Err(e) => {
                        log::warn!("dropping malformed packet ({} bytes): {}", buf.len(), e);
                    }
                },
                Err(tokio::sync::mpsc::error::TryRecvError::Empty) => {
                    break;
                }
                Err(tokio::sync::mpsc::error::TryRecvError::Disconnected) => {
                    if self.connected {
                        log::info!("transport disconnected");
                    }
                    self.connected = false;
                    break;
                }
            }
        }
        packets
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}
