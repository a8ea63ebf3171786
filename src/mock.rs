//! A mock device, useful to test the gateway without actual serial ports.
//!
//! The device side runs as a task on the other end of an in-memory pipe.
//! It reads lines from the host and, depending on its behaviour,
//! answers each one.

use std::{
    fmt::Display,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::{
    io::{AsyncWriteExt, DuplexStream},
    sync::mpsc,
};
use tokio_util::codec::FramedRead;
use tracing::{debug, info, info_span, trace, warn, Instrument};

use crate::serial::codecs::lines::LinesCodec;

const PIPE_CAPACITY: usize = 64 * 1024;

/// What the mock device does with the lines it receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MockBehaviour {
    /// Reply to each line `x` with `Got: "x"`, followed by a newline.
    Echo,

    /// Never reply.
    Silent,
}

impl Default for MockBehaviour {
    fn default() -> Self {
        Self::Echo
    }
}

#[derive(Debug)]
enum Command {
    Inject(Vec<u8>),
    Unplug,
}

#[derive(Debug, Default)]
struct State {
    received: Vec<String>,
    control: Option<mpsc::UnboundedSender<Command>>,
}

/// A mocked serial device.
///
/// Clones share the same device.
#[derive(Debug, Clone)]
pub struct MockDevice {
    name: String,
    behaviour: MockBehaviour,
    delay: Duration,
    state: Arc<Mutex<State>>,
}

impl Display for MockDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

impl MockDevice {
    /// A new device with the given behaviour.
    pub fn new(name: &str, behaviour: MockBehaviour) -> Self {
        Self {
            name: name.into(),
            behaviour,
            delay: Duration::ZERO,
            state: Arc::default(),
        }
    }

    /// A device which echoes.
    pub fn echo(name: &str) -> Self {
        Self::new(name, MockBehaviour::Echo)
    }

    /// A device which never replies.
    pub fn silent(name: &str) -> Self {
        Self::new(name, MockBehaviour::Silent)
    }

    /// Wait this long before each reply.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// The name of the device.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Every line the device has received so far, across all sessions.
    pub fn received(&self) -> Vec<String> {
        self.state().received.clone()
    }

    /// Make the device send these bytes on its own.
    /// Returns false if the device is not attached.
    pub fn inject<B: AsRef<[u8]>>(&self, bytes: B) -> bool {
        self.command(Command::Inject(bytes.as_ref().to_vec()))
    }

    /// Make the device go away, as if the cable was pulled.
    /// Returns false if the device is not attached.
    pub fn unplug(&self) -> bool {
        self.command(Command::Unplug)
    }

    fn command(&self, command: Command) -> bool {
        match &self.state().control {
            Some(control) => control.send(command).is_ok(),
            None => false,
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start a device session and get the host's end of the pipe.
    ///
    /// Must be called within a tokio runtime.
    pub(crate) fn attach(&self) -> DuplexStream {
        let (host, device) = tokio::io::duplex(PIPE_CAPACITY);
        let (control_tx, control_rx) = mpsc::unbounded_channel();

        // Replacing the sender ends any previous session.
        self.state().control = Some(control_tx);

        info!(%self.name, ?self.behaviour, "Attaching mock device");

        tokio::spawn(
            run_device(
                device,
                self.behaviour,
                self.delay,
                self.state.clone(),
                control_rx,
            )
            .instrument(info_span!("mock", %self.name)),
        );

        host
    }
}

async fn run_device(
    device: DuplexStream,
    behaviour: MockBehaviour,
    delay: Duration,
    state: Arc<Mutex<State>>,
    mut control: mpsc::UnboundedReceiver<Command>,
) {
    let (read, mut write) = tokio::io::split(device);
    let mut lines = FramedRead::new(read, LinesCodec::default());

    loop {
        tokio::select! {
            line = lines.next() => match line {
                Some(Ok(line)) => {
                    let line = String::from_utf8_lossy(&line);
                    let line = line.trim_end_matches('\r').to_owned();
                    trace!(%line, "Device got line");

                    state
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .received
                        .push(line.clone());

                    if behaviour == MockBehaviour::Echo {
                        if !delay.is_zero() {
                            tokio::time::sleep(delay).await;
                        }

                        let reply = format!("Got: \"{line}\"\n");
                        if let Err(e) = write.write_all(reply.as_bytes()).await {
                            warn!(?e, "Could not reply, host is gone");
                            break;
                        }
                    }
                }
                Some(Err(e)) => {
                    warn!(?e, "Problem reading from host");
                    break;
                }
                None => {
                    debug!("Host closed the device");
                    break;
                }
            },
            command = control.recv() => match command {
                Some(Command::Inject(bytes)) => {
                    if let Err(e) = write.write_all(&bytes).await {
                        warn!(?e, "Could not inject, host is gone");
                        break;
                    }
                }
                Some(Command::Unplug) | None => {
                    info!("Unplugged");
                    break;
                }
            },
        }
    }

    // Both halves drop here, so the host sees the device vanish.
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn echoes_lines() {
        let device = MockDevice::echo("echo");
        let mut host = device.attach();

        host.write_all(b"hello\n").await.unwrap();

        let mut buf = vec![0; 64];
        let n = host.read(&mut buf).await.unwrap();

        assert_eq!(&buf[..n], b"Got: \"hello\"\n");
        assert_eq!(device.received(), vec!["hello".to_string()]);
    }

    #[tokio::test]
    async fn silent_device_only_listens() {
        let device = MockDevice::silent("silent");
        let mut host = device.attach();

        host.write_all(b"one\r\ntwo\n").await.unwrap();

        let mut buf = vec![0; 64];
        let read = tokio::time::timeout(Duration::from_millis(100), host.read(&mut buf)).await;
        assert!(read.is_err(), "Silent device should not reply");

        assert_eq!(device.received(), vec!["one".to_string(), "two".into()]);
    }

    #[tokio::test]
    async fn inject_and_unplug() {
        let device = MockDevice::silent("unsolicited");
        assert!(!device.inject("too early"));

        let mut host = device.attach();
        assert!(device.inject("boot ok\n"));

        let mut buf = vec![0; 64];
        let n = host.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"boot ok\n");

        assert!(device.unplug());
        let n = host.read(&mut buf).await.unwrap();
        assert_eq!(n, 0, "Host should see end of stream");
    }
}
