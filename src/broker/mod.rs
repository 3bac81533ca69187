//! Signaling adapter: a thin façade over the relay broker connection.
//!
//! A reader thread parses broker lines into typed events and queues them for
//! the UI loop to drain; sends go straight out on the shared socket. The
//! session controller talks to the `SignalingLink` trait so tests can swap in
//! a scripted broker.

pub mod protocol;

use crate::log_debug;
use anyhow::{Context, Result};
use crossbeam_channel::{unbounded, Receiver, Sender};
use protocol::{SignalCommand, SignalEvent};
use std::io::{BufRead, BufReader, Write};
use std::net::{Shutdown, TcpStream};
use std::sync::Mutex;
use std::thread;

/// Connection to the signaling broker.
///
/// Implementations surface the broker's connect/accept/close semantics and
/// nothing more; everything network-shaped stays behind this seam.
pub trait SignalingLink: Send {
    /// Queue a command to the broker.
    fn send(&self, command: SignalCommand) -> Result<()>;

    /// Next pending broker event, if any. Never blocks.
    fn try_event(&self) -> Option<SignalEvent>;

    /// Tear the connection down. Safe to call more than once.
    fn close(&self);
}

/// TCP implementation speaking the newline-delimited JSON protocol.
pub struct TcpBroker {
    writer: Mutex<TcpStream>,
    socket: TcpStream,
    events: Receiver<SignalEvent>,
}

impl TcpBroker {
    /// Connect to the broker and register. The assigned local address arrives
    /// asynchronously as an `Open` event once the broker processes us.
    pub fn connect(addr: &str) -> Result<Self> {
        log_debug(&format!("connecting to broker at {addr}"));
        let socket = TcpStream::connect(addr)
            .with_context(|| format!("failed to connect to broker at {addr}"))?;
        let _ = socket.set_nodelay(true);
        let reader = socket
            .try_clone()
            .context("failed to clone broker socket for reading")?;
        let writer = socket
            .try_clone()
            .context("failed to clone broker socket for writing")?;

        let (tx, rx) = unbounded();
        thread::spawn(move || read_broker_events(reader, tx));

        let broker = Self {
            writer: Mutex::new(writer),
            socket,
            events: rx,
        };
        broker.send(SignalCommand::Open)?;
        Ok(broker)
    }
}

impl SignalingLink for TcpBroker {
    fn send(&self, command: SignalCommand) -> Result<()> {
        let line = protocol::encode_command(&command)?;
        let mut writer = self
            .writer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        writer
            .write_all(line.as_bytes())
            .and_then(|_| writer.write_all(b"\n"))
            .and_then(|_| writer.flush())
            .context("failed to send command to broker")?;
        Ok(())
    }

    fn try_event(&self) -> Option<SignalEvent> {
        self.events.try_recv().ok()
    }

    fn close(&self) {
        // Unblocks the reader thread's pending read as well.
        let _ = self.socket.shutdown(Shutdown::Both);
    }
}

impl Drop for TcpBroker {
    fn drop(&mut self) {
        self.close();
    }
}

fn read_broker_events(stream: TcpStream, tx: Sender<SignalEvent>) {
    let reader = BufReader::new(stream);
    for line in reader.lines() {
        let line = match line {
            Ok(line) => line,
            Err(_) => break,
        };
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match protocol::decode_event(trimmed) {
            Ok(event) => {
                if tx.send(event).is_err() {
                    break; // UI side has gone away
                }
            }
            Err(err) => {
                log_debug(&format!("ignoring malformed broker line: {err:#}"));
            }
        }
    }
    log_debug("broker reader thread exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Write};
    use std::net::TcpListener;
    use std::time::{Duration, Instant};

    /// Minimal in-process relay stub: accepts one client, captures its first
    /// command line, then plays back the given event lines.
    fn spawn_relay_stub(
        event_lines: Vec<String>,
    ) -> (String, thread::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind relay stub");
        let addr = listener.local_addr().expect("stub addr").to_string();
        let handle = thread::spawn(move || {
            let (stream, _) = listener.accept().expect("accept client");
            let mut reader = BufReader::new(stream.try_clone().expect("clone"));
            let mut first_command = String::new();
            reader.read_line(&mut first_command).expect("read command");
            let mut writer = stream;
            for line in event_lines {
                writer.write_all(line.as_bytes()).expect("write event");
                writer.write_all(b"\n").expect("write newline");
            }
            writer.flush().expect("flush");
            first_command
        });
        (addr, handle)
    }

    fn wait_for_event(broker: &TcpBroker) -> Option<SignalEvent> {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if let Some(event) = broker.try_event() {
                return Some(event);
            }
            thread::sleep(Duration::from_millis(5));
        }
        None
    }

    #[test]
    fn connect_registers_and_receives_assigned_address() {
        let (addr, stub) = spawn_relay_stub(vec![
            r#"{"event":"open","address":"quiet-owl-7"}"#.to_string(),
        ]);
        let broker = TcpBroker::connect(&addr).expect("connect");

        let event = wait_for_event(&broker).expect("open event");
        assert_eq!(
            event,
            SignalEvent::Open {
                address: "quiet-owl-7".to_string(),
            }
        );

        let first_command = stub.join().expect("stub thread");
        assert!(
            first_command.contains("\"cmd\":\"open\""),
            "client should register first, sent: {first_command}"
        );
        broker.close();
    }

    #[test]
    fn malformed_broker_lines_are_skipped() {
        let (addr, stub) = spawn_relay_stub(vec![
            "garbage".to_string(),
            r#"{"event":"no-such-event"}"#.to_string(),
            r#"{"event":"connection","from":"peer-1"}"#.to_string(),
        ]);
        let broker = TcpBroker::connect(&addr).expect("connect");

        let event = wait_for_event(&broker).expect("valid event after garbage");
        assert_eq!(
            event,
            SignalEvent::Connection {
                from: "peer-1".to_string(),
            }
        );
        let _ = stub.join();
        broker.close();
    }

    #[test]
    fn close_is_idempotent_and_send_fails_afterwards() {
        let (addr, stub) = spawn_relay_stub(Vec::new());
        let broker = TcpBroker::connect(&addr).expect("connect");
        let _ = stub.join();

        broker.close();
        broker.close();
        let result = broker.send(SignalCommand::Hangup {
            to: "peer".to_string(),
        });
        assert!(result.is_err());
    }
}
