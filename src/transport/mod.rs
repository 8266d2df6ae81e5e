//! TCP transport, handshake, and packet dispatch (C2).
//!
//! One dedicated `std::thread` drives the blocking receive loop per
//! connection — spec §5 explicitly allows this model over a cooperative
//! task scheduler, and it's the model the teacher crate's own
//! `EncryptedTcpStream` is built around. `dashmap::DashMap` backs the
//! waiter/handler registry, the same crate `allanbatista-mu-rust`'s server
//! member already reaches for to hold concurrent game state.

pub mod waiter;

use std::io::prelude::*;
use std::net::{Shutdown, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use dashmap::DashMap;
use log::{debug, error, warn};

use crate::cipher::{self, Decryptor, Encryptor};
use crate::config::SessionConfig;
use crate::errors::{Error, FieldResult};
use crate::opcode::SendOp;
use crate::packet::{Packet, PacketBuilder};
use crate::wire::Readable;
use waiter::{Handler, Waiter, WaiterQueue};

const READ_CHUNK: usize = 4096;

struct Inner {
    write_stream: Mutex<TcpStream>,
    send_cipher: Mutex<Encryptor>,
    waiters: DashMap<u16, WaiterQueue>,
    handlers: DashMap<u16, Handler>,
    disposed: AtomicBool,
}

impl Inner {
    fn dispatch(&self, opcode: u16, raw: &[u8]) {
        debug!("dispatch opcode {:#06x} ({} bytes)", opcode, raw.len());

        let claimed = self
            .waiters
            .get(&opcode)
            .map(|queue| queue.resolve(raw))
            .unwrap_or(false);
        if claimed {
            return;
        }

        if let Some(handler) = self.handlers.get(&opcode).map(|h| h.clone()) {
            let raw = raw.to_vec();
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| handler(&raw)));
            if let Err(cause) = result {
                error!("handler for opcode {:#06x} panicked: {:?}", opcode, cause);
            }
        }
    }

    fn cancel_all_waiters(&self) {
        for entry in self.waiters.iter() {
            entry.value().cancel_all();
        }
    }
}

/// A live, handshaken connection to either the login server or a game
/// server. Both C3 and C4 are built entirely out of this type's `send`,
/// `wait_for`, and `on` primitives.
pub struct Transport {
    inner: Arc<Inner>,
    receive_thread: Option<JoinHandle<()>>,
}

impl Transport {
    /// Opens a TCP connection, completes the plaintext handshake, and
    /// starts the background receive loop. See spec §4.1/§4.2.
    pub fn connect(host: &str, port: u16, config: &SessionConfig) -> FieldResult<Self> {
        let mut stream = TcpStream::connect((host, port))?;

        let mut header = [0u8; 6];
        stream.read_exact(&mut header)?;
        let (_sequence_id, payload_len) = cipher::read_header(&header);

        let mut payload = vec![0u8; payload_len as usize];
        stream.read_exact(&mut payload)?;

        let handshake = Packet::from_bytes(&payload)?;
        if handshake.opcode() != SendOp::RequestVersion.code() {
            return Err(Error::UnexpectedHandshakeOpcode(handshake.opcode()));
        }

        let mut fields = handshake.reader();
        let version = u32::read_from(&mut fields)?;
        let riv = u32::read_from(&mut fields)?;
        let siv = u32::read_from(&mut fields)?;
        let block_iv = u32::read_from(&mut fields)?;
        let _patch_type = u8::read_from(&mut fields)?;

        if version != config.version {
            return Err(Error::VersionMismatch(config.version, version));
        }

        // Swapped by design: the server's write IV is our read IV and vice
        // versa, because one end's send channel is the other's receive
        // channel (spec §4.1).
        let encryptor = Encryptor::new(version, riv, block_iv)?;
        let mut decryptor = Decryptor::new(version, siv, block_iv)?;

        let mut raw_handshake = Vec::with_capacity(header.len() + payload.len());
        raw_handshake.extend_from_slice(&header);
        raw_handshake.extend_from_slice(&payload);
        decryptor.advance_over(&raw_handshake);

        let write_stream = stream.try_clone()?;
        let read_stream = stream;

        let inner = Arc::new(Inner {
            write_stream: Mutex::new(write_stream),
            send_cipher: Mutex::new(encryptor),
            waiters: DashMap::new(),
            handlers: DashMap::new(),
            disposed: AtomicBool::new(false),
        });

        let loop_inner = inner.clone();
        let receive_thread = thread::Builder::new()
            .name("field-transport-recv".into())
            .spawn(move || receive_loop(loop_inner, read_stream, decryptor))?;

        Ok(Self {
            inner,
            receive_thread: Some(receive_thread),
        })
    }

    /// Serializes and encrypts `builder`, then writes the framed bytes to
    /// the socket. The send-cipher mutex serializes concurrent callers
    /// (spec §5 ordering guarantee 2).
    pub fn send(&self, builder: PacketBuilder) -> FieldResult<()> {
        if self.inner.disposed.load(Ordering::SeqCst) {
            return Err(Error::NotConnected);
        }

        let plaintext = builder.finish();
        let framed = {
            let mut cipher = self.inner.send_cipher.lock().unwrap();
            cipher.encrypt(&plaintext)
        };

        let mut stream = self.inner.write_stream.lock().unwrap();
        stream.write_all(&framed)?;
        Ok(())
    }

    /// Registers a one-shot waiter on `opcode`. Must be called before the
    /// `send` that triggers the reply (spec §4.2) — the receive loop runs
    /// concurrently and a fast reply could otherwise be dropped on the
    /// floor with no waiter to claim it.
    pub fn wait_for(&self, opcode: u16) -> Waiter {
        self.inner
            .waiters
            .entry(opcode)
            .or_insert_with(WaiterQueue::new)
            .register()
    }

    /// Installs (or replaces) the persistent handler for `opcode`.
    pub fn on<F>(&self, opcode: u16, handler: F)
    where
        F: Fn(&[u8]) + Send + Sync + 'static,
    {
        self.inner.handlers.insert(opcode, Arc::new(handler));
    }

    /// Tears the connection down: flags disposed, shuts down the socket
    /// (unblocking the receive thread's read), joins it, and cancels every
    /// waiter still pending.
    pub fn dispose(&mut self) {
        if self.inner.disposed.swap(true, Ordering::SeqCst) {
            return;
        }

        if let Ok(stream) = self.inner.write_stream.lock() {
            let _ = stream.shutdown(Shutdown::Both);
        }

        if let Some(handle) = self.receive_thread.take() {
            let _ = handle.join();
        }

        self.inner.cancel_all_waiters();
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.dispose();
    }
}

fn receive_loop(inner: Arc<Inner>, mut stream: TcpStream, mut decryptor: Decryptor) {
    let mut acc = Vec::new();
    let mut scratch = [0u8; READ_CHUNK];

    loop {
        if inner.disposed.load(Ordering::SeqCst) {
            break;
        }

        let n = match stream.read(&mut scratch) {
            Ok(0) => {
                debug!("peer closed the connection");
                break;
            }
            Ok(n) => n,
            Err(err) => {
                if !inner.disposed.load(Ordering::SeqCst) {
                    warn!("receive loop read error: {}", err);
                }
                break;
            }
        };
        acc.extend_from_slice(&scratch[..n]);

        loop {
            match decryptor.try_decrypt(&acc) {
                Ok(Some((consumed, plaintext))) => {
                    acc.drain(..consumed);
                    match Packet::from_bytes(&plaintext) {
                        Ok(packet) => inner.dispatch(packet.opcode(), &plaintext),
                        Err(err) => error!("dropping malformed frame: {}", err),
                    }
                }
                Ok(None) => break,
                Err(err) => {
                    error!("frame decode failed, closing connection: {}", err);
                    inner.disposed.store(true, Ordering::SeqCst);
                    inner.cancel_all_waiters();
                    return;
                }
            }
        }
    }

    inner.disposed.store(true, Ordering::SeqCst);
    inner.cancel_all_waiters();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cipher::{write_header, Encryptor as TestEncryptor};
    use std::net::TcpListener;

    fn spawn_handshaking_server(
        version: u32,
        riv: u32,
        siv: u32,
        block_iv: u32,
    ) -> (std::net::SocketAddr, JoinHandle<TcpStream>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = thread::spawn(move || {
            let (mut sock, _) = listener.accept().unwrap();

            let mut payload = Vec::new();
            payload.extend_from_slice(&SendOp::RequestVersion.code().to_le_bytes());
            payload.extend_from_slice(&version.to_le_bytes());
            payload.extend_from_slice(&riv.to_le_bytes());
            payload.extend_from_slice(&siv.to_le_bytes());
            payload.extend_from_slice(&block_iv.to_le_bytes());
            payload.push(0); // patchType

            let framed = write_header(1, &payload);
            sock.write_all(&framed).unwrap();

            sock
        });

        (addr, handle)
    }

    #[test]
    fn connect_completes_the_handshake_and_starts_the_receive_loop() {
        let (addr, server) = spawn_handshaking_server(12, 0xDEAD_BEEF, 0xCAFE_BABE, 0x1234_5678);
        let config = SessionConfig::default();

        let mut transport = Transport::connect(&addr.ip().to_string(), addr.port(), &config)
            .expect("handshake should succeed");

        // The server side of the socket is still reachable.
        let mut server_sock = server.join().unwrap();
        let mut server_enc = TestEncryptor::new(12, 0xCAFE_BABE, 0x1234_5678).unwrap();
        let framed = server_enc.encrypt(&[0x34, 0x12, 9, 9, 9]);
        server_sock.write_all(&framed).unwrap();

        let waiter = transport.wait_for(0x1234);
        let bytes = waiter.wait(Duration::from_secs(1)).unwrap();
        assert_eq!(bytes, vec![0x34, 0x12, 9, 9, 9]);

        transport.dispose();
    }

    #[test]
    fn version_mismatch_is_rejected() {
        let (addr, _server) = spawn_handshaking_server(999, 1, 2, 3);
        let config = SessionConfig::default();

        let result = Transport::connect(&addr.ip().to_string(), addr.port(), &config);
        assert!(matches!(result, Err(Error::VersionMismatch(..))));
    }
}
