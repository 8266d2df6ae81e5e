//! Shared fake-server harness for the cross-module scenarios in spec §8.
//! Plays the server's half of the handshake and whatever request/reply
//! script a test hands it, so `LoginSession`/`GameSession` can be driven
//! end-to-end against a real TCP socket without a real field server.

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use fieldbot::cipher::{self, Decryptor, Encryptor};

/// The server's end of a handshaken connection: already past the
/// plaintext handshake, ready to exchange encrypted frames.
pub struct FakeConn {
    stream: TcpStream,
    enc: Encryptor,
    dec: Decryptor,
}

impl FakeConn {
    pub fn send(&mut self, opcode: u16, body: &[u8]) {
        let mut plaintext = opcode.to_le_bytes().to_vec();
        plaintext.extend_from_slice(body);
        let framed = self.enc.encrypt(&plaintext);
        self.stream.write_all(&framed).unwrap();
    }

    /// Blocks until one full frame from the client has arrived and
    /// returns its opcode and body.
    pub fn recv(&mut self) -> (u16, Vec<u8>) {
        let mut acc = Vec::new();
        let mut scratch = [0u8; 4096];
        loop {
            if let Some((consumed, plaintext)) = self.dec.try_decrypt(&acc).unwrap() {
                acc.drain(..consumed);
                let opcode = u16::from_le_bytes([plaintext[0], plaintext[1]]);
                return (opcode, plaintext[2..].to_vec());
            }
            let n = self.stream.read(&mut scratch).unwrap();
            assert!(n > 0, "client closed the connection mid-script");
            acc.extend_from_slice(&scratch[..n]);
        }
    }

    /// Blocks until a frame with `opcode` arrives, ignoring any others.
    pub fn recv_opcode(&mut self, opcode: u16) -> Vec<u8> {
        loop {
            let (got, body) = self.recv();
            if got == opcode {
                return body;
            }
        }
    }
}

/// Starts a listener, accepts exactly one connection, sends the plaintext
/// `RequestVersion` handshake frame with the given seeds, then hands a
/// [`FakeConn`] to `script` to drive the rest of the exchange.
pub fn spawn_fake_server<F>(
    version: u32,
    riv: u32,
    siv: u32,
    block_iv: u32,
    script: F,
) -> (SocketAddr, JoinHandle<()>)
where
    F: FnOnce(FakeConn) + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();

        let mut payload = Vec::new();
        payload.extend_from_slice(&0x0001u16.to_le_bytes()); // RequestVersion
        payload.extend_from_slice(&version.to_le_bytes());
        payload.extend_from_slice(&riv.to_le_bytes());
        payload.extend_from_slice(&siv.to_le_bytes());
        payload.extend_from_slice(&block_iv.to_le_bytes());
        payload.push(0); // patchType

        let mut stream = stream;
        let framed = cipher::write_header(1, &payload);
        stream.write_all(&framed).unwrap();

        // Framing the handshake ticks the server's real encoder forward by
        // one frame even though these particular bytes went out raw (spec
        // §4.1). Replay that same tick here so this fake encryptor lands on
        // the state the client's `Decryptor::advance_over` converges to,
        // instead of starting the real traffic fresh out of lock-step.
        let mut enc = Encryptor::new(version, siv, block_iv).unwrap();
        let _ = enc.encrypt(&framed);

        let conn = FakeConn {
            stream,
            enc,
            dec: Decryptor::new(version, riv, block_iv).unwrap(),
        };
        script(conn);
    });

    (addr, handle)
}

pub const VERSION: u32 = 12;
pub const RIV: u32 = 0xDEAD_BEEF;
pub const SIV: u32 = 0xCAFE_BABE;
pub const BLOCK_IV: u32 = 0x1234_5678;
