//! In-process device double for integration tests.
//!
//! Speaks the server half of the protocol over a real TCP socket: framed
//! messages, property element streams, the SRP verifier role, and the
//! server-side session cipher.

// Each integration test crate compiles this module and uses its own subset.
#![allow(dead_code)]

use acp_crypto::{EncryptionContext, srp};
use acp_proto::{CflValue, HEADER_SIZE, Message, Property, cflbinary};
use num_bigint::BigUint;
use sha1::{Digest, Sha1};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
};

/// A connected device-side socket, optionally running the session cipher.
pub struct DeviceLink {
    stream: TcpStream,
    cipher: Option<EncryptionContext>,
}

impl DeviceLink {
    pub fn new(stream: TcpStream) -> Self {
        Self { stream, cipher: None }
    }

    /// Install the server-role cipher; everything after this is encrypted.
    pub fn enable_encryption(&mut self, shared_key: &[u8], client_iv: &[u8; 16], server_iv: &[u8; 16]) {
        self.cipher = Some(EncryptionContext::server(shared_key, client_iv, server_iv));
    }

    pub async fn read_exact(&mut self, len: usize) -> Vec<u8> {
        let mut buf = vec![0u8; len];
        self.stream.read_exact(&mut buf).await.unwrap();
        if let Some(cipher) = self.cipher.as_mut() {
            cipher.decrypt(&mut buf);
        }
        buf
    }

    pub async fn write(&mut self, bytes: &[u8]) {
        let mut out = bytes.to_vec();
        if let Some(cipher) = self.cipher.as_mut() {
            cipher.encrypt(&mut out);
        }
        self.stream.write_all(&out).await.unwrap();
    }

    /// Read one framed message, including its body.
    pub async fn read_message(&mut self) -> Message {
        let header = self.read_exact(HEADER_SIZE).await;
        let mut msg = Message::parse_header(&header).unwrap();
        if msg.body_size > 0 {
            let body = self.read_exact(msg.body_size as usize).await;
            msg.attach_body(body).unwrap();
        }
        msg
    }

    pub async fn write_message(&mut self, msg: &Message) {
        self.write(&msg.compose()).await;
    }

    /// Raw monitor frame: "XE" magic, u32 length, CFL body.
    pub async fn write_monitor_frame(&mut self, payload: &CflValue) {
        let body = cflbinary::compose(payload);
        let mut frame = Vec::with_capacity(8 + body.len());
        frame.extend_from_slice(b"XE\x00\x95");
        frame.extend_from_slice(&(body.len() as u32).to_be_bytes());
        frame.extend_from_slice(&body);
        self.write(&frame).await;
    }
}

/// Bind a listener and hand the accepted connection to `serve`.
pub async fn spawn_device<F, Fut>(serve: F) -> u16
where
    F: FnOnce(DeviceLink) -> Fut + Send + 'static,
    Fut: std::future::Future<Output = ()> + Send,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        stream.set_nodelay(true).unwrap();
        serve(DeviceLink::new(stream)).await;
    });
    port
}

/// Body of a GetProp reply: one `syAP` element plus the sentinel.
pub fn sy_ap_reply_body(value: u32) -> Vec<u8> {
    let mut body = Property::new("syAP", value as i64).unwrap().compose();
    body.extend_from_slice(&Property::sentinel_bytes());
    body
}

/// Answer one GetProp exchange with the given reply body.
pub async fn serve_get_prop(link: &mut DeviceLink, reply_body: Vec<u8>) {
    let request = link.read_message().await;
    assert_eq!(request.command, acp_proto::Command::GetProp);
    link.write_message(&Message::new(acp_proto::Command::GetProp, 0, "", Some(reply_body))).await;
}

fn hash(parts: &[&[u8]]) -> [u8; 20] {
    let mut hasher = Sha1::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

fn pad(value: &BigUint) -> [u8; srp::MODULUS_SIZE] {
    let bytes = value.to_bytes_be();
    let mut out = [0u8; srp::MODULUS_SIZE];
    out[srp::MODULUS_SIZE - bytes.len()..].copy_from_slice(&bytes);
    out
}

/// Outcome of the verifier role: proofs plus the shared key.
pub struct ServerProofs {
    pub expected_m1: [u8; 20],
    pub m2: [u8; 20],
    pub key: [u8; 20],
}

/// Server public key for a password, salt, and private key.
pub fn server_public_key(password: &str, salt: &[u8], b_secret: &[u8]) -> Vec<u8> {
    let n = BigUint::from_bytes_be(&srp::MODULUS);
    let g = BigUint::from(srp::GENERATOR);
    let k = BigUint::from_bytes_be(&hash(&[&srp::MODULUS, &pad(&g)]));
    let identity = hash(&[srp::USERNAME.as_bytes(), b":", password.as_bytes()]);
    let x = BigUint::from_bytes_be(&hash(&[salt, &identity]));
    let v = g.modpow(&x, &n);
    let b = BigUint::from_bytes_be(b_secret);
    let public = (k * v + g.modpow(&b, &n)) % &n;
    pad(&public).to_vec()
}

/// Run the verifier math once the client public key arrives.
pub fn server_proofs(password: &str, salt: &[u8], b_secret: &[u8], client_public: &[u8]) -> ServerProofs {
    let n = BigUint::from_bytes_be(&srp::MODULUS);
    let g = BigUint::from(srp::GENERATOR);
    let k = BigUint::from_bytes_be(&hash(&[&srp::MODULUS, &pad(&g)]));
    let identity = hash(&[srp::USERNAME.as_bytes(), b":", password.as_bytes()]);
    let x = BigUint::from_bytes_be(&hash(&[salt, &identity]));
    let v = g.modpow(&x, &n);
    let b = BigUint::from_bytes_be(b_secret);
    let big_b = (k * &v + g.modpow(&b, &n)) % &n;
    let big_a = BigUint::from_bytes_be(client_public) % &n;

    let u = BigUint::from_bytes_be(&hash(&[&pad(&big_a), &pad(&big_b)]));
    let secret = (&big_a * v.modpow(&u, &n) % &n).modpow(&b, &n);
    let key = hash(&[&pad(&secret)]);

    let hn = hash(&[&srp::MODULUS]);
    let hg = hash(&[&pad(&g)]);
    let mut group_digest = [0u8; 20];
    for (slot, (a, b)) in group_digest.iter_mut().zip(hn.iter().zip(hg.iter())) {
        *slot = a ^ b;
    }
    let expected_m1 = hash(&[
        &group_digest,
        &hash(&[srp::USERNAME.as_bytes()]),
        salt,
        &pad(&big_a),
        &pad(&big_b),
        &key,
    ]);
    let m2 = hash(&[&pad(&big_a), &expected_m1, &key]);

    ServerProofs { expected_m1, m2, key }
}

/// Stage-2 challenge dictionary.
pub fn challenge_dict(salt: &[u8], server_public: &[u8]) -> CflValue {
    CflValue::dict(vec![
        ("salt", CflValue::data(salt.to_vec())),
        ("generator", CflValue::data(vec![srp::GENERATOR])),
        ("publicKey", CflValue::data(server_public.to_vec())),
        ("modulus", CflValue::data(srp::MODULUS.to_vec())),
    ])
}

/// Drive the whole verifier role over a link.
///
/// Replies with `m2_override` instead of the real proof when given (to
/// exercise the client's rejection path) and, on the honest path, installs
/// the server cipher before returning the shared key.
pub async fn serve_auth(
    link: &mut DeviceLink,
    password: &str,
    m2_override: Option<[u8; 20]>,
) -> Option<[u8; 20]> {
    let salt: Vec<u8> = (0u8..16).collect();
    let b_secret = [0x42u8; 24];

    // Stage 1
    let stage1 = link.read_message().await;
    assert_eq!(stage1.command, acp_proto::Command::Auth);
    let dict = cflbinary::parse(&stage1.body.unwrap()).unwrap();
    assert_eq!(dict.get("state").and_then(CflValue::as_i64), Some(1));
    assert_eq!(dict.get("username").and_then(CflValue::as_str), Some(srp::USERNAME));

    // Stage 2
    let server_public = server_public_key(password, &salt, &b_secret);
    let body = cflbinary::compose(&challenge_dict(&salt, &server_public));
    link.write_message(&Message::new(acp_proto::Command::Auth, 0, "", Some(body))).await;

    // Stage 3
    let stage3 = link.read_message().await;
    let dict = cflbinary::parse(&stage3.body.unwrap()).unwrap();
    assert_eq!(dict.get("state").and_then(CflValue::as_i64), Some(3));
    let client_public = dict.get("publicKey").and_then(CflValue::as_data).unwrap().to_vec();
    let client_proof = dict.get("response").and_then(CflValue::as_data).unwrap().to_vec();
    let client_iv: [u8; 16] =
        dict.get("iv").and_then(CflValue::as_data).unwrap().try_into().unwrap();

    let proofs = server_proofs(password, &salt, &b_secret, &client_public);
    let m2 = match m2_override {
        Some(bogus) => bogus,
        None => {
            assert_eq!(client_proof, proofs.expected_m1, "client proof mismatch");
            proofs.m2
        },
    };

    // Stage 4
    let server_iv = [0x77u8; 16];
    let confirmation = CflValue::dict(vec![
        ("response", CflValue::data(m2.to_vec())),
        ("iv", CflValue::data(server_iv.to_vec())),
    ]);
    let body = cflbinary::compose(&confirmation);
    link.write_message(&Message::new(acp_proto::Command::Auth, 0, "", Some(body))).await;

    if m2_override.is_some() {
        return None;
    }
    link.enable_encryption(&proofs.key, &client_iv, &server_iv);
    Some(proofs.key)
}
