//! High-level device operations.
//!
//! [`Client`] wraps a [`Session`] with the documented ACP operations:
//! property reads and writes, feature enumeration, firmware upload, echo,
//! reboot, and the SRP authentication handshake that upgrades the session
//! to AES-CTR encryption. Each operation acquires the session queue once and
//! performs its whole request/response conversation under that handle.

use acp_crypto::{EncryptionContext, SrpClient, SrpError, srp};
use acp_proto::{CflValue, Message, Property, cflbinary};
use rand::{RngCore, rngs::OsRng};
use tokio::sync::{Mutex, broadcast};
use tracing::debug;

use crate::{
    error::{AuthError, ClientError, Result, TransportError},
    session::{MonitorEvent, Session, SessionConfig},
};

/// Default ACP port used by every shipped base station.
pub const DEFAULT_PORT: u16 = 5009;

/// High-level ACP client for one base station.
pub struct Client {
    host: String,
    port: u16,
    password: String,
    config: SessionConfig,
    session: Option<Session>,
    /// Serialises authentication attempts so concurrent callers share one
    /// handshake; the loser observes the installed cipher and returns Ok.
    auth_gate: Mutex<()>,
}

impl Client {
    /// Create a client for `host:port` with the admin `password`.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16, password: impl Into<String>) -> Self {
        Self::with_config(host, port, password, SessionConfig::default())
    }

    /// Create a client with explicit transport configuration.
    #[must_use]
    pub fn with_config(
        host: impl Into<String>,
        port: u16,
        password: impl Into<String>,
        config: SessionConfig,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            password: password.into(),
            config,
            session: None,
            auth_gate: Mutex::new(()),
        }
    }

    /// Open the TCP session.
    pub async fn connect(&mut self) -> Result<()> {
        let session = Session::connect_with(&self.host, self.port, self.config.clone()).await?;
        self.session = Some(session);
        Ok(())
    }

    /// Close the session, failing any queued work.
    pub async fn close(&mut self) {
        if let Some(session) = self.session.take() {
            session.close().await;
        }
    }

    /// The underlying session, for advanced callers driving raw exchanges.
    pub fn session(&self) -> Result<&Session> {
        self.session.as_ref().ok_or_else(|| TransportError::NotConnected.into())
    }

    /// Subscribe to unsolicited monitor events.
    pub fn subscribe(&self) -> Result<broadcast::Receiver<MonitorEvent>> {
        Ok(self.session()?.subscribe())
    }

    /// Read `tags` from the device, in order.
    ///
    /// Sends one GetProp whose body lists empty-valued elements for the
    /// requested tags, then reads reply elements until the sentinel.
    ///
    /// # Errors
    ///
    /// [`ClientError::Protocol`] for a non-zero reply error code;
    /// [`ClientError::Property`] when the device flags an individual tag.
    pub async fn get_properties(&self, tags: &[&str]) -> Result<Vec<Property>> {
        let mut body = Vec::with_capacity(tags.len() * acp_proto::ELEMENT_HEADER_SIZE);
        for tag in tags {
            body.extend_from_slice(&Property::request(tag)?.compose());
        }

        let session = self.session()?;
        let mut handle = session.acquire().await?;
        handle.send(&Message::get_prop(&self.password, body).compose()).await?;

        let reply = handle.receive_message_header().await?;
        if reply.error_code != 0 {
            return Err(ClientError::Protocol { command: reply.command, code: reply.error_code });
        }

        let mut props = Vec::new();
        while let Some(prop) = handle.receive_property_element().await? {
            props.push(prop);
        }
        debug!(count = props.len(), "read properties");
        Ok(props)
    }

    /// Write `props` to the device.
    ///
    /// The body carries the populated elements plus the trailing sentinel;
    /// the reply is a stream of per-property acknowledgements read until the
    /// sentinel.
    pub async fn set_properties(&self, props: &[Property]) -> Result<()> {
        let mut body = Vec::new();
        for prop in props {
            body.extend_from_slice(&prop.compose());
        }
        body.extend_from_slice(&Property::sentinel_bytes());

        let session = self.session()?;
        let mut handle = session.acquire().await?;
        handle.send(&Message::set_prop(&self.password, body).compose()).await?;

        let reply = handle.receive_message_header().await?;
        if reply.error_code != 0 {
            return Err(ClientError::Protocol { command: reply.command, code: reply.error_code });
        }

        while let Some(ack) = handle.receive_property_element().await? {
            debug!(tag = %ack.name(), "property acknowledged");
        }
        Ok(())
    }

    /// Enumerate device features as a CFL tree.
    ///
    /// Feat is the one command that always uses the empty-password header
    /// key, so it works before authentication.
    pub async fn get_features(&self) -> Result<CflValue> {
        let session = self.session()?;
        let mut handle = session.acquire().await?;
        handle.send(&Message::feat().compose()).await?;

        let reply = handle.receive_message().await?;
        if reply.error_code != 0 {
            return Err(ClientError::Protocol { command: reply.command, code: reply.error_code });
        }
        let body = reply.body.unwrap_or_default();
        Ok(cflbinary::parse(&body).map_err(acp_proto::FramingError::from)?)
    }

    /// Liveness probe: the device echoes the body back.
    pub async fn echo(&self, payload: Vec<u8>) -> Result<Vec<u8>> {
        let session = self.session()?;
        let mut handle = session.acquire().await?;
        handle.send(&Message::echo(&self.password, payload).compose()).await?;

        let reply = handle.receive_message().await?;
        if reply.error_code != 0 {
            return Err(ClientError::Protocol { command: reply.command, code: reply.error_code });
        }
        Ok(reply.body.unwrap_or_default())
    }

    /// Upload a primary firmware image. The reply body is surfaced
    /// unparsed; interpreting it is firmware-specific.
    pub async fn flash_primary(&self, image: Vec<u8>) -> Result<Vec<u8>> {
        let session = self.session()?;
        let mut handle = session.acquire().await?;
        handle.send(&Message::flash_primary(&self.password, image).compose()).await?;

        let reply = handle.receive_message().await?;
        if reply.error_code != 0 {
            return Err(ClientError::Protocol { command: reply.command, code: reply.error_code });
        }
        Ok(reply.body.unwrap_or_default())
    }

    /// Reboot the device.
    pub async fn reboot(&self) -> Result<()> {
        self.set_properties(&[Property::new("acRB", 0)?]).await
    }

    /// Run the SRP handshake and enable session encryption.
    ///
    /// Idempotent under concurrent calls: simultaneous callers serialise on
    /// an internal gate and every caller after the first successful
    /// handshake returns immediately. A failed handshake (wrong password)
    /// leaves the session connected and unencrypted; callers may retry.
    pub async fn authenticate(&self) -> Result<()> {
        let _gate = self.auth_gate.lock().await;
        let session = self.session()?;
        if session.is_encrypted() {
            return Ok(());
        }

        let mut secret = [0u8; srp::PRIVATE_KEY_SIZE];
        OsRng.fill_bytes(&mut secret);
        let mut client_iv = [0u8; acp_crypto::stream::IV_SIZE];
        OsRng.fill_bytes(&mut client_iv);

        self.run_handshake(session, &secret, client_iv).await?;
        debug!("session encryption enabled");
        Ok(())
    }

    /// Drive the four-message exchange and install the session ciphers.
    ///
    /// The cipher is installed while the exchange still owns the queue, so
    /// no other exchange can put plaintext on an already-encrypted socket.
    async fn run_handshake(
        &self,
        session: &Session,
        secret: &[u8; srp::PRIVATE_KEY_SIZE],
        client_iv: [u8; acp_crypto::stream::IV_SIZE],
    ) -> Result<()> {
        let mut handle = session.acquire().await?;

        // Stage 1: announce the identity.
        let stage1 = CflValue::dict(vec![
            ("state", 1.into()),
            ("username", srp::USERNAME.into()),
        ]);
        handle.send(&Message::auth(&self.password, cflbinary::compose(&stage1)).compose()).await?;

        // Stage 2: salt, group parameters, and the server public key.
        let reply = handle.receive_message().await?;
        if reply.error_code != 0 {
            return Err(ClientError::Protocol { command: reply.command, code: reply.error_code });
        }
        let challenge = cflbinary::parse(&reply.body.unwrap_or_default())
            .map_err(acp_proto::FramingError::from)?;
        let salt = dict_data(&challenge, "salt")?;
        let modulus = dict_data(&challenge, "modulus")?;
        let generator = dict_data(&challenge, "generator")?;
        let server_public = dict_data(&challenge, "publicKey")?;

        if !srp::is_expected_group(&modulus, &generator) {
            return Err(AuthError::WrongModulus.into());
        }

        let srp_client = SrpClient::new(srp::USERNAME, &self.password, secret);
        let verifier = srp_client.process_challenge(&salt, &server_public).map_err(|e| match e {
            SrpError::ZeroServerKey => AuthError::BadServerKey,
            SrpError::ProofMismatch => AuthError::ProofMismatch,
        })?;

        // Stage 3: our public key, proof, and nonce.
        let stage3 = CflValue::dict(vec![
            ("iv", CflValue::data(client_iv.to_vec())),
            ("publicKey", CflValue::data(srp_client.public_key().to_vec())),
            ("state", 3.into()),
            ("response", CflValue::data(verifier.proof().to_vec())),
        ]);
        handle.send(&Message::auth(&self.password, cflbinary::compose(&stage3)).compose()).await?;

        // Stage 4: the server proof and nonce.
        let reply = handle.receive_message().await?;
        if reply.error_code != 0 {
            return Err(ClientError::Protocol { command: reply.command, code: reply.error_code });
        }
        let confirmation = cflbinary::parse(&reply.body.unwrap_or_default())
            .map_err(acp_proto::FramingError::from)?;
        let m2 = dict_data(&confirmation, "response")?;
        let server_iv_bytes = dict_data(&confirmation, "iv")?;
        let Ok(server_iv) = <[u8; acp_crypto::stream::IV_SIZE]>::try_from(server_iv_bytes) else {
            return Err(AuthError::UnexpectedStage("iv").into());
        };

        let shared_key = verifier.verify_server(&m2).map_err(|_| AuthError::ProofMismatch)?;
        let context = EncryptionContext::client(&shared_key, &client_iv, &server_iv);
        session.enable_encryption(context).await?;
        drop(handle);
        Ok(())
    }
}

/// Fetch a required data field from an auth stage dictionary.
fn dict_data(stage: &CflValue, key: &'static str) -> Result<Vec<u8>> {
    stage
        .get(key)
        .and_then(CflValue::as_data)
        .map(<[u8]>::to_vec)
        .ok_or_else(|| AuthError::UnexpectedStage(key).into())
}
