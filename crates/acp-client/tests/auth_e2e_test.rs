//! SRP authentication and encrypted-session behaviour end to end.

mod support;

use std::{sync::Arc, time::Duration};

use acp_client::{AuthError, Client, ClientError};
use acp_crypto::EncryptionContext;
use support::{DeviceLink, serve_auth, serve_get_prop, spawn_device, sy_ap_reply_body};

const PASSWORD: &str = "hunter2!";

#[tokio::test]
async fn authenticate_then_read_encrypted_properties() {
    let port = spawn_device(|mut link: DeviceLink| async move {
        let key = serve_auth(&mut link, PASSWORD, None).await;
        assert!(key.is_some());
        // Everything from here on rides the session ciphers.
        serve_get_prop(&mut link, sy_ap_reply_body(0x77)).await;
    })
    .await;

    let mut client = Client::new("127.0.0.1", port, PASSWORD);
    client.connect().await.unwrap();
    client.authenticate().await.unwrap();
    assert!(client.session().unwrap().is_encrypted());

    let encrypted = client.get_properties(&["syAP"]).await.unwrap();

    // The encrypted read returns the same plaintext bytes an unencrypted
    // read produces against the same device state.
    let plain_port = spawn_device(|mut link: DeviceLink| async move {
        serve_get_prop(&mut link, sy_ap_reply_body(0x77)).await;
    })
    .await;
    let mut plain_client = Client::new("127.0.0.1", plain_port, PASSWORD);
    plain_client.connect().await.unwrap();
    let plaintext = plain_client.get_properties(&["syAP"]).await.unwrap();

    assert_eq!(encrypted, plaintext);
    assert_eq!(encrypted[0].value(), [0x00, 0x00, 0x00, 0x77]);
}

#[tokio::test]
async fn bogus_server_proof_is_a_password_error() {
    let port = spawn_device(|mut link: DeviceLink| async move {
        // Answer stage 4 with twenty zero bytes in place of M2.
        serve_auth(&mut link, PASSWORD, Some([0u8; 20])).await;
        // The connection stays up and unencrypted; serve a plaintext read.
        serve_get_prop(&mut link, sy_ap_reply_body(0x01)).await;
    })
    .await;

    let mut client = Client::new("127.0.0.1", port, PASSWORD);
    client.connect().await.unwrap();

    let err = client.authenticate().await.unwrap_err();
    assert!(matches!(err, ClientError::Auth(AuthError::ProofMismatch)));

    // Authentication failure is not connection-fatal.
    assert!(!err.is_connection_fatal());
    assert!(client.session().unwrap().is_connected());
    assert!(!client.session().unwrap().is_encrypted());

    let props = client.get_properties(&["syAP"]).await.unwrap();
    assert_eq!(props[0].value(), [0x00, 0x00, 0x00, 0x01]);
}

#[tokio::test]
async fn wrong_modulus_is_rejected_before_key_exchange() {
    let port = spawn_device(|mut link: DeviceLink| async move {
        use acp_proto::{CflValue, Message, cflbinary};
        let stage1 = link.read_message().await;
        assert_eq!(stage1.command, acp_proto::Command::Auth);

        // A well-formed challenge over the wrong group.
        let bogus_modulus = vec![0xFFu8; 192];
        let challenge = CflValue::dict(vec![
            ("salt", CflValue::data((0u8..16).collect::<Vec<u8>>())),
            ("generator", CflValue::data(vec![2])),
            ("publicKey", CflValue::data(vec![0x09; 192])),
            ("modulus", CflValue::data(bogus_modulus)),
        ]);
        let body = cflbinary::compose(&challenge);
        link.write_message(&Message::new(acp_proto::Command::Auth, 0, "", Some(body))).await;
    })
    .await;

    let mut client = Client::new("127.0.0.1", port, PASSWORD);
    client.connect().await.unwrap();
    let err = client.authenticate().await.unwrap_err();
    assert!(matches!(err, ClientError::Auth(AuthError::WrongModulus)));
}

#[tokio::test]
async fn concurrent_authenticate_shares_one_handshake() {
    let port = spawn_device(|mut link: DeviceLink| async move {
        // Exactly one handshake must arrive, then one encrypted read.
        serve_auth(&mut link, PASSWORD, None).await;
        serve_get_prop(&mut link, sy_ap_reply_body(0x05)).await;
    })
    .await;

    let mut client = Client::new("127.0.0.1", port, PASSWORD);
    client.connect().await.unwrap();
    let client = Arc::new(client);

    let first = Arc::clone(&client);
    let second = Arc::clone(&client);
    let (a, b) = tokio::join!(first.authenticate(), second.authenticate());
    a.unwrap();
    b.unwrap();

    let props = client.get_properties(&["syAP"]).await.unwrap();
    assert_eq!(props[0].value(), [0x00, 0x00, 0x00, 0x05]);
}

#[tokio::test]
async fn enabling_encryption_twice_is_an_error() {
    let port = spawn_device(|mut link: DeviceLink| async move {
        serve_auth(&mut link, PASSWORD, None).await;
        tokio::time::sleep(Duration::from_millis(500)).await;
    })
    .await;

    let mut client = Client::new("127.0.0.1", port, PASSWORD);
    client.connect().await.unwrap();
    client.authenticate().await.unwrap();

    let stray = EncryptionContext::client(&[0u8; 20], &[0u8; 16], &[1u8; 16]);
    let err = client.session().unwrap().enable_encryption(stray).await.unwrap_err();
    assert!(matches!(err, ClientError::EncryptionState));
}

#[tokio::test]
async fn repeated_authenticate_is_idempotent() {
    let port = spawn_device(|mut link: DeviceLink| async move {
        serve_auth(&mut link, PASSWORD, None).await;
        tokio::time::sleep(Duration::from_millis(500)).await;
    })
    .await;

    let mut client = Client::new("127.0.0.1", port, PASSWORD);
    client.connect().await.unwrap();
    client.authenticate().await.unwrap();
    // The second call observes the installed cipher and does no I/O.
    client.authenticate().await.unwrap();
}
