mod support;

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use netreq::prelude::{Client, ErrorKind, RequestConfig};
use netreq::transport::TransportKind;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};

/// HTTPS listener presenting a freshly generated self-signed certificate.
struct TlsServer {
    address: SocketAddr,
    join: Option<JoinHandle<()>>,
}

impl TlsServer {
    fn start(connections: usize) -> Self {
        support::init_tracing();

        let certified = rcgen::generate_simple_self_signed(vec!["127.0.0.1".to_owned()])
            .expect("generate self-signed certificate");
        let cert: CertificateDer<'static> = certified.cert.der().clone();
        let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(
            certified.key_pair.serialize_der(),
        ));
        let config = rustls::ServerConfig::builder_with_provider(Arc::new(
            rustls::crypto::ring::default_provider(),
        ))
        .with_safe_default_protocol_versions()
        .expect("tls protocol versions")
        .with_no_client_auth()
        .with_single_cert(vec![cert], key)
        .expect("server certificate");
        let config = Arc::new(config);

        let listener = TcpListener::bind("127.0.0.1:0").expect("bind tls listener");
        let address = listener.local_addr().expect("read local address");
        listener
            .set_nonblocking(true)
            .expect("set listener nonblocking");

        let join = thread::spawn(move || {
            let deadline = Instant::now() + Duration::from_secs(5);
            let mut handled = 0;
            while handled < connections && Instant::now() < deadline {
                match listener.accept() {
                    Ok((stream, _)) => {
                        handled += 1;
                        // handshake failures are expected when the client verifies
                        let _ = serve(stream, Arc::clone(&config));
                    }
                    Err(error) if error.kind() == std::io::ErrorKind::WouldBlock => {
                        thread::sleep(Duration::from_millis(10));
                    }
                    Err(_) => break,
                }
            }
        });

        Self {
            address,
            join: Some(join),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("https://{}{}", self.address, path)
    }
}

impl Drop for TlsServer {
    fn drop(&mut self) {
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

fn serve(stream: TcpStream, config: Arc<rustls::ServerConfig>) -> std::io::Result<()> {
    stream.set_nonblocking(false)?;
    stream.set_read_timeout(Some(Duration::from_secs(5)))?;
    let connection = rustls::ServerConnection::new(config).map_err(std::io::Error::other)?;
    let mut tls = rustls::StreamOwned::new(connection, stream);

    let mut request = Vec::new();
    let mut chunk = [0_u8; 1024];
    while !request.windows(4).any(|window| window == b"\r\n\r\n") {
        let read = tls.read(&mut chunk)?;
        if read == 0 {
            return Ok(());
        }
        request.extend_from_slice(&chunk[..read]);
    }

    tls.write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 6\r\nConnection: close\r\n\r\nsecure")?;
    tls.conn.send_close_notify();
    tls.flush()
}

fn platform_client() -> Client {
    Client::builder()
        .transport(TransportKind::Platform)
        .default_timeout(Duration::from_secs(5))
        .try_build()
        .expect("client should build")
}

#[test]
fn self_signed_certificate_fails_validation() {
    let server = TlsServer::start(1);

    let response = platform_client().get(
        &server.url("/secure"),
        &RequestConfig::new().with_max_retries(2),
    );

    assert_eq!(response.status_code(), 0);
    assert!(!response.is_success());
    assert_eq!(response.attempts(), 1);
    assert_eq!(
        response.error_kind(),
        Some(ErrorKind::TlsValidationFailed),
        "{:?}",
        response.error()
    );
}

#[test]
fn disabled_verification_accepts_self_signed_certificate() {
    let server = TlsServer::start(1);

    let response = platform_client().get(
        &server.url("/secure"),
        &RequestConfig::new().with_verify_tls(false),
    );

    assert_eq!(response.status_code(), 200, "{:?}", response.error());
    assert!(response.is_success());
    assert_eq!(response.text_lossy(), "secure");
}
