//! Minimal FTP server speaking just enough of the protocol for uploads,
//! optionally with explicit TLS (`AUTH TLS`, `PROT P`) on a self-signed cert.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use rustls::{ClientConfig, RootCertStore, ServerConfig};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_rustls::TlsAcceptor;

trait Io: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> Io for T {}

#[derive(Debug, Default)]
pub struct Recorded {
    pub commands: Vec<String>,
    pub files: HashMap<String, Vec<u8>>,
    /// Files whose data connection ran over TLS.
    pub protected_files: Vec<String>,
}

pub struct FakeFtpServer {
    pub addr: SocketAddr,
    recorded: Arc<Mutex<Recorded>>,
    client_tls: Option<Arc<ClientConfig>>,
    _task: JoinHandle<()>,
}

impl FakeFtpServer {
    /// Accepts logins whose password equals `password`; others get 530.
    pub async fn start(password: &str) -> Self {
        Self::spawn(password, None, None).await
    }

    /// Like [`start`](Self::start) but also answers `AUTH TLS`. The client
    /// config returned by [`client_tls`](Self::client_tls) trusts its cert.
    pub async fn start_tls(password: &str) -> Self {
        let rcgen::CertifiedKey { cert, key_pair } =
            rcgen::generate_simple_self_signed(vec!["127.0.0.1".to_string(), "localhost".to_string()])
                .expect("self-signed cert");
        let cert_der: CertificateDer<'static> = cert.der().clone();
        let key_der = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key_pair.serialize_der()));

        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let mut server = ServerConfig::builder_with_provider(provider.clone())
            .with_safe_default_protocol_versions()
            .expect("server protocol versions")
            .with_no_client_auth()
            .with_single_cert(vec![cert_der.clone()], key_der)
            .expect("server cert");
        // Tickets would sit unread on the data channel when the client closes it.
        server.send_tls13_tickets = 0;

        let mut roots = RootCertStore::empty();
        roots.add(cert_der).expect("trust self-signed cert");
        let client = ClientConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .expect("client protocol versions")
            .with_root_certificates(roots)
            .with_no_client_auth();

        Self::spawn(
            password,
            Some(TlsAcceptor::from(Arc::new(server))),
            Some(Arc::new(client)),
        )
        .await
    }

    async fn spawn(
        password: &str,
        acceptor: Option<TlsAcceptor>,
        client_tls: Option<Arc<ClientConfig>>,
    ) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind ftp");
        let addr = listener.local_addr().expect("ftp addr");
        let recorded = Arc::new(Mutex::new(Recorded::default()));
        let password = password.to_string();

        let shared = recorded.clone();
        let task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let shared = shared.clone();
                let password = password.clone();
                let acceptor = acceptor.clone();
                tokio::spawn(async move {
                    let _ = serve(stream, shared, password, acceptor).await;
                });
            }
        });

        Self {
            addr,
            recorded,
            client_tls,
            _task: task,
        }
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Client TLS config trusting this server; `None` for plain servers.
    pub fn client_tls(&self) -> Option<Arc<ClientConfig>> {
        self.client_tls.clone()
    }

    pub fn commands(&self) -> Vec<String> {
        self.recorded.lock().unwrap().commands.clone()
    }

    pub fn file(&self, name: &str) -> Option<Vec<u8>> {
        self.recorded.lock().unwrap().files.get(name).cloned()
    }

    pub fn was_protected(&self, name: &str) -> bool {
        self.recorded
            .lock()
            .unwrap()
            .protected_files
            .iter()
            .any(|f| f == name)
    }
}

async fn reply(control: &mut BufReader<Box<dyn Io>>, text: &str) -> std::io::Result<()> {
    let stream = control.get_mut();
    stream.write_all(text.as_bytes()).await?;
    stream.write_all(b"\r\n").await?;
    stream.flush().await
}

async fn serve(
    stream: TcpStream,
    recorded: Arc<Mutex<Recorded>>,
    password: String,
    acceptor: Option<TlsAcceptor>,
) -> std::io::Result<()> {
    let plain: Box<dyn Io> = Box::new(stream);
    let mut control = BufReader::new(plain);
    let mut passive: Option<TcpListener> = None;
    let mut protect_data = false;
    let mut cwd = String::from("/");

    reply(&mut control, "220 fake ftp ready").await?;

    loop {
        let mut line = String::new();
        if control.read_line(&mut line).await? == 0 {
            return Ok(());
        }
        let line = line.trim_end().to_string();
        recorded.lock().unwrap().commands.push(line.clone());

        let (verb, arg) = match line.split_once(' ') {
            Some((verb, arg)) => (verb.to_ascii_uppercase(), arg.to_string()),
            None => (line.to_ascii_uppercase(), String::new()),
        };

        match (verb.as_str(), &acceptor) {
            ("AUTH", Some(acceptor)) if arg.eq_ignore_ascii_case("TLS") => {
                reply(&mut control, "234 proceed with negotiation").await?;
                let inner = control.into_inner();
                let secured = acceptor.accept(inner).await?;
                let secured: Box<dyn Io> = Box::new(secured);
                control = BufReader::new(secured);
            }
            ("PBSZ", Some(_)) => reply(&mut control, "200 PBSZ=0").await?,
            ("PROT", Some(_)) if arg.eq_ignore_ascii_case("P") => {
                protect_data = true;
                reply(&mut control, "200 protection level set to private").await?;
            }
            ("USER", _) => reply(&mut control, "331 password required").await?,
            ("PASS", _) if arg == password => reply(&mut control, "230 logged in").await?,
            ("PASS", _) => reply(&mut control, "530 login incorrect").await?,
            ("CWD", _) => {
                cwd = arg;
                reply(&mut control, "250 directory changed").await?;
            }
            ("TYPE", _) => reply(&mut control, "200 type set").await?,
            ("PASV", _) => {
                let data = TcpListener::bind("127.0.0.1:0").await?;
                let port = data.local_addr()?.port();
                passive = Some(data);
                let text = format!(
                    "227 Entering Passive Mode (127,0,0,1,{},{}).",
                    port >> 8,
                    port & 0xff
                );
                reply(&mut control, &text).await?;
            }
            ("STOR", _) => {
                let Some(data) = passive.take() else {
                    reply(&mut control, "425 use PASV first").await?;
                    continue;
                };
                reply(&mut control, "150 opening data connection").await?;
                let (conn, _) = data.accept().await?;
                let mut conn: Box<dyn Io> = match (&acceptor, protect_data) {
                    (Some(acceptor), true) => Box::new(acceptor.accept(conn).await?),
                    _ => Box::new(conn),
                };
                let mut content = Vec::new();
                conn.read_to_end(&mut content).await?;
                drop(conn);

                let path = format!("{}/{}", cwd.trim_end_matches('/'), arg);
                {
                    let mut recorded = recorded.lock().unwrap();
                    if protect_data {
                        recorded.protected_files.push(path.clone());
                    }
                    recorded.files.insert(path, content);
                }
                reply(&mut control, "226 transfer complete").await?;
            }
            ("QUIT", _) => {
                reply(&mut control, "221 bye").await?;
                return Ok(());
            }
            _ => reply(&mut control, "502 not implemented").await?,
        }
    }
}
