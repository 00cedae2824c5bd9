//! A small FTP/FTPS client: enough of RFC 959 and RFC 4217 to log in,
//! change directory and store one file over a passive data connection.

use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use rustls::pki_types::ServerName;
use rustls::ClientConfig;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;

use super::{FtpError, Transcript};

/// Anything the control or data channel can run over.
pub trait FtpIo: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> FtpIo for T {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub code: u16,
    /// Full reply as received, continuation lines joined with `\n`.
    pub raw: String,
}

impl Reply {
    /// Text after the status code of the last line.
    pub fn message(&self) -> &str {
        let last = self.raw.lines().last().unwrap_or("");
        last.get(4..).unwrap_or("").trim()
    }
}

/// Connection parameters of one upload.
#[derive(Clone)]
pub struct FtpTarget<'a> {
    pub host: &'a str,
    pub port: u16,
    pub user: &'a str,
    pub password: &'a str,
    pub path: &'a str,
    /// Explicit TLS (`AUTH TLS`) when set.
    pub tls: Option<Arc<ClientConfig>>,
    pub timeout: Duration,
}

pub fn default_tls_config() -> Result<Arc<ClientConfig>, FtpError> {
    let mut roots = rustls::RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let config = ClientConfig::builder_with_provider(Arc::new(
        rustls::crypto::ring::default_provider(),
    ))
    .with_safe_default_protocol_versions()
    .map_err(|e| FtpError::Tls(e.to_string()))?
    .with_root_certificates(roots)
    .with_no_client_auth();
    Ok(Arc::new(config))
}

pub(crate) fn mask_command(command: &str) -> String {
    match command.split_once(' ') {
        Some((verb, _)) if verb.eq_ignore_ascii_case("PASS") => format!("{verb} ****"),
        _ => command.to_string(),
    }
}

/// Port from `227 Entering Passive Mode (h1,h2,h3,h4,p1,p2)`.
pub(crate) fn parse_pasv_port(reply: &str) -> Result<u16, FtpError> {
    let invalid = || FtpError::InvalidPassiveAddress(reply.to_string());
    let open = reply.find('(').ok_or_else(invalid)?;
    let close = reply[open..].find(')').ok_or_else(invalid)? + open;
    let numbers = reply[open + 1..close]
        .split(',')
        .map(|part| part.trim().parse::<u8>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| invalid())?;
    if numbers.len() != 6 {
        return Err(invalid());
    }
    Ok(u16::from(numbers[4]) << 8 | u16::from(numbers[5]))
}

fn parse_code(line: &str) -> Option<u16> {
    let code = line.get(0..3)?;
    if !code.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    code.parse().ok()
}

async fn with_timeout<T, F>(limit: Duration, operation: &str, fut: F) -> Result<T, FtpError>
where
    F: Future<Output = Result<T, FtpError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(FtpError::Timeout(operation.to_string())),
    }
}

pub struct FtpSession<'t> {
    control: BufReader<Box<dyn FtpIo>>,
    peer_ip: IpAddr,
    host: String,
    tls: Option<TlsConnector>,
    timeout: Duration,
    transcript: &'t mut Transcript,
}

impl<'t> FtpSession<'t> {
    /// Open the control connection and read the greeting.
    pub async fn connect(
        host: &str,
        port: u16,
        timeout: Duration,
        transcript: &'t mut Transcript,
    ) -> Result<FtpSession<'t>, FtpError> {
        let stream = with_timeout(timeout, "connect", async {
            Ok::<_, FtpError>(TcpStream::connect((host, port)).await?)
        })
        .await?;
        let peer_ip = stream.peer_addr()?.ip();
        let io: Box<dyn FtpIo> = Box::new(stream);
        Self::over(io, peer_ip, host, timeout, transcript).await
    }

    /// Start a session over an established stream.
    pub async fn over(
        io: Box<dyn FtpIo>,
        peer_ip: IpAddr,
        host: &str,
        timeout: Duration,
        transcript: &'t mut Transcript,
    ) -> Result<FtpSession<'t>, FtpError> {
        let mut session = FtpSession {
            control: BufReader::new(io),
            peer_ip,
            host: host.to_string(),
            tls: None,
            timeout,
            transcript,
        };
        let greeting = session.read_reply().await?;
        session
            .transcript
            .push(format!("Response: {}", greeting.raw));
        if greeting.code != 220 {
            return Err(FtpError::Reply {
                command: "connect".to_string(),
                code: greeting.code,
                text: greeting.message().to_string(),
            });
        }
        Ok(session)
    }

    pub fn note(&mut self, line: impl Into<String>) {
        self.transcript.push(line);
    }

    pub fn is_secure(&self) -> bool {
        self.tls.is_some()
    }

    async fn read_reply(&mut self) -> Result<Reply, FtpError> {
        let limit = self.timeout;
        let control = &mut self.control;
        with_timeout(limit, "read reply", async move {
            let mut lines: Vec<String> = Vec::new();
            let mut code: Option<u16> = None;
            loop {
                let mut line = String::new();
                if control.read_line(&mut line).await? == 0 {
                    return Err(FtpError::Io(std::io::Error::new(
                        std::io::ErrorKind::UnexpectedEof,
                        "control connection closed",
                    )));
                }
                let line = line.trim_end_matches(['\r', '\n']).to_string();
                match code {
                    None => {
                        let parsed =
                            parse_code(&line).ok_or_else(|| FtpError::MalformedReply(line.clone()))?;
                        let multi_line = line.as_bytes().get(3) == Some(&b'-');
                        lines.push(line);
                        if !multi_line {
                            return Ok(Reply {
                                code: parsed,
                                raw: lines.join("\n"),
                            });
                        }
                        code = Some(parsed);
                    }
                    Some(expected) => {
                        let done = parse_code(&line) == Some(expected)
                            && line.as_bytes().get(3) == Some(&b' ');
                        lines.push(line);
                        if done {
                            return Ok(Reply {
                                code: expected,
                                raw: lines.join("\n"),
                            });
                        }
                    }
                }
            }
        })
        .await
    }

    async fn send_line(&mut self, command: &str) -> Result<(), FtpError> {
        let limit = self.timeout;
        let control = self.control.get_mut();
        with_timeout(limit, "send command", async move {
            control.write_all(command.as_bytes()).await?;
            control.write_all(b"\r\n").await?;
            control.flush().await?;
            Ok::<_, FtpError>(())
        })
        .await
    }

    /// Send one command, record it with its reply, check the reply code.
    pub async fn command(&mut self, command: &str, expected: &[u16]) -> Result<Reply, FtpError> {
        let masked = mask_command(command);
        tracing::debug!(command = %masked, "FTP command");
        self.send_line(command).await?;
        let reply = self.read_reply().await?;
        self.transcript.push(format!("Command: {masked}"));
        self.transcript.push(format!("Response: {}", reply.raw));
        if !expected.contains(&reply.code) {
            return Err(FtpError::Reply {
                command: masked,
                code: reply.code,
                text: reply.message().to_string(),
            });
        }
        Ok(reply)
    }

    /// `AUTH TLS`, then continue the control channel over TLS.
    pub async fn upgrade_tls(mut self, config: Arc<ClientConfig>) -> Result<FtpSession<'t>, FtpError> {
        self.command("AUTH TLS", &[234]).await?;
        let connector = TlsConnector::from(config);
        let server_name = ServerName::try_from(self.host.clone())
            .map_err(|e| FtpError::Tls(e.to_string()))?;

        let FtpSession {
            control,
            peer_ip,
            host,
            timeout,
            transcript,
            ..
        } = self;
        let plain = control.into_inner();
        let secured = with_timeout(timeout, "TLS handshake", async {
            connector
                .connect(server_name, plain)
                .await
                .map_err(|e| FtpError::Tls(e.to_string()))
        })
        .await?;
        let io: Box<dyn FtpIo> = Box::new(secured);

        Ok(FtpSession {
            control: BufReader::new(io),
            peer_ip,
            host,
            tls: Some(connector),
            timeout,
            transcript,
        })
    }

    pub async fn login(&mut self, user: &str, password: &str) -> Result<(), FtpError> {
        let reply = self.command(&format!("USER {user}"), &[230, 331]).await?;
        if reply.code == 331 {
            self.command(&format!("PASS {password}"), &[230, 202]).await?;
        }
        Ok(())
    }

    /// Protect the data channel after `AUTH TLS`.
    pub async fn protect_data(&mut self) -> Result<(), FtpError> {
        self.command("PBSZ 0", &[200]).await?;
        self.command("PROT P", &[200]).await?;
        Ok(())
    }

    /// Passive-mode `STOR` of `content` under `file_name`.
    pub async fn store(&mut self, file_name: &str, content: &[u8]) -> Result<(), FtpError> {
        let pasv = self.command("PASV", &[227]).await?;
        let port = parse_pasv_port(&pasv.raw)?;
        // Servers behind NAT often advertise a private address; reuse the
        // control connection's peer instead.
        let addr = SocketAddr::new(self.peer_ip, port);
        let tcp = with_timeout(self.timeout, "data connect", async {
            Ok::<_, FtpError>(TcpStream::connect(addr).await?)
        })
        .await?;

        self.command(&format!("STOR {file_name}"), &[125, 150]).await?;

        let mut data: Box<dyn FtpIo> = match &self.tls {
            Some(connector) => {
                let server_name = ServerName::try_from(self.host.clone())
                    .map_err(|e| FtpError::Tls(e.to_string()))?;
                let secured = with_timeout(self.timeout, "data TLS handshake", async {
                    connector
                        .connect(server_name, tcp)
                        .await
                        .map_err(|e| FtpError::Tls(e.to_string()))
                })
                .await?;
                Box::new(secured)
            }
            None => Box::new(tcp),
        };

        with_timeout(self.timeout, "data transfer", async {
            data.write_all(content).await?;
            data.shutdown().await?;
            Ok::<_, FtpError>(())
        })
        .await?;
        drop(data);

        let done = self.read_reply().await?;
        self.transcript.push(format!("Response: {}", done.raw));
        if done.code != 226 && done.code != 250 {
            return Err(FtpError::Reply {
                command: format!("STOR {file_name}"),
                code: done.code,
                text: done.message().to_string(),
            });
        }
        Ok(())
    }

    pub async fn quit(mut self) -> Result<(), FtpError> {
        self.command("QUIT", &[221]).await?;
        Ok(())
    }
}

/// Full upload sequence: connect, optional TLS, login, `CWD`, binary `STOR`,
/// `QUIT`. Every step lands in `transcript`.
pub async fn store_file(
    target: &FtpTarget<'_>,
    file_name: &str,
    content: &[u8],
    transcript: &mut Transcript,
) -> Result<(), FtpError> {
    let mut session = FtpSession::connect(target.host, target.port, target.timeout, transcript).await?;
    session.note(format!(
        "Connected to FTP server {} on port {}.",
        target.host, target.port
    ));

    if let Some(config) = &target.tls {
        session = session.upgrade_tls(config.clone()).await?;
        session.note("Control connection secured with TLS.");
    }

    session.login(target.user, target.password).await?;
    session.note(format!("Logged in as {}.", target.user));

    if session.is_secure() {
        session.protect_data().await?;
        session.note("Switched to secure data connection.");
    }

    session.command(&format!("CWD {}", target.path), &[250]).await?;
    session.note(format!("Changed directory to {}.", target.path));

    session.command("TYPE I", &[200]).await?;
    session.store(file_name, content).await?;
    session.note(format!("Uploaded file {file_name}."));

    session.quit().await?;
    transcript.push("FTP session closed.");
    Ok(())
}
