//! The listener and per-connection loop.
//!
//! One task per accepted connection, each running an independent
//! read-decode-dispatch-write loop over a framed codec. Responses for a
//! command are fully flushed before the next command is parsed. Tasks
//! share nothing but the store handle and the listener.

use std::net::SocketAddr;
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::{SinkExt, StreamExt};
use log::{info, warn};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::TlsAcceptor;
use tokio_util::codec::{Decoder as _, Framed, FramedParts};

use mailhouse_imap::response::{Greeting, Response, Status};
use mailhouse_imap::tokio::server::{
    Action, Event, ImapServerCodec, ImapServerCodecError,
};

use crate::config::Config;
use crate::connlog::{ConnectionLogger, LoggedStream};
use crate::dispatch::{Control, Session};
use crate::store::{MessageStore, MAX_BODY_BYTES};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("TLS configuration: {0}")]
    Tls(#[from] tokio_rustls::rustls::Error),
    #[error("no private key found in {0}")]
    NoPrivateKey(String),
}

pub struct Server {
    listener: TcpListener,
    store: Arc<dyn MessageStore>,
    config: Arc<Config>,
    tls: Option<TlsAcceptor>,
    connlog: ConnectionLogger,
}

impl Server {
    pub async fn bind(config: Config, store: Arc<dyn MessageStore>) -> Result<Self, ServerError> {
        let tls = match (&config.tls_cert, &config.tls_key) {
            (Some(cert), Some(key)) => Some(load_tls(cert, key)?),
            _ => None,
        };
        let connlog = ConnectionLogger::open(config.conn_log.as_deref())?;
        let listener = TcpListener::bind(&config.imap_addr).await?;

        Ok(Self {
            listener,
            store,
            config: Arc::new(config),
            tls,
            connlog,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub async fn run(self) -> Result<(), ServerError> {
        loop {
            let (stream, peer) = self.listener.accept().await?;
            info!("connection opened from {peer}");

            let store = Arc::clone(&self.store);
            let config = Arc::clone(&self.config);
            let tls = self.tls.clone();
            let connlog = self.connlog.clone();

            tokio::spawn(async move {
                if let Err(err) = handle_connection(stream, store, config, tls, connlog).await {
                    warn!("connection {peer}: {err}");
                }
                info!("connection closed from {peer}");
            });
        }
    }
}

/// The socket of one connection, before or after `STARTTLS`.
#[derive(Debug)]
pub enum ServerStream {
    Plain(LoggedStream<TcpStream>),
    Tls(Box<tokio_rustls::server::TlsStream<LoggedStream<TcpStream>>>),
}

impl AsyncRead for ServerStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_read(cx, buf),
            Self::Tls(stream) => Pin::new(stream.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for ServerStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        data: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_write(cx, data),
            Self::Tls(stream) => Pin::new(stream.as_mut()).poll_write(cx, data),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_flush(cx),
            Self::Tls(stream) => Pin::new(stream.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_shutdown(cx),
            Self::Tls(stream) => Pin::new(stream.as_mut()).poll_shutdown(cx),
        }
    }
}

type Transport = Framed<ServerStream, ImapServerCodec>;

async fn handle_connection(
    stream: TcpStream,
    store: Arc<dyn MessageStore>,
    config: Arc<Config>,
    tls: Option<TlsAcceptor>,
    connlog: ConnectionLogger,
) -> Result<(), ServerError> {
    let codec = ImapServerCodec::new(MAX_BODY_BYTES);
    let mut framed: Transport = codec.framed(ServerStream::Plain(connlog.wrap(stream)));

    let greeting = if config.no_auth {
        Greeting::preauth("IMAP4rev1 server ready")
    } else {
        Greeting::ok("IMAP4rev1 server ready")
    };
    framed.send(&greeting).await?;

    let mut session = Session::new(store, Arc::clone(&config), tls.is_some());

    loop {
        let event = match framed.next().await {
            None => break,
            Some(Ok(event)) => event,
            Some(Err(err)) => {
                // Parse and framing errors answer BAD and close; the
                // stream can no longer be trusted to be aligned.
                match err {
                    ImapServerCodecError::ParsingFailed {
                        tag,
                        message,
                        diagnostic,
                    } => {
                        warn!("parse error: {message}\n{diagnostic}");
                        let _ = framed
                            .send(&Response::Status(Status::bad(tag, message)))
                            .await;
                    }
                    ImapServerCodecError::Framing(err) => {
                        warn!("framing error: {err}");
                        let _ = framed
                            .send(&Response::Status(Status::bad(None, err.to_string())))
                            .await;
                    }
                    ImapServerCodecError::AuthenticateDataFailed => {
                        let tag = session.take_pending_auth();
                        let _ = framed
                            .send(&Response::Status(Status::bad(
                                tag,
                                "invalid authenticate data",
                            )))
                            .await;
                    }
                    ImapServerCodecError::Io(err) => return Err(err.into()),
                }
                break;
            }
        };

        match event {
            Event::Command(command) => {
                let handled = session.handle(command).await;
                for response in &handled.responses {
                    framed.send(response).await?;
                }

                match handled.control {
                    Control::None => {}
                    Control::ExpectAuthData => framed.codec_mut().expect_authenticate_data(),
                    Control::StartTls => {
                        if let Some(acceptor) = &tls {
                            framed = upgrade_tls(framed, acceptor).await?;
                            session.tls_established();
                        }
                    }
                }

                if !session.ready() {
                    break;
                }
            }
            Event::AuthenticateData(data) => {
                let handled = session.handle_auth_data(data).await;
                for response in &handled.responses {
                    framed.send(response).await?;
                }
            }
            Event::ActionRequired(Action::SendLiteralAck(_)) => {
                framed.send(&Response::Continue).await?;
            }
            Event::ActionRequired(Action::SendLiteralReject { tag, .. }) => {
                framed
                    .send(&Response::Status(Status::no(
                        Some(tag),
                        "message body is too big",
                    )))
                    .await?;
            }
        }
    }

    Ok(())
}

async fn upgrade_tls(framed: Transport, acceptor: &TlsAcceptor) -> Result<Transport, ServerError> {
    let parts = framed.into_parts();

    // Bytes pipelined behind STARTTLS would be plaintext in a TLS-only
    // stream; a conforming client sends nothing until the handshake.
    if !parts.read_buf.is_empty() {
        warn!(
            "discarding {} bytes pipelined behind STARTTLS",
            parts.read_buf.len()
        );
    }

    let io = match parts.io {
        ServerStream::Plain(stream) => {
            ServerStream::Tls(Box::new(acceptor.accept(stream).await?))
        }
        tls @ ServerStream::Tls(_) => tls,
    };

    Ok(Framed::from_parts(FramedParts::new::<&Response>(
        io,
        parts.codec,
    )))
}

fn load_tls(cert_path: &Path, key_path: &Path) -> Result<TlsAcceptor, ServerError> {
    use std::fs::File;
    use std::io::BufReader;

    use tokio_rustls::rustls::{Certificate, PrivateKey, ServerConfig};

    let certs = rustls_pemfile::certs(&mut BufReader::new(File::open(cert_path)?))?
        .into_iter()
        .map(Certificate)
        .collect();

    let mut keys = rustls_pemfile::pkcs8_private_keys(&mut BufReader::new(File::open(key_path)?))?;
    if keys.is_empty() {
        keys = rustls_pemfile::rsa_private_keys(&mut BufReader::new(File::open(key_path)?))?;
    }
    let key = keys
        .into_iter()
        .next()
        .ok_or_else(|| ServerError::NoPrivateKey(key_path.display().to_string()))?;

    let config = ServerConfig::builder()
        .with_safe_defaults()
        .with_no_client_auth()
        .with_single_cert(certs, PrivateKey(key))?;

    Ok(TlsAcceptor::from(Arc::new(config)))
}
