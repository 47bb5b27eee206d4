//! [`Link`] over a local bridge daemon.
//!
//! The bridge owns the radio. One Unix socket connection carries one hub
//! session as length-prefixed postcard frames ([`nitro_proto::send`]).
//! Replies are read by a background task so that waiting on them is
//! cancel-safe: the session may drop a `wait_program` future at any time.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use nitro_proto::{Program, ProgramId, Request, Response};
use tokio::io::{BufReader, BufWriter};
use tokio::net::UnixStream;
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::{DeviceDescriptor, Discovery, Error, Link, Result};

/// Frames buffered between the socket reader and the session.
const REPLY_BACKLOG: usize = 16;

/// Connects to hubs through the bridge listening on a Unix socket.
#[derive(Debug, Clone)]
pub struct BridgeLink {
    /// Bridge socket path.
    socket: PathBuf,
}

impl BridgeLink {
    /// Creates a link that dials the bridge at `socket` on every open.
    pub fn new(socket: impl Into<PathBuf>) -> Self {
        Self {
            socket: socket.into(),
        }
    }

    /// The bridge socket path.
    pub fn socket(&self) -> &Path {
        &self.socket
    }

    /// Opens a fresh bridge connection.
    async fn dial(&self, op: &'static str) -> Result<BridgeSession> {
        let stream = UnixStream::connect(&self.socket)
            .await
            .map_err(|e| Error::link(op, format!("{}: {e}", self.socket.display())))?;
        Ok(BridgeSession::new(stream))
    }
}

/// One open bridge connection.
#[derive(Debug)]
pub struct BridgeSession {
    /// Request side of the socket.
    writer: BufWriter<OwnedWriteHalf>,
    /// Frames decoded by the reader task.
    replies: mpsc::Receiver<io::Result<Response>>,
    /// Reader task, aborted on drop.
    reader: JoinHandle<()>,
    /// Set while a frame is being written; stays set if that write was
    /// abandoned halfway.
    desynced: bool,
    /// Requests sent whose reply has not been read yet. More than one
    /// means earlier callers gave up waiting.
    owed: usize,
    /// Programs started by installs whose caller gave up waiting.
    orphans: Vec<ProgramId>,
}

impl BridgeSession {
    /// Splits `stream` and starts the reader task.
    fn new(stream: UnixStream) -> Self {
        let (read, write) = stream.into_split();
        let (tx, replies) = mpsc::channel(REPLY_BACKLOG);
        let reader = tokio::spawn(read_replies(read, tx));
        Self {
            writer: BufWriter::new(write),
            replies,
            reader,
            desynced: false,
            owed: 0,
            orphans: Vec::new(),
        }
    }

    /// Writes one request frame.
    async fn send(&mut self, op: &'static str, req: &Request) -> Result<()> {
        if self.desynced {
            return Err(Error::link(op, "bridge stream desynchronized"));
        }
        self.desynced = true;
        nitro_proto::send(&mut self.writer, req)
            .await
            .map_err(|e| io_error(op, e))?;
        self.desynced = false;
        Ok(())
    }

    /// Next frame from the bridge, with hang-ups and socket failures mapped.
    async fn next(&mut self, op: &'static str) -> Result<Response> {
        match self.replies.recv().await {
            Some(Ok(Response::Disconnected)) | None => Err(Error::Disconnected),
            Some(Ok(resp)) => Ok(resp),
            Some(Err(e)) => Err(io_error(op, e)),
        }
    }

    /// Settles one reply frame against the requests still owed one.
    ///
    /// Returns the frame if it answers the newest request, `None` if it
    /// belongs to a request whose caller has gone.
    fn settle(&mut self, resp: Response) -> Option<Response> {
        self.owed = self.owed.saturating_sub(1);
        if self.owed == 0 {
            return Some(resp);
        }
        if let Response::Started { program } = resp {
            tracing::debug!(?program, "program from an abandoned install");
            self.orphans.push(program);
        } else {
            tracing::debug!(?resp, "reply to an abandoned request skipped");
        }
        None
    }

    /// Reply to the newest request. Skips `Exited` frames left over from
    /// abandoned waits and replies owed to abandoned requests.
    async fn reply(&mut self, op: &'static str) -> Result<Response> {
        loop {
            match self.next(op).await? {
                Response::Exited { program, code } => {
                    tracing::debug!(?program, code, "late program exit skipped");
                }
                resp => match self.settle(resp) {
                    Some(Response::Error(message)) => return Err(Error::link(op, message)),
                    Some(resp) => return Ok(resp),
                    None => {}
                },
            }
        }
    }

    /// Sends `req` and returns its reply.
    async fn request(&mut self, op: &'static str, req: &Request) -> Result<Response> {
        self.send(op, req).await?;
        self.owed += 1;
        self.reply(op).await
    }

    /// Sends `req` and expects a bare acknowledgment.
    async fn acknowledge(&mut self, op: &'static str, req: &Request) -> Result<()> {
        match self.request(op, req).await? {
            Response::Ok => Ok(()),
            other => Err(unexpected(op, &other)),
        }
    }
}

impl Drop for BridgeSession {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

/// Decodes frames until the socket fails, forwarding each one.
async fn read_replies(read: OwnedReadHalf, tx: mpsc::Sender<io::Result<Response>>) {
    let mut read = BufReader::new(read);
    loop {
        let frame = nitro_proto::recv::<Response, _>(&mut read).await;
        let failed = frame.is_err();
        if tx.send(frame).await.is_err() || failed {
            break;
        }
    }
}

/// Maps a socket error; a closed socket means the hub session is over.
fn io_error(op: &'static str, e: io::Error) -> Error {
    match e.kind() {
        io::ErrorKind::UnexpectedEof
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::BrokenPipe => Error::Disconnected,
        _ => Error::link(op, e),
    }
}

/// A reply of the wrong kind.
fn unexpected(op: &'static str, resp: &Response) -> Error {
    Error::link(op, format!("unexpected bridge reply {resp:?}"))
}

impl Link for BridgeLink {
    type Handle = BridgeSession;
    type Program = ProgramId;

    async fn open(&self, device: &DeviceDescriptor) -> Result<BridgeSession> {
        let mut session = self.dial("open").await?;
        let req = Request::Connect {
            address: device.address().to_owned(),
        };
        match session.request("open", &req).await? {
            Response::Connected => Ok(session),
            other => Err(unexpected("open", &other)),
        }
    }

    async fn install_program(&self, session: &mut BridgeSession, program: &Program) -> Result<ProgramId> {
        let req = Request::Install {
            name: program.name.clone(),
            source: program.source.clone(),
        };
        match session.request("install", &req).await? {
            Response::Started { program: id } => {
                tracing::debug!(name = %program.name, ?id, "program started");
                Ok(id)
            }
            other => Err(unexpected("install", &other)),
        }
    }

    async fn wait_program(&self, session: &mut BridgeSession, program: &ProgramId) -> Result<()> {
        session
            .send("wait", &Request::Wait { program: *program })
            .await?;
        loop {
            match session.next("wait").await? {
                Response::Exited { program: done, code } if done == *program => {
                    return if code == 0 {
                        Ok(())
                    } else {
                        Err(Error::link("wait", format!("program exited with status {code}")))
                    };
                }
                Response::Exited { program: other, .. } => {
                    tracing::debug!(?other, "late program exit skipped");
                }
                // Still owed to a request whose caller gave up.
                resp if session.owed > 0 => {
                    session.settle(resp);
                }
                Response::Error(message) => return Err(Error::link("wait", message)),
                other => return Err(unexpected("wait", &other)),
            }
        }
    }

    async fn cancel_program(&self, session: &mut BridgeSession, program: &ProgramId) -> Result<()> {
        session
            .acknowledge("stop", &Request::Stop { program: *program })
            .await
    }

    async fn write(&self, session: &mut BridgeSession, bytes: &[u8]) -> Result<()> {
        session
            .acknowledge("write", &Request::Write(bytes.to_vec()))
            .await
    }

    async fn close(&self, mut session: BridgeSession) -> Result<()> {
        for program in std::mem::take(&mut session.orphans) {
            if let Err(e) = session.acknowledge("stop", &Request::Stop { program }).await {
                tracing::debug!(?program, error = %e, "orphaned program not stopped");
            }
        }
        match session.acknowledge("close", &Request::Disconnect).await {
            Err(Error::Disconnected) => Ok(()),
            other => other,
        }
    }
}

impl Discovery for BridgeLink {
    async fn scan(&self, timeout: Duration) -> Result<Vec<DeviceDescriptor>> {
        let mut session = self.dial("scan").await?;
        let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        match session.request("scan", &Request::Scan { timeout_ms }).await? {
            Response::Devices(found) => Ok(found.into_iter().map(DeviceDescriptor::from).collect()),
            other => Err(unexpected("scan", &other)),
        }
    }
}
