//! a scripted in-process FTP server, just enough protocol for the client:
//! USER/PASS/TYPE/CWD/PASV/LIST/RETR/QUIT, with knobs for injecting failures.

use std::{
    collections::HashMap,
    io,
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use ftpbrowse::{ServerProfile, ServerProfileBuilder};
use tokio::{
    io::{AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
};

#[derive(Clone)]
pub struct Script {
    pub username: String,
    pub password: String,
    /// USER alone logs in, no PASS round trip.
    pub no_password: bool,
    pub greeting: Vec<String>,
    pub listings: HashMap<String, String>,
    pub files: HashMap<String, Vec<u8>>,
    /// How many PASV replies advertise a port nobody listens on.
    pub broken_pasv: usize,
    /// How many data connections are accepted and then left silent until
    /// the client gives up on them.
    pub stall_data: usize,
    /// Close every RETR with 426 instead of 226.
    pub abort_retr: bool,
    /// Answer LIST with arguments with 501, like servers without `ls` flags.
    pub plain_list_only: bool,
    pub pasv_ip: [u8; 4],
}

impl Default for Script {
    fn default() -> Self {
        Script {
            username: "alice".to_string(),
            password: "wonderland".to_string(),
            no_password: false,
            greeting: vec!["220 mock ftpd ready".to_string()],
            listings: HashMap::new(),
            files: HashMap::new(),
            broken_pasv: 0,
            stall_data: 0,
            abort_retr: false,
            plain_list_only: false,
            pasv_ip: [127, 0, 0, 1],
        }
    }
}

impl Script {
    pub fn with_listing(mut self, dir: &str, listing: &str) -> Self {
        self.listings.insert(dir.to_string(), listing.to_string());
        self
    }

    pub fn with_file(mut self, path: &str, content: &[u8]) -> Self {
        self.files.insert(path.to_string(), content.to_vec());
        self
    }
}

#[derive(Default)]
pub struct Stats {
    pub sessions: AtomicUsize,
    pub logins: AtomicUsize,
    pub pasv: AtomicUsize,
    pub data: AtomicUsize,
    pub lists: AtomicUsize,
    pub retrs: AtomicUsize,
}

impl Stats {
    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

pub struct MockServer {
    pub addr: SocketAddr,
    pub stats: Arc<Stats>,
}

impl MockServer {
    pub async fn start(script: Script) -> MockServer {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let script = Arc::new(script);
        let stats = Arc::new(Stats::default());

        let server_stats = stats.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                server_stats.sessions.fetch_add(1, Ordering::SeqCst);
                let script = script.clone();
                let stats = server_stats.clone();
                tokio::spawn(async move {
                    let _ = handle(stream, script, stats).await;
                });
            }
        });

        MockServer { addr, stats }
    }

    pub fn profile(&self) -> ServerProfileBuilder {
        ServerProfile::builder("127.0.0.1")
            .port(self.addr.port())
            .credentials("alice", "wonderland")
            .timeout(Duration::from_secs(5))
    }
}

async fn reply<W>(w: &mut W, line: &str) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    w.write_all(format!("{line}\r\n").as_bytes()).await
}

/// Holds a data connection open without sending anything. Returns once the
/// client drops its end.
async fn stall(data: &mut TcpStream) -> io::Result<()> {
    let mut buf = [0u8; 64];
    while data.read(&mut buf).await? > 0 {}
    Ok(())
}

fn resolve(cwd: &str, arg: &str) -> String {
    if arg.starts_with('/') {
        arg.to_string()
    } else if cwd == "/" {
        format!("/{arg}")
    } else {
        format!("{cwd}/{arg}")
    }
}

async fn handle(stream: TcpStream, script: Arc<Script>, stats: Arc<Stats>) -> io::Result<()> {
    let (read, mut write) = stream.into_split();
    let mut lines = BufReader::new(read).lines();

    for line in &script.greeting {
        reply(&mut write, line).await?;
    }

    let mut cwd = "/".to_string();
    let mut user = None;
    let mut pending: Option<TcpListener> = None;

    while let Some(line) = lines.next_line().await? {
        let (verb, arg) = line.split_once(' ').unwrap_or((line.as_str(), ""));
        match verb.to_ascii_uppercase().as_str() {
            "USER" => {
                user = Some(arg.to_string());
                if script.no_password && arg == script.username {
                    stats.logins.fetch_add(1, Ordering::SeqCst);
                    reply(&mut write, "230 Anonymous access granted").await?;
                } else {
                    reply(&mut write, "331 Password required").await?;
                }
            }
            "PASS" => {
                if user.as_deref() == Some(script.username.as_str()) && arg == script.password {
                    stats.logins.fetch_add(1, Ordering::SeqCst);
                    reply(&mut write, "230 Login successful.").await?;
                } else {
                    reply(&mut write, "530 Login incorrect.").await?;
                }
            }
            "TYPE" => reply(&mut write, "200 Switching to Binary mode.").await?,
            "CWD" => {
                let target = resolve(&cwd, arg);
                if script.listings.contains_key(&target) {
                    cwd = target;
                    reply(&mut write, "250 Directory successfully changed.").await?;
                } else {
                    reply(&mut write, "550 Failed to change directory.").await?;
                }
            }
            "PASV" => {
                let listener = TcpListener::bind("127.0.0.1:0").await?;
                let port = listener.local_addr()?.port();
                if stats.pasv.fetch_add(1, Ordering::SeqCst) < script.broken_pasv {
                    drop(listener);
                } else {
                    pending = Some(listener);
                }
                let [h1, h2, h3, h4] = script.pasv_ip;
                let msg = format!(
                    "227 Entering Passive Mode ({h1},{h2},{h3},{h4},{},{}).",
                    port >> 8,
                    port & 0xff
                );
                reply(&mut write, &msg).await?;
            }
            "LIST" => {
                if script.plain_list_only && !arg.is_empty() {
                    pending = None;
                    reply(&mut write, "501 Unknown option.").await?;
                    continue;
                }
                let Some(listener) = pending.take() else {
                    reply(&mut write, "425 Use PASV first.").await?;
                    continue;
                };
                stats.lists.fetch_add(1, Ordering::SeqCst);
                reply(&mut write, "150 Here comes the directory listing.").await?;
                let (mut data, _) = listener.accept().await?;
                if stats.data.fetch_add(1, Ordering::SeqCst) < script.stall_data {
                    stall(&mut data).await?;
                    reply(&mut write, "426 Connection closed; transfer aborted.").await?;
                    continue;
                }
                let listing = script.listings.get(&cwd).cloned().unwrap_or_default();
                data.write_all(listing.as_bytes()).await?;
                data.shutdown().await?;
                drop(data);
                reply(&mut write, "226 Directory send OK.").await?;
            }
            "RETR" => {
                let Some(listener) = pending.take() else {
                    reply(&mut write, "425 Use PASV first.").await?;
                    continue;
                };
                stats.retrs.fetch_add(1, Ordering::SeqCst);
                let Some(content) = script.files.get(&resolve(&cwd, arg)) else {
                    reply(&mut write, "550 Failed to open file.").await?;
                    continue;
                };
                reply(&mut write, "150 Opening BINARY mode data connection.").await?;
                let (mut data, _) = listener.accept().await?;
                if stats.data.fetch_add(1, Ordering::SeqCst) < script.stall_data {
                    stall(&mut data).await?;
                    reply(&mut write, "426 Connection closed; transfer aborted.").await?;
                    continue;
                }
                data.write_all(content).await?;
                data.shutdown().await?;
                drop(data);
                if script.abort_retr {
                    reply(&mut write, "426 Connection closed; transfer aborted.").await?;
                } else {
                    reply(&mut write, "226 Transfer complete.").await?;
                }
            }
            "QUIT" => {
                reply(&mut write, "221 Goodbye.").await?;
                break;
            }
            _ => reply(&mut write, "502 Command not implemented.").await?,
        }
    }

    Ok(())
}
