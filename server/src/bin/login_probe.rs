//! Logs in to a running server and prints the response code.

use clap::Parser;
use server::crypto::{load_public_key, public_key_path};
use server::probe::{login, LoginAttempt};
use shared::protocol::DEFAULT_REVISION;
use std::path::PathBuf;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::time::{timeout, Duration};

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Server address to connect to
    #[clap(short, long, default_value = "127.0.0.1:43594")]
    server: String,
    #[clap(short, long)]
    username: String,
    #[clap(short, long)]
    password: String,
    /// Server private key file; its public half is read from beside it
    #[clap(long, default_value = "login_key.pem")]
    key: PathBuf,
    #[clap(long, default_value_t = DEFAULT_REVISION)]
    revision: i16,
    /// Client instance id, needed again to reconnect
    #[clap(long)]
    signlink: Option<i32>,
    /// Reconnect to a player that is still in the world
    #[clap(long)]
    reconnect: bool,
    /// Seconds to keep reading game packets after a successful login
    #[clap(long, default_value = "3")]
    linger: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let public = load_public_key(&public_key_path(&args.key))?;
    let mut stream = TcpStream::connect(&args.server).await?;
    println!("Connected to {}", args.server);

    let mut attempt = LoginAttempt::new(&args.username, &args.password);
    attempt.revision = args.revision;
    if let Some(signlink) = args.signlink {
        attempt.signlink = signlink;
    }
    if args.reconnect {
        attempt = attempt.reconnect();
    }

    let reply = login(&mut stream, &public, &attempt).await?;
    println!("Response: {:?} ({})", reply.code, reply.code.as_byte());
    if let Some(rights) = reply.rights {
        println!("Rights: {}", rights);
    }
    if !reply.code.is_success() {
        return Ok(());
    }
    println!("Signlink: {}", attempt.signlink);

    let mut total = 0usize;
    let mut chunk = [0u8; 1024];
    let deadline = Duration::from_secs(args.linger);
    while let Ok(read) = timeout(deadline, stream.read(&mut chunk)).await {
        match read? {
            0 => {
                println!("Server closed the connection");
                break;
            }
            len => {
                total += len;
                println!("Received {} bytes ({} total)", len, total);
            }
        }
    }

    Ok(())
}
