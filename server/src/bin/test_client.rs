use bincode::{deserialize, serialize};
use clap::Parser;
use server::credentials::expected_mppass;
use shared::{Packet, PROTOCOL_VERSION};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::timeout;

/// Sends one handshake and prints the server's verdict.
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Player name to log in as
    #[clap(short, long, default_value = "TestPlayer")]
    name: String,
    /// Server salt; when given the mppass is computed from it
    #[clap(short, long)]
    salt: Option<String>,
    /// Raw mppass, used when no salt is given
    #[clap(short, long, default_value = "")]
    mppass: String,
    /// Server address
    #[clap(long, default_value = "127.0.0.1:25565")]
    server: SocketAddr,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Create local socket
    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    println!("Client socket bound to {}", socket.local_addr()?);

    let mppass = match &args.salt {
        Some(salt) => expected_mppass(salt, &args.name)?,
        None => args.mppass.clone(),
    };

    let handshake = Packet::Handshake {
        protocol_version: PROTOCOL_VERSION,
        name: args.name.clone(),
        mppass,
    };
    println!("Sending handshake for {} to {}", args.name, args.server);
    socket.send_to(&serialize(&handshake)?, args.server).await?;

    let mut buf = [0u8; 2048];
    println!("Waiting for server response...");
    let (len, addr) = match timeout(Duration::from_secs(5), socket.recv_from(&mut buf)).await {
        Ok(result) => result?,
        Err(_) => {
            println!("No response from server after 5 seconds");
            return Ok(());
        }
    };
    println!("Received {} bytes from {}", len, addr);

    match deserialize::<Packet>(&buf[0..len]) {
        Ok(Packet::Admitted { client_id, rank }) => {
            println!("Admitted with client ID {} as {}", client_id, rank);

            for _ in 0..3 {
                tokio::time::sleep(Duration::from_secs(1)).await;
                socket.send_to(&serialize(&Packet::Heartbeat)?, args.server).await?;
                println!("Sent heartbeat");
            }

            socket.send_to(&serialize(&Packet::Disconnect)?, args.server).await?;
            println!("Sent disconnect");
        }
        Ok(Packet::Kicked { reason, fatal }) => {
            println!("Kicked ({}): {}", if fatal { "fatal" } else { "non-fatal" }, reason);
        }
        Ok(other) => println!("Received packet: {:?}", other),
        Err(e) => println!("Failed to deserialize response: {}", e),
    }

    Ok(())
}
