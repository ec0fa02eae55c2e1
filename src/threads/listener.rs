use std::io::{ErrorKind, Read};
use std::net::{TcpListener, TcpStream, UdpSocket};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::{debug, error, info};

use crate::collector::decoder::MessageHeader;
use crate::collector::CollectingProcess;
use crate::error::Error;

// how often a listener re-checks the stop flag while idle
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// UDP transport: one datagram is one IPFIX message.
pub fn listen_udp(cp: &Arc<CollectingProcess>) -> Result<(), Error> {
    let socket = UdpSocket::bind(cp.address())?;
    socket.set_read_timeout(Some(POLL_INTERVAL))?;
    info! {"Listening for UDP datagrams on {}", cp.address()}

    let mut buf = vec![0u8; cp.max_buffer_size() as usize];

    while !cp.is_stopped() {
        match socket.recv_from(&mut buf) {
            Ok((nb_bytes, from)) => {
                debug! {"Received {} bytes from {}", nb_bytes, from}
                if let Err(e) = cp.process_message(&buf[..nb_bytes], from.ip()) {
                    error!("Failed to decode ipfix message from {} : {}", from, e);
                }
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut => {}
            Err(e) => return Err(e.into()),
        }
    }

    info! {"Closing UDP socket on {}", cp.address()}
    Ok(())
}

/// TCP transport: frames the stream into one message's bytes per decode
/// invocation by reading the 16-byte header and then the declared remainder.
pub fn listen_tcp(cp: &Arc<CollectingProcess>) -> Result<(), Error> {
    let listener = TcpListener::bind(cp.address())?;
    listener.set_nonblocking(true)?;
    info! {"Listening for TCP connections on {}", cp.address()}

    while !cp.is_stopped() {
        match listener.accept() {
            Ok((stream, from)) => {
                info! {"Accepted connection from {}", from}
                let cp = cp.clone();
                thread::spawn(move || handle_connection(&cp, stream));
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => thread::sleep(POLL_INTERVAL),
            Err(e) => error!("Connection failed : {}", e),
        }
    }

    info! {"Closing TCP listener on {}", cp.address()}
    Ok(())
}

fn handle_connection(cp: &Arc<CollectingProcess>, mut stream: TcpStream) {
    let peer = match stream.peer_addr() {
        Ok(addr) => addr,
        Err(e) => {
            error!("Failed to read peer address : {}", e);
            return;
        }
    };

    let mut header = [0u8; MessageHeader::SIZE];
    while !cp.is_stopped() {
        if let Err(e) = stream.read_exact(&mut header) {
            if e.kind() != ErrorKind::UnexpectedEof {
                error!("Failed to read message header from {} : {}", peer, e);
            }
            break;
        }

        let total_length = u16::from_be_bytes([header[2], header[3]]) as usize;
        if total_length < MessageHeader::SIZE || total_length > cp.max_buffer_size() as usize {
            error!(
                "Unframeable message length {} from {}, dropping connection",
                total_length, peer
            );
            break;
        }

        let mut buf = vec![0u8; total_length];
        buf[..MessageHeader::SIZE].copy_from_slice(&header);
        if let Err(e) = stream.read_exact(&mut buf[MessageHeader::SIZE..]) {
            error!("Failed to read message body from {} : {}", peer, e);
            break;
        }

        if let Err(e) = cp.process_message(&buf, peer.ip()) {
            error!("Failed to decode ipfix message from {} : {}", peer, e);
        }
    }

    debug! {"Closing connection from {}", peer}
}
