use core::net::Ipv4Addr;

use embassy_net::{dns::DnsQueryType, tcp::TcpSocket, IpAddress, Stack};
use embassy_time::Duration;

/// Idle timeout of the broker socket; keep-alive pings land well inside it
const SOCKET_TIMEOUT_SECS: u64 = 90;

#[derive(Debug)]
pub enum Error {
    #[allow(dead_code)]
    DNSQueryFailed(embassy_net::dns::Error),
    DNSLookupFailed,
    #[allow(dead_code)]
    SocketConnectionError(embassy_net::tcp::ConnectError),
}

/// Open a TCP session to `hostname:port`. Dotted IPv4 literals skip DNS.
pub async fn connect<'a>(
    stack: Stack<'static>,
    rx_buffer: &'a mut [u8],
    tx_buffer: &'a mut [u8],
    hostname: &str,
    port: u16,
) -> Result<TcpSocket<'a>, Error> {
    let mut socket = TcpSocket::new(stack, rx_buffer, tx_buffer);
    socket.set_timeout(Some(Duration::from_secs(SOCKET_TIMEOUT_SECS)));

    let addr = match parse_ipv4(hostname) {
        Some(addr) => addr,
        None => stack
            .dns_query(hostname, DnsQueryType::A)
            .await
            .map_err(Error::DNSQueryFailed)?
            .first()
            .copied()
            .ok_or(Error::DNSLookupFailed)?,
    };

    log::info!("Connecting TCP socket to {}:{}", hostname, port);
    socket
        .connect((addr, port))
        .await
        .map_err(Error::SocketConnectionError)?;
    log::info!("TCP connected");

    Ok(socket)
}

fn parse_ipv4(host: &str) -> Option<IpAddress> {
    host.parse::<Ipv4Addr>().ok().map(IpAddress::Ipv4)
}
