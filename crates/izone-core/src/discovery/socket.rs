// UDP socket setup and beacon targets.

use std::net::{Ipv4Addr, SocketAddr};

use if_addrs::IfAddr;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tracing::debug;

use crate::error::CoreError;

/// Bind the listening socket on all IPv4 interfaces.
///
/// Broadcast is enabled so the same socket sends the beacon. Address
/// reuse stays off: a second session on the same port must fail.
pub(crate) fn bind(port: u16) -> Result<UdpSocket, CoreError> {
    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
    let bind_error = |source| CoreError::Bind { addr, source };

    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP)).map_err(bind_error)?;
    socket.set_broadcast(true).map_err(bind_error)?;
    socket.set_nonblocking(true).map_err(bind_error)?;
    socket.bind(&addr.into()).map_err(bind_error)?;
    UdpSocket::from_std(socket.into()).map_err(bind_error)
}

/// Where to send the discovery beacon.
///
/// An explicit list is used as given (empty disables beacons).
/// Otherwise every non-loopback IPv4 interface's broadcast address,
/// falling back to the limited broadcast address.
pub(crate) fn broadcast_targets(configured: Option<&[Ipv4Addr]>) -> Vec<Ipv4Addr> {
    if let Some(addresses) = configured {
        return addresses.to_vec();
    }

    let mut targets: Vec<Ipv4Addr> = match if_addrs::get_if_addrs() {
        Ok(interfaces) => interfaces
            .into_iter()
            .filter(|iface| !iface.is_loopback())
            .filter_map(|iface| match iface.addr {
                IfAddr::V4(v4) => v4.broadcast,
                IfAddr::V6(_) => None,
            })
            .collect(),
        Err(e) => {
            debug!(error = %e, "cannot enumerate network interfaces");
            Vec::new()
        }
    };
    targets.sort_unstable();
    targets.dedup();
    if targets.is_empty() {
        targets.push(Ipv4Addr::BROADCAST);
    }
    targets
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn configured_targets_are_used_verbatim() {
        let configured = [Ipv4Addr::new(192, 168, 1, 255)];
        assert_eq!(broadcast_targets(Some(&configured)), configured.to_vec());
        assert!(broadcast_targets(Some(&[])).is_empty());
    }

    #[test]
    fn enumerated_targets_are_never_empty() {
        let targets = broadcast_targets(None);
        assert!(!targets.is_empty());
        assert!(targets.iter().all(|ip| !ip.is_loopback()));
    }

    #[tokio::test]
    async fn second_bind_on_same_port_fails() {
        let first = bind(0).unwrap();
        let port = first.local_addr().unwrap().port();
        let err = bind(port).unwrap_err();
        assert!(matches!(err, CoreError::Bind { addr, .. } if addr.port() == port));
    }
}
