use std::{
    borrow::Cow,
    net::{SocketAddr, ToSocketAddrs as _},
};

use snafu::{OptionExt as _, ResultExt as _};

use crate::{ConfigurationError, InvalidAddress, UnresolvedAddress};

/// Resolves a listen address.
///
/// Accepts `host:port`, where the host may be an IP address or a resolvable name, as well as the `:port` shorthand for
/// listening on all interfaces. The shorthand resolves to the IPv6 unspecified address, which also accepts IPv4 traffic
/// unless the host disables dual-stack sockets.
pub(crate) fn resolve_addr(field: &'static str, addr: &str) -> Result<SocketAddr, ConfigurationError> {
    let addr = addr.trim();
    let expanded = match addr.strip_prefix(':') {
        Some(port) => Cow::Owned(format!("[::]:{}", port)),
        None => Cow::Borrowed(addr),
    };

    expanded
        .to_socket_addrs()
        .context(InvalidAddress { field, address: addr })?
        .next()
        .context(UnresolvedAddress { field, address: addr })
}

#[cfg(test)]
mod tests {
    use std::{
        net::{Ipv4Addr, Ipv6Addr, UdpSocket},
        time::Duration,
    };

    use super::*;

    #[test]
    fn port_shorthand() {
        assert_eq!(
            resolve_addr("UDP", ":6666").unwrap(),
            SocketAddr::from((Ipv6Addr::UNSPECIFIED, 6666))
        );
    }

    #[test]
    fn port_shorthand_receives_ipv6() {
        let listener = UdpSocket::bind(resolve_addr("UDP", ":0").unwrap()).unwrap();
        listener.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        let port = listener.local_addr().unwrap().port();

        let sender = UdpSocket::bind(SocketAddr::from((Ipv6Addr::LOCALHOST, 0))).unwrap();
        sender
            .send_to(b"[    1.000000] hello\n", SocketAddr::from((Ipv6Addr::LOCALHOST, port)))
            .unwrap();

        let mut buf = [0; 64];
        let (len, peer) = listener.recv_from(&mut buf).unwrap();
        assert_eq!(&buf[..len], b"[    1.000000] hello\n");
        assert_eq!(peer.ip(), Ipv6Addr::LOCALHOST);
    }

    #[test]
    fn explicit_hosts() {
        assert_eq!(
            resolve_addr("UDP", "127.0.0.1:6666").unwrap(),
            SocketAddr::from((Ipv4Addr::LOCALHOST, 6666))
        );
        assert_eq!(
            resolve_addr("HTTP", " [::1]:8080 ").unwrap(),
            SocketAddr::from((Ipv6Addr::LOCALHOST, 8080))
        );
    }

    #[test]
    fn malformed() {
        for addr in ["6666", ":", "127.0.0.1", "127.0.0.1:99999"] {
            let error = resolve_addr("UDP", addr).unwrap_err();
            assert!(
                matches!(error, ConfigurationError::InvalidAddress { field: "UDP", .. }),
                "unexpected result for '{}': {}",
                addr,
                error
            );
        }
    }
}
