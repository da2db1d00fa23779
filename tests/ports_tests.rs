use lan_discover_rs::ports::{catalogue_ports, scan_ports, service_label, CATALOGUE};
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;
use tokio::net::TcpListener;

const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

#[test]
fn catalogue_matches_known_services() {
    assert_eq!(
        catalogue_ports(),
        vec![22, 80, 443, 3306, 5432, 5900, 6443, 8006, 8080, 8443, 9090, 9100]
    );
    for e in CATALOGUE {
        assert_eq!(service_label(e.port), Some(e.label));
    }
}

/// A port that nothing listens on (bound, then released).
async fn closed_port() -> u16 {
    let l = TcpListener::bind("127.0.0.1:0").await.unwrap();
    l.local_addr().unwrap().port()
}

#[tokio::test]
async fn listener_is_open_and_released_port_is_closed() {
    let a = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let b = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let pa = a.local_addr().unwrap().port();
    let pb = b.local_addr().unwrap().port();
    let closed = closed_port().await;

    let open = scan_ports(LOCALHOST, &[pb, closed, pa, pb], Duration::from_millis(500)).await;

    let mut expected = vec![pa, pb];
    expected.sort_unstable();
    assert_eq!(open, expected);
}

#[tokio::test]
async fn empty_port_list_scans_nothing() {
    assert!(scan_ports(LOCALHOST, &[], Duration::from_millis(100))
        .await
        .is_empty());
}
