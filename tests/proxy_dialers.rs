//! S5/S6: SOCKS5 and HTTP-CONNECT proxy dialer scenarios (§8), driven over
//! an in-memory duplex pipe standing in for the proxy's TCP connection.

use rdpcore::transport::proxy::{http_connect, socks5_connect, Target};
use std::net::{IpAddr, Ipv4Addr};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// S6: a well-formed HTTP/1.1 200 response completes the CONNECT tunnel.
#[tokio::test]
async fn s6_http_connect_success() {
    let (mut client, mut proxy) = tokio::io::duplex(4096);

    let proxy_task = tokio::spawn(async move {
        let mut buf = vec![0u8; 4096];
        let n = proxy.read(&mut buf).await.unwrap();
        let request = String::from_utf8_lossy(&buf[..n]);
        assert!(request.starts_with("CONNECT rdp.example.com:3389 HTTP/1.1\r\n"));
        proxy
            .write_all(b"HTTP/1.1 200 Connection Established\r\n\r\n")
            .await
            .unwrap();
    });

    let target = Target::Host("rdp.example.com".to_string(), 3389);
    http_connect(&mut client, &target, None).await.unwrap();
    proxy_task.await.unwrap();
}

#[tokio::test]
async fn http_connect_rejects_non_200_status() {
    let (mut client, mut proxy) = tokio::io::duplex(4096);
    let proxy_task = tokio::spawn(async move {
        let mut buf = vec![0u8; 4096];
        let _ = proxy.read(&mut buf).await.unwrap();
        proxy
            .write_all(b"HTTP/1.1 407 Proxy Authentication Required\r\n\r\n")
            .await
            .unwrap();
    });

    let target = Target::Host("rdp.example.com".to_string(), 3389);
    let result = http_connect(&mut client, &target, None).await;
    assert!(result.is_err());
    proxy_task.await.unwrap();
}

/// S5: a SOCKS5 CONNECT to an IPv4 target with no authentication required.
#[tokio::test]
async fn s5_socks5_ipv4_connect_success() {
    let (mut client, mut proxy) = tokio::io::duplex(4096);

    let proxy_task = tokio::spawn(async move {
        let mut greeting = [0u8; 3];
        proxy.read_exact(&mut greeting).await.unwrap();
        assert_eq!(greeting, [0x05, 0x01, 0x00]);
        proxy.write_all(&[0x05, 0x00]).await.unwrap();

        let mut request = [0u8; 10];
        proxy.read_exact(&mut request).await.unwrap();
        assert_eq!(request[0], 0x05);
        assert_eq!(request[1], 0x01); // CONNECT
        assert_eq!(request[3], 0x01); // ATYP_IPV4
        assert_eq!(&request[4..8], &[10, 0, 0, 5]);

        proxy
            .write_all(&[0x05, 0x00, 0x00, 0x01, 0, 0, 0, 0, 0, 0])
            .await
            .unwrap();
    });

    let target = Target::Ip(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5)), 3389);
    socks5_connect(&mut client, &target, None).await.unwrap();
    proxy_task.await.unwrap();
}

#[tokio::test]
async fn socks5_connect_maps_refused_status_to_error() {
    let (mut client, mut proxy) = tokio::io::duplex(4096);
    let proxy_task = tokio::spawn(async move {
        let mut greeting = [0u8; 3];
        proxy.read_exact(&mut greeting).await.unwrap();
        proxy.write_all(&[0x05, 0x00]).await.unwrap();

        let mut request = [0u8; 10];
        proxy.read_exact(&mut request).await.unwrap();
        proxy
            .write_all(&[0x05, 0x05, 0x00, 0x01, 0, 0, 0, 0, 0, 0])
            .await
            .unwrap();
    });

    let target = Target::Ip(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5)), 3389);
    let result = socks5_connect(&mut client, &target, None).await;
    assert!(result.is_err());
    proxy_task.await.unwrap();
}
