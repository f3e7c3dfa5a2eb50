use anyhow::Result;
use pkgcat::test_utils::{CatalogXml, PackageXml, init_test_logging, tar_gz};
use pkgcat::{Registry, RegistryConfig, ReqwestTransport, Status};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use crate::common::{APP_VERSION, read_revision};

/// Serves fixed bodies by path until the test ends; unknown paths get 404.
async fn serve(files: HashMap<String, Vec<u8>>, listener: TcpListener) {
    let files = Arc::new(files);
    loop {
        let Ok((mut socket, _)) = listener.accept().await else {
            return;
        };
        let files = files.clone();
        tokio::spawn(async move {
            let mut request = vec![0u8; 4096];
            let Ok(read) = socket.read(&mut request).await else {
                return;
            };
            let head = String::from_utf8_lossy(&request[..read]).into_owned();
            let path = head.split_whitespace().nth(1).unwrap_or("/").to_string();
            let (status, body) = match files.get(&path) {
                Some(body) => ("200 OK", body.clone()),
                None => ("404 Not Found", Vec::new()),
            };
            let head = format!(
                "HTTP/1.1 {status}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                body.len()
            );
            let _ = socket.write_all(head.as_bytes()).await;
            let _ = socket.write_all(&body).await;
            let _ = socket.shutdown().await;
        });
    }
}

fn catalog_for(addr: SocketAddr, archive: &[u8]) -> String {
    CatalogXml::new("acme")
        .version("3.0.*")
        .package(
            PackageXml::new("plane")
                .dir("AcmePlane")
                .revision(5)
                .url(&format!("http://{addr}/missing.tgz"))
                .url(&format!("http://{addr}/plane.tgz"))
                .archive(archive),
        )
        .build()
}

#[tokio::test]
async fn test_refresh_and_install_over_http() -> Result<()> {
    init_test_logging(None);
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let archive = tar_gz(&[("AcmePlane/plane-set.xml", b"<PropertyList/>")]);

    let mut files = HashMap::new();
    files.insert("/catalog.xml".to_string(), catalog_for(addr, &archive).into_bytes());
    files.insert("/plane.tgz".to_string(), archive);
    let server = tokio::spawn(serve(files, listener));

    let temp = TempDir::new()?;
    let config = RegistryConfig::new(temp.path(), APP_VERSION);
    let transport = ReqwestTransport::new(&config)?;
    let mut registry = Registry::new(config, Box::new(transport))?;

    registry.add_catalog(&format!("http://{addr}/catalog.xml"))?;
    registry.run_until_idle().await;
    assert_eq!(registry.catalog_by_id("acme").unwrap().status(), Status::Refreshed);

    let path = registry.install("acme.plane")?;
    registry.run_until_idle().await;

    let install = registry.install_at(&path).unwrap();
    assert_eq!(install.status(), Status::Success, "one mirror 404s, the other serves");
    assert_eq!(read_revision(&path).as_deref(), Some("5"));
    assert!(path.join("plane-set.xml").is_file());
    assert!(!registry.has_pending_work());

    server.abort();
    Ok(())
}

#[tokio::test]
async fn test_unreachable_catalog_fails_download() -> Result<()> {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        listener.local_addr()?.port()
    };
    let temp = TempDir::new()?;
    let config = RegistryConfig::new(temp.path(), APP_VERSION);
    let transport = ReqwestTransport::new(&config)?;
    let mut registry = Registry::new(config, Box::new(transport))?;

    let url = format!("http://127.0.0.1:{port}/catalog.xml");
    registry.add_catalog(&url)?;
    registry.run_until_idle().await;

    let catalog = registry.catalog_by_url(&url).unwrap();
    assert_eq!(catalog.status(), Status::FailDownload);
    assert!(catalog.needs_refresh(chrono::Utc::now(), 86_400));
    Ok(())
}
