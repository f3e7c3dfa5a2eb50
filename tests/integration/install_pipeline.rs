use anyhow::Result;
use pkgcat::Status;
use pkgcat::test_utils::{CatalogXml, MockResponse, PackageXml, RegistryEvent, md5_hex, tar_gz, zip_archive};
use pretty_assertions::assert_eq;
use std::cell::RefCell;
use std::rc::Rc;

use crate::common::{CATALOG_URL, TestRegistry, dir_entries, read_revision};

const U1: &str = "https://mirror-1.example.org/plane.tgz";
const U2: &str = "https://mirror-2.example.org/plane.tgz";
const U3: &str = "https://mirror-3.example.org/plane.tgz";

fn plane_archive() -> Vec<u8> {
    tar_gz(&[
        ("AcmePlane/plane-set.xml", b"<PropertyList/>"),
        ("AcmePlane/Models/plane.ac", b"AC3Db"),
    ])
}

fn acme_catalog(archive: &[u8], revision: u32, mirrors: &[&str]) -> CatalogXml {
    let package = mirrors.iter().fold(
        PackageXml::new("plane").name("Acme Plane").dir("AcmePlane").revision(revision).archive(archive),
        |package, url| package.url(url),
    );
    CatalogXml::new("acme").url(CATALOG_URL).version("3.0.*").package(package)
}

#[test]
fn test_end_to_end_install() -> Result<()> {
    let mut env = TestRegistry::new()?;
    let archive = plane_archive();
    env.serve_archive(&[U1, U2], &archive);
    env.add_main_catalog(&acme_catalog(&archive, 5, &[U1, U2]))?;
    assert_eq!(env.registry.catalog_by_id("acme").unwrap().status(), Status::Refreshed);

    let path = env.install_now("acme.plane")?;

    assert_eq!(path, env.root().join("acme").join("AcmePlane"));
    let install = env.registry.install_at(&path).unwrap();
    assert_eq!(install.status(), Status::Success);
    assert_eq!(install.revision(), 5);
    assert_eq!(read_revision(&path).as_deref(), Some("5"));
    assert!(path.join("plane-set.xml").is_file());
    assert!(path.join("Models/plane.ac").is_file());

    let requests = env.transport.requests();
    assert_eq!(requests.len(), 2, "catalog plus one archive download");
    assert!(requests[1] == U1 || requests[1] == U2);
    assert_eq!(dir_entries(&env.root().join("acme")), vec![".timestamp", "AcmePlane", "catalog.xml"]);

    let outcomes = env.delegate.outcomes();
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].package_id, "acme.plane");
    assert!(outcomes[0].is_success());
    Ok(())
}

#[test]
fn test_zip_archives_install_too() -> Result<()> {
    let mut env = TestRegistry::new()?;
    let archive = zip_archive(&[("AcmePlane/plane-set.xml", b"<PropertyList/>")]);
    env.serve_archive(&[U1], &archive);
    env.add_main_catalog(&acme_catalog(&archive, 1, &[U1]))?;

    let path = env.install_now("plane")?;
    assert_eq!(env.registry.install_at(&path).unwrap().status(), Status::Success);
    assert!(path.join("plane-set.xml").is_file());
    Ok(())
}

#[test]
fn test_callbacks_and_progress() -> Result<()> {
    let mut env = TestRegistry::new()?;
    let archive = plane_archive();
    env.transport.route(U1, MockResponse::ok(archive.clone()).chunked(64));
    env.add_main_catalog(&acme_catalog(&archive, 2, &[U1]))?;

    let path = env.registry.install("acme.plane")?;
    let progress = Rc::new(RefCell::new(Vec::new()));
    let finished = Rc::new(RefCell::new(None));
    {
        let install = env.registry.install_at_mut(&path).unwrap();
        assert!(install.is_downloading());
        let seen = progress.clone();
        install.on_progress(move |done, total| seen.borrow_mut().push((done, total)));
        let slot = finished.clone();
        install.on_done(move |outcome| *slot.borrow_mut() = Some(outcome.revision));
        install.on_fail(|outcome| panic!("unexpected failure: {outcome:?}"));
    }
    env.registry.poll();

    let progress = progress.borrow();
    assert_eq!(progress.len(), archive.len().div_ceil(64));
    assert_eq!(progress.last(), Some(&(archive.len() as u64, archive.len() as u64)));
    assert_eq!(*finished.borrow(), Some(2));

    // A late subscriber is told right away
    let late = Rc::new(RefCell::new(false));
    let flag = late.clone();
    env.registry.install_at_mut(&path).unwrap().on_always(move |_| *flag.borrow_mut() = true);
    assert!(*late.borrow());

    let delegate_progress = env
        .delegate
        .events()
        .into_iter()
        .filter(|e| matches!(e, RegistryEvent::Progress { .. }))
        .count();
    assert_eq!(delegate_progress, progress.len());
    Ok(())
}

#[test]
fn test_checksum_mismatch_leaves_target_absent() -> Result<()> {
    let mut env = TestRegistry::new()?;
    let archive = plane_archive();
    let catalog = CatalogXml::new("acme").version("3.0.*").package(
        PackageXml::new("plane").dir("AcmePlane").revision(1).md5(&md5_hex(b"something else")).url(U1).url(U2),
    );
    env.serve_archive(&[U1, U2], &archive);
    env.add_main_catalog(&catalog)?;

    let path = env.install_now("plane")?;

    let install = env.registry.install_at(&path).unwrap();
    assert_eq!(install.status(), Status::FailChecksum);
    assert!(!install.is_installed());
    assert!(!path.exists());
    assert_eq!(env.transport.request_count(), 3, "both mirrors tried");
    assert_eq!(dir_entries(&env.root().join("acme")), vec![".timestamp", "catalog.xml"]);
    Ok(())
}

#[test]
fn test_mirror_fallback_after_transport_failures() -> Result<()> {
    let mut env = TestRegistry::new()?;
    let archive = plane_archive();
    env.add_main_catalog(&acme_catalog(&archive, 4, &[U1, U2, U3]))?;
    env.transport.push_response(MockResponse::fail("connection refused"));
    env.transport.push_response(MockResponse::broken(archive[..archive.len() / 2].to_vec()));
    env.transport.push_response(MockResponse::ok(archive.clone()));

    let path = env.install_now("acme.plane")?;

    let install = env.registry.install_at(&path).unwrap();
    assert_eq!(install.status(), Status::Success);
    assert_eq!(install.revision(), 4);
    let mut downloads: Vec<String> = env.transport.requests().split_off(1);
    downloads.sort();
    assert_eq!(downloads, vec![U1, U2, U3], "each mirror tried exactly once");
    Ok(())
}

#[test]
fn test_every_mirror_failing_surfaces_last_status() -> Result<()> {
    let mut env = TestRegistry::new()?;
    let archive = plane_archive();
    env.add_main_catalog(&acme_catalog(&archive, 1, &[U1, U2]))?;
    env.transport.route(U1, MockResponse::status(404));
    env.transport.route(U2, MockResponse::status(404));

    let path = env.install_now("plane")?;
    assert_eq!(env.registry.install_at(&path).unwrap().status(), Status::FailNotFound);
    assert_eq!(env.transport.request_count(), 3);
    Ok(())
}

#[test]
fn test_broken_archive_is_not_retried() -> Result<()> {
    let mut env = TestRegistry::new()?;
    let archive = tar_gz(&[("Elsewhere/file", b"x")]);
    env.serve_archive(&[U1, U2], &archive);
    env.add_main_catalog(&acme_catalog(&archive, 1, &[U1, U2]))?;

    let path = env.install_now("plane")?;
    assert_eq!(env.registry.install_at(&path).unwrap().status(), Status::FailExtract);
    assert_eq!(env.transport.request_count(), 2, "extraction failures end the download");
    assert!(!path.exists());
    Ok(())
}

#[test]
fn test_failed_update_keeps_previous_install() -> Result<()> {
    let mut env = TestRegistry::new()?;
    let archive = plane_archive();
    env.serve_archive(&[U1], &archive);
    env.add_main_catalog(&acme_catalog(&archive, 1, &[U1]))?;
    let path = env.install_now("plane")?;

    // Revision 2 is announced but every download of it is cut short
    let newer = tar_gz(&[("AcmePlane/plane-set.xml", b"<PropertyList><v>2</v></PropertyList>")]);
    env.serve_catalog(CATALOG_URL, &acme_catalog(&newer, 2, &[U1]));
    env.registry.refresh(true);
    env.registry.poll();
    env.transport.route(U1, MockResponse::broken(newer[..newer.len() - 8].to_vec()));

    assert_eq!(env.registry.packages_needing_update().len(), 1);
    assert_eq!(env.registry.schedule_all_updates(), 1);
    env.registry.poll();

    let install = env.registry.install_at(&path).unwrap();
    assert_eq!(install.status(), Status::FailDownload);
    assert_eq!(install.revision(), 1);
    assert_eq!(read_revision(&path).as_deref(), Some("1"));
    assert_eq!(std::fs::read_to_string(path.join("plane-set.xml"))?, "<PropertyList/>");
    assert_eq!(dir_entries(&env.root().join("acme")), vec![".timestamp", "AcmePlane", "catalog.xml"]);

    // The next attempt replaces the content as a whole
    env.transport.route(U1, MockResponse::ok(newer.clone()));
    env.registry.schedule_all_updates();
    env.registry.poll();
    let install = env.registry.install_at(&path).unwrap();
    assert_eq!(install.status(), Status::Success);
    assert_eq!(read_revision(&path).as_deref(), Some("2"));
    assert!(!path.join("Models").exists(), "old files do not survive the swap");
    assert!(env.registry.packages_needing_update().is_empty());
    Ok(())
}

#[test]
fn test_second_start_update_is_a_no_op() -> Result<()> {
    let mut env = TestRegistry::new()?;
    let archive = plane_archive();
    env.transport.route(U1, MockResponse::hold());
    env.add_main_catalog(&acme_catalog(&archive, 1, &[U1]))?;

    let path = env.registry.mark_for_install("plane")?;
    env.registry.start_update(&path)?;
    env.registry.start_update(&path)?;
    env.registry.schedule_to_update(&path)?;

    assert_eq!(env.transport.requests_for(U1), 1);
    let staging: Vec<String> = dir_entries(&env.root().join("acme"))
        .into_iter()
        .filter(|name| name.starts_with("_extract_"))
        .collect();
    assert_eq!(staging.len(), 1);
    assert_eq!(env.registry.install_at(&path).unwrap().download_url(), Some(U1));
    Ok(())
}
