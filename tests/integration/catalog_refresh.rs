use anyhow::Result;
use pkgcat::Status;
use pkgcat::test_utils::{CatalogXml, MockResponse, PackageXml, RegistryEvent, tar_gz};
use pretty_assertions::assert_eq;

use crate::common::{CATALOG_URL, TestRegistry, dir_entries};

fn main_catalog() -> CatalogXml {
    CatalogXml::new("main")
        .url(CATALOG_URL)
        .version("3.0.*")
        .package(PackageXml::new("c172").revision(2))
        .package(PackageXml::new("dr400").revision(1))
}

#[test]
fn test_refresh_writes_cache_and_reports() -> Result<()> {
    let mut env = TestRegistry::new()?;
    env.add_main_catalog(&main_catalog())?;

    let catalog = env.registry.catalog_by_id("main").expect("catalog registered");
    assert_eq!(catalog.status(), Status::Refreshed);
    assert!(catalog.retrieved_time().is_some());
    assert_eq!(catalog.packages().len(), 2);
    assert_eq!(dir_entries(&env.root().join("main")), vec![".timestamp", "catalog.xml"]);

    let events = env.delegate.events();
    assert!(events.contains(&RegistryEvent::CatalogRefreshed {
        url: CATALOG_URL.to_string(),
        status: Status::Refreshed,
    }));
    assert!(events.contains(&RegistryEvent::PackagesChanged));
    Ok(())
}

#[test]
fn test_refresh_twice_is_idempotent() -> Result<()> {
    let mut env = TestRegistry::new()?;
    env.add_main_catalog(&main_catalog())?;
    let before: Vec<String> =
        env.registry.catalog_by_id("main").unwrap().packages().iter().map(|p| p.qualified_id()).collect();

    env.registry.refresh(true);
    env.registry.poll();

    let catalog = env.registry.catalog_by_id("main").unwrap();
    let after: Vec<String> = catalog.packages().iter().map(|p| p.qualified_id()).collect();
    assert_eq!(before, after);
    assert!(catalog.orphans().is_empty());
    assert_eq!(catalog.status(), Status::Refreshed);
    assert_eq!(env.transport.requests_for(CATALOG_URL), 2);
    Ok(())
}

#[test]
fn test_fresh_catalog_is_not_refetched() -> Result<()> {
    let mut env = TestRegistry::new()?;
    env.add_main_catalog(&main_catalog())?;

    env.registry.refresh(false);
    env.registry.poll();
    assert_eq!(env.transport.requests_for(CATALOG_URL), 1);
    Ok(())
}

#[test]
fn test_version_gate_makes_catalog_inert() -> Result<()> {
    let mut env = TestRegistry::new()?;
    let catalog = CatalogXml::new("main").version("2.*").package(PackageXml::new("c172"));
    env.add_main_catalog(&catalog)?;

    let catalog = env.registry.catalog_by_url(CATALOG_URL).unwrap();
    assert_eq!(catalog.status(), Status::FailVersion);
    assert!(!catalog.is_enabled());
    assert!(catalog.packages().is_empty());
    assert!(!env.root().join("main").exists());
    assert!(env.registry.install("c172").is_err());
    Ok(())
}

#[test]
fn test_failed_refresh_keeps_previous_metadata() -> Result<()> {
    let mut env = TestRegistry::new()?;
    env.add_main_catalog(&main_catalog())?;

    env.transport.route(CATALOG_URL, MockResponse::ok("<PropertyList><id>main"));
    env.registry.refresh(true);
    env.registry.poll();
    let catalog = env.registry.catalog_by_id("main").unwrap();
    assert_eq!(catalog.status(), Status::FailExtract);
    assert_eq!(catalog.packages().len(), 2);

    env.transport.route(CATALOG_URL, MockResponse::fail("timeout"));
    env.registry.refresh(true);
    env.registry.poll();
    let catalog = env.registry.catalog_by_id("main").unwrap();
    assert_eq!(catalog.status(), Status::FailDownload);
    assert!(catalog.is_enabled(), "cached metadata stays usable offline");
    assert_eq!(env.registry.package_by_id("main.c172").unwrap().revision(), 2);
    Ok(())
}

#[test]
fn test_one_invalid_package_rejects_the_document() -> Result<()> {
    let mut env = TestRegistry::new()?;
    env.add_main_catalog(&main_catalog())?;

    let broken = main_catalog().package(PackageXml::new("nameless").name(""));
    env.serve_catalog(CATALOG_URL, &broken);
    env.registry.refresh(true);
    env.registry.poll();

    let catalog = env.registry.catalog_by_id("main").unwrap();
    assert_eq!(catalog.status(), Status::FailValidation);
    assert!(catalog.package_by_id("nameless").is_none());
    assert_eq!(catalog.packages().len(), 2);
    Ok(())
}

#[test]
fn test_paths_outside_the_catalog_are_rejected() -> Result<()> {
    let mut env = TestRegistry::new()?;
    let victim = env.root().join("victim");
    std::fs::create_dir_all(&victim)?;
    std::fs::write(victim.join("keep.txt"), "x")?;

    let hostile = CatalogXml::new("main")
        .url(CATALOG_URL)
        .version("3.0.*")
        .package(PackageXml::new("evil").dir("../victim"));
    env.add_main_catalog(&hostile)?;

    let catalog = env.registry.catalog_by_url(CATALOG_URL).unwrap();
    assert_eq!(catalog.status(), Status::FailValidation);
    assert!(env.registry.mark_for_install("evil").is_err());
    assert!(env.registry.catalog_by_id("..").is_none());

    env.serve_catalog(CATALOG_URL, &CatalogXml::new("..").version("3.0.*"));
    env.registry.refresh(true);
    env.registry.poll();
    assert_eq!(env.registry.catalog_by_url(CATALOG_URL).unwrap().status(), Status::FailValidation);

    assert!(victim.join("keep.txt").is_file());
    Ok(())
}

#[test]
fn test_dropped_package_becomes_orphan_and_keeps_content() -> Result<()> {
    let mut env = TestRegistry::new()?;
    let archive = tar_gz(&[("dr400/model.ac", b"AC3D")]);
    let catalog = CatalogXml::new("main")
        .version("3.0.*")
        .package(PackageXml::new("c172").revision(2))
        .package(PackageXml::new("dr400").revision(1).url("https://cdn/dr400.tgz").archive(&archive));
    env.serve_archive(&["https://cdn/dr400.tgz"], &archive);
    env.add_main_catalog(&catalog)?;
    let path = env.install_now("main.dr400")?;
    assert!(env.registry.install_at(&path).unwrap().is_installed());

    let without = CatalogXml::new("main").version("3.0.*").package(PackageXml::new("c172").revision(2));
    env.serve_catalog(CATALOG_URL, &without);
    env.registry.refresh(true);
    env.registry.poll();

    let catalog = env.registry.catalog_by_id("main").unwrap();
    assert!(catalog.package_by_id("dr400").is_none());
    assert_eq!(catalog.orphans().len(), 1);
    assert!(path.join("model.ac").is_file(), "orphaned content is not deleted");

    let installed: Vec<String> = env.registry.installed_packages().iter().map(|p| p.qualified_id()).collect();
    assert_eq!(installed, vec!["main.dr400"]);
    assert!(env.registry.packages_needing_update().is_empty());
    Ok(())
}

#[test]
fn test_reload_from_disk() -> Result<()> {
    let mut env = TestRegistry::new()?;
    let archive = tar_gz(&[("c172/f", b"x")]);
    let catalog = CatalogXml::new("main")
        .url(CATALOG_URL)
        .version("3.0.*")
        .package(PackageXml::new("c172").revision(2).url("https://cdn/c172.tgz").archive(&archive));
    env.serve_archive(&["https://cdn/c172.tgz"], &archive);
    env.add_main_catalog(&catalog)?;
    env.install_now("c172")?;

    let reopened = env.reopen()?;
    let catalog = reopened.catalog_by_id("main").expect("catalog loaded from cache");
    assert_eq!(catalog.status(), Status::Success);
    assert_eq!(catalog.url(), CATALOG_URL);
    let install = reopened.install_for_package("main.c172").expect("install found on disk");
    assert_eq!(install.revision(), 2);
    assert_eq!(install.status(), Status::Success);
    Ok(())
}

#[test]
fn test_disable_persists_and_hides_packages() -> Result<()> {
    let mut env = TestRegistry::new()?;
    env.add_main_catalog(&main_catalog())?;

    env.registry.set_catalog_enabled("main", false)?;
    assert_eq!(env.registry.catalog_by_id("main").unwrap().status(), Status::UserDisabled);
    assert!(env.root().join("main/_disabled_").exists());

    env.registry.refresh(true);
    env.registry.poll();
    assert_eq!(env.transport.requests_for(CATALOG_URL), 1, "disabled catalogs are not fetched");

    let reopened = env.reopen()?;
    assert!(!reopened.catalog_by_id("main").unwrap().is_user_enabled());

    env.registry.set_catalog_enabled(CATALOG_URL, true)?;
    assert!(!env.root().join("main/_disabled_").exists());
    assert_eq!(env.registry.catalog_by_id("main").unwrap().status(), Status::Refreshed);
    Ok(())
}

#[test]
fn test_remove_catalog_uninstalls_everything() -> Result<()> {
    let mut env = TestRegistry::new()?;
    let archive = tar_gz(&[("c172/f", b"x")]);
    let catalog = CatalogXml::new("main")
        .version("3.0.*")
        .package(PackageXml::new("c172").revision(1).url("https://cdn/c172.tgz").archive(&archive));
    env.serve_archive(&["https://cdn/c172.tgz"], &archive);
    env.add_main_catalog(&catalog)?;
    env.install_now("c172")?;

    env.registry.remove_catalog("main")?;
    assert!(env.registry.catalog_by_id("main").is_none());
    assert_eq!(env.registry.installs().count(), 0);
    assert!(!env.root().join("main").exists());
    assert!(env.delegate.events().contains(&RegistryEvent::FinishUninstall("main.c172".to_string())));
    Ok(())
}
