use anyhow::Result;
use pkgcat::Status;
use pkgcat::test_utils::{CatalogXml, PackageXml, tar_gz};
use pretty_assertions::assert_eq;

use crate::common::{CATALOG_URL, TestRegistry, read_revision};

const NEW_URL: &str = "https://catalogs.example.org/v3/catalog.xml";

/// Installs `c172` from catalog `main`, then makes `main` point at `main-v3`.
fn installed_then_superseded(env: &mut TestRegistry) -> Result<()> {
    let old_archive = tar_gz(&[("c172/f", b"old")]);
    let old = CatalogXml::new("main")
        .version("3.*")
        .package(PackageXml::new("c172").revision(1).url("https://cdn/c172-r1.tgz").archive(&old_archive))
        .package(PackageXml::new("dr400").revision(1));
    env.serve_archive(&["https://cdn/c172-r1.tgz"], &old_archive);
    env.add_main_catalog(&old)?;
    env.install_now("main.c172")?;

    let superseded = CatalogXml::new("main").version("2.*").alternate("3.*", NEW_URL, Some("main-v3"));
    env.serve_catalog(CATALOG_URL, &superseded);
    Ok(())
}

#[test]
fn test_distinct_alternate_migrates_installed_packages() -> Result<()> {
    let mut env = TestRegistry::new()?;
    installed_then_superseded(&mut env)?;

    let new_archive = tar_gz(&[("c172/f", b"new")]);
    let replacement = CatalogXml::new("main-v3")
        .version("3.*")
        .package(PackageXml::new("c172").revision(3).url("https://cdn/c172-r3.tgz").archive(&new_archive))
        .package(PackageXml::new("dr400").revision(1));
    env.serve_catalog(NEW_URL, &replacement);
    env.serve_archive(&["https://cdn/c172-r3.tgz"], &new_archive);

    env.registry.refresh(true);
    env.registry.poll();

    let old = env.registry.catalog_by_id("main").unwrap();
    assert_eq!(old.status(), Status::FailVersion);
    assert!(!old.is_enabled());

    let new = env.registry.catalog_by_id("main-v3").expect("replacement catalog added");
    assert_eq!(new.url(), NEW_URL);
    assert_eq!(new.status(), Status::Refreshed);

    let migrated = env.registry.install_for_package("main-v3.c172").expect("installed package migrated");
    assert_eq!(migrated.status(), Status::Success);
    assert_eq!(migrated.revision(), 3);
    assert_eq!(migrated.path(), env.root().join("main-v3/c172"));
    assert_eq!(read_revision(migrated.path()).as_deref(), Some("3"));

    // Only installed packages follow the move
    assert!(env.registry.install_for_package("main-v3.dr400").is_none());
    // The old copy is left alone
    assert_eq!(read_revision(&env.root().join("main/c172")).as_deref(), Some("1"));
    Ok(())
}

#[test]
fn test_migration_skips_packages_missing_from_new_catalog() -> Result<()> {
    let mut env = TestRegistry::new()?;
    installed_then_superseded(&mut env)?;

    env.serve_catalog(NEW_URL, &CatalogXml::new("main-v3").version("3.*").package(PackageXml::new("dr400")));
    env.registry.refresh(true);
    env.registry.poll();

    assert_eq!(env.registry.catalog_by_id("main-v3").unwrap().status(), Status::Refreshed);
    assert_eq!(env.registry.installs().count(), 1);
    Ok(())
}

#[test]
fn test_registered_alternate_is_not_added_twice() -> Result<()> {
    let mut env = TestRegistry::new()?;
    installed_then_superseded(&mut env)?;
    env.serve_catalog(NEW_URL, &CatalogXml::new("main-v3").version("3.*"));

    env.registry.refresh(true);
    env.registry.poll();
    env.registry.refresh(true);
    env.registry.poll();

    assert_eq!(env.registry.catalogs().count(), 2);
    assert_eq!(env.transport.requests_for(NEW_URL), 2, "refreshed, not re-added");
    assert_eq!(env.registry.catalog_by_id("main").unwrap().status(), Status::FailVersion);
    Ok(())
}
