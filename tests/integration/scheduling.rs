use anyhow::Result;
use pkgcat::test_utils::{CatalogXml, MockResponse, PackageXml, RegistryEvent, tar_gz};
use pkgcat::{PkgError, Status};
use pretty_assertions::assert_eq;

use crate::common::TestRegistry;

fn cdn(id: &str) -> String {
    format!("https://cdn.example.org/{id}.tgz")
}

/// A package with a matching archive served by the mock transport.
fn served(env: &TestRegistry, id: &str, revision: u32) -> PackageXml {
    let archive = tar_gz(&[(format!("{id}/file").as_str(), id.as_bytes())]);
    env.serve_archive(&[cdn(id).as_str()], &archive);
    PackageXml::new(id).revision(revision).url(&cdn(id)).archive(&archive)
}

#[test]
fn test_nested_dependencies_are_rejected() -> Result<()> {
    let mut env = TestRegistry::new()?;
    let catalog = CatalogXml::new("main")
        .version("3.*")
        .package(served(&env, "a", 1).depends("b", 0))
        .package(served(&env, "b", 1).depends("c", 0))
        .package(served(&env, "c", 1));
    env.add_main_catalog(&catalog)?;

    let error = env.registry.install("main.a").unwrap_err();
    assert!(matches!(error, PkgError::NestedDependency { .. }), "{error}");
    assert!(env.registry.install_for_package("main.c").is_none(), "c is not installed behind a's back");
    assert_eq!(env.transport.request_count(), 1);
    Ok(())
}

#[test]
fn test_dependencies_install_alongside() -> Result<()> {
    let mut env = TestRegistry::new()?;
    let catalog = CatalogXml::new("main")
        .version("3.*")
        .package(served(&env, "plane", 1).depends("shared-models", 2))
        .package(served(&env, "shared-models", 2));
    env.add_main_catalog(&catalog)?;

    env.install_now("plane")?;

    for id in ["main.plane", "main.shared-models"] {
        let install = env.registry.install_for_package(id).unwrap();
        assert_eq!(install.status(), Status::Success, "{id}");
    }
    let started: Vec<String> = env
        .delegate
        .events()
        .into_iter()
        .filter_map(|e| match e {
            RegistryEvent::StartInstall { package_id, .. } => Some(package_id),
            _ => None,
        })
        .collect();
    assert_eq!(started, vec!["main.shared-models", "main.plane"]);
    Ok(())
}

#[test]
fn test_concurrency_ceiling() -> Result<()> {
    let mut env = TestRegistry::with_config(|config| config.max_concurrent_installs = 2)?;
    let mut catalog = CatalogXml::new("main").version("3.*");
    for id in ["a", "b", "c"] {
        catalog = catalog.package(PackageXml::new(id).revision(1).url(&cdn(id)).md5("00"));
        env.transport.route(&cdn(id), MockResponse::hold());
    }
    env.add_main_catalog(&catalog)?;

    let paths: Vec<_> = ["a", "b", "c"].iter().map(|id| env.registry.install(id)).collect::<Result<_, _>>()?;
    assert_eq!(env.registry.active_downloads(), 2);
    assert!(env.registry.is_install_queued(&paths[2]));
    assert!(!env.registry.install_at(&paths[2]).unwrap().is_downloading());
    assert_eq!(env.transport.request_count(), 3);

    // Freeing a slot starts the queued install
    env.registry.cancel_download(&paths[0])?;
    assert_eq!(env.registry.active_downloads(), 2);
    assert!(env.registry.install_at(&paths[2]).unwrap().is_downloading());
    assert_eq!(env.transport.requests_for(&cdn("c")), 1);

    let cancelled: Vec<Status> = env.delegate.outcomes().iter().map(|o| o.status).collect();
    assert_eq!(cancelled, vec![Status::UserCancelled]);
    Ok(())
}

#[test]
fn test_cancel_queued_install() -> Result<()> {
    let mut env = TestRegistry::with_config(|config| config.max_concurrent_installs = 1)?;
    let catalog = CatalogXml::new("main")
        .version("3.*")
        .package(PackageXml::new("a").revision(1).url(&cdn("a")).md5("00"))
        .package(PackageXml::new("b").revision(1).url(&cdn("b")).md5("00"));
    env.transport.route(&cdn("a"), MockResponse::hold());
    env.add_main_catalog(&catalog)?;

    env.registry.install("a")?;
    let queued = env.registry.install("b")?;
    assert!(env.registry.is_install_queued(&queued));

    env.registry.cancel_download(&queued)?;
    assert!(!env.registry.is_install_queued(&queued));
    assert!(env.registry.install_at(&queued).is_none());
    assert_eq!(env.transport.requests_for(&cdn("b")), 0);
    Ok(())
}

#[test]
fn test_cancel_keeps_installed_revision() -> Result<()> {
    let mut env = TestRegistry::new()?;
    let catalog = CatalogXml::new("main").version("3.*").package(served(&env, "a", 1));
    env.add_main_catalog(&catalog)?;
    let path = env.install_now("a")?;

    env.transport.route(&cdn("a"), MockResponse::hold());
    env.registry.start_update(&path)?;
    env.registry.cancel_download(&path)?;

    let install = env.registry.install_at(&path).expect("installed content stays registered");
    assert_eq!(install.status(), Status::UserCancelled);
    assert_eq!(install.revision(), 1);
    assert!(path.join("file").is_file());
    Ok(())
}

#[test]
fn test_install_is_idempotent() -> Result<()> {
    let mut env = TestRegistry::new()?;
    let catalog = CatalogXml::new("main").version("3.*").package(served(&env, "a", 1));
    env.add_main_catalog(&catalog)?;

    let first = env.install_now("a")?;
    let second = env.install_now("main.a")?;
    assert_eq!(first, second);
    assert_eq!(env.transport.requests_for(&cdn("a")), 1);
    assert_eq!(env.registry.installs().count(), 1);
    Ok(())
}

#[test]
fn test_failed_install_is_retried_by_install() -> Result<()> {
    let mut env = TestRegistry::new()?;
    let archive = tar_gz(&[("a/file", b"a")]);
    let catalog = CatalogXml::new("main")
        .version("3.*")
        .package(PackageXml::new("a").revision(1).url(&cdn("a")).archive(&archive));
    env.transport.route(&cdn("a"), MockResponse::status(503));
    env.transport.route(&cdn("a"), MockResponse::ok(archive));
    env.add_main_catalog(&catalog)?;

    let path = env.install_now("a")?;
    assert_eq!(env.registry.install_at(&path).unwrap().status(), Status::FailDownload);

    env.install_now("a")?;
    assert_eq!(env.registry.install_at(&path).unwrap().status(), Status::Success);
    Ok(())
}

#[test]
fn test_uninstall_removes_directory() -> Result<()> {
    let mut env = TestRegistry::new()?;
    let catalog = CatalogXml::new("main").version("3.*").package(served(&env, "a", 1));
    env.add_main_catalog(&catalog)?;
    let path = env.install_now("a")?;

    env.registry.uninstall(&path)?;
    assert!(!path.exists());
    assert!(env.registry.install_for_package("main.a").is_none());
    assert!(env.registry.installed_packages().is_empty());
    assert!(matches!(env.registry.uninstall(&path), Err(PkgError::InstallNotFound { .. })));
    Ok(())
}
