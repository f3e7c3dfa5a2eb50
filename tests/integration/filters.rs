use anyhow::Result;
use pkgcat::Filter;
use pkgcat::test_utils::{CatalogXml, PackageXml, tar_gz};
use pretty_assertions::assert_eq;

use crate::common::TestRegistry;

fn ids(env: &TestRegistry, filter: &str) -> Result<Vec<String>> {
    let filter = Filter::parse(filter)?;
    Ok(env.registry.packages_matching(&filter).iter().map(|p| p.id().to_string()).collect())
}

fn fleet(env: &mut TestRegistry) -> Result<()> {
    let archive = tar_gz(&[("r22/file", b"x")]);
    env.serve_archive(&["https://cdn/r22.tgz"], &archive);
    let catalog = CatalogXml::new("main")
        .version("3.*")
        .package(
            PackageXml::new("r22")
                .name("Robinson R22")
                .tag("helicopter")
                .rating("FDM", 4)
                .revision(1)
                .url("https://cdn/r22.tgz")
                .archive(&archive),
        )
        .package(
            PackageXml::new("c172")
                .name("Cessna 172")
                .description("High-wing trainer")
                .tag("GA")
                .rating("FDM", 2)
                .variant("c172-float", "Cessna 172 on floats")
                .localized_name("de", "Cessna 172 Skyhawk"),
        )
        .package(PackageXml::new("ec135").name("Eurocopter EC135").tag("Helicopter").rating("FDM", 3));
    env.add_main_catalog(&catalog)?;
    env.install_now("r22")?;
    Ok(())
}

#[test]
fn test_queries_over_enabled_catalogs() -> Result<()> {
    let mut env = TestRegistry::new()?;
    fleet(&mut env)?;

    assert_eq!(ids(&env, "<f><tag>HELICOPTER</tag></f>")?, vec!["r22", "ec135"]);
    assert_eq!(ids(&env, "<f><tag>helicopter</tag><rating-FDM>4</rating-FDM></f>")?, vec!["r22"]);
    assert_eq!(ids(&env, "<f><installed>true</installed></f>")?, vec!["r22"]);
    assert_eq!(ids(&env, "<f><installed>false</installed></f>")?, vec!["c172", "ec135"]);
    assert_eq!(ids(&env, "<f><text>floats</text></f>")?, vec!["c172"]);
    assert_eq!(ids(&env, "<f><description>trainer</description></f>")?, vec!["c172"]);
    assert_eq!(
        ids(&env, "<f><any-of><name>robinson</name><name>eurocopter</name></any-of></f>")?,
        vec!["r22", "ec135"]
    );
    assert!(ids(&env, "<f><paint>red</paint></f>")?.is_empty(), "unknown keys fail closed");
    assert_eq!(ids(&env, "<f/>")?.len(), 3);
    Ok(())
}

#[test]
fn test_localized_name_search_falls_back() -> Result<()> {
    let mut env = TestRegistry::new()?;
    fleet(&mut env)?;
    env.registry.set_locale(Some("de".to_string()));

    assert_eq!(ids(&env, "<f><name>skyhawk</name></f>")?, vec!["c172"]);
    assert_eq!(ids(&env, "<f><name>cessna 172 on</name></f>")?, vec!["c172"]);
    Ok(())
}

#[test]
fn test_disabled_catalogs_are_not_searched() -> Result<()> {
    let mut env = TestRegistry::new()?;
    fleet(&mut env)?;
    env.registry.set_catalog_enabled("main", false)?;

    assert!(ids(&env, "<f/>")?.is_empty());
    assert_eq!(env.registry.installed_packages().len(), 1, "installed content stays listed");
    Ok(())
}
