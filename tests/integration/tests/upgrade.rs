//! Proxy upgrades against a live position

use dango_common::{ProtocolError, Result, WAD};
use dango_integration_tests::*;
use dango_proxy::UpgradeableProxy;
use dango_sim::account;
use dango_vault::{LeverageVault, StorageMigration, VaultLogic, VaultStorage, STORAGE_LAYOUT};
use std::sync::Arc;

/// Layout 2 keeps every field and starts charging a default exit fee
struct DefaultExitFee;

impl StorageMigration for DefaultExitFee {
    fn from_layout(&self) -> u16 {
        STORAGE_LAYOUT
    }

    fn to_layout(&self) -> u16 {
        STORAGE_LAYOUT + 1
    }

    fn migrate(&self, storage: &mut VaultStorage) -> Result<()> {
        storage.exit_fee_bps = 25;
        Ok(())
    }
}

struct Broken;

impl StorageMigration for Broken {
    fn from_layout(&self) -> u16 {
        STORAGE_LAYOUT
    }

    fn to_layout(&self) -> u16 {
        STORAGE_LAYOUT + 1
    }

    fn migrate(&self, storage: &mut VaultStorage) -> Result<()> {
        storage.capacity = 0;
        Err(ProtocolError::InvalidBounds)
    }
}

fn next_logic(deployment: &dango_sim::Deployment, version: &str) -> LeverageVault {
    let config = deployment.proxy().unwrap().logic().config().clone();
    LeverageVault::with_version(config, version)
}

fn proxy_mut<'a>(world: &'a mut dango_sim::World, deployment_vault: dango_common::Address) -> &'a mut UpgradeableProxy {
    world.vaults.get_mut(&deployment_vault).unwrap()
}

#[test]
fn test_upgrade_keeps_balances_and_position() {
    let (mut deployment, alice) = with_position(2);
    let before = Snapshot::take(&deployment);
    let shares = deployment.shares(alice).unwrap();

    deployment.upgrade(deployment.admin, "1.1.0").unwrap();
    let proxy = deployment.proxy().unwrap();
    assert_eq!(proxy.implementation(), "1.1.0");
    assert_eq!(proxy.storage(), &before.storage);
    assert_eq!(deployment.shares(alice).unwrap(), shares);
    assert!(proxy.is_initialized());

    // The new logic serves calls against the old storage
    deployment.withdraw(alice, shares / 2).unwrap();
    assert!(in_band(deployment.leverage().unwrap()));
}

#[test]
fn test_only_admin_upgrades() {
    let (mut deployment, alice) = with_position(1);
    let before = Snapshot::take(&deployment);
    assert_eq!(deployment.upgrade(alice, "6.6.6"), Err(ProtocolError::Unauthorized));
    assert_eq!(deployment.proxy().unwrap().implementation(), dango_vault::LOGIC_VERSION);
    before.assert_unchanged(&deployment, "unauthorized upgrade");
}

#[test]
fn test_layout_change_requires_migration() {
    let (mut deployment, _) = with_position(1);
    let (admin, vault) = (deployment.admin, deployment.vault);
    let logic: Arc<dyn VaultLogic> = Arc::new(next_logic(&deployment, "2.0.0").with_storage_layout(STORAGE_LAYOUT + 1));

    let result = deployment
        .chain
        .transact("upgrade", |world| proxy_mut(world, vault).upgrade_to(admin, logic.clone()));
    assert_eq!(
        result,
        Err(ProtocolError::StorageLayoutMismatch { expected: STORAGE_LAYOUT, found: STORAGE_LAYOUT + 1 })
    );

    deployment
        .chain
        .transact("upgrade", |world| proxy_mut(world, vault).upgrade_to_and_migrate(admin, logic, &DefaultExitFee))
        .unwrap();
    let storage = deployment.proxy().unwrap().storage();
    assert_eq!(storage.layout_version, STORAGE_LAYOUT + 1);
    assert_eq!(storage.exit_fee_bps, 25);
    assert_eq!(deployment.proxy().unwrap().implementation(), "2.0.0");
}

#[test]
fn test_failed_migration_keeps_old_logic_and_storage() {
    let (mut deployment, _) = with_position(1);
    let (admin, vault) = (deployment.admin, deployment.vault);
    let logic: Arc<dyn VaultLogic> = Arc::new(next_logic(&deployment, "2.0.0").with_storage_layout(STORAGE_LAYOUT + 1));
    let before = Snapshot::take(&deployment);

    let result = deployment
        .chain
        .transact("upgrade", |world| proxy_mut(world, vault).upgrade_to_and_migrate(admin, logic, &Broken));
    assert_eq!(result, Err(ProtocolError::InvalidBounds));
    assert_eq!(deployment.proxy().unwrap().implementation(), dango_vault::LOGIC_VERSION);
    before.assert_unchanged(&deployment, "failed migration");
}

#[test]
fn test_admin_handover() {
    let (mut deployment, _) = with_position(1);
    let (admin, vault) = (deployment.admin, deployment.vault);
    let successor = account("successor");

    deployment
        .chain
        .transact("change_admin", |world| proxy_mut(world, vault).change_admin(admin, successor))
        .unwrap();
    assert_eq!(deployment.proxy().unwrap().admin(), successor);
    assert_eq!(deployment.upgrade(admin, "1.1.0"), Err(ProtocolError::Unauthorized));
    deployment.upgrade(successor, "1.1.0").unwrap();
    assert_eq!(deployment.proxy().unwrap().total_supply(), WAD);
}
