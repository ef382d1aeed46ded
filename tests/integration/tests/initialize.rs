//! One-time initialization through the proxy and directly on the logic

use dango_common::{CallContext, ProtocolError};
use dango_integration_tests::*;
use dango_sim::account;
use dango_vault::{VaultLogic, VaultStorage, STORAGE_LAYOUT};

#[test]
fn test_proxy_initializes_once() {
    let (mut deployment, _) = with_position(1);
    let (admin, vault) = (deployment.admin, deployment.vault);
    let params = init_params(&deployment);
    assert!(deployment.proxy().unwrap().is_initialized());
    let before = Snapshot::take(&deployment);

    let result = deployment.chain.transact("initialize", |world| {
        world.with_vault(vault, |proxy, env| proxy.initialize(env, admin, params.clone()))
    });
    assert_eq!(result, Err(ProtocolError::AlreadyInitialized));

    let result = deployment.chain.transact("initialize", |world| {
        world.with_vault(vault, |proxy, env| proxy.initialize(env, account("mallory"), params.clone()))
    });
    assert_eq!(result, Err(ProtocolError::Unauthorized));

    before.assert_unchanged(&deployment, "second initialize");
    assert_eq!(deployment.proxy().unwrap().admin(), admin);
}

#[test]
fn test_logic_initializes_storage_once() {
    let mut deployment = deployed();
    let logic = deployment.proxy().unwrap().logic().clone();
    let params = init_params(&deployment);
    let ctx = CallContext::new(deployment.admin, account("second-vault"));
    let before = Snapshot::take(&deployment);

    let mut storage = VaultStorage::new(STORAGE_LAYOUT);
    let result = deployment.chain.transact("initialize", |world| {
        world.with_env(|env| {
            logic.initialize(&mut storage, env, ctx, params.clone())?;
            let initialized = storage.clone();
            let second = logic.initialize(&mut storage, env, ctx, params.clone());
            assert_eq!(storage, initialized, "a rejected initialize must not touch storage");
            second
        })
    });
    assert_eq!(result, Err(ProtocolError::AlreadyInitialized));
    assert!(storage.initialized);
    assert_eq!(storage.symbol, params.symbol);
    assert_eq!(storage.lower_bound, params.lower_bound);

    // The delegation granted by the first call was rolled back with the call
    before.assert_unchanged(&deployment, "double initialize");
}

#[test]
fn test_initialize_rejects_band_outside_envelope() {
    let mut deployment = deployed();
    let logic = deployment.proxy().unwrap().logic().clone();
    let mut params = init_params(&deployment);
    params.upper_bound = 25 * dango_common::WAD / 10;
    let ctx = CallContext::new(deployment.admin, account("second-vault"));

    let mut storage = VaultStorage::new(STORAGE_LAYOUT);
    let result = deployment
        .chain
        .transact("initialize", |world| world.with_env(|env| logic.initialize(&mut storage, env, ctx, params)));
    assert_eq!(result, Err(ProtocolError::InvalidBounds));
    assert!(!storage.initialized);
}
