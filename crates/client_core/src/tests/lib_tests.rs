use super::*;
use std::time::Duration;

use decision::{ChannelDecisionMaker, DecisionPrompt, NoDecisions, Selection};
use session::{SessionInfo, StaticWallet};
use shared::domain::{KittyId, ZombieId};
use test_support::{alice, bob, ManualClock, SimulatedLedger, NOW};

fn session_of(address: Address) -> ActiveSession {
    ActiveSession::connected(SessionInfo {
        address,
        chain_id: ChainId("5777".to_string()),
    })
}

fn client_for(ledger: &Arc<SimulatedLedger>, clock: &Arc<ManualClock>) -> Arc<ZombieClient> {
    ZombieClient::new_with_dependencies(
        Settings::default(),
        ledger.clone(),
        session_of(alice()),
        clock.clone(),
    )
}

fn setup() -> (Arc<SimulatedLedger>, Arc<ZombieClient>) {
    let clock = ManualClock::new(NOW);
    let ledger = SimulatedLedger::new(Arc::clone(&clock));
    let client = client_for(&ledger, &clock);
    (ledger, client)
}

fn feed(zombie_id: ZombieId, kitty_id: Option<KittyId>) -> ActionRequest {
    ActionRequest::FeedOnKitty {
        zombie_id,
        kitty_id,
    }
}

#[tokio::test]
async fn refresh_by_kind_publishes_the_new_view() {
    let (ledger, client) = setup();
    ledger.add_zombie(&alice(), "Tzombie", NOW);
    ledger.add_kitty(&alice(), 8);
    let mut events = client.subscribe_events();

    let view = client.refresh(RegistryKind::Zombie).await.expect("first load");
    assert_eq!(view.zombies.len(), 1);
    assert_eq!(view.kitties.len(), 1, "an empty view is loaded in full");

    ledger.add_kitty(&alice(), 9);
    let view = client.refresh(RegistryKind::Zombie).await.expect("zombies");
    assert_eq!(view.kitties.len(), 1, "kitties are loaded separately");

    let view = client.refresh(RegistryKind::Kitty).await.expect("kitties");
    assert_eq!(view.zombies.len(), 1);
    assert_eq!(view.kitties.len(), 2);
    assert_eq!(client.view().await, view);

    let mut refreshed = 0;
    while let Ok(event) = events.try_recv() {
        if matches!(event, ClientEvent::ViewRefreshed(_)) {
            refreshed += 1;
        }
    }
    assert_eq!(refreshed, 3);
}

#[tokio::test]
async fn actions_require_a_connected_session() {
    let clock = ManualClock::new(NOW);
    let ledger = SimulatedLedger::new(Arc::clone(&clock));
    let client = ZombieClient::new_with_dependencies(
        Settings::default(),
        ledger.clone(),
        ActiveSession::default(),
        clock,
    );

    let result = client
        .perform_action(ActionRequest::CreateKitty { genes: Some(1) }, &NoDecisions)
        .await;
    assert_eq!(result.failure(), Some(&ActionFailure::NoActiveSession));
    assert_eq!(
        client.refresh_all().await.expect_err("no session"),
        ActionFailure::NoActiveSession
    );
    assert!(ledger.submits().is_empty());
}

#[tokio::test]
async fn one_action_per_address_and_kind_at_a_time() {
    let (ledger, client) = setup();
    let zombie = ledger.add_zombie(&alice(), "Tzombie", NOW);
    let kitty = ledger.add_kitty(&bob(), 5);
    let (decisions, mut prompts) = ChannelDecisionMaker::new(1);

    let first = {
        let client = Arc::clone(&client);
        tokio::spawn(async move { client.perform_action(feed(zombie, None), &decisions).await })
    };
    let prompt = prompts.recv().await.expect("first feed awaits selection");

    let second = client.perform_action(feed(zombie, Some(kitty)), &NoDecisions).await;
    assert_eq!(
        second.failure(),
        Some(&ActionFailure::AlreadyInFlight {
            kind: ActionKind::FeedOnKitty,
            address: alice(),
        })
    );

    let other_kind = client
        .perform_action(ActionRequest::CreateKitty { genes: Some(9) }, &NoDecisions)
        .await;
    assert!(other_kind.is_success());

    match prompt {
        DecisionPrompt::SelectTarget { reply, .. } => {
            let _ = reply.send(Selection::Cancelled);
        }
        other => panic!("unexpected prompt: {other:?}"),
    }
    let first = first.await.expect("first task");
    assert_eq!(first.failure(), Some(&ActionFailure::Cancelled));

    let retried = client.perform_action(feed(zombie, Some(kitty)), &NoDecisions).await;
    assert!(retried.is_success(), "slot released: {:?}", retried.failure());
}

#[tokio::test]
async fn disconnect_clears_session_and_view() {
    let (ledger, client) = setup();
    ledger.add_zombie(&alice(), "Tzombie", NOW);
    client.refresh_all().await.expect("refresh");

    let effect = client
        .handle_session_event(SessionEvent::AddressChanged(None))
        .await;

    assert_eq!(effect, SessionEffect::Cleared);
    assert!(!client.session().is_connected());
    assert_eq!(*client.view().await, LocalView::default());
}

#[tokio::test]
async fn account_switch_rebuilds_view_for_new_address() {
    let (ledger, client) = setup();
    ledger.add_zombie(&alice(), "mine", NOW);
    ledger.add_zombie(&bob(), "theirs", NOW);
    client.refresh_all().await.expect("refresh");

    let effect = client
        .handle_session_event(SessionEvent::AddressChanged(Some(bob())))
        .await;

    assert_eq!(effect, SessionEffect::AddressSwitched(bob()));
    let view = client.view().await;
    assert_eq!(view.address, Some(bob()));
    assert_eq!(view.zombies.len(), 1);
    assert_eq!(view.zombies[0].name, "theirs");
}

#[tokio::test]
async fn chain_change_requires_rebind() {
    let (ledger, client) = setup();
    ledger.add_zombie(&alice(), "Tzombie", NOW);
    let mut events = client.subscribe_events();

    let effect = client
        .handle_session_event(SessionEvent::ChainChanged(ChainId("1".to_string())))
        .await;
    assert_eq!(effect, SessionEffect::RebindRequired(ChainId("1".to_string())));

    let result = client
        .perform_action(ActionRequest::CreateKitty { genes: Some(1) }, &NoDecisions)
        .await;
    assert_eq!(result.failure(), Some(&ActionFailure::ReinitializationRequired));
    assert_eq!(
        client.refresh_all().await.expect_err("unbound"),
        ActionFailure::ReinitializationRequired
    );
    assert!(ledger.submits().is_empty());

    let mut saw_rebind = false;
    while let Ok(event) = events.try_recv() {
        saw_rebind |= matches!(event, ClientEvent::RebindRequired(_));
    }
    assert!(saw_rebind);

    client.rebind_with(ledger.clone()).await;
    assert_eq!(client.view().await.zombies.len(), 1);
    let result = client
        .perform_action(ActionRequest::CreateKitty { genes: Some(1) }, &NoDecisions)
        .await;
    assert!(result.is_success());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_wallet_events_are_all_applied() {
    for _ in 0..50 {
        let (_ledger, client) = setup();
        let switch = {
            let client = Arc::clone(&client);
            tokio::spawn(async move {
                client
                    .handle_session_event(SessionEvent::AddressChanged(Some(bob())))
                    .await
            })
        };
        let chain = {
            let client = Arc::clone(&client);
            tokio::spawn(async move {
                client
                    .handle_session_event(SessionEvent::ChainChanged(ChainId("1".to_string())))
                    .await
            })
        };
        assert_eq!(switch.await.expect("switch"), SessionEffect::AddressSwitched(bob()));
        assert_eq!(
            chain.await.expect("chain"),
            SessionEffect::RebindRequired(ChainId("1".to_string()))
        );

        let session = client.session();
        assert_eq!(session.address, Some(bob()));
        assert_eq!(session.chain_id, Some(ChainId("1".to_string())));
    }
}

#[tokio::test]
async fn rebind_fails_for_undeployed_network() {
    let (_ledger, client) = setup();
    client
        .handle_session_event(SessionEvent::ChainChanged(ChainId("1".to_string())))
        .await;

    let err = client.rebind().await.expect_err("not deployed");
    assert!(matches!(err, ClientError::NotDeployed { .. }));
}

#[tokio::test]
async fn session_listener_applies_wallet_events() {
    let (ledger, client) = setup();
    ledger.add_zombie(&alice(), "Tzombie", NOW);
    let wallet = StaticWallet::new(alice(), ChainId("5777".to_string()));
    let mut events = client.subscribe_events();
    let listener = client.spawn_session_listener(&wallet);

    wallet.emit(SessionEvent::Disconnected);

    let event = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            match events.recv().await {
                Ok(ClientEvent::SessionChanged(session)) => break session,
                Ok(_) => continue,
                Err(err) => panic!("event channel failed: {err}"),
            }
        }
    })
    .await
    .expect("session event");
    assert_eq!(event, ActiveSession::default());
    assert!(!client.session().is_connected());

    drop(wallet);
    tokio::time::timeout(Duration::from_secs(2), listener)
        .await
        .expect("listener stops")
        .expect("listener task");
}

#[tokio::test]
async fn initialize_reports_wallet_and_deployment_errors() {
    let err = ZombieClient::initialize(Settings::default(), &StaticWallet::without_accounts())
        .await
        .err()
        .expect("no accounts");
    assert!(matches!(err, ClientError::Wallet(WalletError::NoAccounts)));

    let wallet = StaticWallet::new(alice(), ChainId("1".to_string()));
    let err = ZombieClient::initialize(Settings::default(), &wallet)
        .await
        .err()
        .expect("not deployed");
    assert_eq!(
        err.to_string(),
        "registry contracts not deployed to detected network 1"
    );
}
