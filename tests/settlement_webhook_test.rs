mod common;

use common::*;
use payswitch_core::domain::{Direction, LedgerStatus};
use payswitch_core::ports::LedgerStore;
use payswitch_core::services::InboundEnvelope;

fn envelope(body: serde_json::Value) -> InboundEnvelope {
    serde_json::from_value(body).unwrap()
}

#[tokio::test]
async fn test_same_utr_twice_credits_once() {
    let fx = Fixture::new().await;
    let auth = bank_auth();

    let first = fx
        .state
        .gateway
        .handle(
            Some(&auth),
            envelope(inward_credit(&fx.cipher, "MSG-1", "U1", "VA1", "1500.00")),
        )
        .await
        .unwrap();
    let reply = open_reply(&fx.cipher, &first.resp_data);
    assert_eq!(first.msg_id.as_deref(), Some("MSG-1"));
    assert_eq!(reply["status"], "S");
    assert_eq!(reply["errorCode"], "000");
    assert_eq!(fx.balance(PAYOUT_MERCHANT).await, dec("2500"));

    let second = fx
        .state
        .gateway
        .handle(
            Some(&auth),
            envelope(inward_credit(&fx.cipher, "MSG-2", "U1", "VA1", "1500.00")),
        )
        .await
        .unwrap();
    let reply = open_reply(&fx.cipher, &second.resp_data);
    assert_eq!(reply["status"], "F");
    assert_eq!(reply["errorCode"], "004");
    assert_eq!(reply["errorMsg"], "Duplicate UTR");
    assert_eq!(fx.balance(PAYOUT_MERCHANT).await, dec("2500"));

    let ledger = fx.store.ledger_entries(PAYOUT_MERCHANT).await.unwrap();
    assert_eq!(ledger.len(), 1);
    assert_eq!(ledger[0].direction, Direction::Credit);
    assert_eq!(ledger[0].status, LedgerStatus::Success);
    assert_eq!(ledger[0].reference.as_deref(), Some("U1"));
    assert_eq!(fx.store.inbound_credits().await.len(), 1);
}

#[tokio::test]
async fn test_replayed_msg_id_is_rejected() {
    let fx = Fixture::new().await;
    let auth = bank_auth();
    let body = inward_credit(&fx.cipher, "MSG-7", "U7", "VA1", "100");

    let first = fx
        .state
        .gateway
        .handle(Some(&auth), envelope(body.clone()))
        .await
        .unwrap();
    assert_eq!(open_reply(&fx.cipher, &first.resp_data)["status"], "S");

    let replay = fx
        .state
        .gateway
        .handle(Some(&auth), envelope(body))
        .await
        .unwrap();
    let reply = open_reply(&fx.cipher, &replay.resp_data);
    assert_eq!(reply["status"], "F");
    assert_eq!(reply["errorCode"], "401");
    assert_eq!(reply["errorMsg"], "Duplicate msgId");
    assert_eq!(fx.balance(PAYOUT_MERCHANT).await, dec("1100"));

    // Both exchanges are on record, only the first claims the msgId.
    let exchanges = fx.store.bank_exchanges().await;
    assert_eq!(exchanges.len(), 2);
    assert_eq!(exchanges.iter().filter(|e| e.claims_msg_id).count(), 1);
    assert!(exchanges.iter().all(|e| e.response.is_some()));
}

#[tokio::test]
async fn test_bad_credentials_are_refused() {
    let fx = Fixture::new().await;
    let body = inward_credit(&fx.cipher, "MSG-A", "UA", "VA1", "100");

    let missing = fx
        .state
        .gateway
        .handle(None, envelope(body.clone()))
        .await
        .unwrap();
    let reply = open_reply(&fx.cipher, &missing.resp_data);
    assert_eq!(reply["errorCode"], "401");
    assert_eq!(reply["errorMsg"], "X-Bank-Auth headers are missing");

    let wrong = format!(
        "Bearer {}",
        base64::Engine::encode(&base64::engine::general_purpose::STANDARD, "bkey:wrong")
    );
    let invalid = fx
        .state
        .gateway
        .handle(Some(&wrong), envelope(body.clone()))
        .await
        .unwrap();
    assert_eq!(
        open_reply(&fx.cipher, &invalid.resp_data)["errorMsg"],
        "Invalid token"
    );

    // A rejected attempt must not burn the msgId.
    let ok = fx
        .state
        .gateway
        .handle(Some(&bank_auth()), envelope(body))
        .await
        .unwrap();
    assert_eq!(open_reply(&fx.cipher, &ok.resp_data)["status"], "S");
    assert_eq!(fx.balance(PAYOUT_MERCHANT).await, dec("1100"));
}

#[tokio::test]
async fn test_unknown_virtual_account_and_garbled_payload() {
    let fx = Fixture::new().await;
    let auth = bank_auth();

    let unknown = fx
        .state
        .gateway
        .handle(
            Some(&auth),
            envelope(inward_credit(&fx.cipher, "MSG-U", "UU", "VA-404", "100")),
        )
        .await
        .unwrap();
    let reply = open_reply(&fx.cipher, &unknown.resp_data);
    assert_eq!(reply["errorCode"], "004");
    assert_eq!(reply["errorMsg"], "Virtual Account Not Found");

    let garbled = fx
        .state
        .gateway
        .handle(
            Some(&auth),
            envelope(serde_json::json!({"msgId": "MSG-G", "reqData": "bm90LWEtdmFsaWQtZW52ZWxvcGU="})),
        )
        .await
        .unwrap();
    assert_eq!(open_reply(&fx.cipher, &garbled.resp_data)["errorCode"], "400");

    assert_eq!(fx.balance(PAYOUT_MERCHANT).await, dec("1000"));
    assert!(fx.store.inbound_credits().await.is_empty());
}
