mod common;

use common::*;
use payswitch_core::create_app;
use payswitch_core::ports::LedgerStore;
use payswitch_core::processors::{Outcome, ProcessorReport};
use reqwest::StatusCode;
use serde_json::{json, Value};

async fn spawn_app(fx: &Fixture) -> String {
    let app = create_app(fx.state.clone());
    let addr = std::net::SocketAddr::from(([127, 0, 0, 1], 0));
    let server = axum::Server::bind(&addr).serve(app.into_make_service());
    let actual_addr = server.local_addr();

    tokio::spawn(async move {
        server.await.unwrap();
    });

    format!("http://{}", actual_addr)
}

const MERCHANT_TOKEN: &str = "Token mkey:mkey-secret";

#[tokio::test]
async fn test_order_endpoints_round_trip() {
    let fx = Fixture::new().await;
    fx.payout.on_dispatch(Scripted::success("UTR-H1"));
    let base = spawn_app(&fx).await;
    let client = reqwest::Client::new();

    let res = client
        .post(format!("{}/api/orders", base))
        .header("Authorization", MERCHANT_TOKEN)
        .json(&imps_body("H-1", "500"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert!(res.headers().contains_key("x-request-id"));
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["code"], "0x0200");
    assert_eq!(body["data"]["status"], "Success");
    assert_eq!(body["data"]["clientRefId"], "H-1");
    assert_eq!(dec(body["data"]["transactionAmount"].as_str().unwrap()), dec("511"));

    let res = client
        .post(format!("{}/api/orders/status", base))
        .header("Authorization", MERCHANT_TOKEN)
        .json(&json!({"clientRefId": "H-1"}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["data"]["currency"], "INR");
    assert_eq!(body["data"]["utr"], "UTR-H1");
    assert_eq!(body["data"]["mode"], "IMPS");
    assert_eq!(body["data"]["accountNo"], "001122334455");

    let res = client
        .get(format!("{}/api/wallet", base))
        .header("Authorization", MERCHANT_TOKEN)
        .send()
        .await
        .unwrap();
    let body: Value = res.json().await.unwrap();
    assert_eq!(dec(body["data"]["balance"].as_str().unwrap()), dec("489"));

    // Every merchant call is audited with the account number masked.
    let audits = fx.store.audits().await;
    assert_eq!(audits.len(), 3);
    assert_eq!(audits[0].merchant_id.as_deref(), Some(PAYOUT_MERCHANT));
    assert_eq!(audits[0].request["accountNo"], "0011****4455");
}

#[tokio::test]
async fn test_order_errors_use_coded_taxonomy() {
    let fx = Fixture::new().await;
    let base = spawn_app(&fx).await;
    let client = reqwest::Client::new();

    let res = client
        .post(format!("{}/api/orders", base))
        .json(&imps_body("E-1", "500"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["code"], "0x0401");
    assert_eq!(body["status"], "MISSING_HEADER");

    let res = client
        .post(format!("{}/api/orders", base))
        .header("Authorization", "Token mkey:nope")
        .json(&imps_body("E-1", "500"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let mut missing = imps_body("E-2", "500");
    missing.as_object_mut().unwrap().remove("ifsc");
    let res = client
        .post(format!("{}/api/orders", base))
        .header("Authorization", MERCHANT_TOKEN)
        .json(&missing)
        .send()
        .await
        .unwrap();
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["code"], "0x0203");
    assert_eq!(body["status"], "MISSING_PARAMETER");

    let res = client
        .post(format!("{}/api/orders", base))
        .header("Authorization", MERCHANT_TOKEN)
        .json(&imps_body("E-3", "-4"))
        .send()
        .await
        .unwrap();
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["code"], "0x0400");

    let res = client
        .post(format!("{}/api/orders/status", base))
        .header("Authorization", MERCHANT_TOKEN)
        .json(&json!({"clientRefId": "never-sent"}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["code"], "0x0404");

    // Failed auth is audited too, without a merchant.
    let audits = fx.store.audits().await;
    assert_eq!(audits.len(), 5);
    assert!(audits[0].merchant_id.is_none());
    assert_eq!(fx.balance(PAYOUT_MERCHANT).await, dec("1000"));
}

#[tokio::test]
async fn test_bank_webhook_over_http() {
    let fx = Fixture::new().await;
    let base = spawn_app(&fx).await;
    let client = reqwest::Client::new();

    let res = client
        .post(format!("{}/bank/inward-credit", base))
        .header("X-Bank-Auth", bank_auth())
        .json(&inward_credit(&fx.cipher, "HTTP-1", "U-HTTP", "VA1", "250"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["msgId"], "HTTP-1");
    let reply = open_reply(&fx.cipher, body["respData"].as_str().unwrap());
    assert_eq!(reply["status"], "S");
    assert_eq!(fx.balance(PAYOUT_MERCHANT).await, dec("1250"));
}

#[tokio::test]
async fn test_processor_callback_finalizes_order() {
    let fx = Fixture::new().await;
    fx.collect
        .on_dispatch(Scripted::pending_with_link("https://pay.example/cb"));
    let receipt = fx
        .state
        .orders
        .create_order(&fx.collect_actor(), upi_request("CB-1", "500"))
        .await
        .unwrap();
    let base = spawn_app(&fx).await;
    let client = reqwest::Client::new();

    let callback = json!({"orderId": receipt.order.id.to_string(), "status": "FAILED"});
    let res = client
        .post(format!("{}/callbacks/processors/{}", base, COLLECT))
        .json(&callback)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["data"]["status"], "Cancelled");
    assert_eq!(fx.balance(COLLECT_MERCHANT).await, dec("1000"));

    // Redelivery is acknowledged without another credit.
    let res = client
        .post(format!("{}/callbacks/processors/{}", base, COLLECT))
        .json(&callback)
        .send()
        .await
        .unwrap();
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["data"]["status"], "ALREADY_FINAL");
    assert_eq!(fx.balance(COLLECT_MERCHANT).await, dec("1000"));

    // An order is only addressable through its own processor.
    let res = client
        .post(format!("{}/callbacks/processors/{}", base, PAYOUT))
        .json(&callback)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_unsigned_payout_callback_is_confirmed_with_processor() {
    let fx = Fixture::new().await;
    let receipt = fx
        .state
        .orders
        .create_order(&fx.payout_actor(), imps_request("UNS-1", "500"))
        .await
        .unwrap();
    assert_eq!(fx.balance(PAYOUT_MERCHANT).await, dec("489"));
    let base = spawn_app(&fx).await;
    let client = reqwest::Client::new();
    let forged = json!({"orderId": receipt.order.id.to_string(), "status": "FAILED"});

    // The processor still reports the payout as pending, so no refund happens.
    fx.payout.on_status("UNS-1", Scripted::Reply(ProcessorReport::new(Outcome::Pending)));
    let res = client
        .post(format!("{}/callbacks/processors/{}", base, PAYOUT))
        .json(&forged)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(fx.balance(PAYOUT_MERCHANT).await, dec("489"));
    let order = fx.store.order(receipt.order.id).await.unwrap().unwrap();
    assert!(order.status.awaits_outcome());

    // The processor's own answer wins over the callback body.
    fx.payout.on_status("UNS-1", Scripted::success("UTR-UNS"));
    let res = client
        .post(format!("{}/callbacks/processors/{}", base, PAYOUT))
        .json(&forged)
        .send()
        .await
        .unwrap();
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["data"]["status"], "Success");
    assert_eq!(fx.balance(PAYOUT_MERCHANT).await, dec("489"));
    let order = fx.store.order(receipt.order.id).await.unwrap().unwrap();
    assert_eq!(order.utr.as_deref(), Some("UTR-UNS"));
}

#[tokio::test]
async fn test_admin_routes_require_key() {
    let fx = Fixture::new().await;
    fx.collect
        .on_dispatch(Scripted::pending_with_link("https://pay.example/adm"));
    let receipt = fx
        .state
        .orders
        .create_order(&fx.collect_actor(), upi_request("ADM-1", "500"))
        .await
        .unwrap();
    let base = spawn_app(&fx).await;
    let client = reqwest::Client::new();
    let url = format!("{}/admin/orders/{}/status", base, receipt.order.id);
    let update = json!({"status": "SUCCESS", "utr": "MANUAL-1", "remark": "confirmed by bank"});

    let res = client.post(&url).json(&update).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = client
        .post(&url)
        .header("Authorization", format!("Bearer {}", ADMIN_KEY))
        .json(&update)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["data"]["status"], "Success");
    assert_eq!(body["data"]["changed"], true);

    let res = client
        .post(format!("{}/admin/reconcile", base))
        .header("Authorization", format!("Bearer {}", ADMIN_KEY))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["data"]["examined"], 0);

    let res = client.get(format!("{}/health", base)).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}
