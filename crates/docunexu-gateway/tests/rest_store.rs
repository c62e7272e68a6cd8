use std::sync::Mutex;

use actix_web::{web, App, HttpRequest, HttpResponse, HttpServer};
use serde_json::{json, Value};

use docunexu_gateway::store::{
    BalanceStore, CredentialValidator, RestStore, StoreError, UsageLog, UsageRecord,
};

const SERVICE_KEY: &str = "service-role-key";

/// In-memory stand-in for the hosted database.
struct Db {
    credits: i64,
    usage: Vec<Value>,
}

type SharedDb = Mutex<Db>;

fn authorized(req: &HttpRequest) -> bool {
    let apikey = req.headers().get("apikey").and_then(|v| v.to_str().ok());
    let bearer = req
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok());
    apikey == Some(SERVICE_KEY) && bearer == Some(format!("Bearer {SERVICE_KEY}").as_str())
}

async fn validate_api_key(req: HttpRequest, body: web::Json<Value>) -> HttpResponse {
    if !authorized(&req) {
        return HttpResponse::Unauthorized().finish();
    }
    match body["input_key"].as_str() {
        Some("dn_live_abc123") => {
            HttpResponse::Ok().json(json!([{"user_id": "user-1", "is_active": true}]))
        }
        Some("dn_live_revoked") => {
            HttpResponse::Ok().json(json!([{"user_id": "user-1", "is_active": false}]))
        }
        _ => HttpResponse::Ok().json(json!([])),
    }
}

async fn profiles(req: HttpRequest, db: web::Data<SharedDb>) -> HttpResponse {
    if !authorized(&req) {
        return HttpResponse::Unauthorized().finish();
    }
    if !req.query_string().starts_with("id=eq.user-1") {
        return HttpResponse::Ok().json(json!([]));
    }
    let credits = db.lock().unwrap().credits;
    HttpResponse::Ok().json(json!([{"credits": credits, "credit_limit": 100}]))
}

async fn decrement_credits(
    req: HttpRequest,
    body: web::Json<Value>,
    db: web::Data<SharedDb>,
) -> HttpResponse {
    if !authorized(&req) {
        return HttpResponse::Unauthorized().finish();
    }
    let amount = body["p_amount"].as_i64().unwrap_or(0);
    let mut db = db.lock().unwrap();
    if body["p_user_id"] == "user-1" && db.credits >= amount {
        db.credits -= amount;
        HttpResponse::Ok().json(true)
    } else {
        HttpResponse::Ok().json(false)
    }
}

async fn insert_usage(
    req: HttpRequest,
    body: web::Json<Value>,
    db: web::Data<SharedDb>,
) -> HttpResponse {
    if !authorized(&req) {
        return HttpResponse::Unauthorized().finish();
    }
    db.lock().unwrap().usage.push(body.into_inner());
    HttpResponse::Created().finish()
}

async fn list_usage(req: HttpRequest, db: web::Data<SharedDb>) -> HttpResponse {
    if !authorized(&req) {
        return HttpResponse::Unauthorized().finish();
    }
    let rows: Vec<Value> = db.lock().unwrap().usage.iter().rev().cloned().collect();
    HttpResponse::Ok().json(rows)
}

async fn start_mock_db(credits: i64) -> (String, web::Data<SharedDb>) {
    let db = web::Data::new(Mutex::new(Db {
        credits,
        usage: Vec::new(),
    }));
    let data = db.clone();
    let server = HttpServer::new(move || {
        App::new()
            .app_data(data.clone())
            .route("/rest/v1/rpc/validate_api_key", web::post().to(validate_api_key))
            .route("/rest/v1/rpc/decrement_credits", web::post().to(decrement_credits))
            .route("/rest/v1/profiles", web::get().to(profiles))
            .service(
                web::resource("/rest/v1/usage_logs")
                    .route(web::post().to(insert_usage))
                    .route(web::get().to(list_usage)),
            )
    })
    .workers(1)
    .disable_signals()
    .bind(("127.0.0.1", 0))
    .unwrap();

    let addr = server.addrs()[0];
    actix_rt::spawn(server.run());
    (format!("http://{addr}"), db)
}

#[actix_rt::test]
async fn test_validate_api_key() {
    let (base_url, _) = start_mock_db(5).await;
    let store = RestStore::new(&base_url, SERVICE_KEY).unwrap();

    let credential = store.validate("dn_live_abc123").await.unwrap().unwrap();
    assert_eq!(credential.account_id, "user-1");
    assert!(credential.is_active);

    let revoked = store.validate("dn_live_revoked").await.unwrap().unwrap();
    assert!(!revoked.is_active);

    assert!(store.validate("dn_live_unknown").await.unwrap().is_none());
}

#[actix_rt::test]
async fn test_balance_and_conditional_decrement() {
    let (base_url, db) = start_mock_db(1).await;
    let store = RestStore::new(&base_url, SERVICE_KEY).unwrap();

    let balance = store.balance("user-1").await.unwrap().unwrap();
    assert_eq!(balance.credits, 1);
    assert_eq!(balance.credit_limit, 100);
    assert!(store.balance("user-2").await.unwrap().is_none());

    assert!(store.decrement("user-1", 1).await.unwrap());
    assert!(!store.decrement("user-1", 1).await.unwrap());
    assert_eq!(db.lock().unwrap().credits, 0);
}

#[actix_rt::test]
async fn test_usage_roundtrip_newest_first() {
    let (base_url, db) = start_mock_db(5).await;
    let store = RestStore::new(&base_url, SERVICE_KEY).unwrap();

    for (offset, endpoint) in ["pdf/info", "pdf/convert/to/json"].iter().enumerate() {
        let record = UsageRecord {
            account_id: "user-1".to_string(),
            endpoint: endpoint.to_string(),
            credits_used: 1,
            created_at: 1_700_000_000 + offset as i64,
        };
        store.append(&record).await.unwrap();
    }

    let stored = db.lock().unwrap().usage.clone();
    assert_eq!(stored[0]["user_id"], "user-1");
    assert_eq!(stored[0]["created_at"], "2023-11-14T22:13:20+00:00");

    let records = store.recent("user-1", 10).await.unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].endpoint, "pdf/convert/to/json");
    assert_eq!(records[0].created_at, 1_700_000_001);
}

#[actix_rt::test]
async fn test_wrong_service_key_is_backend_error() {
    let (base_url, _) = start_mock_db(5).await;
    let store = RestStore::new(&base_url, "not-the-key").unwrap();

    assert!(matches!(
        store.validate("dn_live_abc123").await,
        Err(StoreError::Backend(_))
    ));
}
