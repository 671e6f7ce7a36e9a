mod common;

use anyhow::Result;
use axum::http::StatusCode;
use bson::{doc, oid::ObjectId};
use serde_json::json;

use common::TestApp;
use ganabosques_api::config::QueryConfig;

struct Seed {
    adm3_x: ObjectId,
    adm3_y: ObjectId,
    legacy_defo: ObjectId,
    new_defo: ObjectId,
    a_legacy: ObjectId,
    a_new: ObjectId,
    farm: ObjectId,
}

fn seed(app: &TestApp) -> Seed {
    let store = &app.store;
    let adm3_x = store.insert("adm3", doc! { "name": "X", "label": "Caquetá, Florencia, X" });
    let adm3_y = store.insert("adm3", doc! { "name": "Y" });

    let legacy_defo = store.insert("deforestation", doc! { "deforestation_type": "annual", "year_start": 2015, "year_end": 2016 });
    let new_defo = store.insert("deforestation", doc! {
        "deforestation_type": "annual",
        "period_start": bson::DateTime::parse_rfc3339_str("2021-01-01T00:00:00Z").unwrap(),
        "period_end": bson::DateTime::parse_rfc3339_str("2021-12-31T23:59:59Z").unwrap(),
    });
    let a_legacy = store.insert("analysis", doc! { "deforestation_id": legacy_defo });
    let a_new = store.insert("analysis", doc! { "deforestation_id": { "$ref": "deforestation", "$id": new_defo } });

    let farm = store.insert("farm", doc! { "adm3_id": adm3_x, "ext_id": [{ "source": "SIT_CODE", "ext_code": "SIT-9" }] });
    store.insert("adm3risk", doc! { "adm3_id": adm3_x, "analysis_id": a_new, "def_ha": 4.0, "farm_amount": 1 });
    store.insert("farmrisk", doc! {
        "farm_id": farm, "analysis_id": a_new,
        "deforestation": { "prop": 0.2, "ha": 4.0, "distance": 0 },
        "risk_direct": true, "risk_input": false, "risk_output": false,
    });

    Seed { adm3_x, adm3_y, legacy_defo, new_defo, a_legacy, a_new, farm }
}

#[tokio::test]
async fn adm3_rollup_is_public_and_newest_first() -> Result<()> {
    let app = TestApp::new()?;
    let s = seed(&app);

    let body = json!({
        "entity_type": "adm3",
        "ids": [s.adm3_x.to_hex(), s.adm3_y.to_hex()],
        "type": "annual",
    });
    let (status, out) = app.post("/risk/by-ids-and-type", None, body).await?;
    assert_eq!(status, StatusCode::OK);

    let x = &out[s.adm3_x.to_hex()];
    assert_eq!(x["entity_type"], "adm3");
    assert_eq!(x["items"][0]["deforestation_id"], s.new_defo.to_hex());
    assert_eq!(x["items"][0]["risk_total"], true);
    assert_eq!(x["items"][0]["sit_codes"]["direct"], json!(["SIT-9"]));
    assert_eq!(x["items"][1]["deforestation_id"], s.legacy_defo.to_hex());
    assert_eq!(x["items"][1]["period_start"], "2015-01-01T00:00:00");
    assert_eq!(x["items"][1]["period_end"], "2016-12-31T23:59:59");

    let y = &out[s.adm3_y.to_hex()];
    assert_eq!(y["items"].as_array().unwrap().len(), 2);
    assert_eq!(y["items"][0]["farm_amount"], 0);
    Ok(())
}

#[tokio::test]
async fn analysis_ids_take_priority_over_type() -> Result<()> {
    let app = TestApp::new()?;
    let s = seed(&app);

    let body = json!({
        "entity_type": "adm3",
        "ids": [s.adm3_x.to_hex()],
        "analysis_ids": [s.a_legacy.to_hex()],
        "deforestation_ids": ["not-checked"],
        "type": "bogus",
    });
    let (status, out) = app.post("/risk/by-ids-and-type", None, body).await?;
    assert_eq!(status, StatusCode::OK);
    let items = out[s.adm3_x.to_hex()]["items"].as_array().unwrap().clone();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["analysis_ids"], json!([s.a_legacy.to_hex()]));
    Ok(())
}

#[tokio::test]
async fn farm_and_enterprise_scopes_need_admin() -> Result<()> {
    let app = TestApp::new()?;
    let s = seed(&app);
    let body = json!({ "entity_type": "farm", "ids": [s.farm.to_hex()], "type": "annual" });

    let (status, _) = app.post("/risk/by-ids-and-type", None, body.clone()).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, out) = app.post("/risk/by-ids-and-type", Some(&app.admin_token()?), body).await?;
    assert_eq!(status, StatusCode::OK);
    let items = &out[s.farm.to_hex()]["items"];
    assert_eq!(items[0]["risk_direct"], true);
    assert_eq!(items[1]["risk_direct"], false);
    assert!(items[1]["farmrisk_id"].is_null());
    Ok(())
}

#[tokio::test]
async fn bad_requests() -> Result<()> {
    let app = TestApp::new()?;
    let s = seed(&app);
    let id = s.adm3_x.to_hex();

    let cases = [
        json!({ "entity_type": "province", "ids": [id], "type": "annual" }),
        json!({ "entity_type": "adm3", "ids": ["zz"], "type": "annual" }),
        json!({ "entity_type": "adm3", "ids": [], "type": "annual" }),
        json!({ "entity_type": "adm3", "ids": [id] }),
        json!({ "entity_type": "adm3", "ids": [id], "type": "monthly" }),
    ];
    for body in cases {
        let (status, out) = app.post("/risk/by-ids-and-type", None, body.clone()).await?;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{body} -> {out}");
    }
    Ok(())
}

#[tokio::test]
async fn lookups_are_batched_by_chunk_size() -> Result<()> {
    let query = QueryConfig { batch_chunk_size: 1, ..QueryConfig::default() };
    let app = TestApp::with_query(query)?;
    let s = seed(&app);
    let extra = app.store.insert("adm3", doc! { "name": "Z" });
    app.store.clear_log();

    let body = json!({
        "entity_type": "adm3",
        "ids": [s.adm3_x.to_hex(), s.adm3_y.to_hex(), extra.to_hex(), s.adm3_x.to_hex()],
        "analysis_ids": [s.a_new.to_hex()],
    });
    let (status, out) = app.post("/risk/by-ids-and-type", None, body).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(out.as_object().unwrap().len(), 3);
    assert_eq!(app.store.finds_on("adm3risk"), 3);
    Ok(())
}

#[tokio::test]
async fn adm3risk_by_analysis_and_adm3() -> Result<()> {
    let app = TestApp::new()?;
    let s = seed(&app);

    let body = json!({ "analysis_ids": [s.a_new.to_hex()], "adm3_ids": [s.adm3_x.to_hex(), s.adm3_y.to_hex()] });
    let (status, out) = app.post("/adm3risk/by-analysis-and-adm3", None, body).await?;
    assert_eq!(status, StatusCode::OK);
    let rows = out[s.a_new.to_hex()].as_array().unwrap();
    assert_eq!(rows.len(), 2);
    let x = rows.iter().find(|r| r["adm3_id"] == s.adm3_x.to_hex()).unwrap();
    assert_eq!(x["def_ha"], 4.0);
    assert_eq!(x["farms_at_risk"], 1);
    assert_eq!(x["risk_total"], true);

    let y = rows.iter().find(|r| r["adm3_id"] == s.adm3_y.to_hex()).unwrap();
    assert_eq!(y["risk_total"], false);
    assert_eq!(y["farm_amount"], 0);
    assert_eq!(y["def_ha"], 0.0);
    Ok(())
}

#[tokio::test]
async fn adm3risk_by_adm3_and_type() -> Result<()> {
    let app = TestApp::new()?;
    let s = seed(&app);

    let body = json!({ "adm3_ids": [s.adm3_x.to_hex()], "type": "annual" });
    let (status, out) = app.post("/adm3risk/by-adm3-and-type", None, body).await?;
    assert_eq!(status, StatusCode::OK);
    let group = &out[s.adm3_x.to_hex()];
    assert_eq!(group["department"], "Caquetá");
    assert_eq!(group["municipality"], "Florencia");
    assert_eq!(group["items"][0]["analysis_id"], s.a_new.to_hex());

    let (status, _) = app.post("/adm3risk/by-adm3-and-type", None, json!({ "adm3_ids": [], "type": "x" })).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn analyses_by_deforestation() -> Result<()> {
    let app = TestApp::new()?;
    let s = seed(&app);

    let (status, out) = app.get(&format!("/analysis/by-deforestation?deforestation_id={}", s.new_defo.to_hex()), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(out[0]["id"], s.a_new.to_hex());
    assert_eq!(out[0]["deforestation_type"], "annual");

    let (status, _) = app
        .get(&format!("/analysis/by-deforestation?deforestation_id={}", ObjectId::new().to_hex()), None)
        .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}
