//! End-to-end pipeline: configuration file → engine → orchestrator → validators
//!
//! Timing-sensitive tests run on tokio's paused clock. Tests touching
//! `REELCHECK_CONFIG` are #[serial].

mod helpers;

use helpers::{init_test_logging, text, ScriptedAdapter};
use reelcheck_engine::services::{ExternalIdKind, IdValidationStatus};
use reelcheck_engine::types::{ConsensusAction, EntityQuery, EntitySummary, FieldValue, UnavailableReason};
use reelcheck_engine::{Engine, EngineConfig, EngineError};
use serial_test::serial;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

const CONFIG: &str = r#"
[orchestrator]
batch_size = 2
inter_batch_delay_ms = 1000
max_concurrent_entities = 2
source_timeout_ms = 5000

[[sources]]
id = "tmdb"
name = "The Movie Database"
role = "baseline"
trust_weight = 0.9
capabilities = ["title", "year", "director"]

[[sources]]
id = "imdb"
name = "IMDb"
role = "validate_only"
trust_weight = 0.85
capabilities = ["title", "year", "director"]

[[sources]]
id = "wiki"
name = "Wikipedia"
role = "enrich"
trust_weight = 0.7
capabilities = ["director"]
requires_license_check = true
"#;

fn write_config(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

fn engine() -> Engine {
    Engine::new(EngineConfig::from_toml_str(CONFIG).unwrap()).unwrap()
}

fn query(key: &str) -> EntityQuery {
    EntityQuery {
        key: key.to_string(),
        title: Some(key.to_string()),
        year: None,
        external_ids: Default::default(),
    }
}

fn fields() -> Vec<String> {
    vec!["director".to_string()]
}

#[test]
fn test_config_file_loaded_from_explicit_path() {
    let file = write_config(CONFIG);
    let config = EngineConfig::load(Some(file.path())).unwrap();
    assert_eq!(config.orchestrator.batch_size, 2);
    assert_eq!(config.sources.len(), 3);
    // untouched sections keep their defaults
    assert_eq!(config.consensus.auto_apply_threshold, 0.90);
}

#[test]
#[serial]
fn test_config_file_loaded_from_environment() {
    let file = write_config(CONFIG);
    std::env::set_var("REELCHECK_CONFIG", file.path());
    let config = EngineConfig::load(None);
    std::env::remove_var("REELCHECK_CONFIG");
    assert_eq!(config.unwrap().sources.len(), 3);
}

#[test]
fn test_invalid_config_rejected() {
    let broken = CONFIG.replace("batch_size = 2", "batch_size = 0");
    assert!(matches!(
        EngineConfig::from_toml_str(&broken),
        Err(EngineError::Config(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_batch_run_with_slow_and_failing_sources() -> anyhow::Result<()> {
    init_test_logging();
    let engine = engine();
    let mut orchestrator = engine.orchestrator();

    let mut tmdb = ScriptedAdapter::new("tmdb");
    let mut imdb = ScriptedAdapter::new("imdb");
    for i in 0..5 {
        let key = format!("film-{}", i);
        tmdb = tmdb.answer(&key, "director", text("Sukumar"));
        imdb = imdb.answer(&key, "director", text("Sukumar"));
    }
    orchestrator.register_adapter(Arc::new(tmdb))?;
    orchestrator.register_adapter(Arc::new(imdb.with_delay(Duration::from_secs(30))))?;
    orchestrator.register_adapter(Arc::new(ScriptedAdapter::new("wiki").failing()))?;

    let validator = engine.entity_validator(Arc::new(orchestrator));
    let queries = (0..5).map(|i| query(&format!("film-{}", i))).collect();
    let started = Instant::now();
    let report = validator
        .validate_batch(queries, &fields(), &CancellationToken::new())
        .await;

    assert_eq!(report.completed.len(), 5);
    assert_eq!(report.batches_run, 3);
    // two inter-batch delays, each batch bounded by the 5 s source timeout
    assert!(started.elapsed() >= Duration::from_millis(2000));
    assert!(started.elapsed() < Duration::from_secs(20));

    for (_, validation) in &report.completed {
        let director = validation.result("director").unwrap();
        assert_eq!(director.consensus_value, Some(text("Sukumar")));
        // a lone responder agrees with itself; its trust clears the auto-apply bar
        assert_eq!(director.confidence, 0.98);
        assert_eq!(director.action, ConsensusAction::AutoApply);
        assert!(!director.audit);

        let reasons: Vec<_> = validation.unavailable.iter().map(|u| (&u.source_id[..], &u.reason)).collect();
        assert!(reasons.contains(&("imdb", &UnavailableReason::Timeout)));
        assert!(reasons
            .iter()
            .any(|(id, reason)| *id == "wiki" && matches!(reason, UnavailableReason::Error(_))));
    }
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_keeps_completed_entities() -> anyhow::Result<()> {
    let engine = engine();
    let mut orchestrator = engine.orchestrator();
    let mut tmdb = ScriptedAdapter::new("tmdb");
    for i in 0..6 {
        tmdb = tmdb.answer(&format!("film-{}", i), "director", text("Sukumar"));
    }
    orchestrator.register_adapter(Arc::new(tmdb))?;
    let validator = engine.entity_validator(Arc::new(orchestrator));

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(1500)).await;
        trigger.cancel();
    });

    let queries = (0..6).map(|i| query(&format!("film-{}", i))).collect();
    let report = validator.validate_batch(queries, &fields(), &cancel).await;

    assert!(report.cancelled);
    // batches at t=0 and t=1000 finished; cancelled during the second delay
    assert_eq!(report.completed.len(), 4);
    assert_eq!(report.skipped, 2);
    assert!(report.failed.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_validate_only_and_unlicensed_never_ingested() -> anyhow::Result<()> {
    let engine = engine();
    let mut orchestrator = engine.orchestrator();
    for id in ["tmdb", "imdb", "wiki"] {
        let adapter = ScriptedAdapter::new(id).answer("film", "director", text("Trivikram"));
        orchestrator.register_adapter(Arc::new(adapter))?;
    }
    let validator = engine.entity_validator(Arc::new(orchestrator));
    let validation = validator
        .validate(&query("film"), &fields(), &CancellationToken::new())
        .await?;

    let director = validation.result("director").unwrap();
    assert_eq!(director.agreeing_sources.len(), 3);
    assert_eq!(director.action, ConsensusAction::AutoApply);
    let storable = validation.ingest_candidates.source_ids();
    assert_eq!(storable.into_iter().collect::<Vec<_>>(), vec!["tmdb"]);
    Ok(())
}

#[tokio::test]
async fn test_external_id_checked_against_what_sources_hold() -> anyhow::Result<()> {
    let engine = engine();
    let mut orchestrator = engine.orchestrator();
    let tmdb = ScriptedAdapter::new("tmdb")
        .answer("tmdb:256040", "title", text("Baahubali: The Beginning"))
        .answer("tmdb:256040", "year", FieldValue::Number(2015))
        .answer("tmdb:99", "title", text("Pokiri"))
        .answer("tmdb:99", "year", FieldValue::Number(2006));
    orchestrator.register_adapter(Arc::new(tmdb))?;
    let validator = engine.external_id_validator();
    let cancel = CancellationToken::new();

    let mut right = EntitySummary::new(Uuid::new_v4(), "Baahubali: The Beginning", Some(2015));
    right.external_ids.tmdb = Some(256040);
    let confirmed = validator
        .validate(&right, ExternalIdKind::Tmdb, &orchestrator, &cancel)
        .await;
    assert_eq!(confirmed.status, IdValidationStatus::Confirmed);

    let mut wrong = EntitySummary::new(Uuid::new_v4(), "Athadu", Some(2005));
    wrong.external_ids.tmdb = Some(99);
    let mismatch = validator
        .validate(&wrong, ExternalIdKind::Tmdb, &orchestrator, &cancel)
        .await;
    assert_eq!(mismatch.status, IdValidationStatus::TitleMismatch);
    assert_eq!(mismatch.reported_title.as_deref(), Some("Pokiri"));

    let mut unknown = EntitySummary::new(Uuid::new_v4(), "Athadu", Some(2005));
    unknown.external_ids.tmdb = Some(12345);
    let not_found = validator
        .validate(&unknown, ExternalIdKind::Tmdb, &orchestrator, &cancel)
        .await;
    assert_eq!(not_found.status, IdValidationStatus::NotFound);
    Ok(())
}
