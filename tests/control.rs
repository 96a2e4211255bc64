//! Control-plane behavior: config reports, patch semantics, and stage
//! notification.

use pulseline::config::{ConfigEntry, ConfigKind, ConfigValue};
use pulseline::control::ControlError;
use pulseline::node::PerceptorBinding;
use pulseline::pipeline::Pipeline;
use pulseline::sink::SinkBinding;
use pulseline::utils::testing::{CollectingSink, ConfigurablePerceptor};
use rustc_hash::FxHashMap;
use serde_json::{Value, json};
use std::sync::Arc;

fn detector_schema() -> Vec<ConfigEntry> {
    vec![
        ConfigEntry::new(
            "threshold",
            "Detection threshold",
            ConfigKind::Float,
            ConfigValue::Float(0.5),
            "Minimum confidence before a detection is reported",
        )
        .unwrap(),
        ConfigEntry::new(
            "box_color",
            "Box color",
            ConfigKind::Color,
            ConfigValue::Str("#00ff00".into()),
            "Annotation color",
        )
        .unwrap(),
        ConfigEntry::new(
            "enabled",
            "Enabled",
            ConfigKind::Bool,
            ConfigValue::Bool(true),
            "",
        )
        .unwrap(),
    ]
}

fn patch(entries: &[(&str, Value)]) -> FxHashMap<String, Value> {
    entries
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

#[test]
fn reports_carry_value_and_schema_metadata() {
    let pipeline = Pipeline::default();
    pipeline
        .add_perceptor(
            "detector",
            None,
            PerceptorBinding::new(ConfigurablePerceptor::new(detector_schema())),
        )
        .unwrap();

    let reports = pipeline.control().perceptor_config("detector").unwrap();
    assert_eq!(reports.len(), 3);
    assert_eq!(reports[0].name, "threshold");
    assert_eq!(reports[0].label, "Detection threshold");
    assert_eq!(reports[0].value, json!(0.5));
    assert_eq!(reports[0].default_value, json!(0.5));
    assert_eq!(reports[1].value, json!("#00ff00"));
}

#[test]
fn mixed_patch_applies_valid_entries_and_reports_the_rest() {
    let pipeline = Pipeline::default();
    let perceptor = Arc::new(ConfigurablePerceptor::new(detector_schema()));
    pipeline
        .add_perceptor("detector", None, PerceptorBinding::from_arc(perceptor.clone()))
        .unwrap();
    let control = pipeline.control();

    let outcome = control
        .patch_perceptor_config(
            "detector",
            &patch(&[
                ("threshold", json!(0.9)),
                ("enabled", json!("yes")),
                ("missing", json!(1)),
            ]),
        )
        .unwrap();

    assert_eq!(outcome.applied, vec!["threshold"]);
    assert_eq!(outcome.errors.len(), 2);

    // Valid entry took effect; invalid ones left prior values standing.
    let reports = control.perceptor_config("detector").unwrap();
    let by_name: FxHashMap<_, _> = reports.iter().map(|r| (r.name.as_str(), r)).collect();
    assert_eq!(by_name["threshold"].value, json!(0.9));
    assert_eq!(by_name["enabled"].value, json!(true));

    // The stage was notified exactly once, for the accepted entry.
    let notifications = perceptor.notifications.lock();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].0, "threshold");
}

#[test]
fn color_patch_accepts_symbolic_names() {
    let pipeline = Pipeline::default();
    pipeline
        .add_perceptor(
            "detector",
            None,
            PerceptorBinding::new(ConfigurablePerceptor::new(detector_schema())),
        )
        .unwrap();
    let control = pipeline.control();

    let outcome = control
        .patch_perceptor_config("detector", &patch(&[("box_color", json!("red"))]))
        .unwrap();
    assert!(outcome.errors.is_empty());

    let reports = control.perceptor_config("detector").unwrap();
    let color = reports.iter().find(|r| r.name == "box_color").unwrap();
    assert_eq!(color.value, json!("#ff0000"));
}

#[test]
fn unknown_stage_is_a_lookup_error() {
    let pipeline = Pipeline::default();
    let control = pipeline.control();
    assert!(matches!(
        control.perceptor_config("ghost"),
        Err(ControlError::UnknownPerceptor { .. })
    ));
    assert!(matches!(
        control.patch_sink_config("ghost", &patch(&[])),
        Err(ControlError::UnknownSink { .. })
    ));
}

#[test]
fn bulk_patch_reports_unknown_stages_without_aborting() {
    let pipeline = Pipeline::default();
    pipeline
        .add_perceptor(
            "detector",
            None,
            PerceptorBinding::new(ConfigurablePerceptor::new(detector_schema())),
        )
        .unwrap();
    let control = pipeline.control();

    let mut patches = FxHashMap::default();
    patches.insert("detector".to_string(), patch(&[("threshold", json!(0.7))]));
    patches.insert("ghost".to_string(), patch(&[("x", json!(1))]));

    let outcomes = control.patch_all_perceptor_configs(&patches);
    assert!(outcomes["detector"].errors.is_empty());
    assert_eq!(outcomes["detector"].applied, vec!["threshold"]);
    assert!(!outcomes["ghost"].errors.is_empty());
}

#[test]
fn registration_overrides_apply_before_load() {
    let pipeline = Pipeline::default();
    let perceptor = Arc::new(ConfigurablePerceptor::new(detector_schema()));
    pipeline
        .add_perceptor(
            "detector",
            None,
            PerceptorBinding::from_arc(perceptor.clone())
                .with_config("threshold", ConfigValue::Float(0.8)),
        )
        .unwrap();

    let reports = pipeline.control().perceptor_config("detector").unwrap();
    let threshold = reports.iter().find(|r| r.name == "threshold").unwrap();
    assert_eq!(threshold.value, json!(0.8));
    assert_eq!(threshold.default_value, json!(0.5));
    assert_eq!(perceptor.notifications.lock().len(), 1);
}

#[test]
fn invalid_registration_override_fails_registration() {
    let pipeline = Pipeline::default();
    let err = pipeline
        .add_perceptor(
            "detector",
            None,
            PerceptorBinding::new(ConfigurablePerceptor::new(detector_schema()))
                .with_config("threshold", ConfigValue::Str("high".into())),
        )
        .unwrap_err();
    assert!(matches!(err, pulseline::graph::GraphError::Config(_)));
    assert!(pipeline.perceptor_names().is_empty());
}

#[test]
fn sinks_expose_the_same_config_surface() {
    struct TintedSink;

    #[async_trait::async_trait]
    impl pulseline::sink::Sink for TintedSink {
        async fn write(&self, _payload: Value) -> Result<Value, pulseline::sink::SinkError> {
            Ok(Value::Null)
        }

        fn config_schema(&self) -> Vec<ConfigEntry> {
            vec![
                ConfigEntry::new(
                    "tint",
                    "Tint",
                    ConfigKind::Color,
                    ConfigValue::Str("black".into()),
                    "",
                )
                .unwrap(),
            ]
        }
    }

    let pipeline = Pipeline::default();
    pipeline
        .add_output_sink("annotated", SinkBinding::new(TintedSink))
        .unwrap();
    pipeline
        .add_output_sink("plain", SinkBinding::new(CollectingSink::new()))
        .unwrap();
    let control = pipeline.control();

    let outcome = control
        .patch_sink_config("annotated", &patch(&[("tint", json!("255,0,255"))]))
        .unwrap();
    assert!(outcome.errors.is_empty());
    let reports = control.sink_config("annotated").unwrap();
    assert_eq!(reports[0].value, json!("#ff00ff"));

    let all = control.all_sink_configs();
    assert_eq!(all.len(), 2);
    assert!(all["plain"].is_empty());
}
