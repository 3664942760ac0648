//! Registry behavior against a loopback projector

use std::time::Duration;

use adcp_client::mock::MockProjector;
use adcp_sdk::{
    AttributeId, AttributeValue, ChangeKind, DeviceConfig, DeviceId, DeviceRegistry, DeviceStatus,
    Invocation, PollIntervals, PollKind, SdkError, SelectAction, StatusCode, Validity,
};

const READY_TIMEOUT: Duration = Duration::from_secs(10);

fn config_for(mock: &MockProjector) -> DeviceConfig {
    DeviceConfig::new("cinema", "127.0.0.1")
        .with_port(mock.port())
        .with_password(None)
        .with_intervals(PollIntervals::low_power())
}

async fn online(registry: &DeviceRegistry, config: DeviceConfig) -> DeviceId {
    let id = config.id.clone();
    registry.add_device(config).unwrap();
    let status = tokio::time::timeout(READY_TIMEOUT, registry.wait_ready(&id))
        .await
        .expect("device did not finish connecting")
        .unwrap();
    assert_eq!(status, DeviceStatus::Online);
    id
}

#[tokio::test]
async fn test_lifecycle_reads_identity_and_state() {
    let mock = MockProjector::start().await.unwrap();
    mock.set_value("modelname", "\"VPL-XW5000\"").await;

    let registry = DeviceRegistry::new();
    let id = online(&registry, config_for(&mock)).await;

    let model = registry.get_attribute(&id, AttributeId::ModelName).unwrap().unwrap();
    assert_eq!(model.value, Some(AttributeValue::Text("VPL-XW5000".to_string())));

    let input = registry.get_attribute(&id, AttributeId::Input).unwrap().unwrap();
    assert_eq!(input.value, Some(AttributeValue::Enum("hdmi1".to_string())));
    assert_eq!(input.validity, Validity::Valid);

    let available = registry.list_available_attributes(&id).unwrap();
    assert!(available.contains(&AttributeId::Power));
    assert!(available.contains(&AttributeId::Input));

    registry.shutdown().await;
}

#[tokio::test]
async fn test_invoke_after_disconnect_reconnects_once() {
    let mock = MockProjector::start().await.unwrap();
    let registry = DeviceRegistry::new();
    let id = online(&registry, config_for(&mock)).await;

    registry.disconnect_all().await;
    let connections = mock.connections().await;
    mock.clear_received().await;

    let report = registry.invoke(&id, &Invocation::new("POWER_ON")).await.unwrap();
    assert_eq!(report.executed.len(), 1);

    assert_eq!(mock.connections().await, connections + 1);
    assert_eq!(mock.received().await, vec!["power \"on\"".to_string()]);

    let power = registry.get_attribute(&id, AttributeId::Power).unwrap().unwrap();
    assert_eq!(power.value, Some(AttributeValue::Enum("on".to_string())));

    registry.shutdown().await;
}

#[tokio::test]
async fn test_rejected_step_reports_index_and_device_text() {
    let mock = MockProjector::start().await.unwrap();
    mock.respond("input \"hdmi2\"", "err_val").await;

    let registry = DeviceRegistry::new();
    let id = online(&registry, config_for(&mock)).await;

    let result = registry
        .invoke(&id, &Invocation::parse("INPUT_HDMI1,INPUT_HDMI2"))
        .await;
    assert_eq!(StatusCode::of(&result), StatusCode::BadRequest);

    match result {
        Err(SdkError::Dispatch(err)) => {
            assert_eq!(err.index, 1);
            assert_eq!(err.id, "INPUT_HDMI2");
            assert_eq!(err.completed.len(), 1);
            assert_eq!(err.user_message(), "err_val");
        }
        other => panic!("Expected SdkError::Dispatch, got {:?}", other),
    }

    let input = registry.get_attribute(&id, AttributeId::Input).unwrap().unwrap();
    assert_eq!(input.value, Some(AttributeValue::Enum("hdmi1".to_string())));

    registry.shutdown().await;
}

#[tokio::test]
async fn test_unsupported_attribute_never_listed() {
    let mock = MockProjector::start().await.unwrap();
    mock.set_value("picture_mode", "\"reference\"").await;
    mock.set_value("hdr", "\"auto\"").await;
    mock.unsupported("hdr").await;

    let registry = DeviceRegistry::new();
    let id = online(&registry, config_for(&mock)).await;

    let available = registry.list_available_attributes(&id).unwrap();
    assert!(available.contains(&AttributeId::PictureMode));
    assert!(!available.contains(&AttributeId::Hdr));

    // The model starts answering, but the probe result sticks
    mock.clear_overrides().await;
    mock.clear_received().await;
    let device = registry.device(&id).unwrap();
    for _ in 0..3 {
        device.refresh(PollKind::Attributes).await;
        device.refresh(PollKind::Options).await;
    }

    assert!(!registry.list_available_attributes(&id).unwrap().contains(&AttributeId::Hdr));
    assert!(!mock.received().await.iter().any(|line| line.starts_with("hdr ")));

    let select = registry
        .select(&id, AttributeId::Hdr, &SelectAction::First)
        .await;
    assert!(matches!(select, Err(SdkError::Unsupported { attribute: AttributeId::Hdr, .. })));

    registry.shutdown().await;
}

#[tokio::test]
async fn test_select_steps_through_options() {
    let mock = MockProjector::start().await.unwrap();
    mock.set_value("picture_mode", "\"reference\"").await;
    mock.respond("picture_mode --option ?", r#"["cinema_film1","reference","tv"]"#)
        .await;

    let registry = DeviceRegistry::new();
    let id = online(&registry, config_for(&mock)).await;
    mock.clear_received().await;

    let next = SelectAction::Next { cycle: true };
    let chosen = registry.select(&id, AttributeId::PictureMode, &next).await.unwrap();
    assert_eq!(chosen.as_deref(), Some("tv"));

    let chosen = registry.select(&id, AttributeId::PictureMode, &next).await.unwrap();
    assert_eq!(chosen.as_deref(), Some("cinema_film1"));

    // Option list is fetched once and then served from the cache
    let received = mock.received().await;
    assert_eq!(
        received
            .iter()
            .filter(|line| line.as_str() == "picture_mode --option ?")
            .count(),
        1
    );
    assert!(received.contains(&"picture_mode \"tv\"".to_string()));
    assert!(received.contains(&"picture_mode \"cinema_film1\"".to_string()));

    let mode = registry.get_attribute(&id, AttributeId::PictureMode).unwrap().unwrap();
    assert_eq!(mode.value, Some(AttributeValue::Enum("cinema_film1".to_string())));

    let unknown = registry
        .select(&id, AttributeId::PictureMode, &SelectAction::Option("vivid".to_string()))
        .await;
    assert_eq!(StatusCode::of(&unknown), StatusCode::BadRequest);

    let not_a_setting = registry
        .select(&id, AttributeId::Power, &SelectAction::First)
        .await;
    assert_eq!(StatusCode::of(&not_a_setting), StatusCode::BadRequest);

    registry.shutdown().await;
}

#[tokio::test]
async fn test_power_off_records_standby_and_emits_change() {
    let mock = MockProjector::start().await.unwrap();
    mock.set_value("power_status", "\"on\"").await;

    let registry = DeviceRegistry::new();
    let id = online(&registry, config_for(&mock)).await;
    let changes = registry.changes();
    while changes.try_recv().is_some() {}

    registry.invoke(&id, &Invocation::new("POWER_OFF")).await.unwrap();

    let power = registry.get_attribute(&id, AttributeId::Power).unwrap().unwrap();
    assert_eq!(power.value, Some(AttributeValue::Enum("standby".to_string())));

    let event = changes
        .recv_timeout(Duration::from_secs(1))
        .await
        .expect("no change event");
    assert_eq!(event.device_id, id);
    assert_eq!(event.attribute, AttributeId::Power);
    assert_eq!(event.kind, ChangeKind::Value);
    assert_eq!(event.value, Some(AttributeValue::Enum("standby".to_string())));

    registry.shutdown().await;
}

#[tokio::test]
async fn test_wrong_password_stops_retrying() {
    let mock = MockProjector::with_password("secret").await.unwrap();
    let registry = DeviceRegistry::new();
    let config = config_for(&mock).with_password(Some("wrong".to_string()));
    let id = config.id.clone();
    registry.add_device(config).unwrap();

    let status = tokio::time::timeout(READY_TIMEOUT, registry.wait_ready(&id))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(status, DeviceStatus::AuthFailed);
    assert_eq!(mock.auth_failures().await, 1);

    let result = registry.invoke(&id, &Invocation::new("POWER_ON")).await;
    assert_eq!(StatusCode::of(&result), StatusCode::Unauthorized);
    assert_eq!(mock.auth_failures().await, 1);

    registry.shutdown().await;
}

#[tokio::test]
async fn test_duplicate_and_unknown_devices() {
    let mock = MockProjector::start().await.unwrap();
    let registry = DeviceRegistry::new();
    let id = online(&registry, config_for(&mock)).await;

    let duplicate = registry.add_device(config_for(&mock).with_name("Again"));
    assert!(matches!(duplicate, Err(SdkError::DuplicateDevice(ref dup)) if *dup == id));

    let missing = DeviceId::from("office");
    let result = registry.invoke(&missing, &Invocation::new("POWER_ON")).await;
    assert_eq!(StatusCode::of(&result), StatusCode::NotFound);

    registry.remove_device(&id).await.unwrap();
    assert_eq!(registry.device_count(), 0);
    assert!(registry.cache().device_ids().is_empty());
    assert!(matches!(
        registry.remove_device(&id).await,
        Err(SdkError::DeviceNotFound(_))
    ));
}

#[tokio::test]
async fn test_standby_and_wake() {
    let mock = MockProjector::start().await.unwrap();
    let registry = DeviceRegistry::new();
    let config = config_for(&mock).with_intervals(PollIntervals {
        attributes: Duration::from_secs(1),
        ..PollIntervals::low_power()
    });
    let id = online(&registry, config).await;

    registry.standby();
    let device = registry.device(&id).unwrap();
    assert!(device.poll_stats().suspended);

    mock.set_value("input", "\"hdmi2\"").await;
    registry.wake();
    assert!(!device.poll_stats().suspended);

    let mut input = None;
    for _ in 0..150 {
        input = registry
            .get_attribute(&id, AttributeId::Input)
            .unwrap()
            .and_then(|snapshot| snapshot.value);
        if input == Some(AttributeValue::Enum("hdmi2".to_string())) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(input, Some(AttributeValue::Enum("hdmi2".to_string())));

    registry.shutdown().await;
}

#[tokio::test]
async fn test_rejected_identity_not_listed() {
    let mock = MockProjector::start().await.unwrap();
    mock.set_value("modelname", "\"VPL-XW7000\"").await;

    let registry = DeviceRegistry::new();
    let id = online(&registry, config_for(&mock)).await;

    // The loopback projector answers err_cmd for serialnum and mac_address
    let available = registry.list_available_attributes(&id).unwrap();
    assert!(available.contains(&AttributeId::ModelName));
    assert!(!available.contains(&AttributeId::SerialNumber));
    assert!(!available.contains(&AttributeId::MacAddress));

    let serial = registry.get_attribute(&id, AttributeId::SerialNumber).unwrap().unwrap();
    assert_eq!(serial.validity, Validity::Unsupported);

    registry.shutdown().await;
}

#[tokio::test]
async fn test_identity_absent_on_model_without_it() {
    let mock = MockProjector::start().await.unwrap();

    let registry = DeviceRegistry::new();
    let id = online(&registry, config_for(&mock)).await;

    assert!(!registry.list_available_attributes(&id).unwrap().contains(&AttributeId::ModelName));

    registry.shutdown().await;
}

#[tokio::test]
async fn test_remove_during_command_leaves_nothing_behind() {
    let mock = MockProjector::start().await.unwrap();
    let registry = DeviceRegistry::new();
    let id = online(&registry, config_for(&mock)).await;

    mock.delay(Some(Duration::from_millis(150))).await;
    let device = registry.device(&id).unwrap();
    let in_flight = tokio::spawn({
        let device = device.clone();
        async move { device.invoke(&Invocation::new("INPUT_HDMI2")).await }
    });

    // The reply has arrived and the follow-up polls are waiting on the wire
    tokio::time::sleep(Duration::from_millis(200)).await;
    registry.remove_device(&id).await.unwrap();
    let connections = mock.connections().await;

    let _ = in_flight.await.unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert!(registry.cache().device_ids().is_empty());
    assert_eq!(mock.connections().await, connections);
    assert_eq!(device.status(), DeviceStatus::Stopped);
    assert_eq!(device.get_attribute(AttributeId::Input), None);

    // A stopped device handle sends nothing
    mock.clear_received().await;
    let report = device.invoke(&Invocation::new("INPUT_HDMI1")).await.unwrap();
    assert!(report.is_canceled());
    let select = device.select(AttributeId::PictureMode, &SelectAction::First).await;
    assert!(matches!(select, Err(SdkError::DeviceNotFound(_))));
    assert!(mock.received().await.is_empty());
    assert!(registry.cache().device_ids().is_empty());
}

#[tokio::test]
async fn test_reconfigure_during_command() {
    let mock = MockProjector::start().await.unwrap();
    let registry = DeviceRegistry::new();
    let id = online(&registry, config_for(&mock)).await;

    mock.delay(Some(Duration::from_millis(150))).await;
    let old = registry.device(&id).unwrap();
    let in_flight = tokio::spawn({
        let old = old.clone();
        async move { old.invoke(&Invocation::new("INPUT_HDMI2")).await }
    });
    tokio::time::sleep(Duration::from_millis(200)).await;

    let new = registry
        .reconfigure(config_for(&mock).with_name("Cinema Room"))
        .await
        .unwrap();
    mock.delay(None).await;
    let status = tokio::time::timeout(READY_TIMEOUT, new.wait_ready()).await.unwrap();
    assert_eq!(status, DeviceStatus::Online);
    let _ = in_flight.await.unwrap();

    assert_eq!(old.status(), DeviceStatus::Stopped);
    assert_eq!(registry.device_count(), 1);
    assert_eq!(registry.device(&id).unwrap().name(), "Cinema Room");
    assert_eq!(registry.cache().device_ids(), vec![id.clone()]);

    // Only the new registration writes to the cache
    mock.set_value("input", "\"hdmi1\"").await;
    new.refresh(PollKind::Attributes).await;
    old.refresh(PollKind::Attributes).await;
    let input = registry.get_attribute(&id, AttributeId::Input).unwrap().unwrap();
    assert_eq!(input.value, Some(AttributeValue::Enum("hdmi1".to_string())));
    assert_eq!(old.get_attribute(AttributeId::Input), None);

    registry.shutdown().await;
}
