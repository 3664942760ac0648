//! Single poll runs
//!
//! Each function queries a group of attributes through a
//! [`CommandExecutor`] and feeds the answers into a [`DeviceCache`]. None of
//! them fail: problems are counted in the returned [`PollReport`] and logged.

use std::fmt;

use adcp_api::attribute::parse_list;
use adcp_api::{
    AttributeId, CommandExecutor, PollGroup, PowerState, Reply, SessionError, OPTIONS_QUERY,
};
use adcp_state::{DeviceCache, Observation};
use tracing::{debug, trace};

/// What a poll task refreshes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PollKind {
    /// Fast poll: power, input, picture muting and signal
    Attributes,
    /// Slow poll: light source hours and device health
    Health,
    /// Picture settings together with their selectable options
    Options,
}

impl PollKind {
    pub const ALL: [PollKind; 3] = [PollKind::Attributes, PollKind::Health, PollKind::Options];

    fn group(&self) -> PollGroup {
        match self {
            PollKind::Attributes => PollGroup::Fast,
            PollKind::Health => PollGroup::Health,
            PollKind::Options => PollGroup::Setting,
        }
    }
}

impl fmt::Display for PollKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PollKind::Attributes => write!(f, "attributes"),
            PollKind::Health => write!(f, "health"),
            PollKind::Options => write!(f, "options"),
        }
    }
}

/// Outcome of one poll run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollReport {
    /// Frames sent
    pub queried: usize,
    /// Cache entries that changed
    pub updated: usize,
    /// Transport failures and unparseable answers
    pub errors: usize,
    /// Nothing was sent because the projector is off
    pub skipped: bool,
    /// Power classification before and after, when it flipped
    pub power_transition: Option<(PowerState, PowerState)>,
}

impl PollReport {
    fn skipped() -> Self {
        Self {
            skipped: true,
            ..Default::default()
        }
    }

    fn absorb(&mut self, other: PollReport) {
        self.queried += other.queried;
        self.updated += other.updated;
        self.errors += other.errors;
    }
}

/// Run one poll of `kind`
pub async fn poll(kind: PollKind, executor: &dyn CommandExecutor, cache: &DeviceCache) -> PollReport {
    match kind {
        PollKind::Attributes => poll_attributes(executor, cache).await,
        PollKind::Health => poll_health(executor, cache).await,
        PollKind::Options => poll_options(executor, cache).await,
    }
}

/// Fast poll, noting a power on/off flip
pub async fn poll_attributes(executor: &dyn CommandExecutor, cache: &DeviceCache) -> PollReport {
    let before = cache.power();
    let mut report = query_all(executor, cache, polled(cache, PollKind::Attributes), false).await;
    let after = cache.power();

    if let (Some(before), Some(after)) = (before, after) {
        if before != after {
            debug!(device = %cache.id(), ?before, ?after, "power transition");
            report.power_transition = Some((before, after));
        }
    }
    report
}

/// Health poll, skipped while the projector is known to be off
pub async fn poll_health(executor: &dyn CommandExecutor, cache: &DeviceCache) -> PollReport {
    if cache.power() == Some(PowerState::Off) {
        debug!(device = %cache.id(), "projector is off, skipping health poll");
        return PollReport::skipped();
    }
    query_all(executor, cache, polled(cache, PollKind::Health), false).await
}

/// Refresh each supported setting and its option list
pub async fn poll_options(executor: &dyn CommandExecutor, cache: &DeviceCache) -> PollReport {
    let settings = polled(cache, PollKind::Options);
    let mut report = query_all(executor, cache, settings.clone(), false).await;

    for attribute in settings {
        report.queried += 1;
        match query_options(executor, attribute).await {
            Ok(Some(options)) => {
                if cache.set_options(attribute, options) {
                    report.updated += 1;
                }
            }
            Ok(None) => {
                debug!(device = %cache.id(), %attribute, "unexpected option list");
                report.errors += 1;
            }
            Err(err) if err.device_error().is_some() => {
                trace!(device = %cache.id(), %attribute, error = %err, "options not available");
            }
            Err(err) => {
                debug!(device = %cache.id(), %attribute, error = %err, "options poll failed");
                report.errors += 1;
            }
        }
    }
    report
}

/// Ask for the selectable values of a setting
pub async fn query_options(
    executor: &dyn CommandExecutor,
    attribute: AttributeId,
) -> Result<Option<Vec<String>>, SessionError> {
    match executor
        .execute_command(attribute.opcode(), Some(OPTIONS_QUERY))
        .await?
    {
        Reply::Data(raw) => Ok(parse_list(&raw)),
        Reply::Ack => Ok(None),
    }
}

/// Query every attribute that needs a capability check
///
/// Answers and `err_inactive` mark the attribute supported, `err_cmd` and
/// `err_option` mark it unsupported for good. Attributes that fail with a
/// transport error stay unknown and are not listed as available.
pub async fn probe(executor: &dyn CommandExecutor, cache: &DeviceCache) -> PollReport {
    let attributes = AttributeId::probed().filter(|attr| !cache.is_unsupported(*attr));
    let report = query_all(executor, cache, attributes.collect(), true).await;
    debug!(
        device = %cache.id(),
        unsupported = AttributeId::probed().filter(|a| cache.is_unsupported(*a)).count(),
        "capability probe done"
    );
    report
}

/// Model name, serial number and MAC address
///
/// Fields the model rejects with `err_cmd` are marked unsupported.
pub async fn read_identity(executor: &dyn CommandExecutor, cache: &DeviceCache) -> PollReport {
    let identity = AttributeId::in_group(PollGroup::Identity)
        .filter(|attr| !cache.is_unsupported(*attr))
        .collect();
    query_all(executor, cache, identity, true).await
}

/// Fast, health and setting values in one pass, ignoring the power state
pub async fn refresh(executor: &dyn CommandExecutor, cache: &DeviceCache) -> PollReport {
    let mut report = poll_attributes(executor, cache).await;
    let rest = [PollKind::Health, PollKind::Options]
        .into_iter()
        .flat_map(|kind| polled(cache, kind))
        .collect();
    report.absorb(query_all(executor, cache, rest, false).await);
    report
}

/// Attributes of a kind worth asking for
///
/// Probed attributes are only polled once the probe found them supported.
fn polled(cache: &DeviceCache, kind: PollKind) -> Vec<AttributeId> {
    AttributeId::in_group(kind.group())
        .filter(|attr| match cache.get(*attr) {
            Some(snapshot) => snapshot.is_supported(),
            None => !attr.info().probed,
        })
        .collect()
}

async fn query_all(
    executor: &dyn CommandExecutor,
    cache: &DeviceCache,
    attributes: Vec<AttributeId>,
    probing: bool,
) -> PollReport {
    let mut report = PollReport::default();

    for attribute in attributes {
        report.queried += 1;
        let observation = match executor.query(attribute.opcode()).await {
            Ok(raw) => Observation::Value(raw),
            Err(err) => match Observation::from_error(&err) {
                Some(observation) => observation,
                None => {
                    debug!(device = %cache.id(), %attribute, error = %err, "poll query failed");
                    report.errors += 1;
                    continue;
                }
            },
        };

        // The first answer of an attribute is its capability check
        let applied = if probing || cache.get(attribute).is_none() {
            cache.probe(attribute, observation)
        } else {
            cache.apply(attribute, observation)
        };
        match applied {
            Ok(true) => report.updated += 1,
            Ok(false) => {}
            Err(err) => {
                debug!(device = %cache.id(), error = %err, "ignoring answer");
                report.errors += 1;
            }
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeProjector;
    use adcp_api::AttributeValue;
    use adcp_state::{DeviceId, StateCache, Validity};

    fn cache() -> DeviceCache {
        StateCache::new().device(&DeviceId::from("cinema"))
    }

    #[tokio::test]
    async fn test_attributes_poll_updates_cache() {
        let projector = FakeProjector::new();
        projector.answer("power_status", "\"on\"");
        projector.answer("input", "\"hdmi2\"");
        projector.answer("blank", "\"off\"");
        let cache = cache();

        let report = poll_attributes(&projector, &cache).await;

        // Probed attributes are left alone until the probe has run
        assert_eq!(report.queried, 3);
        assert_eq!(report.updated, 3);
        assert_eq!(report.power_transition, None);
        assert_eq!(cache.value(AttributeId::Input), Some(AttributeValue::Enum("hdmi2".into())));
        assert_eq!(cache.value(AttributeId::Muted), Some(AttributeValue::Bool(false)));
    }

    #[tokio::test]
    async fn test_attributes_poll_reports_power_transition() {
        let projector = FakeProjector::new();
        let cache = cache();
        cache.set(AttributeId::Power, AttributeValue::Enum("standby".into()));
        projector.answer("power_status", "\"startup\"");

        let report = poll_attributes(&projector, &cache).await;
        assert_eq!(report.power_transition, Some((PowerState::Off, PowerState::On)));
    }

    #[tokio::test]
    async fn test_inactive_marks_unavailable_and_keeps_value() {
        let projector = FakeProjector::new();
        let cache = cache();
        cache.set(AttributeId::Input, AttributeValue::Enum("hdmi1".into()));
        projector.answer("power_status", "\"standby\"");
        projector.reject("input", "err_inactive");

        let report = poll_attributes(&projector, &cache).await;

        assert_eq!(report.errors, 0);
        let snapshot = cache.get(AttributeId::Input).unwrap();
        assert_eq!(snapshot.validity, Validity::Unavailable);
        assert_eq!(snapshot.value, Some(AttributeValue::Enum("hdmi1".into())));
    }

    #[tokio::test]
    async fn test_transport_error_counted_not_cached() {
        let projector = FakeProjector::new();
        let cache = cache();
        projector.disconnect("power_status");

        let report = poll_attributes(&projector, &cache).await;
        assert!(report.errors >= 1);
        assert!(cache.get(AttributeId::Power).is_none());
    }

    #[tokio::test]
    async fn test_health_skipped_while_off() {
        let projector = FakeProjector::new();
        let cache = cache();
        cache.set(AttributeId::Power, AttributeValue::Enum("cooling1".into()));

        let report = poll_health(&projector, &cache).await;

        assert!(report.skipped);
        assert!(projector.sent().is_empty());
    }

    #[tokio::test]
    async fn test_health_polls_light_source_when_on() {
        let projector = FakeProjector::new();
        let cache = cache();
        cache.set(AttributeId::Power, AttributeValue::Enum("on".into()));
        cache
            .probe(AttributeId::LightSourceHours, Observation::Value(r#"[{"light_src":10}]"#.into()))
            .unwrap();
        projector.answer("timer", r#"[{"light_src":12}]"#);

        let report = poll_health(&projector, &cache).await;

        assert!(!report.skipped);
        assert_eq!(projector.sent(), vec!["timer ?".to_string()]);
        assert_eq!(cache.value(AttributeId::LightSourceHours), Some(AttributeValue::Integer(12)));
    }

    #[tokio::test]
    async fn test_probe_marks_unsupported() {
        let projector = FakeProjector::new();
        let cache = cache();
        projector.answer("picture_mode", "\"reference\"");
        projector.reject("signal", "err_inactive");
        projector.reject("hdr", "err_cmd");
        projector.reject("3d_format", "err_option");

        probe(&projector, &cache).await;

        assert!(cache.is_unsupported(AttributeId::Hdr));
        assert!(cache.is_unsupported(AttributeId::Format3D));
        let available = cache.available();
        assert!(available.contains(&AttributeId::PictureMode));
        assert!(available.contains(&AttributeId::Signal));
        assert!(!available.contains(&AttributeId::Hdr));

        // Unsupported attributes are not asked again
        projector.clear_sent();
        probe(&projector, &cache).await;
        assert!(!projector.sent().contains(&"hdr ?".to_string()));
    }

    #[tokio::test]
    async fn test_options_poll_stores_option_list() {
        let projector = FakeProjector::new();
        let cache = cache();
        cache
            .probe(AttributeId::PictureMode, Observation::Value("\"reference\"".into()))
            .unwrap();
        projector.answer("picture_mode", "\"game\"");
        projector.answer("picture_mode --option", r#"["cinema_film1","reference","game"]"#);

        let report = poll_options(&projector, &cache).await;

        assert_eq!(report.errors, 0);
        assert_eq!(
            cache.options(AttributeId::PictureMode),
            Some(vec!["cinema_film1".into(), "reference".into(), "game".into()])
        );
        assert_eq!(cache.value(AttributeId::PictureMode), Some(AttributeValue::Enum("game".into())));
        assert!(projector.sent().contains(&"picture_mode --option ?".to_string()));
    }

    #[tokio::test]
    async fn test_identity_rejection_hides_field() {
        let projector = FakeProjector::new();
        let cache = cache();
        projector.answer("modelname", "\"VPL-XW5000\"");
        projector.reject("serialnum", "err_cmd");

        read_identity(&projector, &cache).await;

        assert!(cache.is_unsupported(AttributeId::SerialNumber));
        assert!(cache.is_unsupported(AttributeId::MacAddress));
        let available = cache.available();
        assert!(available.contains(&AttributeId::ModelName));
        assert!(!available.contains(&AttributeId::SerialNumber));

        projector.clear_sent();
        read_identity(&projector, &cache).await;
        assert_eq!(projector.sent(), vec!["modelname ?".to_string()]);
    }

    #[tokio::test]
    async fn test_fast_attribute_rejected_on_first_contact() {
        let projector = FakeProjector::new();
        let cache = cache();
        projector.answer("power_status", "\"on\"");
        projector.answer("input", "\"hdmi1\"");
        projector.reject("blank", "err_cmd");

        poll_attributes(&projector, &cache).await;
        assert!(cache.is_unsupported(AttributeId::Muted));
        assert!(!cache.available().contains(&AttributeId::Muted));

        // Once an attribute has answered, a later rejection does not hide it
        projector.reject("input", "err_cmd");
        poll_attributes(&projector, &cache).await;
        assert!(!cache.is_unsupported(AttributeId::Input));
        assert_eq!(cache.value(AttributeId::Input), Some(AttributeValue::Enum("hdmi1".into())));
        // Unsupported attributes drop out of the fast poll
        let blank_queries = projector.sent().iter().filter(|frame| *frame == "blank ?").count();
        assert_eq!(blank_queries, 1);
    }

    #[tokio::test]
    async fn test_identity_read() {
        let projector = FakeProjector::new();
        let cache = cache();
        projector.answer("modelname", "\"VPL-XW7000\"");
        projector.answer("serialnum", "\"1234567\"");
        projector.answer("mac_address", "\"00:11:22:33:44:55\"");

        let report = read_identity(&projector, &cache).await;

        assert_eq!(report.updated, 3);
        assert_eq!(
            cache.value(AttributeId::ModelName),
            Some(AttributeValue::Text("VPL-XW7000".into()))
        );
    }
}
