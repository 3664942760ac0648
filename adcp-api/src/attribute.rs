//! Device attributes the engine keeps in sync
//!
//! Each attribute maps onto one ADCP query opcode and knows how to decode the
//! raw answer into an [`AttributeValue`].

use serde_json::Value;

use adcp_client::codec::unquote;

use crate::error::{ApiError, Result};
use crate::value::AttributeValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AttributeId {
    Power,
    Input,
    Muted,
    Signal,
    ColorSpace,
    Status3D,
    LightSourceHours,
    Temperature,
    Warnings,
    Errors,
    ModelName,
    SerialNumber,
    MacAddress,
    PictureMode,
    Aspect,
    Motionflow,
    Hdr,
    HdrToneMapping,
    Mode2D3D,
    Format3D,
    DynamicIris,
    DynamicLight,
    LampControl,
    InputLagReduction,
    MenuPosition,
    PicturePosition,
}

/// How the raw answer of a query is decoded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Enum,
    Integer,
    Bool,
    Text,
    List,
    /// `timer ?` answer, a JSON array of `{name: hours}` objects
    LightTimer,
}

/// Which poll task keeps the attribute fresh
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PollGroup {
    /// Fast poll: power, input and picture muting
    Fast,
    /// Slow poll: light source timer and device health
    Health,
    /// Read once after connecting
    Identity,
    /// Picture settings, refreshed on demand together with their options
    Setting,
}

/// Static description of an attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributeInfo {
    /// Stable key used in events and configuration
    pub key: &'static str,
    /// Query opcode, sent as `<opcode> ?`
    pub opcode: &'static str,
    pub kind: ValueKind,
    pub group: PollGroup,
    /// Only offered once a capability probe has seen the model answer it
    pub probed: bool,
}

/// Parameter that asks for the list of selectable values of a setting
pub const OPTIONS_QUERY: &str = "--option ?";

const fn info(
    key: &'static str,
    opcode: &'static str,
    kind: ValueKind,
    group: PollGroup,
    probed: bool,
) -> AttributeInfo {
    AttributeInfo {
        key,
        opcode,
        kind,
        group,
        probed,
    }
}

impl AttributeId {
    pub const ALL: [AttributeId; 26] = [
        AttributeId::Power,
        AttributeId::Input,
        AttributeId::Muted,
        AttributeId::Signal,
        AttributeId::ColorSpace,
        AttributeId::Status3D,
        AttributeId::LightSourceHours,
        AttributeId::Temperature,
        AttributeId::Warnings,
        AttributeId::Errors,
        AttributeId::ModelName,
        AttributeId::SerialNumber,
        AttributeId::MacAddress,
        AttributeId::PictureMode,
        AttributeId::Aspect,
        AttributeId::Motionflow,
        AttributeId::Hdr,
        AttributeId::HdrToneMapping,
        AttributeId::Mode2D3D,
        AttributeId::Format3D,
        AttributeId::DynamicIris,
        AttributeId::DynamicLight,
        AttributeId::LampControl,
        AttributeId::InputLagReduction,
        AttributeId::MenuPosition,
        AttributeId::PicturePosition,
    ];

    pub const fn info(&self) -> AttributeInfo {
        use PollGroup::*;
        use ValueKind::*;

        match self {
            AttributeId::Power => info("power", "power_status", Enum, Fast, false),
            AttributeId::Input => info("input", "input", Enum, Fast, false),
            AttributeId::Muted => info("muted", "blank", Bool, Fast, false),
            AttributeId::Signal => info("signal", "signal", Text, Fast, true),
            AttributeId::ColorSpace => info("color_space", "color_space", Enum, Fast, true),
            AttributeId::Status3D => info("3d_status", "3d_status", Enum, Fast, true),
            AttributeId::LightSourceHours => info("light_source_hours", "timer", LightTimer, Health, true),
            AttributeId::Temperature => info("temperature", "temperature", Text, Health, true),
            AttributeId::Warnings => info("warnings", "warning", List, Health, true),
            AttributeId::Errors => info("errors", "error", List, Health, true),
            AttributeId::ModelName => info("model_name", "modelname", Text, Identity, false),
            AttributeId::SerialNumber => info("serial_number", "serialnum", Text, Identity, false),
            AttributeId::MacAddress => info("mac_address", "mac_address", Text, Identity, false),
            AttributeId::PictureMode => info("picture_mode", "picture_mode", Enum, Setting, true),
            AttributeId::Aspect => info("aspect", "aspect", Enum, Setting, true),
            AttributeId::Motionflow => info("motionflow", "motionflow", Enum, Setting, true),
            AttributeId::Hdr => info("hdr", "hdr", Enum, Setting, true),
            AttributeId::HdrToneMapping => info("hdr_tone_mapping", "hdr_tone_mapping", Enum, Setting, true),
            AttributeId::Mode2D3D => info("2d3d_select", "2d3d_sel", Enum, Setting, true),
            AttributeId::Format3D => info("3d_format", "3d_format", Enum, Setting, true),
            AttributeId::DynamicIris => info("iris_dynamic_control", "iris_dyn_cont", Enum, Setting, true),
            AttributeId::DynamicLight => info("light_output_dynamic", "light_output_dyn", Enum, Setting, true),
            AttributeId::LampControl => info("lamp_control", "lamp_control", Enum, Setting, true),
            AttributeId::InputLagReduction => info("input_lag_reduction", "input_lag_red", Enum, Setting, true),
            AttributeId::MenuPosition => info("menu_position", "menu_pos", Enum, Setting, true),
            AttributeId::PicturePosition => info("picture_position", "pic_pos_sel", Enum, Setting, true),
        }
    }

    pub const fn key(&self) -> &'static str {
        self.info().key
    }

    pub const fn opcode(&self) -> &'static str {
        self.info().opcode
    }

    pub const fn group(&self) -> PollGroup {
        self.info().group
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|attr| attr.key() == key)
    }

    /// All attributes refreshed by `group`
    pub fn in_group(group: PollGroup) -> impl Iterator<Item = AttributeId> {
        Self::ALL.into_iter().filter(move |attr| attr.group() == group)
    }

    /// Attributes checked once per configuration for model support
    pub fn probed() -> impl Iterator<Item = AttributeId> {
        Self::ALL.into_iter().filter(|attr| attr.info().probed)
    }

    /// Settings expose a list of selectable values
    pub fn has_options(&self) -> bool {
        self.group() == PollGroup::Setting
    }

    /// Decode the raw query answer
    pub fn parse(&self, raw: &str) -> Result<AttributeValue> {
        let invalid = || ApiError::InvalidValue {
            attribute: self.key(),
            raw: raw.to_string(),
        };
        let scalar = unquote(raw);

        match self.info().kind {
            ValueKind::Enum if !scalar.is_empty() => Ok(AttributeValue::Enum(scalar.to_string())),
            ValueKind::Text => Ok(AttributeValue::Text(scalar.to_string())),
            ValueKind::Bool => match scalar {
                "on" => Ok(AttributeValue::Bool(true)),
                "off" => Ok(AttributeValue::Bool(false)),
                _ => Err(invalid()),
            },
            ValueKind::Integer => scalar
                .parse()
                .map(AttributeValue::Integer)
                .map_err(|_| invalid()),
            ValueKind::List => parse_list(raw).map(AttributeValue::List).ok_or_else(invalid),
            ValueKind::LightTimer => light_source_hours(raw)
                .map(AttributeValue::Integer)
                .ok_or_else(invalid),
            ValueKind::Enum => Err(invalid()),
        }
    }
}

impl std::fmt::Display for AttributeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

/// Decode a JSON array answer, or a single scalar as a one-element list
pub fn parse_list(raw: &str) -> Option<Vec<String>> {
    let raw = raw.trim();
    if !raw.starts_with('[') {
        let scalar = unquote(raw);
        return (!scalar.is_empty()).then(|| vec![scalar.to_string()]);
    }

    let items: Vec<Value> = serde_json::from_str(raw).ok()?;
    Some(
        items
            .into_iter()
            .map(|item| match item {
                Value::String(s) => s,
                other => other.to_string(),
            })
            .collect(),
    )
}

fn light_source_hours(raw: &str) -> Option<i64> {
    let value: Value = serde_json::from_str(raw.trim()).ok()?;
    let entries = match value {
        Value::Array(entries) => entries,
        object @ Value::Object(_) => vec![object],
        _ => return None,
    };
    entries
        .iter()
        .find_map(|entry| entry.get("light_src").and_then(Value::as_i64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_keys_are_unique() {
        let mut keys: Vec<_> = AttributeId::ALL.iter().map(|a| a.key()).collect();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), AttributeId::ALL.len());
    }

    #[test]
    fn test_from_key() {
        assert_eq!(AttributeId::from_key("muted"), Some(AttributeId::Muted));
        assert_eq!(AttributeId::from_key("picture_mode"), Some(AttributeId::PictureMode));
        assert_eq!(AttributeId::from_key("volume"), None);
    }

    #[test]
    fn test_groups() {
        let fast: Vec<_> = AttributeId::in_group(PollGroup::Fast).collect();
        assert!(fast.contains(&AttributeId::Power));
        assert!(fast.contains(&AttributeId::Input));
        assert!(!fast.contains(&AttributeId::LightSourceHours));

        let health: Vec<_> = AttributeId::in_group(PollGroup::Health).collect();
        assert_eq!(health[0], AttributeId::LightSourceHours);

        assert!(!AttributeId::probed().any(|a| a == AttributeId::Power));
        assert!(AttributeId::PictureMode.has_options());
        assert!(!AttributeId::Input.has_options());
    }

    #[rstest]
    #[case(AttributeId::Power, "\"standby\"", AttributeValue::Enum("standby".into()))]
    #[case(AttributeId::Input, "\"hdmi2\"", AttributeValue::Enum("hdmi2".into()))]
    #[case(AttributeId::Muted, "\"on\"", AttributeValue::Bool(true))]
    #[case(AttributeId::Muted, "\"off\"", AttributeValue::Bool(false))]
    #[case(AttributeId::ModelName, "\"VPL-XW5000\"", AttributeValue::Text("VPL-XW5000".into()))]
    #[case(AttributeId::Temperature, "38", AttributeValue::Text("38".into()))]
    #[case(
        AttributeId::LightSourceHours,
        r#"[{"light_src":1234},{"total":5678}]"#,
        AttributeValue::Integer(1234)
    )]
    #[case(
        AttributeId::Warnings,
        r#"["warn_temp","warn_highland"]"#,
        AttributeValue::List(vec!["warn_temp".into(), "warn_highland".into()])
    )]
    #[case(AttributeId::Errors, "\"no_err\"", AttributeValue::List(vec!["no_err".into()]))]
    fn test_parse(#[case] attr: AttributeId, #[case] raw: &str, #[case] expected: AttributeValue) {
        assert_eq!(attr.parse(raw).unwrap(), expected);
    }

    #[rstest]
    #[case(AttributeId::Muted, "\"maybe\"")]
    #[case(AttributeId::LightSourceHours, r#"[{"total":5678}]"#)]
    #[case(AttributeId::LightSourceHours, "not json")]
    #[case(AttributeId::Input, "\"\"")]
    fn test_parse_rejects(#[case] attr: AttributeId, #[case] raw: &str) {
        match attr.parse(raw) {
            Err(ApiError::InvalidValue { attribute, .. }) => assert_eq!(attribute, attr.key()),
            other => panic!("Expected ApiError::InvalidValue, got {:?}", other),
        }
    }
}
