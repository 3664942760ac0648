//! Static command table
//!
//! Maps abstract command ids such as `POWER_ON` or `LENS_SHIFT_UP` onto ADCP
//! opcodes and parameters. The table is plain data built once on first use;
//! lookups upper-case the id so callers need not match case.

use std::collections::HashMap;
use std::sync::OnceLock;

use adcp_client::codec::{quote, QUERY_PARAM};

use crate::attribute::AttributeId;
use crate::error::{ApiError, Result};

/// How the parameter of a command is encoded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamRule {
    /// Bare opcode
    None,
    /// Quoted enumerated value, e.g. `input "hdmi1"`
    Enumerated(&'static str),
    /// Unquoted flag, e.g. `pic_pos_save --custom1`
    Flag(&'static str),
    /// Relative adjustment, e.g. `brightness +1`
    SignedDelta(i32),
    /// Query the attribute and send the opposite of the current value
    Toggle { on: &'static str, off: &'static str },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Setter,
    Query,
}

/// Immutable description of one command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandDescriptor {
    pub id: &'static str,
    pub opcode: &'static str,
    pub param: ParamRule,
    pub kind: CommandKind,
    /// The device rejects the command unless a video signal is present
    pub requires_signal: bool,
    /// Attribute whose value is the sent parameter once the setter succeeds
    pub effect: Option<AttributeId>,
}

impl CommandDescriptor {
    const fn setter(id: &'static str, opcode: &'static str, param: ParamRule) -> Self {
        Self {
            id,
            opcode,
            param,
            kind: CommandKind::Setter,
            requires_signal: false,
            effect: None,
        }
    }

    const fn query(id: &'static str, attribute: AttributeId) -> Self {
        Self {
            id,
            opcode: attribute.opcode(),
            param: ParamRule::None,
            kind: CommandKind::Query,
            requires_signal: false,
            effect: None,
        }
    }

    const fn key(id: &'static str, key: &'static str) -> Self {
        Self::setter(id, "key", ParamRule::Enumerated(key))
    }

    const fn set(id: &'static str, attribute: AttributeId, value: &'static str) -> Self {
        Self::setter(id, attribute.opcode(), ParamRule::Enumerated(value)).affects(attribute)
    }

    const fn affects(mut self, attribute: AttributeId) -> Self {
        self.effect = Some(attribute);
        self
    }

    const fn with_signal(mut self) -> Self {
        self.requires_signal = true;
        self
    }

    pub fn is_query(&self) -> bool {
        self.kind == CommandKind::Query
    }

    /// Encoded parameter for fixed-parameter commands
    ///
    /// Returns `None` for bare commands and for toggles, whose parameter depends
    /// on the current device state.
    pub fn encode_param(&self) -> Option<String> {
        if self.is_query() {
            return Some(QUERY_PARAM.to_string());
        }
        match self.param {
            ParamRule::None | ParamRule::Toggle { .. } => None,
            ParamRule::Enumerated(value) => Some(quote(value)),
            ParamRule::Flag(flag) => Some(format!("--{flag}")),
            ParamRule::SignedDelta(delta) => Some(format!("{delta:+}")),
        }
    }
}

use AttributeId as A;
use CommandDescriptor as C;

static COMMANDS: &[CommandDescriptor] = &[
    // Power
    C::set("POWER_ON", A::Power, "on").with_opcode("power"),
    C::set("POWER_OFF", A::Power, "off").with_opcode("power"),
    C::key("POWER_TOGGLE", "power"),
    // Navigation
    C::key("MENU", "menu"),
    C::key("UP", "up"),
    C::key("DOWN", "down"),
    C::key("LEFT", "left"),
    C::key("RIGHT", "right"),
    C::key("ENTER", "enter"),
    // Inputs
    C::set("INPUT_HDMI1", A::Input, "hdmi1"),
    C::set("INPUT_HDMI2", A::Input, "hdmi2"),
    // Picture muting
    C::set("MUTE_ON", A::Muted, "on"),
    C::set("MUTE_OFF", A::Muted, "off"),
    C::setter("PICTURE_MUTING_TOGGLE", "blank", ParamRule::Toggle { on: "on", off: "off" }).affects(A::Muted),
    // Lens
    C::key("LENS_FOCUS_NEAR", "lens_focus_near"),
    C::key("LENS_FOCUS_FAR", "lens_focus_far"),
    C::key("LENS_ZOOM_LARGE", "lens_zoom_up"),
    C::key("LENS_ZOOM_SMALL", "lens_zoom_down"),
    C::key("LENS_SHIFT_UP", "lens_shift_up"),
    C::key("LENS_SHIFT_DOWN", "lens_shift_down"),
    C::key("LENS_SHIFT_LEFT", "lens_shift_left"),
    C::key("LENS_SHIFT_RIGHT", "lens_shift_right"),
    C::key("LASER_DIM_UP", "laser_brightness+"),
    C::key("LASER_DIM_DOWN", "laser_brightness-"),
    // Picture presets
    C::set("MODE_PRESET_CINEMA_FILM_1", A::PictureMode, "cinema_film1").with_signal(),
    C::set("MODE_PRESET_CINEMA_FILM_2", A::PictureMode, "cinema_film2").with_signal(),
    C::set("MODE_PRESET_REF", A::PictureMode, "reference").with_signal(),
    C::set("MODE_PRESET_TV", A::PictureMode, "tv").with_signal(),
    C::set("MODE_PRESET_PHOTO", A::PictureMode, "photo").with_signal(),
    C::set("MODE_PRESET_BRIGHT_CINEMA", A::PictureMode, "brt_cinema").with_signal(),
    C::set("MODE_PRESET_BRIGHT_TV", A::PictureMode, "brt_tv").with_signal(),
    C::set("MODE_PRESET_USER", A::PictureMode, "user").with_signal(),
    C::set("MODE_PRESET_USER1", A::PictureMode, "user1").with_signal(),
    C::set("MODE_PRESET_USER2", A::PictureMode, "user2").with_signal(),
    C::set("MODE_PRESET_USER3", A::PictureMode, "user3").with_signal(),
    C::set("MODE_PRESET_GAME", A::PictureMode, "game").with_signal(),
    // Aspect
    C::set("MODE_ASPECT_RATIO_FULL1", A::Aspect, "full1").with_signal(),
    C::set("MODE_ASPECT_RATIO_FULL2", A::Aspect, "full2").with_signal(),
    C::set("MODE_ASPECT_RATIO_NORMAL", A::Aspect, "normal").with_signal(),
    C::set("MODE_ASPECT_RATIO_STRETCH", A::Aspect, "stretch").with_signal(),
    C::set("MODE_ASPECT_RATIO_V_STRETCH", A::Aspect, "v_stretch").with_signal(),
    C::set("MODE_ASPECT_RATIO_SQUEEZE", A::Aspect, "squeeze").with_signal(),
    C::set("MODE_ASPECT_RATIO_1_85_ZOOM", A::Aspect, "1.85_1_zoom").with_signal(),
    C::set("MODE_ASPECT_RATIO_2_35_ZOOM", A::Aspect, "2.35_1_zoom").with_signal(),
    // Motionflow
    C::set("MODE_MOTIONFLOW_SMOOTH_HIGH", A::Motionflow, "smooth_high").with_signal(),
    C::set("MODE_MOTIONFLOW_SMOOTH_LOW", A::Motionflow, "smooth_low").with_signal(),
    C::set("MODE_MOTIONFLOW_IMPULSE", A::Motionflow, "impulse").with_signal(),
    C::set("MODE_MOTIONFLOW_COMBINATION", A::Motionflow, "combination").with_signal(),
    C::set("MODE_MOTIONFLOW_TRUE_CINEMA", A::Motionflow, "true_cinema").with_signal(),
    C::set("MODE_MOTIONFLOW_OFF", A::Motionflow, "off").with_signal(),
    // HDR
    C::set("MODE_HDR_ON", A::Hdr, "on").with_signal(),
    C::set("MODE_HDR_OFF", A::Hdr, "off").with_signal(),
    C::set("MODE_HDR_AUTO", A::Hdr, "auto").with_signal(),
    C::set("MODE_HDR_HLG", A::Hdr, "hlg").with_signal(),
    C::set("MODE_HDR_HDR10", A::Hdr, "hdr10").with_signal(),
    C::set("MODE_HDR_REFERENCE", A::Hdr, "hdr_reference").with_signal(),
    C::set("MODE_HDR_TONE_MAPPING_1", A::HdrToneMapping, "mode1").with_signal(),
    C::set("MODE_HDR_TONE_MAPPING_2", A::HdrToneMapping, "mode2").with_signal(),
    C::set("MODE_HDR_TONE_MAPPING_3", A::HdrToneMapping, "mode3").with_signal(),
    C::set("MODE_HDR_TONE_MAPPING_OFF", A::HdrToneMapping, "off").with_signal(),
    // 2D / 3D
    C::set("MODE_2D3D_AUTO", A::Mode2D3D, "auto").with_signal(),
    C::set("MODE_2D3D_3D", A::Mode2D3D, "3d").with_signal(),
    C::set("MODE_2D3D_2D", A::Mode2D3D, "2d").with_signal(),
    C::set("MODE_3D_FORMAT_SIMULATED", A::Format3D, "simulated").with_signal(),
    C::set("MODE_3D_FORMAT_SIDE_BY_SIDE", A::Format3D, "sidebyside").with_signal(),
    C::set("MODE_3D_FORMAT_OVER_UNDER", A::Format3D, "overunder").with_signal(),
    // Light source
    C::set("DYN_IRIS_OFF", A::DynamicIris, "off").with_signal(),
    C::set("DYN_IRIS_FULL", A::DynamicIris, "full").with_signal(),
    C::set("DYN_IRIS_LIMITED", A::DynamicIris, "limited").with_signal(),
    C::set("DYN_LIGHT_OFF", A::DynamicLight, "off").with_signal(),
    C::set("DYN_LIGHT_FULL", A::DynamicLight, "full").with_signal(),
    C::set("DYN_LIGHT_LIMITED", A::DynamicLight, "limited").with_signal(),
    C::set("LAMP_CONTROL_LOW", A::LampControl, "low"),
    C::set("LAMP_CONTROL_HIGH", A::LampControl, "high"),
    // Misc settings
    C::set("INPUT_LAG_REDUCTION_ON", A::InputLagReduction, "on").with_signal(),
    C::set("INPUT_LAG_REDUCTION_OFF", A::InputLagReduction, "off").with_signal(),
    C::set("MENU_POSITION_BOTTOM_LEFT", A::MenuPosition, "bottom_left"),
    C::set("MENU_POSITION_CENTER", A::MenuPosition, "center"),
    // Picture position
    C::set("PICTURE_POSITION_1_85", A::PicturePosition, "1.85_1").with_signal(),
    C::set("PICTURE_POSITION_2_35", A::PicturePosition, "2.35_1").with_signal(),
    C::set("PICTURE_POSITION_CUSTOM_1", A::PicturePosition, "custom1").with_signal(),
    C::set("PICTURE_POSITION_CUSTOM_2", A::PicturePosition, "custom2").with_signal(),
    C::set("PICTURE_POSITION_CUSTOM_3", A::PicturePosition, "custom3").with_signal(),
    C::set("PICTURE_POSITION_CUSTOM_4", A::PicturePosition, "custom4").with_signal(),
    C::set("PICTURE_POSITION_CUSTOM_5", A::PicturePosition, "custom5").with_signal(),
    C::setter("PICTURE_POSITION_SAVE_1_85", "pic_pos_save", ParamRule::Flag("1.85_1")).with_signal(),
    C::setter("PICTURE_POSITION_SAVE_2_35", "pic_pos_save", ParamRule::Flag("2.35_1")).with_signal(),
    C::setter("PICTURE_POSITION_SAVE_CUSTOM_1", "pic_pos_save", ParamRule::Flag("custom1")).with_signal(),
    C::setter("PICTURE_POSITION_SAVE_CUSTOM_2", "pic_pos_save", ParamRule::Flag("custom2")).with_signal(),
    C::setter("PICTURE_POSITION_SAVE_CUSTOM_3", "pic_pos_save", ParamRule::Flag("custom3")).with_signal(),
    C::setter("PICTURE_POSITION_SAVE_CUSTOM_4", "pic_pos_save", ParamRule::Flag("custom4")).with_signal(),
    C::setter("PICTURE_POSITION_SAVE_CUSTOM_5", "pic_pos_save", ParamRule::Flag("custom5")).with_signal(),
    // Picture adjustments
    C::setter("BRIGHTNESS_UP", "brightness", ParamRule::SignedDelta(1)).with_signal(),
    C::setter("BRIGHTNESS_DOWN", "brightness", ParamRule::SignedDelta(-1)).with_signal(),
    C::setter("CONTRAST_UP", "contrast", ParamRule::SignedDelta(1)).with_signal(),
    C::setter("CONTRAST_DOWN", "contrast", ParamRule::SignedDelta(-1)).with_signal(),
    // Queries
    C::query("QUERY_POWER", A::Power),
    C::query("QUERY_INPUT", A::Input),
    C::query("QUERY_MUTE", A::Muted),
    C::query("QUERY_SIGNAL", A::Signal),
    C::query("QUERY_COLOR_SPACE", A::ColorSpace),
    C::query("QUERY_3D_STATUS", A::Status3D),
    C::query("QUERY_TIMER", A::LightSourceHours),
    C::query("QUERY_TEMPERATURE", A::Temperature),
    C::query("QUERY_WARNING", A::Warnings),
    C::query("QUERY_ERROR", A::Errors),
    C::query("QUERY_MODEL", A::ModelName),
    C::query("QUERY_SERIAL", A::SerialNumber),
    C::query("QUERY_MAC", A::MacAddress),
];

impl CommandDescriptor {
    const fn with_opcode(mut self, opcode: &'static str) -> Self {
        self.opcode = opcode;
        self
    }
}

fn table() -> &'static HashMap<&'static str, &'static CommandDescriptor> {
    static TABLE: OnceLock<HashMap<&'static str, &'static CommandDescriptor>> = OnceLock::new();
    TABLE.get_or_init(|| COMMANDS.iter().map(|cmd| (cmd.id, cmd)).collect())
}

/// Look up a single command id
///
/// Ids are trimmed and upper-cased first. Sequences must be split by the caller.
pub fn resolve(id: &str) -> Result<&'static CommandDescriptor> {
    let key = id.trim().to_ascii_uppercase();
    table()
        .get(key.as_str())
        .copied()
        .ok_or_else(|| ApiError::UnknownCommand(id.trim().to_string()))
}

/// Every command known to the table
pub fn descriptors() -> &'static [CommandDescriptor] {
    COMMANDS
}

#[cfg(test)]
mod tests {
    use super::*;
    use adcp_client::CommandFrame;

    #[test]
    fn test_ids_are_unique_and_uppercase() {
        assert_eq!(table().len(), COMMANDS.len());
        for cmd in descriptors() {
            assert_eq!(cmd.id, cmd.id.to_ascii_uppercase());
        }
    }

    #[test]
    fn test_resolve_normalizes_case() {
        let cmd = resolve("power_on").unwrap();
        assert_eq!(cmd.id, "POWER_ON");
        assert_eq!(cmd.opcode, "power");
        assert_eq!(cmd.encode_param().as_deref(), Some("\"on\""));
        assert_eq!(cmd.effect, Some(AttributeId::Power));

        assert_eq!(resolve("  Input_Hdmi1 ").unwrap().id, "INPUT_HDMI1");
    }

    #[test]
    fn test_resolve_unknown() {
        match resolve("WARP_DRIVE") {
            Err(ApiError::UnknownCommand(id)) => assert_eq!(id, "WARP_DRIVE"),
            other => panic!("Expected ApiError::UnknownCommand, got {:?}", other),
        }
        // Sequences are not resolved by the table
        assert!(resolve("POWER_ON,POWER_OFF").is_err());
    }

    #[test]
    fn test_param_encoding() {
        assert_eq!(resolve("LENS_SHIFT_UP").unwrap().encode_param().as_deref(), Some("\"lens_shift_up\""));
        assert_eq!(
            resolve("PICTURE_POSITION_SAVE_CUSTOM_1").unwrap().encode_param().as_deref(),
            Some("--custom1")
        );
        assert_eq!(resolve("BRIGHTNESS_DOWN").unwrap().encode_param().as_deref(), Some("-1"));
        assert_eq!(resolve("BRIGHTNESS_UP").unwrap().encode_param().as_deref(), Some("+1"));
        assert_eq!(resolve("QUERY_TIMER").unwrap().encode_param().as_deref(), Some("?"));
        assert_eq!(resolve("PICTURE_MUTING_TOGGLE").unwrap().encode_param(), None);
    }

    #[test]
    fn test_signal_flags() {
        assert!(resolve("MODE_PRESET_GAME").unwrap().requires_signal);
        assert!(!resolve("POWER_ON").unwrap().requires_signal);
        assert!(resolve("QUERY_POWER").unwrap().is_query());
    }

    proptest::proptest! {
        #[test]
        fn prop_resolve_ignores_case(index in 0..COMMANDS.len(), mask in proptest::collection::vec(proptest::bool::ANY, 40)) {
            let id: String = COMMANDS[index]
                .id
                .chars()
                .zip(mask.iter().cycle())
                .map(|(c, lower)| if *lower { c.to_ascii_lowercase() } else { c })
                .collect();
            proptest::prop_assert_eq!(resolve(&id).unwrap().id, COMMANDS[index].id);
        }
    }

    #[test]
    fn test_every_descriptor_round_trips_through_codec() {
        for cmd in descriptors() {
            let param = cmd.encode_param().or_else(|| match cmd.param {
                ParamRule::Toggle { on, .. } => Some(quote(on)),
                _ => None,
            });
            let frame = CommandFrame::new(cmd.opcode, param.clone());
            let parsed = CommandFrame::parse(&frame.encode()).unwrap();
            assert_eq!(parsed.opcode, cmd.opcode, "opcode of {}", cmd.id);
            assert_eq!(parsed.param, param, "param of {}", cmd.id);
            assert_eq!(parsed.is_query(), cmd.is_query(), "kind of {}", cmd.id);
        }
    }
}
