//! Choosing a value for a setting from its option list

use crate::attribute::AttributeId;
use crate::error::{ApiError, Result};

/// How to pick the next value of a setting
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectAction {
    /// An explicit option
    Option(String),
    First,
    Last,
    /// Step forward, wrapping to the first option when `cycle` is set
    Next { cycle: bool },
    /// Step backward, wrapping to the last option when `cycle` is set
    Previous { cycle: bool },
}

/// Pick the option to send
///
/// Returns `Ok(None)` when the action leaves the setting unchanged, i.e. when
/// stepping past either end without cycling. A current value that is not in
/// the list falls back to the first option.
pub fn resolve_option(
    attribute: AttributeId,
    options: &[String],
    current: Option<&str>,
    action: &SelectAction,
) -> Result<Option<String>> {
    let empty = || ApiError::InvalidValue {
        attribute: attribute.key(),
        raw: "[]".to_string(),
    };

    let chosen = match action {
        SelectAction::Option(option) => {
            if !options.is_empty() && !options.iter().any(|o| o == option) {
                return Err(ApiError::UnknownOption {
                    attribute: attribute.key(),
                    option: option.clone(),
                });
            }
            return Ok(Some(option.clone()));
        }
        SelectAction::First => options.first(),
        SelectAction::Last => options.last(),
        SelectAction::Next { cycle } | SelectAction::Previous { cycle } => {
            let last = options.len().checked_sub(1).ok_or_else(empty)?;
            let Some(index) = current.and_then(|c| options.iter().position(|o| o == c)) else {
                return Ok(options.first().cloned());
            };

            let forward = matches!(action, SelectAction::Next { .. });
            let target = match (forward, index == last, index == 0) {
                (true, true, _) if !cycle => return Ok(None),
                (true, true, _) => 0,
                (true, false, _) => index + 1,
                (false, _, true) if !cycle => return Ok(None),
                (false, _, true) => last,
                (false, _, false) => index - 1,
            };
            options.get(target)
        }
    };

    chosen.cloned().map(Some).ok_or_else(empty)
}
