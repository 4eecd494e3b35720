//! Ability launch configuration
//!
//! JSON document binding key patterns and gestures to abilities:
//!
//! ```json
//! {
//!   "Shortcuts": [{ "preKey": [2072], "finalKey": 2035, "triggerType": "key_down",
//!                   "keyDownDuration": 0, "ability": { "bundleName": "...", "abilityName": "..." } }],
//!   "Sequences": [{ "sequenceKeys": [{ "keyCode": 18, "keyAction": 2, "delay": 500 }],
//!                   "abilityStartDelay": 0, "ability": { ... } }],
//!   "RepeatKeys": [{ "keyCode": 18, "times": 2, "delay": 350, "ability": { ... } }],
//!   "TwoFingerGesture": { "abilityStartDelay": 400, "ability": { ... } },
//!   "SingleKnuckleGesture": { "ability": { ... } },
//!   "DoubleKnuckleGesture": { "ability": { ... } },
//!   "TouchPadThreeFingersTapGesture": { "ability": { ... } }
//! }
//! ```
//!
//! Every section is optional and parsed on its own. An invalid entry is
//! skipped with a warning; a document without a single valid section is an
//! error. Delays are milliseconds; `keyAction` uses the platform codes
//! (1 cancel, 2 down, 3 up).

use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::{debug, info, warn};

use crate::dispatch::{Ability, AbilityKind};
use crate::gesture::{GestureBinding, GestureBindings};
use crate::input::error::{InputError, Result};
use crate::input::events::{KeyAction, KeyCode};
use crate::key_command::{
    ExcludeKey, KeyCommandPatterns, RepeatKey, Sequence, SequenceStep, ShortcutKey,
};

/// Most pre-keys a shortcut may hold
pub const MAX_PRE_KEYS: usize = 4;

/// Most steps a sequence may have
pub const MAX_SEQUENCE_STEPS: usize = 10;

/// Parsed ability launch configuration
#[derive(Debug, Clone, Default)]
pub struct AbilityLaunchConfig {
    pub patterns: KeyCommandPatterns,
    pub gestures: GestureBindings,
}

impl AbilityLaunchConfig {
    /// Read and parse a configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| InputError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::parse(&content)?;
        info!("Loaded ability launch configuration from {}", path.display());
        Ok(config)
    }

    /// Parse a configuration document
    pub fn parse(json: &str) -> Result<Self> {
        let raw: RawLaunchDocument = serde_json::from_str(json)?;

        let shortcuts = convert_entries("Shortcuts", raw.shortcuts, RawShortcut::convert);
        let sequences = convert_entries("Sequences", raw.sequences, RawSequence::convert);
        let repeat_keys = convert_entries("RepeatKeys", raw.repeat_keys, RawRepeatKey::convert);

        let gestures = GestureBindings {
            single_knuckle: convert_gesture("SingleKnuckleGesture", raw.single_knuckle),
            double_knuckle: convert_gesture("DoubleKnuckleGesture", raw.double_knuckle),
            two_finger: convert_gesture("TwoFingerGesture", raw.two_finger),
            three_finger_tap: convert_gesture("TouchPadThreeFingersTapGesture", raw.three_finger_tap),
        };

        let config = Self {
            patterns: KeyCommandPatterns {
                shortcuts,
                sequences,
                repeat_keys,
                exclude_keys: Vec::new(),
            },
            gestures,
        };

        if config.is_empty() {
            return Err(InputError::ConfigEmpty(
                "no shortcut, sequence, repeat key or gesture section".to_string(),
            ));
        }
        Ok(config)
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
            && self.gestures.single_knuckle.is_none()
            && self.gestures.double_knuckle.is_none()
            && self.gestures.two_finger.is_none()
            && self.gestures.three_finger_tap.is_none()
    }

    /// Business ids of every shortcut
    pub fn business_ids(&self) -> Vec<&str> {
        self.patterns
            .shortcuts
            .iter()
            .filter_map(|shortcut| shortcut.business_id.as_deref())
            .collect()
    }
}

/// Read and parse an exclude-keys document
pub fn load_exclude_keys(path: impl AsRef<Path>) -> Result<Vec<ExcludeKey>> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| InputError::ConfigRead {
        path: path.to_path_buf(),
        source,
    })?;
    parse_exclude_keys(&content)
}

/// Parse an exclude-keys document (`{"excludeKeys": [{"keyCode", "keyAction"}]}`)
pub fn parse_exclude_keys(json: &str) -> Result<Vec<ExcludeKey>> {
    let raw: RawExcludeDocument = serde_json::from_str(json)?;
    let keys = convert_entries("excludeKeys", raw.exclude_keys, RawSequenceKey::convert_exclude);
    if keys.is_empty() {
        return Err(InputError::ConfigEmpty("no exclude keys".to_string()));
    }
    Ok(keys)
}

fn convert_entries<R, T>(
    section: &str,
    entries: Option<Vec<serde_json::Value>>,
    convert: impl Fn(R) -> Result<T>,
) -> Vec<T>
where
    R: for<'de> Deserialize<'de>,
{
    let Some(entries) = entries else {
        debug!("No {} section", section);
        return Vec::new();
    };

    entries
        .into_iter()
        .enumerate()
        .filter_map(|(index, value)| {
            let converted = serde_json::from_value::<R>(value)
                .map_err(InputError::from)
                .and_then(&convert);
            match converted {
                Ok(item) => Some(item),
                Err(e) => {
                    warn!("Skipping {}[{}]: {}", section, index, e);
                    None
                }
            }
        })
        .collect()
}

fn convert_gesture(section: &str, value: Option<serde_json::Value>) -> Option<GestureBinding> {
    let value = value?;
    match serde_json::from_value::<RawGesture>(value)
        .map_err(InputError::from)
        .and_then(RawGesture::convert)
    {
        Ok(binding) => Some(binding),
        Err(e) => {
            warn!("Skipping {}: {}", section, e);
            None
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawLaunchDocument {
    #[serde(rename = "Shortcuts")]
    shortcuts: Option<Vec<serde_json::Value>>,
    #[serde(rename = "Sequences")]
    sequences: Option<Vec<serde_json::Value>>,
    #[serde(rename = "RepeatKeys")]
    repeat_keys: Option<Vec<serde_json::Value>>,
    #[serde(rename = "TwoFingerGesture")]
    two_finger: Option<serde_json::Value>,
    #[serde(rename = "SingleKnuckleGesture")]
    single_knuckle: Option<serde_json::Value>,
    #[serde(rename = "DoubleKnuckleGesture")]
    double_knuckle: Option<serde_json::Value>,
    #[serde(rename = "TouchPadThreeFingersTapGesture")]
    three_finger_tap: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawExcludeDocument {
    exclude_keys: Option<Vec<serde_json::Value>>,
}

#[derive(Debug, Deserialize)]
struct RawParam {
    key: String,
    value: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawAbility {
    bundle_name: String,
    ability_name: String,
    #[serde(default)]
    device_id: String,
    #[serde(default)]
    action: String,
    #[serde(default)]
    uri: String,
    #[serde(default, rename = "type")]
    type_: String,
    #[serde(default)]
    entities: Vec<String>,
    #[serde(default)]
    params: Vec<RawParam>,
    #[serde(default)]
    ability_type: Option<String>,
}

impl RawAbility {
    fn convert(self) -> Result<Ability> {
        if self.bundle_name.is_empty() || self.ability_name.is_empty() {
            return Err(InputError::InvalidConfig(
                "ability needs bundleName and abilityName".to_string(),
            ));
        }

        let kind = match self.ability_type.as_deref() {
            None | Some("") | Some("normal") | Some("ability") => AbilityKind::Normal,
            Some("extension") | Some("extensionAbility") => AbilityKind::Extension,
            Some(other) => {
                return Err(InputError::InvalidConfig(format!("unknown abilityType {other}")));
            }
        };

        let params: BTreeMap<String, String> = self
            .params
            .into_iter()
            .map(|param| (param.key, param.value))
            .collect();

        Ok(Ability {
            bundle_name: self.bundle_name,
            ability_name: self.ability_name,
            device_id: self.device_id,
            action: self.action,
            uri: self.uri,
            type_: self.type_,
            entities: self.entities,
            params,
            kind,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawShortcut {
    #[serde(default)]
    pre_key: Vec<KeyCode>,
    final_key: KeyCode,
    #[serde(alias = "trigger")]
    trigger_type: String,
    #[serde(default)]
    key_down_duration: i64,
    #[serde(default)]
    status_config: Option<String>,
    #[serde(default)]
    business_id: Option<String>,
    ability: RawAbility,
}

impl RawShortcut {
    fn convert(self) -> Result<ShortcutKey> {
        if self.pre_key.len() > MAX_PRE_KEYS {
            return Err(InputError::InvalidConfig(format!(
                "{} pre-keys, at most {} allowed",
                self.pre_key.len(),
                MAX_PRE_KEYS
            )));
        }
        if self.pre_key.iter().any(|key| *key < 0 || *key == self.final_key) {
            return Err(InputError::InvalidConfig(format!(
                "invalid pre-keys {:?} for final key {}",
                self.pre_key, self.final_key
            )));
        }
        let has_duplicates = {
            let unique: BTreeSet<&KeyCode> = self.pre_key.iter().collect();
            unique.len() != self.pre_key.len()
        };
        if has_duplicates {
            return Err(InputError::InvalidConfig(format!(
                "duplicate pre-keys {:?}",
                self.pre_key
            )));
        }
        if self.final_key < 0 {
            return Err(InputError::InvalidConfig(format!("invalid final key {}", self.final_key)));
        }
        if self.key_down_duration < 0 {
            return Err(InputError::InvalidConfig(format!(
                "negative keyDownDuration {}",
                self.key_down_duration
            )));
        }

        let trigger_type: KeyAction = self.trigger_type.parse()?;
        let mut shortcut = ShortcutKey::new(self.pre_key, self.final_key, trigger_type, self.ability.convert()?)
            .with_duration(self.key_down_duration as u64);
        if let Some(business_id) = self.business_id.filter(|id| !id.is_empty()) {
            shortcut = shortcut.with_business_id(business_id);
        }
        if let Some(key) = self.status_config.filter(|key| !key.is_empty()) {
            shortcut = shortcut.with_status_config(key);
        }
        Ok(shortcut)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSequenceKey {
    key_code: KeyCode,
    key_action: i32,
    #[serde(default)]
    delay: i64,
}

impl RawSequenceKey {
    fn action(&self) -> Result<KeyAction> {
        KeyAction::from_code(self.key_action)
            .ok_or_else(|| InputError::InvalidConfig(format!("unknown keyAction {}", self.key_action)))
    }

    fn convert(self) -> Result<SequenceStep> {
        if self.key_code < 0 || self.delay < 0 {
            return Err(InputError::InvalidConfig(format!(
                "invalid sequence key {} delay {}",
                self.key_code, self.delay
            )));
        }
        Ok(SequenceStep::new(self.key_code, self.action()?, self.delay))
    }

    fn convert_exclude(self) -> Result<ExcludeKey> {
        Ok(ExcludeKey {
            key_code: self.key_code,
            action: self.action()?,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSequence {
    sequence_keys: Vec<RawSequenceKey>,
    #[serde(default)]
    ability_start_delay: i64,
    #[serde(default)]
    status_config: Option<String>,
    ability: RawAbility,
}

impl RawSequence {
    fn convert(self) -> Result<Sequence> {
        if self.sequence_keys.is_empty() || self.sequence_keys.len() > MAX_SEQUENCE_STEPS {
            return Err(InputError::InvalidConfig(format!(
                "sequence needs 1..={} keys, got {}",
                MAX_SEQUENCE_STEPS,
                self.sequence_keys.len()
            )));
        }
        if self.ability_start_delay < 0 {
            return Err(InputError::InvalidConfig(format!(
                "negative abilityStartDelay {}",
                self.ability_start_delay
            )));
        }

        let steps = self
            .sequence_keys
            .into_iter()
            .map(RawSequenceKey::convert)
            .collect::<Result<Vec<_>>>()?;
        let mut sequence = Sequence::new(steps, self.ability.convert()?)
            .with_start_delay(self.ability_start_delay as u64);
        if let Some(key) = self.status_config.filter(|key| !key.is_empty()) {
            sequence = sequence.with_status_config(key);
        }
        Ok(sequence)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRepeatKey {
    key_code: KeyCode,
    times: u32,
    delay: u64,
    #[serde(default)]
    status_config: Option<String>,
    ability: RawAbility,
}

impl RawRepeatKey {
    fn convert(self) -> Result<RepeatKey> {
        if self.key_code < 0 || self.times == 0 {
            return Err(InputError::InvalidConfig(format!(
                "invalid repeat key {} x{}",
                self.key_code, self.times
            )));
        }
        let mut repeat = RepeatKey::new(self.key_code, self.times, self.delay, self.ability.convert()?);
        if let Some(key) = self.status_config.filter(|key| !key.is_empty()) {
            repeat = repeat.with_status_config(key);
        }
        Ok(repeat)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawGesture {
    #[serde(default)]
    ability_start_delay: i64,
    #[serde(default)]
    status_config: Option<String>,
    ability: RawAbility,
}

impl RawGesture {
    fn convert(self) -> Result<GestureBinding> {
        if self.ability_start_delay < 0 {
            return Err(InputError::InvalidConfig(format!(
                "negative abilityStartDelay {}",
                self.ability_start_delay
            )));
        }
        Ok(GestureBinding {
            ability: self.ability.convert()?,
            start_delay_ms: self.ability_start_delay as u64,
            status_config: self.status_config.filter(|key| !key.is_empty()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::events::keycodes::*;
    use std::io::Write;

    const DOCUMENT: &str = r#"{
        "Shortcuts": [
            {
                "preKey": [2072],
                "finalKey": 2035,
                "triggerType": "key_down",
                "keyDownDuration": 0,
                "businessId": "screen_save",
                "ability": {
                    "bundleName": "com.example.save",
                    "abilityName": "SaveAbility",
                    "params": [{ "key": "mode", "value": "quick" }]
                }
            },
            { "preKey": [1, 2, 3, 4, 5], "finalKey": 6, "triggerType": "key_down",
              "ability": { "bundleName": "x", "abilityName": "y" } },
            { "finalKey": 18, "triggerType": "key_sideways",
              "ability": { "bundleName": "x", "abilityName": "y" } }
        ],
        "Sequences": [
            {
                "sequenceKeys": [
                    { "keyCode": 18, "keyAction": 2, "delay": 500 },
                    { "keyCode": 18, "keyAction": 3, "delay": 500 },
                    { "keyCode": 18, "keyAction": 2, "delay": 0 }
                ],
                "abilityStartDelay": 200,
                "statusConfig": "camera.quick",
                "ability": { "bundleName": "com.example.camera", "abilityName": "MainAbility" }
            }
        ],
        "RepeatKeys": [
            { "keyCode": 18, "times": 2, "delay": 350,
              "ability": { "bundleName": "com.example.wallet", "abilityName": "MainAbility",
                           "abilityType": "extension" } }
        ],
        "TwoFingerGesture": {
            "abilityStartDelay": 400,
            "ability": { "bundleName": "com.example.notes", "abilityName": "MainAbility" }
        },
        "SingleKnuckleGesture": {
            "ability": { "bundleName": "com.ohos.screenshot", "abilityName": "MainAbility" }
        },
        "DoubleKnuckleGesture": { "ability": { "bundleName": "" , "abilityName": "x" } }
    }"#;

    #[test]
    fn test_parse_full_document() {
        let config = AbilityLaunchConfig::parse(DOCUMENT).unwrap();

        assert_eq!(config.patterns.shortcuts.len(), 1);
        let shortcut = &config.patterns.shortcuts[0];
        assert_eq!(shortcut.final_key, KEYCODE_S);
        assert!(shortcut.pre_keys.contains(&KEYCODE_CTRL_LEFT));
        assert_eq!(shortcut.trigger_type, KeyAction::Down);
        assert_eq!(shortcut.ability.params.get("mode").map(String::as_str), Some("quick"));
        assert_eq!(config.business_ids(), vec!["screen_save"]);

        let sequence = &config.patterns.sequences[0];
        assert_eq!(sequence.steps.len(), 3);
        assert_eq!(sequence.steps[0].max_delay_us, 500_000);
        assert_eq!(sequence.steps[1].action, KeyAction::Up);
        assert_eq!(sequence.ability_start_delay_ms, 200);
        assert_eq!(sequence.status_config.as_deref(), Some("camera.quick"));

        let repeat = &config.patterns.repeat_keys[0];
        assert_eq!(repeat.window_ms, 350);
        assert_eq!(repeat.ability.kind, AbilityKind::Extension);

        assert_eq!(config.gestures.two_finger.as_ref().map(|g| g.start_delay_ms), Some(400));
        assert!(config.gestures.single_knuckle.is_some());
        assert!(config.gestures.double_knuckle.is_none());
        assert!(config.gestures.three_finger_tap.is_none());
    }

    #[test]
    fn test_document_without_valid_section() {
        let result = AbilityLaunchConfig::parse(r#"{ "Shortcuts": [ { "finalKey": "nope" } ] }"#);
        assert!(matches!(result, Err(InputError::ConfigEmpty(_))));

        assert!(matches!(
            AbilityLaunchConfig::parse("not json"),
            Err(InputError::ConfigParse(_))
        ));
    }

    #[test]
    fn test_exclude_keys() {
        let keys = parse_exclude_keys(
            r#"{ "excludeKeys": [ { "keyCode": 18, "keyAction": 2, "delay": 0 }, { "keyCode": 16, "keyAction": 9 } ] }"#,
        )
        .unwrap();

        assert_eq!(
            keys,
            vec![ExcludeKey {
                key_code: KEYCODE_POWER,
                action: KeyAction::Down
            }]
        );
        assert!(parse_exclude_keys(r#"{ "excludeKeys": [] }"#).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(DOCUMENT.as_bytes()).unwrap();

        let config = AbilityLaunchConfig::load(file.path()).unwrap();
        assert!(!config.is_empty());

        let missing = AbilityLaunchConfig::load("/nonexistent/ability_launch_config.json");
        assert!(matches!(missing, Err(InputError::ConfigRead { .. })));
    }
}
