//! Tunable, persisted parameters for one catalog entry, plus global playback flags.

use glam::Vec4;
use serde::{Deserialize, Serialize};

/// Travel direction consumed by trajectory functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Down,
    Up,
    Left,
    Right,
    Random,
}

/// Persisted per-id parameter record. Field names match the stored JSON (camelCase).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EffectParameters {
    /// 0..=100; drives spawn cadence.
    pub intensity: f32,
    /// Concurrent particle budget for the instance.
    pub particle_count: u32,
    /// Multiplier on animation speed; particle lifetime scales with its inverse.
    pub speed: f32,
    pub size: f32,
    /// 0.0..=1.0
    pub opacity: f32,
    pub color: String,
    pub direction: Direction,
    pub physics: bool,
    pub interactive: bool,
    pub has_audio: bool,
    pub is_active: bool,
}

impl Default for EffectParameters {
    fn default() -> Self {
        Self {
            intensity: 50.0,
            particle_count: 50,
            speed: 1.0,
            size: 1.0,
            opacity: 0.8,
            color: "#ffffff".into(),
            direction: Direction::Down,
            physics: false,
            interactive: false,
            has_audio: false,
            is_active: false,
        }
    }
}

impl EffectParameters {
    pub fn active(mut self, is_active: bool) -> Self {
        self.is_active = is_active;
        self
    }

    /// Base RGBA with the parameter opacity folded into alpha.
    pub fn rgba(&self) -> Vec4 {
        let base = parse_color(&self.color).unwrap_or(Vec4::ONE);
        Vec4::new(base.x, base.y, base.z, base.w * self.opacity.clamp(0.0, 1.0))
    }

    /// Sets one field from its stored (camelCase) or snake_case name and a textual value.
    pub fn set_field(&mut self, field: &str, value: &str) -> Result<(), String> {
        fn number<T: std::str::FromStr>(field: &str, value: &str) -> Result<T, String> {
            value
                .trim()
                .parse()
                .map_err(|_| format!("`{value}` is not a valid value for {field}"))
        }
        fn real(field: &str, value: &str) -> Result<f32, String> {
            match number::<f32>(field, value)? {
                parsed if parsed.is_finite() => Ok(parsed),
                _ => Err(format!("`{value}` is not a valid value for {field}")),
            }
        }
        fn flag(field: &str, value: &str) -> Result<bool, String> {
            match value.trim().to_ascii_lowercase().as_str() {
                "true" | "on" | "yes" | "1" => Ok(true),
                "false" | "off" | "no" | "0" => Ok(false),
                _ => Err(format!("`{value}` is not a valid value for {field}")),
            }
        }
        match field {
            "intensity" => self.intensity = real(field, value)?.clamp(0.0, 100.0),
            "particleCount" | "particle_count" | "count" => {
                self.particle_count = number(field, value)?
            }
            "speed" => self.speed = real(field, value)?,
            "size" => self.size = real(field, value)?,
            "opacity" => self.opacity = real(field, value)?.clamp(0.0, 1.0),
            "color" => self.color = value.trim().to_string(),
            "direction" => {
                self.direction = match value.trim().to_ascii_lowercase().as_str() {
                    "down" => Direction::Down,
                    "up" => Direction::Up,
                    "left" => Direction::Left,
                    "right" => Direction::Right,
                    "random" => Direction::Random,
                    _ => return Err(format!("unknown direction `{value}`")),
                }
            }
            "physics" => self.physics = flag(field, value)?,
            "interactive" => self.interactive = flag(field, value)?,
            "hasAudio" | "has_audio" | "audio" => self.has_audio = flag(field, value)?,
            "isActive" | "is_active" | "active" => self.is_active = flag(field, value)?,
            _ => return Err(format!("unknown field `{field}`")),
        }
        Ok(())
    }

    /// Names the first numeric field that JSON cannot represent.
    pub fn check_finite(&self) -> Result<(), String> {
        let fields = [
            ("intensity", self.intensity),
            ("speed", self.speed),
            ("size", self.size),
            ("opacity", self.opacity),
        ];
        match fields.iter().find(|(_, value)| !value.is_finite()) {
            Some((field, value)) => Err(format!("{field} must be a finite number, got {value}")),
            None => Ok(()),
        }
    }

    /// Reasons this record cannot drive a generator, if any.
    pub fn validate(&self) -> Result<(), String> {
        if !self.speed.is_finite() || self.speed <= 0.0 {
            return Err(format!("speed must be positive, got {}", self.speed));
        }
        if !self.size.is_finite() || self.size <= 0.0 {
            return Err(format!("size must be positive, got {}", self.size));
        }
        if !self.intensity.is_finite() {
            return Err("intensity is not a number".into());
        }
        Ok(())
    }
}

/// Global flags shared by every view: playback switch and ambient audio levels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PlaybackFlags {
    pub playing: bool,
    pub volume: f32,
    pub muted: bool,
}

impl Default for PlaybackFlags {
    fn default() -> Self {
        Self {
            playing: true,
            volume: 0.5,
            muted: false,
        }
    }
}

impl PlaybackFlags {
    /// Gain an audio-bearing effect should play at, or `None` when silent.
    pub fn audible_gain(&self) -> Option<f32> {
        let volume = self.volume.clamp(0.0, 1.0);
        if !self.playing || self.muted || volume <= 0.0 {
            None
        } else {
            Some(volume)
        }
    }
}

/// Parses `#rgb`, `#rrggbb`, `#rrggbbaa` or a named color into normalized RGBA.
pub fn parse_color(token: &str) -> Option<Vec4> {
    let token = token.trim();
    if let Some(hex) = token.strip_prefix('#') {
        let channel = |s: &str| u8::from_str_radix(s, 16).ok().map(|v| v as f32 / 255.0);
        return match hex.len() {
            3 => {
                let mut out = [0.0; 3];
                for (i, c) in hex.chars().enumerate() {
                    let v = c.to_digit(16)? as f32;
                    out[i] = (v * 16.0 + v) / 255.0;
                }
                Some(Vec4::new(out[0], out[1], out[2], 1.0))
            }
            6 => Some(Vec4::new(
                channel(hex.get(0..2)?)?,
                channel(hex.get(2..4)?)?,
                channel(hex.get(4..6)?)?,
                1.0,
            )),
            8 => Some(Vec4::new(
                channel(hex.get(0..2)?)?,
                channel(hex.get(2..4)?)?,
                channel(hex.get(4..6)?)?,
                channel(hex.get(6..8)?)?,
            )),
            _ => None,
        };
    }
    let rgb = match token.to_ascii_lowercase().as_str() {
        "white" => [1.0, 1.0, 1.0],
        "black" => [0.0, 0.0, 0.0],
        "red" => [1.0, 0.2, 0.2],
        "orange" => [1.0, 0.6, 0.1],
        "yellow" => [1.0, 0.95, 0.3],
        "gold" => [1.0, 0.84, 0.0],
        "green" => [0.3, 0.9, 0.4],
        "cyan" => [0.3, 0.95, 1.0],
        "blue" => [0.3, 0.5, 1.0],
        "purple" => [0.65, 0.35, 1.0],
        "pink" => [1.0, 0.6, 0.8],
        "silver" => [0.75, 0.75, 0.8],
        _ => return None,
    };
    Some(Vec4::new(rgb[0], rgb[1], rgb[2], 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stored_json_uses_camel_case_and_defaults_missing_fields() {
        let params: EffectParameters =
            serde_json::from_str(r#"{"intensity": 80, "particleCount": 12, "isActive": true}"#)
                .unwrap();
        assert_eq!(params.intensity, 80.0);
        assert_eq!(params.particle_count, 12);
        assert!(params.is_active);
        assert_eq!(params.direction, Direction::Down);

        let json = serde_json::to_string(&params).unwrap();
        assert!(json.contains("\"hasAudio\":false"));
    }

    #[test]
    fn color_tokens() {
        assert_eq!(parse_color("#fff"), Some(Vec4::ONE));
        let c = parse_color("#ff000080").unwrap();
        assert!((c.x - 1.0).abs() < 1e-6 && (c.w - 128.0 / 255.0).abs() < 1e-6);
        assert!(parse_color("Gold").is_some());
        assert!(parse_color("#12").is_none());
        assert!(parse_color("mauve-ish").is_none());
    }

    #[test]
    fn opacity_folds_into_alpha() {
        let params = EffectParameters {
            opacity: 0.25,
            color: "not a color".into(),
            ..Default::default()
        };
        assert_eq!(params.rgba(), Vec4::new(1.0, 1.0, 1.0, 0.25));
    }

    #[test]
    fn validate_rejects_non_positive_speed() {
        let params = EffectParameters {
            speed: 0.0,
            ..Default::default()
        };
        assert!(params.validate().is_err());
        assert!(EffectParameters::default().validate().is_ok());
    }

    #[test]
    fn set_field_parses_and_clamps() {
        let mut params = EffectParameters::default();
        params.set_field("intensity", "140").unwrap();
        assert_eq!(params.intensity, 100.0);
        params.set_field("particleCount", "12").unwrap();
        params.set_field("direction", "Left").unwrap();
        params.set_field("physics", "on").unwrap();
        assert_eq!(params.particle_count, 12);
        assert_eq!(params.direction, Direction::Left);
        assert!(params.physics);
        assert!(params.set_field("speed", "fast").is_err());
        assert!(params.set_field("wobble", "1").is_err());
    }

    #[test]
    fn set_field_rejects_non_finite_numbers() {
        let mut params = EffectParameters::default();
        for field in ["intensity", "speed", "size", "opacity"] {
            for value in ["nan", "NaN", "inf", "-infinity"] {
                assert_eq!(
                    params.set_field(field, value),
                    Err(format!("`{value}` is not a valid value for {field}"))
                );
            }
        }
        assert_eq!(params, EffectParameters::default());
        assert!(params.check_finite().is_ok());

        params.speed = f32::NAN;
        assert!(params.check_finite().unwrap_err().starts_with("speed"));
    }

    #[test]
    fn audible_gain_respects_flags() {
        assert_eq!(PlaybackFlags::default().audible_gain(), Some(0.5));
        let muted = PlaybackFlags {
            muted: true,
            ..Default::default()
        };
        assert_eq!(muted.audible_gain(), None);
        let paused = PlaybackFlags {
            playing: false,
            ..Default::default()
        };
        assert_eq!(paused.audible_gain(), None);
    }
}
