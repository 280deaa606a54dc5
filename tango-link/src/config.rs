#[derive(serde::Serialize, serde::Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Key of the offsets table to use, e.g. `BPEE_00`.
    pub profile: String,
    pub format: crate::role::BattleFormat,
    pub fps: f32,
    pub relay_timeout_secs: f32,
    pub heartbeat_timeout_secs: f32,
    pub safety_timeout_secs: f32,
    /// How many ticks the retreat command is held in place during forced termination.
    pub termination_ticks: u32,
    pub retreat_command: Vec<u8>,
    pub forfeit_response: Vec<u8>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            profile: "BPEE_00".to_string(),
            format: crate::role::BattleFormat::Singles,
            fps: crate::EXPECTED_FPS,
            relay_timeout_secs: 10.0,
            heartbeat_timeout_secs: 15.0,
            safety_timeout_secs: 60.0,
            termination_ticks: 30,
            // Controller command to end the battle as a forfeit.
            retreat_command: vec![0x37, 0x09],
            // Chosen action: run.
            forfeit_response: vec![0x21, 0x03, 0x00],
        }
    }
}

fn secs_to_ticks(secs: f32, fps: f32) -> u32 {
    (secs * fps).round() as u32
}

impl Config {
    pub fn from_toml(s: &str) -> Result<Self, anyhow::Error> {
        Ok(toml::from_str(s)?)
    }

    pub fn from_json(s: &str) -> Result<Self, anyhow::Error> {
        Ok(serde_json::from_str(s)?)
    }

    pub fn load(path: &std::path::Path) -> Result<Self, anyhow::Error> {
        let contents = std::fs::read_to_string(path)?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json(&contents),
            _ => Self::from_toml(&contents),
        }
    }

    pub fn offsets(&self) -> Result<&'static crate::offsets::Offsets, anyhow::Error> {
        crate::offsets::find_by_key(&self.profile).ok_or_else(|| anyhow::anyhow!("unknown profile: {}", self.profile))
    }

    pub fn thresholds(&self) -> crate::watchdog::Thresholds {
        crate::watchdog::Thresholds {
            relay_ticks: secs_to_ticks(self.relay_timeout_secs, self.fps),
            heartbeat_ticks: secs_to_ticks(self.heartbeat_timeout_secs, self.fps),
            safety_ticks: secs_to_ticks(self.safety_timeout_secs, self.fps),
        }
    }
}
