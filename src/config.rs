use crate::error::ConfigError;
use crate::models::{BlockMode, Schedule, SiteCategory, SiteRule};
use crate::schedule::parse_hhmm;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

pub const DEFAULT_PHRASE: &str = "I want to procrastinate";
pub const DEFAULT_DELAY_SECONDS: u64 = 10;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct FrictionSettings {
    pub delay_seconds: u64,
    pub require_phrase: bool,
    pub phrase: String,
    pub bypass_duration_minutes: u32,
    /// When false a bypass rides out its timer even after leaving the page.
    pub bypass_limited: bool,
}

impl Default for FrictionSettings {
    fn default() -> Self {
        Self {
            delay_seconds: DEFAULT_DELAY_SECONDS,
            require_phrase: true,
            phrase: DEFAULT_PHRASE.to_string(),
            bypass_duration_minutes: 15,
            bypass_limited: true,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct PomodoroSettings {
    pub work_duration_minutes: u32,
    pub short_break_minutes: u32,
    pub long_break_minutes: u32,
    pub sessions_until_long_break: u32,
    pub auto_start_breaks: bool,
    pub auto_start_work: bool,
    /// Stored and round-tripped only; blocking does not consult it.
    pub block_during_work: bool,
    pub notifications_enabled: bool,
}

impl Default for PomodoroSettings {
    fn default() -> Self {
        Self {
            work_duration_minutes: 25,
            short_break_minutes: 5,
            long_break_minutes: 15,
            sessions_until_long_break: 4,
            auto_start_breaks: false,
            auto_start_work: false,
            block_during_work: true,
            notifications_enabled: true,
        }
    }
}

impl PomodoroSettings {
    pub fn work_seconds(&self) -> u64 {
        u64::from(self.work_duration_minutes) * 60
    }

    pub fn short_break_seconds(&self) -> u64 {
        u64::from(self.short_break_minutes) * 60
    }

    pub fn long_break_seconds(&self) -> u64 {
        u64::from(self.long_break_minutes) * 60
    }

    /// Never zero.
    pub fn long_break_every(&self) -> u32 {
        self.sessions_until_long_break.max(1)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub enabled: bool,
    pub site_categories: Vec<SiteCategory>,
    pub schedules: Vec<Schedule>,
    pub friction: FrictionSettings,
    pub pomodoro: PomodoroSettings,
}

impl Default for Settings {
    fn default() -> Self {
        let mut reddit = SiteRule::time_limit("reddit", "reddit.com", 30);
        reddit.enabled = false;

        Self {
            enabled: true,
            site_categories: vec![SiteCategory {
                id: "distractions".to_string(),
                name: "Distractions".to_string(),
                enabled: true,
                sites: vec![
                    SiteRule::new("youtube-shorts", "youtube.com/shorts", BlockMode::Block),
                    SiteRule::new("x-twitter", "x.com", BlockMode::Friction),
                    SiteRule::new("twitter", "twitter.com", BlockMode::Friction),
                    SiteRule::new("instagram", "instagram.com", BlockMode::Friction),
                    SiteRule::new("tiktok", "tiktok.com", BlockMode::Block),
                    reddit,
                ],
                is_custom: false,
            }],
            schedules: Vec::new(),
            friction: FrictionSettings::default(),
            pomodoro: PomodoroSettings::default(),
        }
    }
}

impl Settings {
    /// Parses a settings blob, folding the old flat `blockedSites` list into a
    /// category when no categories are present.
    pub fn from_value(mut value: Value) -> Result<Self> {
        if let Some(obj) = value.as_object_mut() {
            if let Some(legacy) = obj.remove("blockedSites") {
                if !obj.contains_key("siteCategories") {
                    log::info!("Migrating legacy blockedSites into a category");
                    obj.insert(
                        "siteCategories".to_string(),
                        serde_json::json!([{
                            "id": "legacy",
                            "name": "My Sites",
                            "enabled": true,
                            "sites": legacy,
                            "isCustom": true,
                        }]),
                    );
                }
            }
        }
        Ok(serde_json::from_value(value)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for rule in self.site_categories.iter().flat_map(|c| c.sites.iter()) {
            if rule.pattern.trim().is_empty() {
                return Err(ConfigError::EmptyPattern(rule.id.clone()));
            }
            match (rule.mode, rule.daily_limit_minutes) {
                (BlockMode::TimeLimit, None) => {
                    return Err(ConfigError::MissingDailyLimit(rule.id.clone()))
                }
                (BlockMode::Block | BlockMode::Friction, Some(_)) => {
                    return Err(ConfigError::UnexpectedDailyLimit(rule.id.clone()))
                }
                _ => {}
            }
        }

        for schedule in &self.schedules {
            if let Some(&day) = schedule.days.iter().find(|&&d| d > 6) {
                return Err(ConfigError::InvalidWeekday {
                    id: schedule.id.clone(),
                    day,
                });
            }
            for value in [&schedule.start_time, &schedule.end_time] {
                if parse_hhmm(value).is_none() {
                    return Err(ConfigError::InvalidTime {
                        id: schedule.id.clone(),
                        value: value.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

pub fn settings_path(base_dir: &Path) -> PathBuf {
    base_dir.join("settings.json")
}

pub fn load_settings(path: &Path) -> Result<Settings> {
    if !path.exists() {
        let settings = Settings::default();
        save_settings(path, &settings)?;
        return Ok(settings);
    }

    let data = fs::read_to_string(path)
        .with_context(|| format!("Could not read settings at {}", path.display()))?;
    let value: Value = serde_json::from_str(&data)
        .with_context(|| format!("Settings at {} are not valid JSON", path.display()))?;
    Settings::from_value(value)
}

pub fn save_settings(path: &Path, settings: &Settings) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let data = serde_json::to_string_pretty(settings)?;
    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, &data)?;
    fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Process-owned settings cache, reloaded when the file on disk changes.
/// An unreadable file keeps the last good settings (or the defaults).
pub struct SettingsStore {
    path: PathBuf,
    settings: Settings,
    modified: Option<SystemTime>,
}

impl SettingsStore {
    pub fn open(base_dir: &Path) -> Result<Self> {
        let path = settings_path(base_dir);
        let settings = load_settings(&path)?;
        let modified = modified_time(&path);
        Ok(Self {
            path,
            settings,
            modified,
        })
    }

    pub fn current(&mut self) -> &Settings {
        let modified = modified_time(&self.path);
        if modified != self.modified {
            match load_settings(&self.path) {
                Ok(settings) => self.settings = settings,
                Err(err) => log::warn!("Keeping previous settings: {:#}", err),
            }
            self.modified = modified_time(&self.path);
        }
        &self.settings
    }

    pub fn replace(&mut self, settings: Settings) -> Result<()> {
        settings.validate()?;
        save_settings(&self.path, &settings)?;
        self.settings = settings;
        self.modified = modified_time(&self.path);
        Ok(())
    }
}

fn modified_time(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}
