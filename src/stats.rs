use crate::ledger::{DailyTimeStats, TimeLedger};
use chrono::{DateTime, Datelike, Duration, Local, NaiveDate};
use std::collections::BTreeMap;

pub const TOP_DOMAINS: usize = 5;

/// Coarse grouping of domains for reports. Purely cosmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum StatsCategory {
    SocialMedia,
    Video,
    News,
    Shopping,
    Other,
}

impl StatsCategory {
    pub fn label(self) -> &'static str {
        match self {
            StatsCategory::SocialMedia => "Social media",
            StatsCategory::Video => "Video & streaming",
            StatsCategory::News => "News",
            StatsCategory::Shopping => "Shopping",
            StatsCategory::Other => "Other",
        }
    }
}

const CATEGORY_DOMAINS: &[(StatsCategory, &[&str])] = &[
    (
        StatsCategory::SocialMedia,
        &[
            "facebook.com", "instagram.com", "twitter.com", "x.com", "linkedin.com",
            "tiktok.com", "snapchat.com", "pinterest.com", "tumblr.com", "reddit.com",
            "threads.net", "bsky.app", "mastodon.social", "discord.com", "quora.com",
        ],
    ),
    (
        StatsCategory::Video,
        &[
            "youtube.com", "youtu.be", "netflix.com", "hulu.com", "disneyplus.com",
            "primevideo.com", "twitch.tv", "kick.com", "vimeo.com", "dailymotion.com",
            "crunchyroll.com", "bilibili.com",
        ],
    ),
    (
        StatsCategory::News,
        &[
            "cnn.com", "foxnews.com", "nytimes.com", "washingtonpost.com", "wsj.com",
            "bbc.com", "bbc.co.uk", "theguardian.com", "reuters.com", "bloomberg.com",
            "news.ycombinator.com", "theverge.com", "techcrunch.com",
        ],
    ),
    (
        StatsCategory::Shopping,
        &[
            "amazon.com", "ebay.com", "etsy.com", "aliexpress.com", "walmart.com",
            "target.com", "temu.com", "shein.com",
        ],
    ),
];

pub fn categorize(domain: &str) -> StatsCategory {
    let domain = domain.to_lowercase();
    CATEGORY_DOMAINS
        .iter()
        .find(|(_, domains)| {
            domains
                .iter()
                .any(|d| domain == *d || domain.ends_with(&format!(".{}", d)))
        })
        .map(|(category, _)| *category)
        .unwrap_or(StatsCategory::Other)
}

#[derive(Default, Clone, Debug)]
pub struct DayStats {
    pub total: Duration,
    pub domains: u32,
}

#[derive(Default, Clone, Debug)]
pub struct SummaryStats {
    pub total: Duration,
    pub active_days: u32,
    pub max_day: Option<Duration>,
    pub min_day: Option<Duration>,
    /// Highest first.
    pub top_domains: Vec<(String, u64)>,
    pub by_category: BTreeMap<StatsCategory, u64>,
}

pub struct Stats {
    pub daily_stats: BTreeMap<NaiveDate, DayStats>,
    pub today_summary: SummaryStats,
    pub week_summary: SummaryStats,
    pub today: NaiveDate,
    pub week_start: NaiveDate,
}

pub fn calculate_summary<'a>(days: impl IntoIterator<Item = &'a DailyTimeStats>) -> SummaryStats {
    let mut summary = SummaryStats::default();
    let mut per_domain: BTreeMap<&str, u64> = BTreeMap::new();

    for day in days {
        let day_total: u64 = day.values().sum();
        if day_total == 0 {
            continue;
        }
        let duration = Duration::seconds(day_total as i64);
        summary.total += duration;
        summary.active_days += 1;
        summary.max_day = Some(summary.max_day.map_or(duration, |m| m.max(duration)));
        summary.min_day = Some(summary.min_day.map_or(duration, |m| m.min(duration)));

        for (domain, seconds) in day {
            *per_domain.entry(domain).or_default() += seconds;
            *summary.by_category.entry(categorize(domain)).or_default() += seconds;
        }
    }

    let mut top: Vec<(String, u64)> = per_domain
        .into_iter()
        .map(|(domain, seconds)| (domain.to_string(), seconds))
        .collect();
    top.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    top.truncate(TOP_DOMAINS);
    summary.top_domains = top;

    summary
}

pub fn calculate_stats(ledger: &TimeLedger, now: DateTime<Local>) -> Stats {
    let today = now.date_naive();

    // Find the start of the current week (Monday)
    let days_from_monday = now.weekday().num_days_from_monday();
    let week_start = today - Duration::days(days_from_monday as i64);
    let week_end = week_start + Duration::days(6);

    let mut daily_stats: BTreeMap<NaiveDate, DayStats> = BTreeMap::new();
    let mut today_days = Vec::new();
    let mut week_days = Vec::new();

    for (date, day) in ledger.days() {
        let stats = daily_stats.entry(date).or_default();
        stats.total += Duration::seconds(day.values().sum::<u64>() as i64);
        stats.domains += day.len() as u32;

        if date == today {
            today_days.push(day);
        }
        if date >= week_start && date <= week_end {
            week_days.push(day);
        }
    }

    Stats {
        daily_stats,
        today_summary: calculate_summary(today_days),
        week_summary: calculate_summary(week_days),
        today,
        week_start,
    }
}
