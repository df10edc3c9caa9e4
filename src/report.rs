use crate::stats::{calculate_stats, SummaryStats};
use crate::storage::Storage;
use crate::utils::{format_clock, format_duration};
use anyhow::Result;
use chrono::{DateTime, Local};

pub struct Reporter {
    storage: Storage,
}

impl Reporter {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    pub fn report(&self, now: DateTime<Local>) -> Result<()> {
        let db = self.storage.load()?;
        let pomodoro = &db.pomodoro_state;

        println!("FocusFlow Report");
        println!("================");
        println!(
            "\nPomodoro: {} ({}{}), {} completed today",
            pomodoro.phase.label(),
            format_clock(pomodoro.time_remaining_seconds),
            if pomodoro.is_running { ", running" } else { "" },
            pomodoro.today_pomodoros
        );

        if db.time_stats.is_empty() {
            println!("\nNo browsing time recorded yet.");
            return Ok(());
        }

        let stats_data = calculate_stats(&db.time_stats, now);

        for (date, stats) in &stats_data.daily_stats {
            if *date < stats_data.week_start {
                continue;
            }

            let is_today = *date == stats_data.today;
            let date_str = if is_today {
                format!("{} (Today)", date)
            } else {
                date.to_string()
            };

            println!("\nDate: {}", date_str);
            println!(
                "  Tracked Time:      {}",
                format_duration(stats.total.num_seconds())
            );
            println!("  Domains:           {}", stats.domains);
        }

        println!("\nToday");
        println!("-----");
        print_summary(&stats_data.today_summary);

        println!("\nWeekly Summary (Starting Monday {})", stats_data.week_start);
        println!("-------------------------------------------");
        print_summary(&stats_data.week_summary);
        if stats_data.week_summary.active_days > 0 {
            let avg = stats_data.week_summary.total / (stats_data.week_summary.active_days as i32);
            println!("Avg per Active Day:  {}", format_duration(avg.num_seconds()));
        }

        Ok(())
    }
}

fn print_summary(summary: &SummaryStats) {
    println!(
        "Total Time:          {}",
        format_duration(summary.total.num_seconds())
    );
    if summary.top_domains.is_empty() {
        return;
    }
    println!("Top Domains:");
    for (domain, seconds) in &summary.top_domains {
        println!("  {:<24} {}", domain, format_duration(*seconds as i64));
    }
    println!("By Category:");
    for (category, seconds) in &summary.by_category {
        println!("  {:<24} {}", category.label(), format_duration(*seconds as i64));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_report_empty_and_populated() -> Result<()> {
        let dir = tempdir()?;
        let storage = Storage::open(dir.path());
        let now = Local::now();
        Reporter::new(storage.clone()).report(now)?;

        storage.update(|db| db.time_stats.record_seconds("reddit.com", 90, &now))?;
        Reporter::new(storage).report(now)?;
        Ok(())
    }
}
