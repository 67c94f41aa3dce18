use std::{collections::HashMap, fmt::Display, io::Write, path::Path};

use anyhow::Result;
use chrono::{Duration, Local, NaiveDate};
use chrono_english::parse_date_string;
use clap::{CommandFactory, Parser, ValueEnum};

use crate::{
    config::{ConfigStore, JsonConfigStore},
    ledger::{file_ledger::FileLedger, UsageLedger},
    rules::{classify, RuleSet},
    utils::time::format_duration,
};

use super::Args;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum DateStyle {
    Uk,
    Us,
}

impl From<DateStyle> for chrono_english::Dialect {
    fn from(value: DateStyle) -> Self {
        match value {
            DateStyle::Uk => Self::Uk,
            DateStyle::Us => Self::Us,
        }
    }
}

impl Display for DateStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DateStyle::Uk => write!(f, "uk"),
            DateStyle::Us => write!(f, "us"),
        }
    }
}

#[derive(Debug, Parser)]
pub struct ReportCommand {
    #[arg(
        long,
        short,
        help = "Day to report on, today by default. Examples are \"yesterday\", \"friday\", \"15/03/2025\""
    )]
    date: Option<String>,
    #[arg(long, default_value_t = DateStyle::Uk, help = "Style of dates used during parsing. For Uk it's day/month/year. For Us it's month/day/year")]
    date_style: DateStyle,
    #[arg(
        long,
        default_value_t = 7,
        value_parser = clap::value_parser!(u32).range(1..=366),
        help = "Number of days in the daily breakdown, ending with the reported day"
    )]
    days: u32,
    #[arg(long, short = 'n', default_value_t = 10, help = "Number of applications to show")]
    top: usize,
}

/// Prints usage of a single day followed by a per day breakdown of the preceding days.
pub async fn process_report_command(command: ReportCommand, dir: &Path) -> Result<()> {
    let date = match command.date {
        Some(date) => parse_date_string(&date, Local::now(), command.date_style.into())
            .map(|v| v.date_naive())
            .map_err(|e| {
                Args::command().error(
                    clap::error::ErrorKind::ValueValidation,
                    format!("Failed to validate date {e}"),
                )
            })?,
        None => Local::now().date_naive(),
    };

    let ledger = FileLedger::new(dir.join("sessions"))?;
    let rules = JsonConfigStore::new(dir.to_path_buf())?.load_rules();
    write_report(
        &ledger,
        &rules,
        date,
        command.days,
        command.top,
        &mut std::io::stdout(),
    )
    .await
}

pub async fn write_report(
    ledger: &impl UsageLedger,
    rules: &RuleSet,
    date: NaiveDate,
    days: u32,
    top: usize,
    out: &mut impl Write,
) -> Result<()> {
    let day_totals = ledger.totals_for_date(date).await?;
    writeln!(out, "Usage on {date}")?;
    write_apps(&day_totals, rules, top, out)?;

    writeln!(out)?;
    writeln!(out, "Daily breakdown")?;
    writeln!(out, "date\tproductive\tunproductive\tneutral")?;
    for day in ledger.daily_series(date, days, rules).await? {
        writeln!(
            out,
            "{}\t{}\t{}\t{}",
            day.date,
            format_duration(Duration::seconds(day.productive)),
            format_duration(Duration::seconds(day.unproductive)),
            format_duration(Duration::seconds(day.neutral)),
        )?;
    }

    if days > 1 {
        let start = date - Duration::days(i64::from(days) - 1);
        writeln!(out)?;
        writeln!(out, "Usage from {start} to {date}")?;
        write_apps(&ledger.totals_between(start, date).await?, rules, top, out)?;
    }
    Ok(())
}

fn write_apps(
    totals: &HashMap<String, i64>,
    rules: &RuleSet,
    top: usize,
    out: &mut impl Write,
) -> Result<()> {
    let whole: i64 = totals.values().sum();
    if whole == 0 {
        writeln!(out, "No usage recorded")?;
        return Ok(());
    }

    let mut apps = totals.iter().collect::<Vec<_>>();
    apps.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
    for (app, seconds) in apps.into_iter().take(top) {
        writeln!(
            out,
            "{}%\t{}\t{}\t{app}",
            seconds * 100 / whole,
            format_duration(Duration::seconds(*seconds)),
            classify(app, rules),
        )?;
    }
    Ok(())
}
