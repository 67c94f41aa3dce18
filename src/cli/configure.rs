//! Editing of rules, settings and goals from the command line. A running daemon rereads the files
//! on its next periodic check.

use std::{io::Write, num::NonZeroU32};

use anyhow::{bail, Result};
use clap::Subcommand;

use crate::{
    config::{ConfigStore, Goal, Settings},
    rules::{Category, RuleSet},
};

#[derive(Debug, Subcommand)]
pub enum RulesCommand {
    #[command(about = "Show classification keywords")]
    Show,
    #[command(about = "Replace keyword lists. Lists are comma separated, omitted lists stay as they are")]
    Set {
        #[arg(long, value_delimiter = ',')]
        productive: Option<Vec<String>>,
        #[arg(long, value_delimiter = ',')]
        unproductive: Option<Vec<String>>,
    },
    #[command(about = "Restore default keywords")]
    Reset,
}

#[derive(Debug, Subcommand)]
pub enum SettingsCommand {
    #[command(about = "Show limit settings")]
    Show,
    #[command(about = "Change limit settings")]
    Set {
        #[arg(
            long,
            value_delimiter = ',',
            help = "Comma separated applications that are always limited"
        )]
        apps: Option<Vec<String>>,
        #[arg(long, help = "Minutes of daily usage before an application is blocked")]
        limit: Option<NonZeroU32>,
        #[arg(long, help = "Minutes a block lasts")]
        block: Option<NonZeroU32>,
    },
}

#[derive(Debug, Subcommand)]
pub enum GoalsCommand {
    #[command(about = "List goals")]
    List,
    #[command(about = "Add a daily goal")]
    Add {
        #[arg(long, short)]
        category: Category,
        #[arg(long, short, help = "Daily target in minutes")]
        minutes: NonZeroU32,
        #[arg(required = true, num_args = 1..)]
        description: Vec<String>,
    },
    #[command(about = "Remove a goal by id")]
    Remove { id: u32 },
}

const SAVED: &str = "Saved. A running daemon picks the change up within 30 seconds";

pub fn process_rules_command(
    command: RulesCommand,
    store: &impl ConfigStore,
    out: &mut impl Write,
) -> Result<()> {
    match command {
        RulesCommand::Show => print_rules(&store.load_rules(), out)?,
        RulesCommand::Set {
            productive,
            unproductive,
        } => {
            let current = store.load_rules();
            let rules = RuleSet::new(
                productive.unwrap_or(current.productive),
                unproductive.unwrap_or(current.unproductive),
            );
            store.save_rules(&rules)?;
            print_rules(&rules, out)?;
            writeln!(out, "{SAVED}")?;
        }
        RulesCommand::Reset => {
            store.save_rules(&RuleSet::default())?;
            print_rules(&RuleSet::default(), out)?;
            writeln!(out, "{SAVED}")?;
        }
    }
    Ok(())
}

fn print_rules(rules: &RuleSet, out: &mut impl Write) -> Result<()> {
    writeln!(out, "productive: {}", rules.productive.join(", "))?;
    writeln!(out, "unproductive: {}", rules.unproductive.join(", "))?;
    Ok(())
}

pub fn process_settings_command(
    command: SettingsCommand,
    store: &impl ConfigStore,
    out: &mut impl Write,
) -> Result<()> {
    match command {
        SettingsCommand::Show => print_settings(&store.load_settings(), out)?,
        SettingsCommand::Set { apps, limit, block } => {
            let current = store.load_settings();
            let settings = Settings {
                unproductive_apps: apps
                    .map(|apps| {
                        apps.into_iter()
                            .map(|v| v.trim().to_lowercase())
                            .filter(|v| !v.is_empty())
                            .collect()
                    })
                    .unwrap_or(current.unproductive_apps),
                usage_limit_minutes: limit.unwrap_or(current.usage_limit_minutes),
                block_duration_minutes: block.unwrap_or(current.block_duration_minutes),
            };
            store.save_settings(&settings)?;
            print_settings(&settings, out)?;
            writeln!(out, "{SAVED}")?;
        }
    }
    Ok(())
}

fn print_settings(settings: &Settings, out: &mut impl Write) -> Result<()> {
    writeln!(out, "limited apps: {}", settings.unproductive_apps.join(", "))?;
    writeln!(out, "daily limit: {} minutes", settings.usage_limit_minutes)?;
    writeln!(out, "block duration: {} minutes", settings.block_duration_minutes)?;
    Ok(())
}

pub fn process_goals_command(
    command: GoalsCommand,
    store: &impl ConfigStore,
    out: &mut impl Write,
) -> Result<()> {
    let mut goals = store.load_goals();
    match command {
        GoalsCommand::List => {
            if goals.is_empty() {
                writeln!(out, "No goals")?;
            }
            for goal in goals {
                writeln!(
                    out,
                    "{}\t{} minutes of {}\t{}",
                    goal.id, goal.target_minutes, goal.category, goal.description
                )?;
            }
        }
        GoalsCommand::Add {
            category,
            minutes,
            description,
        } => {
            let id = goals.iter().map(|v| v.id).max().map_or(1, |v| v + 1);
            goals.push(Goal {
                id,
                description: description.join(" "),
                category,
                target_minutes: minutes,
            });
            store.save_goals(&goals)?;
            writeln!(out, "Added goal {id}")?;
            writeln!(out, "{SAVED}")?;
        }
        GoalsCommand::Remove { id } => {
            let before = goals.len();
            goals.retain(|v| v.id != id);
            if goals.len() == before {
                bail!("There is no goal {id}");
            }
            store.save_goals(&goals)?;
            writeln!(out, "Removed goal {id}")?;
        }
    }
    Ok(())
}
