use std::collections::HashMap;

use crate::config::Settings;

use super::RuleSet;

/// Instruction to block everything matching `key` for `duration_minutes`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockDirective {
    pub key: String,
    pub duration_minutes: u32,
}

/// Decides whether `app_name` went over the daily limit.
///
/// Usage is aggregated loosely: every app whose name contains `app_name`, plus every app matched by
/// an unproductive keyword, counts towards the limit. Window titles and process names rarely line
/// up, so an exact lookup would miss most usage. Reaching the limit exactly already blocks.
pub fn evaluate(
    app_name: &str,
    today_totals: &HashMap<String, i64>,
    rules: &RuleSet,
    settings: &Settings,
) -> Option<BlockDirective> {
    let app_name = app_name.trim().to_lowercase();
    if app_name.is_empty() {
        return None;
    }

    let total_for_app: i64 = today_totals
        .iter()
        .filter(|(name, _)| {
            let name = name.to_lowercase();
            name.contains(&app_name) || rules.unproductive_match(&name).is_some()
        })
        .map(|(_, seconds)| *seconds)
        .sum();

    if total_for_app < settings.limit_seconds() {
        return None;
    }

    Some(BlockDirective {
        key: resolve_block_key(&app_name, rules, settings),
        duration_minutes: settings.block_duration_minutes.get(),
    })
}

/// Names the user declared explicitly win over generic rule keywords.
fn resolve_block_key(app_name: &str, rules: &RuleSet, settings: &Settings) -> String {
    settings
        .unproductive_apps
        .iter()
        .map(|v| v.trim().to_lowercase())
        .filter(|v| !v.is_empty())
        .find(|declared| app_name.contains(declared.as_str()) || declared.contains(app_name))
        .or_else(|| rules.unproductive_match(app_name).map(str::to_string))
        .unwrap_or_else(|| app_name.to_string())
}
