//! Human-readable descriptions of recurrence rules.
//!
//! This module renders a [`RecurrenceRule`] as a phrase like
//! "Weekly on Monday, Wednesday, and Friday, 10 times", and offers a narrow
//! reverse mapping for a small fixed vocabulary of canonical phrases.
//!
//! Description is a pure formatting function: same rule in, same text out.
//! The reverse mapping deliberately does *not* attempt natural-language
//! parsing; anything outside the fixed vocabulary returns `None`.

use chrono::Weekday;
use serde::{Deserialize, Serialize};

use crate::rule::{Frequency, RecurrenceRule};

/// A rendered description of a recurrence rule.
///
/// `primary_text` is the full phrase; the component fields let a UI restyle
/// or truncate individual parts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleDescription {
    /// The complete phrase, e.g. "Every 2 weeks on weekdays, 10 times".
    pub primary_text: String,
    /// The frequency part, e.g. "Every 2 weeks".
    pub frequency_text: String,
    /// The day-selector part, e.g. "on weekdays", if the rule has one.
    pub day_text: Option<String>,
    /// The end-condition part, e.g. "10 times", if the rule has one.
    pub end_text: Option<String>,
}

/// Renders a recurrence rule as a human-readable phrase.
pub fn describe(rule: &RecurrenceRule) -> RuleDescription {
    let frequency_text = frequency_phrase(rule);
    let day_text = day_phrase(rule);
    let end_text = end_phrase(rule);

    let mut primary_text = frequency_text.clone();
    if let Some(ref day) = day_text {
        primary_text.push(' ');
        primary_text.push_str(day);
    }
    if let Some(ref end) = end_text {
        primary_text.push_str(", ");
        primary_text.push_str(end);
    }

    RuleDescription {
        primary_text,
        frequency_text,
        day_text,
        end_text,
    }
}

/// Maps a canonical phrase back to a recurrence rule.
///
/// Only a small closed vocabulary is recognized; anything else returns
/// `None`. Matching is case-insensitive and ignores surrounding whitespace.
pub fn parse_known_phrase(text: &str) -> Option<RecurrenceRule> {
    match text.trim().to_lowercase().as_str() {
        "daily" | "every day" => Some(RecurrenceRule::daily()),
        "weekdays" | "weekdays only" | "every weekday" => Some(RecurrenceRule::weekdays_only()),
        "weekly" | "every week" => Some(RecurrenceRule::weekly(&[])),
        "biweekly" | "every other week" => Some(RecurrenceRule::weekly(&[]).with_interval(2)),
        "monthly" | "every month" => Some(RecurrenceRule::new(Frequency::Monthly)),
        "yearly" | "annually" | "every year" => Some(RecurrenceRule::yearly()),
        _ => None,
    }
}

fn frequency_phrase(rule: &RecurrenceRule) -> String {
    let (single, unit) = match rule.frequency {
        Frequency::Daily => ("Daily", "days"),
        Frequency::Weekly => ("Weekly", "weeks"),
        Frequency::Monthly => ("Monthly", "months"),
        Frequency::Yearly => ("Annually", "years"),
    };
    if rule.interval <= 1 {
        single.to_string()
    } else {
        format!("Every {} {unit}", rule.interval)
    }
}

fn day_phrase(rule: &RecurrenceRule) -> Option<String> {
    match rule.frequency {
        Frequency::Weekly => {
            let weekdays = rule.weekdays.as_ref()?;
            if weekdays.is_empty() {
                return None;
            }
            if is_weekdays_only(weekdays) {
                return Some("on weekdays".to_string());
            }
            let names: Vec<&str> = weekdays.iter().map(|w| weekday_name(*w)).collect();
            Some(format!("on {}", join_list(&names)))
        }
        Frequency::Monthly => {
            if rule.is_by_position() {
                let ordinals = rule.ordinals.as_ref()?;
                let weekdays = rule.weekdays.as_ref()?;
                let mut parts = Vec::new();
                for &ordinal in ordinals {
                    for &weekday in weekdays {
                        parts.push(format!("{} {}", ordinal_name(ordinal), weekday_name(weekday)));
                    }
                }
                let parts: Vec<&str> = parts.iter().map(String::as_str).collect();
                Some(format!("on the {}", join_list(&parts)))
            } else if let Some(ref days) = rule.month_days {
                if days.is_empty() {
                    return None;
                }
                let rendered: Vec<String> = days.iter().map(u32::to_string).collect();
                let rendered: Vec<&str> = rendered.iter().map(String::as_str).collect();
                if rendered.len() == 1 {
                    Some(format!("on day {}", rendered[0]))
                } else {
                    Some(format!("on days {}", join_list(&rendered)))
                }
            } else {
                None
            }
        }
        Frequency::Yearly => {
            let months = rule.months.as_ref()?;
            if months.is_empty() {
                return None;
            }
            let names: Vec<&str> = months.iter().filter_map(|&m| month_name(m)).collect();
            if names.is_empty() {
                return None;
            }
            Some(format!("in {}", join_list(&names)))
        }
        Frequency::Daily => None,
    }
}

fn end_phrase(rule: &RecurrenceRule) -> Option<String> {
    if let Some(count) = rule.count {
        if count == 1 {
            return Some("once".to_string());
        }
        return Some(format!("{count} times"));
    }
    rule.until
        .map(|until| format!("until {}", until.format("%Y-%m-%d")))
}

fn is_weekdays_only(weekdays: &[Weekday]) -> bool {
    weekdays.len() == 5
        && [
            Weekday::Mon,
            Weekday::Tue,
            Weekday::Wed,
            Weekday::Thu,
            Weekday::Fri,
        ]
        .iter()
        .all(|w| weekdays.contains(w))
}

/// Joins items as "A", "A and B", or "A, B, and C".
fn join_list(items: &[&str]) -> String {
    match items {
        [] => String::new(),
        [only] => (*only).to_string(),
        [first, second] => format!("{first} and {second}"),
        [init @ .., last] => format!("{}, and {last}", init.join(", ")),
    }
}

fn weekday_name(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

fn ordinal_name(ordinal: i32) -> &'static str {
    match ordinal {
        1 => "first",
        2 => "second",
        3 => "third",
        4 => "fourth",
        5 => "fifth",
        -1 => "last",
        -2 => "second-to-last",
        -3 => "third-to-last",
        -4 => "fourth-to-last",
        -5 => "fifth-to-last",
        _ => "unknown",
    }
}

fn month_name(month: u32) -> Option<&'static str> {
    Some(match month {
        1 => "January",
        2 => "February",
        3 => "March",
        4 => "April",
        5 => "May",
        6 => "June",
        7 => "July",
        8 => "August",
        9 => "September",
        10 => "October",
        11 => "November",
        12 => "December",
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    mod describe_rules {
        use super::*;

        #[test]
        fn daily() {
            let text = describe(&RecurrenceRule::daily()).primary_text;
            insta::assert_snapshot!(text, @"Daily");
        }

        #[test]
        fn every_three_days() {
            let text = describe(&RecurrenceRule::daily().with_interval(3)).primary_text;
            insta::assert_snapshot!(text, @"Every 3 days");
        }

        #[test]
        fn weekly_on_days() {
            let rule = RecurrenceRule::weekly(&[Weekday::Mon, Weekday::Wed, Weekday::Fri]);
            let text = describe(&rule).primary_text;
            insta::assert_snapshot!(text, @"Weekly on Monday, Wednesday, and Friday");
        }

        #[test]
        fn weekdays_only() {
            let text = describe(&RecurrenceRule::weekdays_only()).primary_text;
            insta::assert_snapshot!(text, @"Weekly on weekdays");
        }

        #[test]
        fn biweekly_with_count() {
            let rule = RecurrenceRule::weekly(&[Weekday::Tue])
                .with_interval(2)
                .with_count(10);
            let text = describe(&rule).primary_text;
            insta::assert_snapshot!(text, @"Every 2 weeks on Tuesday, 10 times");
        }

        #[test]
        fn monthly_by_day() {
            let text = describe(&RecurrenceRule::monthly_on_day(15)).primary_text;
            insta::assert_snapshot!(text, @"Monthly on day 15");
        }

        #[test]
        fn monthly_last_friday() {
            let rule = RecurrenceRule::monthly_by_position(-1, Weekday::Fri);
            let text = describe(&rule).primary_text;
            insta::assert_snapshot!(text, @"Monthly on the last Friday");
        }

        #[test]
        fn yearly_with_months_and_until() {
            let rule = RecurrenceRule::yearly()
                .with_months(vec![1, 7])
                .with_until(Utc.with_ymd_and_hms(2025, 12, 31, 0, 0, 0).unwrap());
            let text = describe(&rule).primary_text;
            insta::assert_snapshot!(text, @"Annually in January and July, until 2025-12-31");
        }

        #[test]
        fn components_are_split() {
            let rule = RecurrenceRule::weekly(&[Weekday::Mon]).with_count(5);
            let description = describe(&rule);
            assert_eq!(description.frequency_text, "Weekly");
            assert_eq!(description.day_text.as_deref(), Some("on Monday"));
            assert_eq!(description.end_text.as_deref(), Some("5 times"));
        }

        #[test]
        fn deterministic() {
            let rule = RecurrenceRule::weekly(&[Weekday::Mon, Weekday::Fri]).with_count(3);
            assert_eq!(describe(&rule), describe(&rule));
        }
    }

    mod known_phrases {
        use super::*;

        #[test]
        fn recognized_phrases() {
            assert_eq!(parse_known_phrase("daily"), Some(RecurrenceRule::daily()));
            assert_eq!(parse_known_phrase("every day"), Some(RecurrenceRule::daily()));
            assert_eq!(
                parse_known_phrase("weekdays only"),
                Some(RecurrenceRule::weekdays_only())
            );
            assert_eq!(
                parse_known_phrase("every other week"),
                Some(RecurrenceRule::weekly(&[]).with_interval(2))
            );
            assert_eq!(parse_known_phrase("annually"), Some(RecurrenceRule::yearly()));
        }

        #[test]
        fn case_and_whitespace_insensitive() {
            assert_eq!(parse_known_phrase("  Daily "), Some(RecurrenceRule::daily()));
            assert_eq!(
                parse_known_phrase("EVERY WEEKDAY"),
                Some(RecurrenceRule::weekdays_only())
            );
        }

        #[test]
        fn unknown_phrases_return_none() {
            assert_eq!(parse_known_phrase("every 3rd thursday"), None);
            assert_eq!(parse_known_phrase("sometimes"), None);
            assert_eq!(parse_known_phrase(""), None);
        }
    }

    mod helpers {
        use super::*;

        #[test]
        fn list_joining() {
            assert_eq!(join_list(&[]), "");
            assert_eq!(join_list(&["Monday"]), "Monday");
            assert_eq!(join_list(&["Monday", "Friday"]), "Monday and Friday");
            assert_eq!(
                join_list(&["Monday", "Wednesday", "Friday"]),
                "Monday, Wednesday, and Friday"
            );
        }

        #[test]
        fn ordinal_names() {
            assert_eq!(ordinal_name(1), "first");
            assert_eq!(ordinal_name(-1), "last");
            assert_eq!(ordinal_name(-2), "second-to-last");
        }
    }
}
