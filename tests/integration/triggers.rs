//! Trigger contract checks across schedule kinds.

use chrono::{TimeZone, Timelike, Utc};
use std::time::Duration;

use firetime::{
    CronSchedule, RepeatCount, SimpleSchedule, Trigger, TriggerBuilder, TriggerSchedule,
};

fn simple_trigger_at(name: &str, start: chrono::DateTime<Utc>) -> Trigger {
    let schedule = SimpleSchedule::new(Duration::from_secs(60), RepeatCount::Indefinite).unwrap();
    let mut trigger = TriggerBuilder::new(name, "job", TriggerSchedule::Simple(schedule))
        .start_at(start)
        .build()
        .unwrap();
    trigger.compute_first_fire_time(None);
    trigger
}

#[test]
fn test_due_order_across_schedule_kinds() {
    let base = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();

    let simple = simple_trigger_at("simple", base + chrono::Duration::minutes(30));

    let mut cron = TriggerBuilder::new(
        "cron",
        "job",
        TriggerSchedule::Cron(CronSchedule::new("0 15 8 * * *").unwrap()),
    )
    .start_at(base)
    .build()
    .unwrap();
    cron.compute_first_fire_time(None);

    // never computed: sorts last
    let idle = TriggerBuilder::new(
        "idle",
        "job",
        TriggerSchedule::Simple(SimpleSchedule::once()),
    )
    .start_at(base)
    .build()
    .unwrap();

    let mut due = vec![&simple, &idle, &cron];
    due.sort_by(|a, b| a.compare(b));
    let names: Vec<&str> = due.iter().map(|t| t.name()).collect();
    assert_eq!(names, ["cron", "simple", "idle"]);
}

#[test]
fn test_cron_trigger_truncates_start_to_whole_seconds() {
    let precise = Utc
        .with_ymd_and_hms(2024, 5, 1, 8, 0, 0)
        .unwrap()
        .with_nanosecond(123_456_789)
        .unwrap();

    let trigger = TriggerBuilder::new(
        "t",
        "j",
        TriggerSchedule::Cron(CronSchedule::new("0 * * * *").unwrap()),
    )
    .start_at(precise)
    .build()
    .unwrap();

    assert_eq!(trigger.start_time().timestamp_subsec_millis(), 0);
    assert_eq!(trigger.start_time().second(), 0);
}

#[test]
fn test_simple_trigger_keeps_millisecond_start() {
    let precise = Utc
        .with_ymd_and_hms(2024, 5, 1, 8, 0, 0)
        .unwrap()
        .with_nanosecond(250_000_000)
        .unwrap();

    let trigger = TriggerBuilder::new(
        "t",
        "j",
        TriggerSchedule::Simple(SimpleSchedule::once()),
    )
    .start_at(precise)
    .build()
    .unwrap();

    assert_eq!(trigger.start_time().timestamp_subsec_millis(), 250);
}

#[test]
fn test_trigger_round_trips_through_store_serialization() {
    let start = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
    let schedule = SimpleSchedule::new(Duration::from_secs(120), RepeatCount::Finite(5)).unwrap();

    let mut trigger = TriggerBuilder::new("nightly", "rollup", TriggerSchedule::Simple(schedule))
        .group("reports")
        .job_group("etl")
        .description("rollup run")
        .start_at(start)
        .end_at(start + chrono::Duration::hours(2))
        .modified_by_calendar("holidays")
        .listener("audit")
        .build()
        .unwrap();
    trigger.job_data().insert("retention", 7);
    trigger.set_fire_instance_id(Some("fi-1".to_string()));
    trigger.compute_first_fire_time(None);
    trigger.triggered(None);

    let json = serde_json::to_string(&trigger).unwrap();
    let restored: Trigger = serde_json::from_str(&json).unwrap();

    assert_eq!(restored, trigger);
    assert_eq!(restored.full_name(), "reports.nightly");
    assert_eq!(restored.job_key().full_name(), "etl.rollup");
    assert_eq!(restored.description(), Some("rollup run"));
    assert_eq!(restored.calendar_name(), Some("holidays"));
    assert_eq!(restored.fire_instance_id(), Some("fi-1"));
    assert_eq!(restored.trigger_listener_names(), ["audit"]);
    assert_eq!(restored.start_time(), trigger.start_time());
    assert_eq!(restored.end_time(), trigger.end_time());
    assert_eq!(restored.next_fire_time(), trigger.next_fire_time());
    assert_eq!(restored.previous_fire_time(), trigger.previous_fire_time());
    assert_eq!(restored.job_data_ref().unwrap().get::<i64>("retention"), Some(7));
}

#[test]
fn test_cron_trigger_fire_sequence() {
    let start = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
    let mut trigger = TriggerBuilder::new(
        "hourly",
        "j",
        TriggerSchedule::Cron(CronSchedule::new("0 0 * * * *").unwrap()),
    )
    .start_at(start)
    .end_at(start + chrono::Duration::hours(2))
    .build()
    .unwrap();

    assert_eq!(trigger.compute_first_fire_time(None), Some(start));
    trigger.triggered(None);
    trigger.triggered(None);
    assert_eq!(
        trigger.previous_fire_time(),
        Some(start + chrono::Duration::hours(1))
    );
    assert_eq!(
        trigger.next_fire_time(),
        Some(start + chrono::Duration::hours(2))
    );

    trigger.triggered(None);
    assert!(trigger.next_fire_time().is_none());
    assert!(!trigger.may_fire_again());
}
