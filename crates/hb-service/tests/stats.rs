//! Stats and heartbeat queries through the service boundary.

mod common;

use chrono::{TimeZone, Utc};
use hb_core::{Alias, Filters, ProjectLabel, SummaryKind, User, UserId, UserTimezone};
use hb_service::{HeartbeatsError, StatsError, StatsQuery};

use common::{TestStore, alice, at, day, heartbeat, seed_three_days, service, user};

fn bob() -> UserId {
    UserId::new("bob").unwrap()
}

async fn seeded(owner: User) -> (std::sync::Arc<TestStore>, hb_service::SummaryService) {
    let store = TestStore::new();
    seed_three_days(&store);
    store
        .db
        .insert_heartbeats(&[
            heartbeat(at(5, 14, 0), "docs", ""),
            heartbeat(at(5, 14, 5), "docs", ""),
        ])
        .unwrap();
    let service = service(&store);
    service.put_user(owner).await.unwrap();
    (store, service)
}

#[tokio::test]
async fn owner_sees_every_category() {
    let (_store, service) = seeded(user(UserTimezone::utc())).await;
    let query = StatsQuery::new("alice")
        .principal(alice())
        .range("2024-03-04..2024-03-06");

    let stats = service.get_stats(&query).await.unwrap();
    let data = &stats.data;

    assert_eq!(data.range, "2024-03-04..2024-03-06");
    assert_eq!(data.start, day(4));
    assert_eq!(data.end, day(7));
    assert_eq!(data.days_including_holidays, 3);
    assert!((data.total_seconds_including_other_language - 2_100.0).abs() < f64::EPSILON);
    assert!((data.total_seconds - 1_800.0).abs() < f64::EPSILON);
    assert!((data.daily_average - 600.0).abs() < f64::EPSILON);
    assert_eq!(data.projects[0].name, "hb");
    assert_eq!(data.projects[1].name, "docs");
    assert_eq!(data.languages[1].name, "unknown");
    assert_eq!(data.editors[0].text, "35 mins");
    assert_eq!(data.entities.len(), 2);
}

#[tokio::test]
async fn current_resolves_to_the_principal() {
    let (_store, service) = seeded(user(UserTimezone::utc())).await;
    let query = StatsQuery::new("current")
        .principal(alice())
        .range("2024-03-05");

    let stats = service.get_stats(&query).await.unwrap();

    assert_eq!(stats.data.user_id, "alice");
    assert!((stats.data.total_seconds_including_other_language - 900.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn unknown_user_is_not_found() {
    let (_store, service) = seeded(user(UserTimezone::utc())).await;

    let missing = service.get_stats(&StatsQuery::new("carol")).await;
    let anonymous_current = service.get_stats(&StatsQuery::new("current")).await;

    assert!(matches!(missing, Err(StatsError::NotFound)));
    assert!(matches!(anonymous_current, Err(StatsError::NotFound)));
}

#[tokio::test]
async fn bad_range_is_rejected() {
    let (_store, service) = seeded(user(UserTimezone::utc())).await;
    let query = StatsQuery::new("alice").principal(alice()).range("fortnight");

    let err = service.get_stats(&query).await.unwrap_err();

    assert!(matches!(err, StatsError::InvalidRange(_)));
    assert_eq!(err.to_string(), "invalid range: unrecognized range: fortnight");
}

#[tokio::test]
async fn missing_range_defaults_to_last_7_days() {
    let (_store, service) = seeded(user(UserTimezone::utc())).await;
    let now = at(8, 12, 0);

    let stats = service
        .get_stats_at(&StatsQuery::new("alice").principal(alice()), now)
        .await
        .unwrap();

    assert_eq!(stats.data.range, "last_7_days");
    assert_eq!(stats.data.start, at(1, 12, 0));
    assert_eq!(stats.data.end, now);
    assert!((stats.data.total_seconds_including_other_language - 2_100.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn today_in_utc_plus_9_spans_local_midnights() {
    let owner = user(UserTimezone::from_offset_secs(9 * 3600).unwrap());
    let (_store, service) = seeded(owner).await;
    // 11:00 on March 5th in UTC+9.
    let now = at(5, 2, 0);

    let stats = service
        .get_stats_at(&StatsQuery::new("alice").principal(alice()).range("today"), now)
        .await
        .unwrap();

    assert_eq!(stats.data.start, at(4, 15, 0));
    assert_eq!(stats.data.end, at(5, 15, 0));
    assert_eq!(stats.data.timezone, "+09:00");
    // The 4th's 09:00 UTC block is 18:00 local on the 4th and falls outside.
    // The 5th's 09:00 and 14:00 UTC blocks are 18:00 and 23:00 local on the 5th.
    assert!((stats.data.total_seconds_including_other_language - 900.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn anonymous_requester_gets_shared_categories_only() {
    let mut owner = user(UserTimezone::utc());
    owner.share_languages = true;
    owner.share_data_max_days = -1;
    let (_store, service) = seeded(owner).await;

    let stats = service
        .get_stats(&StatsQuery::new("alice").range("2024-03-04..2024-03-06"))
        .await
        .unwrap();

    assert!(stats.data.projects.is_empty());
    assert!(stats.data.editors.is_empty());
    assert!(stats.data.entities.is_empty());
    assert_eq!(stats.data.languages.len(), 2);
    assert!((stats.data.total_seconds_including_other_language - 2_100.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn too_broad_range_is_forbidden_for_others() {
    let mut owner = user(UserTimezone::utc());
    owner.share_data_max_days = 30;
    owner.share_projects = true;
    let (_store, service) = seeded(owner).await;
    let now = Utc.with_ymd_and_hms(2024, 3, 10, 0, 0, 0).unwrap();
    // 40 days ending on March 9th.
    let range = "2024-01-30..2024-03-09";

    let anonymous = service
        .get_stats_at(&StatsQuery::new("alice").range(range), now)
        .await;
    let other = service
        .get_stats_at(&StatsQuery::new("alice").principal(bob()).range(range), now)
        .await;
    let owner_view = service
        .get_stats_at(&StatsQuery::new("alice").principal(alice()).range(range), now)
        .await;

    assert!(matches!(anonymous, Err(StatsError::Forbidden)));
    assert!(matches!(other, Err(StatsError::Forbidden)));
    assert!(owner_view.is_ok());
}

#[tokio::test]
async fn filters_are_applied_and_echoed() {
    let (_store, service) = seeded(user(UserTimezone::utc())).await;
    let filters = Filters::default().with(SummaryKind::Project, "docs");
    let query = StatsQuery::new("alice")
        .principal(alice())
        .range("2024-03-04..2024-03-06")
        .filters(filters.clone());

    let stats = service.get_stats(&query).await.unwrap();

    assert_eq!(stats.data.filters, filters);
    assert_eq!(stats.data.projects.len(), 1);
    assert!((stats.data.total_seconds_including_other_language - 300.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn alias_change_merges_projects_and_evicts() {
    let (store, service) = seeded(user(UserTimezone::utc())).await;
    let query = StatsQuery::new("alice")
        .principal(alice())
        .range("2024-03-04..2024-03-06");
    service.get_stats(&query).await.unwrap();
    assert_eq!(store.fragments(&alice(), day(4), day(7)).len(), 3);

    service
        .put_alias(Alias {
            user_id: alice(),
            kind: SummaryKind::Project,
            raw: "docs".to_string(),
            canonical: "hb".to_string(),
        })
        .await
        .unwrap();
    assert!(store.fragments(&alice(), day(4), day(7)).is_empty());

    let stats = service.get_stats(&query).await.unwrap();
    assert_eq!(stats.data.projects.len(), 1);
    assert_eq!(stats.data.projects[0].name, "hb");
    assert!((stats.data.projects[0].total_seconds - 2_100.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn project_labels_are_reported() {
    let (_store, service) = seeded(user(UserTimezone::utc())).await;
    service
        .put_project_label(ProjectLabel {
            user_id: alice(),
            project: "hb".to_string(),
            label: "work".to_string(),
        })
        .await
        .unwrap();

    let stats = service
        .get_stats(
            &StatsQuery::new("alice")
                .principal(alice())
                .range("2024-03-04..2024-03-06"),
        )
        .await
        .unwrap();

    assert_eq!(stats.data.labels.len(), 1);
    assert_eq!(stats.data.labels[0].name, "work");
    assert!((stats.data.labels[0].total_seconds - 1_800.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn storage_failure_is_reported_without_details() {
    let (store, service) = seeded(user(UserTimezone::utc())).await;
    store.fail_next_scans(2);

    let err = service
        .get_stats(
            &StatsQuery::new("alice")
                .principal(alice())
                .range("2024-03-04..2024-03-06"),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, StatsError::Internal));
    assert_eq!(err.to_string(), "internal server error");
}

#[tokio::test]
async fn heartbeats_for_a_local_day() {
    let owner = user(UserTimezone::from_offset_secs(9 * 3600).unwrap());
    let (_store, service) = seeded(owner).await;

    let result = service
        .get_heartbeats("current", Some(&alice()), "2024-03-05")
        .await
        .unwrap();

    assert_eq!(result.start, "2024-03-04T15:00:00Z");
    assert_eq!(result.end, "2024-03-05T15:00:00Z");
    assert_eq!(result.timezone, "+09:00");
    // 09:00 to 09:10 UTC on the 5th and the two docs heartbeats at 14:00 UTC.
    assert_eq!(result.data.len(), 5);
    assert!(result.data.windows(2).all(|w| w[0].time <= w[1].time));
    assert_eq!(result.data[0].entity_type, "file");
}

#[tokio::test]
async fn heartbeats_reject_bad_input() {
    let (_store, service) = seeded(user(UserTimezone::utc())).await;

    let bad_date = service
        .get_heartbeats("alice", Some(&alice()), "05/03/2024")
        .await;
    let other = service.get_heartbeats("alice", Some(&bob()), "2024-03-05").await;
    let anonymous = service.get_heartbeats("alice", None, "2024-03-05").await;
    let missing = service
        .get_heartbeats("carol", Some(&alice()), "2024-03-05")
        .await;

    assert!(matches!(bad_date, Err(HeartbeatsError::BadDate(_))));
    assert!(matches!(other, Err(HeartbeatsError::Forbidden)));
    assert!(matches!(anonymous, Err(HeartbeatsError::Forbidden)));
    assert!(matches!(missing, Err(HeartbeatsError::NotFound)));
}

#[tokio::test]
async fn timezone_change_evicts_cached_days() {
    let (store, service) = seeded(user(UserTimezone::utc())).await;
    service
        .get_stats(
            &StatsQuery::new("alice")
                .principal(alice())
                .range("2024-03-04..2024-03-06"),
        )
        .await
        .unwrap();
    assert!(!store.fragments(&alice(), day(4), day(7)).is_empty());

    service
        .put_user(user(UserTimezone::from_offset_secs(3600).unwrap()))
        .await
        .unwrap();

    assert!(store.fragments(&alice(), day(1), day(10)).is_empty());
}
