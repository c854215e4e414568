//! Summary cache behaviour against an instrumented SQLite store.

mod common;

use std::time::Duration as StdDuration;

use chrono::Duration;
use hb_core::{Filters, Interval, SummaryKind, UserTimezone};

use common::{TestStore, alice, at, cache, day, heartbeat, seed_three_days, service, user};

fn three_days() -> Interval {
    Interval::new(day(4), day(7)).unwrap()
}

#[tokio::test]
async fn builds_and_persists_full_days() {
    let store = TestStore::new();
    seed_three_days(&store);
    let cache = cache(&store);
    let owner = user(UserTimezone::utc());

    let summary = cache
        .get_or_build(&owner, three_days(), &Filters::default(), false)
        .await
        .unwrap();

    assert_eq!(summary.total_ms, 3 * 600_000);
    assert_eq!(summary.duration_of(SummaryKind::Project, "hb"), 3 * 600_000);
    assert_eq!(summary.from, day(4));
    assert_eq!(summary.to, day(7));
    assert_eq!(store.scans(), 1, "contiguous days share one scan");
    assert_eq!(store.fragments(&alice(), day(4), day(7)).len(), 3);
}

#[tokio::test]
async fn second_request_is_served_from_fragments() {
    let store = TestStore::new();
    seed_three_days(&store);
    let cache = cache(&store);
    let owner = user(UserTimezone::utc());

    let first = cache
        .get_or_build(&owner, three_days(), &Filters::default(), false)
        .await
        .unwrap();
    let second = cache
        .get_or_build(&owner, three_days(), &Filters::default(), false)
        .await
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(store.scans(), 1);
}

#[tokio::test]
async fn days_outside_activity_are_not_built() {
    let store = TestStore::new();
    seed_three_days(&store);
    let cache = cache(&store);
    let owner = user(UserTimezone::utc());

    let wide = Interval::new(day(1), day(10)).unwrap();
    let summary = cache
        .get_or_build(&owner, wide, &Filters::default(), false)
        .await
        .unwrap();

    assert_eq!(summary.total_ms, 3 * 600_000);
    assert_eq!(store.fragments(&alice(), day(1), day(10)).len(), 3);
}

#[tokio::test]
async fn pruned_days_are_served_from_fragments() {
    let store = TestStore::new();
    seed_three_days(&store);
    let service = service(&store);
    let owner = user(UserTimezone::utc());
    let cache = service.cache();

    cache
        .get_or_build(&owner, three_days(), &Filters::default(), false)
        .await
        .unwrap();
    assert_eq!(service.prune(day(5)).await.unwrap(), 3);

    let kept = cache
        .get_or_build(&owner, three_days(), &Filters::default(), false)
        .await
        .unwrap();
    assert_eq!(kept.total_ms, 3 * 600_000);
    assert_eq!(store.scans(), 1);

    let rebuilt = cache
        .get_or_build(&owner, three_days(), &Filters::default(), true)
        .await
        .unwrap();
    assert_eq!(rebuilt.total_ms, 2 * 600_000);
    assert_eq!(store.fragments(&alice(), day(4), day(7)).len(), 2);
}

#[tokio::test]
async fn partial_days_are_rebuilt_every_time() {
    let store = TestStore::new();
    seed_three_days(&store);
    let cache = cache(&store);
    let owner = user(UserTimezone::utc());

    // 08:00 on the 4th to 12:00 on the 6th: partial head, one full day, partial tail.
    let interval = Interval::new(at(4, 8, 0), at(6, 12, 0)).unwrap();
    for _ in 0..2 {
        let summary = cache
            .get_or_build(&owner, interval, &Filters::default(), false)
            .await
            .unwrap();
        assert_eq!(summary.total_ms, 3 * 600_000);
    }

    // One scan for the full day, then two partial scans per request.
    assert_eq!(store.scans(), 5);
    assert_eq!(store.fragments(&alice(), day(4), day(7)).len(), 1);
}

#[tokio::test]
async fn fragments_are_keyed_by_filters() {
    let store = TestStore::new();
    seed_three_days(&store);
    store
        .db
        .insert_heartbeats(&[
            heartbeat(at(5, 14, 0), "docs", "Markdown"),
            heartbeat(at(5, 14, 5), "docs", "Markdown"),
        ])
        .unwrap();
    let cache = cache(&store);
    let owner = user(UserTimezone::utc());

    let all = cache
        .get_or_build(&owner, three_days(), &Filters::default(), false)
        .await
        .unwrap();
    let docs = cache
        .get_or_build(
            &owner,
            three_days(),
            &Filters::default().with(SummaryKind::Project, "docs"),
            false,
        )
        .await
        .unwrap();

    assert_eq!(all.total_ms, 3 * 600_000 + 300_000);
    assert_eq!(docs.total_ms, 300_000);
    assert_eq!(docs.projects.len(), 1);
    assert_eq!(store.scans(), 2, "a new fingerprint is a miss");
}

#[tokio::test]
async fn filter_fragments_never_cross_over() {
    let store = TestStore::new();
    seed_three_days(&store);
    let cache = cache(&store);
    let owner = user(UserTimezone::utc());

    let all = cache
        .get_or_build(&owner, three_days(), &Filters::default(), false)
        .await
        .unwrap();
    let blank = cache
        .get_or_build(
            &owner,
            three_days(),
            &Filters::default().with(SummaryKind::Project, ""),
            false,
        )
        .await
        .unwrap();
    assert_eq!(blank, all);
    assert_eq!(store.scans(), 1, "a blank filter is no filter");

    let split = Filters::default()
        .with(SummaryKind::Project, "hb")
        .with(SummaryKind::Language, "Rust");
    let split = cache
        .get_or_build(&owner, three_days(), &split, false)
        .await
        .unwrap();
    let joined = cache
        .get_or_build(
            &owner,
            three_days(),
            &Filters::default().with(SummaryKind::Project, "hb|language=Rust"),
            false,
        )
        .await
        .unwrap();

    assert_eq!(split.total_ms, 3 * 600_000);
    assert_eq!(joined.total_ms, 0);
    assert_eq!(store.scans(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_requests_share_one_build() {
    let store = TestStore::new();
    seed_three_days(&store);
    store.set_scan_delay_ms(200);
    let cache = cache(&store);
    let owner = user(UserTimezone::utc());
    let filters = Filters::default();

    let (a, b) = tokio::join!(
        cache.get_or_build(&owner, three_days(), &filters, false),
        cache.get_or_build(&owner, three_days(), &filters, false),
    );

    assert_eq!(a.unwrap(), b.unwrap());
    assert_eq!(store.scans(), 1);
    assert_eq!(cache.in_flight(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn overlapping_requests_join_the_running_days() {
    let store = TestStore::new();
    seed_three_days(&store);
    store.set_scan_delay_ms(200);
    let cache = cache(&store);
    let owner = user(UserTimezone::utc());

    let wide = {
        let cache = cache.clone();
        let owner = owner.clone();
        tokio::spawn(async move {
            cache
                .get_or_build(&owner, three_days(), &Filters::default(), false)
                .await
        })
    };
    tokio::time::sleep(StdDuration::from_millis(50)).await;
    let narrow = cache
        .get_or_build(
            &owner,
            Interval::new(day(5), day(6)).unwrap(),
            &Filters::default(),
            false,
        )
        .await
        .unwrap();

    assert_eq!(narrow.total_ms, 600_000);
    assert_eq!(wide.await.unwrap().unwrap().total_ms, 3 * 600_000);
    assert_eq!(store.scans(), 1);
}

#[tokio::test]
async fn failed_build_is_retried_once() {
    let store = TestStore::new();
    seed_three_days(&store);
    store.fail_next_scans(1);
    let cache = cache(&store);
    let owner = user(UserTimezone::utc());

    let summary = cache
        .get_or_build(&owner, three_days(), &Filters::default(), false)
        .await
        .unwrap();

    assert_eq!(summary.total_ms, 3 * 600_000);
    assert_eq!(store.scans(), 2);
    assert_eq!(store.fragments(&alice(), day(4), day(7)).len(), 3);
}

#[tokio::test]
async fn second_failure_surfaces_storage_error() {
    let store = TestStore::new();
    seed_three_days(&store);
    store.fail_next_scans(2);
    let cache = cache(&store);
    let owner = user(UserTimezone::utc());

    let err = cache
        .get_or_build(&owner, three_days(), &Filters::default(), false)
        .await
        .unwrap_err();

    assert_eq!(err.message(), "injected scan failure");
    assert_eq!(store.scans(), 2);
    assert!(store.fragments(&alice(), day(4), day(7)).is_empty());
    assert_eq!(cache.in_flight(), 0);
}

#[tokio::test]
async fn insert_evicts_only_the_touched_day() {
    let store = TestStore::new();
    seed_three_days(&store);
    let service = service(&store);
    let cache = service.cache().clone();
    let owner = user(UserTimezone::utc());

    cache
        .get_or_build(&owner, three_days(), &Filters::default(), false)
        .await
        .unwrap();
    let before = store.fragments(&alice(), day(4), day(7));

    service
        .insert_heartbeats(vec![
            heartbeat(at(5, 16, 0), "hb", "Rust"),
            heartbeat(at(5, 16, 2), "hb", "Rust"),
        ])
        .await
        .unwrap();

    let after_insert = store.fragments(&alice(), day(4), day(7));
    assert_eq!(after_insert.len(), 2);
    assert!(after_insert.iter().all(|f| f.from != day(5)));

    let summary = cache
        .get_or_build(&owner, three_days(), &Filters::default(), false)
        .await
        .unwrap();
    assert_eq!(summary.total_ms, 3 * 600_000 + 120_000);
    assert_eq!(store.scans(), 2);

    let rebuilt = store.fragments(&alice(), day(4), day(7));
    assert_eq!(rebuilt[0], before[0]);
    assert_ne!(rebuilt[1], before[1]);
    assert_eq!(rebuilt[2], before[2]);
}

#[tokio::test]
async fn recompute_overwrites_stale_fragments() {
    let store = TestStore::new();
    seed_three_days(&store);
    let cache = cache(&store);
    let owner = user(UserTimezone::utc());

    cache
        .get_or_build(&owner, three_days(), &Filters::default(), false)
        .await
        .unwrap();
    let before = store.fragments(&alice(), day(4), day(7));

    // Written behind the cache's back, so nothing is evicted.
    store
        .db
        .insert_heartbeats(&[
            heartbeat(at(5, 16, 0), "hb", "Rust"),
            heartbeat(at(5, 16, 3), "hb", "Rust"),
        ])
        .unwrap();

    let stale = cache
        .get_or_build(&owner, three_days(), &Filters::default(), false)
        .await
        .unwrap();
    assert_eq!(stale.total_ms, 3 * 600_000);

    let fresh = cache
        .get_or_build(&owner, three_days(), &Filters::default(), true)
        .await
        .unwrap();
    assert_eq!(fresh.total_ms, 3 * 600_000 + 180_000);

    let after = store.fragments(&alice(), day(4), day(7));
    assert_eq!(after[0], before[0]);
    assert_eq!(after[1].total_ms, 600_000 + 180_000);
    assert_eq!(after[2], before[2]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn invalidated_flight_does_not_persist() {
    let store = TestStore::new();
    seed_three_days(&store);
    store.set_scan_delay_ms(300);
    let cache = cache(&store);
    let owner = user(UserTimezone::utc());

    let request = {
        let cache = cache.clone();
        let owner = owner.clone();
        tokio::spawn(async move {
            cache
                .get_or_build(&owner, three_days(), &Filters::default(), false)
                .await
        })
    };
    tokio::time::sleep(StdDuration::from_millis(100)).await;
    cache.invalidate_user(&alice()).await.unwrap();

    let summary = request.await.unwrap().unwrap();
    assert_eq!(summary.total_ms, 3 * 600_000);
    assert!(store.fragments(&alice(), day(4), day(7)).is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancelled_request_drops_its_flight() {
    let store = TestStore::new();
    seed_three_days(&store);
    store.set_scan_delay_ms(300);
    let cache = cache(&store);
    let owner = user(UserTimezone::utc());

    let request = {
        let cache = cache.clone();
        let owner = owner.clone();
        tokio::spawn(async move {
            cache
                .get_or_build(&owner, three_days(), &Filters::default(), false)
                .await
        })
    };
    tokio::time::sleep(StdDuration::from_millis(100)).await;
    assert_eq!(cache.in_flight(), 1);

    request.abort();
    assert!(request.await.unwrap_err().is_cancelled());
    assert_eq!(cache.in_flight(), 0);
}

#[tokio::test]
async fn timed_out_request_leaves_nothing_in_flight() {
    let store = TestStore::new();
    seed_three_days(&store);
    store.set_scan_delay_ms(200);
    let cache = cache(&store);
    let owner = user(UserTimezone::utc());

    let filters = Filters::default();
    let result = tokio::time::timeout(
        StdDuration::from_millis(50),
        cache.get_or_build(&owner, three_days(), &filters, false),
    )
    .await;

    assert!(result.is_err());
    assert_eq!(cache.in_flight(), 0);
}

#[tokio::test]
async fn days_follow_the_owner_timezone() {
    let store = TestStore::new();
    // 23:30 and 23:35 UTC on the 4th are 08:30 and 08:35 on the 5th in UTC+9.
    store
        .db
        .insert_heartbeats(&[
            heartbeat(at(4, 23, 30), "hb", "Rust"),
            heartbeat(at(4, 23, 35), "hb", "Rust"),
        ])
        .unwrap();
    let cache = cache(&store);
    let owner = user(UserTimezone::from_offset_secs(9 * 3600).unwrap());

    let local_day = Interval::new(at(4, 15, 0), at(5, 15, 0)).unwrap();
    let summary = cache
        .get_or_build(&owner, local_day, &Filters::default(), false)
        .await
        .unwrap();

    assert_eq!(summary.total_ms, 300_000);
    let fragments = store.fragments(&alice(), at(4, 15, 0), at(5, 15, 0));
    assert_eq!(fragments.len(), 1);
    assert_eq!(fragments[0].from, at(4, 15, 0));
    assert_eq!(fragments[0].to, at(4, 15, 0) + Duration::days(1));
}
