//! Data manager scenarios against the in-memory provider.

mod common;

use common::{at, date, fetched_days, manager, Call, MockProvider};
use moexdl_core::data::{batch, LogProgress, PairOutcome};
use moexdl_core::domain::Timeframe;
use moexdl_core::error::DataError;
use std::fs;

#[test]
fn download_range_writes_one_file_per_year() {
    let tmp = tempfile::tempdir().unwrap();
    let (provider, _calls) = MockProvider::new(&[("SBER", date(2007, 7, 19))]);
    let (m, _clock) = manager(tmp.path(), provider, at(2021, 1, 15, 12));

    let written = m
        .download_range("SBER", Timeframe::Day, Some(2020), 2021)
        .unwrap();

    let dir = tmp.path().join("download/SBER/D");
    assert_eq!(
        written,
        vec![dir.join("SBER-D-2020.csv"), dir.join("SBER-D-2021.csv")]
    );

    let y2020 = m.store().read_series(&written[0]).unwrap();
    assert_eq!(y2020.first().unwrap().begin, at(2020, 1, 1, 0));
    assert_eq!(y2020.last().unwrap().begin, at(2020, 12, 31, 0));
    assert!(y2020.iter().all(|c| c.year() == 2020));

    // The current year stops before today.
    let y2021 = m.store().read_series(&written[1]).unwrap();
    assert_eq!(y2021.last().unwrap().begin, at(2021, 1, 14, 0));
    assert_eq!(
        m.get_last_datetime("SBER", Timeframe::Day).unwrap(),
        Some(at(2021, 1, 14, 0))
    );
}

#[test]
fn download_range_resolves_begin_from_first_candle() {
    let tmp = tempfile::tempdir().unwrap();
    let (provider, calls) = MockProvider::new(&[("NEWCO", date(2020, 10, 5))]);
    let (m, _clock) = manager(tmp.path(), provider, at(2021, 1, 15, 12));

    let written = m.download_range("NEWCO", Timeframe::Day, None, 2021).unwrap();

    assert_eq!(written.len(), 2);
    assert_eq!(m.store().years("NEWCO", Timeframe::Day).unwrap(), vec![2020, 2021]);
    assert_eq!(
        calls.lock().unwrap()[0],
        Call::FirstCandle("NEWCO".into(), Timeframe::Day, date(2021, 1, 15))
    );
}

#[test]
fn unknown_instrument_writes_nothing() {
    let tmp = tempfile::tempdir().unwrap();
    let (provider, calls) = MockProvider::new(&[]);
    let (m, _clock) = manager(tmp.path(), provider, at(2021, 1, 15, 12));

    assert!(m
        .download_range("XXXX", Timeframe::Day, None, 2021)
        .unwrap()
        .is_empty());
    assert_eq!(fetched_days(&calls), 0);

    assert_eq!(m.download_year("XXXX", Timeframe::Day, 2020).unwrap(), None);
    assert_eq!(fetched_days(&calls), 366);
    assert_eq!(m.store().latest_file("XXXX", Timeframe::Day).unwrap(), None);
}

#[test]
fn download_year_is_idempotent() {
    let tmp = tempfile::tempdir().unwrap();
    let (provider, _calls) = MockProvider::new(&[("GAZP", date(2000, 1, 1))]);
    let (m, _clock) = manager(tmp.path(), provider, at(2021, 1, 15, 12));

    let path = m
        .download_year("GAZP", Timeframe::Hour1, 2019)
        .unwrap()
        .unwrap();
    let first = fs::read(&path).unwrap();

    m.download_year("GAZP", Timeframe::Hour1, 2019).unwrap();
    assert_eq!(fs::read(&path).unwrap(), first);
}

#[test]
fn future_year_has_no_data() {
    let tmp = tempfile::tempdir().unwrap();
    let (provider, calls) = MockProvider::new(&[("SBER", date(2007, 7, 19))]);
    let (m, _clock) = manager(tmp.path(), provider, at(2021, 1, 15, 12));

    assert_eq!(m.download_year("SBER", Timeframe::Day, 2022).unwrap(), None);
    assert_eq!(fetched_days(&calls), 0);
}

#[test]
fn out_of_range_year_is_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    let (provider, _calls) = MockProvider::new(&[]);
    let (m, _clock) = manager(tmp.path(), provider, at(2021, 1, 15, 12));

    assert!(matches!(
        m.download_year("SBER", Timeframe::Day, 10_000),
        Err(DataError::InvalidYear(10_000))
    ));
}

#[test]
fn last_datetime_without_local_data_is_none() {
    let tmp = tempfile::tempdir().unwrap();
    let (provider, calls) = MockProvider::new(&[("SBER", date(2007, 7, 19))]);
    let (m, _clock) = manager(tmp.path(), provider, at(2021, 1, 15, 12));

    assert_eq!(m.get_last_datetime("SBER", Timeframe::Minute1).unwrap(), None);
    assert!(calls.lock().unwrap().is_empty());
}

#[test]
fn update_without_local_data_fails_without_fetching() {
    let tmp = tempfile::tempdir().unwrap();
    let (provider, calls) = MockProvider::new(&[("SBER", date(2007, 7, 19))]);
    let (m, _clock) = manager(tmp.path(), provider, at(2021, 1, 15, 12));

    match m.update("SBER", Timeframe::Day) {
        Err(DataError::NoLocalData { secid, timeframe }) => {
            assert_eq!(secid, "SBER");
            assert_eq!(timeframe, Timeframe::Day);
        }
        other => panic!("expected NoLocalData, got {other:?}"),
    }
    assert!(calls.lock().unwrap().is_empty());
}

#[test]
fn update_across_year_boundary() {
    let tmp = tempfile::tempdir().unwrap();
    let (provider, _calls) = MockProvider::new(&[("SBER", date(2007, 7, 19))]);
    let (m, clock) = manager(tmp.path(), provider, at(2020, 12, 20, 12));

    let path_2020 = m
        .download_year("SBER", Timeframe::Day, 2020)
        .unwrap()
        .unwrap();
    assert_eq!(
        m.get_last_datetime("SBER", Timeframe::Day).unwrap(),
        Some(at(2020, 12, 18, 0))
    );
    let before = fs::read(&path_2020).unwrap();

    *clock.lock().unwrap() = at(2021, 1, 15, 12);
    let summary = m.update("SBER", Timeframe::Day).unwrap();

    // Dec 21..31 weekdays go into 2020, Jan 1..14 weekdays into a new 2021 file.
    assert_eq!(summary.received, 19);
    assert_eq!(summary.appended, 9);
    assert_eq!(
        summary.created,
        vec![tmp.path().join("download/SBER/D/SBER-D-2021.csv")]
    );
    assert_eq!(summary.last, at(2021, 1, 14, 0));

    let after = fs::read(&path_2020).unwrap();
    assert_eq!(&after[..before.len()], &before[..]);

    let y2020 = m.store().read_series(&path_2020).unwrap();
    assert_eq!(y2020.last().unwrap().begin, at(2020, 12, 31, 0));
    let y2021 = m.store().read_series(&summary.created[0]).unwrap();
    assert_eq!(y2021.len(), 10);
    assert_eq!(y2021[0].begin, at(2021, 1, 1, 0));

    let all = m.store().load_series("SBER", Timeframe::Day).unwrap();
    assert!(all.windows(2).all(|w| w[0].begin < w[1].begin));
}

#[test]
fn update_matches_full_download() {
    let tmp_a = tempfile::tempdir().unwrap();
    let tmp_b = tempfile::tempdir().unwrap();
    let listings = [("LKOH", date(2000, 1, 1))];

    let (provider, _) = MockProvider::new(&listings);
    let (incremental, clock) = manager(tmp_a.path(), provider, at(2020, 11, 3, 9));
    incremental
        .download_year("LKOH", Timeframe::Hour1, 2020)
        .unwrap();
    *clock.lock().unwrap() = at(2021, 2, 1, 9);
    incremental.update("LKOH", Timeframe::Hour1).unwrap();

    let (provider, _) = MockProvider::new(&listings);
    let (full, _) = manager(tmp_b.path(), provider, at(2021, 2, 1, 9));
    full.download_range("LKOH", Timeframe::Hour1, Some(2020), 2021)
        .unwrap();

    for year in [2020, 2021] {
        let a = incremental.store().path_for("LKOH", Timeframe::Hour1, year);
        let b = full.store().path_for("LKOH", Timeframe::Hour1, year);
        assert_eq!(fs::read(a).unwrap(), fs::read(b).unwrap(), "year {year}");
    }
}

#[test]
fn update_when_current_is_a_no_op() {
    let tmp = tempfile::tempdir().unwrap();
    let (provider, _calls) = MockProvider::new(&[("SBER", date(2007, 7, 19))]);
    let (m, _clock) = manager(tmp.path(), provider, at(2021, 1, 15, 12));

    m.download_year("SBER", Timeframe::Day, 2021).unwrap();
    let path = m.store().path_for("SBER", Timeframe::Day, 2021);
    let before = fs::read(&path).unwrap();

    let summary = m.update("SBER", Timeframe::Day).unwrap();
    assert_eq!(summary.received, 0);
    assert!(summary.created.is_empty());
    assert_eq!(summary.last, at(2021, 1, 14, 0));
    assert_eq!(fs::read(&path).unwrap(), before);
}

#[test]
fn monthly_update_refetches_the_month_open_at_download() {
    let tmp = tempfile::tempdir().unwrap();
    let (provider, calls) = MockProvider::new(&[("SBER", date(2007, 7, 19))]);
    let (m, clock) = manager(tmp.path(), provider, at(2020, 10, 20, 12));

    // October is still running, so its candle is left out.
    m.download_year("SBER", Timeframe::Month, 2020).unwrap();
    assert_eq!(
        m.get_last_datetime("SBER", Timeframe::Month).unwrap(),
        Some(at(2020, 9, 1, 0))
    );

    calls.lock().unwrap().clear();
    *clock.lock().unwrap() = at(2021, 1, 15, 12);
    let summary = m.update("SBER", Timeframe::Month).unwrap();

    assert_eq!(
        calls.lock().unwrap()[0],
        Call::FetchDay("SBER".into(), Timeframe::Month, date(2020, 10, 1))
    );
    // Nov 1 is a Sunday. Oct 1 and Dec 1 are appended, January is still open.
    assert_eq!(summary.received, 2);
    assert_eq!(summary.appended, 2);
    assert!(summary.created.is_empty());
    assert_eq!(summary.last, at(2020, 12, 1, 0));
}

#[test]
fn open_week_is_stored_only_once_finished() {
    let tmp = tempfile::tempdir().unwrap();
    let (provider, _calls) = MockProvider::new(&[("SBER", date(2007, 7, 19))]);
    let (m, clock) = manager(tmp.path(), provider, at(2021, 1, 15, 12));

    let path = m
        .download_year("SBER", Timeframe::Week, 2021)
        .unwrap()
        .unwrap();
    let stored = m.store().read_series(&path).unwrap();
    let begins: Vec<_> = stored.iter().map(|c| c.begin).collect();
    assert_eq!(begins, vec![at(2021, 1, 4, 0)]);

    *clock.lock().unwrap() = at(2021, 1, 30, 12);
    let summary = m.update("SBER", Timeframe::Week).unwrap();
    assert_eq!(summary.appended, 2);

    // The week of Jan 25 ends after Jan 30 and waits for a later update.
    let begins: Vec<_> = m
        .store()
        .read_series(&path)
        .unwrap()
        .iter()
        .map(|c| c.begin)
        .collect();
    assert_eq!(
        begins,
        vec![at(2021, 1, 4, 0), at(2021, 1, 11, 0), at(2021, 1, 18, 0)]
    );
    let upstream = common::candles_on(date(2021, 1, 11), Timeframe::Week);
    assert_eq!(m.store().read_series(&path).unwrap()[1], upstream[0]);
}

#[test]
fn delete_all_then_update_fails() {
    let tmp = tempfile::tempdir().unwrap();
    let (provider, _calls) = MockProvider::new(&[("SBER", date(2007, 7, 19))]);
    let (m, _clock) = manager(tmp.path(), provider, at(2021, 1, 15, 12));

    m.download_year("SBER", Timeframe::Day, 2021).unwrap();
    m.download_year("SBER", Timeframe::Hour1, 2021).unwrap();
    assert_eq!(m.delete_all_local_data().unwrap(), 1);

    assert_eq!(m.get_last_datetime("SBER", Timeframe::Day).unwrap(), None);
    assert!(matches!(
        m.update("SBER", Timeframe::Day),
        Err(DataError::NoLocalData { .. })
    ));
}

#[test]
fn lists_bootstrap_all_from_provider() {
    let tmp = tempfile::tempdir().unwrap();
    let (provider, calls) =
        MockProvider::new(&[("SBER", date(2007, 7, 19)), ("AFLT", date(2000, 1, 1))]);
    let (m, _clock) = manager(tmp.path(), provider, at(2021, 1, 15, 12));

    assert!(m.list_names().unwrap().is_empty());
    assert!(m.ensure_all_list().unwrap());
    assert!(!m.ensure_all_list().unwrap());

    let all = m.load_shares_list("all").unwrap();
    let secids: Vec<&str> = all.iter().map(|i| i.secid.as_str()).collect();
    assert_eq!(secids, vec!["AFLT", "SBER"]);

    m.save_shares_list("mine", &all[1..]).unwrap();
    assert_eq!(m.list_names().unwrap(), vec!["all", "mine"]);
    assert_eq!(
        calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| **c == Call::ListAll)
            .count(),
        1
    );
}

#[test]
fn batch_isolates_failures_and_resolves_begin_per_instrument() {
    let tmp = tempfile::tempdir().unwrap();
    let (provider, _calls) =
        MockProvider::new(&[("SBER", date(2019, 3, 1)), ("NEWCO", date(2020, 10, 5))]);
    let (m, _clock) = manager(tmp.path(), provider, at(2021, 1, 15, 12));
    let secids: Vec<String> = ["SBER", "NEWCO", "XXXX"].map(String::from).to_vec();

    let summary = batch::download_batch(&m, &secids, &[Timeframe::Day], None, 2021, &LogProgress);
    assert!(summary.all_succeeded());
    assert_eq!(summary.total, 3);
    assert_eq!(
        m.store().years("SBER", Timeframe::Day).unwrap(),
        vec![2019, 2020, 2021]
    );
    assert_eq!(
        m.store().years("NEWCO", Timeframe::Day).unwrap(),
        vec![2020, 2021]
    );

    let summary = batch::update_batch(
        &m,
        &secids,
        &[Timeframe::Day, Timeframe::Hour1],
        &LogProgress,
    );
    assert_eq!(summary.total, 6);
    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.failed, 4);
    assert!(summary
        .errors
        .iter()
        .all(|(_, _, e)| matches!(e, DataError::NoLocalData { .. })));

    let last = batch::last_dates(&m, &secids, Timeframe::Day);
    assert_eq!(last[0].datetime, Some(at(2021, 1, 14, 0)));
    assert_eq!(last[2].datetime, None);

    let first = batch::first_dates(&m, &secids, Timeframe::Day);
    assert_eq!(first[1].datetime, Some(at(2020, 10, 5, 0)));
    assert_eq!(first[2].datetime, None);
}

#[test]
fn pair_outcome_describes_result() {
    assert_eq!(PairOutcome::Downloaded(Vec::new()).to_string(), "no data");
}
