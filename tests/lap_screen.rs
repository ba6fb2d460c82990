use livelist::config::ScreenSettings;
use livelist::datatype::Value;
use livelist::live::LiveQuery;
use livelist::persist::PersistenceMode;
use livelist::screen::{LapScreen, LAP, TICK_COUNTER};
use livelist::store::Store;
use livelist::view::ListSurface;
use livelist::LivelistError;

fn screen() -> (std::sync::Arc<Store>, LapScreen) {
    let store = Store::open(PersistenceMode::InMemory).unwrap();
    let screen = LapScreen::load(&store, &ScreenSettings::default()).unwrap();
    (store, screen)
}

#[test]
fn loads_with_an_empty_list_and_a_fresh_counter() {
    let (store, screen) = screen();
    assert_eq!(screen.title(), "laps: 0");
    assert_eq!(screen.footer(), "0 ticks");
    assert!(screen.rows().is_empty());
    assert_eq!(screen.laps().surface().full_reloads(), 1);
    assert_eq!(store.count(TICK_COUNTER).unwrap(), 1);
    assert_eq!(store.subscriptions().unwrap(), 2);
}

#[test]
fn adding_two_laps_shows_them_newest_first() {
    let (store, mut screen) = screen();
    screen.tap_add_two_laps();
    screen.run_loop().unwrap();
    assert_eq!(screen.title(), "laps: 2");
    assert_eq!(screen.rows().len(), 2);
    assert_eq!(screen.laps().surface().batches(), 1, "one transaction, one batch");
    let times: Vec<_> = screen
        .laps()
        .snapshot()
        .iter()
        .filter_map(|lap| lap.get("time").and_then(Value::as_time))
        .collect();
    assert!(times[0] >= times[1]);
    assert_eq!(store.count(LAP).unwrap(), 2);

    screen.tap_add_two_laps();
    screen.tap_add_two_laps();
    screen.run_loop().unwrap();
    assert_eq!(screen.title(), "laps: 6");
    assert_eq!(screen.laps().surface().row_count(), store.count(LAP).unwrap());
}

#[test]
fn ticks_update_the_footer_but_not_the_list() {
    let (store, mut screen) = screen();
    for _ in 0..3 {
        screen.tap_tick();
    }
    screen.run_loop().unwrap();
    assert_eq!(screen.footer(), "3 ticks");
    assert_eq!(screen.laps().surface().batches(), 0);
    let counter = store.get(TICK_COUNTER, screen.ticker()).unwrap().unwrap();
    assert_eq!(counter.get("ticks"), Some(&Value::Integer(3)));
}

#[test]
fn selecting_a_row_deletes_that_lap() {
    let (store, mut screen) = screen();
    screen.tap_add_two_laps();
    screen.run_loop().unwrap();
    let shown = screen.laps().snapshot().ids();
    screen.select_row(0).unwrap();
    screen.run_loop().unwrap();
    assert_eq!(screen.title(), "laps: 1");
    assert_eq!(screen.laps().snapshot().ids(), shown[1..].to_vec());
    assert!(store.get(LAP, shown[0]).unwrap().is_none());
    assert!(matches!(screen.select_row(5), Err(LivelistError::Invariant(_))));
}

#[test]
fn laps_written_elsewhere_appear_on_the_next_turn() {
    let (store, mut screen) = screen();
    store.write(|tx| tx.create(LAP, &[])).unwrap();
    assert_eq!(screen.title(), "laps: 0");
    screen.run_loop().unwrap();
    assert_eq!(screen.title(), "laps: 1");
    assert_eq!(screen.laps().snapshot().ids(), store.objects(&LiveQuery::all(LAP)).unwrap().ids());
}

#[test]
fn each_screen_gets_its_own_counter() {
    let (store, mut first) = screen();
    let mut second = LapScreen::load(&store, &ScreenSettings::default()).unwrap();
    assert_ne!(first.ticker(), second.ticker());
    first.tap_tick();
    first.run_loop().unwrap();
    second.run_loop().unwrap();
    assert_eq!(first.footer(), "1 ticks");
    assert_eq!(second.footer(), "0 ticks");
    // laps are shared
    second.tap_add_two_laps();
    second.run_loop().unwrap();
    first.run_loop().unwrap();
    assert_eq!(first.title(), "laps: 2");
}

#[test]
fn teardown_releases_every_subscription() {
    let (store, mut screen) = screen();
    screen.teardown();
    assert_eq!(store.subscriptions().unwrap(), 0);
    screen.tap_add_two_laps();
    screen.run_loop().unwrap();
    // the write still happens, the list just no longer follows it
    assert_eq!(store.count(LAP).unwrap(), 2);
    assert_eq!(screen.title(), "laps: 0");
}

#[test]
fn invalid_time_format_is_refused() {
    let store = Store::open(PersistenceMode::InMemory).unwrap();
    let settings = ScreenSettings { time_format: "%H:%M:%".to_owned() };
    assert!(matches!(LapScreen::load(&store, &settings), Err(LivelistError::Config(_))));
}

#[test]
fn selecting_the_same_row_twice_deletes_one_lap() {
    let (store, mut screen) = screen();
    screen.tap_add_two_laps();
    screen.run_loop().unwrap();
    let shown = screen.laps().snapshot().ids();
    screen.select_row(0).unwrap();
    screen.select_row(0).unwrap();
    screen.tap_tick();
    screen.run_loop().unwrap();
    assert_eq!(store.count(LAP).unwrap(), 1);
    assert_eq!(screen.title(), "laps: 1");
    assert_eq!(screen.footer(), "1 ticks");
    assert_eq!(screen.laps().snapshot().ids(), shown[1..].to_vec());
}
