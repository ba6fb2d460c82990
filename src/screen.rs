use std::sync::Arc;

use chrono::format::{Item, StrftimeItems};
use tracing::{debug, info};

use crate::binding::{action, ActionTrigger, WriteThrough};
use crate::config::ScreenSettings;
use crate::construct::{Record, RecordId};
use crate::datatype::{FieldKind, Value};
use crate::error::{LivelistError, Result};
use crate::live::{LiveQuery, ObjectEvent, SortOrder, Subscription};
use crate::schema::{Field, FieldDefault, Schema};
use crate::store::Store;
use crate::sync::Synchronizer;
use crate::view::TableModel;

pub const LAP: &str = "Lap";
pub const TICK_COUNTER: &str = "TickCounter";

pub fn lap_schema() -> Schema {
    Schema::new(LAP).field(
        Field::new("time", FieldKind::Time)
            .with_default(FieldDefault::Now)
            .indexed(),
    )
}

pub fn tick_counter_schema() -> Schema {
    Schema::new(TICK_COUNTER)
        .field(Field::new("id", FieldKind::Text).with_default(FieldDefault::Uuid))
        .field(
            Field::new("ticks", FieldKind::Integer)
                .with_default(FieldDefault::Constant(Value::Integer(0))),
        )
        .primary_key("id")
}

fn check_time_format(format: &str) -> Result<()> {
    if StrftimeItems::new(format).any(|item| matches!(item, Item::Error)) {
        return Err(LivelistError::Config(format!("'{}' is not a valid time format", format)));
    }
    Ok(())
}

fn lap_text(lap: &Record, format: &str) -> String {
    match lap.get("time").and_then(Value::as_time) {
        Some(time) => time.format(format).to_string(),
        None => String::new(),
    }
}

pub struct LapScreen {
    title: String,
    footer: String,
    laps: Synchronizer<TableModel<String>>,
    ticker: RecordId,
    ticker_events: Subscription<ObjectEvent>,
    add_two_laps: WriteThrough<()>,
    tick: WriteThrough<()>,
    delete_lap: WriteThrough<RecordId>,
    add_two_laps_button: ActionTrigger<()>,
    tick_button: ActionTrigger<()>,
    row_selection: ActionTrigger<RecordId>,
}

impl LapScreen {
    /// Open the collections, create this screen's tick counter and wire up
    /// every binding. The returned screen already shows the initial state.
    pub fn load(store: &Arc<Store>, settings: &ScreenSettings) -> Result<LapScreen> {
        check_time_format(&settings.time_format)?;
        store.open_collection(lap_schema())?;
        store.open_collection(tick_counter_schema())?;

        let format = settings.time_format.clone();
        let laps = Synchronizer::new(
            store,
            LiveQuery::all(LAP).sorted_by("time", SortOrder::Descending),
            TableModel::new(),
            move |lap| lap_text(lap, &format),
        )?;

        let ticker = store.write(|tx| tx.create(TICK_COUNTER, &[]))?.id();
        let ticker_events = store.observe(TICK_COUNTER, ticker)?;

        let (add_two_laps_button, source) = action::<()>();
        let add_two_laps = WriteThrough::new("add two laps", store, source, |tx, ()| {
            tx.create(LAP, &[])?;
            tx.create(LAP, &[])?;
            Ok(())
        });

        let (tick_button, source) = action::<()>();
        let tick = WriteThrough::new("tick", store, source, move |tx, ()| {
            let counter = tx.get(TICK_COUNTER, ticker)?.ok_or(LivelistError::NotFound {
                collection: TICK_COUNTER.to_owned(),
                id: ticker,
            })?;
            let ticks = counter.get("ticks").and_then(Value::as_integer).unwrap_or(0);
            tx.set(TICK_COUNTER, ticker, "ticks", Value::Integer(ticks + 1))?;
            Ok(())
        });

        let (row_selection, source) = action::<RecordId>();
        // a row can be selected again before the list catches up
        let delete_lap = WriteThrough::new("delete lap", store, source, |tx, lap| {
            if tx.get(LAP, lap)?.is_some() {
                tx.delete(LAP, lap)?;
            }
            Ok(())
        });

        let mut screen = LapScreen {
            title: String::new(),
            footer: String::new(),
            laps,
            ticker,
            ticker_events,
            add_two_laps,
            tick,
            delete_lap,
            add_two_laps_button,
            tick_button,
            row_selection,
        };
        screen.run_loop()?;
        info!(ticker, laps = screen.rows().len(), "lap screen loaded");
        Ok(screen)
    }

    pub fn tap_add_two_laps(&self) {
        self.add_two_laps_button.tap();
    }

    pub fn tap_tick(&self) {
        self.tick_button.tap();
    }

    /// Select the row at `index` as currently displayed.
    pub fn select_row(&self, index: usize) -> Result<()> {
        let lap = self
            .laps
            .snapshot()
            .get(index)
            .ok_or_else(|| LivelistError::Invariant(format!("there is no row {}", index)))?;
        self.row_selection.fire(lap.id());
        Ok(())
    }

    /// One turn of the event loop: run the pending actions' transactions,
    /// then bring the list, title and footer up to date.
    pub fn run_loop(&mut self) -> Result<()> {
        self.add_two_laps.pump()?;
        self.tick.pump()?;
        self.delete_lap.pump()?;
        if self.laps.pump()? > 0 {
            self.title = format!("laps: {}", self.laps.snapshot().len());
        }
        for event in self.ticker_events.drain() {
            match event {
                ObjectEvent::Changed(counter) => {
                    let ticks = counter.get("ticks").and_then(Value::as_integer).unwrap_or(0);
                    self.footer = format!("{} ticks", ticks);
                }
                ObjectEvent::Deleted(_) => self.footer.clear(),
            }
        }
        debug!(title = %self.title, footer = %self.footer, "screen refreshed");
        Ok(())
    }

    /// Dispose every subscription the screen holds.
    pub fn teardown(&mut self) {
        self.laps.dispose();
        self.ticker_events.dispose();
    }

    pub fn title(&self) -> &str {
        &self.title
    }
    pub fn footer(&self) -> &str {
        &self.footer
    }
    pub fn rows(&self) -> &[String] {
        self.laps.surface().rows()
    }
    pub fn laps(&self) -> &Synchronizer<TableModel<String>> {
        &self.laps
    }
    pub fn ticker(&self) -> RecordId {
        self.ticker
    }
}
