//! Measurement setup: logging blocks, the exporter, bus statistics and the
//! offline source list.
//!
//! The configuration exposes two setups, `OnlineSetup` and `OfflineSetup`,
//! with the same object model.

use serde::Serialize;

use crate::collection::Collection;
use crate::errors::Result;
use crate::objects::application::BusType;
use crate::proxy::{Handle, Proxy};
use crate::value::Value;

proxy! {
    pub struct MeasurementSetup;
}

impl MeasurementSetup {
    getters! {
        animation_factor: i32 => "AnimationFactor";
        parallelization_level: i32 => "ParallelizationLevel";
        working_mode: i32 => "WorkingMode";
    }

    setters! {
        set_animation_factor: i32 => "AnimationFactor";
        set_parallelization_level: i32 => "ParallelizationLevel";
        set_working_mode: i32 => "WorkingMode";
    }

    children! {
        bus_statistics: BusStatistics => "BusStatistics";
        source: Source => "Source";
    }

    pub fn logging_collection(&self) -> Result<Collection<LoggingBlock>> {
        self.handle.child("LoggingCollection")
    }
}

impl Collection<LoggingBlock> {
    /// Append a logging block writing to `full_name` (`C:/logs/run.blf`,
    /// field functions such as `{IncMeasurement}` allowed).
    pub fn add_logging_block(&self, full_name: &str) -> Result<LoggingBlock> {
        self.add(&[Value::from(full_name)])
    }
}

// ---------------------------------------------------------------------------
// Logging blocks
// ---------------------------------------------------------------------------

proxy! {
    /// Logging block of a measurement setup.
    pub struct LoggingBlock;
}

impl LoggingBlock {
    getters! {
        /// Log file path.
        full_name: String => "FullName";
    }

    setters! {
        set_full_name: &str => "FullName";
    }

    children! {
        exporter: Exporter => "Exporter";
        trigger: Trigger => "Trigger";
    }
}

proxy! {
    /// Trigger block in front of a logging block.
    pub struct Trigger;
}

impl Trigger {
    getters! {
        active: bool => "Active";
    }

    setters! {
        set_active: bool => "Active";
    }

    pub fn start(&self) -> Result<()> {
        self.handle.invoke("Start", &[]).map(drop)
    }

    pub fn stop(&self) -> Result<()> {
        self.handle.invoke("Stop", &[]).map(drop)
    }
}

proxy! {
    /// Export/conversion of a logging block's files.
    pub struct Exporter;
}

impl Exporter {
    children! {
        filter: ExporterFilter => "Filter";
    }

    /// Signals, system variables and statistics found by [`load`](Exporter::load).
    pub fn symbols(&self) -> Result<Collection<ExporterSymbol>> {
        self.handle.child("Symbols")
    }

    /// Messages found by [`load`](Exporter::load).
    pub fn messages(&self) -> Result<Collection<ExporterMessage>> {
        self.handle.child("Messages")
    }

    /// Read all source files and determine their symbols and messages.
    pub fn load(&self) -> Result<()> {
        self.handle.invoke("Load", &[]).map(drop)
    }

    /// Run the export.
    pub fn save(&self, no_prompt_user: bool) -> Result<()> {
        self.handle.invoke("Save", &[Value::from(no_prompt_user)]).map(drop)
    }
}

proxy! {
    /// Pass filter applied by an exporter.
    pub struct ExporterFilter;
}

impl ExporterFilter {
    getters! {
        count: i32 => "Count";
        enabled: bool => "Enabled";
    }

    setters! {
        set_enabled: bool => "Enabled";
    }

    /// Pass the message or symbol `full_name`.
    pub fn add(&self, full_name: &str) -> Result<()> {
        self.handle.invoke("Add", &[Value::from(full_name)]).map(drop)
    }

    pub fn clear(&self) -> Result<()> {
        self.handle.invoke("Clear", &[]).map(drop)
    }
}

proxy! {
    pub struct ExporterSymbol;
}

impl ExporterSymbol {
    getters! {
        full_name: String => "FullName";
    }
}

proxy! {
    pub struct ExporterMessage;
}

impl ExporterMessage {
    getters! {
        full_name: String => "FullName";
    }
}

// ---------------------------------------------------------------------------
// Bus statistics
// ---------------------------------------------------------------------------

proxy! {
    pub struct BusStatistics;
}

impl BusStatistics {
    /// Statistics of one bus channel.  `BusStatistic` is a parameterized
    /// property on the server.
    pub fn bus_statistic(&self, bus: BusType, channel: i32) -> Result<BusStatistic> {
        self.handle
            .get_at::<Handle>("BusStatistic", &[Value::from(bus.code()), Value::from(channel)])
            .map(BusStatistic::from_handle)
    }
}

proxy! {
    /// Counters of one bus channel.  Rates are per second, `*_total`
    /// counts since measurement start.
    pub struct BusStatistic;
}

impl BusStatistic {
    getters! {
        bus_load: f64 => "BusLoad";
        chip_state: i64 => "ChipState";
        error: f64 => "Error";
        error_total: i64 => "ErrorTotal";
        extended: f64 => "Extended";
        extended_total: i64 => "ExtendedTotal";
        extended_remote: f64 => "ExtendedRemote";
        extended_remote_total: i64 => "ExtendedRemoteTotal";
        overload: f64 => "Overload";
        overload_total: i64 => "OverloadTotal";
        peak_load: f64 => "PeakLoad";
        rx_error_count: i64 => "RxErrorCount";
        standard: f64 => "Standard";
        standard_total: i64 => "StandardTotal";
        standard_remote: f64 => "StandardRemote";
        standard_remote_total: i64 => "StandardRemoteTotal";
        tx_error_count: i64 => "TxErrorCount";
    }

    /// Read every counter into a serializable record.
    pub fn can_info(&self) -> Result<CanBusStatistics> {
        Ok(CanBusStatistics {
            bus_load: self.bus_load()?,
            chip_state: self.chip_state()?,
            error: self.error()?,
            error_total: self.error_total()?,
            extended: self.extended()?,
            extended_total: self.extended_total()?,
            extended_remote: self.extended_remote()?,
            extended_remote_total: self.extended_remote_total()?,
            overload: self.overload()?,
            overload_total: self.overload_total()?,
            peak_load: self.peak_load()?,
            rx_error_count: self.rx_error_count()?,
            standard: self.standard()?,
            standard_total: self.standard_total()?,
            standard_remote: self.standard_remote()?,
            standard_remote_total: self.standard_remote_total()?,
            tx_error_count: self.tx_error_count()?,
        })
    }
}

/// Snapshot of one CAN channel's statistics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CanBusStatistics {
    pub bus_load: f64,
    pub chip_state: i64,
    pub error: f64,
    pub error_total: i64,
    pub extended: f64,
    pub extended_total: i64,
    pub extended_remote: f64,
    pub extended_remote_total: i64,
    pub overload: f64,
    pub overload_total: i64,
    pub peak_load: f64,
    pub rx_error_count: i64,
    pub standard: f64,
    pub standard_total: i64,
    pub standard_remote: f64,
    pub standard_remote_total: i64,
    pub tx_error_count: i64,
}

// ---------------------------------------------------------------------------
// Offline sources
// ---------------------------------------------------------------------------

proxy! {
    /// Data source of a measurement setup.
    pub struct Source;
}

impl Source {
    children! {
        sources: SourceFiles => "Sources";
    }
}

proxy! {
    /// Log files replayed in offline mode.  Items are plain paths, not
    /// objects, so this is not a [`Collection`].
    pub struct SourceFiles;
}

impl SourceFiles {
    getters! {
        count: usize => "Count";
    }

    pub fn files(&self) -> Result<Vec<String>> {
        (1..=self.count()?)
            .map(|i| self.handle.call::<String>("Item", &[Value::from(i)]))
            .collect()
    }

    pub fn add(&self, path: &str) -> Result<()> {
        self.handle.invoke("Add", &[Value::from(path)]).map(drop)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockCollection, MockObject};
    use crate::value::FromValue;

    fn statistic() -> MockObject {
        let stat = MockObject::new("BusStatistic");
        for name in [
            "ChipState",
            "ErrorTotal",
            "ExtendedTotal",
            "ExtendedRemoteTotal",
            "OverloadTotal",
            "RxErrorCount",
            "StandardRemoteTotal",
            "TxErrorCount",
        ] {
            stat.set_prop(name, 0);
        }
        for name in ["Error", "Extended", "ExtendedRemote", "Overload", "PeakLoad", "StandardRemote"] {
            stat.set_prop(name, 0.0);
        }
        stat.with_prop("BusLoad", 12.5)
            .with_prop("Standard", 40.0)
            .with_prop("StandardTotal", 812)
    }

    #[test]
    fn test_bus_statistic_reads_channel() {
        let stat = statistic();
        let stats = MockObject::new("BusStatistics");
        let s = stat.clone();
        stats.on_call("BusStatistic", move |args| {
            assert_eq!(args, &[Value::Int(1), Value::Int(2)]);
            Ok(Value::Object(s.handle()))
        });
        let setup = MockObject::new("OnlineSetup").with_prop("BusStatistics", stats.handle());

        let info = MeasurementSetup::from_handle(setup.handle())
            .bus_statistics()
            .unwrap()
            .bus_statistic(BusType::Can, 2)
            .unwrap()
            .can_info()
            .unwrap();
        assert_eq!(info.bus_load, 12.5);
        assert_eq!(info.standard_total, 812);
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["standard"], 40.0);
    }

    #[test]
    fn test_logging_block_exporter_flow() {
        let filter = MockObject::new("Filter").with_prop("Count", 0);
        let f = filter.clone();
        filter.on_call("Add", move |args| {
            let count = i64::from_value(f.prop("Count").unwrap_or_default())?;
            f.set_prop("Count", count + 1);
            f.set_prop("Last", args[0].clone());
            Ok(Value::Empty)
        });
        let symbols = MockCollection::new("Symbols")
            .with_item(MockObject::new("Symbol").with_prop("FullName", "CAN1::EngineData::EngSpeed"));
        let exporter = MockObject::new("Exporter")
            .with_prop("Filter", filter.handle())
            .with_prop("Symbols", symbols.handle());
        exporter.on_call("Load", |_| Ok(Value::Empty));
        exporter.on_call("Save", |_| Ok(Value::Empty));
        let blocks = MockCollection::new("LoggingCollection").with_item(
            MockObject::new("Logging")
                .with_prop("FullName", "C:/logs/run.blf")
                .with_prop("Exporter", exporter.handle()),
        );
        let setup = MockObject::new("OnlineSetup").with_prop("LoggingCollection", blocks.handle());

        let block = MeasurementSetup::from_handle(setup.handle())
            .logging_collection()
            .unwrap()
            .item(0)
            .unwrap();
        assert_eq!(block.full_name().unwrap(), "C:/logs/run.blf");

        let exp = block.exporter().unwrap();
        exp.load().unwrap();
        let sym = exp.symbols().unwrap().item(0).unwrap().full_name().unwrap();
        exp.filter().unwrap().add(&sym).unwrap();
        exp.save(true).unwrap();

        assert_eq!(filter.prop("Count"), Some(Value::Int(1)));
        assert_eq!(filter.prop("Last"), Some(Value::from("CAN1::EngineData::EngSpeed")));
        assert_eq!(
            exporter.calls().into_iter().map(|(n, a)| (n, a.len())).collect::<Vec<_>>(),
            vec![("Load".to_owned(), 0), ("Save".to_owned(), 1)]
        );
    }

    #[test]
    fn test_trigger_start_stop() {
        let trigger = MockObject::new("Trigger").with_prop("Active", false);
        trigger.on_call("Start", |_| Ok(Value::Empty));
        trigger.on_call("Stop", |_| Ok(Value::Empty));
        let t = Trigger::from_handle(trigger.handle());
        t.start().unwrap();
        t.stop().unwrap();
        t.set_active(true).unwrap();
        assert!(t.active().unwrap());
        assert_eq!(trigger.call_count("Start"), 1);
        assert_eq!(trigger.call_count("Stop"), 1);
    }

    #[test]
    fn test_source_files_are_one_based_paths() {
        let files = MockObject::new("Sources").with_prop("Count", 2);
        files.on_call("Item", |args| match i64::from_value(args[0].clone())? {
            1 => Ok(Value::from("C:/logs/a.blf")),
            2 => Ok(Value::from("C:/logs/b.blf")),
            i => Err(crate::errors::CanoeError::NotFound(format!("Item({i})"))),
        });
        let s = SourceFiles::from_handle(files.handle());
        assert_eq!(s.files().unwrap(), vec!["C:/logs/a.blf", "C:/logs/b.blf"]);
    }
}
