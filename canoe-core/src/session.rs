//! Scripting-level session over one running application.
//!
//! [`Canoe`] composes the entity wrappers into the operations a test script
//! needs: open a configuration and wait for it, start/stop measurement and
//! wait for confirmation, read and write variables and signals, drive
//! diagnostics and call CAPL functions.
//!
//! Lifecycle notifications (`OnOpen`, `OnQuit`, `OnInit`, `OnStart`,
//! `OnStop`, `OnExit`) are collected by two [`EventLatch`]es advised on the
//! application and measurement objects.  User CAPL functions can only be
//! resolved while measurement initializes, so they are looked up inside the
//! `OnInit` callback and kept until `OnExit`.  A third latch, advised on
//! each loaded configuration, drops cached diagnostic devices on `OnClose`.
//!
//! Test modules run through [`TestModuleRun`]: the session keeps every
//! started run so another thread can stop it by name.
//!
//! Every operation enters the session's [`LogContext`] and logs its outcome.
//! Errors are returned, never swallowed, with one exception: diagnostic
//! device discovery after a configuration is loaded logs and continues.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Deserialize;
use tracing::{error, info, warn};

use crate::errors::{CanoeError, Result};
use crate::event::EventLatch;
use crate::logging::{LogConfig, LogContext};
use crate::collection::Collection;
use crate::event::EventSink;
use crate::objects::application::{self, Application, BusType};
use crate::objects::bus::{Database, DatabaseInfo, NodeInfo, Signal, SignalState};
use crate::objects::capl::CaplFunction;
use crate::objects::configuration::{self, Configuration};
use crate::objects::diagnostic::{parse_hex_stream, DiagResponseInfo, Diagnostic};
use crate::objects::measurement::{self, Measurement};
use crate::objects::measurement_setup::{CanBusStatistics, Exporter, LoggingBlock};
use crate::objects::networks::fetch_diag_devices;
use crate::objects::simulation::ReplayBlock;
use crate::objects::system::Variable;
use crate::objects::test_setup::{StopReason, TestEnvironment, TestModule, TestModuleRun, TestVerdict};
use crate::objects::version::VersionInfo;
use crate::proxy::{Proxy, Subscription};
use crate::value::{FromValue, Value};

/// Poll interval while a diagnostic request is pending.
const DIAG_POLL_INTERVAL: Duration = Duration::from_millis(10);

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Session options.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SessionOptions {
    pub log: LogConfig,
    /// CAPL functions to resolve when measurement initializes.
    pub user_capl_functions: Vec<String>,
    pub open_timeout: Duration,
    pub measurement_timeout: Duration,
    pub variable_update_timeout: Duration,
    pub diag_response_timeout: Duration,
    /// Wait for a test module to acknowledge a start or stop request.
    pub test_module_event_timeout: Duration,
    /// Upper bound on one test module run.
    pub test_module_timeout: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            log: LogConfig::default(),
            user_capl_functions: Vec::new(),
            open_timeout: Duration::from_secs(30),
            measurement_timeout: Duration::from_secs(30),
            variable_update_timeout: Duration::from_secs(1),
            diag_response_timeout: Duration::from_secs(300),
            test_module_event_timeout: Duration::from_secs(5),
            test_module_timeout: Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// Arguments of [`Canoe::open`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenOptions {
    pub visible: bool,
    pub auto_save: bool,
    pub prompt_user: bool,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            visible: true,
            auto_save: true,
            prompt_user: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

type CaplRegistry = Arc<Mutex<HashMap<String, CaplFunction>>>;
type DiagRegistry = Arc<Mutex<BTreeMap<String, Diagnostic>>>;

/// Executed test modules and their verdicts, in execution order.
pub type TestModuleVerdicts = Vec<(String, TestVerdict)>;

/// One scripting session.
pub struct Canoe {
    app: Application,
    options: SessionOptions,
    log: LogContext,
    app_events: Arc<EventLatch>,
    meas_events: Arc<EventLatch>,
    config_events: Arc<EventLatch>,
    capl_functions: CaplRegistry,
    diag_devices: DiagRegistry,
    running_tests: Mutex<HashMap<String, Arc<TestModuleRun>>>,
    config_subscription: Mutex<Option<Subscription>>,
    _subscriptions: Vec<Subscription>,
    #[cfg(windows)]
    _mta: Option<crate::com::MtaGuard>,
}

impl Canoe {
    /// Session over an existing application handle, with logging built from
    /// `options.log`.
    pub fn new(app: Application, options: SessionOptions) -> Result<Self> {
        let log = LogContext::init(&options.log)?;
        Self::with_log(app, options, log)
    }

    /// Session using a caller-supplied logging context.
    pub fn with_log(app: Application, options: SessionOptions, log: LogContext) -> Result<Self> {
        let _log = log.enter();

        let app_events = Arc::new(EventLatch::new());
        let meas_events = Arc::new(EventLatch::new());
        let config_events = Arc::new(EventLatch::new());
        let capl_functions: CaplRegistry = Arc::new(Mutex::new(HashMap::new()));
        let diag_devices: DiagRegistry = Arc::new(Mutex::new(BTreeMap::new()));

        register_capl_hooks(&app, &options, &log, &meas_events, &capl_functions);
        register_configuration_hooks(&log, &config_events, &diag_devices);

        let subscriptions = vec![
            app.handle().advise(app_events.clone())?,
            app.measurement()?.handle().advise(meas_events.clone())?,
        ];

        Ok(Self {
            app,
            options,
            log,
            app_events,
            meas_events,
            config_events,
            capl_functions,
            diag_devices,
            running_tests: Mutex::new(HashMap::new()),
            config_subscription: Mutex::new(None),
            _subscriptions: subscriptions,
            #[cfg(windows)]
            _mta: None,
        })
    }

    /// Start (or connect to) the application and open a session on it.
    #[cfg(windows)]
    pub fn launch(options: SessionOptions) -> Result<Self> {
        let mta = crate::com::MtaGuard::init()?;
        let app = Application::from_handle(crate::com::ComObject::create(crate::com::CANOE_PROGID)?);
        let mut session = Self::new(app, options)?;
        session._mta = Some(mta);
        Ok(session)
    }

    /// Attach to an already running application and pick up its loaded
    /// configuration.
    #[cfg(windows)]
    pub fn attach(options: SessionOptions) -> Result<Self> {
        let mta = crate::com::MtaGuard::init()?;
        let app = Application::from_handle(crate::com::ComObject::active(crate::com::CANOE_PROGID)?);
        let mut session = Self::new(app, options)?;
        session._mta = Some(mta);
        session.attach_setup();
        Ok(session)
    }

    pub fn application(&self) -> &Application {
        &self.app
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    pub fn log(&self) -> &LogContext {
        &self.log
    }

    fn measurement(&self) -> Result<Measurement> {
        self.app.measurement()
    }

    fn configuration(&self) -> Result<Configuration> {
        self.app.configuration()
    }

    // -- configuration ------------------------------------------------------

    /// Open `path` and wait for `OnOpen`.
    pub fn open(&self, path: &str, opts: &OpenOptions) -> Result<()> {
        let _log = self.log.enter();
        self.app.set_visible(opts.visible)?;
        self.app_events.reset(application::events::ON_OPEN);
        info!("opening configuration {path}");
        self.app.open(path, opts.auto_save, opts.prompt_user)?;
        self.wait_app_event(application::events::ON_OPEN, "open configuration")?;
        info!("configuration {path} opened");
        self.attach_setup();
        Ok(())
    }

    /// Create an empty configuration and wait for `OnOpen`.
    pub fn new_configuration(&self, auto_save: bool, prompt_user: bool) -> Result<()> {
        let _log = self.log.enter();
        self.app_events.reset(application::events::ON_OPEN);
        info!("opening new empty configuration");
        self.app.new_configuration(auto_save, prompt_user)?;
        self.wait_app_event(application::events::ON_OPEN, "new configuration")?;
        info!("new empty configuration opened");
        self.attach_setup();
        Ok(())
    }

    /// Full path reported by the last `OnOpen`.
    pub fn opened_configuration(&self) -> Option<String> {
        self.app_events
            .payload(application::events::ON_OPEN)
            .and_then(|p| p.into_iter().next())
            .and_then(|v| String::from_value(v).ok())
    }

    /// Refresh state derived from the loaded configuration.  Failures are
    /// logged; the session stays usable.
    pub fn attach_setup(&self) {
        let _log = self.log.enter();
        let config_events: Arc<dyn EventSink> = self.config_events.clone();
        match self.configuration().and_then(|cfg| cfg.handle().advise(config_events)) {
            Ok(subscription) => *self.config_subscription.lock() = Some(subscription),
            Err(e) => warn!("configuration notifications unavailable: {e}"),
        }
        if let Err(e) = self.fetch_diag_devices() {
            error!("error fetching diagnostic devices: {e}");
        }
    }

    /// Discard unsaved changes, quit the application and wait for `OnQuit`.
    pub fn quit(&self) -> Result<()> {
        let _log = self.log.enter();
        self.app.configuration()?.set_modified(false)?;
        self.app_events.reset(application::events::ON_QUIT);
        self.app.quit()?;
        self.wait_app_event(application::events::ON_QUIT, "quit application")?;
        info!("application quit");
        Ok(())
    }

    pub fn save_configuration(&self) -> Result<()> {
        let _log = self.log.enter();
        let cfg = self.app.configuration()?;
        if cfg.saved()? {
            warn!("configuration is already saved");
            return Ok(());
        }
        cfg.save()?;
        info!("configuration saved");
        Ok(())
    }

    pub fn save_configuration_as(&self, path: &str, major: i32, minor: i32, create_dir: bool) -> Result<()> {
        let _log = self.log.enter();
        self.app
            .configuration()?
            .save_as(path, major, minor, false, create_dir)?;
        info!("configuration saved as {path}");
        Ok(())
    }

    pub fn set_configuration_modified(&self, modified: bool) -> Result<()> {
        let _log = self.log.enter();
        self.configuration()?.set_modified(modified)?;
        info!("configuration modified flag set to {modified}");
        Ok(())
    }

    /// Add a log file to the offline source list.  Returns `false` when it
    /// is already listed.
    pub fn add_offline_source_log_file(&self, path: &str) -> Result<bool> {
        let _log = self.log.enter();
        if !Path::new(path).is_file() {
            error!("offline source file '{path}' does not exist");
            return Err(CanoeError::InvalidArgument(format!("no such file: {path}")));
        }
        let sources = self.configuration()?.offline_setup()?.source()?.sources()?;
        if sources.files()?.iter().any(|f| f == path) {
            warn!("offline source file '{path}' is already listed");
            return Ok(false);
        }
        sources.add(path)?;
        info!("offline source file '{path}' added");
        Ok(true)
    }

    fn databases(&self) -> Result<Collection<Database>> {
        self.configuration()?.general_setup()?.database_setup()?.databases()
    }

    fn ensure_measurement_stopped(&self, what: &str) -> Result<()> {
        if self.measurement_running()? {
            error!("cannot {what} while measurement is running");
            return Err(CanoeError::InvalidArgument(format!(
                "cannot {what} while measurement is running"
            )));
        }
        Ok(())
    }

    /// Assign the database `file` to `channel`, through `network` when
    /// given.  Returns `false` when the file is already assigned.
    pub fn add_database(&self, file: &str, network: Option<&str>, channel: i32) -> Result<bool> {
        let _log = self.log.enter();
        self.ensure_measurement_stopped("add a database")?;
        let databases = self.databases()?;
        for db in databases.iter()? {
            if db?.full_name()? == file {
                warn!("database '{file}' is already added");
                return Ok(false);
            }
        }
        let db = match network {
            Some(network) => databases.add_network(file, network)?,
            None => databases.add_database(file)?,
        };
        db.set_channel(channel)?;
        info!("database '{file}' added on channel {channel}");
        Ok(true)
    }

    /// Remove the database `file` assigned to `channel`.  Returns `false`
    /// when no such assignment exists.
    pub fn remove_database(&self, file: &str, channel: i32) -> Result<bool> {
        let _log = self.log.enter();
        self.ensure_measurement_stopped("remove a database")?;
        let databases = self.databases()?;
        let mut position = None;
        for (index, db) in databases.iter()?.enumerate() {
            let db = db?;
            if db.full_name()? == file && db.channel()? == channel {
                position = Some(index);
                break;
            }
        }
        match position {
            Some(index) => {
                databases.remove(index)?;
                info!("database '{file}' removed from channel {channel}");
                Ok(true)
            }
            None => {
                warn!("database '{file}' is not assigned to channel {channel}");
                Ok(false)
            }
        }
    }

    // -- bus information ----------------------------------------------------

    pub fn get_bus_databases_info(&self, bus: BusType) -> Result<BTreeMap<String, DatabaseInfo>> {
        let _log = self.log.enter();
        let mut out = BTreeMap::new();
        for db in self.app.bus(bus)?.databases()?.iter()? {
            let info = db?.info()?;
            out.insert(info.name.clone(), info);
        }
        info!("{bus} databases: {:?}", out.keys().collect::<Vec<_>>());
        Ok(out)
    }

    pub fn get_bus_nodes_info(&self, bus: BusType) -> Result<BTreeMap<String, NodeInfo>> {
        let _log = self.log.enter();
        let mut out = BTreeMap::new();
        for node in self.app.bus(bus)?.nodes()?.iter()? {
            let info = node?.info()?;
            out.insert(info.name.clone(), info);
        }
        info!("{bus} nodes: {:?}", out.keys().collect::<Vec<_>>());
        Ok(out)
    }

    pub fn get_can_bus_statistics(&self, channel: i32) -> Result<CanBusStatistics> {
        let _log = self.log.enter();
        let stats = self
            .configuration()?
            .online_setup()?
            .bus_statistics()?
            .bus_statistic(BusType::Can, channel)?
            .can_info()?;
        info!("CAN{channel} bus load {:.1}%, peak {:.1}%", stats.bus_load, stats.peak_load);
        Ok(stats)
    }

    // -- replay blocks ------------------------------------------------------

    fn replay_block(&self, name: &str) -> Result<ReplayBlock> {
        self.configuration()?
            .simulation_setup()?
            .replay_collection()?
            .find(name)
    }

    pub fn set_replay_block_file(&self, block_name: &str, recording_file: &str) -> Result<()> {
        let _log = self.log.enter();
        self.replay_block(block_name)?.set_path(recording_file)?;
        info!("replay block '{block_name}' file set to {recording_file}");
        Ok(())
    }

    pub fn control_replay_block(&self, block_name: &str, start: bool) -> Result<()> {
        let _log = self.log.enter();
        let block = self.replay_block(block_name)?;
        if start {
            block.start()?;
            info!("replay block '{block_name}' started");
        } else {
            block.stop()?;
            info!("replay block '{block_name}' stopped");
        }
        Ok(())
    }

    pub fn enable_disable_replay_block(&self, block_name: &str, enabled: bool) -> Result<()> {
        let _log = self.log.enter();
        self.replay_block(block_name)?.set_enabled(enabled)?;
        info!("replay block '{block_name}' enabled = {enabled}");
        Ok(())
    }

    // -- logging blocks -----------------------------------------------------

    fn logging_blocks(&self) -> Result<Collection<LoggingBlock>> {
        self.configuration()?.online_setup()?.logging_collection()
    }

    fn exporter(&self, index: usize) -> Result<Exporter> {
        self.logging_blocks()?.item(index)?.exporter()
    }

    /// Log file paths of the online setup's logging blocks, in order.
    pub fn get_logging_blocks(&self) -> Result<Vec<String>> {
        let _log = self.log.enter();
        let names = self
            .logging_blocks()?
            .iter()?
            .map(|block| block?.full_name())
            .collect::<Result<Vec<_>>>()?;
        info!("{} logging block(s)", names.len());
        Ok(names)
    }

    pub fn add_logging_block(&self, full_name: &str) -> Result<()> {
        let _log = self.log.enter();
        self.logging_blocks()?.add_logging_block(full_name)?;
        info!("logging block '{full_name}' added");
        Ok(())
    }

    /// `index` is 0-based, in the order of [`get_logging_blocks`](Self::get_logging_blocks).
    pub fn remove_logging_block(&self, index: usize) -> Result<()> {
        let _log = self.log.enter();
        self.logging_blocks()?.remove(index)?;
        info!("logging block {index} removed");
        Ok(())
    }

    /// Start or stop the logging block writing to `full_name`.  The path is
    /// compared case-insensitively.
    pub fn control_logging_block(&self, full_name: &str, start: bool) -> Result<()> {
        let _log = self.log.enter();
        let wanted = full_name.to_lowercase();
        for block in self.logging_blocks()?.iter()? {
            let block = block?;
            if block.full_name()?.to_lowercase() != wanted {
                continue;
            }
            let trigger = block.trigger()?;
            if start {
                trigger.start()?;
                info!("logging block '{full_name}' started");
            } else {
                trigger.stop()?;
                info!("logging block '{full_name}' stopped");
            }
            return Ok(());
        }
        Err(CanoeError::NotFound(format!("logging block '{full_name}'")))
    }

    pub fn load_logs_for_exporter(&self, index: usize) -> Result<()> {
        let _log = self.log.enter();
        self.exporter(index)?.load()?;
        info!("exporter of logging block {index} loaded its sources");
        Ok(())
    }

    /// Symbols found by the last [`load_logs_for_exporter`](Self::load_logs_for_exporter).
    pub fn get_symbols(&self, index: usize) -> Result<Vec<String>> {
        let _log = self.log.enter();
        let symbols = self
            .exporter(index)?
            .symbols()?
            .iter()?
            .map(|s| s?.full_name())
            .collect::<Result<Vec<_>>>()?;
        info!("{} symbol(s) in logging block {index}", symbols.len());
        Ok(symbols)
    }

    pub fn get_messages(&self, index: usize) -> Result<Vec<String>> {
        let _log = self.log.enter();
        let messages = self
            .exporter(index)?
            .messages()?
            .iter()?
            .map(|m| m?.full_name())
            .collect::<Result<Vec<_>>>()?;
        info!("{} message(s) in logging block {index}", messages.len());
        Ok(messages)
    }

    pub fn add_filters_to_exporter(&self, index: usize, full_names: &[String]) -> Result<()> {
        let _log = self.log.enter();
        let filter = self.exporter(index)?.filter()?;
        for name in full_names {
            filter.add(name)?;
        }
        info!("{} filter(s) added to exporter of logging block {index}", full_names.len());
        Ok(())
    }

    pub fn start_export(&self, index: usize) -> Result<()> {
        let _log = self.log.enter();
        self.exporter(index)?.save(true)?;
        info!("export of logging block {index} finished");
        Ok(())
    }

    // -- measurement --------------------------------------------------------

    /// Start measurement and wait for `OnStart`.  A running measurement is
    /// left alone.
    pub fn start_measurement(&self) -> Result<()> {
        let _log = self.log.enter();
        let meas = self.measurement()?;
        if meas.running()? {
            warn!("measurement is already running");
            return Ok(());
        }
        self.meas_events.reset(measurement::events::ON_INIT);
        self.meas_events.reset(measurement::events::ON_START);
        meas.start()?;
        self.wait_measurement_started()
    }

    /// Start offline replay in animation mode with `delay_ms` between steps.
    pub fn start_measurement_in_animation_mode(&self, delay_ms: i32) -> Result<()> {
        let _log = self.log.enter();
        let meas = self.measurement()?;
        if meas.running()? {
            warn!("measurement is already running");
            return Ok(());
        }
        meas.set_animation_delay(delay_ms)?;
        self.meas_events.reset(measurement::events::ON_INIT);
        self.meas_events.reset(measurement::events::ON_START);
        meas.animate()?;
        self.wait_measurement_started()
    }

    /// Stop measurement with `StopEx` and wait for `OnStop`.
    pub fn stop_measurement(&self) -> Result<()> {
        let _log = self.log.enter();
        let meas = self.measurement()?;
        if !meas.running()? {
            warn!("measurement is already stopped");
            return Ok(());
        }
        self.meas_events.reset(measurement::events::ON_STOP);
        self.meas_events.reset(measurement::events::ON_EXIT);
        meas.stop_ex()?;
        let timeout = self.options.measurement_timeout;
        if !self.meas_events.wait(measurement::events::ON_STOP, timeout) {
            error!("measurement did not stop within {timeout:?}");
            return Err(CanoeError::Timeout(format!("measurement stop after {timeout:?}")));
        }
        if !self.meas_events.wait(measurement::events::ON_EXIT, timeout) {
            warn!("measurement exit not reported within {timeout:?}");
        }
        info!("measurement stopped");
        Ok(())
    }

    pub fn reset_measurement(&self) -> Result<()> {
        self.stop_measurement()?;
        self.start_measurement()?;
        let _log = self.log.enter();
        info!("measurement reset");
        Ok(())
    }

    pub fn measurement_running(&self) -> Result<bool> {
        self.measurement()?.running()
    }

    /// Interrupt offline replay.  Does nothing when measurement is stopped.
    pub fn break_measurement_in_offline_mode(&self) -> Result<()> {
        let _log = self.log.enter();
        let meas = self.measurement()?;
        if !meas.running()? {
            warn!("measurement is not running, nothing to break");
            return Ok(());
        }
        meas.break_measurement()?;
        info!("offline measurement interrupted");
        Ok(())
    }

    pub fn reset_measurement_in_offline_mode(&self) -> Result<()> {
        let _log = self.log.enter();
        self.measurement()?.reset()?;
        info!("offline measurement reset");
        Ok(())
    }

    /// Process one event of the offline replay.
    pub fn step_measurement_event_in_single_step(&self) -> Result<()> {
        let _log = self.log.enter();
        self.measurement()?.step()?;
        info!("offline measurement stepped one event");
        Ok(())
    }

    pub fn get_measurement_index(&self) -> Result<i32> {
        let _log = self.log.enter();
        let index = self.measurement()?.measurement_index()?;
        info!("measurement index = {index}");
        Ok(index)
    }

    /// Index used for `{IncMeasurement}` in logging file names.
    pub fn set_measurement_index(&self, index: i32) -> Result<()> {
        let _log = self.log.enter();
        self.measurement()?.set_measurement_index(index)?;
        info!("measurement index set to {index}");
        Ok(())
    }

    fn wait_measurement_started(&self) -> Result<()> {
        let timeout = self.options.measurement_timeout;
        if !self.meas_events.wait(measurement::events::ON_INIT, timeout) {
            warn!("measurement initialization not reported within {timeout:?}");
        }
        if !self.meas_events.wait(measurement::events::ON_START, timeout) {
            error!("measurement did not start within {timeout:?}");
            return Err(CanoeError::Timeout(format!("measurement start after {timeout:?}")));
        }
        info!("measurement started");
        Ok(())
    }

    fn wait_app_event(&self, event: &str, what: &str) -> Result<()> {
        let timeout = self.options.open_timeout;
        if self.app_events.wait(event, timeout) {
            Ok(())
        } else {
            error!("{what}: no {event} within {timeout:?}");
            Err(CanoeError::Timeout(format!("{what} after {timeout:?}")))
        }
    }

    // -- version ------------------------------------------------------------

    pub fn version_info(&self) -> Result<VersionInfo> {
        let _log = self.log.enter();
        let info = self.app.version()?.info()?;
        info!(
            "version: {} (major {}, minor {}, build {}, patch {})",
            info.full_name, info.major, info.minor, info.build, info.patch
        );
        Ok(info)
    }

    // -- system variables ---------------------------------------------------

    pub fn define_system_variable(&self, path: &str, value: impl Into<Value>, read_only: bool) -> Result<Variable> {
        let _log = self.log.enter();
        let value = value.into();
        let var = self.app.system()?.add_variable(path, value.clone(), read_only)?;
        info!("system variable '{path}' defined with value {value}");
        Ok(var)
    }

    /// Returns `false` when no such variable exists.
    pub fn remove_system_variable(&self, path: &str) -> Result<bool> {
        let _log = self.log.enter();
        let removed = self.app.system()?.remove_variable(path)?;
        if removed {
            info!("system variable '{path}' removed");
        } else {
            info!("system variable '{path}' not found");
        }
        Ok(removed)
    }

    pub fn get_system_variable_value(&self, path: &str) -> Result<Value> {
        let _log = self.log.enter();
        let value = self.app.system()?.variable(path)?.value()?;
        info!("system variable '{path}' value: {value}");
        Ok(value)
    }

    /// Symbolic (value table) name of the variable's current value.
    pub fn get_system_variable_symbolic_value(&self, path: &str) -> Result<String> {
        let _log = self.log.enter();
        let var = self.app.system()?.variable(path)?;
        let symbol = var.get_symbolic_value_name(var.value()?)?;
        info!("system variable '{path}' symbolic value: {symbol}");
        Ok(symbol)
    }

    /// Write `value`, converted to the variable's current type, and wait for
    /// the change notification.  Returns whether it arrived in time.
    pub fn set_system_variable_value(&self, path: &str, value: impl Into<Value>) -> Result<bool> {
        let _log = self.log.enter();
        let var = self.app.system()?.variable(path)?;
        let converted = value.into().coerce_like(&var.value()?)?;
        self.write_and_confirm(path, &var, converted)
    }

    /// Overwrite `values.len()` elements of an array variable starting at
    /// `index`.
    pub fn set_system_variable_array_values(&self, path: &str, values: &[Value], index: usize) -> Result<bool> {
        let _log = self.log.enter();
        let var = self.app.system()?.variable(path)?;
        let current = var.value()?;
        let mut elements = Vec::<Value>::from_value(current.clone())?;
        let end = index
            .checked_add(values.len())
            .filter(|&end| end <= elements.len())
            .ok_or_else(|| {
                CanoeError::InvalidArgument(format!(
                    "'{path}' holds {} elements, cannot write {} at index {index}",
                    elements.len(),
                    values.len()
                ))
            })?;
        let template = elements.first().or(values.first()).cloned().unwrap_or_default();
        for (slot, v) in elements[index..end].iter_mut().zip(values) {
            *slot = v.coerce_like(&template)?;
        }
        let updated = Value::Array(elements).coerce_like(&current)?;
        self.write_and_confirm(path, &var, updated)
    }

    fn write_and_confirm(&self, path: &str, var: &Variable, value: Value) -> Result<bool> {
        let watch = var.subscribe()?;
        let confirmed = watch.set_and_wait(value.clone(), self.options.variable_update_timeout)?;
        if confirmed {
            info!("system variable '{path}' updated to {value}");
        } else {
            warn!(
                "system variable '{path}' written, no change reported within {:?}",
                self.options.variable_update_timeout
            );
        }
        Ok(confirmed)
    }

    // -- environment variables ----------------------------------------------

    pub fn get_environment_variable_value(&self, name: &str) -> Result<Value> {
        let _log = self.log.enter();
        let value = self.app.environment()?.get_variable(name)?.value()?;
        info!("environment variable '{name}' value = {value}");
        Ok(value)
    }

    pub fn set_environment_variable_value(&self, name: &str, value: impl Into<Value>) -> Result<()> {
        let _log = self.log.enter();
        let value = value.into();
        self.app.environment()?.get_variable(name)?.set_value(value.clone())?;
        info!("environment variable '{name}' set to {value}");
        Ok(())
    }

    // -- signals ------------------------------------------------------------

    fn signal(&self, bus: BusType, channel: i32, message: &str, signal: &str) -> Result<Signal> {
        self.app.bus(bus)?.get_signal(channel, message, signal)
    }

    fn j1939_signal(
        &self,
        bus: BusType,
        channel: i32,
        message: &str,
        signal: &str,
        source_addr: i32,
        dest_addr: i32,
    ) -> Result<Signal> {
        self.app
            .bus(bus)?
            .get_j1939_signal(channel, message, signal, source_addr, dest_addr)
    }

    fn read_signal(sig: &Signal, raw: bool) -> Result<Value> {
        let value = if raw { sig.raw_value()? } else { sig.value()? };
        info!("signal {} value = {value}", sig.full_name()?);
        Ok(value)
    }

    fn write_signal(sig: &Signal, value: Value, raw: bool) -> Result<()> {
        if raw {
            sig.set_raw_value(value.clone())?;
        } else {
            sig.set_value(value.clone())?;
        }
        info!("signal {} set to {value}", sig.full_name()?);
        Ok(())
    }

    fn signal_state(sig: &Signal) -> Result<SignalState> {
        let state = sig.state()?;
        info!("signal {} state = {state:?}", sig.full_name()?);
        Ok(state)
    }

    fn signal_online(sig: &Signal) -> Result<bool> {
        let online = sig.is_online()?;
        info!("signal {} online = {online}", sig.full_name()?);
        Ok(online)
    }

    pub fn get_signal_value(&self, bus: BusType, channel: i32, message: &str, signal: &str, raw: bool) -> Result<Value> {
        let _log = self.log.enter();
        Self::read_signal(&self.signal(bus, channel, message, signal)?, raw)
    }

    pub fn set_signal_value(
        &self,
        bus: BusType,
        channel: i32,
        message: &str,
        signal: &str,
        value: impl Into<Value>,
        raw: bool,
    ) -> Result<()> {
        let _log = self.log.enter();
        Self::write_signal(&self.signal(bus, channel, message, signal)?, value.into(), raw)
    }

    pub fn get_signal_full_name(&self, bus: BusType, channel: i32, message: &str, signal: &str) -> Result<String> {
        let _log = self.log.enter();
        self.signal(bus, channel, message, signal)?.full_name()
    }

    /// `true` while measurement runs and the signal has been received.
    pub fn check_signal_online(&self, bus: BusType, channel: i32, message: &str, signal: &str) -> Result<bool> {
        let _log = self.log.enter();
        Self::signal_online(&self.signal(bus, channel, message, signal)?)
    }

    pub fn check_signal_state(&self, bus: BusType, channel: i32, message: &str, signal: &str) -> Result<SignalState> {
        let _log = self.log.enter();
        Self::signal_state(&self.signal(bus, channel, message, signal)?)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn get_j1939_signal_value(
        &self,
        bus: BusType,
        channel: i32,
        message: &str,
        signal: &str,
        source_addr: i32,
        dest_addr: i32,
        raw: bool,
    ) -> Result<Value> {
        let _log = self.log.enter();
        Self::read_signal(
            &self.j1939_signal(bus, channel, message, signal, source_addr, dest_addr)?,
            raw,
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub fn set_j1939_signal_value(
        &self,
        bus: BusType,
        channel: i32,
        message: &str,
        signal: &str,
        source_addr: i32,
        dest_addr: i32,
        value: impl Into<Value>,
        raw: bool,
    ) -> Result<()> {
        let _log = self.log.enter();
        Self::write_signal(
            &self.j1939_signal(bus, channel, message, signal, source_addr, dest_addr)?,
            value.into(),
            raw,
        )
    }

    pub fn get_j1939_signal_full_name(
        &self,
        bus: BusType,
        channel: i32,
        message: &str,
        signal: &str,
        source_addr: i32,
        dest_addr: i32,
    ) -> Result<String> {
        let _log = self.log.enter();
        self.j1939_signal(bus, channel, message, signal, source_addr, dest_addr)?
            .full_name()
    }

    pub fn check_j1939_signal_online(
        &self,
        bus: BusType,
        channel: i32,
        message: &str,
        signal: &str,
        source_addr: i32,
        dest_addr: i32,
    ) -> Result<bool> {
        let _log = self.log.enter();
        Self::signal_online(&self.j1939_signal(bus, channel, message, signal, source_addr, dest_addr)?)
    }

    pub fn check_j1939_signal_state(
        &self,
        bus: BusType,
        channel: i32,
        message: &str,
        signal: &str,
        source_addr: i32,
        dest_addr: i32,
    ) -> Result<SignalState> {
        let _log = self.log.enter();
        Self::signal_state(&self.j1939_signal(bus, channel, message, signal, source_addr, dest_addr)?)
    }

    // -- diagnostics --------------------------------------------------------

    /// Re-enumerate diagnostic devices.  Returns their names.
    pub fn fetch_diag_devices(&self) -> Result<Vec<String>> {
        let _log = self.log.enter();
        let devices = fetch_diag_devices(&self.app.networks()?)?;
        let names: Vec<String> = devices.keys().cloned().collect();
        info!("{} diagnostic device(s) found: {}", names.len(), names.join(", "));
        *self.diag_devices.lock() = devices;
        Ok(names)
    }

    /// Names of the cached diagnostic devices.
    pub fn diag_device_names(&self) -> Vec<String> {
        self.diag_devices.lock().keys().cloned().collect()
    }

    fn diag_device(&self, ecu: &str) -> Result<Diagnostic> {
        self.diag_devices
            .lock()
            .get(ecu)
            .cloned()
            .ok_or_else(|| CanoeError::NotFound(format!("no diagnostic device '{ecu}'")))
    }

    /// Send a request to `ecu` and collect the responses keyed by sender.
    ///
    /// With `request_in_bytes`, `request` is hex (`"10 01"`); otherwise it is
    /// a diagnostic primitive qualifier path.
    pub fn send_diag_request(
        &self,
        ecu: &str,
        request: &str,
        request_in_bytes: bool,
    ) -> Result<BTreeMap<String, DiagResponseInfo>> {
        let _log = self.log.enter();
        let device = self.diag_device(ecu)?;
        let req = if request_in_bytes {
            device.create_request_from_stream(&parse_hex_stream(request)?)?
        } else {
            device.create_request(request)?
        };
        req.send()?;
        info!("{ecu}: diagnostic request = {request}");

        let timeout = self.options.diag_response_timeout;
        let deadline = Instant::now() + timeout;
        while req.pending()? {
            if Instant::now() >= deadline {
                return Err(CanoeError::Timeout(format!(
                    "{ecu}: diagnostic response after {timeout:?}"
                )));
            }
            thread::sleep(DIAG_POLL_INTERVAL);
        }

        let mut responses = BTreeMap::new();
        for response in req.responses()?.iter()? {
            let info = response?.info()?;
            if info.positive {
                info!("{}: positive response = {}", info.sender, info.stream_text);
            } else {
                info!("{}: negative response = {}", info.sender, info.stream_text);
            }
            responses.insert(info.sender.clone(), info);
        }
        if responses.is_empty() {
            warn!("no responses received for request {request}");
        }
        Ok(responses)
    }

    pub fn control_tester_present(&self, ecu: &str, enable: bool) -> Result<()> {
        let _log = self.log.enter();
        let device = self.diag_device(ecu)?;
        if enable {
            device.start_tester_present()?;
            info!("{ecu}: tester present started");
        } else {
            device.stop_tester_present()?;
            info!("{ecu}: tester present stopped");
        }
        Ok(())
    }

    // -- CAPL ---------------------------------------------------------------

    /// Compile all nodes, wait `settle`, and return the result code (0 on
    /// success).
    pub fn compile_all_capl_nodes(&self, settle: Duration) -> Result<i32> {
        let _log = self.log.enter();
        let capl = self.app.capl()?;
        capl.compile()?;
        thread::sleep(settle);
        let result = capl.compile_result()?;
        let code = result.result()?;
        if code == 0 {
            info!("compiled all CAPL nodes");
        } else {
            error!(
                "CAPL compilation failed in {}: {}",
                result.node_name()?,
                result.error_message()?
            );
        }
        Ok(code)
    }

    /// Names of the CAPL functions resolved at the last measurement start.
    pub fn capl_function_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.capl_functions.lock().keys().cloned().collect();
        names.sort();
        names
    }

    /// Call a user CAPL function resolved at measurement start.
    pub fn call_capl_function(&self, name: &str, args: &[Value]) -> Result<Value> {
        let _log = self.log.enter();
        let func = self
            .capl_functions
            .lock()
            .get(name)
            .cloned()
            .ok_or_else(|| CanoeError::NotFound(format!("CAPL function '{name}' not registered")))?;
        let result = func.call(args)?;
        info!("CAPL function {name} called, result {result}");
        Ok(result)
    }

    // -- test setup ---------------------------------------------------------

    fn test_environment_list(&self) -> Result<Vec<TestEnvironment>> {
        self.configuration()?
            .test_setup()?
            .test_environments()?
            .iter()?
            .collect()
    }

    fn test_environment(&self, name: &str) -> Result<TestEnvironment> {
        for env in self.test_environment_list()? {
            if env.name()? == name {
                return Ok(env);
            }
        }
        Err(CanoeError::NotFound(format!("test environment '{name}'")))
    }

    fn test_module(&self, name: &str) -> Result<TestModule> {
        for env in self.test_environment_list()? {
            for module in env.all_test_modules()? {
                if module.name()? == name {
                    return Ok(module);
                }
            }
        }
        Err(CanoeError::NotFound(format!("test module '{name}'")))
    }

    pub fn get_test_environments(&self) -> Result<Vec<String>> {
        let _log = self.log.enter();
        let names = self
            .test_environment_list()?
            .iter()
            .map(TestEnvironment::name)
            .collect::<Result<Vec<_>>>()?;
        info!("test environments: {names:?}");
        Ok(names)
    }

    /// Test modules of `env_name`, including those inside folders.
    pub fn get_test_modules(&self, env_name: &str) -> Result<Vec<String>> {
        let _log = self.log.enter();
        let names = self
            .test_environment(env_name)?
            .all_test_modules()?
            .iter()
            .map(TestModule::name)
            .collect::<Result<Vec<_>>>()?;
        info!("test modules of '{env_name}': {names:?}");
        Ok(names)
    }

    /// Names of the test modules currently started by this session.
    pub fn running_test_modules(&self) -> Vec<String> {
        let mut names: Vec<String> = self.running_tests.lock().keys().cloned().collect();
        names.sort();
        names
    }

    /// Start the test module `name` and block until it stops.
    pub fn execute_test_module(&self, name: &str) -> Result<TestVerdict> {
        let _log = self.log.enter();
        let module = self.test_module(name)?;
        self.run_test_module(name, &module)
    }

    fn run_test_module(&self, name: &str, module: &TestModule) -> Result<TestVerdict> {
        let run = Arc::new(module.start_run()?);
        self.running_tests.lock().insert(name.to_owned(), run.clone());
        let started = run.wait_started(self.options.test_module_event_timeout);
        let stopped = if started {
            info!("test module '{name}' started");
            run.wait_stopped(self.options.test_module_timeout)
        } else {
            None
        };
        self.running_tests.lock().remove(name);

        let reason = match (started, stopped) {
            (false, _) => {
                let timeout = self.options.test_module_event_timeout;
                error!("test module '{name}' did not start within {timeout:?}");
                return Err(CanoeError::Timeout(format!("test module '{name}' start after {timeout:?}")));
            }
            (true, None) => {
                let timeout = self.options.test_module_timeout;
                error!("test module '{name}' did not finish within {timeout:?}");
                return Err(CanoeError::Timeout(format!("test module '{name}' run after {timeout:?}")));
            }
            (true, Some(reason)) => reason,
        };

        let verdict = module.verdict()?;
        if let Some(report) = run.report() {
            info!("test module '{name}' report: {}", report.generated_full_name);
        }
        match reason {
            StopReason::TestModuleEnd => info!("test module '{name}' finished, verdict {verdict}"),
            other => warn!("test module '{name}' stopped ({other:?}), verdict {verdict}"),
        }
        Ok(verdict)
    }

    /// Stop a test module started by [`execute_test_module`](Self::execute_test_module)
    /// and wait for it to acknowledge.  Returns `false` when it is not running.
    pub fn stop_test_module(&self, name: &str) -> Result<bool> {
        let _log = self.log.enter();
        let run = self.running_tests.lock().get(name).cloned();
        let Some(run) = run else {
            self.test_module(name)?;
            warn!("test module '{name}' is not running");
            return Ok(false);
        };
        let reason = run.stop(self.options.test_module_event_timeout)?;
        info!("test module '{name}' stopped ({reason:?})");
        Ok(true)
    }

    /// Execute every test module of `env_name` one after another.
    pub fn execute_all_test_modules_in_test_env(&self, env_name: &str) -> Result<TestModuleVerdicts> {
        let _log = self.log.enter();
        let env = self.test_environment(env_name)?;
        self.execute_environment(&env)
    }

    fn execute_environment(&self, env: &TestEnvironment) -> Result<TestModuleVerdicts> {
        let mut verdicts = Vec::new();
        for module in env.all_test_modules()? {
            let name = module.name()?;
            let verdict = self.run_test_module(&name, &module)?;
            verdicts.push((name, verdict));
        }
        info!("test environment '{}' executed: {verdicts:?}", env.name()?);
        Ok(verdicts)
    }

    /// Stop the running test modules of `env_name`.  Returns how many were
    /// stopped.
    pub fn stop_all_test_modules_in_test_env(&self, env_name: &str) -> Result<usize> {
        let _log = self.log.enter();
        let env = self.test_environment(env_name)?;
        self.stop_environment(&env)
    }

    fn stop_environment(&self, env: &TestEnvironment) -> Result<usize> {
        let mut stopped = 0;
        for module in env.all_test_modules()? {
            let name = module.name()?;
            let run = self.running_tests.lock().get(&name).cloned();
            if let Some(run) = run {
                run.stop(self.options.test_module_event_timeout)?;
                info!("test module '{name}' stopped");
                stopped += 1;
            }
        }
        Ok(stopped)
    }

    pub fn execute_all_test_environments(&self) -> Result<Vec<(String, TestModuleVerdicts)>> {
        let _log = self.log.enter();
        let mut out = Vec::new();
        for env in self.test_environment_list()? {
            out.push((env.name()?, self.execute_environment(&env)?));
        }
        Ok(out)
    }

    pub fn stop_all_test_environments(&self) -> Result<usize> {
        let _log = self.log.enter();
        let mut stopped = 0;
        for env in self.test_environment_list()? {
            stopped += self.stop_environment(&env)?;
        }
        info!("{stopped} test module(s) stopped");
        Ok(stopped)
    }

    // -- UI -----------------------------------------------------------------

    pub fn write_text(&self, text: &str) -> Result<()> {
        let _log = self.log.enter();
        self.app.ui()?.write()?.output(text)
    }

    pub fn read_write_window(&self) -> Result<String> {
        let _log = self.log.enter();
        let text = self.app.ui()?.write()?.text()?;
        info!("write window text read ({} lines)", text.lines().count());
        Ok(text)
    }

    pub fn clear_write_window(&self) -> Result<()> {
        let _log = self.log.enter();
        self.app.ui()?.write()?.clear()?;
        info!("write window cleared");
        Ok(())
    }

    pub fn copy_write_window(&self) -> Result<()> {
        let _log = self.log.enter();
        self.app.ui()?.write()?.copy()
    }

    pub fn enable_write_window_output_file(&self, path: &str, tab: Option<i32>) -> Result<()> {
        let _log = self.log.enter();
        self.app.ui()?.write()?.enable_output_file(path, tab)?;
        info!("write window output file enabled: {path}");
        Ok(())
    }

    pub fn disable_write_window_output_file(&self, tab: Option<i32>) -> Result<()> {
        let _log = self.log.enter();
        self.app.ui()?.write()?.disable_output_file(tab)?;
        info!("write window output file disabled");
        Ok(())
    }

    pub fn ui_activate_desktop(&self, name: &str) -> Result<()> {
        let _log = self.log.enter();
        self.app.ui()?.activate_desktop(name)?;
        info!("desktop '{name}' activated");
        Ok(())
    }

    pub fn ui_create_desktop(&self, name: &str) -> Result<()> {
        let _log = self.log.enter();
        let version = self.app.version()?.info()?;
        self.app.ui()?.create_desktop(name, &version)?;
        info!("desktop '{name}' created");
        Ok(())
    }
}

impl std::fmt::Debug for Canoe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Canoe")
            .field("app", &self.app)
            .field("app_events", &self.app_events)
            .field("meas_events", &self.meas_events)
            .field("capl_functions", &self.capl_function_names())
            .finish()
    }
}

/// Forget the configuration's diagnostic devices when it closes.
fn register_configuration_hooks(log: &LogContext, config_events: &EventLatch, diag_devices: &DiagRegistry) {
    let close_log = log.clone();
    let close_devices = diag_devices.clone();
    config_events.on(configuration::events::ON_CLOSE, move |_| {
        close_devices.lock().clear();
        close_log.in_scope(|| info!("configuration closed, diagnostic devices dropped"));
    });

    let sysvar_log = log.clone();
    config_events.on(configuration::events::ON_SYSTEM_VARIABLES_DEFINITION_CHANGED, move |_| {
        sysvar_log.in_scope(|| info!("system variable definitions changed"));
    });
}

/// Resolve user CAPL functions on `OnInit`, forget them on `OnExit`.
fn register_capl_hooks(
    app: &Application,
    options: &SessionOptions,
    log: &LogContext,
    meas_events: &EventLatch,
    registry: &CaplRegistry,
) {
    let names = options.user_capl_functions.clone();
    let init_app = app.clone();
    let init_log = log.clone();
    let init_registry = registry.clone();
    meas_events.on(measurement::events::ON_INIT, move |_| {
        init_log.in_scope(|| {
            let mut resolved = HashMap::new();
            if !names.is_empty() {
                match init_app.capl() {
                    Ok(capl) => {
                        for name in &names {
                            match capl.get_function(name) {
                                Ok(f) => {
                                    resolved.insert(name.clone(), f);
                                }
                                Err(e) => warn!("CAPL function '{name}' not resolved: {e}"),
                            }
                        }
                    }
                    Err(e) => error!("CAPL object unavailable during measurement init: {e}"),
                }
            }
            let mut found: Vec<&String> = resolved.keys().collect();
            found.sort();
            info!("measurement initialized, CAPL functions: {found:?}");
            *init_registry.lock() = resolved;
        })
    });

    let exit_log = log.clone();
    let exit_registry = registry.clone();
    meas_events.on(measurement::events::ON_EXIT, move |_| {
        exit_log.in_scope(|| info!("measurement exited"));
        exit_registry.lock().clear();
    });
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockCollection, MockObject};
    use crate::objects::test_setup;

    /// Mock application wired like the real server: `Start` fires
    /// `OnInit` + `OnStart` on the measurement, `Open` fires `OnOpen`.
    struct Rig {
        app: MockObject,
        meas: MockObject,
        system_vars: MockCollection,
        networks: MockCollection,
        capl: MockObject,
        cfg: MockObject,
    }

    fn rig() -> Rig {
        let meas = MockObject::new("Measurement").with_prop("Running", false);
        let m = meas.clone();
        meas.on_call("Start", move |_| {
            m.set_prop("Running", true);
            m.fire(measurement::events::ON_INIT, &[]);
            m.fire(measurement::events::ON_START, &[]);
            Ok(Value::Empty)
        });
        let m = meas.clone();
        meas.on_call("StopEx", move |_| {
            m.set_prop("Running", false);
            m.fire(measurement::events::ON_STOP, &[]);
            m.fire(measurement::events::ON_EXIT, &[]);
            Ok(Value::Empty)
        });

        let system_vars = MockCollection::new("Variables").with_item(
            MockObject::new("Variable")
                .with_prop("Name", "speed")
                .with_prop("Value", 0),
        );
        let namespaces = MockCollection::new("Namespaces").with_item(
            MockObject::new("Namespace")
                .with_prop("Name", "Vehicle")
                .with_prop("Variables", system_vars.handle()),
        );
        let system = MockObject::new("System").with_prop("Namespaces", namespaces.handle());

        let capl = MockObject::new("CAPL");
        capl.on_call("GetFunction", |args| {
            let name = String::from_value(args[0].clone())?;
            if name != "addNumbers" {
                return Err(CanoeError::NotFound(format!("CAPL function {name}")));
            }
            let func = MockObject::new("CAPLFunction").with_prop("ParameterCount", 2);
            func.on_call("Call", |args| {
                Ok(Value::Int(args.iter().map(|a| i64::from_value(a.clone()).unwrap_or(0)).sum()))
            });
            Ok(Value::Object(func.handle()))
        });

        let networks = MockCollection::new("Networks");
        let cfg = MockObject::new("Configuration")
            .with_prop("Modified", true)
            .with_prop("Saved", false);
        cfg.on_call("Save", |_| Ok(Value::Empty));

        let app = MockObject::new("Application")
            .with_prop("Visible", false)
            .with_prop("Measurement", meas.handle())
            .with_prop("System", system.handle())
            .with_prop("CAPL", capl.handle())
            .with_prop("Networks", networks.handle())
            .with_prop("Configuration", cfg.handle());
        let a = app.clone();
        app.on_call("Open", move |args| {
            a.fire(application::events::ON_OPEN, &[args[0].clone()]);
            Ok(Value::Empty)
        });
        let a = app.clone();
        app.on_call("Quit", move |_| {
            a.fire(application::events::ON_QUIT, &[]);
            Ok(Value::Empty)
        });

        Rig {
            app,
            meas,
            system_vars,
            networks,
            capl,
            cfg,
        }
    }

    fn options() -> SessionOptions {
        SessionOptions {
            user_capl_functions: vec!["addNumbers".into(), "missing".into()],
            open_timeout: Duration::from_millis(200),
            measurement_timeout: Duration::from_millis(200),
            variable_update_timeout: Duration::from_millis(200),
            diag_response_timeout: Duration::from_millis(200),
            test_module_event_timeout: Duration::from_millis(500),
            test_module_timeout: Duration::from_secs(5),
            ..SessionOptions::default()
        }
    }

    fn session(rig: &Rig) -> Canoe {
        let app = Application::from_handle(rig.app.handle());
        Canoe::with_log(app, options(), LogContext::disabled()).unwrap()
    }

    #[test]
    fn test_open_waits_for_on_open() {
        let rig = rig();
        let canoe = session(&rig);
        canoe.open("C:/demo/demo.cfg", &OpenOptions::default()).unwrap();
        assert_eq!(canoe.opened_configuration().as_deref(), Some("C:/demo/demo.cfg"));
        assert_eq!(rig.app.prop("Visible"), Some(Value::Bool(true)));
    }

    #[test]
    fn test_open_times_out_without_notification() {
        let rig = rig();
        rig.app.on_call("Open", |_| Ok(Value::Empty));
        let canoe = session(&rig);
        let err = canoe.open("C:/demo/demo.cfg", &OpenOptions::default()).unwrap_err();
        assert!(matches!(err, CanoeError::Timeout(_)));
    }

    #[test]
    fn test_measurement_start_resolves_capl_functions() {
        let rig = rig();
        let canoe = session(&rig);

        canoe.start_measurement().unwrap();
        assert!(canoe.measurement_running().unwrap());
        assert_eq!(canoe.capl_function_names(), vec!["addNumbers"]);
        assert_eq!(rig.capl.call_count("GetFunction"), 2);

        let sum = canoe
            .call_capl_function("addNumbers", &[Value::Int(2), Value::Int(3)])
            .unwrap();
        assert_eq!(sum, Value::Int(5));
        assert!(matches!(
            canoe.call_capl_function("addNumbers", &[Value::Int(2)]),
            Err(CanoeError::InvalidArgument(_))
        ));
        assert!(canoe.call_capl_function("missing", &[]).unwrap_err().is_not_found());

        canoe.stop_measurement().unwrap();
        assert!(!canoe.measurement_running().unwrap());
        assert!(canoe.capl_function_names().is_empty());
    }

    #[test]
    fn test_start_when_running_is_a_no_op() {
        let rig = rig();
        rig.meas.set_prop("Running", true);
        let canoe = session(&rig);
        canoe.start_measurement().unwrap();
        assert_eq!(rig.meas.call_count("Start"), 0);
    }

    #[test]
    fn test_start_times_out_without_on_start() {
        let rig = rig();
        rig.meas.on_call("Start", |_| Ok(Value::Empty));
        let canoe = session(&rig);
        assert!(matches!(canoe.start_measurement(), Err(CanoeError::Timeout(_))));
    }

    #[test]
    fn test_set_system_variable_converts_and_confirms() {
        let rig = rig();
        let canoe = session(&rig);

        assert!(canoe.set_system_variable_value("Vehicle::speed", "42").unwrap());
        assert_eq!(
            rig.system_vars.get(0).unwrap().prop("Value"),
            Some(Value::Int(42))
        );
        assert_eq!(canoe.get_system_variable_value("Vehicle::speed").unwrap(), Value::Int(42));
        assert!(matches!(
            canoe.set_system_variable_value("Vehicle::speed", "fast"),
            Err(CanoeError::InvalidArgument(_))
        ));
        assert!(matches!(
            canoe.get_system_variable_value("speed"),
            Err(CanoeError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_set_array_values_checks_bounds() {
        let rig = rig();
        rig.system_vars.push(
            MockObject::new("Variable")
                .with_prop("Name", "gains")
                .with_prop("Value", vec![Value::Float(0.0); 4]),
        );
        let canoe = session(&rig);

        assert!(canoe
            .set_system_variable_array_values("Vehicle::gains", &[Value::Int(1), Value::Int(2)], 1)
            .unwrap());
        assert_eq!(
            rig.system_vars.get(1).unwrap().prop("Value"),
            Some(Value::Array(vec![
                Value::Float(0.0),
                Value::Float(1.0),
                Value::Float(2.0),
                Value::Float(0.0),
            ]))
        );
        assert!(matches!(
            canoe.set_system_variable_array_values("Vehicle::gains", &[Value::Int(1)], 4),
            Err(CanoeError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_send_diag_request_collects_responses() {
        let rig = rig();
        let response = MockObject::new("Response")
            .with_prop("Positive", true)
            .with_prop("ResponseCode", 0)
            .with_prop("Sender", "Engine")
            .with_prop("Stream", vec![0x50u8, 0x01]);
        let responses = MockCollection::new("Responses").with_item(response);
        let request = MockObject::new("Request")
            .with_prop("Pending", false)
            .with_prop("Responses", responses.handle());
        request.on_call("Send", |_| Ok(Value::Empty));
        let diag = MockObject::new("Diagnostic");
        let req = request.clone();
        diag.on_call("CreateRequestFromStream", move |_| Ok(Value::Object(req.handle())));

        let devices = MockCollection::new("Devices").with_item(
            MockObject::new("Device")
                .with_prop("Name", "Engine")
                .with_prop("Diagnostic", diag.handle()),
        );
        rig.networks
            .push(MockObject::new("Network").with_prop("Devices", devices.handle()));

        let canoe = session(&rig);
        assert_eq!(canoe.fetch_diag_devices().unwrap(), vec!["Engine"]);

        let out = canoe.send_diag_request("Engine", "10 01", true).unwrap();
        assert_eq!(out["Engine"].stream_text, "50 01");
        assert!(canoe.send_diag_request("Door", "10 01", true).unwrap_err().is_not_found());
        assert!(matches!(
            canoe.send_diag_request("Engine", "1", true),
            Err(CanoeError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_pending_request_times_out() {
        let rig = rig();
        let request = MockObject::new("Request").with_prop("Pending", true);
        request.on_call("Send", |_| Ok(Value::Empty));
        let diag = MockObject::new("Diagnostic");
        let req = request.clone();
        diag.on_call("CreateRequest", move |_| Ok(Value::Object(req.handle())));
        let devices = MockCollection::new("Devices").with_item(
            MockObject::new("Device")
                .with_prop("Name", "Engine")
                .with_prop("Diagnostic", diag.handle()),
        );
        rig.networks
            .push(MockObject::new("Network").with_prop("Devices", devices.handle()));

        let canoe = session(&rig);
        canoe.fetch_diag_devices().unwrap();
        assert!(matches!(
            canoe.send_diag_request("Engine", "DefaultSession_Start", false),
            Err(CanoeError::Timeout(_))
        ));
    }

    #[test]
    fn test_quit_clears_modified_and_waits() {
        let rig = rig();
        let canoe = session(&rig);
        canoe.quit().unwrap();
        assert_eq!(rig.cfg.prop("Modified"), Some(Value::Bool(false)));
        assert_eq!(rig.app.call_count("Quit"), 1);
    }

    #[test]
    fn test_save_configuration_skips_when_saved() {
        let rig = rig();
        let canoe = session(&rig);
        canoe.save_configuration().unwrap();
        rig.cfg.set_prop("Saved", true);
        canoe.save_configuration().unwrap();
        assert_eq!(rig.cfg.call_count("Save"), 1);
    }

    #[test]
    fn test_options_deserialize_with_defaults() {
        let opts: SessionOptions =
            serde_json::from_str(r#"{"user_capl_functions":["f"],"log":{"log_directory":"logs"}}"#).unwrap();
        assert_eq!(opts.user_capl_functions, vec!["f"]);
        assert_eq!(opts.log.log_directory, "logs");
        assert_eq!(opts.variable_update_timeout, Duration::from_secs(1));
        assert_eq!(opts.diag_response_timeout, Duration::from_secs(300));
        assert_eq!(opts.test_module_event_timeout, Duration::from_secs(5));
        assert_eq!(opts.test_module_timeout, Duration::from_secs(86_400));
    }

    fn attach_device(rig: &Rig, name: &str) {
        let devices = MockCollection::new("Devices").with_item(
            MockObject::new("Device")
                .with_prop("Name", name)
                .with_prop("Diagnostic", MockObject::new("Diagnostic").handle()),
        );
        rig.networks
            .push(MockObject::new("Network").with_prop("Devices", devices.handle()));
    }

    #[test]
    fn test_configuration_close_drops_diag_devices() {
        let rig = rig();
        attach_device(&rig, "Engine");
        let canoe = session(&rig);

        canoe.open("C:/demo/demo.cfg", &OpenOptions::default()).unwrap();
        assert_eq!(canoe.diag_device_names(), vec!["Engine"]);
        canoe.open("C:/demo/demo.cfg", &OpenOptions::default()).unwrap();
        assert_eq!(rig.cfg.sink_count(), 1);

        rig.cfg.fire(configuration::events::ON_SYSTEM_VARIABLES_DEFINITION_CHANGED, &[]);
        assert_eq!(canoe.diag_device_names(), vec!["Engine"]);
        rig.cfg.fire(configuration::events::ON_CLOSE, &[]);
        assert!(canoe.diag_device_names().is_empty());
        assert!(canoe.send_diag_request("Engine", "10 01", true).unwrap_err().is_not_found());
    }

    #[test]
    fn test_offline_measurement_controls() {
        let rig = rig();
        rig.meas.set_prop("MeasurementIndex", 3);
        for method in ["Break", "Reset", "Step"] {
            rig.meas.on_call(method, |_| Ok(Value::Empty));
        }
        let canoe = session(&rig);

        canoe.break_measurement_in_offline_mode().unwrap();
        assert_eq!(rig.meas.call_count("Break"), 0);
        rig.meas.set_prop("Running", true);
        canoe.break_measurement_in_offline_mode().unwrap();
        canoe.step_measurement_event_in_single_step().unwrap();
        canoe.reset_measurement_in_offline_mode().unwrap();
        assert_eq!(rig.meas.call_count("Break"), 1);
        assert_eq!(rig.meas.call_count("Step"), 1);
        assert_eq!(rig.meas.call_count("Reset"), 1);

        assert_eq!(canoe.get_measurement_index().unwrap(), 3);
        canoe.set_measurement_index(7).unwrap();
        assert_eq!(rig.meas.prop("MeasurementIndex"), Some(Value::Int(7)));
    }

    #[test]
    fn test_signal_queries_and_j1939_addresses() {
        let rig = rig();
        let signal = MockObject::new("Signal")
            .with_prop("FullName", "J1939::EEC1::EngSpeed")
            .with_prop("IsOnline", true)
            .with_prop("State", 2)
            .with_prop("Value", 0.0)
            .with_prop("RawValue", 0);
        let bus = MockObject::new("Bus");
        let sig = signal.clone();
        bus.on_call("GetSignal", move |_| Ok(Value::Object(sig.handle())));
        let sig = signal.clone();
        bus.on_call("GetJ1939Signal", move |_| Ok(Value::Object(sig.handle())));
        let b = bus.clone();
        rig.app.on_call("GetBus", move |_| Ok(Value::Object(b.handle())));
        let canoe = session(&rig);

        assert_eq!(
            canoe.get_signal_full_name(BusType::Can, 1, "EEC1", "EngSpeed").unwrap(),
            "J1939::EEC1::EngSpeed"
        );
        assert!(canoe.check_signal_online(BusType::Can, 1, "EEC1", "EngSpeed").unwrap());
        assert_eq!(
            canoe.check_signal_state(BusType::Can, 1, "EEC1", "EngSpeed").unwrap(),
            SignalState::LastMeasurement
        );

        canoe
            .set_j1939_signal_value(BusType::J1939, 1, "EEC1", "EngSpeed", 0, 254, 1500, true)
            .unwrap();
        assert_eq!(
            canoe
                .get_j1939_signal_value(BusType::J1939, 1, "EEC1", "EngSpeed", 0, 254, true)
                .unwrap(),
            Value::Int(1500)
        );
        assert!(canoe
            .check_j1939_signal_online(BusType::J1939, 1, "EEC1", "EngSpeed", 0, 254)
            .unwrap());
        assert_eq!(
            canoe
                .check_j1939_signal_state(BusType::J1939, 1, "EEC1", "EngSpeed", 0, 254)
                .unwrap(),
            SignalState::LastMeasurement
        );
        assert_eq!(
            canoe
                .get_j1939_signal_full_name(BusType::J1939, 1, "EEC1", "EngSpeed", 0, 254)
                .unwrap(),
            "J1939::EEC1::EngSpeed"
        );
        let (_, args) = bus.calls().into_iter().find(|(n, _)| n == "GetJ1939Signal").unwrap();
        assert_eq!(&args[3..], &[Value::Int(0), Value::Int(254)]);
    }

    #[test]
    fn test_bus_databases_and_nodes_info() {
        let rig = rig();
        let dbs = MockCollection::new("Databases").with_item(
            MockObject::new("Database")
                .with_prop("Name", "powertrain")
                .with_prop("FullName", "C:/db/powertrain.dbc")
                .with_prop("Path", "C:/db")
                .with_prop("Channel", 1),
        );
        let nodes = MockCollection::new("Nodes").with_item(
            MockObject::new("Node")
                .with_prop("Name", "Engine")
                .with_prop("FullName", "C:/nodes/engine.can")
                .with_prop("Path", "C:/nodes")
                .with_prop("Active", true),
        );
        let bus = MockObject::new("Bus")
            .with_prop("Databases", dbs.handle())
            .with_prop("Nodes", nodes.handle());
        rig.app.on_call("GetBus", move |_| Ok(Value::Object(bus.handle())));
        let canoe = session(&rig);

        let databases = canoe.get_bus_databases_info(BusType::Can).unwrap();
        assert_eq!(databases["powertrain"].channel, 1);
        let nodes = canoe.get_bus_nodes_info(BusType::Can).unwrap();
        assert!(nodes["Engine"].active);
        assert_eq!(nodes["Engine"].full_name, "C:/nodes/engine.can");
    }

    fn attach_databases(rig: &Rig) -> MockCollection {
        let dbs = MockCollection::new("Databases").with_item(
            MockObject::new("Database")
                .with_prop("FullName", "C:/db/body.dbc")
                .with_prop("Channel", 1),
        );
        for method in ["Add", "AddNetwork"] {
            dbs.on_add(method, |args| {
                Ok(MockObject::new("Database").with_prop("FullName", args[0].clone()).with_prop("Channel", 1))
            });
        }
        let db_setup = MockObject::new("DatabaseSetup").with_prop("Databases", dbs.handle());
        let general = MockObject::new("GeneralSetup").with_prop("DatabaseSetup", db_setup.handle());
        rig.cfg.set_prop("GeneralSetup", general.handle());
        dbs
    }

    #[test]
    fn test_add_and_remove_database() {
        let rig = rig();
        let dbs = attach_databases(&rig);
        let canoe = session(&rig);

        assert!(!canoe.add_database("C:/db/body.dbc", None, 1).unwrap());
        assert!(canoe.add_database("C:/db/chassis.arxml", Some("Chassis"), 2).unwrap());
        assert_eq!(dbs.len(), 2);
        assert_eq!(dbs.get(1).unwrap().prop("Channel"), Some(Value::Int(2)));
        assert_eq!(dbs.object().call_count("AddNetwork"), 1);

        assert!(!canoe.remove_database("C:/db/chassis.arxml", 1).unwrap());
        assert!(canoe.remove_database("C:/db/chassis.arxml", 2).unwrap());
        assert_eq!(dbs.len(), 1);

        rig.meas.set_prop("Running", true);
        assert!(matches!(
            canoe.add_database("C:/db/x.dbc", None, 1),
            Err(CanoeError::InvalidArgument(_))
        ));
        assert!(matches!(
            canoe.remove_database("C:/db/body.dbc", 1),
            Err(CanoeError::InvalidArgument(_))
        ));
        assert_eq!(dbs.len(), 1);
    }

    #[test]
    fn test_add_offline_source_log_file() {
        let tmp = tempfile::tempdir().unwrap();
        let log_file = tmp.path().join("drive.blf");
        std::fs::write(&log_file, b"").unwrap();
        let log_file = log_file.to_string_lossy().into_owned();

        let rig = rig();
        let listed: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let sources = MockObject::new("Sources");
        let l = listed.clone();
        sources.on_call("Count", move |_| Ok(Value::from(l.lock().len())));
        let l = listed.clone();
        sources.on_call("Item", move |args| {
            let i = usize::from_value(args[0].clone())?;
            Ok(Value::from(l.lock()[i - 1].as_str()))
        });
        let l = listed.clone();
        sources.on_call("Add", move |args| {
            l.lock().push(String::from_value(args[0].clone())?);
            Ok(Value::Empty)
        });
        let source = MockObject::new("Source").with_prop("Sources", sources.handle());
        let offline = MockObject::new("OfflineSetup").with_prop("Source", source.handle());
        rig.cfg.set_prop("OfflineSetup", offline.handle());
        let canoe = session(&rig);

        assert!(canoe.add_offline_source_log_file(&log_file).unwrap());
        assert!(!canoe.add_offline_source_log_file(&log_file).unwrap());
        assert_eq!(*listed.lock(), vec![log_file.clone()]);

        let missing = tmp.path().join("missing.blf");
        assert!(matches!(
            canoe.add_offline_source_log_file(&missing.to_string_lossy()),
            Err(CanoeError::InvalidArgument(_))
        ));
        assert_eq!(sources.call_count("Add"), 1);
    }

    #[test]
    fn test_replay_block_controls() {
        let rig = rig();
        let blocks = MockCollection::new("ReplayCollection").with_item(
            MockObject::new("ReplayBlock")
                .with_prop("Name", "Drive")
                .with_prop("Enabled", false)
                .with_prop("Path", ""),
        );
        let block = blocks.get(0).unwrap();
        block.on_call("Start", |_| Ok(Value::Empty));
        block.on_call("Stop", |_| Ok(Value::Empty));
        let sim = MockObject::new("SimulationSetup").with_prop("ReplayCollection", blocks.handle());
        rig.cfg.set_prop("SimulationSetup", sim.handle());
        let canoe = session(&rig);

        canoe.set_replay_block_file("Drive", "C:/rec/drive.blf").unwrap();
        canoe.enable_disable_replay_block("Drive", true).unwrap();
        canoe.control_replay_block("Drive", true).unwrap();
        canoe.control_replay_block("Drive", false).unwrap();

        assert_eq!(block.prop("Path"), Some(Value::from("C:/rec/drive.blf")));
        assert_eq!(block.prop("Enabled"), Some(Value::Bool(true)));
        assert_eq!(block.call_count("Start"), 1);
        assert_eq!(block.call_count("Stop"), 1);
        assert!(canoe.control_replay_block("Park", true).unwrap_err().is_not_found());
    }

    #[test]
    fn test_logging_blocks_and_export() {
        let rig = rig();
        let filter = MockObject::new("Filter");
        filter.on_call("Add", |_| Ok(Value::Empty));
        let symbols = MockCollection::new("Symbols")
            .with_item(MockObject::new("Symbol").with_prop("FullName", "CAN1::EngineData::EngSpeed"));
        let messages = MockCollection::new("Messages")
            .with_item(MockObject::new("Message").with_prop("FullName", "CAN1::EngineData"));
        let exporter = MockObject::new("Exporter")
            .with_prop("Filter", filter.handle())
            .with_prop("Symbols", symbols.handle())
            .with_prop("Messages", messages.handle());
        exporter.on_call("Load", |_| Ok(Value::Empty));
        exporter.on_call("Save", |_| Ok(Value::Empty));
        let trigger = MockObject::new("Trigger");
        trigger.on_call("Start", |_| Ok(Value::Empty));
        trigger.on_call("Stop", |_| Ok(Value::Empty));

        let blocks = MockCollection::new("LoggingCollection").with_item(
            MockObject::new("Logging")
                .with_prop("FullName", "C:/Logs/Run.blf")
                .with_prop("Exporter", exporter.handle())
                .with_prop("Trigger", trigger.handle()),
        );
        blocks.on_add("Add", |args| Ok(MockObject::new("Logging").with_prop("FullName", args[0].clone())));
        let online = MockObject::new("OnlineSetup").with_prop("LoggingCollection", blocks.handle());
        rig.cfg.set_prop("OnlineSetup", online.handle());
        let canoe = session(&rig);

        canoe.add_logging_block("C:/logs/extra.asc").unwrap();
        assert_eq!(canoe.get_logging_blocks().unwrap(), vec!["C:/Logs/Run.blf", "C:/logs/extra.asc"]);
        canoe.remove_logging_block(1).unwrap();
        assert!(canoe.remove_logging_block(5).unwrap_err().is_not_found());

        canoe.load_logs_for_exporter(0).unwrap();
        assert_eq!(canoe.get_symbols(0).unwrap(), vec!["CAN1::EngineData::EngSpeed"]);
        assert_eq!(canoe.get_messages(0).unwrap(), vec!["CAN1::EngineData"]);
        canoe
            .add_filters_to_exporter(0, &["CAN1::EngineData".to_owned(), "CAN1::Gear".to_owned()])
            .unwrap();
        canoe.start_export(0).unwrap();
        assert_eq!(filter.call_count("Add"), 2);
        assert_eq!(exporter.calls().last().unwrap(), &("Save".to_owned(), vec![Value::Bool(true)]));

        canoe.control_logging_block("c:/logs/run.BLF", true).unwrap();
        canoe.control_logging_block("C:/Logs/Run.blf", false).unwrap();
        assert_eq!(trigger.call_count("Start"), 1);
        assert_eq!(trigger.call_count("Stop"), 1);
        assert!(canoe.control_logging_block("C:/logs/none.blf", true).unwrap_err().is_not_found());
    }

    #[test]
    fn test_can_bus_statistics_reads_channel() {
        let rig = rig();
        let stat = MockObject::new("BusStatistic");
        for name in [
            "ChipState",
            "ErrorTotal",
            "ExtendedTotal",
            "ExtendedRemoteTotal",
            "OverloadTotal",
            "RxErrorCount",
            "StandardTotal",
            "StandardRemoteTotal",
            "TxErrorCount",
        ] {
            stat.set_prop(name, 0);
        }
        for name in ["Error", "Extended", "ExtendedRemote", "Overload", "PeakLoad", "Standard", "StandardRemote"] {
            stat.set_prop(name, 0.0);
        }
        stat.set_prop("BusLoad", 31.5);
        let stats = MockObject::new("BusStatistics");
        let s = stat.clone();
        stats.on_call("BusStatistic", move |args| {
            assert_eq!(args, &[Value::Int(1), Value::Int(2)]);
            Ok(Value::Object(s.handle()))
        });
        let online = MockObject::new("OnlineSetup").with_prop("BusStatistics", stats.handle());
        rig.cfg.set_prop("OnlineSetup", online.handle());
        let canoe = session(&rig);

        assert_eq!(canoe.get_can_bus_statistics(2).unwrap().bus_load, 31.5);
    }

    /// Module whose `Start` immediately runs to completion with `verdict`.
    fn finishing_module(name: &str, verdict: i32) -> MockObject {
        let module = MockObject::new("TestModule").with_prop("Name", name).with_prop("Verdict", 0);
        let m = module.clone();
        module.on_call("Start", move |_| {
            m.fire(test_setup::events::ON_START, &[]);
            m.set_prop("Verdict", verdict);
            m.fire(test_setup::events::ON_STOP, &[Value::Int(0)]);
            Ok(Value::Empty)
        });
        module
    }

    /// Module that runs until `Stop`, then reports `UserAbortion`.
    fn soaking_module(name: &str) -> MockObject {
        let module = MockObject::new("TestModule").with_prop("Name", name).with_prop("Verdict", 0);
        let m = module.clone();
        module.on_call("Start", move |_| {
            m.fire(test_setup::events::ON_START, &[]);
            Ok(Value::Empty)
        });
        let m = module.clone();
        module.on_call("Stop", move |_| {
            m.set_prop("Verdict", 4);
            m.fire(test_setup::events::ON_STOP, &[Value::Int(1)]);
            Ok(Value::Empty)
        });
        module
    }

    fn test_environment(name: &str, modules: Vec<MockObject>, folders: Vec<MockObject>) -> MockObject {
        let tm = MockCollection::new("TestModules");
        modules.into_iter().for_each(|m| tm.push(m));
        let f = MockCollection::new("Folders");
        folders.into_iter().for_each(|x| f.push(x));
        MockObject::new("TestEnvironment")
            .with_prop("Name", name)
            .with_prop("TestModules", tm.handle())
            .with_prop("Folders", f.handle())
    }

    fn attach_test_setup(rig: &Rig, environments: Vec<MockObject>) {
        let envs = MockCollection::new("TestEnvironments");
        environments.into_iter().for_each(|e| envs.push(e));
        let setup = MockObject::new("TestSetup").with_prop("TestEnvironments", envs.handle());
        rig.cfg.set_prop("TestSetup", setup.handle());
    }

    #[test]
    fn test_execute_test_modules_and_environments() {
        let rig = rig();
        let nested = test_environment("Regression", vec![finishing_module("Doors", 2)], vec![]);
        attach_test_setup(
            &rig,
            vec![
                test_environment("Smoke", vec![finishing_module("Boot", 1)], vec![nested]),
                test_environment("Night", vec![finishing_module("Soak", 4)], vec![]),
            ],
        );
        let canoe = session(&rig);

        assert_eq!(canoe.get_test_environments().unwrap(), vec!["Smoke", "Night"]);
        assert_eq!(canoe.get_test_modules("Smoke").unwrap(), vec!["Boot", "Doors"]);
        assert!(canoe.get_test_modules("Weekly").unwrap_err().is_not_found());

        assert_eq!(canoe.execute_test_module("Doors").unwrap(), TestVerdict::Failed);
        assert!(canoe.execute_test_module("Unknown").unwrap_err().is_not_found());
        assert_eq!(
            canoe.execute_all_test_modules_in_test_env("Smoke").unwrap(),
            vec![("Boot".to_owned(), TestVerdict::Passed), ("Doors".to_owned(), TestVerdict::Failed)]
        );
        let all = canoe.execute_all_test_environments().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[1], ("Night".to_owned(), vec![("Soak".to_owned(), TestVerdict::Inconclusive)]));
        assert!(canoe.running_test_modules().is_empty());
    }

    #[test]
    fn test_module_that_never_starts_times_out() {
        let rig = rig();
        let silent = MockObject::new("TestModule").with_prop("Name", "Silent");
        silent.on_call("Start", |_| Ok(Value::Empty));
        attach_test_setup(&rig, vec![test_environment("Smoke", vec![silent.clone()], vec![])]);
        let mut opts = options();
        opts.test_module_event_timeout = Duration::from_millis(20);
        let canoe =
            Canoe::with_log(Application::from_handle(rig.app.handle()), opts, LogContext::disabled()).unwrap();

        assert!(matches!(canoe.execute_test_module("Silent"), Err(CanoeError::Timeout(_))));
        assert!(canoe.running_test_modules().is_empty());
        assert_eq!(silent.sink_count(), 0);
    }

    #[test]
    fn test_stop_test_module_from_another_thread() {
        let rig = rig();
        attach_test_setup(
            &rig,
            vec![test_environment("Night", vec![soaking_module("Soak"), finishing_module("Boot", 1)], vec![])],
        );
        let canoe = session(&rig);
        assert!(!canoe.stop_test_module("Soak").unwrap());
        assert!(canoe.stop_test_module("Unknown").unwrap_err().is_not_found());

        let verdict = thread::scope(|scope| {
            let runner = scope.spawn(|| canoe.execute_test_module("Soak"));
            let deadline = Instant::now() + Duration::from_secs(5);
            while canoe.running_test_modules().is_empty() {
                assert!(Instant::now() < deadline, "test module never registered as running");
                thread::sleep(Duration::from_millis(1));
            }
            assert_eq!(canoe.running_test_modules(), vec!["Soak"]);
            assert!(canoe.stop_test_module("Soak").unwrap());
            runner.join().unwrap()
        });
        assert_eq!(verdict.unwrap(), TestVerdict::Inconclusive);
        assert!(canoe.running_test_modules().is_empty());
    }

    #[test]
    fn test_stop_all_test_environments_stops_running_modules() {
        let rig = rig();
        attach_test_setup(&rig, vec![test_environment("Night", vec![soaking_module("Soak")], vec![])]);
        let canoe = session(&rig);
        assert_eq!(canoe.stop_all_test_environments().unwrap(), 0);

        thread::scope(|scope| {
            let runner = scope.spawn(|| canoe.execute_all_test_modules_in_test_env("Night"));
            let deadline = Instant::now() + Duration::from_secs(5);
            while canoe.running_test_modules().is_empty() {
                assert!(Instant::now() < deadline, "test module never registered as running");
                thread::sleep(Duration::from_millis(1));
            }
            assert_eq!(canoe.stop_all_test_modules_in_test_env("Night").unwrap(), 1);
            let verdicts = runner.join().unwrap().unwrap();
            assert_eq!(verdicts, vec![("Soak".to_owned(), TestVerdict::Inconclusive)]);
        });
    }
}
