//! `canoe_native` -- Thin PyO3 wrappers around `canoe_core`.
//!
//! Each method releases the GIL via `py.allow_threads()` while the session
//! talks to the application, then converts the Rust result to Python
//! objects.  All binding logic lives in `canoe_core`.

use std::time::Duration;

use pyo3::exceptions::{PyKeyError, PyOSError, PyRuntimeError, PyTimeoutError, PyTypeError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::{PyBool, PyByteArray, PyBytes, PyDict, PyFloat, PyInt, PyList, PyString, PyTuple};

use canoe_core::objects::{BusType, CanBusStatistics};
use canoe_core::session::TestModuleVerdicts;
use canoe_core::{Canoe, CanoeError, OpenOptions, SessionOptions, Value};

// ---------------------------------------------------------------------------
// Error conversion helper
// ---------------------------------------------------------------------------

fn to_py_err(e: CanoeError) -> PyErr {
    let message = e.to_string();
    match e {
        CanoeError::NotFound(_) => PyKeyError::new_err(message),
        CanoeError::InvalidArgument(_) => PyValueError::new_err(message),
        CanoeError::Timeout(_) => PyTimeoutError::new_err(message),
        CanoeError::IoError(_) => PyOSError::new_err(message),
        CanoeError::RemoteUnavailable(_) | CanoeError::ComError(_) | CanoeError::LoggingError(_) => {
            PyRuntimeError::new_err(message)
        }
    }
}

// ---------------------------------------------------------------------------
// Value <-> Python conversion
// ---------------------------------------------------------------------------

fn value_to_py(py: Python<'_>, value: &Value) -> PyResult<PyObject> {
    Ok(match value {
        Value::Empty | Value::Object(_) => py.None(),
        Value::Bool(b) => PyBool::new(py, *b).to_owned().into_any().unbind(),
        Value::Int(i) => (*i).into_pyobject(py)?.into_any().unbind(),
        Value::Float(f) => PyFloat::new(py, *f).into_any().unbind(),
        Value::Str(s) => PyString::new(py, s).into_any().unbind(),
        Value::Bytes(b) => PyBytes::new(py, b).into_any().unbind(),
        Value::Array(items) => {
            let list = PyList::empty(py);
            for item in items {
                list.append(value_to_py(py, item)?)?;
            }
            list.into_any().unbind()
        }
    })
}

fn py_to_value(obj: &Bound<'_, PyAny>) -> PyResult<Value> {
    if obj.is_none() {
        return Ok(Value::Empty);
    }
    // bool is a subclass of int; test it first.
    if obj.is_instance_of::<PyBool>() {
        return Ok(Value::Bool(obj.extract()?));
    }
    if obj.is_instance_of::<PyInt>() {
        return Ok(Value::Int(obj.extract()?));
    }
    if obj.is_instance_of::<PyFloat>() {
        return Ok(Value::Float(obj.extract()?));
    }
    if obj.is_instance_of::<PyString>() {
        return Ok(Value::Str(obj.extract()?));
    }
    if obj.is_instance_of::<PyBytes>() || obj.is_instance_of::<PyByteArray>() {
        return Ok(Value::Bytes(obj.extract()?));
    }
    if obj.is_instance_of::<PyList>() || obj.is_instance_of::<PyTuple>() {
        let items = obj
            .try_iter()?
            .map(|item| py_to_value(&item?))
            .collect::<PyResult<Vec<_>>>()?;
        return Ok(Value::Array(items));
    }
    Err(PyTypeError::new_err(format!(
        "unsupported value type: {}",
        obj.get_type().name()?
    )))
}

fn parse_bus(bus: &str) -> PyResult<BusType> {
    bus.parse().map_err(to_py_err)
}

/// `{module: verdict}` in execution order.
fn verdicts_to_py<'py>(py: Python<'py>, verdicts: &TestModuleVerdicts) -> PyResult<Bound<'py, PyDict>> {
    let dict = PyDict::new(py);
    for (module, verdict) in verdicts {
        dict.set_item(module, verdict.to_string())?;
    }
    Ok(dict)
}

fn can_statistics_to_py(py: Python<'_>, stats: &CanBusStatistics) -> PyResult<PyObject> {
    let dict = PyDict::new(py);
    dict.set_item("bus_load", stats.bus_load)?;
    dict.set_item("chip_state", stats.chip_state)?;
    dict.set_item("error", stats.error)?;
    dict.set_item("error_total", stats.error_total)?;
    dict.set_item("extended", stats.extended)?;
    dict.set_item("extended_total", stats.extended_total)?;
    dict.set_item("extended_remote", stats.extended_remote)?;
    dict.set_item("extended_remote_total", stats.extended_remote_total)?;
    dict.set_item("overload", stats.overload)?;
    dict.set_item("overload_total", stats.overload_total)?;
    dict.set_item("peak_load", stats.peak_load)?;
    dict.set_item("rx_error_count", stats.rx_error_count)?;
    dict.set_item("standard", stats.standard)?;
    dict.set_item("standard_total", stats.standard_total)?;
    dict.set_item("standard_remote", stats.standard_remote)?;
    dict.set_item("standard_remote_total", stats.standard_remote_total)?;
    dict.set_item("tx_error_count", stats.tx_error_count)?;
    Ok(dict.into_any().unbind())
}

// ---------------------------------------------------------------------------
// CANoe session
// ---------------------------------------------------------------------------

/// Scripting session over a CANoe application instance.
#[pyclass(name = "CANoe", module = "canoe_native")]
struct PyCanoe {
    inner: Canoe,
}

fn session_options(log_dir: &str, user_capl_functions: Option<Vec<String>>) -> SessionOptions {
    let mut options = SessionOptions::default();
    options.log.log_directory = log_dir.to_owned();
    options.user_capl_functions = user_capl_functions.unwrap_or_default();
    options
}

#[cfg(windows)]
fn launch(options: SessionOptions) -> canoe_core::Result<Canoe> {
    Canoe::launch(options)
}

#[cfg(windows)]
fn attach(options: SessionOptions) -> canoe_core::Result<Canoe> {
    Canoe::attach(options)
}

#[cfg(not(windows))]
fn launch(_options: SessionOptions) -> canoe_core::Result<Canoe> {
    Err(CanoeError::RemoteUnavailable(
        "CANoe automation is only available on Windows".into(),
    ))
}

#[cfg(not(windows))]
fn attach(options: SessionOptions) -> canoe_core::Result<Canoe> {
    launch(options)
}

#[pymethods]
impl PyCanoe {
    /// Start (or connect to) the application.
    #[new]
    #[pyo3(signature = (py_canoe_log_dir="", user_capl_functions=None))]
    fn new(py: Python<'_>, py_canoe_log_dir: &str, user_capl_functions: Option<Vec<String>>) -> PyResult<Self> {
        let options = session_options(py_canoe_log_dir, user_capl_functions);
        let inner = py.allow_threads(|| launch(options)).map_err(to_py_err)?;
        Ok(Self { inner })
    }

    /// Attach to a running application and its loaded configuration.
    #[staticmethod]
    #[pyo3(signature = (py_canoe_log_dir="", user_capl_functions=None))]
    fn attach(py: Python<'_>, py_canoe_log_dir: &str, user_capl_functions: Option<Vec<String>>) -> PyResult<Self> {
        let options = session_options(py_canoe_log_dir, user_capl_functions);
        let inner = py.allow_threads(|| attach(options)).map_err(to_py_err)?;
        Ok(Self { inner })
    }

    // -- configuration --------------------------------------------------------

    #[pyo3(signature = (canoe_cfg, visible=true, auto_save=true, prompt_user=false))]
    fn open(&self, py: Python<'_>, canoe_cfg: &str, visible: bool, auto_save: bool, prompt_user: bool) -> PyResult<()> {
        let opts = OpenOptions {
            visible,
            auto_save,
            prompt_user,
        };
        py.allow_threads(|| self.inner.open(canoe_cfg, &opts)).map_err(to_py_err)
    }

    #[pyo3(signature = (auto_save=false, prompt_user=false))]
    fn new_configuration(&self, py: Python<'_>, auto_save: bool, prompt_user: bool) -> PyResult<()> {
        py.allow_threads(|| self.inner.new_configuration(auto_save, prompt_user))
            .map_err(to_py_err)
    }

    fn quit(&self, py: Python<'_>) -> PyResult<()> {
        py.allow_threads(|| self.inner.quit()).map_err(to_py_err)
    }

    fn save_configuration(&self, py: Python<'_>) -> PyResult<()> {
        py.allow_threads(|| self.inner.save_configuration()).map_err(to_py_err)
    }

    #[pyo3(signature = (path, major, minor, create_dir=true))]
    fn save_configuration_as(&self, py: Python<'_>, path: &str, major: i32, minor: i32, create_dir: bool) -> PyResult<()> {
        py.allow_threads(|| self.inner.save_configuration_as(path, major, minor, create_dir))
            .map_err(to_py_err)
    }

    // -- measurement ----------------------------------------------------------

    fn start_measurement(&self, py: Python<'_>) -> PyResult<()> {
        py.allow_threads(|| self.inner.start_measurement()).map_err(to_py_err)
    }

    fn stop_measurement(&self, py: Python<'_>) -> PyResult<()> {
        py.allow_threads(|| self.inner.stop_measurement()).map_err(to_py_err)
    }

    fn reset_measurement(&self, py: Python<'_>) -> PyResult<()> {
        py.allow_threads(|| self.inner.reset_measurement()).map_err(to_py_err)
    }

    fn get_measurement_running_status(&self, py: Python<'_>) -> PyResult<bool> {
        py.allow_threads(|| self.inner.measurement_running()).map_err(to_py_err)
    }

    #[pyo3(signature = (animation_delay=100))]
    fn start_measurement_in_animation_mode(&self, py: Python<'_>, animation_delay: i32) -> PyResult<()> {
        py.allow_threads(|| self.inner.start_measurement_in_animation_mode(animation_delay))
            .map_err(to_py_err)
    }

    // -- version --------------------------------------------------------------

    fn get_canoe_version_info(&self, py: Python<'_>) -> PyResult<PyObject> {
        let info = py.allow_threads(|| self.inner.version_info()).map_err(to_py_err)?;
        let dict = PyDict::new(py);
        dict.set_item("full_name", &info.full_name)?;
        dict.set_item("name", &info.name)?;
        dict.set_item("build", info.build)?;
        dict.set_item("major", info.major)?;
        dict.set_item("minor", info.minor)?;
        dict.set_item("patch", info.patch)?;
        Ok(dict.into_any().unbind())
    }

    // -- system variables -----------------------------------------------------

    #[pyo3(signature = (sys_var_name, value, read_only=false))]
    fn define_system_variable(&self, py: Python<'_>, sys_var_name: &str, value: &Bound<'_, PyAny>, read_only: bool) -> PyResult<()> {
        let value = py_to_value(value)?;
        py.allow_threads(|| self.inner.define_system_variable(sys_var_name, value, read_only))
            .map(drop)
            .map_err(to_py_err)
    }

    fn remove_system_variable(&self, py: Python<'_>, sys_var_name: &str) -> PyResult<bool> {
        py.allow_threads(|| self.inner.remove_system_variable(sys_var_name))
            .map_err(to_py_err)
    }

    #[pyo3(signature = (sys_var_name, return_symbolic_name=false))]
    fn get_system_variable_value(&self, py: Python<'_>, sys_var_name: &str, return_symbolic_name: bool) -> PyResult<PyObject> {
        if return_symbolic_name {
            let symbol = py
                .allow_threads(|| self.inner.get_system_variable_symbolic_value(sys_var_name))
                .map_err(to_py_err)?;
            return Ok(PyString::new(py, &symbol).into_any().unbind());
        }
        let value = py
            .allow_threads(|| self.inner.get_system_variable_value(sys_var_name))
            .map_err(to_py_err)?;
        value_to_py(py, &value)
    }

    fn set_system_variable_value(&self, py: Python<'_>, sys_var_name: &str, value: &Bound<'_, PyAny>) -> PyResult<bool> {
        let value = py_to_value(value)?;
        py.allow_threads(|| self.inner.set_system_variable_value(sys_var_name, value))
            .map_err(to_py_err)
    }

    #[pyo3(signature = (sys_var_name, value, index=0))]
    fn set_system_variable_array_values(&self, py: Python<'_>, sys_var_name: &str, value: &Bound<'_, PyAny>, index: usize) -> PyResult<bool> {
        let values = match py_to_value(value)? {
            Value::Array(items) => items,
            Value::Bytes(bytes) => bytes.into_iter().map(Value::from).collect(),
            single => vec![single],
        };
        py.allow_threads(|| self.inner.set_system_variable_array_values(sys_var_name, &values, index))
            .map_err(to_py_err)
    }

    // -- environment variables ------------------------------------------------

    fn get_environment_variable_value(&self, py: Python<'_>, env_var_name: &str) -> PyResult<PyObject> {
        let value = py
            .allow_threads(|| self.inner.get_environment_variable_value(env_var_name))
            .map_err(to_py_err)?;
        value_to_py(py, &value)
    }

    fn set_environment_variable_value(&self, py: Python<'_>, env_var_name: &str, value: &Bound<'_, PyAny>) -> PyResult<()> {
        let value = py_to_value(value)?;
        py.allow_threads(|| self.inner.set_environment_variable_value(env_var_name, value))
            .map_err(to_py_err)
    }

    // -- signals --------------------------------------------------------------

    #[pyo3(signature = (bus, channel, message, signal, raw_value=false))]
    fn get_signal_value(
        &self,
        py: Python<'_>,
        bus: &str,
        channel: i32,
        message: &str,
        signal: &str,
        raw_value: bool,
    ) -> PyResult<PyObject> {
        let bus = parse_bus(bus)?;
        let value = py
            .allow_threads(|| self.inner.get_signal_value(bus, channel, message, signal, raw_value))
            .map_err(to_py_err)?;
        value_to_py(py, &value)
    }

    #[pyo3(signature = (bus, channel, message, signal, value, raw_value=false))]
    #[allow(clippy::too_many_arguments)]
    fn set_signal_value(
        &self,
        py: Python<'_>,
        bus: &str,
        channel: i32,
        message: &str,
        signal: &str,
        value: &Bound<'_, PyAny>,
        raw_value: bool,
    ) -> PyResult<()> {
        let bus = parse_bus(bus)?;
        let value = py_to_value(value)?;
        py.allow_threads(|| self.inner.set_signal_value(bus, channel, message, signal, value, raw_value))
            .map_err(to_py_err)
    }

    fn get_signal_full_name(&self, py: Python<'_>, bus: &str, channel: i32, message: &str, signal: &str) -> PyResult<String> {
        let bus = parse_bus(bus)?;
        py.allow_threads(|| self.inner.get_signal_full_name(bus, channel, message, signal))
            .map_err(to_py_err)
    }

    fn check_signal_online(&self, py: Python<'_>, bus: &str, channel: i32, message: &str, signal: &str) -> PyResult<bool> {
        let bus = parse_bus(bus)?;
        py.allow_threads(|| self.inner.check_signal_online(bus, channel, message, signal))
            .map_err(to_py_err)
    }

    /// State code: 0 default, 1 set by application, 2 last measurement,
    /// 3 received.
    fn check_signal_state(&self, py: Python<'_>, bus: &str, channel: i32, message: &str, signal: &str) -> PyResult<i32> {
        let bus = parse_bus(bus)?;
        py.allow_threads(|| self.inner.check_signal_state(bus, channel, message, signal))
            .map(|state| state.code())
            .map_err(to_py_err)
    }

    #[pyo3(signature = (bus, channel, message, signal, source_addr, dest_addr, raw_value=false))]
    #[allow(clippy::too_many_arguments)]
    fn get_j1939_signal_value(
        &self,
        py: Python<'_>,
        bus: &str,
        channel: i32,
        message: &str,
        signal: &str,
        source_addr: i32,
        dest_addr: i32,
        raw_value: bool,
    ) -> PyResult<PyObject> {
        let bus = parse_bus(bus)?;
        let value = py
            .allow_threads(|| {
                self.inner
                    .get_j1939_signal_value(bus, channel, message, signal, source_addr, dest_addr, raw_value)
            })
            .map_err(to_py_err)?;
        value_to_py(py, &value)
    }

    #[pyo3(signature = (bus, channel, message, signal, source_addr, dest_addr, value, raw_value=false))]
    #[allow(clippy::too_many_arguments)]
    fn set_j1939_signal_value(
        &self,
        py: Python<'_>,
        bus: &str,
        channel: i32,
        message: &str,
        signal: &str,
        source_addr: i32,
        dest_addr: i32,
        value: &Bound<'_, PyAny>,
        raw_value: bool,
    ) -> PyResult<()> {
        let bus = parse_bus(bus)?;
        let value = py_to_value(value)?;
        py.allow_threads(|| {
            self.inner
                .set_j1939_signal_value(bus, channel, message, signal, source_addr, dest_addr, value, raw_value)
        })
        .map_err(to_py_err)
    }

    #[allow(clippy::too_many_arguments)]
    fn get_j1939_signal_full_name(
        &self,
        py: Python<'_>,
        bus: &str,
        channel: i32,
        message: &str,
        signal: &str,
        source_addr: i32,
        dest_addr: i32,
    ) -> PyResult<String> {
        let bus = parse_bus(bus)?;
        py.allow_threads(|| {
            self.inner
                .get_j1939_signal_full_name(bus, channel, message, signal, source_addr, dest_addr)
        })
        .map_err(to_py_err)
    }

    #[allow(clippy::too_many_arguments)]
    fn check_j1939_signal_online(
        &self,
        py: Python<'_>,
        bus: &str,
        channel: i32,
        message: &str,
        signal: &str,
        source_addr: i32,
        dest_addr: i32,
    ) -> PyResult<bool> {
        let bus = parse_bus(bus)?;
        py.allow_threads(|| {
            self.inner
                .check_j1939_signal_online(bus, channel, message, signal, source_addr, dest_addr)
        })
        .map_err(to_py_err)
    }

    #[allow(clippy::too_many_arguments)]
    fn check_j1939_signal_state(
        &self,
        py: Python<'_>,
        bus: &str,
        channel: i32,
        message: &str,
        signal: &str,
        source_addr: i32,
        dest_addr: i32,
    ) -> PyResult<i32> {
        let bus = parse_bus(bus)?;
        py.allow_threads(|| {
            self.inner
                .check_j1939_signal_state(bus, channel, message, signal, source_addr, dest_addr)
        })
        .map(|state| state.code())
        .map_err(to_py_err)
    }

    // -- diagnostics ----------------------------------------------------------

    fn fetch_diag_devices(&self, py: Python<'_>) -> PyResult<Vec<String>> {
        py.allow_threads(|| self.inner.fetch_diag_devices()).map_err(to_py_err)
    }

    /// Returns `{sender: "50 01 ..."}`.
    #[pyo3(signature = (diag_ecu_name, request, request_in_bytes=true))]
    fn send_diag_request(&self, py: Python<'_>, diag_ecu_name: &str, request: &str, request_in_bytes: bool) -> PyResult<PyObject> {
        let responses = py
            .allow_threads(|| self.inner.send_diag_request(diag_ecu_name, request, request_in_bytes))
            .map_err(to_py_err)?;
        let dict = PyDict::new(py);
        for (sender, info) in &responses {
            dict.set_item(sender, &info.stream_text)?;
        }
        Ok(dict.into_any().unbind())
    }

    fn control_tester_present(&self, py: Python<'_>, diag_ecu_name: &str, value: bool) -> PyResult<()> {
        py.allow_threads(|| self.inner.control_tester_present(diag_ecu_name, value))
            .map_err(to_py_err)
    }

    // -- CAPL -----------------------------------------------------------------

    /// Returns `True` when every node compiled.
    #[pyo3(signature = (wait_time=5.0))]
    fn compile_all_capl_nodes(&self, py: Python<'_>, wait_time: f64) -> PyResult<bool> {
        let settle = Duration::try_from_secs_f64(wait_time)
            .map_err(|e| PyValueError::new_err(format!("invalid wait_time: {e}")))?;
        py.allow_threads(|| self.inner.compile_all_capl_nodes(settle))
            .map(|code| code == 0)
            .map_err(to_py_err)
    }

    #[pyo3(signature = (name, *arguments))]
    fn call_capl_function(&self, py: Python<'_>, name: &str, arguments: &Bound<'_, PyTuple>) -> PyResult<PyObject> {
        let args = arguments
            .iter()
            .map(|a| py_to_value(&a))
            .collect::<PyResult<Vec<_>>>()?;
        let result = py
            .allow_threads(|| self.inner.call_capl_function(name, &args))
            .map_err(to_py_err)?;
        value_to_py(py, &result)
    }

    // -- UI -------------------------------------------------------------------

    fn write_text_in_write_window(&self, py: Python<'_>, text: &str) -> PyResult<()> {
        py.allow_threads(|| self.inner.write_text(text)).map_err(to_py_err)
    }

    fn read_text_from_write_window(&self, py: Python<'_>) -> PyResult<String> {
        py.allow_threads(|| self.inner.read_write_window()).map_err(to_py_err)
    }

    fn clear_write_window_content(&self, py: Python<'_>) -> PyResult<()> {
        py.allow_threads(|| self.inner.clear_write_window()).map_err(to_py_err)
    }

    fn copy_write_window_content(&self, py: Python<'_>) -> PyResult<()> {
        py.allow_threads(|| self.inner.copy_write_window()).map_err(to_py_err)
    }

    #[pyo3(signature = (output_file, tab_index=None))]
    fn enable_write_window_output_file(&self, py: Python<'_>, output_file: &str, tab_index: Option<i32>) -> PyResult<()> {
        py.allow_threads(|| self.inner.enable_write_window_output_file(output_file, tab_index))
            .map_err(to_py_err)
    }

    #[pyo3(signature = (tab_index=None))]
    fn disable_write_window_output_file(&self, py: Python<'_>, tab_index: Option<i32>) -> PyResult<()> {
        py.allow_threads(|| self.inner.disable_write_window_output_file(tab_index))
            .map_err(to_py_err)
    }

    fn ui_activate_desktop(&self, py: Python<'_>, name: &str) -> PyResult<()> {
        py.allow_threads(|| self.inner.ui_activate_desktop(name)).map_err(to_py_err)
    }

    fn ui_create_desktop(&self, py: Python<'_>, name: &str) -> PyResult<()> {
        py.allow_threads(|| self.inner.ui_create_desktop(name)).map_err(to_py_err)
    }

    // -- offline measurement --------------------------------------------------

    fn break_measurement_in_offline_mode(&self, py: Python<'_>) -> PyResult<()> {
        py.allow_threads(|| self.inner.break_measurement_in_offline_mode())
            .map_err(to_py_err)
    }

    fn reset_measurement_in_offline_mode(&self, py: Python<'_>) -> PyResult<()> {
        py.allow_threads(|| self.inner.reset_measurement_in_offline_mode())
            .map_err(to_py_err)
    }

    fn step_measurement_event_in_single_step(&self, py: Python<'_>) -> PyResult<()> {
        py.allow_threads(|| self.inner.step_measurement_event_in_single_step())
            .map_err(to_py_err)
    }

    fn get_measurement_index(&self, py: Python<'_>) -> PyResult<i32> {
        py.allow_threads(|| self.inner.get_measurement_index()).map_err(to_py_err)
    }

    fn set_measurement_index(&self, py: Python<'_>, index: i32) -> PyResult<()> {
        py.allow_threads(|| self.inner.set_measurement_index(index)).map_err(to_py_err)
    }

    // -- configuration setup --------------------------------------------------

    #[pyo3(signature = (value=false))]
    fn set_configuration_modified(&self, py: Python<'_>, value: bool) -> PyResult<()> {
        py.allow_threads(|| self.inner.set_configuration_modified(value))
            .map_err(to_py_err)
    }

    fn add_offline_source_log_file(&self, py: Python<'_>, absolute_log_file_path: &str) -> PyResult<bool> {
        py.allow_threads(|| self.inner.add_offline_source_log_file(absolute_log_file_path))
            .map_err(to_py_err)
    }

    #[pyo3(signature = (database_file, database_network=None, database_channel=1))]
    fn add_database(
        &self,
        py: Python<'_>,
        database_file: &str,
        database_network: Option<&str>,
        database_channel: i32,
    ) -> PyResult<bool> {
        py.allow_threads(|| self.inner.add_database(database_file, database_network, database_channel))
            .map_err(to_py_err)
    }

    #[pyo3(signature = (database_file, database_channel=1))]
    fn remove_database(&self, py: Python<'_>, database_file: &str, database_channel: i32) -> PyResult<bool> {
        py.allow_threads(|| self.inner.remove_database(database_file, database_channel))
            .map_err(to_py_err)
    }

    #[pyo3(signature = (channel=1))]
    fn get_can_bus_statistics(&self, py: Python<'_>, channel: i32) -> PyResult<PyObject> {
        let stats = py
            .allow_threads(|| self.inner.get_can_bus_statistics(channel))
            .map_err(to_py_err)?;
        can_statistics_to_py(py, &stats)
    }

    /// Returns `{name: {full_name, path, name, channel}}`.
    #[pyo3(signature = (bus="CAN"))]
    fn get_bus_databases_info(&self, py: Python<'_>, bus: &str) -> PyResult<PyObject> {
        let bus = parse_bus(bus)?;
        let databases = py
            .allow_threads(|| self.inner.get_bus_databases_info(bus))
            .map_err(to_py_err)?;
        let out = PyDict::new(py);
        for (name, info) in &databases {
            let entry = PyDict::new(py);
            entry.set_item("full_name", &info.full_name)?;
            entry.set_item("path", &info.path)?;
            entry.set_item("name", &info.name)?;
            entry.set_item("channel", info.channel)?;
            out.set_item(name, entry)?;
        }
        Ok(out.into_any().unbind())
    }

    /// Returns `{name: {full_name, path, name, active}}`.
    #[pyo3(signature = (bus="CAN"))]
    fn get_bus_nodes_info(&self, py: Python<'_>, bus: &str) -> PyResult<PyObject> {
        let bus = parse_bus(bus)?;
        let nodes = py
            .allow_threads(|| self.inner.get_bus_nodes_info(bus))
            .map_err(to_py_err)?;
        let out = PyDict::new(py);
        for (name, info) in &nodes {
            let entry = PyDict::new(py);
            entry.set_item("full_name", &info.full_name)?;
            entry.set_item("path", &info.path)?;
            entry.set_item("name", &info.name)?;
            entry.set_item("active", info.active)?;
            out.set_item(name, entry)?;
        }
        Ok(out.into_any().unbind())
    }

    // -- replay blocks --------------------------------------------------------

    fn set_replay_block_file(&self, py: Python<'_>, block_name: &str, recording_file: &str) -> PyResult<()> {
        py.allow_threads(|| self.inner.set_replay_block_file(block_name, recording_file))
            .map_err(to_py_err)
    }

    fn control_replay_block(&self, py: Python<'_>, block_name: &str, start_stop: bool) -> PyResult<()> {
        py.allow_threads(|| self.inner.control_replay_block(block_name, start_stop))
            .map_err(to_py_err)
    }

    fn enable_disable_replay_block(&self, py: Python<'_>, block_name: &str, enable_disable: bool) -> PyResult<()> {
        py.allow_threads(|| self.inner.enable_disable_replay_block(block_name, enable_disable))
            .map_err(to_py_err)
    }

    // -- logging blocks and exporter -----------------------------------------

    fn get_logging_blocks(&self, py: Python<'_>) -> PyResult<Vec<String>> {
        py.allow_threads(|| self.inner.get_logging_blocks()).map_err(to_py_err)
    }

    fn add_logging_block(&self, py: Python<'_>, full_name: &str) -> PyResult<()> {
        py.allow_threads(|| self.inner.add_logging_block(full_name)).map_err(to_py_err)
    }

    fn remove_logging_block(&self, py: Python<'_>, index: usize) -> PyResult<()> {
        py.allow_threads(|| self.inner.remove_logging_block(index)).map_err(to_py_err)
    }

    fn start_stop_online_logging_block(&self, py: Python<'_>, full_name: &str, start_stop: bool) -> PyResult<()> {
        py.allow_threads(|| self.inner.control_logging_block(full_name, start_stop))
            .map_err(to_py_err)
    }

    fn load_logs_for_exporter(&self, py: Python<'_>, logger_index: usize) -> PyResult<()> {
        py.allow_threads(|| self.inner.load_logs_for_exporter(logger_index))
            .map_err(to_py_err)
    }

    fn get_symbols(&self, py: Python<'_>, logger_index: usize) -> PyResult<Vec<String>> {
        py.allow_threads(|| self.inner.get_symbols(logger_index)).map_err(to_py_err)
    }

    fn get_messages(&self, py: Python<'_>, logger_index: usize) -> PyResult<Vec<String>> {
        py.allow_threads(|| self.inner.get_messages(logger_index)).map_err(to_py_err)
    }

    fn add_filters_to_exporter(&self, py: Python<'_>, logger_index: usize, full_names: Vec<String>) -> PyResult<()> {
        py.allow_threads(|| self.inner.add_filters_to_exporter(logger_index, &full_names))
            .map_err(to_py_err)
    }

    fn start_export(&self, py: Python<'_>, logger_index: usize) -> PyResult<()> {
        py.allow_threads(|| self.inner.start_export(logger_index)).map_err(to_py_err)
    }

    // -- test setup -----------------------------------------------------------

    fn get_test_environments(&self, py: Python<'_>) -> PyResult<Vec<String>> {
        py.allow_threads(|| self.inner.get_test_environments()).map_err(to_py_err)
    }

    fn get_test_modules(&self, py: Python<'_>, env_name: &str) -> PyResult<Vec<String>> {
        py.allow_threads(|| self.inner.get_test_modules(env_name)).map_err(to_py_err)
    }

    /// Blocks until the module stops.  Returns the verdict name.
    fn execute_test_module(&self, py: Python<'_>, test_module_name: &str) -> PyResult<String> {
        py.allow_threads(|| self.inner.execute_test_module(test_module_name))
            .map(|verdict| verdict.to_string())
            .map_err(to_py_err)
    }

    fn stop_test_module(&self, py: Python<'_>, test_module_name: &str) -> PyResult<bool> {
        py.allow_threads(|| self.inner.stop_test_module(test_module_name))
            .map_err(to_py_err)
    }

    fn execute_all_test_modules_in_test_env(&self, py: Python<'_>, env_name: &str) -> PyResult<PyObject> {
        let verdicts = py
            .allow_threads(|| self.inner.execute_all_test_modules_in_test_env(env_name))
            .map_err(to_py_err)?;
        Ok(verdicts_to_py(py, &verdicts)?.into_any().unbind())
    }

    fn stop_all_test_modules_in_test_env(&self, py: Python<'_>, env_name: &str) -> PyResult<usize> {
        py.allow_threads(|| self.inner.stop_all_test_modules_in_test_env(env_name))
            .map_err(to_py_err)
    }

    /// Returns `{environment: {module: verdict}}`.
    fn execute_all_test_environments(&self, py: Python<'_>) -> PyResult<PyObject> {
        let environments = py
            .allow_threads(|| self.inner.execute_all_test_environments())
            .map_err(to_py_err)?;
        let out = PyDict::new(py);
        for (env, verdicts) in &environments {
            out.set_item(env, verdicts_to_py(py, verdicts)?)?;
        }
        Ok(out.into_any().unbind())
    }

    fn stop_all_test_environments(&self, py: Python<'_>) -> PyResult<usize> {
        py.allow_threads(|| self.inner.stop_all_test_environments()).map_err(to_py_err)
    }

    fn __repr__(&self) -> String {
        format!("{:?}", self.inner)
    }
}

// ---------------------------------------------------------------------------
// Module registration
// ---------------------------------------------------------------------------

/// Register the `canoe_native` Python module.
#[pymodule]
fn canoe_native(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyCanoe>()?;

    m.add("__version__", env!("CARGO_PKG_VERSION"))?;
    m.add("__doc__", "Native Rust binding for CANoe COM automation.")?;

    Ok(())
}
