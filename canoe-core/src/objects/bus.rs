//! Bus, signal, node and database wrappers.

use serde::Serialize;

use crate::collection::Collection;
use crate::errors::Result;
use crate::proxy::Proxy;
use crate::value::Value;

proxy! {
    /// One bus of the configuration, obtained through
    /// [`Application::bus`](crate::objects::application::Application::bus).
    pub struct Bus;
}

impl Bus {
    getters! {
        active: bool => "Active";
        name: String => "Name";
    }

    setters! {
        set_name: &str => "Name";
    }

    /// `Baudrate` is a method on the server, not a property.
    pub fn baudrate(&self) -> Result<i32> {
        self.handle.call("Baudrate", &[])
    }

    pub fn set_baudrate(&self, baudrate: i32) -> Result<()> {
        self.handle.invoke("SetBaudrate", &[Value::from(baudrate)]).map(drop)
    }

    pub fn nodes(&self) -> Result<Collection<Node>> {
        self.handle.child("Nodes")
    }

    pub fn databases(&self) -> Result<Collection<Database>> {
        self.handle.child("Databases")
    }

    pub fn get_signal(&self, channel: i32, message: &str, signal: &str) -> Result<Signal> {
        self.handle.call_child(
            "GetSignal",
            &[Value::from(channel), Value::from(message), Value::from(signal)],
        )
    }

    pub fn get_j1939_signal(
        &self,
        channel: i32,
        message: &str,
        signal: &str,
        source_address: i32,
        destination_address: i32,
    ) -> Result<Signal> {
        self.handle.call_child(
            "GetJ1939Signal",
            &[
                Value::from(channel),
                Value::from(message),
                Value::from(signal),
                Value::from(source_address),
                Value::from(destination_address),
            ],
        )
    }
}

/// Where a signal's current value comes from, as reported by `State`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SignalState {
    /// Default value of the signal.
    Default,
    /// Measurement not running; value set by the application.
    SetByApplication,
    /// Measurement not running; value of the last measurement.
    LastMeasurement,
    /// Received in the current measurement.
    Received,
    Unknown(i32),
}

impl SignalState {
    pub fn code(self) -> i32 {
        match self {
            SignalState::Default => 0,
            SignalState::SetByApplication => 1,
            SignalState::LastMeasurement => 2,
            SignalState::Received => 3,
            SignalState::Unknown(code) => code,
        }
    }
}

impl From<i32> for SignalState {
    fn from(code: i32) -> Self {
        match code {
            0 => SignalState::Default,
            1 => SignalState::SetByApplication,
            2 => SignalState::LastMeasurement,
            3 => SignalState::Received,
            other => SignalState::Unknown(other),
        }
    }
}

proxy! {
    pub struct Signal;
}

impl Signal {
    getters! {
        full_name: String => "FullName";
        /// `true` while the measurement runs and the signal has been received.
        is_online: bool => "IsOnline";
        state_code: i32 => "State";
        value: Value => "Value";
        raw_value: Value => "RawValue";
    }

    pub fn state(&self) -> Result<SignalState> {
        self.state_code().map(SignalState::from)
    }

    pub fn set_value(&self, value: impl Into<Value>) -> Result<()> {
        self.handle.put("Value", value)
    }

    pub fn set_raw_value(&self, value: impl Into<Value>) -> Result<()> {
        self.handle.put("RawValue", value)
    }
}

proxy! {
    /// Node of the simulation setup.
    pub struct Node;
}

impl Node {
    getters! {
        active: bool => "Active";
        full_name: String => "FullName";
        is_gateway: bool => "IsGateway";
        name: String => "Name";
        path: String => "Path";
        start_delay: i32 => "StartDelay";
        start_delay_active: bool => "StartDelayActive";
        test_module: bool => "TestModule";
    }

    setters! {
        set_start_delay: i32 => "StartDelay";
        set_start_delay_active: bool => "StartDelayActive";
    }

    pub fn info(&self) -> Result<NodeInfo> {
        Ok(NodeInfo {
            full_name: self.full_name()?,
            path: self.path()?,
            name: self.name()?,
            active: self.active()?,
        })
    }
}

/// Snapshot of a simulation node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeInfo {
    pub full_name: String,
    pub path: String,
    pub name: String,
    pub active: bool,
}

impl Collection<Node> {
    pub fn add_node(&self, name: &str) -> Result<Node> {
        self.add(&[Value::from(name)])
    }

    pub fn add_test_module(&self, name: &str) -> Result<Node> {
        self.add_with("AddTestModule", &[Value::from(name)])
    }
}

proxy! {
    pub struct Database;
}

impl Database {
    getters! {
        channel: i32 => "Channel";
        full_name: String => "FullName";
        name: String => "Name";
        path: String => "Path";
    }

    setters! {
        set_channel: i32 => "Channel";
        set_full_name: &str => "FullName";
    }

    pub fn info(&self) -> Result<DatabaseInfo> {
        Ok(DatabaseInfo {
            full_name: self.full_name()?,
            path: self.path()?,
            name: self.name()?,
            channel: self.channel()?,
        })
    }
}

/// Snapshot of a database assigned to a bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatabaseInfo {
    pub full_name: String,
    pub path: String,
    pub name: String,
    pub channel: i32,
}

impl Collection<Database> {
    /// Attach the database file at `full_name` to the bus.
    pub fn add_database(&self, full_name: &str) -> Result<Database> {
        self.add(&[Value::from(full_name)])
    }

    /// Attach the database file at `full_name` to `network`.
    pub fn add_network(&self, full_name: &str, network: &str) -> Result<Database> {
        self.add_with("AddNetwork", &[Value::from(full_name), Value::from(network)])
    }
}
