//! System namespaces and system variables.
//!
//! Variables are addressed by path, `namespace::variable`, where the
//! namespace part may itself be nested (`ECU::Inputs::speed`).  The last
//! `::` segment is the variable name; everything before it is passed to the
//! server as the namespace key.
//!
//! [`Variable::subscribe`] registers a [`ValueSink`] for the variable's
//! change notifications and returns a [`VariableWatch`] that keeps the
//! registration alive.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::collection::{Collection, ItemKey};
use crate::errors::{CanoeError, Result};
use crate::event::{SinkSnapshot, ValueSink};
use crate::proxy::{Proxy, Subscription};
use crate::value::Value;

// ---------------------------------------------------------------------------
// Paths
// ---------------------------------------------------------------------------

/// Parsed `namespace::variable` path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SysVarPath {
    pub namespace: String,
    pub variable: String,
}

impl FromStr for SysVarPath {
    type Err = CanoeError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || {
            CanoeError::InvalidArgument(format!(
                "invalid system variable name '{s}', expected 'namespace::variable'"
            ))
        };
        let (namespace, variable) = s.rsplit_once("::").ok_or_else(invalid)?;
        if namespace.is_empty() || variable.is_empty() || namespace.split("::").any(str::is_empty) {
            return Err(invalid());
        }
        Ok(Self {
            namespace: namespace.to_owned(),
            variable: variable.to_owned(),
        })
    }
}

impl fmt::Display for SysVarPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.namespace, self.variable)
    }
}

// ---------------------------------------------------------------------------
// System
// ---------------------------------------------------------------------------

proxy! {
    /// Root of the system-variable tree.
    pub struct System;
}

impl System {
    pub fn namespaces(&self) -> Result<Collection<Namespace>> {
        self.handle.child("Namespaces")
    }

    /// Look up a namespace by its full `a::b` name.
    pub fn namespace(&self, name: &str) -> Result<Namespace> {
        self.namespaces()?.item(name)
    }

    /// Look up a variable by `namespace::variable` path.
    pub fn variable(&self, path: &str) -> Result<Variable> {
        let path: SysVarPath = path.parse()?;
        self.namespace(&path.namespace)?
            .variables()?
            .item(path.variable.as_str())
    }

    /// Define a variable, creating its namespace when missing.
    ///
    /// A `read_only` variable is created with `Add`, otherwise with
    /// `AddWriteable`.
    pub fn add_variable(&self, path: &str, initial: impl Into<Value>, read_only: bool) -> Result<Variable> {
        let path: SysVarPath = path.parse()?;
        let namespace = match self.namespace(&path.namespace) {
            Ok(ns) => ns,
            Err(CanoeError::NotFound(_)) => {
                debug!("namespace '{}' not present, creating it", path.namespace);
                self.namespaces()?.add_namespace(&path.namespace)?
            }
            Err(e) => return Err(e),
        };
        let variables = namespace.variables()?;
        if read_only {
            variables.add_variable(&path.variable, initial)
        } else {
            variables.add_writeable(&path.variable, initial)
        }
    }

    /// Remove a variable.  Returns `false` if the namespace holds no variable
    /// of that name.
    pub fn remove_variable(&self, path: &str) -> Result<bool> {
        let path: SysVarPath = path.parse()?;
        let variables = self.namespace(&path.namespace)?.variables()?;
        for (i, var) in variables.iter()?.enumerate() {
            if var?.name()? == path.variable {
                variables.remove(ItemKey::Index(i))?;
                return Ok(true);
            }
        }
        Ok(false)
    }
}

proxy! {
    pub struct Namespace;
}

impl Namespace {
    getters! {
        name: String => "Name";
        comment: String => "Comment";
    }

    pub fn variables(&self) -> Result<Collection<Variable>> {
        self.handle.child("Variables")
    }

    /// Nested namespaces.
    pub fn namespaces(&self) -> Result<Collection<Namespace>> {
        self.handle.child("Namespaces")
    }
}

impl Collection<Namespace> {
    pub fn add_namespace(&self, name: &str) -> Result<Namespace> {
        self.add(&[Value::from(name)])
    }
}

impl Collection<Variable> {
    /// Read-only variable with an initial value.
    pub fn add_variable(&self, name: &str, initial: impl Into<Value>) -> Result<Variable> {
        self.add(&[Value::from(name), initial.into()])
    }

    pub fn add_ex(
        &self,
        name: &str,
        initial: impl Into<Value>,
        min: impl Into<Value>,
        max: impl Into<Value>,
    ) -> Result<Variable> {
        self.add_with(
            "AddEx",
            &[Value::from(name), initial.into(), min.into(), max.into()],
        )
    }

    pub fn add_writeable(&self, name: &str, initial: impl Into<Value>) -> Result<Variable> {
        self.add_with("AddWriteable", &[Value::from(name), initial.into()])
    }

    /// `min`/`max` of `None` leave the range unbounded.
    pub fn add_writable_ex(
        &self,
        name: &str,
        initial: impl Into<Value>,
        min: Option<Value>,
        max: Option<Value>,
    ) -> Result<Variable> {
        self.add_with(
            "AddWritableEx",
            &[Value::from(name), initial.into(), Value::from(min), Value::from(max)],
        )
    }
}

// ---------------------------------------------------------------------------
// Variable
// ---------------------------------------------------------------------------

proxy! {
    pub struct Variable;
}

impl Variable {
    getters! {
        name: String => "Name";
        full_name: String => "FullName";
        comment: String => "Comment";
        unit: String => "Unit";
        analysis_only: bool => "AnalysisOnly";
        bit_count: i32 => "BitCount";
        element_count: i32 => "ElementCount";
        is_array: bool => "IsArray";
        is_member: bool => "IsMember";
        is_signed: bool => "IsSigned";
        is_struct: bool => "IsStruct";
        read_only: bool => "ReadOnly";
        member_name: String => "MemberName";
        notification_type: i32 => "NotificationType";
        /// Numeric variable type as reported by the server.
        var_type: i32 => "Type";
        init_value: Value => "InitValue";
        min_value: Value => "MinValue";
        max_value: Value => "MaxValue";
        physical_init_value: Value => "PhysicalInitValue";
        physical_value: Value => "PhysicalValue";
        value: Value => "Value";
    }

    setters! {
        set_analysis_only: bool => "AnalysisOnly";
    }

    pub fn members(&self) -> Result<Collection<Variable>> {
        self.handle.child("Members")
    }

    pub fn set_value(&self, value: impl Into<Value>) -> Result<()> {
        self.handle.put("Value", value)
    }

    pub fn begin_struct_update(&self) -> Result<()> {
        self.handle.invoke("BeginStructUpdate", &[]).map(drop)
    }

    pub fn end_struct_update(&self) -> Result<()> {
        self.handle.invoke("EndStructUpdate", &[]).map(drop)
    }

    pub fn get_member_value(&self, member: &str) -> Result<Value> {
        self.handle.invoke("GetMemberValue", &[Value::from(member)])
    }

    pub fn set_member_value(&self, member: &str, value: impl Into<Value>) -> Result<()> {
        self.handle
            .invoke("SetMemberValue", &[Value::from(member), value.into()])
            .map(drop)
    }

    pub fn get_member_phys_value(&self, member: &str) -> Result<Value> {
        self.handle.invoke("GetMemberPhysValue", &[Value::from(member)])
    }

    pub fn set_member_phys_value(&self, member: &str, value: impl Into<Value>) -> Result<()> {
        self.handle
            .invoke("SetMemberPhysValue", &[Value::from(member), value.into()])
            .map(drop)
    }

    /// Symbolic name of `value` in the variable's value table.
    pub fn get_symbolic_value_name(&self, value: impl Into<Value>) -> Result<String> {
        self.handle.call("GetSymbolicValueName", &[value.into()])
    }

    pub fn set_symbolic_value_name(&self, value: impl Into<Value>, name: &str) -> Result<()> {
        self.handle
            .invoke("SetSymbolicValueName", &[value.into(), Value::from(name)])
            .map(drop)
    }

    /// Register for change notifications on this variable.
    pub fn subscribe(&self) -> Result<VariableWatch> {
        let sink = Arc::new(ValueSink::new());
        let subscription = self.handle.advise(sink.clone())?;
        Ok(VariableWatch {
            variable: self.clone(),
            sink,
            _subscription: subscription,
        })
    }
}

/// A variable together with its live change-notification mailbox.
///
/// Dropping the watch unregisters the sink.
#[derive(Debug)]
pub struct VariableWatch {
    variable: Variable,
    sink: Arc<ValueSink>,
    _subscription: Subscription,
}

impl VariableWatch {
    pub fn variable(&self) -> &Variable {
        &self.variable
    }

    pub fn sink(&self) -> &ValueSink {
        &self.sink
    }

    pub fn snapshot(&self) -> SinkSnapshot {
        self.sink.snapshot()
    }

    /// Write `value` and wait up to `timeout` for the server to report the
    /// change.  Returns whether the notification arrived in time.
    ///
    /// The write is issued once whatever the outcome of the wait.
    pub fn set_and_wait(&self, value: impl Into<Value>, timeout: Duration) -> Result<bool> {
        self.sink.clear();
        self.variable.set_value(value)?;
        Ok(self.sink.wait_updated(timeout))
    }
}
