//! Environment variables.

use crate::errors::{CanoeError, Result};
use crate::proxy::Proxy;
use crate::value::Value;

/// Value type of an environment variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvVarType {
    Integer,
    Float,
    String,
    Data,
}

impl TryFrom<i32> for EnvVarType {
    type Error = CanoeError;

    fn try_from(code: i32) -> Result<Self> {
        match code {
            0 => Ok(EnvVarType::Integer),
            1 => Ok(EnvVarType::Float),
            2 => Ok(EnvVarType::String),
            3 => Ok(EnvVarType::Data),
            other => Err(CanoeError::InvalidArgument(format!(
                "unknown environment variable type {other}"
            ))),
        }
    }
}

impl EnvVarType {
    /// Convert `value` to the representation this type is written with.
    pub fn convert(self, value: Value) -> Result<Value> {
        let template = match self {
            EnvVarType::Integer => Value::Int(0),
            EnvVarType::Float => Value::Float(0.0),
            EnvVarType::String => Value::Str(String::new()),
            EnvVarType::Data => Value::Bytes(Vec::new()),
        };
        value.coerce_like(&template)
    }
}

proxy! {
    pub struct Environment;
}

impl Environment {
    pub fn get_variable(&self, name: &str) -> Result<EnvironmentVariable> {
        self.handle.call_child("GetVariable", &[Value::from(name)])
    }
}

proxy! {
    pub struct EnvironmentVariable;
}

impl EnvironmentVariable {
    getters! {
        env_handle: i32 => "Handle";
        notification_type: i32 => "NotificationType";
        type_code: i32 => "Type";
        value: Value => "Value";
    }

    setters! {
        set_notification_type: i32 => "NotificationType";
    }

    pub fn value_type(&self) -> Result<EnvVarType> {
        EnvVarType::try_from(self.type_code()?)
    }

    /// Write `value` converted to the variable's type.
    pub fn set_value(&self, value: impl Into<Value>) -> Result<()> {
        let converted = self.value_type()?.convert(value.into())?;
        self.handle.put("Value", converted)
    }
}
