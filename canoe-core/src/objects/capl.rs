//! CAPL node compilation and user-defined CAPL functions.

use crate::errors::{CanoeError, Result};
use crate::proxy::Proxy;
use crate::value::Value;

proxy! {
    pub struct Capl;
}

impl Capl {
    children! {
        /// Result of the most recent [`compile`](Capl::compile).
        compile_result: CompileResult => "CompileResult";
    }

    /// Compile every node (CAPL, .NET, XML) in the configuration.
    pub fn compile(&self) -> Result<()> {
        self.handle.invoke("Compile", &[]).map(drop)
    }

    /// Resolve a user-defined CAPL function.
    ///
    /// The server only answers this while the measurement is initializing,
    /// so callers resolve functions from the measurement `OnInit` callback.
    pub fn get_function(&self, name: &str) -> Result<CaplFunction> {
        self.handle.call_child("GetFunction", &[Value::from(name)])
    }
}

proxy! {
    pub struct CaplFunction;
}

impl CaplFunction {
    getters! {
        parameter_count: usize => "ParameterCount";
        parameter_types: Vec<i64> => "ParameterTypes";
    }

    /// Call the function.  The argument count must match
    /// [`parameter_count`](CaplFunction::parameter_count).
    pub fn call(&self, args: &[Value]) -> Result<Value> {
        let expected = self.parameter_count()?;
        if args.len() != expected {
            return Err(CanoeError::InvalidArgument(format!(
                "CAPL function takes {expected} argument(s), {} given",
                args.len()
            )));
        }
        self.handle.invoke("Call", args)
    }
}

proxy! {
    pub struct CompileResult;
}

impl CompileResult {
    getters! {
        error_message: String => "ErrorMessage";
        node_name: String => "NodeName";
        /// 0 on success.
        result: i32 => "Result";
        source_file: String => "SourceFile";
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockObject;

    #[test]
    fn test_call_checks_argument_count() {
        let func = MockObject::new("CAPLFunction").with_prop("ParameterCount", 2);
        func.on_call("Call", |args| Ok(Value::Int(args.len() as i64)));
        let f = CaplFunction::from_handle(func.handle());

        assert!(matches!(f.call(&[Value::Int(1)]), Err(CanoeError::InvalidArgument(_))));
        assert_eq!(func.call_count("Call"), 0);
        assert_eq!(f.call(&[Value::Int(1), Value::Int(2)]).unwrap(), Value::Int(2));
    }

    #[test]
    fn test_compile_and_result() {
        let result = MockObject::new("CompileResult")
            .with_prop("Result", 0)
            .with_prop("NodeName", "")
            .with_prop("ErrorMessage", "");
        let capl = MockObject::new("CAPL").with_prop("CompileResult", result.handle());
        capl.on_call("Compile", |_| Ok(Value::Empty));

        let c = Capl::from_handle(capl.handle());
        c.compile().unwrap();
        assert_eq!(c.compile_result().unwrap().result().unwrap(), 0);
        assert_eq!(capl.call_count("Compile"), 1);
    }

    #[test]
    fn test_unknown_function_is_not_found() {
        let capl = MockObject::new("CAPL");
        capl.on_call("GetFunction", |_| Err(CanoeError::NotFound("no such function".into())));
        let c = Capl::from_handle(capl.handle());
        assert!(c.get_function("missing").unwrap_err().is_not_found());
    }
}
