use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use pyo3::types::{PyDict, PyList};

use crate::resolved::{Number, Path, ResolvedValue};
use crate::stream::{StreamEvent, StreamSession, SubfieldError};
use crate::target_type::TargetType;
use crate::ParseOptions;

fn value_error(e: impl std::fmt::Display) -> PyErr {
    PyValueError::new_err(e.to_string())
}

fn to_python(py: Python, value: &ResolvedValue) -> PyResult<PyObject> {
    match value {
        ResolvedValue::Null => Ok(py.None()),
        ResolvedValue::Boolean(b) => Ok(b.into_py(py)),
        ResolvedValue::Number(Number::Integer(i)) => Ok(i.into_py(py)),
        ResolvedValue::Number(Number::Float(f)) => Ok(f.into_py(py)),
        ResolvedValue::String(s) => Ok(s.into_py(py)),
        ResolvedValue::Array(items) => {
            let list = PyList::empty(py);
            for item in items {
                list.append(to_python(py, item)?)?;
            }
            Ok(list.into())
        }
        ResolvedValue::Object(entries) => {
            let dict = PyDict::new(py);
            for (k, v) in entries {
                dict.set_item(k, to_python(py, v)?)?;
            }
            Ok(dict.into())
        }
    }
}

/// Incremental parser driven from Python.
#[pyclass]
struct StreamParser {
    session: StreamSession,
}

#[pymethods]
impl StreamParser {
    #[new]
    fn new(type_notation: &str) -> PyResult<Self> {
        let target = TargetType::parse(type_notation).map_err(value_error)?;
        Ok(Self {
            session: StreamSession::new(target, ParseOptions::default()),
        })
    }

    /// Feed a chunk; returns the paths of top-level fields it completed.
    #[pyo3(text_signature = "($self, chunk)")]
    fn feed(&mut self, chunk: &str) -> PyResult<Vec<String>> {
        let mut ready = Vec::new();
        let mut event = Some(self.session.advance(chunk));
        while let Some(ev) = event {
            match ev {
                StreamEvent::FieldReady { path, .. } => ready.push(path.to_string()),
                StreamEvent::Fatal(f) => return Err(value_error(f)),
                StreamEvent::NeedMore | StreamEvent::Done(_) => {}
            }
            event = self.session.next_event();
        }
        Ok(ready)
    }

    /// Resolved value at `path` (e.g. `.items[0]`), or `None` while it is
    /// still streaming.
    #[pyo3(text_signature = "($self, path, type_notation)")]
    fn peek(&self, py: Python, path: &str, type_notation: &str) -> PyResult<Option<PyObject>> {
        let path: Path = path.parse().map_err(value_error)?;
        let ty = TargetType::parse(type_notation).map_err(value_error)?;
        match self.session.peek_subfield(&path, &ty) {
            Ok(v) => to_python(py, &v).map(Some),
            Err(SubfieldError::NotYetAvailable(_)) => Ok(None),
            Err(e) => Err(value_error(e)),
        }
    }

    fn should_abort(&self) -> bool {
        self.session.should_abort()
    }

    fn is_done(&self) -> bool {
        self.session.is_done()
    }

    /// End of stream; returns the resolved value.
    fn finish(&mut self, py: Python) -> PyResult<PyObject> {
        self.session.finish();
        let value = self.session.resolve().map_err(value_error)?;
        to_python(py, &value)
    }
}

/// Parse a complete response against a type notation string.
#[pyfunction]
#[pyo3(text_signature = "(text, type_notation)")]
fn parse(py: Python, text: &str, type_notation: &str) -> PyResult<PyObject> {
    let ty = TargetType::parse(type_notation).map_err(value_error)?;
    let value = crate::parse_str(text, &ty).map_err(value_error)?;
    to_python(py, &value)
}

#[pymodule]
fn lmon(_py: Python, m: &PyModule) -> PyResult<()> {
    crate::init_logging();
    m.add_class::<StreamParser>()?;
    m.add_function(wrap_pyfunction!(parse, m)?)?;
    Ok(())
}
