//! PyO3 bindings for parameter sweeps
//!
//! Exposes [`Simulation`] as a Python class driven by a JSON config string.
//!
//! # Example (from Python)
//!
//! ```python
//! from phenocell_core_rs import Simulation
//!
//! sim = Simulation('{"rng_seed": 3, "threads": 4, "model": {"kill_rate": 0.1}}')
//! sim.run()
//! for row in sim.report():
//!     print(row["time"], row["live_tumor"], row["immune"])
//! ```

use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::{PyDict, PyList};

use crate::orchestrator::{ReportRow, Simulation, SimulationConfig, TickResult};

#[pyclass(name = "Simulation")]
pub struct PySimulation {
    inner: Simulation,
}

#[pymethods]
impl PySimulation {
    /// Create a simulation from a JSON config; missing fields take defaults
    #[new]
    fn new(config_json: &str) -> PyResult<Self> {
        let config = SimulationConfig::from_json_str(config_json)
            .map_err(|e| PyValueError::new_err(e.to_string()))?;
        let inner = Simulation::new(config)
            .map_err(|e| PyValueError::new_err(format!("Failed to create simulation: {}", e)))?;
        Ok(Self { inner })
    }

    /// Execute one tick and return its counters
    fn step(&mut self, py: Python<'_>) -> PyResult<Py<PyDict>> {
        let result = self
            .inner
            .tick()
            .map_err(|e| PyRuntimeError::new_err(format!("Tick execution failed: {}", e)))?;
        tick_result_to_py(py, &result)
    }

    /// Run to `t_max`, releasing the GIL while the pool works
    fn run(&mut self, py: Python<'_>) -> PyResult<()> {
        py.allow_threads(|| self.inner.run())
            .map_err(|e| PyRuntimeError::new_err(format!("Run failed: {}", e)))
    }

    /// Report rows recorded so far
    fn report(&self, py: Python<'_>) -> PyResult<Py<PyList>> {
        let list = PyList::empty_bound(py);
        for row in self.inner.report() {
            list.append(report_row_to_py(py, row)?)?;
        }
        Ok(list.unbind())
    }

    fn time(&self) -> f64 {
        self.inner.time()
    }

    fn cell_count(&self) -> usize {
        self.inner.cells().len()
    }

    fn run_id(&self) -> String {
        self.inner.run_id().to_string()
    }

    /// Checkpoint as a JSON string
    fn save_state(&self) -> PyResult<String> {
        self.inner
            .save_state()
            .and_then(|s| s.to_json())
            .map_err(|e| PyRuntimeError::new_err(e.to_string()))
    }
}

fn tick_result_to_py(py: Python<'_>, result: &TickResult) -> PyResult<Py<PyDict>> {
    let dict = PyDict::new_bound(py);
    dict.set_item("tick", result.tick)?;
    dict.set_item("time", result.time)?;
    dict.set_item("cells", result.cells)?;
    dict.set_item("divisions", result.divisions)?;
    dict.set_item("removals", result.removals)?;
    dict.set_item("deaths", result.deaths)?;
    dict.set_item("kills", result.kills)?;
    dict.set_item("attached", result.attached)?;
    dict.set_item("detached", result.detached)?;
    dict.set_item("cells_introduced", result.cells_introduced)?;
    Ok(dict.unbind())
}

fn report_row_to_py(py: Python<'_>, row: &ReportRow) -> PyResult<Py<PyDict>> {
    let dict = PyDict::new_bound(py);
    dict.set_item("time", row.time)?;
    dict.set_item("cells", row.cells)?;
    dict.set_item("divisions", row.divisions)?;
    dict.set_item("deaths", row.deaths)?;
    dict.set_item("live_tumor", row.live_tumor)?;
    dict.set_item("dead_tumor", row.dead_tumor)?;
    dict.set_item("immune", row.immune)?;
    dict.set_item("attached_immune", row.attached_immune)?;
    Ok(dict.unbind())
}
