pub const HARNESS_PREAMBLE_PY: &str = include_str!("../templates/harness_preamble.py");
pub const HARNESS_RUNNER_PY: &str = include_str!("../templates/harness_runner.py");
