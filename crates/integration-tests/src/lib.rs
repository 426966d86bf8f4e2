//! End-to-end tests for the intake API live under `tests/`.
