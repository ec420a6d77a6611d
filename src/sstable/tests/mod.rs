mod tests_basic;

// Priority 2 — robustness tests
mod tests_corruption;
