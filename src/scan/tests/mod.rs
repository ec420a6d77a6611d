pub mod helpers;
mod tests_plan;
